use crate::{
    core::{Hostname, Proxy, ProxyKind, ResourceId, Service},
    index::{
        metrics::{ContextMetrics, ResolveMetrics},
        store, PushContext,
    },
    DestinationRule, Snapshot,
};
use anyhow::{anyhow, Context, Error, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use serde::Serialize;
use std::{path::PathBuf, time::Duration};
use tokio::time;
use tracing::{info, info_span, Instrument};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[clap(
    name = "mesh-policy",
    about = "Resolves the destination rule a mesh proxy applies to a service"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "mesh_policy=info,warn",
        env = "MESH_POLICY_CONTROLLER_LOG"
    )]
    log_level: String,

    #[clap(long, default_value = "plain")]
    log_format: LogFormat,

    /// A JSON file describing classified destination rules.
    #[clap(long, env = "MESH_POLICY_CONTROLLER_SNAPSHOT")]
    snapshot: PathBuf,

    /// The configuration namespace of the proxy.
    #[clap(long)]
    proxy_namespace: String,

    #[clap(long, default_value = "sidecar")]
    proxy_kind: ProxyKind,

    /// A `namespace/name` reference to the sidecar resource scoping the proxy.
    #[clap(long)]
    sidecar_scope: Option<ResourceId>,

    /// The destination service's hostname.
    #[clap(long)]
    service_host: Hostname,

    /// The destination service's namespace.
    #[clap(long, default_value = "")]
    service_namespace: String,

    /// Reloads the snapshot at this interval (in seconds), resolving again
    /// whenever a new snapshot is published. Runs until interrupted.
    #[clap(long)]
    watch_interval_secs: Option<u64>,

    /// Writes metrics in the Prometheus text format after each resolution.
    #[clap(long)]
    metrics: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LogFormat {
    Plain,
    Json,
}

/// The result of a resolution, as written to stdout.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Output<'a> {
    generation: u64,
    scope: Option<&'static str>,
    host: Option<String>,
    rule: Option<&'a DestinationRule>,
}

// === impl Args ===

impl Args {
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            snapshot,
            proxy_namespace,
            proxy_kind,
            sidecar_scope,
            service_host,
            service_namespace,
            watch_interval_secs,
            metrics,
        } = self;

        log_format.try_init(&log_level)?;

        let mut proxy = Proxy::new(proxy_namespace, proxy_kind);
        proxy.sidecar_scope = sidecar_scope;
        let service = Service::new(service_host, service_namespace);

        let mut prom = Registry::default();
        let context_metrics = ContextMetrics::register(prom.sub_registry_with_prefix("index"));
        let resolve_metrics = ResolveMetrics::register(prom.sub_registry_with_prefix("resolver"));

        let (writer, mut reader) = store::pair();
        let mut writer = writer.with_metrics(context_metrics);
        let initial = Snapshot::read(&snapshot).await?;
        writer.publish(initial.clone().into_builder()?)?;

        let resolve = |ctx: &PushContext<DestinationRule>| -> Result<()> {
            let resolution = ctx.resolve(&proxy, &service);
            resolve_metrics.observe(resolution.as_ref());
            info!(
                generation = ctx.generation(),
                scope = ?resolution.as_ref().map(|r| r.scope),
                "resolved destination rule"
            );

            let output = Output {
                generation: ctx.generation(),
                scope: resolution.as_ref().map(|r| r.scope.as_str()),
                host: resolution.as_ref().map(|r| r.host.to_string()),
                rule: resolution.as_ref().map(|r| &**r.rule),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            if metrics {
                let mut text = String::new();
                prometheus_client::encoding::text::encode(&mut text, &prom)?;
                print!("{}", text);
            }
            Ok(())
        };

        resolve(&reader.current())?;

        let Some(secs) = watch_interval_secs else {
            return Ok(());
        };

        // The reload task is the store's only writer.
        let reloader = tokio::spawn(
            reload(writer, snapshot, Duration::from_secs(secs), initial)
                .instrument(info_span!("reload")),
        );

        loop {
            tokio::select! {
                changed = reader.changed() => match changed {
                    Some(ctx) => resolve(&ctx)?,
                    None => break,
                },
                res = tokio::signal::ctrl_c() => {
                    res.context("failed to listen for interrupts")?;
                    info!("interrupted");
                    break;
                }
            }
        }

        reloader.abort();
        Ok(())
    }
}

/// Periodically reloads the snapshot, publishing it when its content differs
/// from `published`.
async fn reload(
    mut writer: store::Writer<DestinationRule>,
    path: PathBuf,
    interval: Duration,
    published: Snapshot,
) {
    let mut last = published;
    let mut interval = time::interval(interval);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;

        let snapshot = match Snapshot::read(&path).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(%error, "failed to reload snapshot");
                continue;
            }
        };
        if last == snapshot {
            tracing::trace!("snapshot unchanged");
            continue;
        }

        match snapshot.clone().into_builder() {
            Ok(builder) => {
                if let Err(error) = writer.publish(builder) {
                    tracing::debug!(
                        %error,
                        generation = writer.current().generation(),
                        "keeping current push context"
                    );
                }
            }
            Err(error) => tracing::warn!(%error, "invalid snapshot"),
        }
        last = snapshot;
    }
}

// === impl LogFormat ===

impl LogFormat {
    fn try_init(self, filter: &str) -> Result<()> {
        let filter = EnvFilter::try_new(filter).context("invalid log level")?;
        let registry = tracing_subscriber::registry().with(filter);
        match self {
            Self::Plain => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
            Self::Json => registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?,
        }
        Ok(())
    }
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            s => Err(anyhow!("invalid log format: {:?}", s)),
        }
    }
}
