//! Publishes push contexts to concurrent readers.
//!
//! A single [`Writer`] builds each new snapshot and swaps it in whole. Readers
//! obtain an `Arc` to the current snapshot and hold it for the duration of a
//! push, so a push never observes a partially built or mixed configuration
//! even as newer snapshots are published.

use crate::{build::PushContextBuilder, metrics::ContextMetrics, BuildError, PushContext};
use futures::prelude::*;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Publishes push contexts.
#[derive(Debug)]
pub struct Writer<T> {
    tx: watch::Sender<Arc<PushContext<T>>>,
    generation: u64,
    metrics: Option<ContextMetrics>,
}

/// Observes published push contexts.
#[derive(Debug)]
pub struct Reader<T>(watch::Receiver<Arc<PushContext<T>>>);

/// Creates a store whose initial snapshot is the empty push context at
/// generation 0.
pub fn pair<T>() -> (Writer<T>, Reader<T>) {
    let (tx, rx) = watch::channel(Arc::new(PushContext::empty()));
    let w = Writer {
        tx,
        generation: 0,
        metrics: None,
    };
    (w, Reader(rx))
}

// === impl Writer ===

impl<T> Writer<T> {
    pub fn with_metrics(mut self, metrics: ContextMetrics) -> Self {
        metrics.observe(&**self.tx.borrow());
        self.metrics = Some(metrics);
        self
    }

    /// Builds the next push context from `builder` and publishes it.
    ///
    /// If the snapshot cannot be built, the error is returned and the current
    /// push context remains published.
    pub fn publish(
        &mut self,
        builder: PushContextBuilder<T>,
    ) -> Result<Arc<PushContext<T>>, BuildError> {
        let generation = self.generation + 1;
        let ctx = match builder.build(generation) {
            Ok(ctx) => Arc::new(ctx),
            Err(error) => {
                tracing::warn!(%error, generation, "rejected configuration snapshot");
                if let Some(metrics) = &self.metrics {
                    metrics.build_failed();
                }
                return Err(error);
            }
        };

        self.generation = generation;
        if let Some(metrics) = &self.metrics {
            metrics.published(&ctx);
        }
        // Publishing succeeds even when there are no readers.
        self.tx.send_replace(ctx.clone());
        tracing::info!(generation, "published push context");
        Ok(ctx)
    }

    /// The most recently published push context.
    pub fn current(&self) -> Arc<PushContext<T>> {
        self.tx.borrow().clone()
    }

    pub fn reader(&self) -> Reader<T> {
        Reader(self.tx.subscribe())
    }
}

// === impl Reader ===

impl<T> Reader<T> {
    /// Returns the current push context.
    ///
    /// Callers should read the context once per push and use it for every
    /// lookup in that push.
    pub fn current(&self) -> Arc<PushContext<T>> {
        self.0.borrow().clone()
    }

    /// Waits for a push context that has not yet been observed by this reader.
    ///
    /// Returns `None` once the writer has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<PushContext<T>>> {
        self.0.changed().await.ok()?;
        Some(self.0.borrow_and_update().clone())
    }
}

impl<T> Reader<T>
where
    T: Send + Sync + 'static,
{
    /// Streams the current push context and every subsequently published one.
    pub fn into_stream(self) -> impl Stream<Item = Arc<PushContext<T>>> + Send + 'static {
        WatchStream::new(self.0)
    }
}

impl<T> Clone for Reader<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
