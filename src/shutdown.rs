//! Shutdown coordinator (C12): the ordered drain from §4.12, each step
//! racing its own timeout the way `task_manager`'s `TASK_TIMEOUT`-bounded
//! teardown does.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::sinks::{BusProducer, DirectWriter};

pub struct ShutdownCoordinator {
    intake_cancel: CancellationToken,
    consumer_cancel: CancellationToken,
    direct_writer: Arc<DirectWriter>,
    bus_producer: Option<Arc<BusProducer>>,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(
        intake_cancel: CancellationToken,
        consumer_cancel: CancellationToken,
        direct_writer: Arc<DirectWriter>,
        bus_producer: Option<Arc<BusProducer>>,
        drain_timeout: Duration,
    ) -> ShutdownCoordinator {
        ShutdownCoordinator {
            intake_cancel,
            consumer_cancel,
            direct_writer,
            bus_producer,
            drain_timeout,
        }
    }

    /// Runs the five-step drain. `consumer_supervisor` is the join handle of
    /// the task that owns the currently-running bus consumer, if any — it is
    /// expected to react to `consumer_cancel` by stopping its consumer and
    /// flushing its batch to the direct writer before returning.
    #[tracing::instrument(skip(self, consumer_supervisor))]
    pub async fn shutdown(&self, consumer_supervisor: Option<tokio::task::JoinHandle<()>>) {
        tracing::info!("shutdown: step 1, stopping new intercepts");
        self.intake_cancel.cancel();

        tracing::info!("shutdown: step 2, stopping consumer and flushing its batch");
        self.consumer_cancel.cancel();
        if let Some(handle) = consumer_supervisor {
            if tokio::time::timeout(self.drain_timeout, handle).await.is_err() {
                tracing::warn!("consumer supervisor did not stop within the drain deadline");
            }
        }

        tracing::info!("shutdown: step 3, flushing direct writer");
        if let Err(error) = self.direct_writer.shutdown().await {
            tracing::error!(%error, "direct writer shutdown failed");
        }

        tracing::info!("shutdown: step 4, disconnecting producer");
        if let Some(producer) = &self.bus_producer {
            if let Err(error) = producer.shutdown(self.drain_timeout).await {
                tracing::error!(%error, "bus producer shutdown failed");
            }
        }

        tracing::info!("shutdown complete");
    }

    pub fn intake_cancel_token(&self) -> CancellationToken {
        self.intake_cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn shutdown_drains_direct_writer_and_cancels_intake() {
        let store = Arc::new(InMemoryStore::new());
        let writer = DirectWriter::spawn(store.clone(), 50, Duration::from_secs(60), Duration::from_secs(5));
        let intake_cancel = CancellationToken::new();
        let consumer_cancel = CancellationToken::new();
        let coordinator = ShutdownCoordinator::new(
            intake_cancel.clone(),
            consumer_cancel.clone(),
            writer,
            None,
            Duration::from_secs(5),
        );

        coordinator.shutdown(None).await;

        assert!(intake_cancel.is_cancelled());
        assert!(consumer_cancel.is_cancelled());
    }
}
