//! Bus consumer (C9): created on a BUS transition, destroyed (not paused) on
//! a DIRECT transition (P8). Fetches messages, batches them by size or
//! timeout, and hands the batch off to the direct writer for the actual
//! store write — the consumer itself never touches the store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use tokio_util::sync::CancellationToken;

use crate::mode::ModeStateMachine;
use crate::sinks::DirectWriter;
use crate::store::StoredEvent;
use crate::wire::BusMessage;

/// Owns the fetch task. Dropping a `BusConsumer` without calling [`stop`]
/// leaves the task running detached; callers should always `stop` it on a
/// DIRECT transition so no fetcher survives past the transition (P8).
pub struct BusConsumer {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl BusConsumer {
    pub fn spawn(
        broker_address: &str,
        topic: &str,
        group_id: &str,
        batch_size: usize,
        batch_timeout: Duration,
        direct_writer: Arc<DirectWriter>,
        mode: Arc<ModeStateMachine>,
    ) -> anyhow::Result<BusConsumer> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", broker_address)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()
            .context("failed to construct bus consumer client")?;
        consumer
            .subscribe(&[topic])
            .context("failed to subscribe to bus topic")?;

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(run_consumer_loop(
            consumer,
            batch_size,
            batch_timeout,
            direct_writer,
            mode,
            task_cancel,
        ));

        Ok(BusConsumer { cancel, handle })
    }

    /// Stops fetching, flushes the in-memory batch (via the consumer loop's
    /// own drain-on-cancel path), and waits for the task to exit, racing a
    /// timeout the way the shutdown coordinator races every drain step.
    #[tracing::instrument(skip(self))]
    pub async fn stop(self, timeout: Duration) {
        self.cancel.cancel();
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(())) => tracing::debug!("bus consumer stopped"),
            Ok(Err(error)) => tracing::error!(%error, "bus consumer task panicked while stopping"),
            Err(_) => tracing::warn!("bus consumer stop deadline elapsed, abandoning task"),
        }
    }
}

#[tracing::instrument(skip(consumer, direct_writer, mode, cancel))]
async fn run_consumer_loop(
    consumer: StreamConsumer,
    batch_size: usize,
    batch_timeout: Duration,
    direct_writer: Arc<DirectWriter>,
    mode: Arc<ModeStateMachine>,
    cancel: CancellationToken,
) {
    let mut batch: Vec<StoredEvent> = Vec::new();
    let mut ticker = tokio::time::interval(batch_timeout);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                flush_batch(&direct_writer, &mut batch);
                return;
            }
            received = consumer.recv() => {
                match received {
                    Ok(borrowed) => {
                        if let Some(payload) = borrowed.payload() {
                            match serde_json::from_slice::<BusMessage>(payload) {
                                Ok(parsed) => batch.push(StoredEvent::new(parsed.event, parsed.summary)),
                                Err(error) => tracing::warn!(%error, "failed to parse bus message payload"),
                            }
                        }
                        if batch.len() >= batch_size {
                            flush_batch(&direct_writer, &mut batch);
                        }
                    }
                    Err(error) => {
                        tracing::error!(%error, "bus consumer runtime error");
                        mode.record_consumer_error();
                    }
                }
            }
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush_batch(&direct_writer, &mut batch);
                }
            }
        }
    }
}

fn flush_batch(direct_writer: &Arc<DirectWriter>, batch: &mut Vec<StoredEvent>) {
    if batch.is_empty() {
        return;
    }
    for stored in std::mem::take(batch) {
        if let Err(error) = direct_writer.append(stored) {
            tracing::error!(%error, "consumer batch handoff to direct writer failed");
        }
    }
}
