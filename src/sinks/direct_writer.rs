//! Direct writer (C7): a buffered batch writer to the primary store. Built as
//! a dedicated task fed by an unbounded channel and driven by
//! `tokio::select!` over "new event" and "flush timer", the same shape
//! `dekaf::log_appender`'s forwarder loop uses for its own batching.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::event::WideEvent;
use crate::sinks::EventSink;
use crate::store::{PrimaryStore, StoredEvent};

enum WriterMessage {
    Append(StoredEvent),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the running writer task. Cheap to clone-share via `Arc`; the
/// actual buffer lives on the spawned task, never shared across threads.
pub struct DirectWriter {
    tx: mpsc::UnboundedSender<WriterMessage>,
}

impl DirectWriter {
    pub fn spawn(
        store: Arc<dyn PrimaryStore>,
        batch_size: usize,
        flush_interval: Duration,
        drain_timeout: Duration,
    ) -> Arc<DirectWriter> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer_loop(store, rx, batch_size, flush_interval, drain_timeout));
        Arc::new(DirectWriter { tx })
    }

    pub fn append(&self, stored: StoredEvent) -> anyhow::Result<()> {
        self.tx
            .send(WriterMessage::Append(stored))
            .map_err(|_| anyhow::anyhow!("direct writer task has stopped"))
    }

    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriterMessage::Shutdown(ack_tx))
            .map_err(|_| anyhow::anyhow!("direct writer task has already stopped"))?;
        ack_rx.await.context("direct writer did not acknowledge shutdown")?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for DirectWriter {
    async fn deliver(&self, event: WideEvent, summary: String) -> anyhow::Result<()> {
        self.append(StoredEvent::new(event, summary))
    }
}

#[tracing::instrument(skip(store, rx))]
async fn run_writer_loop(
    store: Arc<dyn PrimaryStore>,
    mut rx: mpsc::UnboundedReceiver<WriterMessage>,
    batch_size: usize,
    flush_interval: Duration,
    drain_timeout: Duration,
) {
    let mut buffer: Vec<StoredEvent> = Vec::new();
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            message = rx.recv() => {
                match message {
                    Some(WriterMessage::Append(event)) => {
                        buffer.push(event);
                        if buffer.len() >= batch_size {
                            flush(&store, &mut buffer).await;
                        }
                    }
                    Some(WriterMessage::Shutdown(ack)) => {
                        let drain = flush(&store, &mut buffer);
                        if tokio::time::timeout(drain_timeout, drain).await.is_err() {
                            tracing::warn!(remaining = buffer.len(), "direct writer drain deadline elapsed");
                        }
                        if let Err(error) = store.close().await {
                            tracing::error!(%error, "primary store close failed");
                        }
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        tracing::debug!("direct writer channel closed without shutdown message");
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush(&store, &mut buffer).await;
                }
            }
        }
    }
}

async fn flush(store: &Arc<dyn PrimaryStore>, buffer: &mut Vec<StoredEvent>) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);
    let count = batch.len();
    if let Err(error) = store.append_batch(batch).await {
        tracing::error!(%error, count, "direct writer batch flush failed");
    }
}
