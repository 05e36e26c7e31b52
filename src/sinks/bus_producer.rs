//! Bus producer (C8): publishes `BusMessage`s to the message bus, keyed by
//! `requestId`. Built on `rdkafka::producer::FutureProducer`, the client the
//! rest of this workspace already depends on for talking to a broker.
//!
//! Reconnection is owned by the mode watchdog (C10), not by retry loops in
//! here — a publish either succeeds or it fails and the caller switches mode.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use crate::event::WideEvent;
use crate::sinks::EventSink;
use crate::wire::BusMessage;

pub struct BusProducer {
    producer: FutureProducer,
    topic: String,
    connected: AtomicBool,
    send_timeout: Duration,
}

impl BusProducer {
    pub fn connect(
        broker_address: &str,
        topic: impl Into<String>,
        send_timeout: Duration,
    ) -> anyhow::Result<BusProducer> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", broker_address)
            .set("message.timeout.ms", send_timeout.as_millis().to_string())
            .create()
            .context("failed to construct bus producer client")?;
        Ok(BusProducer {
            producer,
            topic: topic.into(),
            connected: AtomicBool::new(false),
            send_timeout,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    #[tracing::instrument(skip(self, event, summary), fields(request_id = %event.request_id))]
    pub async fn publish(&self, event: WideEvent, summary: String) -> anyhow::Result<()> {
        let message = BusMessage::new(event, summary);
        let payload = serde_json::to_vec(&message).context("failed to serialize bus message")?;
        let key = message.key().to_string();
        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        match self.producer.send(record, Timeout::After(self.send_timeout)).await {
            Ok(_delivery) => {
                self.connected.store(true, Ordering::Release);
                Ok(())
            }
            Err((error, _owned_message)) => {
                self.connected.store(false, Ordering::Release);
                tracing::warn!(%error, "bus publish failed");
                Err(anyhow::anyhow!(error.to_string())).context("bus publish failed")
            }
        }
    }

    /// Drains pending deliveries, then the handle can simply be dropped —
    /// `rdkafka` disconnects the underlying client on drop.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self, timeout: Duration) -> anyhow::Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .context("producer flush task panicked")?
            .context("producer flush failed")?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for BusProducer {
    async fn deliver(&self, event: WideEvent, summary: String) -> anyhow::Result<()> {
        self.publish(event, summary).await
    }
}
