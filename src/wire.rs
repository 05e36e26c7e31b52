//! The bus wire format (§6 "Wire format (bus)"): a JSON envelope keyed by
//! `requestId`, published by the producer and parsed back by the consumer.

use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::event::WideEvent;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BusMessage {
    pub event: WideEvent,
    #[serde(rename = "_metadata")]
    pub metadata: Map<String, Value>,
    pub summary: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl BusMessage {
    pub fn new(event: WideEvent, summary: String) -> Self {
        let metadata = event.metadata.clone();
        let timestamp = event.timestamp;
        BusMessage {
            event,
            metadata,
            summary,
            timestamp,
        }
    }

    pub fn key(&self) -> &str {
        &self.event.request_id
    }
}
