//! The storage boundary (§6 "Store layout"). Building an actual persistent
//! store is out of scope; what the direct writer and bus consumer need is a
//! concrete trait they can both flush batches into, plus a reference
//! implementation exercised by tests.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::event::WideEvent;

/// A finalized event as it is handed to a store: the event itself plus the
/// `_summary` and `_metadata` fields the store layout adds on top.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoredEvent {
    #[serde(flatten)]
    pub event: WideEvent,
    #[serde(rename = "_summary")]
    pub summary: String,
    #[serde(rename = "_metadata")]
    pub metadata: Map<String, Value>,
}

impl StoredEvent {
    pub fn new(event: WideEvent, summary: String) -> Self {
        let metadata = event.metadata.clone();
        StoredEvent {
            event,
            summary,
            metadata,
        }
    }
}

#[async_trait]
pub trait PrimaryStore: Send + Sync {
    async fn append_batch(&self, events: Vec<StoredEvent>) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// Reference `PrimaryStore` used by tests and by embedders bootstrapping
/// before they've wired a real store.
pub struct InMemoryStore {
    events: std::sync::Mutex<Vec<StoredEvent>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> Vec<StoredEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrimaryStore for InMemoryStore {
    async fn append_batch(&self, events: Vec<StoredEvent>) -> anyhow::Result<()> {
        self.events.lock().unwrap().extend(events);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Performance;
    use time::OffsetDateTime;

    fn sample() -> StoredEvent {
        let event = WideEvent {
            request_id: "req-1".to_string(),
            timestamp: OffsetDateTime::UNIX_EPOCH,
            service: "payments".to_string(),
            route: "POST /payments".to_string(),
            user: None,
            error: None,
            performance: Some(Performance { duration_ms: 12 }),
            metadata: Map::new(),
        };
        StoredEvent::new(event, "narrative\n\ncanonical".to_string())
    }

    #[tokio::test]
    async fn append_batch_accumulates_across_calls() {
        let store = InMemoryStore::new();
        store.append_batch(vec![sample()]).await.unwrap();
        store.append_batch(vec![sample()]).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let store = InMemoryStore::new();
        store.close().await.unwrap();
        store.close().await.unwrap();
    }
}
