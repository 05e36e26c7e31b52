//! Output sinks (C7, C8) and the mode-aware router between them (C10's
//! consumer side). Every sink — direct or bus — implements [`EventSink`] so
//! the finalize procedure never branches on which one it's holding.

pub mod bus_consumer;
pub mod bus_producer;
pub mod direct_writer;
pub mod routing;

pub use bus_consumer::BusConsumer;
pub use bus_producer::BusProducer;
pub use direct_writer::DirectWriter;
pub use routing::RoutingSink;

use async_trait::async_trait;

use crate::event::WideEvent;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: WideEvent, summary: String) -> anyhow::Result<()>;
}
