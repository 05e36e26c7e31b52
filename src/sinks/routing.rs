//! Routes a finalized event to whichever sink C10 says is active (§4.7 step
//! 8, I7). A bus publish failure falls back to the direct writer for that
//! same event (no loss, scenario 4 in §8) and reports the failure to the
//! mode state machine so the next hot-path read already sees DIRECT.

use std::sync::Arc;

use async_trait::async_trait;

use crate::event::WideEvent;
use crate::mode::{Mode, ModeStateMachine};
use crate::sinks::EventSink;

/// The bus side is any `EventSink` (normally a `BusProducer`, but tests stand
/// in a fake bus so the routing/failover logic can be exercised without a
/// live broker) — `RoutingSink` only needs "publish, or tell me it failed".
pub struct RoutingSink {
    mode: Arc<ModeStateMachine>,
    direct: Arc<dyn EventSink>,
    bus: Option<Arc<dyn EventSink>>,
}

impl RoutingSink {
    pub fn new(
        mode: Arc<ModeStateMachine>,
        direct: Arc<dyn EventSink>,
        bus: Option<Arc<dyn EventSink>>,
    ) -> RoutingSink {
        RoutingSink { mode, direct, bus }
    }
}

#[async_trait]
impl EventSink for RoutingSink {
    async fn deliver(&self, event: WideEvent, summary: String) -> anyhow::Result<()> {
        if self.mode.current() == Mode::Bus {
            if let Some(bus) = &self.bus {
                match bus.deliver(event.clone(), summary.clone()).await {
                    Ok(()) => return Ok(()),
                    Err(error) => {
                        tracing::warn!(%error, "bus publish failed, falling back to direct writer");
                        self.mode.record_publish_failure();
                    }
                }
            }
        }
        self.direct.deliver(event, summary).await
    }
}
