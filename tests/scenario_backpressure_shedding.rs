//! §8 scenario 6: backpressure shedding.
//!
//! Holds 500 finalize calls inside the sink at once (a gated fake that only
//! returns once released) so the 501st concurrent call observes
//! `maxPendingFinalizes` already exhausted and is dropped rather than queued.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use eventline::context::LoggingContext;
use eventline::event::{Performance, WideEvent};
use eventline::finalize::{FinalizeCoordinator, FinalizeOutcome};
use eventline::sampling::SamplingPolicy;
use eventline::sinks::EventSink;

const MAX_PENDING: usize = 500;

struct GatedSink {
    started: AtomicUsize,
    gate: Notify,
}

impl GatedSink {
    fn new() -> Arc<GatedSink> {
        Arc::new(GatedSink {
            started: AtomicUsize::new(0),
            gate: Notify::new(),
        })
    }

    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for GatedSink {
    async fn deliver(&self, _event: WideEvent, _summary: String) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(())
    }
}

#[tokio::test]
async fn the_501st_concurrent_finalize_is_dropped() {
    let sink = GatedSink::new();
    let finalize = Arc::new(FinalizeCoordinator::new(
        2000,
        MAX_PENDING,
        SamplingPolicy::new(1.0, 2000, vec![]),
        sink.clone() as Arc<dyn EventSink>,
    ));

    let mut handles = Vec::new();
    for i in 0..MAX_PENDING {
        let finalize = finalize.clone();
        handles.push(tokio::spawn(async move {
            let context = LoggingContext::new(
                format!("req-{i}"),
                "payments".to_string(),
                "POST /payments".to_string(),
            );
            context.add_performance(Performance { duration_ms: 10 });
            finalize.finalize(&context).await
        }));
    }

    while sink.started() < MAX_PENDING {
        tokio::task::yield_now().await;
    }

    let overflow_context = LoggingContext::new(
        "req-overflow".to_string(),
        "payments".to_string(),
        "POST /payments".to_string(),
    );
    overflow_context.add_performance(Performance { duration_ms: 10 });
    let overflow_outcome = finalize.finalize(&overflow_context).await;
    assert_eq!(overflow_outcome, FinalizeOutcome::Dropped);
    assert_eq!(finalize.drop_count(), 1);

    sink.gate.notify_waiters();
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, FinalizeOutcome::Recorded(_)));
    }
}
