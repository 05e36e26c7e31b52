//! §8 scenario 3: slow request.
//!
//! Duration is injected directly on the context rather than produced by an
//! actual sleep: the interceptor measures elapsed wall-clock time via
//! `time::OffsetDateTime`, which a paused `tokio` clock does not affect, so
//! the realistic way to exercise the slow-request path is the same one
//! `finalize`'s own unit tests use — build a context, attach a `Performance`,
//! finalize it directly.

use std::sync::Arc;
use std::time::Duration;

use eventline::context::LoggingContext;
use eventline::event::{LatencyBucket, Outcome, Performance};
use eventline::finalize::FinalizeCoordinator;
use eventline::finalize::FinalizeOutcome;
use eventline::sampling::{SamplingPolicy, SamplingReason};
use eventline::sinks::DirectWriter;
use eventline::store::InMemoryStore;

#[tokio::test]
async fn slow_request_is_recorded_as_warning_with_over_1000ms_bucket() {
    let store = Arc::new(InMemoryStore::new());
    let writer = DirectWriter::spawn(store.clone(), 1, Duration::from_secs(60), Duration::from_secs(5));
    let sampling = SamplingPolicy::new(0.0, 2000, vec![]);
    let finalize = FinalizeCoordinator::new(2000, 500, sampling, writer);

    let context = LoggingContext::new(
        "req-slow".to_string(),
        "reports".to_string(),
        "GET /reports".to_string(),
    );
    context.add_performance(Performance { duration_ms: 2500 });

    let outcome = finalize.finalize(&context).await;
    assert_eq!(outcome, FinalizeOutcome::Recorded(SamplingReason::SlowRequest));

    tokio::task::yield_now().await;
    assert_eq!(store.len(), 1);
    let stored = &store.snapshot()[0];
    assert_eq!(stored.event.outcome(), Outcome::Warning);
    assert_eq!(stored.event.latency_bucket(), LatencyBucket::Over1000);
    assert!(stored.summary.contains("LatencyBucket: P_OVER_1000MS"));
}
