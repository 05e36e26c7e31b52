//! Finalize cache + backpressure (C11) and the finalize procedure (§4.7)
//! that ties sampling, dedup, and sink dispatch together. This is the one
//! place the interceptor hands a completed request off to the rest of the
//! pipeline.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::context::LoggingContext;
use crate::event::{build_summary, WideEvent};
use crate::sampling::{SamplingInput, SamplingPolicy, SamplingReason};
use crate::sinks::EventSink;

/// The observable result of one finalize call, mainly useful for tests and
/// for metrics; the interceptor itself doesn't need to branch on this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Deduped,
    Dropped,
    NotSampled(SamplingReason),
    Recorded(SamplingReason),
    SinkError,
}

/// Decrements the inflight counter on every exit path, mirroring the
/// "incremented before the sink call, decremented after" contract in C11
/// without needing a decrement at each early return.
struct InflightGuard<'a>(&'a AtomicUsize);

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FinalizeCoordinator {
    dedup: Mutex<LruCache<String, ()>>,
    inflight: AtomicUsize,
    max_pending: usize,
    drop_count: AtomicU64,
    sampling: SamplingPolicy,
    sink: Arc<dyn EventSink>,
}

impl FinalizeCoordinator {
    pub fn new(
        dedup_cache_size: usize,
        max_pending_finalizes: usize,
        sampling: SamplingPolicy,
        sink: Arc<dyn EventSink>,
    ) -> FinalizeCoordinator {
        let cap = NonZeroUsize::new(dedup_cache_size.max(1)).unwrap();
        FinalizeCoordinator {
            dedup: Mutex::new(LruCache::new(cap)),
            inflight: AtomicUsize::new(0),
            max_pending: max_pending_finalizes,
            drop_count: AtomicU64::new(0),
            sampling,
            sink,
        }
    }

    pub fn drop_count(&self) -> u64 {
        self.drop_count.load(Ordering::SeqCst)
    }

    /// Runs §4.7 end to end for one context. The caller is responsible for
    /// checking that a context exists at all (step 0, "context absent") —
    /// this method always assumes one is present.
    #[tracing::instrument(skip(self, context), fields(request_id = %context.request_id))]
    pub async fn finalize(&self, context: &LoggingContext) -> FinalizeOutcome {
        let request_id = context.request_id.clone();

        {
            let mut dedup = self.dedup.lock().unwrap();
            if dedup.contains(&request_id) {
                tracing::debug!("dedup hit, skipping finalize");
                return FinalizeOutcome::Deduped;
            }
            dedup.put(request_id.clone(), ());
        }

        let inflight = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        if inflight > self.max_pending {
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            let drops = self.drop_count.fetch_add(1, Ordering::SeqCst) + 1;
            if drops % 100 == 1 {
                tracing::warn!(drops, "finalize backpressure: dropping event");
            }
            return FinalizeOutcome::Dropped;
        }
        let _guard = InflightGuard(&self.inflight);

        let snapshot = context.snapshot();
        let duration_ms = snapshot.performance.map(|p| p.duration_ms);
        let decision = self.sampling.should_record(SamplingInput {
            has_error: snapshot.error.is_some(),
            duration_ms,
            route: &snapshot.route,
        });

        if !decision.should_record {
            tracing::debug!(reason = decision.reason.as_str(), "not sampled");
            return FinalizeOutcome::NotSampled(decision.reason);
        }

        let mut metadata = snapshot.metadata;
        metadata.insert(
            "_sampling".to_string(),
            serde_json::json!({ "recorded": true, "reason": decision.reason.as_str() }),
        );

        let event = WideEvent {
            request_id: snapshot.request_id,
            timestamp: snapshot.timestamp,
            service: snapshot.service,
            route: snapshot.route,
            user: snapshot.user,
            error: snapshot.error,
            performance: snapshot.performance,
            metadata,
        };
        let summary = build_summary(&event);

        if let Err(error) = self.sink.deliver(event, summary).await {
            tracing::error!(%error, "sink delivery failed during finalize");
            return FinalizeOutcome::SinkError;
        }

        FinalizeOutcome::Recorded(decision.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Performance;
    use crate::sinks::DirectWriter;
    use crate::store::InMemoryStore;
    use std::time::Duration;

    fn ctx(request_id: &str) -> Arc<LoggingContext> {
        LoggingContext::new(request_id.to_string(), "payments".to_string(), "POST /payments".to_string())
    }

    fn coordinator(sampling: SamplingPolicy) -> (FinalizeCoordinator, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let writer = DirectWriter::spawn(store.clone(), 1, Duration::from_secs(60), Duration::from_secs(5));
        let coordinator = FinalizeCoordinator::new(2000, 500, sampling, writer);
        (coordinator, store)
    }

    #[tokio::test]
    async fn records_critical_route_regardless_of_rate() {
        let (coordinator, store) = coordinator(SamplingPolicy::new(0.0, 2000, vec!["POST /payments".to_string()]));
        let context = ctx("req-1");
        context.add_performance(Performance { duration_ms: 10 });
        let outcome = coordinator.finalize(&context).await;
        assert_eq!(outcome, FinalizeOutcome::Recorded(SamplingReason::CriticalRoute));
        tokio::task::yield_now().await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn second_finalize_for_same_request_id_is_deduped() {
        let (coordinator, _store) = coordinator(SamplingPolicy::new(1.0, 2000, vec![]));
        let context = ctx("req-1");
        context.add_performance(Performance { duration_ms: 10 });
        assert!(matches!(coordinator.finalize(&context).await, FinalizeOutcome::Recorded(_)));
        assert_eq!(coordinator.finalize(&context).await, FinalizeOutcome::Deduped);
    }

    #[tokio::test]
    async fn not_sampled_requests_are_not_recorded() {
        let (coordinator, store) = coordinator(SamplingPolicy::new(0.0, 2000, vec![]));
        let context = ctx("req-1");
        context.add_performance(Performance { duration_ms: 10 });
        let outcome = coordinator.finalize(&context).await;
        assert_eq!(outcome, FinalizeOutcome::NotSampled(SamplingReason::NotSampled));
        tokio::task::yield_now().await;
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn backpressure_sheds_events_past_max_pending() {
        let store = Arc::new(InMemoryStore::new());
        let writer = DirectWriter::spawn(store.clone(), 50, Duration::from_secs(60), Duration::from_secs(5));
        let coordinator = FinalizeCoordinator::new(2000, 0, SamplingPolicy::new(1.0, 2000, vec![]), writer);
        let context = ctx("req-1");
        context.add_performance(Performance { duration_ms: 10 });
        let outcome = coordinator.finalize(&context).await;
        assert_eq!(outcome, FinalizeOutcome::Dropped);
        assert_eq!(coordinator.drop_count(), 1);
    }

    #[tokio::test]
    async fn errors_are_always_recorded_even_at_zero_sampling_rate() {
        let (coordinator, _store) = coordinator(SamplingPolicy::new(0.0, 2000, vec![]));
        let context = ctx("req-1");
        context.add_performance(Performance { duration_ms: 10 });
        context.add_error(crate::error_normalize::NormalizedError {
            code: "UNAUTHORIZED".to_string(),
            message: "bad creds".to_string(),
            meta: serde_json::Map::new(),
        });
        let outcome = coordinator.finalize(&context).await;
        assert_eq!(outcome, FinalizeOutcome::Recorded(SamplingReason::HasError));
    }
}
