//! Shared fixtures for the end-to-end scenario tests (§8), mirroring the
//! `dekaf/tests/e2e/harness.rs` shape: one module, reused across every
//! scenario file via `mod support;`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use eventline::event::WideEvent;
use eventline::finalize::FinalizeCoordinator;
use eventline::handler_meta::HandlerMetadataRegistry;
use eventline::interceptor::Interceptor;
use eventline::sampling::SamplingPolicy;
use eventline::sinks::{DirectWriter, EventSink};
use eventline::store::InMemoryStore;

/// A direct-writer-backed interceptor with no bus — the shape most scenario
/// tests need, since the bus itself would require a live broker to exercise
/// `BusProducer`/`BusConsumer` for real.
pub fn direct_interceptor(sampling: SamplingPolicy) -> (Interceptor, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    // batch_size 1: every finalize flushes immediately, so scenario tests can
    // assert on the store right after a `yield_now` without racing the timer.
    let writer = DirectWriter::spawn(store.clone(), 1, Duration::from_secs(60), Duration::from_secs(5));
    let finalize = Arc::new(FinalizeCoordinator::new(2000, 500, sampling, writer));
    let registry = Arc::new(HandlerMetadataRegistry::new());
    let interceptor = Interceptor::new(registry, finalize, "payments", None, true);
    (interceptor, store)
}

pub fn interceptor_with_finalize(sampling: SamplingPolicy) -> (Interceptor, Arc<FinalizeCoordinator>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let writer = DirectWriter::spawn(store.clone(), 1, Duration::from_secs(60), Duration::from_secs(5));
    let finalize = Arc::new(FinalizeCoordinator::new(2000, 500, sampling, writer));
    let registry = Arc::new(HandlerMetadataRegistry::new());
    let interceptor = Interceptor::new(registry, finalize.clone(), "payments", None, true);
    (interceptor, finalize, store)
}

/// A bus stand-in that can be told to fail its next N publishes, used to
/// exercise the routing/failover logic without a live broker.
pub struct FakeBus {
    publish_calls: AtomicUsize,
    fail_next: AtomicBool,
    delivered: Mutex<Vec<WideEvent>>,
}

impl FakeBus {
    pub fn new() -> Arc<FakeBus> {
        Arc::new(FakeBus {
            publish_calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_next_publish(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn publish_count(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<WideEvent> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for FakeBus {
    async fn deliver(&self, event: WideEvent, _summary: String) -> anyhow::Result<()> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("simulated broker outage");
        }
        self.delivered.lock().unwrap().push(event);
        Ok(())
    }
}
