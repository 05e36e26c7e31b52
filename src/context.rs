//! Context store (C1): the per-request ambient value that survives async
//! hops. Built on `tokio::task_local!`, the same first-class facility the
//! teacher's own test harness uses to propagate a per-session log forwarder
//! across spans (`dekaf::log_appender::TaskForwarder` is scoped the same way).
//!
//! A single [`LoggingContext`] exists per request; it is an `Arc` around a
//! `std::sync::Mutex`-guarded inner state, which keeps mutation cheap and
//! lock-free across await points (the lock is held only for the duration of
//! a field write, never across an `.await`).

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::error_normalize::NormalizedError;
use crate::event::{Performance, UserInfo};

tokio::task_local! {
    static CURRENT: Arc<LoggingContext>;
}

#[derive(Debug)]
struct Inner {
    service: String,
    user: Option<UserInfo>,
    error: Option<NormalizedError>,
    performance: Option<Performance>,
    metadata: Map<String, Value>,
    summary: Option<String>,
}

/// The mutable surface handlers and the interceptor observe during a request.
#[derive(Debug)]
pub struct LoggingContext {
    pub request_id: String,
    pub timestamp: OffsetDateTime,
    pub route: String,
    inner: Mutex<Inner>,
}

/// An immutable point-in-time read of a context's fields, used to build a
/// [`crate::event::WideEvent`] at finalize.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub request_id: String,
    pub timestamp: OffsetDateTime,
    pub service: String,
    pub route: String,
    pub user: Option<UserInfo>,
    pub error: Option<NormalizedError>,
    pub performance: Option<Performance>,
    pub metadata: Map<String, Value>,
}

impl LoggingContext {
    pub fn new(request_id: String, service: String, route: String) -> Arc<LoggingContext> {
        Arc::new(LoggingContext {
            request_id,
            timestamp: OffsetDateTime::now_utc(),
            route,
            inner: Mutex::new(Inner {
                service,
                user: None,
                error: None,
                performance: None,
                metadata: Map::new(),
                summary: None,
            }),
        })
    }

    pub fn set_service(&self, service: impl Into<String>) {
        self.inner.lock().unwrap().service = service.into();
    }

    pub fn add_user(&self, user: UserInfo) {
        self.inner.lock().unwrap().user = Some(user);
    }

    pub fn add_error(&self, error: NormalizedError) {
        self.inner.lock().unwrap().error = Some(error);
    }

    pub fn add_performance(&self, performance: Performance) {
        self.inner.lock().unwrap().performance = Some(performance);
    }

    pub fn merge_metadata(&self, entries: impl IntoIterator<Item = (String, Value)>) {
        let mut inner = self.inner.lock().unwrap();
        for (key, value) in entries {
            inner.metadata.insert(key, value);
        }
    }

    pub fn set_summary(&self, summary: String) {
        self.inner.lock().unwrap().summary = Some(summary);
    }

    pub fn has_error(&self) -> bool {
        self.inner.lock().unwrap().error.is_some()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.inner.lock().unwrap().performance.map(|p| p.duration_ms)
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        let inner = self.inner.lock().unwrap();
        ContextSnapshot {
            request_id: self.request_id.clone(),
            timestamp: self.timestamp,
            service: inner.service.clone(),
            route: self.route.clone(),
            user: inner.user.clone(),
            error: inner.error.clone(),
            performance: inner.performance,
            metadata: inner.metadata.clone(),
        }
    }
}

/// Establishes `context` as the ambient value for the duration of `fut`,
/// including across any task spawned from within `fut` that re-propagates it
/// (spawned tasks must explicitly re-enter via [`run`] — `task_local!` does
/// not auto-propagate across `tokio::spawn`, matching Tokio's documented
/// contract).
pub async fn run<F, T>(context: Arc<LoggingContext>, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    CURRENT.scope(context, fut).await
}

/// Returns the context for the request currently executing on this task, or
/// `None` if called outside any [`run`] scope.
pub fn current() -> Option<Arc<LoggingContext>> {
    CURRENT.try_with(|ctx| ctx.clone()).ok()
}
