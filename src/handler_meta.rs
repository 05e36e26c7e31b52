//! Declarative enrichment (§6 "Handler metadata"): the source framework's
//! annotations (`@NoLog`, `@Service(...)`, ...) become a plain configuration
//! struct resolved once per handler and cached by handler identity, so the
//! interceptor never re-parses annotations on the hot path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::redact::SanitizeLimits;

/// Opaque identity of a registered handler (controller + method), however the
/// embedding framework chooses to derive it — a function pointer address, a
/// route id, whatever is stable across requests to the same handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SamplingHint {
    Critical,
    Important,
    Normal,
    Low,
}

#[derive(Debug, Clone)]
pub struct UserConfig {
    pub id_path: String,
    pub role_path: String,
}

#[derive(Debug, Clone)]
pub enum UserExtraction {
    /// `LogUser{idPath, rolePath}`.
    Declared(UserConfig),
    /// `LogUserFromRequest`: read `request.user` directly.
    FromRequest,
    /// No annotation present.
    None,
}

#[derive(Debug, Clone)]
pub struct MetaPathConfig {
    pub paths: Vec<String>,
    pub limits: SanitizeLimits,
}

/// The resolved, cached configuration for one handler.
#[derive(Debug, Clone)]
pub struct HandlerMetadata {
    pub no_log: bool,
    pub service_override: Option<String>,
    pub user_extraction: UserExtraction,
    pub request_meta: Option<MetaPathConfig>,
    pub response_meta: Option<MetaPathConfig>,
    pub redact_paths: Vec<String>,
    pub sampling_hint: Option<SamplingHint>,
}

impl Default for HandlerMetadata {
    fn default() -> Self {
        HandlerMetadata {
            no_log: false,
            service_override: None,
            user_extraction: UserExtraction::None,
            request_meta: None,
            response_meta: None,
            redact_paths: Vec::new(),
            sampling_hint: None,
        }
    }
}

/// Resolves and memoizes [`HandlerMetadata`] by [`HandlerId`]. Built once per
/// process and shared by the interceptor; resolution only ever runs once per
/// handler, on first sight.
pub struct HandlerMetadataRegistry {
    cache: Mutex<HashMap<HandlerId, Arc<HandlerMetadata>>>,
}

impl HandlerMetadataRegistry {
    pub fn new() -> Self {
        HandlerMetadataRegistry {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached metadata for `id`, resolving it with `resolve` on
    /// first sight and caching the result for every subsequent call.
    pub fn get_or_resolve(
        &self,
        id: HandlerId,
        resolve: impl FnOnce() -> HandlerMetadata,
    ) -> Arc<HandlerMetadata> {
        let mut cache = self.cache.lock().unwrap();
        cache
            .entry(id)
            .or_insert_with(|| Arc::new(resolve()))
            .clone()
    }
}

impl Default for HandlerMetadataRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_only_runs_once_per_handler() {
        let registry = HandlerMetadataRegistry::new();
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let id = HandlerId(1);

        for _ in 0..5 {
            registry.get_or_resolve(id, || {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                HandlerMetadata {
                    no_log: true,
                    ..Default::default()
                }
            });
        }

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn different_handlers_resolve_independently() {
        let registry = HandlerMetadataRegistry::new();
        let a = registry.get_or_resolve(HandlerId(1), || HandlerMetadata {
            service_override: Some("a".to_string()),
            ..Default::default()
        });
        let b = registry.get_or_resolve(HandlerId(2), || HandlerMetadata {
            service_override: Some("b".to_string()),
            ..Default::default()
        });
        assert_eq!(a.service_override.as_deref(), Some("a"));
        assert_eq!(b.service_override.as_deref(), Some("b"));
    }
}
