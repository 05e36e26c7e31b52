//! Interceptor (C6): orchestrates C1-C5 around a single request. This is the
//! one piece of the pipeline a framework integration actually calls; it owns
//! no sink wiring of its own, only a [`FinalizeCoordinator`] handed to it at
//! construction.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::context::{self, LoggingContext};
use crate::error_normalize::{normalize_error, ErrorSource};
use crate::event::{Performance, UserInfo, UserRole};
use crate::finalize::FinalizeCoordinator;
use crate::handler_meta::{HandlerId, HandlerMetadata, HandlerMetadataRegistry, UserExtraction};
use crate::redact::{build_redact_set, extract_path, path_field_name, sanitize_value, REDACTION_TOKEN};
use crate::route::{normalize_route, RouteInput};

/// Everything the interception hook needs out of the inbound request,
/// decoupled from any particular HTTP framework's types (§6).
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    pub template_path: Option<String>,
    pub query: Option<String>,
    pub headers: Map<String, Value>,
    pub body: Option<Value>,
    pub params: Map<String, Value>,
    /// The framework's own authenticated-user object, if any, as consumed by
    /// `LogUserFromRequest`.
    pub user: Option<Value>,
}

impl RequestInfo {
    /// Returns the incoming `x-request-id` header if present.
    fn existing_request_id(&self) -> Option<String> {
        self.headers
            .get("x-request-id")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

pub struct Interceptor {
    registry: Arc<HandlerMetadataRegistry>,
    finalize: Arc<FinalizeCoordinator>,
    default_service: String,
    base_path: Option<String>,
    is_production: bool,
}

impl Interceptor {
    pub fn new(
        registry: Arc<HandlerMetadataRegistry>,
        finalize: Arc<FinalizeCoordinator>,
        default_service: impl Into<String>,
        base_path: Option<String>,
        is_production: bool,
    ) -> Interceptor {
        Interceptor {
            registry,
            finalize,
            default_service: default_service.into(),
            base_path,
            is_production,
        }
    }

    /// Runs the §4.5 procedure around `handler`. The handler's own error type
    /// is returned unchanged to the caller (the pipeline never raises its
    /// own errors to the framework) — the normalized form is only ever used
    /// internally, to build the recorded event.
    #[tracing::instrument(skip(self, resolve_metadata, request, handler))]
    pub async fn intercept<H, Fut, R>(
        &self,
        handler_id: HandlerId,
        resolve_metadata: impl FnOnce() -> HandlerMetadata,
        mut request: RequestInfo,
        handler: H,
    ) -> Result<R, ErrorSource>
    where
        H: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<R, ErrorSource>>,
        R: serde::Serialize,
    {
        let metadata = self.registry.get_or_resolve(handler_id, resolve_metadata);

        if metadata.no_log {
            return handler().await;
        }

        let request_id = request
            .existing_request_id()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        request
            .headers
            .insert("x-request-id".to_string(), Value::from(request_id.clone()));

        let service = metadata
            .service_override
            .clone()
            .unwrap_or_else(|| self.default_service.clone());
        let route = normalize_route(
            &RouteInput {
                method: &request.method,
                path: &request.path,
                template_path: request.template_path.as_deref(),
                query: request.query.as_deref(),
            },
            self.base_path.as_deref(),
        );

        let context = LoggingContext::new(request_id, service, route);
        self.extract_user(&context, &metadata, &request);
        self.extract_request_meta(&context, &metadata, &request);
        self.attach_sampling_hint(&context, &metadata);

        let outcome = context::run(context.clone(), handler()).await;

        if let Ok(value) = &outcome {
            self.extract_response_meta(&context, &metadata, value);
        }

        let duration_ms = (OffsetDateTime::now_utc() - context.timestamp)
            .whole_milliseconds()
            .max(0) as u64;
        context.add_performance(Performance { duration_ms });

        if let Err(source) = &outcome {
            let normalized = normalize_error(source, self.is_production);
            context.add_error(normalized);
        }

        self.finalize.finalize(&context).await;

        outcome
    }

    fn extract_user(&self, context: &LoggingContext, metadata: &HandlerMetadata, request: &RequestInfo) {
        match &metadata.user_extraction {
            UserExtraction::FromRequest => {
                if let Some(user) = request.user.as_ref().and_then(user_from_value) {
                    context.add_user(user);
                }
            }
            UserExtraction::Declared(config) => {
                let root = self.request_root(request);
                let id = extract_path(&root, &config.id_path).and_then(Value::as_str);
                let role = extract_path(&root, &config.role_path).and_then(Value::as_str);
                if let Some(id) = id {
                    context.add_user(UserInfo {
                        id: id.to_string(),
                        role: UserRole::parse(role.unwrap_or("")),
                    });
                }
            }
            UserExtraction::None => {}
        }
    }

    fn extract_request_meta(&self, context: &LoggingContext, metadata: &HandlerMetadata, request: &RequestInfo) {
        let Some(config) = &metadata.request_meta else {
            return;
        };
        let root = self.request_root(request);
        let redact_set = build_redact_set(metadata.redact_paths.iter().cloned());
        let entries = config.paths.iter().filter_map(|path| {
            let value = extract_path(&root, path)?;
            let field = path_field_name(path).to_string();
            let stored = if redact_set.contains(path) {
                Value::String(REDACTION_TOKEN.to_string())
            } else {
                sanitize_value(value, &config.limits)
            };
            Some((field, stored))
        });
        context.merge_metadata(entries);
    }

    fn extract_response_meta<R: serde::Serialize>(
        &self,
        context: &LoggingContext,
        metadata: &HandlerMetadata,
        response: &R,
    ) {
        let Some(config) = &metadata.response_meta else {
            return;
        };
        let root = serde_json::to_value(response).unwrap_or(Value::Null);
        let redact_set = build_redact_set(metadata.redact_paths.iter().cloned());
        let entries = config.paths.iter().filter_map(|path| {
            let value = extract_path(&root, path)?;
            let field = format!("response_{}", path_field_name(path));
            let stored = if redact_set.contains(path) {
                Value::String(REDACTION_TOKEN.to_string())
            } else {
                sanitize_value(value, &config.limits)
            };
            Some((field, stored))
        });
        context.merge_metadata(entries);
    }

    fn attach_sampling_hint(&self, context: &LoggingContext, metadata: &HandlerMetadata) {
        if let Some(hint) = metadata.sampling_hint {
            context.merge_metadata([("_samplingHint".to_string(), json!(format!("{hint:?}").to_uppercase()))]);
        }
    }

    fn request_root(&self, request: &RequestInfo) -> Value {
        json!({
            "body": request.body,
            "headers": request.headers,
            "params": request.params,
            "query": request.query,
        })
    }
}

fn user_from_value(value: &Value) -> Option<UserInfo> {
    let id = value.get("id")?.as_str()?.to_string();
    let role = value
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or("");
    Some(UserInfo {
        id,
        role: UserRole::parse(role),
    })
}
