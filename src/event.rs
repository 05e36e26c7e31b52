//! The Wide Event data model (C4): the canonical per-request record plus the
//! dual-layer summary text derived from it deterministically.

use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::error_normalize::NormalizedError;

const MAX_ROLE_STR_LEN: usize = 64;

/// Known user roles. Anything the caller supplies that doesn't parse into one
/// of these folds to [`UserRole::Guest`] (I4's "unknown values fold to GUEST").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Guest,
    Member,
    Premium,
    Admin,
}

impl UserRole {
    pub fn parse(raw: &str) -> UserRole {
        if raw.len() > MAX_ROLE_STR_LEN {
            return UserRole::Guest;
        }
        match raw.to_uppercase().as_str() {
            "MEMBER" => UserRole::Member,
            "PREMIUM" => UserRole::Premium,
            "ADMIN" => UserRole::Admin,
            "GUEST" => UserRole::Guest,
            _ => UserRole::Guest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Guest => "GUEST",
            UserRole::Member => "MEMBER",
            UserRole::Premium => "PREMIUM",
            UserRole::Admin => "ADMIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Performance {
    pub duration_ms: u64,
}

/// Ordered latency buckets used by the canonical summary line. Order matters
/// only for readability; bucket assignment is by range, not comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LatencyBucket {
    Sub50,
    Between50And200,
    Between200And500,
    Between500And1000,
    Over1000,
    Unknown,
}

impl LatencyBucket {
    pub fn for_duration_ms(duration_ms: Option<u64>) -> LatencyBucket {
        let Some(ms) = duration_ms else {
            return LatencyBucket::Unknown;
        };
        match ms {
            0..=49 => LatencyBucket::Sub50,
            50..=199 => LatencyBucket::Between50And200,
            200..=499 => LatencyBucket::Between200And500,
            500..=999 => LatencyBucket::Between500And1000,
            _ => LatencyBucket::Over1000,
        }
    }

    /// The token used in the canonical `Key: Value` summary line, e.g. `P_OVER_1000MS`.
    pub fn canonical_token(&self) -> &'static str {
        match self {
            LatencyBucket::Sub50 => "P_SUB_50MS",
            LatencyBucket::Between50And200 => "P_50_200MS",
            LatencyBucket::Between200And500 => "P_200_500MS",
            LatencyBucket::Between500And1000 => "P_500_1000MS",
            LatencyBucket::Over1000 => "P_OVER_1000MS",
            LatencyBucket::Unknown => "P_UNKNOWN",
        }
    }
}

/// The derived high-level outcome of a request, used by both the narrative
/// and canonical sections of the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Outcome {
    Failed,
    Warning,
    EdgeCase,
    Success,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Failed => "FAILED",
            Outcome::Warning => "WARNING",
            Outcome::EdgeCase => "EDGE_CASE",
            Outcome::Success => "SUCCESS",
        }
    }
}

/// The immutable per-request record handed to a sink. Built once, at finalize,
/// and never mutated afterward.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WideEvent {
    pub request_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub service: String,
    pub route: String,
    pub user: Option<UserInfo>,
    pub error: Option<NormalizedError>,
    pub performance: Option<Performance>,
    pub metadata: Map<String, Value>,
}

impl WideEvent {
    pub fn outcome(&self) -> Outcome {
        if self.error.is_some() {
            return Outcome::Failed;
        }
        match LatencyBucket::for_duration_ms(self.performance.map(|p| p.duration_ms)) {
            LatencyBucket::Over1000 => Outcome::Warning,
            LatencyBucket::Unknown => Outcome::EdgeCase,
            _ => Outcome::Success,
        }
    }

    pub fn latency_bucket(&self) -> LatencyBucket {
        LatencyBucket::for_duration_ms(self.performance.map(|p| p.duration_ms))
    }
}

/// Builds the dual-layer summary (§3 "Dual-layer summary", I4): a narrative
/// sentence, a blank line, then the fixed-order canonical key/value line.
pub fn build_summary(event: &WideEvent) -> String {
    let outcome = event.outcome();
    let narrative = build_narrative(event, outcome);
    let canonical = build_canonical_line(event, outcome);
    format!("{narrative}\n\n{canonical}")
}

fn build_narrative(event: &WideEvent, outcome: Outcome) -> String {
    let duration_clause = match event.performance {
        Some(p) => format!(" in {}ms", p.duration_ms),
        None => String::new(),
    };
    match outcome {
        Outcome::Failed => {
            let err = event.error.as_ref().expect("Failed implies error present");
            format!(
                "{} on {} failed{} with {}: {}",
                event.service, event.route, duration_clause, err.code, err.message
            )
        }
        Outcome::Warning => format!(
            "{} on {} completed{} but exceeded the slow-request threshold",
            event.service, event.route, duration_clause
        ),
        Outcome::EdgeCase => format!(
            "{} on {} completed with no recorded duration",
            event.service, event.route
        ),
        Outcome::Success => format!(
            "{} on {} completed successfully{}",
            event.service, event.route, duration_clause
        ),
    }
}

fn build_canonical_line(event: &WideEvent, outcome: Outcome) -> String {
    let error_code = event
        .error
        .as_ref()
        .map(|e| e.code.clone())
        .unwrap_or_else(|| "NONE".to_string());
    let error_message = event
        .error
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| "NONE".to_string());
    let user_role = event
        .user
        .as_ref()
        .map(|u| u.role.as_str().to_string())
        .unwrap_or_else(|| "ANONYMOUS".to_string());
    let latency_bucket = event.latency_bucket().canonical_token();

    format!(
        "Outcome: {}, Service: {}, Route: {}, Error: {}, ErrorMessage: {}, UserRole: {}, LatencyBucket: {}",
        outcome.as_str(),
        event.service,
        event.route,
        error_code,
        error_message,
        user_role,
        latency_bucket,
    )
}
