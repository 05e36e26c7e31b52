//! Sampling policy (C5): deterministic, explainable, with 100% retention of
//! errors, slow requests, and critical routes (I3).

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SamplingReason {
    HasError,
    SlowRequest,
    CriticalRoute,
    SampledNormal,
    NotSampled,
}

impl SamplingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingReason::HasError => "HAS_ERROR",
            SamplingReason::SlowRequest => "SLOW_REQUEST",
            SamplingReason::CriticalRoute => "CRITICAL_ROUTE",
            SamplingReason::SampledNormal => "SAMPLED_NORMAL",
            SamplingReason::NotSampled => "NOT_SAMPLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SamplingDecision {
    pub should_record: bool,
    pub reason: SamplingReason,
}

/// Inputs the sampler needs, decoupled from [`crate::context::LoggingContext`]
/// so the policy can be unit tested without spinning up the task-local store.
#[derive(Debug, Clone, Copy)]
pub struct SamplingInput<'a> {
    pub has_error: bool,
    pub duration_ms: Option<u64>,
    pub route: &'a str,
}

pub struct SamplingPolicy {
    pub normal_rate: f64,
    pub slow_threshold_ms: u64,
    pub critical_routes: Vec<String>,
}

impl SamplingPolicy {
    pub fn new(normal_rate: f64, slow_threshold_ms: u64, critical_routes: Vec<String>) -> Self {
        SamplingPolicy {
            normal_rate: normal_rate.clamp(0.0, 1.0),
            slow_threshold_ms,
            critical_routes,
        }
    }

    pub fn should_record(&self, input: SamplingInput<'_>) -> SamplingDecision {
        self.should_record_with_rng(input, &mut rand::thread_rng())
    }

    /// Split out for tests: takes an injected RNG so the `SAMPLED_NORMAL` /
    /// `NOT_SAMPLED` boundary can be exercised deterministically.
    pub fn should_record_with_rng<R: Rng + ?Sized>(
        &self,
        input: SamplingInput<'_>,
        rng: &mut R,
    ) -> SamplingDecision {
        if input.has_error {
            return SamplingDecision {
                should_record: true,
                reason: SamplingReason::HasError,
            };
        }
        if let Some(ms) = input.duration_ms {
            if ms > self.slow_threshold_ms {
                return SamplingDecision {
                    should_record: true,
                    reason: SamplingReason::SlowRequest,
                };
            }
        }
        if self
            .critical_routes
            .iter()
            .any(|r| r == input.route)
        {
            return SamplingDecision {
                should_record: true,
                reason: SamplingReason::CriticalRoute,
            };
        }

        if self.normal_rate >= 1.0 {
            return SamplingDecision {
                should_record: true,
                reason: SamplingReason::SampledNormal,
            };
        }
        if self.normal_rate <= 0.0 {
            return SamplingDecision {
                should_record: false,
                reason: SamplingReason::NotSampled,
            };
        }

        let draw: f64 = rng.gen_range(0.0..100.0);
        if draw <= self.normal_rate * 100.0 {
            SamplingDecision {
                should_record: true,
                reason: SamplingReason::SampledNormal,
            }
        } else {
            SamplingDecision {
                should_record: false,
                reason: SamplingReason::NotSampled,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn input(has_error: bool, duration_ms: Option<u64>, route: &str) -> SamplingInput<'_> {
        SamplingInput {
            has_error,
            duration_ms,
            route,
        }
    }

    #[test]
    fn errors_always_recorded() {
        let policy = SamplingPolicy::new(0.0, 2000, vec![]);
        let decision = policy.should_record(input(true, Some(10), "GET /x"));
        assert!(decision.should_record);
        assert_eq!(decision.reason, SamplingReason::HasError);
    }

    #[test]
    fn slow_requests_always_recorded() {
        let policy = SamplingPolicy::new(0.0, 2000, vec![]);
        let decision = policy.should_record(input(false, Some(2500), "GET /x"));
        assert!(decision.should_record);
        assert_eq!(decision.reason, SamplingReason::SlowRequest);
    }

    #[test]
    fn critical_routes_always_recorded() {
        let policy = SamplingPolicy::new(0.0, 2000, vec!["POST /payments".to_string()]);
        let decision = policy.should_record(input(false, Some(10), "POST /payments"));
        assert!(decision.should_record);
        assert_eq!(decision.reason, SamplingReason::CriticalRoute);
    }

    #[test]
    fn rate_at_or_above_one_always_samples() {
        let policy = SamplingPolicy::new(1.5, 2000, vec![]);
        let decision = policy.should_record(input(false, Some(10), "GET /x"));
        assert!(decision.should_record);
        assert_eq!(decision.reason, SamplingReason::SampledNormal);
    }

    #[test]
    fn rate_at_or_below_zero_never_samples() {
        let policy = SamplingPolicy::new(0.0, 2000, vec![]);
        let decision = policy.should_record(input(false, Some(10), "GET /x"));
        assert!(!decision.should_record);
        assert_eq!(decision.reason, SamplingReason::NotSampled);
    }

    #[test]
    fn deterministic_draw_is_used_to_decide_boundary() {
        let policy = SamplingPolicy::new(0.5, 2000, vec![]);
        let mut low = StepRng::new(0, 0); // gen_range always returns the low end ~ 0.0
        let decision = policy.should_record_with_rng(input(false, Some(10), "GET /x"), &mut low);
        assert!(decision.should_record);
    }
}
