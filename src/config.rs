//! Typed configuration, loaded from the environment the same way the rest of
//! this codebase's binaries do: a `clap::Parser` struct with `env = "..."` on
//! every field and `humantime`-parsed durations. This is deliberately a
//! library-level config object, not a product CLI — embedders construct it
//! however they like (`PipelineConfig::parse()` from `std::env`, or built by
//! hand in tests).

use std::time::Duration;

use clap::Parser;

fn parse_duration_ms(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

#[derive(Debug, Clone, Parser, serde::Serialize)]
#[command(about = "wide-event logging pipeline configuration", version)]
pub struct PipelineConfig {
    /// Default service label used when a handler has no `Service(...)` override.
    #[arg(long, env = "SERVICE_NAME", default_value = "unknown-service")]
    pub service_name: String,

    /// Optional prefix the route normalizer prepends to paths that don't already carry it.
    #[arg(long, env = "API_BASE_PATH")]
    pub api_base_path: Option<String>,

    /// Fraction of non-error, non-slow, non-critical requests sampled (0.0..=1.0).
    #[arg(long, env = "LOG_SAMPLING_NORMAL_RATE", default_value = "0.01")]
    pub sampling_normal_rate: f64,

    /// Duration threshold (ms) above which a request is always recorded.
    #[arg(long, env = "LOG_SLOW_THRESHOLD_MS", default_value = "2000")]
    pub slow_threshold_ms: u64,

    /// Comma-separated `"METHOD /path"` routes that are always recorded.
    #[arg(long, env = "LOG_CRITICAL_ROUTES", value_delimiter = ',')]
    pub critical_routes: Vec<String>,

    /// Number of buffered events that triggers a synchronous flush.
    #[arg(long, env = "LOG_BATCH_SIZE", default_value = "50")]
    pub batch_size: usize,

    /// Periodic flush interval for the direct writer.
    #[arg(long, env = "LOG_FLUSH_INTERVAL_MS", value_parser = parse_duration_ms, default_value = "1000ms")]
    pub flush_interval: Duration,

    /// Capacity of the finalize dedup LRU.
    #[arg(long, env = "LOG_FINALIZED_CACHE_SIZE", default_value = "2000")]
    pub finalized_cache_size: usize,

    /// Maximum number of in-flight finalize calls before new events are dropped.
    #[arg(long, env = "LOG_MAX_PENDING_FINALIZES", default_value = "500")]
    pub max_pending_finalizes: usize,

    /// Whether a message bus sink is configured at all.
    #[arg(long, env = "MQ_ENABLED", default_value = "false")]
    pub mq_enabled: bool,

    /// `host:port` of the message bus broker.
    #[arg(long, env = "MQ_BROKER_ADDRESS", default_value = "localhost:9092")]
    pub mq_broker_address: String,

    /// Bus topic events are published to / consumed from.
    #[arg(long, env = "MQ_LOG_TOPIC", default_value = "log-events")]
    pub mq_topic: String,

    /// Consumer group id used by the bus consumer.
    #[arg(long, env = "MQ_CONSUMER_GROUP", default_value = "eventline-consumer")]
    pub mq_consumer_group: String,

    /// Number of messages the bus consumer batches before handing off to the direct writer.
    #[arg(long, env = "MQ_BATCH_SIZE", default_value = "100")]
    pub mq_batch_size: usize,

    /// Batch timeout for the bus consumer.
    #[arg(long, env = "MQ_BATCH_TIMEOUT_MS", value_parser = parse_duration_ms, default_value = "1000ms")]
    pub mq_batch_timeout: Duration,

    /// Consecutive successful broker probes required before DIRECT -> BUS recovery.
    #[arg(long, env = "MQ_STABILITY_THRESHOLD", default_value = "3")]
    pub stability_threshold: u32,

    /// Interval between broker liveness probes while the watchdog is recovering.
    #[arg(long, env = "MQ_WATCHDOG_INTERVAL_MS", value_parser = parse_duration_ms, default_value = "30s")]
    pub watchdog_interval: Duration,

    /// Hard timeout applied to every drain step during shutdown.
    #[arg(long, env = "LOG_DRAIN_TIMEOUT_MS", value_parser = parse_duration_ms, default_value = "5s")]
    pub drain_timeout: Duration,
}

impl Default for PipelineConfig {
    /// Parses an empty argv, which means every field resolves to its `env`/`default_value`.
    /// This is what tests and embedders who don't care about CLI parsing reach for.
    fn default() -> Self {
        PipelineConfig::parse_from::<_, &str>(std::iter::once("eventline"))
    }
}

impl PipelineConfig {
    pub fn normal_rate_clamped(&self) -> f64 {
        self.sampling_normal_rate.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.service_name, "unknown-service");
        assert_eq!(cfg.batch_size, 50);
        assert_eq!(cfg.flush_interval, Duration::from_millis(1000));
        assert_eq!(cfg.finalized_cache_size, 2000);
        assert_eq!(cfg.max_pending_finalizes, 500);
        assert_eq!(cfg.mq_batch_size, 100);
        assert_eq!(cfg.stability_threshold, 3);
    }

    #[test]
    fn normal_rate_is_clamped() {
        let mut cfg = PipelineConfig::default();
        cfg.sampling_normal_rate = 1.5;
        assert_eq!(cfg.normal_rate_clamped(), 1.0);
        cfg.sampling_normal_rate = -0.5;
        assert_eq!(cfg.normal_rate_clamped(), 0.0);
    }
}
