//! Application-embedded wide-event logging pipeline.
//!
//! [`Pipeline`] is the library's `Arc<App>` — assembled once at process
//! startup (mirroring `dekaf::App`), handed to the framework's interception
//! hook, and torn down via [`Pipeline::shutdown`] on the process's
//! termination signal.

pub mod config;
pub mod context;
pub mod error;
pub mod error_normalize;
pub mod event;
pub mod finalize;
pub mod handler_meta;
pub mod interceptor;
pub mod mode;
pub mod redact;
pub mod route;
pub mod sampling;
pub mod shutdown;
pub mod sinks;
pub mod store;
pub mod wire;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use handler_meta::{HandlerId, HandlerMetadata, HandlerMetadataRegistry};
pub use interceptor::{Interceptor, RequestInfo};

use finalize::FinalizeCoordinator;
use mode::{initial_mode, probe_broker_liveness, run_watchdog, Mode, ModeState, ModeStateMachine};
use sampling::SamplingPolicy;
use sinks::{BusConsumer, BusProducer, DirectWriter, RoutingSink};
use store::PrimaryStore;

/// Sets up the crate's default `tracing` subscriber: an `EnvFilter` reading
/// `RUST_LOG` and a compact `fmt` layer, mirroring the teacher's own
/// `main.rs` bootstrap.
pub fn init_tracing() {
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// The assembled pipeline: interceptor, finalize coordinator, mode state
/// machine, and the background tasks (direct writer, producer watchdog, bus
/// consumer supervisor) that keep it running.
pub struct Pipeline {
    pub interceptor: Interceptor,
    pub registry: Arc<HandlerMetadataRegistry>,
    mode: Arc<ModeStateMachine>,
    direct_writer: Arc<DirectWriter>,
    bus_producer: Option<Arc<BusProducer>>,
    shutdown: shutdown::ShutdownCoordinator,
    consumer_supervisor: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    watchdog_handle: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Pipeline {
    /// Boots the pipeline: probes the broker if one is configured, picks the
    /// initial mode (§4.11), spawns the direct writer, optionally the bus
    /// producer/consumer/watchdog, and returns an assembled [`Pipeline`]
    /// ready to hand to an [`Interceptor`] caller.
    ///
    /// Fails only if neither a store nor a bus is usable — the pipeline
    /// needs at least one sink to exist at all (§7, "infrastructure boot
    /// failure").
    pub async fn bootstrap(
        config: &PipelineConfig,
        store: Arc<dyn PrimaryStore>,
        is_production: bool,
    ) -> anyhow::Result<Arc<Pipeline>> {
        let direct_writer = DirectWriter::spawn(
            store,
            config.batch_size,
            config.flush_interval,
            config.drain_timeout,
        );

        let probe_timeout = Duration::from_secs(2);
        let initial_probe = if config.mq_enabled {
            probe_broker_liveness(&config.mq_broker_address, probe_timeout).await
        } else {
            false
        };
        let mode = initial_mode(config.mq_enabled, initial_probe);
        let mode_state = ModeState::new(mode);
        let mode_machine = ModeStateMachine::new(mode_state, config.stability_threshold);

        let bus_producer = if config.mq_enabled {
            Some(Arc::new(BusProducer::connect(
                &config.mq_broker_address,
                config.mq_topic.clone(),
                Duration::from_millis(5000),
            )?))
        } else {
            None
        };

        if bus_producer.is_none() && mode_machine.current() == Mode::Bus {
            anyhow::bail!(PipelineError::NoSinkConfigured);
        }

        let consumer_cancel = CancellationToken::new();
        let consumer_supervisor = if config.mq_enabled {
            Some(spawn_consumer_supervisor(
                config.clone(),
                mode_machine.clone(),
                direct_writer.clone(),
                consumer_cancel.clone(),
            ))
        } else {
            None
        };

        let watchdog_cancel = CancellationToken::new();
        let watchdog_handle = if config.mq_enabled {
            Some(tokio::spawn(run_watchdog(
                mode_machine.clone(),
                config.mq_broker_address.clone(),
                config.watchdog_interval,
                probe_timeout,
                watchdog_cancel.clone(),
            )))
        } else {
            None
        };

        let routing_sink = Arc::new(RoutingSink::new(
            mode_machine.clone(),
            direct_writer.clone() as Arc<dyn sinks::EventSink>,
            bus_producer
                .clone()
                .map(|producer| producer as Arc<dyn sinks::EventSink>),
        ));

        let sampling = SamplingPolicy::new(
            config.normal_rate_clamped(),
            config.slow_threshold_ms,
            config.critical_routes.clone(),
        );
        let finalize = Arc::new(FinalizeCoordinator::new(
            config.finalized_cache_size,
            config.max_pending_finalizes,
            sampling,
            routing_sink,
        ));

        let registry = Arc::new(HandlerMetadataRegistry::new());
        let interceptor = Interceptor::new(
            registry.clone(),
            finalize,
            config.service_name.clone(),
            config.api_base_path.clone(),
            is_production,
        );

        let intake_cancel = CancellationToken::new();
        let shutdown = shutdown::ShutdownCoordinator::new(
            intake_cancel,
            consumer_cancel,
            direct_writer.clone(),
            bus_producer.clone(),
            config.drain_timeout,
        );

        Ok(Arc::new(Pipeline {
            interceptor,
            registry,
            mode: mode_machine,
            direct_writer,
            bus_producer,
            shutdown,
            consumer_supervisor: std::sync::Mutex::new(consumer_supervisor),
            watchdog_handle: std::sync::Mutex::new(watchdog_handle),
        }))
    }

    pub fn current_mode(&self) -> Mode {
        self.mode.current()
    }

    /// Runs the §4.12 ordered drain. Safe to call once; a second call is a
    /// harmless no-op on an already-drained direct writer channel.
    pub async fn shutdown(&self) {
        if let Some(watchdog) = self.watchdog_handle.lock().unwrap().take() {
            watchdog.abort();
        }
        let supervisor = self.consumer_supervisor.lock().unwrap().take();
        self.shutdown.shutdown(supervisor).await;
    }

    /// Awaits the process's standard termination signal, then runs shutdown.
    /// Mirrors `dekaf::main`'s `tokio::signal::ctrl_c` trigger.
    pub async fn run_until_signal(self: &Arc<Self>) {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("failed to install ctrl_c handler, shutting down immediately");
        }
        tracing::info!("termination signal received, starting graceful shutdown");
        self.shutdown().await;
    }
}

/// Owns the bus consumer across its create/destroy lifecycle (C9/C10): a
/// single task that watches the mode channel and spawns or stops a
/// [`BusConsumer`] in lockstep with BUS/DIRECT transitions.
fn spawn_consumer_supervisor(
    config: PipelineConfig,
    mode: Arc<ModeStateMachine>,
    direct_writer: Arc<DirectWriter>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut mode_rx = mode.subscribe();
        let mut consumer: Option<BusConsumer> = if mode.current() == Mode::Bus {
            spawn_consumer(&config, &mode, &direct_writer)
        } else {
            None
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Some(consumer) = consumer.take() {
                        consumer.stop(config.drain_timeout).await;
                    }
                    return;
                }
                changed = mode_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let new_mode = *mode_rx.borrow();
                    match new_mode {
                        Mode::Bus => {
                            if consumer.is_none() {
                                consumer = spawn_consumer(&config, &mode, &direct_writer);
                            }
                        }
                        Mode::Direct => {
                            if let Some(consumer) = consumer.take() {
                                consumer.stop(config.drain_timeout).await;
                            }
                        }
                    }
                }
            }
        }
    })
}

fn spawn_consumer(
    config: &PipelineConfig,
    mode: &Arc<ModeStateMachine>,
    direct_writer: &Arc<DirectWriter>,
) -> Option<BusConsumer> {
    match BusConsumer::spawn(
        &config.mq_broker_address,
        &config.mq_topic,
        &config.mq_consumer_group,
        config.mq_batch_size,
        config.mq_batch_timeout,
        direct_writer.clone(),
        mode.clone(),
    ) {
        Ok(consumer) => Some(consumer),
        Err(error) => {
            tracing::error!(%error, "failed to start bus consumer after BUS transition");
            None
        }
    }
}
