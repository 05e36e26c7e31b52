//! Mode state machine (C10): BUS <-> DIRECT transitions driven by broker
//! liveness. The hot-path flag is a single atomic word, as the design notes
//! require; change notification to subscribers (producer, consumer, the
//! watchdog itself) rides a `tokio::sync::watch` channel, the same pairing
//! `dekaf::task_manager` uses for its own state broadcast (`AtomicBool` for
//! the cheap check, `watch::Sender` for "tell everyone listening").

use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    Bus,
    Direct,
}

impl Mode {
    fn to_u8(self) -> u8 {
        match self {
            Mode::Bus => 0,
            Mode::Direct => 1,
        }
    }

    fn from_u8(v: u8) -> Mode {
        match v {
            0 => Mode::Bus,
            _ => Mode::Direct,
        }
    }
}

/// Lock-free hot-path mode flag, paired with a watch channel for subscribers
/// who want to react to a transition rather than poll it.
pub struct ModeState {
    flag: AtomicU8,
    tx: watch::Sender<Mode>,
}

impl ModeState {
    pub fn new(initial: Mode) -> Arc<ModeState> {
        let (tx, _rx) = watch::channel(initial);
        Arc::new(ModeState {
            flag: AtomicU8::new(initial.to_u8()),
            tx,
        })
    }

    /// Lock-free read, safe to call from the hot path on every request.
    pub fn current(&self) -> Mode {
        Mode::from_u8(self.flag.load(Ordering::Acquire))
    }

    pub fn subscribe(&self) -> watch::Receiver<Mode> {
        self.tx.subscribe()
    }

    /// Sets the mode and announces it to subscribers. Returns `true` if this
    /// call actually changed the mode (idempotent transitions are a no-op).
    fn transition_to(&self, mode: Mode) -> bool {
        let previous = self.flag.swap(mode.to_u8(), Ordering::AcqRel);
        if Mode::from_u8(previous) == mode {
            return false;
        }
        let _ = self.tx.send(mode);
        true
    }
}

/// Decides the initial mode per §4.11: BUS if a bus is configured and the
/// initial liveness probe succeeds, else DIRECT.
pub fn initial_mode(bus_configured: bool, initial_probe_succeeded: bool) -> Mode {
    if bus_configured && initial_probe_succeeded {
        Mode::Bus
    } else {
        Mode::Direct
    }
}

/// Owns the transition rules on top of a [`ModeState`]. The producer, consumer,
/// and watchdog all hold a clone of this and call its `record_*` methods;
/// none of them mutate `ModeState` directly.
pub struct ModeStateMachine {
    state: Arc<ModeState>,
    stability_threshold: u32,
    consecutive_probe_successes: std::sync::atomic::AtomicU32,
}

impl ModeStateMachine {
    pub fn new(state: Arc<ModeState>, stability_threshold: u32) -> Arc<ModeStateMachine> {
        Arc::new(ModeStateMachine {
            state,
            stability_threshold,
            consecutive_probe_successes: std::sync::atomic::AtomicU32::new(0),
        })
    }

    pub fn current(&self) -> Mode {
        self.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Mode> {
        self.state.subscribe()
    }

    /// BUS -> DIRECT: producer publish failed.
    pub fn record_publish_failure(&self) {
        if self.state.transition_to(Mode::Direct) {
            tracing::warn!(reason = "publish_failure", "mode transition to direct");
        }
        self.consecutive_probe_successes
            .store(0, Ordering::SeqCst);
    }

    /// BUS -> DIRECT: producer reported a disconnect.
    pub fn record_producer_disconnect(&self) {
        if self.state.transition_to(Mode::Direct) {
            tracing::warn!(reason = "producer_disconnect", "mode transition to direct");
        }
        self.consecutive_probe_successes
            .store(0, Ordering::SeqCst);
    }

    /// BUS -> DIRECT: consumer observed a runtime error.
    pub fn record_consumer_error(&self) {
        if self.state.transition_to(Mode::Direct) {
            tracing::warn!(reason = "consumer_error", "mode transition to direct");
        }
        self.consecutive_probe_successes
            .store(0, Ordering::SeqCst);
    }

    /// Feeds one broker liveness probe result into the DIRECT -> BUS
    /// stability counter (P9: only after N consecutive successes).
    pub fn record_probe_result(&self, succeeded: bool) {
        if self.state.current() != Mode::Direct {
            return;
        }
        if !succeeded {
            self.consecutive_probe_successes
                .store(0, Ordering::SeqCst);
            return;
        }
        let count = self
            .consecutive_probe_successes
            .fetch_add(1, Ordering::SeqCst)
            + 1;
        if count >= self.stability_threshold && self.state.transition_to(Mode::Bus) {
            tracing::info!(
                consecutive_successes = count,
                "mode transition to bus after stable probes"
            );
            self.consecutive_probe_successes
                .store(0, Ordering::SeqCst);
        }
    }
}

/// TCP liveness probe, independent of the bus client library, per §4.9/§4.11.
#[tracing::instrument(skip(timeout))]
pub async fn probe_broker_liveness(broker_address: &str, timeout: Duration) -> bool {
    let addr = broker_address.to_string();
    let resolved = tokio::task::spawn_blocking(move || {
        addr.to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
    })
    .await
    .ok()
    .flatten();

    let Some(addr) = resolved else {
        tracing::debug!(broker_address, "probe failed: could not resolve address");
        return false;
    };

    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(error)) => {
            tracing::debug!(%error, "probe failed: connect error");
            false
        }
        Err(_) => {
            tracing::debug!("probe failed: timed out");
            false
        }
    }
}

/// Background watchdog task (C10): while in DIRECT mode, periodically probes
/// the broker and feeds results into the stability counter. While in BUS
/// mode it stays idle aside from waking up to check whether it should start
/// probing again. Runs until `shutdown` is cancelled.
#[tracing::instrument(skip(machine, shutdown))]
pub async fn run_watchdog(
    machine: Arc<ModeStateMachine>,
    broker_address: String,
    probe_interval: Duration,
    probe_timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(probe_interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("watchdog shutting down");
                return;
            }
            _ = ticker.tick() => {
                if machine.current() != Mode::Direct {
                    continue;
                }
                let succeeded = probe_broker_liveness(&broker_address, probe_timeout).await;
                machine.record_probe_result(succeeded);
            }
        }
    }
}
