//! Network monitor.
//!
//! Tracks whether the remote service is reachable and raises a short-lived
//! `just_reconnected` signal on every offline to online transition. State is
//! published through a `tokio::sync::watch` channel so observers (the sync
//! scheduler, front-ends) react to edges without polling.

mod probe;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub use probe::{ConnectivityProbe, HttpProbe};

/// Snapshot of connectivity as seen by observers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectivityState {
    /// Remote service currently believed reachable
    pub online: bool,
    /// An offline period happened since the last completed reconnect window
    pub was_offline: bool,
    /// Raised for a bounded window right after coming back online
    pub just_reconnected: bool,
}

/// Connectivity tracker shared behind an `Arc`
#[derive(Debug)]
pub struct NetworkMonitor {
    state: watch::Sender<ConnectivityState>,
    generation: AtomicU64,
    reconnect_window: Duration,
}

impl NetworkMonitor {
    /// Create a monitor with the connectivity observed at startup.
    ///
    /// Starting offline counts as an offline period, so the first successful
    /// probe raises `just_reconnected`.
    #[must_use]
    pub fn new(initially_online: bool, reconnect_window: Duration) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectivityState {
            online: initially_online,
            was_offline: !initially_online,
            just_reconnected: false,
        });
        Arc::new(Self {
            state,
            generation: AtomicU64::new(0),
            reconnect_window,
        })
    }

    /// Current connectivity snapshot
    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state.borrow().online
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    /// Platform or probe reports the service reachable.
    ///
    /// No-op while already online. Must be called from within a Tokio
    /// runtime when a reconnect window may open.
    pub fn report_online(self: &Arc<Self>) {
        let mut window_opened = false;
        self.state.send_if_modified(|state| {
            if state.online {
                return false;
            }
            state.online = true;
            if state.was_offline {
                state.just_reconnected = true;
                window_opened = true;
            }
            true
        });

        if !window_opened {
            return;
        }

        tracing::info!("Connection restored");
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let monitor = Arc::downgrade(self);
        let window = self.reconnect_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(monitor) = monitor.upgrade() {
                monitor.close_reconnect_window(generation);
            }
        });
    }

    /// Platform or probe reports the service unreachable.
    pub fn report_offline(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let changed = self.state.send_if_modified(|state| {
            if !state.online && state.was_offline && !state.just_reconnected {
                return false;
            }
            let went_offline = state.online;
            state.online = false;
            state.was_offline = true;
            state.just_reconnected = false;
            went_offline
        });
        if changed {
            tracing::warn!("Connection lost; changes will be queued locally");
        }
    }

    fn close_reconnect_window(&self, generation: u64) {
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation || !state.online {
                return false;
            }
            let changed = state.just_reconnected || state.was_offline;
            state.just_reconnected = false;
            state.was_offline = false;
            changed
        });
    }

    /// Feed one probe result into the state machine
    pub fn apply_probe_result(self: &Arc<Self>, reachable: bool) {
        match (reachable, self.is_online()) {
            (true, false) => self.report_online(),
            (false, true) => self.report_offline(),
            _ => {}
        }
    }

    /// Run a single probe now and apply its result
    pub async fn check<P: ConnectivityProbe>(self: &Arc<Self>, probe: &P) -> bool {
        let reachable = probe.probe().await;
        self.apply_probe_result(reachable);
        reachable
    }

    /// Probe connectivity every `interval`, starting one interval from now.
    pub fn spawn_probe<P: ConnectivityProbe>(
        self: &Arc<Self>,
        probe: P,
        interval: Duration,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.check(&probe).await;
            }
        })
    }
}
