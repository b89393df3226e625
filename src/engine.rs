use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::models::{ServerState, StateStore, Transition};
use crate::notify::{NotificationSink, DELIVERY_TIMEOUT};
use crate::probe::Prober;
use crate::wol::MagicPacketSender;

/// Shared context for the periodic sweep and the on-demand commands.
pub struct Monitor {
    pub(crate) config: MonitorConfig,
    pub(crate) prober: Arc<dyn Prober>,
    pub(crate) sender: MagicPacketSender,
    state: RwLock<StateStore>,
    sink: Arc<dyn NotificationSink>,
    concurrency_limiter: Semaphore,
}

struct ProbeResult {
    order: usize,
    name: String,
    ip: Ipv4Addr,
    is_up: bool,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        prober: Arc<dyn Prober>,
        sender: MagicPacketSender,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let max_concurrent = config.max_concurrency.max(1);
        Self {
            config,
            prober,
            sender,
            state: RwLock::new(StateStore::new()),
            sink,
            concurrency_limiter: Semaphore::new(max_concurrent),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub async fn server_state(&self, name: &str) -> Option<ServerState> {
        self.state.read().await.get(name).cloned()
    }

    pub async fn states(&self) -> Vec<ServerState> {
        self.state.read().await.snapshot()
    }

    /// Probes every host that has an IP and records the results.
    ///
    /// Probes run concurrently outside the lock; results are applied under a
    /// single write lock in configuration order. Notifications go out after the
    /// lock is released.
    pub async fn sweep(&self) -> Vec<Transition> {
        let start = Instant::now();
        let mut tasks = FuturesUnordered::new();

        for (order, (host, ip)) in self.config.monitored_hosts().enumerate() {
            tasks.push(async move {
                let _permit = self.concurrency_limiter.acquire().await.ok();
                let is_up = self.prober.is_reachable(ip, &host.tcp_ports).await;
                ProbeResult { order, name: host.name.clone(), ip, is_up }
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(result) = tasks.next().await {
            results.push(result);
        }
        results.sort_by_key(|r| r.order);

        let transitions: Vec<Transition> = {
            let mut store = self.state.write().await;
            let now = Utc::now();
            results
                .iter()
                .filter_map(|r| store.apply(&r.name, r.ip, r.is_up, now))
                .collect()
        };

        for transition in &transitions {
            match timeout(DELIVERY_TIMEOUT, self.sink.notify(transition)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(host = %transition.host, error = %e, "Failed to send status notification")
                }
                Err(_) => {
                    warn!(host = %transition.host, "Status notification timed out, dropping it")
                }
            }
        }

        info!(
            "Sweep completed {} checks in {:.2}s, {} transitions.",
            results.len(),
            start.elapsed().as_secs_f64(),
            transitions.len()
        );
        transitions
    }

    /// Runs the initial sweep to completion, then schedules the periodic one.
    ///
    /// Every IP-bearing host has a recorded state by the time this returns.
    pub async fn start(self: Arc<Self>) -> MonitorHandle {
        self.sweep().await;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let interval = self.config.interval();

        let join = tokio::spawn(async move {
            info!("Starting server monitoring with {:?} interval", interval);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Server monitoring stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        debug!("Monitor tick");
                        self.sweep().await;
                    }
                }
            }
        });

        MonitorHandle { cancel, join }
    }

    pub async fn announce(&self, message: &str) {
        match timeout(DELIVERY_TIMEOUT, self.sink.announce(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to send announcement"),
            Err(_) => warn!("Announcement timed out"),
        }
    }
}

/// Owns the periodic sweep task.
pub struct MonitorHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Stops scheduling sweeps. A sweep already in progress runs to completion
    /// before this returns.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Monitor task ended abnormally");
            }
        }
    }
}
