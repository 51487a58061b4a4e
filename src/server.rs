//! # Server - process lifecycle
//!
//! Wires the pieces together and runs the main loop:
//!
//! ```text
//! UDP transport --TransportEvent--> Server --handle_inbound--> Router
//! local client --ClientSubmission--> Server --handle_outbound--> Router
//! Router --Outbox--> scheduler --OutgoingFrame--> UDP transport
//! ```
//!
//! Inbound frames are handled one at a time in arrival order. A 1s housekeeping tick
//! fires due topic beacons, refreshes the weather cache and prunes expired routing
//! state. Ctrl-C stops the loop and cancels running ping tests.
use anyhow::Result;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::commands::weather::WeatherCache;
#[cfg(feature = "weather")]
use crate::commands::weather::WeatherService;
use crate::config::Config;
use crate::logutil::escape_log;
use crate::metrics;
use crate::outbound::chunk::Chunker;
use crate::outbound::dispatch::{start_scheduler, SchedulerConfig, SchedulerHandle};
use crate::outbound::{OutgoingFrame, Outbox};
use crate::router::{Disposition, Outbound, Router};
use crate::transport::{TransportEvent, UdpTransport};

const PRUNE_EVERY: Duration = Duration::from_secs(60);
const STATS_EVERY: Duration = Duration::from_secs(600);

/// Text typed on the local chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSubmission {
    pub dst: String,
    pub msg: String,
}

pub struct Server {
    config: Config,
    router: Arc<Router>,
    scheduler: SchedulerHandle,
    outgoing_rx: Option<mpsc::UnboundedReceiver<OutgoingFrame>>,
    client_tx: mpsc::UnboundedSender<ClientSubmission>,
    client_rx: mpsc::UnboundedReceiver<ClientSubmission>,
    #[cfg(feature = "weather")]
    weather: WeatherService,
}

impl Server {
    /// Build the router and start the outbound scheduler. Needs a tokio runtime.
    pub fn new(config: Config) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let tuning = &config.router;
        let scheduler = start_scheduler(
            SchedulerConfig {
                min_send_gap_ms: tuning.min_send_gap_ms,
                max_queue: tuning.scheduler_max_queue,
                ..SchedulerConfig::default()
            },
            outgoing_tx,
        );
        let outbox = Outbox::scheduled(
            scheduler.clone(),
            Chunker::new(tuning.frame_limit_bytes, tuning.max_frames),
            tuning.frame_gap(),
        );
        let cache = WeatherCache::new();
        let router = Arc::new(Router::new(&config, outbox, cache.clone()));
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        #[cfg(not(feature = "weather"))]
        let _ = cache;
        Self {
            #[cfg(feature = "weather")]
            weather: WeatherService::new(config.weather.clone(), cache),
            config,
            router,
            scheduler,
            outgoing_rx: Some(outgoing_rx),
            client_tx,
            client_rx,
        }
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    /// Sender for the local chat client.
    pub fn client_sender(&self) -> mpsc::UnboundedSender<ClientSubmission> {
        self.client_tx.clone()
    }

    /// Frames leaving the scheduler, for callers that bring their own transport.
    /// `None` once taken (by this call or by [`Server::run`]).
    pub fn take_outgoing(&mut self) -> Option<mpsc::UnboundedReceiver<OutgoingFrame>> {
        self.outgoing_rx.take()
    }

    /// Bind the UDP transport and serve until Ctrl-C.
    pub async fn run(&mut self) -> Result<()> {
        let outgoing = self
            .outgoing_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("outgoing channel already taken"))?;
        let transport =
            UdpTransport::bind(&self.config.transport.bind, &self.config.transport.node_addr).await?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (rx_task, tx_task) = transport.spawn(event_tx, outgoing);

        info!(
            "mcrouter {} serving as {} (admin {})",
            env!("CARGO_PKG_VERSION"),
            self.router.my_callsign(),
            self.config.node.admin_callsign
        );
        let result = self
            .serve(event_rx, async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Received shutdown signal");
            })
            .await;

        rx_task.abort();
        tx_task.abort();
        result
    }

    /// Main loop over an already running transport; returns when `shutdown` completes
    /// or the event channel closes.
    pub async fn serve<F>(
        &mut self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_prune = Instant::now();
        let mut last_stats = Instant::now();

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let now = Instant::now();
                    self.router.fire_beacons(now);
                    if now.duration_since(last_prune) >= PRUNE_EVERY {
                        let removed = self.router.prune(now);
                        if removed > 0 {
                            debug!("pruned {} expired routing entries", removed);
                        }
                        last_prune = now;
                    }
                    if now.duration_since(last_stats) >= STATS_EVERY {
                        info!("stats: {}", metrics::snapshot().summary());
                        last_stats = now;
                    }
                    #[cfg(feature = "weather")]
                    if self.weather.is_due(now) {
                        self.weather.spawn_refresh(now);
                    }
                }
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            warn!("transport event channel closed");
                            break;
                        }
                    }
                }
                Some(sub) = self.client_rx.recv() => {
                    self.handle_client(sub);
                }
                _ = &mut shutdown => {
                    break;
                }
            }
        }

        self.router.shutdown();
        self.scheduler.shutdown().await;
        info!("final stats: {}", metrics::snapshot().summary());
        Ok(())
    }

    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Message(msg) => {
                let disposition = self.router.handle_inbound(&msg);
                match &disposition {
                    Disposition::Executed { .. } | Disposition::Chat => {}
                    other => debug!("{} -> {:?}: {}", msg.src, other, escape_log(&msg.msg)),
                }
            }
            TransportEvent::Position { src, lat, lon } => {
                self.router.record_position(&src, lat, lon);
            }
        }
    }

    fn handle_client(&self, sub: ClientSubmission) {
        match self.router.handle_outbound(&sub.dst, &sub.msg) {
            Outbound::Transmitted => debug!("client -> {}: {}", sub.dst, escape_log(&sub.msg)),
            Outbound::Executed(d) => debug!("client command kept local: {:?}", d),
        }
    }
}
