//! Outbound pacing scheduler.
//!
//! Every frame leaving the router (reply frames, notices, ping probes, topic beacons,
//! relayed client messages) is enqueued here instead of being written to the
//! transport directly. The scheduler task releases envelopes once their earliest send
//! time has passed, keeps a minimum gap between consecutive sends, and on overflow
//! drops the oldest envelope of the lowest priority.
//!
//! Multi-frame replies are paced by giving frame `i` an earliest time of
//! `i * frame_gap`; the radio would otherwise drop back-to-back frames.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::{OutgoingFrame, SendError};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MessageCategory {
    /// Command reply frame
    Reply,
    /// Throttle / block notices
    Notice,
    /// Ping probe
    Probe,
    /// Periodic topic beacon
    Beacon,
    /// Message authored by the local client and passed through
    Relay,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl MessageCategory {
    pub fn default_priority(self) -> Priority {
        match self {
            MessageCategory::Probe => Priority::High,
            MessageCategory::Reply | MessageCategory::Notice | MessageCategory::Relay => {
                Priority::Normal
            }
            MessageCategory::Beacon => Priority::Low,
        }
    }
}

#[derive(Debug)]
pub struct MessageEnvelope {
    pub category: MessageCategory,
    pub priority: Priority,
    pub earliest: Instant,
    pub enqueued_at: Instant,
    pub frame: OutgoingFrame,
}

impl MessageEnvelope {
    pub fn new(category: MessageCategory, delay: Duration, frame: OutgoingFrame) -> Self {
        let now = Instant::now();
        Self {
            category,
            priority: category.default_priority(),
            earliest: now + delay,
            enqueued_at: now,
            frame,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub min_send_gap_ms: u64,
    pub max_queue: usize,
    pub stats_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_send_gap_ms: 0,
            max_queue: 256,
            stats_interval_ms: 60_000,
        }
    }
}

pub enum ScheduleCommand {
    Enqueue(MessageEnvelope),
    Snapshot(oneshot::Sender<SchedulerStats>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub queued: usize,
    pub dispatched_total: u64,
    pub dropped_total: u64,
    pub dropped_overflow: u64,
}

#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<ScheduleCommand>,
}

impl SchedulerHandle {
    pub fn enqueue(&self, env: MessageEnvelope) -> Result<(), SendError> {
        self.tx
            .send(ScheduleCommand::Enqueue(env))
            .map_err(|_| SendError::Closed)
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(ScheduleCommand::Shutdown(tx));
        let _ = rx.await;
    }

    pub async fn snapshot(&self) -> Option<SchedulerStats> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(ScheduleCommand::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }
}

fn drop_victim(queue: &mut Vec<MessageEnvelope>, stats: &mut SchedulerStats) {
    // Lowest priority first, then oldest.
    let victim = queue
        .iter()
        .enumerate()
        .max_by(|(ai, a), (bi, b)| {
            a.priority
                .cmp(&b.priority)
                .then(b.enqueued_at.cmp(&a.enqueued_at))
                .then(bi.cmp(ai))
        })
        .map(|(i, _)| i);
    if let Some(pos) = victim {
        let dropped = queue.remove(pos);
        stats.dropped_total += 1;
        stats.dropped_overflow += 1;
        log::warn!(
            "scheduler overflow: dropped {:?} frame to {} (queue_full={})",
            dropped.category,
            dropped.frame.dst,
            queue.len()
        );
    }
}

pub fn start_scheduler(
    cfg: SchedulerConfig,
    outgoing: mpsc::UnboundedSender<OutgoingFrame>,
) -> SchedulerHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<ScheduleCommand>();
    let handle = SchedulerHandle { tx };

    tokio::spawn(async move {
        let mut last_sent: Option<Instant> = None;
        let mut queue: Vec<MessageEnvelope> = Vec::new();
        let mut stats = SchedulerStats::default();
        const TICK: Duration = Duration::from_millis(50);
        let min_gap = Duration::from_millis(cfg.min_send_gap_ms);
        let stats_interval = Duration::from_millis(cfg.stats_interval_ms);
        let mut last_stats_log = Instant::now();
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(ScheduleCommand::Enqueue(env)) => {
                            if queue.len() >= cfg.max_queue.max(1) {
                                drop_victim(&mut queue, &mut stats);
                            }
                            queue.push(env);
                        }
                        Some(ScheduleCommand::Snapshot(resp)) => {
                            let _ = resp.send(SchedulerStats { queued: queue.len(), ..stats.clone() });
                        }
                        Some(ScheduleCommand::Shutdown(done)) => {
                            let _ = done.send(());
                            break;
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(TICK) => {}
            }
            if queue.is_empty() {
                continue;
            }
            let now = Instant::now();

            if cfg.stats_interval_ms > 0 && now.duration_since(last_stats_log) >= stats_interval {
                log::debug!(
                    "scheduler stats: queued={} dispatched_total={} dropped_total={} overflow={}",
                    queue.len(),
                    stats.dispatched_total,
                    stats.dropped_total,
                    stats.dropped_overflow
                );
                last_stats_log = now;
            }

            if let Some(last) = last_sent {
                if now < last + min_gap {
                    continue;
                }
            }

            queue.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.earliest.cmp(&b.earliest)));
            if let Some(pos) = queue.iter().position(|e| e.earliest <= now) {
                let ready = queue.remove(pos);
                if outgoing.send(ready.frame).is_err() {
                    log::warn!("outgoing channel closed; dropping frame");
                    stats.dropped_total += 1;
                } else {
                    stats.dispatched_total += 1;
                    crate::metrics::inc_frames_sent();
                    last_sent = Some(now);
                }
            }
        }
        log::debug!("scheduler loop terminated");
    });

    handle
}
