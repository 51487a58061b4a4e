//! Process-wide routing counters.
//! Cheap atomics bumped from the routing path; read with [`snapshot`].
use std::sync::atomic::{AtomicU64, Ordering};

static COMMANDS_EXECUTED: AtomicU64 = AtomicU64::new(0);
static DUPLICATES_DROPPED: AtomicU64 = AtomicU64::new(0);
static THROTTLED: AtomicU64 = AtomicU64::new(0);
static ABUSE_BLOCKS: AtomicU64 = AtomicU64::new(0);
static COMMAND_FAILURES: AtomicU64 = AtomicU64::new(0);
static SUPPRESSED_OUTBOUND: AtomicU64 = AtomicU64::new(0);
static FRAMES_SENT: AtomicU64 = AtomicU64::new(0);
static PROBES_SENT: AtomicU64 = AtomicU64::new(0);
static PROBES_ANSWERED: AtomicU64 = AtomicU64::new(0);

pub fn inc_commands_executed() {
    COMMANDS_EXECUTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_duplicates_dropped() {
    DUPLICATES_DROPPED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_throttled() {
    THROTTLED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_abuse_blocks() {
    ABUSE_BLOCKS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_command_failures() {
    COMMAND_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_suppressed_outbound() {
    SUPPRESSED_OUTBOUND.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_frames_sent() {
    FRAMES_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_probes_sent() {
    PROBES_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_probes_answered() {
    PROBES_ANSWERED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub commands_executed: u64,
    pub duplicates_dropped: u64,
    pub throttled: u64,
    pub abuse_blocks: u64,
    pub command_failures: u64,
    pub suppressed_outbound: u64,
    pub frames_sent: u64,
    pub probes_sent: u64,
    pub probes_answered: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        commands_executed: COMMANDS_EXECUTED.load(Ordering::Relaxed),
        duplicates_dropped: DUPLICATES_DROPPED.load(Ordering::Relaxed),
        throttled: THROTTLED.load(Ordering::Relaxed),
        abuse_blocks: ABUSE_BLOCKS.load(Ordering::Relaxed),
        command_failures: COMMAND_FAILURES.load(Ordering::Relaxed),
        suppressed_outbound: SUPPRESSED_OUTBOUND.load(Ordering::Relaxed),
        frames_sent: FRAMES_SENT.load(Ordering::Relaxed),
        probes_sent: PROBES_SENT.load(Ordering::Relaxed),
        probes_answered: PROBES_ANSWERED.load(Ordering::Relaxed),
    }
}

impl Snapshot {
    /// One-line summary for the periodic stats log and `mcrouter status`.
    pub fn summary(&self) -> String {
        format!(
            "executed={} dup={} throttled={} blocks={} failures={} suppressed={} frames={} probes={}/{}",
            self.commands_executed,
            self.duplicates_dropped,
            self.throttled,
            self.abuse_blocks,
            self.command_failures,
            self.suppressed_outbound,
            self.frames_sent,
            self.probes_answered,
            self.probes_sent
        )
    }
}
