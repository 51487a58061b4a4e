//! Failed-command tracking and temporary blocks.
//!
//! Unknown commands and handler failures count against the sender. Three failures
//! inside a sliding five-minute window block the sender for 25 minutes. The caller is
//! told exactly once, when the block starts; after that the sender is dropped silently
//! until the block expires and the record is forgotten.
use std::time::Duration;
use tokio::time::Instant;

use super::ttl::TtlMap;

#[derive(Debug, Clone, Default)]
pub struct AbuseRecord {
    pub failures: Vec<Instant>,
    pub blocked_until: Option<Instant>,
}

/// What a recorded failure led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Counted { failures: usize },
    /// The block starts now; the caller sends the single notice.
    BlockActivated { until: Instant },
    /// Sender was already blocked.
    AlreadyBlocked,
}

#[derive(Debug)]
pub struct AbuseGuard {
    records: TtlMap<String, AbuseRecord>,
    window: Duration,
    max_failures: usize,
    block: Duration,
}

impl AbuseGuard {
    pub fn new(window: Duration, max_failures: usize, block: Duration) -> Self {
        Self {
            records: TtlMap::new(),
            window,
            max_failures: max_failures.max(1),
            block,
        }
    }

    pub fn is_blocked(&mut self, src: &str, now: Instant) -> bool {
        let key = src.to_string();
        match self.records.get(&key, now) {
            Some(rec) => rec.blocked_until.map(|t| t > now).unwrap_or(false),
            None => false,
        }
    }

    pub fn record_failure(&mut self, src: &str, now: Instant) -> FailureOutcome {
        let key = src.to_string();
        if self.is_blocked(src, now) {
            return FailureOutcome::AlreadyBlocked;
        }

        let mut rec = self.records.remove(&key).unwrap_or_default();
        let window = self.window;
        rec.failures.retain(|t| now.saturating_duration_since(*t) < window);
        rec.failures.push(now);
        rec.blocked_until = None;

        if rec.failures.len() >= self.max_failures {
            let until = now + self.block;
            rec.failures.clear();
            rec.blocked_until = Some(until);
            self.records.insert(key, rec, self.block, now);
            return FailureOutcome::BlockActivated { until };
        }

        let failures = rec.failures.len();
        // Keep the record as long as its newest failure is inside the window.
        self.records.insert(key, rec, window, now);
        FailureOutcome::Counted { failures }
    }

    /// Blocked senders with their remaining block time.
    pub fn blocked(&self, now: Instant) -> Vec<(String, Duration)> {
        let mut out: Vec<(String, Duration)> = self
            .records
            .iter_live(now)
            .filter_map(|(src, rec)| {
                rec.blocked_until
                    .filter(|until| *until > now)
                    .map(|until| (src.clone(), until.saturating_duration_since(now)))
            })
            .collect();
        out.sort();
        out
    }

    pub fn prune(&mut self, now: Instant) -> usize {
        self.records.prune(now)
    }
}
