//! Duplicate suppression by `msg_id`.
//!
//! Mesh flooding delivers the same frame several times. The first sighting arms a
//! fixed window; repeats inside it are dropped without re-arming. IDs are not
//! namespaced by sender, so an unrelated collision inside the window is dropped too.
use std::time::Duration;
use tokio::time::Instant;

use super::ttl::TtlMap;

#[derive(Debug)]
pub struct Deduplicator {
    seen: TtlMap<String, ()>,
    window: Duration,
}

impl Deduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: TtlMap::new(),
            window,
        }
    }

    /// True when `msg_id` was already seen inside the window.
    pub fn seen(&mut self, msg_id: &str, now: Instant) -> bool {
        // Frames without an id cannot be deduplicated.
        if msg_id.is_empty() {
            return false;
        }
        let key = msg_id.to_string();
        if self.seen.contains(&key, now) {
            return true;
        }
        self.seen.insert(key, (), self.window, now);
        false
    }

    pub fn prune(&mut self, now: Instant) -> usize {
        self.seen.prune(now)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
