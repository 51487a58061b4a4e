//! Per (sender, destination, command) cooldown.
//!
//! Cheap commands (`dice`, `time`, `group`, `kb`, `topic`) get a short window keyed
//! without arguments, so rerolling with different arguments is throttled too. Everything
//! else is expensive on air and gets a long window keyed with the argument text, so a
//! different query (e.g. `!stats hours:12` after `!stats hours:24`) still runs.
//! A rejected request does not extend the window.
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::time::Instant;

use super::ttl::TtlMap;

/// Commands with the short cooldown.
pub const SHORT_COOLDOWN_COMMANDS: [&str; 5] = ["dice", "time", "group", "kb", "topic"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownClass {
    Short,
    Long,
}

impl CooldownClass {
    pub fn for_command(name: &str) -> Self {
        if SHORT_COOLDOWN_COMMANDS.contains(&name.to_ascii_lowercase().as_str()) {
            CooldownClass::Short
        } else {
            CooldownClass::Long
        }
    }
}

/// Outcome of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleVerdict {
    Allowed,
    Throttled { retry_in: Duration },
}

#[derive(Debug)]
pub struct Throttle {
    entries: TtlMap<String, ()>,
    short: Duration,
    long: Duration,
}

impl Throttle {
    pub fn new(short: Duration, long: Duration) -> Self {
        Self {
            entries: TtlMap::new(),
            short,
            long,
        }
    }

    /// Plain key before hashing, exposed for logging and tests.
    pub fn content_key(src: &str, dst: &str, cmd: &str, args: &str, class: CooldownClass) -> String {
        let cmd = cmd.to_ascii_lowercase();
        let args = args.split_whitespace().collect::<Vec<_>>().join(" ");
        match class {
            CooldownClass::Short => format!("{}:{}:!{}", src, dst, cmd),
            CooldownClass::Long if args.is_empty() => format!("{}:{}:!{}", src, dst, cmd),
            CooldownClass::Long => format!("{}:{}:!{} {}", src, dst, cmd, args),
        }
    }

    fn content_hash(key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        format!("{:x}", digest)
    }

    /// Check and, when allowed, arm the cooldown for this request.
    pub fn check(
        &mut self,
        src: &str,
        dst: &str,
        cmd: &str,
        args: &str,
        class: CooldownClass,
        now: Instant,
    ) -> ThrottleVerdict {
        let hash = Self::content_hash(&Self::content_key(src, dst, cmd, args, class));
        if let Some(retry_in) = self.entries.remaining(&hash, now) {
            return ThrottleVerdict::Throttled { retry_in };
        }
        let window = match class {
            CooldownClass::Short => self.short,
            CooldownClass::Long => self.long,
        };
        self.entries.insert(hash, (), window, now);
        ThrottleVerdict::Allowed
    }

    /// Convenience wrapper deriving the cooldown class from the command name.
    pub fn allow(&mut self, src: &str, dst: &str, cmd: &str, args: &str, now: Instant) -> bool {
        let class = CooldownClass::for_command(cmd);
        self.check(src, dst, cmd, args, class, now) == ThrottleVerdict::Allowed
    }

    pub fn prune(&mut self, now: Instant) -> usize {
        self.entries.prune(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle() -> Throttle {
        Throttle::new(Duration::from_secs(5), Duration::from_secs(300))
    }

    #[test]
    fn short_commands_ignore_arguments() {
        let t0 = Instant::now();
        let mut t = throttle();
        assert!(t.allow("DK5EN-1", "*", "dice", "", t0));
        assert!(!t.allow("DK5EN-1", "*", "dice", "3", t0 + Duration::from_secs(2)));
        assert!(t.allow("DK5EN-1", "*", "dice", "", t0 + Duration::from_secs(5)));
    }

    #[test]
    fn long_commands_key_on_arguments() {
        let t0 = Instant::now();
        let mut t = throttle();
        assert!(t.allow("DK5EN-1", "DB0ED-99", "stats", "HOURS:24", t0));
        assert!(t.allow("DK5EN-1", "DB0ED-99", "stats", "HOURS:12", t0));
        assert!(!t.allow("DK5EN-1", "DB0ED-99", "stats", "HOURS:24", t0 + Duration::from_secs(60)));
        assert!(t.allow("DK5EN-1", "DB0ED-99", "stats", "HOURS:24", t0 + Duration::from_secs(300)));
    }

    #[test]
    fn rejection_does_not_extend_window() {
        let t0 = Instant::now();
        let mut t = throttle();
        assert!(t.allow("DK5EN-1", "*", "time", "", t0));
        assert!(!t.allow("DK5EN-1", "*", "time", "", t0 + Duration::from_secs(4)));
        assert!(t.allow("DK5EN-1", "*", "time", "", t0 + Duration::from_secs(5)));
    }

    #[test]
    fn key_is_per_sender_and_destination() {
        let t0 = Instant::now();
        let mut t = throttle();
        assert!(t.allow("DK5EN-1", "*", "wx", "", t0));
        assert!(t.allow("DL1XYZ-7", "*", "wx", "", t0));
        assert!(t.allow("DK5EN-1", "20", "wx", "", t0));
    }

    #[test]
    fn content_key_shapes() {
        assert_eq!(
            Throttle::content_key("A", "B", "DICE", "x y", CooldownClass::Short),
            "A:B:!dice"
        );
        assert_eq!(
            Throttle::content_key("A", "B", "stats", "HOURS:24   X", CooldownClass::Long),
            "A:B:!stats HOURS:24 X"
        );
    }
}
