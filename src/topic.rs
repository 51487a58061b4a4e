//! Periodic topic beacons for groups.
//!
//! `!topic 20 Weekly net tonight 20:00 interval:60` makes this node announce the text
//! to group 20 every hour until it is deleted or the process restarts. A beacon fires
//! once right away and then every interval. Beacons are plain chat, never commands.
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::validation::{parse_bounded, validate_group, validate_topic_text, ValidationError};

pub const DEFAULT_INTERVAL_MINUTES: u32 = 30;
pub const MIN_INTERVAL_MINUTES: u64 = 1;
pub const MAX_INTERVAL_MINUTES: u64 = 1440;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no topic set for group {0}")]
    NotFound(String),

    #[error("group required")]
    MissingGroup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBeacon {
    pub group: String,
    pub text: String,
    pub interval_minutes: u32,
    pub next_fire_at: Instant,
}

impl TopicBeacon {
    fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes as u64 * 60)
    }
}

/// Parse an optional interval argument in minutes.
pub fn parse_interval(raw: Option<&str>) -> Result<u32, TopicError> {
    match raw {
        None => Ok(DEFAULT_INTERVAL_MINUTES),
        Some(raw) => Ok(parse_bounded(
            "interval",
            raw,
            MIN_INTERVAL_MINUTES,
            MAX_INTERVAL_MINUTES,
        )? as u32),
    }
}

#[derive(Debug, Default)]
pub struct TopicScheduler {
    beacons: BTreeMap<String, TopicBeacon>,
}

impl TopicScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the beacon for `group`. Returns true when one was replaced.
    pub fn set(
        &mut self,
        group: &str,
        text: &str,
        interval_minutes: u32,
        now: Instant,
    ) -> Result<bool, TopicError> {
        let group = validate_group(group)?;
        let text = validate_topic_text(text)?;
        if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&(interval_minutes as u64)) {
            return Err(ValidationError::OutOfRange {
                name: "interval",
                min: MIN_INTERVAL_MINUTES,
                max: MAX_INTERVAL_MINUTES,
            }
            .into());
        }
        let beacon = TopicBeacon {
            group: group.clone(),
            text,
            interval_minutes,
            next_fire_at: now,
        };
        Ok(self.beacons.insert(group, beacon).is_some())
    }

    pub fn delete(&mut self, group: &str) -> Result<TopicBeacon, TopicError> {
        let group = validate_group(group)?;
        self.beacons
            .remove(&group)
            .ok_or(TopicError::NotFound(group))
    }

    pub fn get(&self, group: &str) -> Option<&TopicBeacon> {
        self.beacons.get(group)
    }

    pub fn list(&self) -> impl Iterator<Item = &TopicBeacon> {
        self.beacons.values()
    }

    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }

    /// Beacons due at `now` as `(group, text)`; each is rescheduled one interval later.
    /// After a stall the schedule skips missed slots instead of firing a burst.
    pub fn due(&mut self, now: Instant) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for beacon in self.beacons.values_mut() {
            if beacon.next_fire_at > now {
                continue;
            }
            out.push((beacon.group.clone(), beacon.text.clone()));
            let step = beacon.interval();
            beacon.next_fire_at += step;
            while beacon.next_fire_at <= now {
                beacon.next_fire_at += step;
            }
        }
        out
    }

    /// Listing for `!topic` without arguments.
    pub fn describe(&self) -> String {
        if self.beacons.is_empty() {
            return "No topics set".to_string();
        }
        let parts: Vec<String> = self
            .beacons
            .values()
            .map(|b| format!("{} every {}m: {}", b.group, b.interval_minutes, b.text))
            .collect();
        format!("Topics: {}", parts.join(" | "))
    }
}
