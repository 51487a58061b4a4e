//! Bounded in-memory log of recently heard stations.
//!
//! Fed by the router for every inbound chat or command frame and by the transport for
//! position beacons. Backs `!mheard`, `!search`, `!pos` and `!stats`.
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeardKind {
    Msg,
    Pos { lat: f64, lon: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeardEntry {
    pub callsign: String,
    pub dst: String,
    pub kind: HeardKind,
    pub at: DateTime<Utc>,
}

/// One station line of an `mheard` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationSummary {
    pub callsign: String,
    pub last_at: DateTime<Utc>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub messages: usize,
    pub positions: usize,
    pub last_at: Option<DateTime<Utc>>,
    pub last_pos: Option<(f64, f64, DateTime<Utc>)>,
    /// Distinct SSIDs seen for a base-callsign query.
    pub ssids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeardStats {
    pub messages: usize,
    pub positions: usize,
    pub stations: usize,
}

#[derive(Debug)]
pub struct HeardLog {
    entries: VecDeque<HeardEntry>,
    capacity: usize,
}

/// `DK5EN` matches every SSID of that base; `DK5EN-1` only itself.
fn call_matches(query: &str, callsign: &str) -> bool {
    if query.contains('-') {
        callsign.eq_ignore_ascii_case(query)
    } else {
        callsign
            .split('-')
            .next()
            .map(|b| b.eq_ignore_ascii_case(query))
            .unwrap_or(false)
    }
}

impl HeardLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, entry: HeardEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn record_msg(&mut self, callsign: &str, dst: &str, at: DateTime<Utc>) {
        self.record(HeardEntry {
            callsign: callsign.to_string(),
            dst: dst.to_string(),
            kind: HeardKind::Msg,
            at,
        });
    }

    pub fn record_pos(&mut self, callsign: &str, lat: f64, lon: f64, at: DateTime<Utc>) {
        self.record(HeardEntry {
            callsign: callsign.to_string(),
            dst: "*".to_string(),
            kind: HeardKind::Pos { lat, lon },
            at,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recently heard stations first, at most `limit`. `want_pos` filters to message or
    /// position frames (`None` = both).
    pub fn mheard(&self, limit: usize, want_pos: Option<bool>) -> Vec<StationSummary> {
        let mut by_call: HashMap<&str, StationSummary> = HashMap::new();
        for e in &self.entries {
            let is_pos = matches!(e.kind, HeardKind::Pos { .. });
            if want_pos.map(|w| w != is_pos).unwrap_or(false) {
                continue;
            }
            let s = by_call.entry(e.callsign.as_str()).or_insert_with(|| StationSummary {
                callsign: e.callsign.clone(),
                last_at: e.at,
                count: 0,
            });
            s.count += 1;
            if e.at > s.last_at {
                s.last_at = e.at;
            }
        }
        let mut list: Vec<StationSummary> = by_call.into_values().collect();
        list.sort_by(|a, b| b.last_at.cmp(&a.last_at).then(a.callsign.cmp(&b.callsign)));
        list.truncate(limit);
        list
    }

    pub fn search(&self, query: &str, since: DateTime<Utc>) -> SearchResult {
        let mut res = SearchResult {
            messages: 0,
            positions: 0,
            last_at: None,
            last_pos: None,
            ssids: Vec::new(),
        };
        for e in self
            .entries
            .iter()
            .filter(|e| e.at >= since && call_matches(query, &e.callsign))
        {
            match e.kind {
                HeardKind::Msg => res.messages += 1,
                HeardKind::Pos { lat, lon } => {
                    res.positions += 1;
                    if res.last_pos.map(|(_, _, at)| e.at >= at).unwrap_or(true) {
                        res.last_pos = Some((lat, lon, e.at));
                    }
                }
            }
            if res.last_at.map(|t| e.at > t).unwrap_or(true) {
                res.last_at = Some(e.at);
            }
            if !res.ssids.contains(&e.callsign) {
                res.ssids.push(e.callsign.clone());
            }
        }
        res.ssids.sort();
        res
    }

    pub fn last_position(&self, query: &str) -> Option<(String, f64, f64, DateTime<Utc>)> {
        self.entries.iter().rev().find_map(|e| match e.kind {
            HeardKind::Pos { lat, lon } if call_matches(query, &e.callsign) => {
                Some((e.callsign.clone(), lat, lon, e.at))
            }
            _ => None,
        })
    }

    pub fn stats(&self, hours: u32, now: DateTime<Utc>) -> HeardStats {
        let since = now - ChronoDuration::hours(hours as i64);
        let mut stations: Vec<&str> = Vec::new();
        let mut out = HeardStats::default();
        for e in self.entries.iter().filter(|e| e.at >= since) {
            match e.kind {
                HeardKind::Msg => out.messages += 1,
                HeardKind::Pos { .. } => out.positions += 1,
            }
            if !stations.contains(&e.callsign.as_str()) {
                stations.push(&e.callsign);
            }
        }
        out.stations = stations.len();
        out
    }
}
