//! Built-in command bodies that only need their own state.
//!
//! Commands that touch router state (`help`, `group`, `kb`, `topic`, `ctcping`) are
//! executed by the router itself; see [`super::Action`].
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard};

use super::heard::{HeardLog, StationSummary};
use super::weather::WeatherCache;
use super::{CommandContext, CommandError, CommandHandler, Kwargs};
use crate::validation::{parse_bounded, validate_callsign};

pub type SharedHeardLog = Arc<Mutex<HeardLog>>;

fn lock(log: &SharedHeardLog) -> MutexGuard<'_, HeardLog> {
    log.lock().unwrap_or_else(|e| e.into_inner())
}

fn bounded_arg(
    args: &Kwargs,
    key: &'static str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64, CommandError> {
    match args.get(key) {
        Some(raw) => Ok(parse_bounded(key, raw, min, max)?),
        None => Ok(default),
    }
}

fn hhmm(at: DateTime<Utc>) -> String {
    at.format("%H:%M").to_string()
}

pub struct DiceHandler;

/// `a` and `b` are the two d6 results.
pub fn format_roll(who: &str, a: u8, b: u8) -> String {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if (hi, lo) == (2, 1) {
        format!("{} rolls {} and {}: Mäxchen!", who, a, b)
    } else if hi == lo {
        format!("{} rolls {} and {}: double {}", who, a, b, hi)
    } else {
        format!("{} rolls {} and {} ({}{})", who, a, b, hi, lo)
    }
}

impl CommandHandler for DiceHandler {
    fn handle(&self, ctx: &CommandContext<'_>, _args: &Kwargs) -> Result<String, CommandError> {
        let mut rng = rand::thread_rng();
        let a: u8 = rng.gen_range(1..=6);
        let b: u8 = rng.gen_range(1..=6);
        Ok(format_roll(ctx.src, a, b))
    }
}

pub struct TimeHandler;

impl CommandHandler for TimeHandler {
    fn handle(&self, ctx: &CommandContext<'_>, _args: &Kwargs) -> Result<String, CommandError> {
        Ok(format!(
            "{} time: {}",
            ctx.my_callsign,
            ctx.wall_now.format("%Y-%m-%d %H:%M:%S UTC")
        ))
    }
}

pub struct UserInfoHandler {
    text: String,
}

impl UserInfoHandler {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl CommandHandler for UserInfoHandler {
    fn handle(&self, ctx: &CommandContext<'_>, _args: &Kwargs) -> Result<String, CommandError> {
        if self.text.trim().is_empty() {
            Ok(format!("{}: no user info configured", ctx.my_callsign))
        } else {
            Ok(self.text.clone())
        }
    }
}

pub struct WxHandler {
    cache: WeatherCache,
}

impl WxHandler {
    pub fn new(cache: WeatherCache) -> Self {
        Self { cache }
    }
}

impl CommandHandler for WxHandler {
    fn handle(&self, ctx: &CommandContext<'_>, _args: &Kwargs) -> Result<String, CommandError> {
        Ok(match self.cache.get() {
            Some(entry) => entry.text,
            None => format!("{}: no weather report available", ctx.my_callsign),
        })
    }
}

fn station_list(stations: &[StationSummary]) -> String {
    stations
        .iter()
        .map(|s| format!("{} {} ({})", s.callsign, hhmm(s.last_at), s.count))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// `!mheard [limit:N] [type:msg|pos|all]`. The `all` listing is two lines, messages
/// then positions.
pub struct MheardHandler {
    log: SharedHeardLog,
}

impl MheardHandler {
    pub fn new(log: SharedHeardLog) -> Self {
        Self { log }
    }
}

impl CommandHandler for MheardHandler {
    fn handle(&self, _ctx: &CommandContext<'_>, args: &Kwargs) -> Result<String, CommandError> {
        let limit = bounded_arg(args, "limit", 5, 1, 20)? as usize;
        let kind = args.get("type").map(|s| s.to_ascii_lowercase());
        let log = lock(&self.log);
        let line = |label: &str, want_pos: bool| {
            let list = log.mheard(limit, Some(want_pos));
            if list.is_empty() {
                format!("{}: none", label)
            } else {
                format!("{}: {}", label, station_list(&list))
            }
        };
        match kind.as_deref() {
            None | Some("all") => Ok(format!("{}\n{}", line("MSG", false), line("POS", true))),
            Some("msg") => Ok(line("MSG", false)),
            Some("pos") => Ok(line("POS", true)),
            Some(other) => Err(CommandError::InvalidArgument(format!(
                "type must be msg, pos or all, not {}",
                other
            ))),
        }
    }
}

/// `!search CALL [days:N]`; a base callsign matches all its SSIDs.
pub struct SearchHandler {
    log: SharedHeardLog,
}

impl SearchHandler {
    pub fn new(log: SharedHeardLog) -> Self {
        Self { log }
    }
}

impl CommandHandler for SearchHandler {
    fn handle(&self, ctx: &CommandContext<'_>, args: &Kwargs) -> Result<String, CommandError> {
        let call = args
            .get("call")
            .ok_or_else(|| CommandError::InvalidArgument("call required".into()))?;
        let call = validate_callsign(call)?;
        let days = bounded_arg(args, "days", 1, 1, 30)?;
        let since = ctx.wall_now - ChronoDuration::days(days as i64);

        let r = lock(&self.log).search(&call, since);
        let Some(last) = r.last_at else {
            return Ok(format!("{} ({}d): not heard", call, days));
        };
        let mut out = format!(
            "{} ({}d): {} msgs, {} pos, last {}",
            call,
            days,
            r.messages,
            r.positions,
            hhmm(last)
        );
        if r.ssids.len() > 1 || r.ssids.first().map(|s| s != &call).unwrap_or(false) {
            out.push_str(&format!(", SSIDs {}", r.ssids.join(" ")));
        }
        Ok(out)
    }
}

pub struct PosHandler {
    log: SharedHeardLog,
}

impl PosHandler {
    pub fn new(log: SharedHeardLog) -> Self {
        Self { log }
    }
}

impl CommandHandler for PosHandler {
    fn handle(&self, _ctx: &CommandContext<'_>, args: &Kwargs) -> Result<String, CommandError> {
        let call = args
            .get("call")
            .ok_or_else(|| CommandError::InvalidArgument("call required".into()))?;
        let call = validate_callsign(call)?;
        match lock(&self.log).last_position(&call) {
            Some((who, lat, lon, at)) => Ok(format!(
                "{} pos {:.5},{:.5} @ {}",
                who,
                lat,
                lon,
                at.format("%Y-%m-%d %H:%M")
            )),
            None => Ok(format!("No position for {}", call)),
        }
    }
}

/// `!stats [hours:N]`, 1 to 168 hours, default 24.
pub struct StatsHandler {
    log: SharedHeardLog,
}

impl StatsHandler {
    pub fn new(log: SharedHeardLog) -> Self {
        Self { log }
    }
}

impl CommandHandler for StatsHandler {
    fn handle(&self, ctx: &CommandContext<'_>, args: &Kwargs) -> Result<String, CommandError> {
        let hours = bounded_arg(args, "hours", 24, 1, 168)? as u32;
        let s = lock(&self.log).stats(hours, ctx.wall_now);
        Ok(format!(
            "Stats {}h: {} msgs, {} pos, {} stations",
            hours, s.messages, s.positions, s.stations
        ))
    }
}
