//! # Routing core
//!
//! [`Router`] owns all routing state (dedup cache, throttle cache, abuse records,
//! blocklist, topic beacons, ping tests) and runs every frame through one pipeline:
//!
//! ```text
//! inbound -> normalize -> blocklist -> echo/ack (ping) -> dedup -> heard log
//!         -> command? -> target -> decide -> abuse gate -> throttle -> admin
//!         -> handler -> chunked reply
//! ```
//!
//! Text typed on the local client enters through [`Router::handle_outbound`]: the
//! suppressor keeps commands meant for this node off the air and runs them here.
//!
//! The submodules are plain state machines taking `now` explicitly; this module adds
//! the locking and the side effects (replies, notices, logging, metrics).

pub mod abuse;
pub mod decide;
pub mod dedup;
pub mod echo;
pub mod normalize;
pub mod suppress;
pub mod target;
pub mod throttle;
pub mod ttl;

use chrono::Utc;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use self::abuse::{AbuseGuard, FailureOutcome};
use self::decide::{decide, is_admin};
use self::dedup::Deduplicator;
use self::echo::{classify, FrameKind};
use self::normalize::{is_command, normalize, InboundMessage, NormalizedMessage};
use self::suppress::should_suppress;
use self::target::extract_target;
use self::throttle::{Throttle, ThrottleVerdict};
use crate::commands::handlers::SharedHeardLog;
use crate::commands::heard::HeardLog;
use crate::commands::weather::WeatherCache;
use crate::commands::{
    parse, resolve_args, Action, Command, CommandContext, CommandError, CommandRegistry, Kwargs,
};
use crate::config::{Config, RouterTuning};
use crate::logutil::{escape_log, route_label, sec_log};
use crate::metrics;
use crate::outbound::dispatch::MessageCategory;
use crate::outbound::Outbox;
use crate::ping::{PingError, PingMonitor, DEFAULT_PAYLOAD, DEFAULT_REPEAT, MAX_PAYLOAD, MAX_REPEAT};
use crate::topic::{parse_interval, TopicError, TopicScheduler};
use crate::validation::{base_callsign, parse_bounded, validate_callsign};

/// What happened to an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Sender is kick-banned.
    Blocklisted,
    /// Our own frame seen on air; `probe` when it belonged to a ping test.
    Echo { probe: bool },
    /// ACK or REJ; `probe` when it matched a ping probe.
    Ack { probe: bool },
    Duplicate,
    /// Not a command.
    Chat,
    /// A command this node does not answer.
    NotForUs,
    /// Sender is temporarily blocked after repeated failures.
    Blocked,
    Throttled { retry_in: Duration },
    Unknown(String),
    Denied(String),
    Failed(String),
    Executed {
        command: String,
        reply_to: String,
        frames: usize,
    },
}

/// What happened to text from the local client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Put on air unchanged.
    Transmitted,
    /// Kept local and run through the command pipeline.
    Executed(Disposition),
}

#[derive(Debug)]
struct RouterState {
    dedup: Deduplicator,
    throttle: Throttle,
    abuse: AbuseGuard,
    /// Kick-banned base callsigns.
    blocklist: BTreeSet<String>,
    groups_enabled: bool,
    topics: TopicScheduler,
}

pub struct Router {
    my_callsign: String,
    admin_callsign: String,
    registry: CommandRegistry,
    state: Mutex<RouterState>,
    heard: SharedHeardLog,
    ping: PingMonitor,
    outbox: Outbox,
}

impl Router {
    pub fn new(config: &Config, outbox: Outbox, weather: WeatherCache) -> Self {
        let tuning: &RouterTuning = &config.router;
        let heard: SharedHeardLog = Arc::new(Mutex::new(HeardLog::new(tuning.heard_log_capacity)));
        let registry = CommandRegistry::builtin(heard.clone(), weather, &config.node.userinfo);
        Self {
            my_callsign: config.node.callsign.to_uppercase(),
            admin_callsign: base_callsign(&config.node.admin_callsign),
            registry,
            state: Mutex::new(RouterState {
                dedup: Deduplicator::new(tuning.dedup_window()),
                throttle: Throttle::new(tuning.short_cooldown(), tuning.long_cooldown()),
                abuse: AbuseGuard::new(
                    tuning.abuse_window(),
                    tuning.abuse_max_failures,
                    tuning.abuse_block(),
                ),
                blocklist: BTreeSet::new(),
                groups_enabled: config.node.group_responses_enabled,
                topics: TopicScheduler::new(),
            }),
            heard,
            ping: PingMonitor::new(outbox.clone(), tuning),
            outbox,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn my_callsign(&self) -> &str {
        &self.my_callsign
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn ping(&self) -> &PingMonitor {
        &self.ping
    }

    pub fn groups_enabled(&self) -> bool {
        self.lock().groups_enabled
    }

    pub fn blocklist(&self) -> Vec<String> {
        self.lock().blocklist.iter().cloned().collect()
    }

    pub fn is_blocklisted(&self, callsign: &str) -> bool {
        self.lock().blocklist.contains(&base_callsign(callsign))
    }

    /// Senders currently blocked by the abuse guard, with remaining time.
    pub fn abuse_blocked(&self) -> Vec<(String, Duration)> {
        self.lock().abuse.blocked(Instant::now())
    }

    pub fn topic_count(&self) -> usize {
        self.lock().topics.len()
    }

    /// Position report from the transport; only feeds the heard log.
    pub fn record_position(&self, src: &str, lat: f64, lon: f64) {
        let src = normalize::origin_callsign(src);
        if self.is_blocklisted(&src) {
            return;
        }
        self.heard
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_pos(&src, lat, lon, Utc::now());
    }

    /// Run one frame from the mesh through the pipeline.
    pub fn handle_inbound(&self, inbound: &InboundMessage) -> Disposition {
        let now = Instant::now();
        let mut msg = normalize(inbound);
        let from_us = msg.src == self.my_callsign;
        let label = route_label(&msg.src, &msg.dst);

        if !from_us && self.is_blocklisted(&msg.src) {
            debug!("{} dropped: sender is kick-banned", label);
            return Disposition::Blocklisted;
        }

        match classify(&msg.raw_msg) {
            FrameKind::Echo { body, tag } if from_us => {
                let probe = self.ping.on_echo(&msg.dst, &body, tag, now);
                debug!("{} echo tag {} (probe={})", label, tag, probe);
                return Disposition::Echo { probe };
            }
            FrameKind::Echo { body, .. } => {
                // Peers' frames carry the tag too; it is not part of the text.
                msg = retext(msg, &body);
            }
            FrameKind::Ack { tag } => {
                let probe = self.ping.on_ack(&msg.src, tag, true, now);
                return Disposition::Ack { probe };
            }
            FrameKind::Rej { tag } => {
                let probe = self.ping.on_ack(&msg.src, tag, false, now);
                return Disposition::Ack { probe };
            }
            FrameKind::Plain => {}
        }

        if self.lock().dedup.seen(&msg.msg_id, now) {
            metrics::inc_duplicates_dropped();
            debug!("{} duplicate msg_id {}", label, msg.msg_id);
            return Disposition::Duplicate;
        }

        if !from_us {
            self.heard
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .record_msg(&msg.src, &msg.dst, Utc::now());
        }

        if !msg.is_command() {
            return Disposition::Chat;
        }
        self.execute(&msg, now)
    }

    /// Text typed on the local client for `dst`.
    pub fn handle_outbound(&self, dst: &str, text: &str) -> Outbound {
        if should_suppress(&self.my_callsign, dst, text, &self.my_callsign) {
            metrics::inc_suppressed_outbound();
            debug!("local command kept off air: {}", escape_log(text));
            let inbound = InboundMessage {
                src: self.my_callsign.clone(),
                dst: dst.to_string(),
                msg: text.to_string(),
                msg_id: String::new(),
                timestamp: Utc::now().timestamp(),
            };
            let msg = normalize(&inbound);
            return Outbound::Executed(self.execute(&msg, Instant::now()));
        }
        if let Err(e) = self.outbox.send(dst, text) {
            warn!("outbound to {} not sent: {}", dst, e);
        }
        Outbound::Transmitted
    }

    /// Send topic beacons that are due. Returns how many went out.
    pub fn fire_beacons(&self, now: Instant) -> usize {
        let due = self.lock().topics.due(now);
        let mut sent = 0;
        for (group, text) in due {
            if should_suppress(&self.my_callsign, &group, &text, &self.my_callsign) {
                warn!("topic beacon for {} looks like a command; not sent", group);
                continue;
            }
            match self
                .outbox
                .send_after(MessageCategory::Beacon, &group, &text, Duration::ZERO)
            {
                Ok(()) => {
                    debug!("topic beacon to {}: {}", group, escape_log(&text));
                    sent += 1;
                }
                Err(e) => warn!("topic beacon to {} not sent: {}", group, e),
            }
        }
        sent
    }

    /// Drop expired dedup, throttle and abuse entries.
    pub fn prune(&self, now: Instant) -> usize {
        let mut st = self.lock();
        st.dedup.prune(now) + st.throttle.prune(now) + st.abuse.prune(now)
    }

    pub fn shutdown(&self) {
        let cancelled = self.ping.cancel_all();
        if cancelled > 0 {
            info!("cancelled {} running ping test(s)", cancelled);
        }
    }

    fn execute(&self, msg: &NormalizedMessage, now: Instant) -> Disposition {
        let Some(mut parsed) = parse(&msg.msg, &msg.raw_msg) else {
            return Disposition::Chat;
        };
        let command: Option<&Command> = self.registry.lookup(&parsed.name);
        let target = match command {
            Some(c) if !c.target_eligible => None,
            Some(c) => extract_target(c.name, &parsed.args_text),
            None => extract_target(&parsed.name, &parsed.args_text),
        };
        let admin = is_admin(&msg.src, &self.admin_callsign);
        let label = route_label(&msg.src, &msg.dst);

        let mut st = self.lock();
        let decision = decide(
            &msg.src,
            &msg.dst,
            target.as_deref(),
            &self.my_callsign,
            st.groups_enabled,
            admin,
        );
        if !decision.execute {
            debug!("{} !{} not for us (target {:?})", label, parsed.name, target);
            return Disposition::NotForUs;
        }
        let reply_to = decision.reply_to;

        if st.abuse.is_blocked(&msg.src, now) {
            debug!("{} dropped: sender blocked", label);
            return Disposition::Blocked;
        }

        let Some(command) = command else {
            info!("{} unknown command {}", label, escape_log(&parsed.name));
            self.record_failure(&mut st, &msg.src, &reply_to, now, None);
            return Disposition::Unknown(parsed.name);
        };

        if let ThrottleVerdict::Throttled { retry_in } = st.throttle.check(
            &msg.src,
            &msg.dst,
            command.name,
            &parsed.args_text,
            command.cooldown,
            now,
        ) {
            drop(st);
            metrics::inc_throttled();
            info!("{} !{} throttled ({}s left)", label, command.name, retry_in.as_secs());
            self.notice(
                &reply_to,
                &format!(
                    "Command throttled, try !{} again in {}s",
                    command.name,
                    retry_in.as_secs().max(1)
                ),
            );
            return Disposition::Throttled { retry_in };
        }

        if command.admin_only && !admin {
            sec_log!("{} !{} denied: not admin", label, command.name);
            self.record_failure(&mut st, &msg.src, &reply_to, now, None);
            return Disposition::Denied(command.name.to_string());
        }
        drop(st);

        parsed.name = command.name.to_string();
        let args = resolve_args(&parsed, target.as_deref());
        let ctx = CommandContext {
            src: &msg.src,
            reply_to: &reply_to,
            my_callsign: &self.my_callsign,
            is_admin: admin,
            wall_now: Utc::now(),
        };
        let result = match &command.action {
            Action::Handler(h) => h.handle(&ctx, &args),
            Action::Help => Ok(self.registry.help_text(admin)),
            Action::Group => self.run_group(&args),
            Action::Kickban => self.run_kickban(&args, &msg.src),
            Action::Topic => self.run_topic(&args, now),
            Action::CtcPing => self.run_ctcping(&args, &reply_to),
        };

        match result {
            Ok(text) => {
                metrics::inc_commands_executed();
                let frames = match self.outbox.send_reply(&reply_to, &text) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("reply to {} not sent: {}", reply_to, e);
                        0
                    }
                };
                info!("{} !{} -> {} ({} frame(s))", label, command.name, reply_to, frames);
                Disposition::Executed {
                    command: command.name.to_string(),
                    reply_to,
                    frames,
                }
            }
            Err(e) => {
                warn!("{} !{} failed: {}", label, command.name, e);
                let text = format!("!{} failed: {}", command.name, e);
                let mut st = self.lock();
                self.record_failure(&mut st, &msg.src, &reply_to, now, Some(text));
                Disposition::Failed(e.to_string())
            }
        }
    }

    /// Count a failure against `src`. The block notice replaces `reply` when this
    /// failure starts a block, so the sender gets exactly one message.
    fn record_failure(
        &self,
        st: &mut RouterState,
        src: &str,
        reply_to: &str,
        now: Instant,
        reply: Option<String>,
    ) {
        metrics::inc_command_failures();
        match st.abuse.record_failure(src, now) {
            FailureOutcome::BlockActivated { until } => {
                metrics::inc_abuse_blocks();
                let minutes = until.saturating_duration_since(now).as_secs().div_ceil(60);
                sec_log!("{} blocked for {} min after repeated failed commands", src, minutes);
                self.notice(
                    reply_to,
                    &format!("{}: too many failed commands, blocked for {} min", src, minutes),
                );
            }
            FailureOutcome::Counted { failures } => {
                debug!("{} failure {} recorded", src, failures);
                if let Some(text) = reply {
                    self.notice(reply_to, &text);
                }
            }
            FailureOutcome::AlreadyBlocked => {}
        }
    }

    fn notice(&self, dst: &str, text: &str) {
        if let Err(e) = self
            .outbox
            .send_chunked(MessageCategory::Notice, dst, text)
        {
            warn!("notice to {} not sent: {}", dst, e);
        }
    }

    fn run_group(&self, args: &Kwargs) -> Result<String, CommandError> {
        let mut st = self.lock();
        match args.get("state").map(|s| s.to_ascii_lowercase()) {
            None => {}
            Some(s) if s == "on" => st.groups_enabled = true,
            Some(s) if s == "off" => st.groups_enabled = false,
            Some(other) => {
                return Err(CommandError::InvalidArgument(format!(
                    "state must be on or off, not {}",
                    other
                )))
            }
        }
        Ok(format!(
            "Group responses {}",
            if st.groups_enabled { "ON" } else { "OFF" }
        ))
    }

    fn run_kickban(&self, args: &Kwargs, actor: &str) -> Result<String, CommandError> {
        let mut st = self.lock();
        let action = args.get("action").map(String::as_str).unwrap_or("list");
        match action {
            "list" => Ok(if st.blocklist.is_empty() {
                "Blocklist empty".to_string()
            } else {
                format!(
                    "Blocklist: {}",
                    st.blocklist.iter().cloned().collect::<Vec<_>>().join(", ")
                )
            }),
            "delall" => {
                let n = st.blocklist.len();
                st.blocklist.clear();
                sec_log!("KB cleared by {} ({} entries)", actor, n);
                Ok(format!("Blocklist cleared ({} removed)", n))
            }
            "add" | "del" => {
                let raw = args
                    .get("callsign")
                    .ok_or_else(|| CommandError::InvalidArgument("callsign required".into()))?;
                let base = base_callsign(&validate_callsign(raw)?);
                if action == "del" {
                    return Ok(if st.blocklist.remove(&base) {
                        sec_log!("KB removed {} by {}", base, actor);
                        format!("{} removed from blocklist", base)
                    } else {
                        format!("{} is not blocked", base)
                    });
                }
                if base == self.admin_callsign || base == base_callsign(&self.my_callsign) {
                    return Err(CommandError::InvalidArgument(format!(
                        "cannot block {}",
                        base
                    )));
                }
                st.blocklist.insert(base.clone());
                sec_log!("KB added {} by {}", base, actor);
                Ok(format!("{} blocked", base))
            }
            other => Err(CommandError::InvalidArgument(format!(
                "unknown kb action {}",
                other
            ))),
        }
    }

    fn run_topic(&self, args: &Kwargs, now: Instant) -> Result<String, CommandError> {
        let mut st = self.lock();
        match args.get("action").map(String::as_str).unwrap_or("list") {
            "list" => Ok(st.topics.describe()),
            "delete" => {
                let group = args.get("group").ok_or(TopicError::MissingGroup)?;
                let removed = st.topics.delete(group)?;
                info!("topic for group {} deleted", removed.group);
                Ok(format!("Topic for group {} deleted", removed.group))
            }
            _ => {
                let group = args.get("group").ok_or(TopicError::MissingGroup)?;
                let text = args.get("text").map(String::as_str).unwrap_or("");
                let interval = parse_interval(args.get("interval").map(String::as_str))?;
                let replaced = st.topics.set(group, text, interval, now)?;
                info!(
                    "topic for group {} {} every {}m",
                    group,
                    if replaced { "replaced" } else { "set" },
                    interval
                );
                Ok(format!("Topic for group {} set, every {} min", group, interval))
            }
        }
    }

    fn run_ctcping(&self, args: &Kwargs, reply_to: &str) -> Result<String, CommandError> {
        let target = args
            .get("call")
            .ok_or_else(|| CommandError::InvalidArgument("call required".into()))?;
        let target = validate_callsign(target)?;
        if target == self.my_callsign {
            return Err(PingError::SelfTarget.into());
        }
        let payload = match args.get("payload") {
            Some(raw) => parse_bounded("payload", raw, 1, MAX_PAYLOAD)?,
            None => DEFAULT_PAYLOAD,
        } as usize;
        let repeat = match args.get("repeat") {
            Some(raw) => parse_bounded("repeat", raw, 1, MAX_REPEAT)?,
            None => DEFAULT_REPEAT,
        } as usize;
        let id = self.ping.start(&target, reply_to, payload, repeat)?;
        Ok(format!(
            "Ping #{} to {} started: {} x {}B",
            id, target, repeat, payload
        ))
    }
}

/// Same frame with the text replaced (echo tag stripped).
fn retext(msg: NormalizedMessage, body: &str) -> NormalizedMessage {
    let raw = body.trim().to_string();
    let text = if is_command(&raw) {
        raw.to_uppercase()
    } else {
        raw.clone()
    };
    NormalizedMessage {
        msg: text,
        raw_msg: raw,
        ..msg
    }
}
