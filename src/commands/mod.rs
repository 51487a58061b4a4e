//! # Command registry
//!
//! Every command the proxy answers is a small [`Command`] value registered once at
//! startup: its name and aliases, whether it is admin-only, its cooldown class, whether
//! it may be routed to another node, and the [`Action`] that runs it. Lookup goes
//! through a name/alias map.
//!
//! - [`parse`] - command text to name, keywords and positionals
//! - [`handlers`] - bodies of the self-contained commands
//! - [`heard`] - recently heard stations backing `mheard`/`search`/`pos`/`stats`
//! - [`weather`] - cached weather report for `wx`

pub mod handlers;
pub mod heard;
pub mod parse;
pub mod weather;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use parse::{parse, resolve_args, Kwargs, ParsedCommand};

use self::handlers::{
    DiceHandler, MheardHandler, PosHandler, SearchHandler, SharedHeardLog, StatsHandler,
    TimeHandler, UserInfoHandler, WxHandler,
};
use self::weather::WeatherCache;
use crate::ping::PingError;
use crate::router::throttle::CooldownClass;
use crate::topic::TopicError;
use crate::validation::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("{0} is restricted to the admin")]
    PermissionDenied(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Topic(#[from] TopicError),

    #[error(transparent)]
    Ping(#[from] PingError),
}

/// What a handler sees of the request.
#[derive(Debug, Clone)]
pub struct CommandContext<'a> {
    pub src: &'a str,
    pub reply_to: &'a str,
    pub my_callsign: &'a str,
    pub is_admin: bool,
    pub wall_now: DateTime<Utc>,
}

pub trait CommandHandler: Send + Sync {
    fn handle(&self, ctx: &CommandContext<'_>, args: &Kwargs) -> Result<String, CommandError>;
}

/// How a command is executed. The non-`Handler` variants need router state and are
/// run by the router.
#[derive(Clone)]
pub enum Action {
    Help,
    Group,
    Kickban,
    Topic,
    CtcPing,
    Handler(Arc<dyn CommandHandler>),
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Help => f.write_str("Help"),
            Action::Group => f.write_str("Group"),
            Action::Kickban => f.write_str("Kickban"),
            Action::Topic => f.write_str("Topic"),
            Action::CtcPing => f.write_str("CtcPing"),
            Action::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Command {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub admin_only: bool,
    pub cooldown: CooldownClass,
    /// May be routed to another node with a target.
    pub target_eligible: bool,
    pub action: Action,
}

impl Command {
    pub fn new(name: &'static str, action: Action) -> Self {
        Self {
            name,
            aliases: &[],
            admin_only: false,
            cooldown: CooldownClass::for_command(name),
            target_eligible: true,
            action,
        }
    }

    pub fn aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    /// Admin-only and never routed.
    pub fn admin(mut self) -> Self {
        self.admin_only = true;
        self.target_eligible = false;
        self
    }
}

#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `cmd`; a later registration wins over an earlier name or alias.
    pub fn register(&mut self, cmd: Command) {
        let idx = self.commands.len();
        self.index.insert(cmd.name.to_ascii_lowercase(), idx);
        for alias in cmd.aliases {
            self.index.insert(alias.to_ascii_lowercase(), idx);
        }
        self.commands.push(cmd);
    }

    pub fn lookup(&self, name: &str) -> Option<&Command> {
        let key = name.trim_start_matches('!').to_ascii_lowercase();
        self.index.get(&key).and_then(|&i| self.commands.get(i))
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    /// One-line overview for `!help`; admin commands only for the admin.
    pub fn help_text(&self, include_admin: bool) -> String {
        let public: Vec<String> = self
            .commands
            .iter()
            .filter(|c| !c.admin_only)
            .map(|c| format!("!{}", c.name))
            .collect();
        let mut out = format!("Commands: {}", public.join(" "));
        if include_admin {
            let admin: Vec<String> = self
                .commands
                .iter()
                .filter(|c| c.admin_only)
                .map(|c| format!("!{}", c.name))
                .collect();
            if !admin.is_empty() {
                out.push_str(&format!(" | admin: {}", admin.join(" ")));
            }
        }
        out.push_str(" | target:CALL runs it on another node");
        out
    }

    /// The built-in command set.
    pub fn builtin(heard: SharedHeardLog, weather: WeatherCache, userinfo: &str) -> Self {
        let mut r = Self::new();
        r.register(Command::new("help", Action::Help).aliases(&["h", "?"]));
        r.register(Command::new("wx", Action::Handler(Arc::new(WxHandler::new(weather)))).aliases(&["weather"]));
        r.register(
            Command::new("mheard", Action::Handler(Arc::new(MheardHandler::new(heard.clone()))))
                .aliases(&["mh"]),
        );
        r.register(
            Command::new("search", Action::Handler(Arc::new(SearchHandler::new(heard.clone()))))
                .aliases(&["s"]),
        );
        r.register(Command::new("pos", Action::Handler(Arc::new(PosHandler::new(heard.clone())))));
        r.register(Command::new("stats", Action::Handler(Arc::new(StatsHandler::new(heard)))));
        r.register(Command::new("dice", Action::Handler(Arc::new(DiceHandler))));
        r.register(Command::new("time", Action::Handler(Arc::new(TimeHandler))));
        r.register(
            Command::new("userinfo", Action::Handler(Arc::new(UserInfoHandler::new(userinfo))))
                .aliases(&["info"]),
        );
        r.register(Command::new("ctcping", Action::CtcPing));
        r.register(Command::new("group", Action::Group).admin());
        r.register(Command::new("kb", Action::Kickban).aliases(&["kickban"]).admin());
        r.register(Command::new("topic", Action::Topic).admin());
        r
    }
}

#[cfg(test)]
mod tests {
    use super::heard::HeardLog;
    use super::*;
    use std::sync::Mutex;

    fn registry() -> CommandRegistry {
        CommandRegistry::builtin(
            Arc::new(Mutex::new(HeardLog::new(10))),
            WeatherCache::new(),
            "Node DB0ED-99",
        )
    }

    #[test]
    fn lookup_by_name_and_alias() {
        let r = registry();
        assert_eq!(r.lookup("MH").map(|c| c.name), Some("mheard"));
        assert_eq!(r.lookup("!weather").map(|c| c.name), Some("wx"));
        assert_eq!(r.lookup("kickban").map(|c| c.name), Some("kb"));
        assert!(r.lookup("nosuch").is_none());
    }

    #[test]
    fn admin_commands_are_local_and_short() {
        let r = registry();
        for name in ["group", "kb", "topic"] {
            let c = r.lookup(name).unwrap();
            assert!(c.admin_only);
            assert!(!c.target_eligible);
            assert_eq!(c.cooldown, CooldownClass::Short);
        }
        assert_eq!(r.lookup("stats").unwrap().cooldown, CooldownClass::Long);
        assert!(r.lookup("stats").unwrap().target_eligible);
    }

    #[test]
    fn help_hides_admin_commands() {
        let r = registry();
        let public = r.help_text(false);
        assert!(public.contains("!wx"));
        assert!(!public.contains("!kb"));
        assert!(r.help_text(true).contains("admin: !group !kb !topic"));
    }
}
