//! Command text parsing and per-command positional fallback.
//!
//! `!STATS HOURS:24 DB0ED-99` parses into name `stats`, keyword `hours=24` and the
//! positional token `DB0ED-99`. Positional tokens only fill a keyword when the user did
//! not supply that keyword explicitly.
use std::collections::BTreeMap;

use crate::router::target::split_kv;

/// Keyword arguments handed to a handler. Keys are lowercase.
pub type Kwargs = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Command word, lowercase, without the `!`.
    pub name: String,
    /// Argument text after the command word, as normalized (uppercase).
    pub args_text: String,
    /// Argument text in its original case.
    pub raw_args: String,
    pub kwargs: Kwargs,
    /// Bare tokens in order of appearance.
    pub positional: Vec<String>,
}

fn split_command(text: &str) -> Option<(&str, &str)> {
    let body = text.trim().strip_prefix('!')?;
    let (name, args) = match body.split_once(char::is_whitespace) {
        Some((n, a)) => (n, a.trim()),
        None => (body, ""),
    };
    if name.is_empty() {
        return None;
    }
    Some((name, args))
}

/// Parse a normalized command; `raw` is the same text in its original case.
pub fn parse(normalized: &str, raw: &str) -> Option<ParsedCommand> {
    let (name, args) = split_command(normalized)?;
    let raw_args = split_command(raw).map(|(_, a)| a).unwrap_or(args);

    let mut kwargs = Kwargs::new();
    let mut positional = Vec::new();
    for tok in args.split_whitespace() {
        match split_kv(tok) {
            Some((k, v)) => {
                kwargs.insert(k.to_ascii_lowercase(), v.to_string());
            }
            None => positional.push(tok.to_string()),
        }
    }

    Some(ParsedCommand {
        name: name.to_ascii_lowercase(),
        args_text: args.to_string(),
        raw_args: raw_args.to_string(),
        kwargs,
        positional,
    })
}

fn is_number(tok: &str) -> bool {
    !tok.is_empty() && tok.bytes().all(|b| b.is_ascii_digit())
}

/// Final handler arguments: explicit keywords plus positional fallback.
///
/// `target` is the routing target already extracted from this command; that token is a
/// routing hint and never fills an argument. `target:` itself is stripped too.
pub fn resolve_args(cmd: &ParsedCommand, target: Option<&str>) -> Kwargs {
    let mut out = cmd.kwargs.clone();
    out.remove("target");

    let mut bare: Vec<&str> = cmd.positional.iter().map(|s| s.as_str()).collect();
    if let Some(t) = target {
        if let Some(pos) = bare.iter().rposition(|b| b.eq_ignore_ascii_case(t)) {
            bare.remove(pos);
        }
    }

    match cmd.name.as_str() {
        "search" | "pos" => {
            if !out.contains_key("call") {
                if let Some(first) = bare.first() {
                    out.insert("call".into(), first.to_string());
                }
            }
        }
        "stats" => {
            if !out.contains_key("hours") {
                if let Some(n) = bare.iter().find(|t| is_number(t)) {
                    out.insert("hours".into(), n.to_string());
                }
            }
        }
        "mheard" => {
            if !out.contains_key("limit") {
                if let Some(n) = bare.iter().find(|t| is_number(t)) {
                    out.insert("limit".into(), n.to_string());
                }
            }
            if !out.contains_key("type") {
                if let Some(t) = bare
                    .iter()
                    .map(|t| t.to_ascii_lowercase())
                    .find(|t| matches!(t.as_str(), "msg" | "pos" | "all"))
                {
                    out.insert("type".into(), t);
                }
            }
        }
        "group" => {
            if !out.contains_key("state") {
                if let Some(first) = bare.first() {
                    out.insert("state".into(), first.to_ascii_lowercase());
                }
            }
        }
        "kb" => resolve_kickban(&mut out, &bare),
        "topic" => resolve_topic(&mut out, cmd),
        // ctcping takes keywords only.
        _ => {}
    }
    out
}

fn resolve_kickban(out: &mut Kwargs, bare: &[&str]) {
    if out.contains_key("action") {
        return;
    }
    match bare.first().map(|t| t.to_ascii_lowercase()) {
        None => {
            out.insert("action".into(), "list".into());
        }
        Some(first) if first == "list" || first == "delall" => {
            out.insert("action".into(), first);
        }
        Some(_) => {
            if !out.contains_key("callsign") {
                out.insert("callsign".into(), bare[0].to_uppercase());
            }
            let action = match bare.get(1).map(|t| t.to_ascii_lowercase()) {
                Some(ref t) if t == "del" => "del",
                _ => "add",
            };
            out.insert("action".into(), action.into());
        }
    }
}

/// `!topic` lists, `!topic delete G` removes, `!topic G text... [interval:N | N]` sets.
/// Parsed from the original-case text so beacon text keeps its case.
fn resolve_topic(out: &mut Kwargs, cmd: &ParsedCommand) {
    let tokens: Vec<&str> = cmd.raw_args.split_whitespace().collect();
    let Some(first) = tokens.first() else {
        out.insert("action".into(), "list".into());
        return;
    };
    if first.eq_ignore_ascii_case("delete") || first.eq_ignore_ascii_case("del") {
        out.insert("action".into(), "delete".into());
        if let Some(g) = tokens.get(1) {
            out.insert("group".into(), g.to_string());
        }
        return;
    }

    out.insert("action".into(), "set".into());
    out.insert("group".into(), first.to_string());

    let mut text_tokens: Vec<&str> = tokens[1..].to_vec();
    // An explicit interval:N anywhere wins; a trailing bare number is the fallback.
    let mut interval = None;
    text_tokens.retain(|t| match split_kv(t) {
        Some((k, v)) if k.eq_ignore_ascii_case("interval") => {
            interval = Some(v.to_string());
            false
        }
        _ => true,
    });
    if interval.is_none() && text_tokens.len() > 1 {
        if let Some(last) = text_tokens.last() {
            if is_number(last) {
                interval = Some(last.to_string());
                text_tokens.pop();
            }
        }
    }
    if let Some(i) = interval {
        out.insert("interval".into(), i);
    }
    out.insert("text".into(), text_tokens.join(" "));
}
