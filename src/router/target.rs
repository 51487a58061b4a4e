//! Decide which node a command is meant for.
//!
//! Priority order:
//! 1. `GROUP`, `KB` and `TOPIC` configure the node they are typed on and never route.
//! 2. An explicit `target:VALUE` wins. `LOCAL`, an empty value or anything that is not a
//!    callsign means "run here".
//! 3. Otherwise the bare (non `key:value`) tokens are scanned right to left and the first
//!    callsign-shaped one is the target.
//!
//! `SEARCH` and `POS` take a callsign as their first positional argument. When no
//! `call:` key is given that first bare token is the subject of the lookup, not a
//! routing hint, so it is skipped by step 3. This departs from a strictly right-to-left
//! scan: `!search DK5EN-1` runs here and looks up DK5EN-1.
use crate::validation::is_callsign;

/// Commands that always execute where they were typed.
pub const NEVER_TARGETED: [&str; 3] = ["GROUP", "KB", "TOPIC"];

/// Commands whose first bare token is a callsign argument.
const CALLSIGN_POSITIONAL: [&str; 2] = ["SEARCH", "POS"];

/// A `key:value` token. Keys are alphabetic so times like `20:00` stay positional.
pub fn split_kv(token: &str) -> Option<(&str, &str)> {
    let (key, value) = token.split_once(':')?;
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphabetic() || b == b'_') {
        return None;
    }
    Some((key, value))
}

/// Target for `command` given its argument text (everything after the command word).
pub fn extract_target(command: &str, args: &str) -> Option<String> {
    let command = command.trim_start_matches('!').to_uppercase();
    if NEVER_TARGETED.contains(&command.as_str()) {
        return None;
    }

    let tokens: Vec<&str> = args.split_whitespace().collect();

    for tok in &tokens {
        if let Some((key, value)) = split_kv(tok) {
            if key.eq_ignore_ascii_case("target") {
                let value = value.trim().to_uppercase();
                if value.is_empty() || value == "LOCAL" || !is_callsign(&value) {
                    return None;
                }
                return Some(value);
            }
        }
    }

    let mut bare: Vec<&str> = tokens.iter().copied().filter(|t| split_kv(t).is_none()).collect();
    let has_call_kw = tokens.iter().any(|t| {
        split_kv(t)
            .map(|(k, _)| k.eq_ignore_ascii_case("call"))
            .unwrap_or(false)
    });
    if CALLSIGN_POSITIONAL.contains(&command.as_str()) && !has_call_kw && !bare.is_empty() {
        bare.remove(0);
    }

    bare.iter()
        .rev()
        .map(|t| t.to_uppercase())
        .find(|t| is_callsign(t))
}

/// Target of a whole message such as `!WX TARGET:DB0ED-99`; `None` for chat text.
pub fn extract_from_message(msg: &str) -> Option<String> {
    let body = msg.trim().strip_prefix('!')?;
    let (command, args) = match body.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a),
        None => (body, ""),
    };
    extract_target(command, args)
}
