//! Echo and ACK recognition.
//!
//! The node rebroadcasts every frame it puts on air back to its originator with a short
//! numeric tag appended (`hello{034}`; older firmware omits the closing brace). Direct
//! messages are later confirmed by the receiving node with `:ack034` or refused with
//! `:rej034`. Neither kind is ever a command.

use crate::validation::is_callsign;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Our own frame seen on air. `body` is the text without the tag.
    Echo { body: String, tag: u32 },
    Ack { tag: u32 },
    Rej { tag: u32 },
    Plain,
}

pub fn classify(msg: &str) -> FrameKind {
    if let Some((verdict, tag)) = parse_ack(msg) {
        return match verdict {
            Verdict::Ack => FrameKind::Ack { tag },
            Verdict::Rej => FrameKind::Rej { tag },
        };
    }
    if let Some((body, tag)) = parse_echo(msg) {
        return FrameKind::Echo {
            body: body.to_string(),
            tag,
        };
    }
    FrameKind::Plain
}

enum Verdict {
    Ack,
    Rej,
}

/// `:ackNNN` / `:rejNNN` as the whole payload, optionally after the acknowledging
/// callsign. A `:ack` inside chat text is not an ACK.
fn parse_ack(msg: &str) -> Option<(Verdict, u32)> {
    let trimmed = msg.trim();
    let (lead, rest) = trimmed.split_once(':')?;
    let lead = lead.trim();
    if !lead.is_empty() && !is_callsign(&lead.to_ascii_uppercase()) {
        return None;
    }
    if rest.len() < 4 || !rest.is_char_boundary(3) {
        return None;
    }
    let (kind, digits) = rest.split_at(3);
    let verdict = if kind.eq_ignore_ascii_case("ack") {
        Verdict::Ack
    } else if kind.eq_ignore_ascii_case("rej") {
        Verdict::Rej
    } else {
        return None;
    };
    if digits.len() > 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|tag| (verdict, tag))
}

fn parse_echo(msg: &str) -> Option<(&str, u32)> {
    let trimmed = msg.trim_end();
    let without_close = trimmed.strip_suffix('}').unwrap_or(trimmed);
    let open = without_close.rfind('{')?;
    let digits = &without_close[open + 1..];
    if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let tag = digits.parse().ok()?;
    Some((&without_close[..open], tag))
}
