//! Log helpers: keep mesh payloads on a single log line.
//!
//! Frames arriving from the radio side can contain newlines (two-line replies),
//! emoji and the occasional stray control byte; `escape_log` renders them safely.

const MAX_PREVIEW: usize = 200;

/// Security-relevant events (blocks, kick-bans, admin denials). The binary tees the
/// `security` target into its own file.
macro_rules! sec_log {
    ($($arg:tt)*) => { log::warn!(target: "security", $($arg)*); };
}
pub(crate) use sec_log;

/// Escape newlines, tabs and other control characters and cap the preview length.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => out.push_str(&format!("\\u{{{:04x}}}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Short `src>dst` label used as a log prefix for a frame.
pub fn route_label(src: &str, dst: &str) -> String {
    let dst = if dst.is_empty() { "*" } else { dst };
    format!("{}>{}", src, dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_two_line_reply() {
        assert_eq!(escape_log("MSG: 3\nPOS: 1"), "MSG: 3\\nPOS: 1");
        assert_eq!(escape_log("a\u{7}b"), "a\\u{0007}b");
    }

    #[test]
    fn caps_long_payloads() {
        let long = "x".repeat(500);
        let esc = escape_log(&long);
        assert!(esc.ends_with('…'));
        assert_eq!(esc.chars().count(), MAX_PREVIEW + 1);
    }

    #[test]
    fn empty_dst_renders_as_broadcast() {
        assert_eq!(route_label("DK5EN-1", ""), "DK5EN-1>*");
    }
}
