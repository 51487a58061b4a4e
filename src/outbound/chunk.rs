//! Split replies into radio-sized frames.
//!
//! A frame carries at most 140 UTF-8 bytes and a reply uses at most three frames.
//! Multi-frame replies are prefixed `(i/N) ` and the prefix counts against the frame
//! budget. Strategies, first match wins:
//!
//! 1. Fits in one frame: sent as is, unprefixed.
//! 2. Two lines (e.g. the `mheard` message/position summary): each line is chunked on
//!    its own, so the second line never begins mid-frame.
//! 3. Exactly one `", "`: split there.
//! 4. Station lists joined with `" | "`: packed greedily.
//! 5. Otherwise: fixed-width byte split on character boundaries.
//!
//! Anything beyond the frame cap is dropped.

pub const DEFAULT_FRAME_LIMIT: usize = 140;
pub const DEFAULT_MAX_FRAMES: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    pub frame_limit: usize,
    pub max_frames: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            frame_limit: DEFAULT_FRAME_LIMIT,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

fn prefix(i: usize, n: usize) -> String {
    format!("({}/{}) ", i, n)
}

/// Largest char boundary in `s` that is `<= max`.
fn floor_boundary(s: &str, max: usize) -> usize {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Fixed-width split on char boundaries.
fn split_fixed(text: &str, width: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut end = floor_boundary(rest, width);
        if end == 0 {
            // Width smaller than one character; take the whole character.
            end = rest.chars().next().map(|c| c.len_utf8()).unwrap_or(rest.len());
        }
        parts.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    parts
}

/// Greedy packing of `parts` joined by `sep`; oversized parts are split fixed-width.
fn pack(parts: &[&str], sep: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for part in parts {
        let candidate_len = if current.is_empty() {
            part.len()
        } else {
            current.len() + sep.len() + part.len()
        };
        if candidate_len <= width {
            if !current.is_empty() {
                current.push_str(sep);
            }
            current.push_str(part);
            continue;
        }
        if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        if part.len() <= width {
            current.push_str(part);
        } else {
            let mut pieces = split_fixed(part, width);
            if let Some(last) = pieces.pop() {
                out.append(&mut pieces);
                current = last;
            }
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// One line of a two-line reply: station lists packed, anything else split fixed-width.
fn split_line(line: &str, width: usize) -> Vec<String> {
    if line.contains(" | ") {
        let stations: Vec<&str> = line.split(" | ").collect();
        pack(&stations, " | ", width)
    } else {
        split_fixed(line, width)
    }
}

impl Chunker {
    pub fn new(frame_limit: usize, max_frames: usize) -> Self {
        Self {
            frame_limit,
            max_frames: max_frames.max(1),
        }
    }

    /// Payload bytes left in a frame once the `(i/N) ` prefix is added.
    fn payload_width(&self) -> usize {
        let n = self.max_frames.max(2);
        self.frame_limit.saturating_sub(prefix(n, n).len()).max(1)
    }

    /// Split `text` into the frames to transmit, prefixes included.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.len() <= self.frame_limit {
            return vec![text.to_string()];
        }
        let width = self.payload_width();
        let mut parts = self.split_parts(text, width);
        parts.truncate(self.max_frames);
        if parts.len() == 1 {
            // Only reachable when max_frames is 1: a single truncated frame, unprefixed.
            let only = parts.remove(0);
            let end = floor_boundary(&only, self.frame_limit);
            return vec![only[..end].to_string()];
        }
        let total = parts.len();
        parts
            .into_iter()
            .enumerate()
            .map(|(i, p)| format!("{}{}", prefix(i + 1, total), p))
            .collect()
    }

    fn split_parts(&self, text: &str, width: usize) -> Vec<String> {
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() == 2 && lines.iter().all(|l| !l.is_empty()) {
            let mut parts = split_line(lines[0], width);
            parts.extend(split_line(lines[1], width));
            return parts;
        }

        if text.matches(", ").count() == 1 {
            if let Some((a, b)) = text.split_once(", ") {
                if a.len() <= width && b.len() <= width {
                    return vec![a.to_string(), b.to_string()];
                }
            }
        }

        if text.contains(" | ") {
            let stations: Vec<&str> = text.split(" | ").collect();
            return pack(&stations, " | ", width);
        }

        split_fixed(text, width)
    }
}

/// Strip the `(i/N) ` prefix from a frame, if present.
pub fn strip_prefix(frame: &str) -> &str {
    if let Some(rest) = frame.strip_prefix('(') {
        if let Some(close) = rest.find(") ") {
            let inner = &rest[..close];
            if let Some((i, n)) = inner.split_once('/') {
                if i.parse::<usize>().is_ok() && n.parse::<usize>().is_ok() {
                    return &rest[close + 2..];
                }
            }
        }
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_unprefixed_frame() {
        let c = Chunker::default();
        assert_eq!(c.chunk("21.3°C, 1013hPa"), vec!["21.3°C, 1013hPa".to_string()]);
        let exact = "x".repeat(140);
        assert_eq!(c.chunk(&exact), vec![exact.clone()]);
    }

    #[test]
    fn long_text_without_separators_round_trips() {
        let c = Chunker::default();
        let text: String = (0..250).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let frames = c.chunk(&text);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].starts_with("(1/2) "));
        assert!(frames[1].starts_with("(2/2) "));
        assert!(frames.iter().all(|f| f.len() <= 140));
        let joined: String = frames.iter().map(|f| strip_prefix(f)).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn single_comma_splits_in_two() {
        let c = Chunker::default();
        let a = "A".repeat(90);
        let b = "B".repeat(90);
        let frames = c.chunk(&format!("{}, {}", a, b));
        assert_eq!(frames, vec![format!("(1/2) {}", a), format!("(2/2) {}", b)]);
    }

    #[test]
    fn station_list_packs_greedily() {
        let c = Chunker::default();
        let stations: Vec<String> = (0..12).map(|i| format!("DK{}ABC-{:02} 12:0{}", i, i, i % 10)).collect();
        let text = stations.join(" | ");
        let frames = c.chunk(&text);
        assert!(frames.len() >= 2);
        for f in &frames {
            assert!(f.len() <= 140, "frame too long: {}", f.len());
            // No station is cut in half.
            for part in strip_prefix(f).split(" | ") {
                assert!(stations.iter().any(|s| s == part), "split station '{}'", part);
            }
        }
    }

    #[test]
    fn two_line_reply_starts_second_line_in_new_frame() {
        let c = Chunker::default();
        let line1 = format!("MSG: {}", "DK5EN-1 ".repeat(10).trim_end());
        let line2 = format!("POS: {}", "DB0ED-99 ".repeat(10).trim_end());
        let frames = c.chunk(&format!("{}\n{}", line1, line2));
        assert_eq!(frames.len(), 2);
        assert_eq!(strip_prefix(&frames[0]), line1);
        assert_eq!(strip_prefix(&frames[1]), line2);
    }

    #[test]
    fn long_first_line_ends_its_own_frames() {
        let c = Chunker::default();
        let msg: Vec<String> = (0..8).map(|i| format!("DK{}ABC-1{} 03:51 (1)", i, i)).collect();
        let line1 = format!("MSG: {}", msg.join(" | "));
        let line2 = "POS: DK7ABC-17 03:51 (2) | DK0ABC-10 03:52 (1)".to_string();
        assert!(line1.len() > 134);
        let frames = c.chunk(&format!("{}\n{}", line1, line2));
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() <= 140 && !f.contains('\n')));
        assert_eq!(strip_prefix(&frames[2]), line2);
        let first: Vec<&str> = frames[..2].iter().map(|f| strip_prefix(f)).collect();
        assert_eq!(first.join(" | "), line1);
    }

    #[test]
    fn truncates_to_three_frames() {
        let c = Chunker::default();
        let text = "z".repeat(1000);
        let frames = c.chunk(&text);
        assert_eq!(frames.len(), 3);
        assert!(frames[2].starts_with("(3/3) "));
    }

    #[test]
    fn never_splits_multibyte_characters() {
        let c = Chunker::default();
        let text = "ä".repeat(150);
        for f in c.chunk(&text) {
            assert!(f.len() <= 140);
            assert!(strip_prefix(&f).chars().all(|ch| ch == 'ä'));
        }
    }
}
