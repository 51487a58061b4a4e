//! Callsign and argument validation shared by the router and command handlers.

/// Errors produced when a user-supplied value fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid callsign: {0}")]
    InvalidCallsign(String),

    #[error("invalid group: {0}")]
    InvalidGroup(String),

    #[error("text too long (maximum {max} characters)")]
    TextTooLong { max: usize },

    #[error("text must not be empty")]
    EmptyText,

    #[error("text must not start with a command prefix")]
    CommandText,

    #[error("{name} out of range ({min}-{max})")]
    OutOfRange { name: &'static str, min: u64, max: u64 },
}

/// Maximum characters allowed in a topic beacon text.
pub const MAX_TOPIC_TEXT: usize = 120;

/// True when `s` is a syntactically valid callsign.
///
/// Mirrors `^(?=.*[A-Z])(?=.*[0-9])[A-Z0-9]{3,8}(-\d{1,2})?$`: an uppercase base of
/// 3 to 8 alphanumerics, an optional `-SSID` of one or two digits, and at least one
/// letter and one digit somewhere in the whole token. This rules out plain words
/// ("MSG", "ON") and bare numbers ("24").
pub fn is_callsign(s: &str) -> bool {
    let (base, ssid) = match s.split_once('-') {
        Some((b, ssid)) => (b, Some(ssid)),
        None => (s, None),
    };
    if !(3..=8).contains(&base.len()) {
        return false;
    }
    if !base
        .bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return false;
    }
    if let Some(ssid) = ssid {
        if !(1..=2).contains(&ssid.len()) || !ssid.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }
    let has_letter = s.bytes().any(|b| b.is_ascii_uppercase());
    let has_digit = s.bytes().any(|b| b.is_ascii_digit());
    has_letter && has_digit
}

/// Validate and return an uppercased callsign.
pub fn validate_callsign(raw: &str) -> Result<String, ValidationError> {
    let upper = raw.trim().to_uppercase();
    if is_callsign(&upper) {
        Ok(upper)
    } else {
        Err(ValidationError::InvalidCallsign(raw.to_string()))
    }
}

/// The base portion of a callsign (everything before `-SSID`), uppercased.
pub fn base_callsign(call: &str) -> String {
    call.split('-').next().unwrap_or("").trim().to_uppercase()
}

/// Groups are numeric channels (e.g. `20`, `262`, `26212`).
pub fn is_group(dst: &str) -> bool {
    !dst.is_empty() && dst.len() <= 5 && dst.bytes().all(|b| b.is_ascii_digit())
}

pub fn validate_group(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if is_group(trimmed) && trimmed.parse::<u32>().map(|g| g > 0).unwrap_or(false) {
        Ok(trimmed.to_string())
    } else {
        Err(ValidationError::InvalidGroup(raw.to_string()))
    }
}

/// Beacon text: non-empty, at most [`MAX_TOPIC_TEXT`] characters, and never a command.
pub fn validate_topic_text(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyText);
    }
    if trimmed.chars().count() > MAX_TOPIC_TEXT {
        return Err(ValidationError::TextTooLong {
            max: MAX_TOPIC_TEXT,
        });
    }
    if trimmed.starts_with('!') {
        return Err(ValidationError::CommandText);
    }
    Ok(trimmed.to_string())
}

/// Parse a bounded integer argument.
pub fn parse_bounded(
    name: &'static str,
    raw: &str,
    min: u64,
    max: u64,
) -> Result<u64, ValidationError> {
    match raw.trim().parse::<u64>() {
        Ok(v) if (min..=max).contains(&v) => Ok(v),
        _ => Err(ValidationError::OutOfRange { name, min, max }),
    }
}
