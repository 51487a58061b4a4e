//! Inbound frame normalization.
//!
//! MeshCom reports the sender together with the relay path (`DK5EN-1,DB0ED-99,OE1XXX-12`);
//! only the first hop is the originator. Callsigns and command text are uppercased so
//! every later comparison is a plain equality check.
use serde::{Deserialize, Serialize};

/// Frame as delivered by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub src: String,
    pub dst: String,
    pub msg: String,
    #[serde(default)]
    pub msg_id: String,
    #[serde(default)]
    pub timestamp: i64,
}

/// Normalized view of an [`InboundMessage`]. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMessage {
    /// Originating callsign, relay path stripped.
    pub src: String,
    pub dst: String,
    /// Message text; uppercased when it is a command.
    pub msg: String,
    /// Text exactly as received (used where case matters, e.g. topic beacons).
    pub raw_msg: String,
    pub msg_id: String,
    pub timestamp: i64,
}

impl NormalizedMessage {
    pub fn is_command(&self) -> bool {
        is_command(&self.msg)
    }
}

pub fn is_command(msg: &str) -> bool {
    msg.trim_start().starts_with('!')
}

/// Originating callsign from a relay path (`A,B,C` -> `A`).
pub fn origin_callsign(src: &str) -> String {
    src.split(',').next().unwrap_or("").trim().to_uppercase()
}

pub fn normalize(inbound: &InboundMessage) -> NormalizedMessage {
    let raw = inbound.msg.trim().to_string();
    let msg = if is_command(&raw) {
        raw.to_uppercase()
    } else {
        raw.clone()
    };
    NormalizedMessage {
        src: origin_callsign(&inbound.src),
        dst: inbound.dst.trim().to_uppercase(),
        msg,
        raw_msg: raw,
        msg_id: inbound.msg_id.trim().to_string(),
        timestamp: inbound.timestamp,
    }
}
