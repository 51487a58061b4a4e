//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use mcrouter::commands::weather::WeatherCache;
use mcrouter::config::Config;
use mcrouter::outbound::chunk::Chunker;
use mcrouter::outbound::{OutgoingFrame, Outbox};
use mcrouter::router::normalize::InboundMessage;
use mcrouter::router::Router;
use tokio::sync::mpsc;

pub const ME: &str = "DB0ED-99";
pub const ADMIN: &str = "DK5EN";

pub fn config() -> Config {
    let mut config = Config::default();
    config.node.callsign = ME.to_string();
    config.node.admin_callsign = ADMIN.to_string();
    config
}

/// Router whose frames land on the returned receiver immediately (no pacing).
pub fn router_with(config: &Config) -> (Router, mpsc::UnboundedReceiver<OutgoingFrame>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let outbox = Outbox::immediate(
        tx,
        Chunker::new(config.router.frame_limit_bytes, config.router.max_frames),
    );
    (Router::new(config, outbox, WeatherCache::new()), rx)
}

pub fn router() -> (Router, mpsc::UnboundedReceiver<OutgoingFrame>) {
    router_with(&config())
}

pub fn frame(src: &str, dst: &str, msg: &str, msg_id: &str) -> InboundMessage {
    InboundMessage {
        src: src.to_string(),
        dst: dst.to_string(),
        msg: msg.to_string(),
        msg_id: msg_id.to_string(),
        timestamp: 0,
    }
}

/// Everything sent so far.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<OutgoingFrame>) -> Vec<OutgoingFrame> {
    let mut out = Vec::new();
    while let Ok(f) = rx.try_recv() {
        out.push(f);
    }
    out
}
