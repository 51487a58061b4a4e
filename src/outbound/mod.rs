//! # Outbound path
//!
//! - [`chunk`] - split replies into radio-sized, prefixed frames
//! - [`dispatch`] - pacing scheduler between the router and the transport
//!
//! The router never talks to the transport directly. It hands [`OutgoingFrame`]s to an
//! [`Outbox`], which enqueues them on the scheduler; the scheduler forwards them on an
//! unbounded channel that the transport task drains. Sending is fire-and-forget: an
//! error only means the pipeline is shutting down.

pub mod chunk;
pub mod dispatch;

use std::time::Duration;
use tokio::sync::mpsc;

use self::chunk::Chunker;
use self::dispatch::{MessageCategory, MessageEnvelope, SchedulerHandle};

/// One frame for the transport: destination (callsign, group or `*`) and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFrame {
    pub dst: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("outbound channel closed")]
    Closed,
}

#[derive(Clone, Debug)]
enum Sink {
    Scheduled(SchedulerHandle),
    /// Straight to the transport channel, delays ignored. Used by tests and tools.
    Immediate(mpsc::UnboundedSender<OutgoingFrame>),
}

/// Send side handed to the router, ping monitor and topic scheduler.
#[derive(Clone, Debug)]
pub struct Outbox {
    sink: Sink,
    chunker: Chunker,
    frame_gap: Duration,
}

impl Outbox {
    pub fn scheduled(handle: SchedulerHandle, chunker: Chunker, frame_gap: Duration) -> Self {
        Self {
            sink: Sink::Scheduled(handle),
            chunker,
            frame_gap,
        }
    }

    pub fn immediate(tx: mpsc::UnboundedSender<OutgoingFrame>, chunker: Chunker) -> Self {
        Self {
            sink: Sink::Immediate(tx),
            chunker,
            frame_gap: Duration::ZERO,
        }
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Send a single frame as is.
    pub fn send(&self, dst: &str, text: &str) -> Result<(), SendError> {
        self.send_after(MessageCategory::Relay, dst, text, Duration::ZERO)
    }

    pub fn send_after(
        &self,
        category: MessageCategory,
        dst: &str,
        text: &str,
        delay: Duration,
    ) -> Result<(), SendError> {
        let frame = OutgoingFrame {
            dst: dst.to_string(),
            text: text.to_string(),
        };
        match &self.sink {
            Sink::Scheduled(handle) => handle.enqueue(MessageEnvelope::new(category, delay, frame)),
            Sink::Immediate(tx) => tx.send(frame).map_err(|_| SendError::Closed),
        }
    }

    /// Chunk `text` and enqueue the frames `frame_gap` apart. Returns the frame count.
    pub fn send_reply(&self, dst: &str, text: &str) -> Result<usize, SendError> {
        self.send_chunked(MessageCategory::Reply, dst, text)
    }

    pub fn send_chunked(
        &self,
        category: MessageCategory,
        dst: &str,
        text: &str,
    ) -> Result<usize, SendError> {
        let frames = self.chunker.chunk(text);
        for (i, frame) in frames.iter().enumerate() {
            self.send_after(category, dst, frame, self.frame_gap * i as u32)?;
        }
        Ok(frames.len())
    }
}
