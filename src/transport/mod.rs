//! MeshCom UDP/JSON transport.
//!
//! The node pushes every frame it hears as a JSON datagram:
//!
//! ```json
//! {"type":"msg","src":"DK5EN-1,DB0ED-99","dst":"20","msg":"!wx","msg_id":"A1B2C3D4"}
//! {"type":"pos","src":"DK5EN-12","lat":48.1234,"long":11.5678}
//! ```
//!
//! and accepts `{"type":"msg","dst":"20","msg":"text"}` to transmit. Everything else
//! (telemetry, acks for the web UI) is ignored. The transport only converts between
//! datagrams and the router's types; it makes no routing decisions.
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::logutil::escape_log;
use crate::outbound::OutgoingFrame;
use crate::router::normalize::InboundMessage;

const MAX_DATAGRAM: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("malformed datagram: {0}")]
    Json(#[from] serde_json::Error),

    #[error("datagram is not UTF-8")]
    Utf8,

    #[error("missing field {0}")]
    MissingField(&'static str),
}

/// Decoded datagram handed to the server loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(InboundMessage),
    Position { src: String, lat: f64, lon: f64 },
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    src: Option<String>,
    #[serde(default)]
    dst: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    msg_id: Option<serde_json::Value>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default, alias = "lon")]
    long: Option<f64>,
}

#[derive(Debug, Serialize)]
struct TxFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    dst: &'a str,
    msg: &'a str,
}

/// Decode one datagram. `Ok(None)` for frame types the router does not care about.
pub fn decode_datagram(data: &[u8]) -> Result<Option<TransportEvent>, TransportError> {
    let text = std::str::from_utf8(data).map_err(|_| TransportError::Utf8)?;
    let raw: RawFrame = serde_json::from_str(text.trim())?;
    match raw.kind.as_str() {
        "msg" => {
            let src = raw.src.ok_or(TransportError::MissingField("src"))?;
            let msg = raw.msg.ok_or(TransportError::MissingField("msg"))?;
            // Firmware sends the id either as a hex string or a number.
            let msg_id = match raw.msg_id {
                Some(serde_json::Value::String(s)) => s,
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            Ok(Some(TransportEvent::Message(InboundMessage {
                src,
                dst: raw.dst.unwrap_or_default(),
                msg,
                msg_id,
                timestamp: raw.timestamp.unwrap_or_default(),
            })))
        }
        "pos" => {
            let src = raw.src.ok_or(TransportError::MissingField("src"))?;
            match (raw.lat, raw.long) {
                (Some(lat), Some(lon)) => Ok(Some(TransportEvent::Position { src, lat, lon })),
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

pub fn encode_frame(frame: &OutgoingFrame) -> Result<Vec<u8>, TransportError> {
    let dst = if frame.dst.is_empty() { "*" } else { frame.dst.as_str() };
    Ok(serde_json::to_vec(&TxFrame {
        kind: "msg",
        dst,
        msg: &frame.text,
    })?)
}

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    node_addr: String,
}

impl UdpTransport {
    pub async fn bind(bind: &str, node_addr: &str) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind UDP {}: {}", bind, e))?;
        log::info!("udp transport bound to <{}>, node at <{}>", bind, node_addr);
        Ok(Self {
            socket: Arc::new(socket),
            node_addr: node_addr.to_string(),
        })
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.socket.local_addr().ok()
    }

    /// Spawn the receive and transmit tasks. Both end when their channel closes.
    pub fn spawn(
        self,
        events: mpsc::UnboundedSender<TransportEvent>,
        mut outgoing: mpsc::UnboundedReceiver<OutgoingFrame>,
    ) -> (JoinHandle<()>, JoinHandle<()>) {
        let rx_socket = self.socket.clone();
        let rx_task = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                match rx_socket.recv_from(&mut buf).await {
                    Ok((n, from)) => match decode_datagram(&buf[..n]) {
                        Ok(Some(event)) => {
                            log::trace!("udp rx << {} {:?}", from, event);
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => log::debug!(
                            "udp rx from {}: {} ({})",
                            from,
                            e,
                            escape_log(&String::from_utf8_lossy(&buf[..n]))
                        ),
                    },
                    Err(e) => {
                        log::warn!("udp transport receive error: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                    }
                }
            }
            log::debug!("udp receive task ended");
        });

        let tx_socket = self.socket;
        let node_addr = self.node_addr;
        let tx_task = tokio::spawn(async move {
            while let Some(frame) = outgoing.recv().await {
                match encode_frame(&frame) {
                    Ok(bytes) => {
                        log::trace!("udp tx >> {} {}", frame.dst, escape_log(&frame.text));
                        if let Err(e) = tx_socket.send_to(&bytes, &node_addr).await {
                            log::warn!("udp send to {} failed: {}", node_addr, e);
                        }
                    }
                    Err(e) => log::warn!("frame to {} not encoded: {}", frame.dst, e),
                }
            }
            log::debug!("udp transmit task ended");
        });

        (rx_task, tx_task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_message_frames() {
        let data = br#"{"type":"msg","src":"DK5EN-1,DB0ED-99","dst":"20","msg":"!wx","msg_id":"A1B2C3D4"}"#;
        match decode_datagram(data).unwrap() {
            Some(TransportEvent::Message(m)) => {
                assert_eq!(m.src, "DK5EN-1,DB0ED-99");
                assert_eq!(m.dst, "20");
                assert_eq!(m.msg_id, "A1B2C3D4");
            }
            other => panic!("unexpected {:?}", other),
        }
        let numeric = br#"{"type":"msg","src":"DK5EN-1","dst":"*","msg":"hi","msg_id":1234}"#;
        match decode_datagram(numeric).unwrap() {
            Some(TransportEvent::Message(m)) => assert_eq!(m.msg_id, "1234"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decodes_positions_and_ignores_telemetry() {
        let pos = br#"{"type":"pos","src":"DK5EN-12","lat":48.1,"long":11.5}"#;
        assert_eq!(
            decode_datagram(pos).unwrap(),
            Some(TransportEvent::Position {
                src: "DK5EN-12".into(),
                lat: 48.1,
                lon: 11.5
            })
        );
        let tele = br#"{"type":"tele","src":"DK5EN-12","temp":21.5}"#;
        assert_eq!(decode_datagram(tele).unwrap(), None);
        assert!(decode_datagram(b"not json").is_err());
        assert!(matches!(
            decode_datagram(br#"{"type":"msg","dst":"20","msg":"x"}"#),
            Err(TransportError::MissingField("src"))
        ));
    }

    #[test]
    fn encodes_outgoing_frame() {
        let bytes = encode_frame(&OutgoingFrame {
            dst: "20".into(),
            text: "(1/2) hello".into(),
        })
        .unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["type"], "msg");
        assert_eq!(v["dst"], "20");
        assert_eq!(v["msg"], "(1/2) hello");
    }
}
