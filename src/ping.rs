//! Round-trip measurement with `!ctcping`.
//!
//! A test sends `repeat` probes of `payload` bytes to a target, one after another. Each
//! probe goes through
//!
//! ```text
//! SENT --echo seen--> WAITING_ACK --ack within 30s--> DONE_OK
//!   |                      |-----------timeout------> DONE_TIMEOUT
//!   |                      '-----------rej----------> REJECTED
//!   '--no echo within 30s--> DONE_TIMEOUT
//! ```
//!
//! RTT is measured from the echo (the node putting the probe on air) to the ACK, so the
//! serial/BLE hop between proxy and node does not inflate it. Probes are 20s apart and
//! the whole test is capped at five minutes. Each test runs in its own task; cancelling
//! aborts the task and drops its timers.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::config::RouterTuning;
use crate::metrics;
use crate::outbound::dispatch::MessageCategory;
use crate::outbound::Outbox;

pub const DEFAULT_PAYLOAD: u64 = 25;
pub const MAX_PAYLOAD: u64 = 140;
pub const DEFAULT_REPEAT: u64 = 1;
pub const MAX_REPEAT: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PingError {
    #[error("a ping test to {0} is already running")]
    AlreadyRunning(String),

    #[error("cannot ping this node")]
    SelfTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePhase {
    Sent,
    WaitingAck,
    DoneOk,
    DoneTimeout,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRecord {
    pub text: String,
    pub sent_at: Option<Instant>,
    pub echo_at: Option<Instant>,
    pub tag: Option<u32>,
    pub ack_at: Option<Instant>,
    pub timed_out: bool,
    pub rejected: bool,
}

impl ProbeRecord {
    pub fn new(text: String) -> Self {
        Self {
            text,
            sent_at: None,
            echo_at: None,
            tag: None,
            ack_at: None,
            timed_out: false,
            rejected: false,
        }
    }

    pub fn phase(&self) -> ProbePhase {
        if self.ack_at.is_some() {
            ProbePhase::DoneOk
        } else if self.rejected {
            ProbePhase::Rejected
        } else if self.timed_out {
            ProbePhase::DoneTimeout
        } else if self.echo_at.is_some() {
            ProbePhase::WaitingAck
        } else {
            ProbePhase::Sent
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(
            self.phase(),
            ProbePhase::DoneOk | ProbePhase::DoneTimeout | ProbePhase::Rejected
        )
    }

    /// Our own probe seen on air. Only the first echo counts.
    pub fn on_echo(&mut self, tag: u32, at: Instant) -> bool {
        if self.phase() != ProbePhase::Sent {
            return false;
        }
        self.echo_at = Some(at);
        self.tag = Some(tag);
        true
    }

    pub fn on_ack(&mut self, tag: u32, at: Instant) -> Option<Duration> {
        if self.phase() != ProbePhase::WaitingAck || self.tag != Some(tag) {
            return None;
        }
        self.ack_at = Some(at);
        self.rtt()
    }

    pub fn on_rej(&mut self, tag: u32) -> bool {
        if self.phase() != ProbePhase::WaitingAck || self.tag != Some(tag) {
            return false;
        }
        self.rejected = true;
        true
    }

    /// ACK time minus echo time.
    pub fn rtt(&self) -> Option<Duration> {
        match (self.echo_at, self.ack_at) {
            (Some(echo), Some(ack)) => Some(ack.saturating_duration_since(echo)),
            _ => None,
        }
    }

    /// When this probe gives up if nothing else happens.
    fn deadline(&self, timeout: Duration) -> Option<Instant> {
        self.echo_at.or(self.sent_at).map(|t| t + timeout)
    }
}

/// Probe text: `ctcping <id> <seq>/<total>` padded with dots to `payload` bytes.
pub fn probe_text(test_id: u32, seq: usize, total: usize, payload: usize) -> String {
    let mut text = format!("ctcping {} {}/{}", test_id, seq, total);
    if text.len() + 1 < payload {
        text.push(' ');
        while text.len() < payload {
            text.push('.');
        }
    }
    text
}

#[derive(Debug)]
pub struct PingTest {
    pub id: u32,
    pub target: String,
    pub reply_to: String,
    pub payload: usize,
    pub probes: Vec<ProbeRecord>,
    pub current: Option<usize>,
    pub started_at: Instant,
    wake: Arc<Notify>,
    abort: Option<AbortHandle>,
}

impl PingTest {
    pub fn new(id: u32, target: &str, reply_to: &str, payload: usize, repeat: usize, now: Instant) -> Self {
        let probes = (1..=repeat)
            .map(|seq| ProbeRecord::new(probe_text(id, seq, repeat, payload)))
            .collect();
        Self {
            id,
            target: target.to_string(),
            reply_to: reply_to.to_string(),
            payload,
            probes,
            current: None,
            started_at: now,
            wake: Arc::new(Notify::new()),
            abort: None,
        }
    }

    fn current_probe(&mut self) -> Option<&mut ProbeRecord> {
        let idx = self.current?;
        self.probes.get_mut(idx)
    }

    /// `Ping DB0ED-99: 2/3 replies, 33% loss, 25B, RTT 812/845/901ms`
    pub fn summary(&self) -> String {
        let total = self.probes.len();
        let rtts: Vec<u128> = self
            .probes
            .iter()
            .filter_map(|p| p.rtt())
            .map(|d| d.as_millis())
            .collect();
        let ok = rtts.len();
        let loss = if total == 0 {
            0
        } else {
            ((total - ok) * 100 + total / 2) / total
        };
        let mut out = format!(
            "Ping {}: {}/{} replies, {}% loss, {}B",
            self.target, ok, total, loss, self.payload
        );
        if let (Some(min), Some(max)) = (rtts.iter().min(), rtts.iter().max()) {
            let avg = rtts.iter().sum::<u128>() / ok as u128;
            out.push_str(&format!(", RTT {}/{}/{}ms", min, avg, max));
        }
        out
    }
}

#[derive(Debug, Default)]
struct PingState {
    tests: HashMap<u32, PingTest>,
    next_id: u32,
}

fn lock(state: &Mutex<PingState>) -> MutexGuard<'_, PingState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Copy)]
struct PingTimers {
    ack_timeout: Duration,
    probe_gap: Duration,
    ceiling: Duration,
}

/// Owns the active tests; cheap to clone.
#[derive(Debug, Clone)]
pub struct PingMonitor {
    state: Arc<Mutex<PingState>>,
    outbox: Outbox,
    timers: PingTimers,
}

impl PingMonitor {
    pub fn new(outbox: Outbox, tuning: &RouterTuning) -> Self {
        Self {
            state: Arc::new(Mutex::new(PingState {
                tests: HashMap::new(),
                next_id: 1,
            })),
            outbox,
            timers: PingTimers {
                ack_timeout: tuning.ping_ack_timeout(),
                probe_gap: tuning.ping_probe_gap(),
                ceiling: tuning.ping_test_ceiling(),
            },
        }
    }

    /// Start a test in the background; the summary is sent to `reply_to` when it ends.
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        target: &str,
        reply_to: &str,
        payload: usize,
        repeat: usize,
    ) -> Result<u32, PingError> {
        let id = {
            let mut st = lock(&self.state);
            if st.tests.values().any(|t| t.target == target) {
                return Err(PingError::AlreadyRunning(target.to_string()));
            }
            let id = st.next_id;
            st.next_id = st.next_id.wrapping_add(1).max(1);
            st.tests.insert(
                id,
                PingTest::new(id, target, reply_to, payload, repeat.max(1), Instant::now()),
            );
            id
        };

        let monitor = self.clone();
        let handle = tokio::spawn(async move { monitor.run_test(id).await });
        if let Some(test) = lock(&self.state).tests.get_mut(&id) {
            test.abort = Some(handle.abort_handle());
        }
        log::info!(
            "ctcping #{} to {}: {} x {}B",
            id,
            target,
            repeat.max(1),
            payload
        );
        Ok(id)
    }

    /// Abort a running test without sending a summary.
    pub fn cancel(&self, id: u32) -> bool {
        match lock(&self.state).tests.remove(&id) {
            Some(test) => {
                if let Some(abort) = test.abort {
                    abort.abort();
                }
                log::debug!("ctcping #{} to {} cancelled", id, test.target);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let tests: Vec<PingTest> = lock(&self.state).tests.drain().map(|(_, t)| t).collect();
        for t in &tests {
            if let Some(abort) = &t.abort {
                abort.abort();
            }
        }
        tests.len()
    }

    pub fn active(&self) -> usize {
        lock(&self.state).tests.len()
    }

    /// Our own frame to `dst` came back with `tag`. True when it was a probe.
    pub fn on_echo(&self, dst: &str, body: &str, tag: u32, at: Instant) -> bool {
        let mut st = lock(&self.state);
        for test in st.tests.values_mut().filter(|t| t.target.eq_ignore_ascii_case(dst)) {
            let wake = test.wake.clone();
            if let Some(probe) = test.current_probe() {
                if probe.text.trim_end() == body.trim_end() && probe.on_echo(tag, at) {
                    log::debug!("ctcping echo tag {} from {}", tag, dst);
                    wake.notify_one();
                    return true;
                }
            }
        }
        false
    }

    /// ACK (or REJ when `accepted` is false) from `src` for `tag`. True when it matched a probe.
    pub fn on_ack(&self, src: &str, tag: u32, accepted: bool, at: Instant) -> bool {
        let mut st = lock(&self.state);
        for test in st.tests.values_mut().filter(|t| t.target.eq_ignore_ascii_case(src)) {
            let wake = test.wake.clone();
            let Some(probe) = test.current_probe() else {
                continue;
            };
            let matched = if accepted {
                match probe.on_ack(tag, at) {
                    Some(rtt) => {
                        log::debug!("ctcping ack tag {} from {}: {}ms", tag, src, rtt.as_millis());
                        metrics::inc_probes_answered();
                        true
                    }
                    None => false,
                }
            } else {
                probe.on_rej(tag)
            };
            if matched {
                wake.notify_one();
                return true;
            }
        }
        false
    }

    async fn run_test(self, id: u32) {
        let outcome = tokio::time::timeout(self.timers.ceiling, self.run_probes(id)).await;
        if outcome.is_err() {
            log::warn!("ctcping #{} hit the {}s ceiling", id, self.timers.ceiling.as_secs());
        }
        let finished = lock(&self.state).tests.remove(&id);
        let Some(mut test) = finished else {
            return;
        };
        for p in test.probes.iter_mut().filter(|p| !p.is_done()) {
            p.timed_out = true;
        }
        let summary = test.summary();
        log::info!("ctcping #{} done: {}", id, summary);
        if let Err(e) = self.outbox.send_reply(&test.reply_to, &summary) {
            log::warn!("ctcping #{} summary not sent: {}", id, e);
        }
    }

    async fn run_probes(&self, id: u32) {
        let total = match lock(&self.state).tests.get(&id) {
            Some(t) => t.probes.len(),
            None => return,
        };
        for idx in 0..total {
            if idx > 0 {
                tokio::time::sleep(self.timers.probe_gap).await;
            }
            let (target, text, wake) = {
                let mut st = lock(&self.state);
                let Some(test) = st.tests.get_mut(&id) else {
                    return;
                };
                test.current = Some(idx);
                test.probes[idx].sent_at = Some(Instant::now());
                (
                    test.target.clone(),
                    test.probes[idx].text.clone(),
                    test.wake.clone(),
                )
            };
            if self
                .outbox
                .send_after(MessageCategory::Probe, &target, &text, Duration::ZERO)
                .is_err()
            {
                return;
            }
            metrics::inc_probes_sent();
            self.await_probe(id, idx, &wake).await;
        }
    }

    async fn await_probe(&self, id: u32, idx: usize, wake: &Notify) {
        loop {
            let deadline = {
                let mut st = lock(&self.state);
                let Some(test) = st.tests.get_mut(&id) else {
                    return;
                };
                let probe = &mut test.probes[idx];
                if probe.is_done() {
                    return;
                }
                match probe.deadline(self.timers.ack_timeout) {
                    Some(d) if d <= Instant::now() => {
                        probe.timed_out = true;
                        log::debug!("ctcping #{} probe {} timed out", id, idx + 1);
                        return;
                    }
                    Some(d) => d,
                    None => Instant::now() + self.timers.ack_timeout,
                }
            };
            let _ = tokio::time::timeout_at(deadline, wake.notified()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtt_runs_from_echo_to_ack() {
        let t0 = Instant::now();
        let mut p = ProbeRecord::new("ctcping 1 1/1".into());
        p.sent_at = Some(t0);
        assert_eq!(p.phase(), ProbePhase::Sent);
        assert!(p.on_echo(34, t0 + Duration::from_millis(10_000)));
        assert_eq!(p.phase(), ProbePhase::WaitingAck);
        // ACK for another frame is ignored.
        assert_eq!(p.on_ack(35, t0 + Duration::from_millis(10_500)), None);
        assert_eq!(
            p.on_ack(34, t0 + Duration::from_millis(10_845)),
            Some(Duration::from_millis(845))
        );
        assert_eq!(p.phase(), ProbePhase::DoneOk);
    }

    #[test]
    fn rej_marks_probe_lost() {
        let t0 = Instant::now();
        let mut p = ProbeRecord::new("x".into());
        assert!(!p.on_rej(1));
        p.on_echo(1, t0);
        assert!(p.on_rej(1));
        assert_eq!(p.phase(), ProbePhase::Rejected);
        assert!(p.rtt().is_none());
    }

    #[test]
    fn probe_text_is_padded_to_payload() {
        assert_eq!(probe_text(7, 1, 3, 25).len(), 25);
        assert!(probe_text(7, 1, 3, 25).starts_with("ctcping 7 1/3 ...."));
        assert_eq!(probe_text(7, 1, 3, 5), "ctcping 7 1/3");
    }

    #[test]
    fn summary_reports_loss_and_rtt() {
        let t0 = Instant::now();
        let mut test = PingTest::new(1, "DB0ED-99", "DK5EN-1", 25, 3, t0);
        for (i, ms) in [(0usize, 812u64), (1, 878)] {
            let p = &mut test.probes[i];
            p.on_echo(i as u32, t0);
            p.on_ack(i as u32, t0 + Duration::from_millis(ms));
        }
        test.probes[2].timed_out = true;
        assert_eq!(
            test.summary(),
            "Ping DB0ED-99: 2/3 replies, 33% loss, 25B, RTT 812/845/878ms"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_test_sends_no_summary() {
        use crate::outbound::chunk::Chunker;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let monitor = PingMonitor::new(Outbox::immediate(tx, Chunker::default()), &RouterTuning::default());
        let id = monitor.start("DB0ED-99", "DK5EN-1", 25, 2).unwrap();
        assert!(matches!(
            monitor.start("DB0ED-99", "DK5EN-1", 25, 1),
            Err(PingError::AlreadyRunning(_))
        ));
        let probe = rx.recv().await.unwrap();
        assert_eq!(probe.dst, "DB0ED-99");
        assert!(monitor.cancel(id));
        assert!(!monitor.cancel(id));
        assert_eq!(monitor.active(), 0);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(rx.try_recv().is_err());
    }
}
