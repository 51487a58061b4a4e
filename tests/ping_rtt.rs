//! CTC ping through the router: probe, echo, ACK and the summary reply.
mod common;

use common::{frame, router, ME};
use mcrouter::outbound::OutgoingFrame;
use mcrouter::router::Disposition;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::advance;

const ASKER: &str = "DK5EN-1";
const REMOTE: &str = "OE1XYZ-1";

/// Next frame, letting spawned tasks run first.
async fn next(rx: &mut UnboundedReceiver<OutgoingFrame>) -> OutgoingFrame {
    tokio::time::timeout(Duration::from_secs(3600), rx.recv())
        .await
        .expect("frame in time")
        .expect("channel open")
}

/// Start a one-probe test and return the probe text once it was sent.
async fn start_test(r: &mcrouter::router::Router, rx: &mut UnboundedReceiver<OutgoingFrame>) -> String {
    match r.handle_inbound(&frame(ASKER, ME, &format!("!ctcping call:{}", REMOTE), "P0")) {
        Disposition::Executed { command, reply_to, .. } => {
            assert_eq!(command, "ctcping");
            assert_eq!(reply_to, ASKER);
        }
        other => panic!("unexpected {:?}", other),
    }
    let mut probe = None;
    for _ in 0..2 {
        let f = next(rx).await;
        if f.dst == REMOTE {
            probe = Some(f.text);
        } else {
            assert_eq!(f.dst, ASKER);
            assert!(f.text.starts_with("Ping #1 to OE1XYZ-1 started"), "{}", f.text);
        }
    }
    probe.expect("probe sent")
}

#[tokio::test(start_paused = true)]
async fn rtt_is_measured_from_echo_to_ack() {
    let (r, mut rx) = router();
    let probe = start_test(&r, &mut rx).await;
    assert!(probe.starts_with("ctcping 1 1/1"));
    assert_eq!(probe.len(), 25);
    assert_eq!(r.ping().active(), 1);

    advance(Duration::from_millis(10_000)).await;
    assert_eq!(
        r.handle_inbound(&frame(ME, REMOTE, &format!("{}{{034}}", probe), "E1")),
        Disposition::Echo { probe: true }
    );
    advance(Duration::from_millis(845)).await;
    assert_eq!(
        r.handle_inbound(&frame(REMOTE, ME, ":ack034", "A1")),
        Disposition::Ack { probe: true }
    );

    let summary = next(&mut rx).await;
    assert_eq!(summary.dst, ASKER);
    assert_eq!(
        summary.text,
        "Ping OE1XYZ-1: 1/1 replies, 0% loss, 25B, RTT 845/845/845ms"
    );
    assert_eq!(r.ping().active(), 0);
}

#[tokio::test(start_paused = true)]
async fn silent_target_times_out_as_loss() {
    let (r, mut rx) = router();
    start_test(&r, &mut rx).await;

    let summary = next(&mut rx).await;
    assert_eq!(summary.text, "Ping OE1XYZ-1: 0/1 replies, 100% loss, 25B");
    assert_eq!(r.ping().active(), 0);
}

#[tokio::test(start_paused = true)]
async fn ack_for_a_stale_tag_is_not_a_probe() {
    let (r, mut rx) = router();
    let probe = start_test(&r, &mut rx).await;
    r.handle_inbound(&frame(ME, REMOTE, &format!("{}{{101}}", probe), "E1"));
    assert_eq!(
        r.handle_inbound(&frame(REMOTE, ME, ":ack099", "A1")),
        Disposition::Ack { probe: false }
    );
    r.shutdown();
    assert_eq!(r.ping().active(), 0);
}

#[tokio::test(start_paused = true)]
async fn second_test_to_same_target_fails() {
    let (r, mut rx) = router();
    start_test(&r, &mut rx).await;
    advance(Duration::from_secs(6)).await;
    match r.handle_inbound(&frame("DL1ABC-5", ME, &format!("!ctcping call:{}", REMOTE), "P1")) {
        Disposition::Failed(e) => assert!(e.contains(REMOTE), "{}", e),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn ping_to_self_is_refused() {
    let (r, _rx) = router();
    assert!(matches!(
        r.handle_inbound(&frame(ASKER, ME, &format!("!ctcping call:{}", ME), "P2")),
        Disposition::Failed(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn probes_follow_each_outcome_until_the_ceiling() {
    let (r, mut rx) = router();
    let t0 = tokio::time::Instant::now();
    r.handle_inbound(&frame(ASKER, ME, &format!("!ctcping call:{} repeat:5", REMOTE), "R0"));

    let mut sent_at = Vec::new();
    let summary = loop {
        let f = next(&mut rx).await;
        if f.dst == ASKER && f.text.starts_with("Ping #") {
            continue;
        }
        if f.dst != REMOTE {
            break f;
        }
        sent_at.push((tokio::time::Instant::now() - t0).as_secs());
        // Echo after 29s; the ACK never comes, so the probe times out 30s after the echo.
        tokio::time::sleep(Duration::from_secs(29)).await;
        let tag = 100 + sent_at.len();
        assert_eq!(
            r.handle_inbound(&frame(ME, REMOTE, &format!("{}{{{}}}", f.text, tag), &format!("E{}", tag))),
            Disposition::Echo { probe: true }
        );
    };

    assert_eq!(sent_at, vec![0, 79, 158, 237]);
    let elapsed = tokio::time::Instant::now() - t0;
    assert!(
        elapsed >= Duration::from_secs(300) && elapsed < Duration::from_secs(301),
        "{:?}",
        elapsed
    );
    assert_eq!(summary.dst, ASKER);
    assert_eq!(summary.text, "Ping OE1XYZ-1: 0/5 replies, 100% loss, 25B");
}

#[tokio::test(start_paused = true)]
async fn rej_marks_the_probe_lost() {
    let (r, mut rx) = router();
    let probe = start_test(&r, &mut rx).await;
    let t0 = tokio::time::Instant::now();
    advance(Duration::from_secs(5)).await;
    r.handle_inbound(&frame(ME, REMOTE, &format!("{}{{042}}", probe), "E1"));
    assert_eq!(
        r.handle_inbound(&frame(REMOTE, ME, ":rej042", "J1")),
        Disposition::Ack { probe: true }
    );

    let summary = next(&mut rx).await;
    assert_eq!(summary.text, "Ping OE1XYZ-1: 0/1 replies, 100% loss, 25B");
    // Decided by the REJ, not by the 30s timeout.
    assert!(tokio::time::Instant::now() - t0 < Duration::from_secs(30));
}
