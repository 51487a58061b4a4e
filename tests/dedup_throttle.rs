//! Duplicate deliveries and per-command cooldowns, on paused time.
mod common;

use common::{drain, frame, router, ME};
use mcrouter::router::Disposition;
use std::time::Duration;
use tokio::time::advance;

const OTHER: &str = "OE1XYZ-1";

fn executed(d: &Disposition) -> bool {
    matches!(d, Disposition::Executed { .. })
}

#[tokio::test(start_paused = true)]
async fn same_msg_id_runs_once_inside_the_window() {
    let (r, mut rx) = router();
    let m = frame(OTHER, ME, "!time", "A1B2C3");
    assert!(executed(&r.handle_inbound(&m)));
    assert_eq!(r.handle_inbound(&m), Disposition::Duplicate);
    assert_eq!(drain(&mut rx).len(), 1);

    advance(Duration::from_secs(301)).await;
    assert!(executed(&r.handle_inbound(&m)));
}

#[tokio::test(start_paused = true)]
async fn empty_msg_id_is_never_a_duplicate() {
    let (r, _rx) = router();
    let m = frame(OTHER, "20", "just chatting", "");
    assert_eq!(r.handle_inbound(&m), Disposition::Chat);
    assert_eq!(r.handle_inbound(&m), Disposition::Chat);
}

#[tokio::test(start_paused = true)]
async fn dice_twice_is_throttled_and_notified() {
    let (r, mut rx) = router();
    assert!(executed(&r.handle_inbound(&frame(OTHER, ME, "!dice", "D1"))));
    drain(&mut rx);

    advance(Duration::from_secs(2)).await;
    match r.handle_inbound(&frame(OTHER, ME, "!dice", "D2")) {
        Disposition::Throttled { retry_in } => assert_eq!(retry_in, Duration::from_secs(3)),
        other => panic!("unexpected {:?}", other),
    }
    let notice = drain(&mut rx);
    assert_eq!(notice.len(), 1);
    assert_eq!(notice[0].dst, OTHER);
    assert!(notice[0].text.contains("throttled"), "{}", notice[0].text);

    // The rejected attempt did not extend the window.
    advance(Duration::from_secs(3)).await;
    assert!(executed(&r.handle_inbound(&frame(OTHER, ME, "!dice", "D3"))));
}

#[tokio::test(start_paused = true)]
async fn different_arguments_are_different_requests() {
    let (r, _rx) = router();
    assert!(executed(&r.handle_inbound(&frame(OTHER, ME, "!stats hours:24", "S1"))));
    assert!(executed(&r.handle_inbound(&frame(OTHER, ME, "!stats hours:12", "S2"))));
    assert!(matches!(
        r.handle_inbound(&frame(OTHER, ME, "!stats hours:24", "S3")),
        Disposition::Throttled { .. }
    ));

    advance(Duration::from_secs(300)).await;
    assert!(executed(&r.handle_inbound(&frame(OTHER, ME, "!stats hours:24", "S4"))));
}

#[tokio::test(start_paused = true)]
async fn cooldown_is_per_sender() {
    let (r, _rx) = router();
    assert!(executed(&r.handle_inbound(&frame(OTHER, ME, "!time", "T1"))));
    assert!(executed(&r.handle_inbound(&frame("DL1ABC-5", ME, "!time", "T2"))));
}

#[tokio::test(start_paused = true)]
async fn prune_forgets_expired_state() {
    let (r, _rx) = router();
    r.handle_inbound(&frame(OTHER, ME, "!time", "P1"));
    r.handle_inbound(&frame(OTHER, ME, "!nosuchcmd", "P2"));
    advance(Duration::from_secs(30 * 60)).await;
    assert!(r.prune(tokio::time::Instant::now()) >= 3);
    assert_eq!(r.prune(tokio::time::Instant::now()), 0);
}
