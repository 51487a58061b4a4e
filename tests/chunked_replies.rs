//! Multi-frame replies leave the scheduler paced `frame_gap` apart.
mod common;

use common::{drain, frame, router, ME};
use mcrouter::outbound::chunk::{strip_prefix, Chunker};
use mcrouter::outbound::dispatch::{start_scheduler, SchedulerConfig};
use mcrouter::outbound::Outbox;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn reply_frames_are_twelve_seconds_apart() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = start_scheduler(SchedulerConfig::default(), tx);
    let outbox = Outbox::scheduled(handle.clone(), Chunker::default(), Duration::from_secs(12));

    let text: String = (0..250).map(|i| char::from(b'A' + (i % 26) as u8)).collect();
    let t0 = Instant::now();
    assert_eq!(outbox.send_reply("DK5EN-1", &text).unwrap(), 2);

    let first = rx.recv().await.unwrap();
    let t1 = Instant::now();
    let second = rx.recv().await.unwrap();
    let t2 = Instant::now();

    assert_eq!(first.dst, "DK5EN-1");
    assert!(first.text.starts_with("(1/2) "));
    assert!(second.text.starts_with("(2/2) "));
    let joined = format!("{}{}", strip_prefix(&first.text), strip_prefix(&second.text));
    assert_eq!(joined, text);

    assert!(t1 - t0 < Duration::from_secs(1));
    let gap = t2 - t1;
    assert!(
        gap >= Duration::from_secs(11) && gap <= Duration::from_secs(13),
        "gap {:?}",
        gap
    );

    let stats = handle.snapshot().await.unwrap();
    assert_eq!(stats.dispatched_total, 2);
    assert_eq!(stats.queued, 0);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn single_frame_goes_out_at_once() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = start_scheduler(SchedulerConfig::default(), tx);
    let outbox = Outbox::scheduled(handle.clone(), Chunker::default(), Duration::from_secs(12));

    let t0 = Instant::now();
    assert_eq!(outbox.send_reply("20", "WX Munich: clear sky").unwrap(), 1);
    let frame = rx.recv().await.unwrap();
    assert_eq!(frame.text, "WX Munich: clear sky");
    assert!(Instant::now() - t0 < Duration::from_secs(1));
    handle.shutdown().await;
}

#[tokio::test]
async fn long_mheard_starts_positions_in_a_new_frame() {
    let (r, mut rx) = router();
    for i in 0..8 {
        let call = format!("DK{}ABC-1{}", i, i);
        r.handle_inbound(&frame(&call, "20", "hello", &format!("H{}", i)));
        r.record_position(&call, 48.0 + i as f64 / 10.0, 11.5);
    }
    r.handle_inbound(&frame("DL1ABC-5", ME, "!mheard limit:8", "M1"));
    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.text.len() <= 140 && !f.text.contains('\n')));
    assert!(strip_prefix(&frames[0].text).starts_with("MSG: "));
    assert!(
        frames.iter().any(|f| strip_prefix(&f.text).starts_with("POS: ")),
        "{:?}",
        frames
    );
}
