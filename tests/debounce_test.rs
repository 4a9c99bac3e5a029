//! Timing behaviour of the debounce coordinator, driven by tokio's paused clock.

use std::time::Duration;

use kbrelay::debounce::{DebounceSettings, Debouncer, Submission};
use kbrelay::schema::AggregatedMessage;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{advance, timeout, Instant};

const QUIET: Duration = Duration::from_millis(3500);
const RETENTION: Duration = Duration::from_secs(120);

fn debouncer() -> (Debouncer, UnboundedReceiver<AggregatedMessage>) {
    Debouncer::new(DebounceSettings {
        quiet_period: QUIET,
        retention: RETENTION,
    })
}

/// Paused-clock timers fire on millisecond ticks.
fn assert_elapsed(since: Instant, expected: Duration) {
    let elapsed = since.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(2),
        "elapsed {elapsed:?}, expected {expected:?}"
    );
}

async fn assert_no_flush(flushes: &mut UnboundedReceiver<AggregatedMessage>) {
    let next = timeout(Duration::from_secs(30), flushes.recv()).await;
    assert!(next.is_err(), "unexpected flush: {next:?}");
}

// ---------------------------------------------------------------------------
// Quiet period
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn two_messages_a_second_apart_flush_once() {
    let (debouncer, mut flushes) = debouncer();

    assert_eq!(debouncer.submit("dm-1", "m1", "hello", Instant::now()), Submission::Accepted);
    advance(Duration::from_secs(1)).await;
    assert_eq!(debouncer.submit("dm-1", "m2", "world", Instant::now()), Submission::Accepted);
    let last_message_at = Instant::now();

    let message = flushes.recv().await.expect("flush");
    assert_eq!(message.conversation_id, "dm-1");
    assert_eq!(message.text, "hello\nworld");
    assert_eq!(message.message_count, 2);
    assert_elapsed(last_message_at, QUIET);

    assert_no_flush(&mut flushes).await;
    assert_eq!(debouncer.pending_conversations(), 0);
}

#[tokio::test(start_paused = true)]
async fn steady_trickle_keeps_postponing_the_flush() {
    let (debouncer, mut flushes) = debouncer();
    let start = Instant::now();

    for i in 0..5 {
        debouncer.submit("dm-1", &format!("m{i}"), &format!("part {i}"), Instant::now());
        advance(Duration::from_secs(3)).await;
        assert!(flushes.try_recv().is_err(), "flushed while messages kept arriving");
    }

    let message = flushes.recv().await.expect("flush");
    assert_eq!(message.text, "part 0\npart 1\npart 2\npart 3\npart 4");
    // Last message at 12s, quiet period 3.5s.
    assert_elapsed(start, Duration::from_millis(15_500));
}

#[tokio::test(start_paused = true)]
async fn deadline_tracks_latest_accepted_message() {
    let (debouncer, _flushes) = debouncer();

    let t0 = Instant::now();
    debouncer.submit("dm-1", "m1", "a", t0);
    assert_eq!(debouncer.deadline("dm-1"), Some(t0 + QUIET));

    advance(Duration::from_secs(2)).await;
    let t1 = Instant::now();
    debouncer.submit("dm-1", "m2", "b", t1);
    assert_eq!(debouncer.deadline("dm-1"), Some(t1 + QUIET));
    assert_eq!(debouncer.deadline("dm-2"), None);
}

#[tokio::test(start_paused = true)]
async fn conversations_flush_independently() {
    let (debouncer, mut flushes) = debouncer();

    debouncer.submit("dm-1", "m1", "first", Instant::now());
    advance(Duration::from_secs(2)).await;
    debouncer.submit("dm-2", "m2", "second", Instant::now());

    let a = flushes.recv().await.expect("first flush");
    let b = flushes.recv().await.expect("second flush");
    assert_eq!((a.conversation_id.as_str(), a.text.as_str()), ("dm-1", "first"));
    assert_eq!((b.conversation_id.as_str(), b.text.as_str()), ("dm-2", "second"));
    assert_ne!(a.batch_id, b.batch_id);
}

#[tokio::test(start_paused = true)]
async fn blank_text_is_buffered_like_any_other() {
    let (debouncer, mut flushes) = debouncer();

    assert_eq!(debouncer.submit("dm-1", "m1", "   ", Instant::now()), Submission::Accepted);
    debouncer.submit("dm-1", "m2", "question", Instant::now());

    let message = flushes.recv().await.expect("flush");
    assert_eq!(message.text, "   \nquestion");
    assert_eq!(message.message_count, 2);
}

#[tokio::test(start_paused = true)]
async fn new_message_after_flush_starts_a_fresh_batch() {
    let (debouncer, mut flushes) = debouncer();

    debouncer.submit("dm-1", "m1", "one", Instant::now());
    assert_eq!(flushes.recv().await.expect("flush").text, "one");

    debouncer.submit("dm-1", "m2", "two", Instant::now());
    assert_eq!(flushes.recv().await.expect("flush").text, "two");
}

// ---------------------------------------------------------------------------
// Dedup
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn redelivery_is_suppressed_and_does_not_extend_the_deadline() {
    let (debouncer, mut flushes) = debouncer();
    let start = Instant::now();

    debouncer.submit("dm-1", "m1", "hello", start);
    advance(Duration::from_secs(3)).await;
    assert_eq!(debouncer.submit("dm-1", "m1", "hello", Instant::now()), Submission::Duplicate);
    assert_eq!(debouncer.deadline("dm-1"), Some(start + QUIET));

    let message = flushes.recv().await.expect("flush");
    assert_eq!(message.text, "hello");
    assert_elapsed(start, QUIET);
}

#[tokio::test(start_paused = true)]
async fn redelivery_after_flush_creates_no_buffer() {
    let (debouncer, mut flushes) = debouncer();

    debouncer.submit("dm-1", "m1", "hello", Instant::now());
    flushes.recv().await.expect("flush");

    assert_eq!(debouncer.submit("dm-1", "m1", "hello", Instant::now()), Submission::Duplicate);
    assert_eq!(debouncer.pending_conversations(), 0);
    assert_no_flush(&mut flushes).await;
}

#[tokio::test(start_paused = true)]
async fn message_id_is_new_again_once_retention_elapses() {
    let (debouncer, mut flushes) = debouncer();
    let first_seen = Instant::now();

    debouncer.submit("dm-1", "m1", "hello", first_seen);
    flushes.recv().await.expect("flush");

    advance(RETENTION - first_seen.elapsed() - Duration::from_millis(1)).await;
    assert_eq!(debouncer.submit("dm-1", "m1", "hello", Instant::now()), Submission::Duplicate);

    advance(Duration::from_millis(1)).await;
    assert!(first_seen.elapsed() >= RETENTION);
    assert_eq!(debouncer.submit("dm-1", "m1", "hello", Instant::now()), Submission::Accepted);
    assert_eq!(flushes.recv().await.expect("flush").text, "hello");
}

#[tokio::test(start_paused = true)]
async fn expired_ids_are_evicted() {
    let (debouncer, mut flushes) = debouncer();

    for i in 0..10 {
        debouncer.submit("dm-1", &format!("m{i}"), "x", Instant::now());
    }
    flushes.recv().await.expect("flush");
    assert_eq!(debouncer.remembered_ids(), 10);

    advance(RETENTION * 2).await;
    debouncer.submit("dm-2", "fresh", "y", Instant::now());
    assert_eq!(debouncer.remembered_ids(), 1);
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn drain_returns_pending_batches_and_cancels_timers() {
    let (debouncer, mut flushes) = debouncer();

    debouncer.submit("dm-1", "m1", "a", Instant::now());
    advance(Duration::from_millis(100)).await;
    debouncer.submit("dm-1", "m2", "c", Instant::now());
    advance(Duration::from_millis(100)).await;
    debouncer.submit("dm-2", "m3", "b", Instant::now());

    let drained = debouncer.drain();
    let summary: Vec<(&str, &str)> = drained
        .iter()
        .map(|m| (m.conversation_id.as_str(), m.text.as_str()))
        .collect();
    assert_eq!(summary, vec![("dm-1", "a\nc"), ("dm-2", "b")]);

    assert_eq!(debouncer.pending_conversations(), 0);
    assert_no_flush(&mut flushes).await;
}

#[tokio::test(start_paused = true)]
async fn close_keeps_flushed_batches_and_ends_the_stream() {
    let (debouncer, mut flushes) = debouncer();

    debouncer.submit("dm-1", "m1", "already flushed", Instant::now());
    tokio::time::sleep(QUIET * 2).await;
    debouncer.submit("dm-2", "m2", "still quiet", Instant::now());

    let drained = debouncer.close();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].text, "still quiet");

    // The batch flushed before closing is still queued for the receiver.
    assert_eq!(flushes.recv().await.expect("queued flush").text, "already flushed");
    assert!(flushes.recv().await.is_none());
}
