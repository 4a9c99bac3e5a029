//! Per-conversation debouncing and message-id dedup.
//!
//! Messages from one conversation are buffered until the conversation has
//! been quiet for `quiet_period`, then emitted as a single
//! [`AggregatedMessage`] on the flush channel. Message ids are remembered for
//! `retention` so transport redeliveries never produce a second answer.
//!
//! Each accepted message bumps the conversation's epoch and replaces its
//! timer task. A timer only flushes if the epoch it was created for is still
//! current, so an aborted timer that already woke up is harmless.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics::{
    FLUSHES, MESSAGES_ACCEPTED, MESSAGES_DUPLICATE, PENDING_CONVERSATIONS, SEEN_MESSAGES,
};
use crate::schema::AggregatedMessage;

const SEPARATOR: &str = "\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceSettings {
    pub quiet_period: Duration,
    pub retention: Duration,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(3500),
            retention: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    Duplicate,
}

struct PendingConversation {
    texts: Vec<String>,
    epoch: u64,
    deadline: Instant,
    last_update: Instant,
    timer: Option<JoinHandle<()>>,
}

impl PendingConversation {
    fn new(now: Instant) -> Self {
        Self {
            texts: Vec::new(),
            epoch: 0,
            deadline: now,
            last_update: now,
            timer: None,
        }
    }

    fn into_message(self, conversation_id: String) -> AggregatedMessage {
        AggregatedMessage {
            batch_id: Uuid::new_v4(),
            conversation_id,
            message_count: self.texts.len(),
            text: self.texts.join(SEPARATOR),
        }
    }
}

struct State {
    pending: HashMap<String, PendingConversation>,
    seen: HashMap<String, Instant>,
    next_epoch: u64,
    last_sweep: Option<Instant>,
    // None once the coordinator is closed.
    flushes: Option<mpsc::UnboundedSender<AggregatedMessage>>,
}

impl State {
    fn new(flushes: mpsc::UnboundedSender<AggregatedMessage>) -> Self {
        Self {
            pending: HashMap::new(),
            seen: HashMap::new(),
            next_epoch: 0,
            last_sweep: None,
            flushes: Some(flushes),
        }
    }

    fn take_pending(&mut self) -> Vec<AggregatedMessage> {
        let mut pending: Vec<(String, PendingConversation)> = self.pending.drain().collect();
        self.publish_gauges();

        pending.sort_by_key(|(_, p)| p.last_update);
        pending
            .into_iter()
            .map(|(conversation_id, mut p)| {
                if let Some(timer) = p.timer.take() {
                    timer.abort();
                }
                p.into_message(conversation_id)
            })
            .collect()
    }

    // Expiry is inclusive: an id seen exactly `retention` ago is new again.
    fn is_duplicate(&self, message_id: &str, now: Instant, retention: Duration) -> bool {
        self.seen
            .get(message_id)
            .is_some_and(|seen_at| now.saturating_duration_since(*seen_at) < retention)
    }

    fn sweep_expired(&mut self, now: Instant, retention: Duration) {
        let due = self
            .last_sweep
            .map_or(true, |at| now.saturating_duration_since(at) >= retention);
        if !due {
            return;
        }

        let before = self.seen.len();
        self.seen
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) < retention);
        self.last_sweep = Some(now);

        let evicted = before - self.seen.len();
        if evicted > 0 {
            debug!(evicted, remaining = self.seen.len(), "Swept expired message ids");
        }
    }

    fn publish_gauges(&self) {
        PENDING_CONVERSATIONS.set(self.pending.len() as f64);
        SEEN_MESSAGES.set(self.seen.len() as f64);
    }
}

struct Inner {
    settings: DebounceSettings,
    state: Mutex<State>,
}

impl Inner {
    // The lock only guards map mutations; nothing awaits while holding it.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Removal and send happen under one lock so `close` never loses a batch
    // between the two.
    fn flush(&self, conversation_id: &str, epoch: u64) {
        let mut state = self.lock();
        if state.pending.get(conversation_id).map(|p| p.epoch) != Some(epoch) {
            return;
        }
        let Some(pending) = state.pending.remove(conversation_id) else {
            return;
        };
        state.publish_gauges();

        let message = pending.into_message(conversation_id.to_string());
        FLUSHES.inc();
        info!(
            batch_id = %message.batch_id,
            conversation_id = %message.conversation_id,
            message_count = message.message_count,
            "Flushing conversation"
        );
        let delivered = state
            .flushes
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok());
        if !delivered {
            warn!(conversation_id, "Flush channel closed; discarding aggregated message");
        }
    }
}

/// Owned coordinator; clones share the same buffers.
#[derive(Clone)]
pub struct Debouncer {
    inner: Arc<Inner>,
}

impl Debouncer {
    pub fn new(settings: DebounceSettings) -> (Self, mpsc::UnboundedReceiver<AggregatedMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            settings,
            state: Mutex::new(State::new(tx)),
        };
        (Self { inner: Arc::new(inner) }, rx)
    }

    pub fn settings(&self) -> DebounceSettings {
        self.inner.settings
    }

    /// Buffers `text` for `conversation_id` unless `message_id` was already
    /// seen within the retention window.
    ///
    /// An accepted message (re)starts the conversation's quiet period at
    /// `now`; a duplicate leaves every buffer and deadline untouched.
    pub fn submit(
        &self,
        conversation_id: &str,
        message_id: &str,
        text: &str,
        now: Instant,
    ) -> Submission {
        let DebounceSettings {
            quiet_period,
            retention,
        } = self.inner.settings;

        let mut state = self.inner.lock();
        state.sweep_expired(now, retention);

        if state.is_duplicate(message_id, now, retention) {
            MESSAGES_DUPLICATE.inc();
            debug!(conversation_id, message_id, "Suppressed duplicate message");
            return Submission::Duplicate;
        }
        state.seen.insert(message_id.to_string(), now);

        state.next_epoch += 1;
        let epoch = state.next_epoch;
        let deadline = now + quiet_period;

        let pending = state
            .pending
            .entry(conversation_id.to_string())
            .or_insert_with(|| PendingConversation::new(now));
        pending.texts.push(text.to_string());
        pending.epoch = epoch;
        pending.deadline = deadline;
        pending.last_update = now;
        if let Some(previous) = pending.timer.take() {
            previous.abort();
        }

        match schedule(&self.inner, conversation_id.to_string(), epoch, deadline) {
            Ok(timer) => {
                pending.timer = Some(timer);
                debug!(
                    conversation_id,
                    message_id,
                    buffered = pending.texts.len(),
                    "Buffered message"
                );
            }
            Err(err) => {
                let dropped = pending.texts.len();
                state.pending.remove(conversation_id);
                error!(conversation_id, dropped, error = %err, "Failed to schedule flush; dropping batch");
            }
        }

        state.publish_gauges();
        MESSAGES_ACCEPTED.inc();
        Submission::Accepted
    }

    /// Cancels every pending timer and returns the buffered conversations,
    /// oldest activity first.
    pub fn drain(&self) -> Vec<AggregatedMessage> {
        self.inner.lock().take_pending()
    }

    /// Drains like [`Debouncer::drain`] and closes the flush channel, so the
    /// receiver ends once it has taken the batches already flushed. Used on
    /// shutdown.
    pub fn close(&self) -> Vec<AggregatedMessage> {
        let mut state = self.inner.lock();
        let pending = state.take_pending();
        if state.flushes.take().is_some() {
            info!(pending = pending.len(), "Closed debounce coordinator");
        }
        pending
    }

    pub fn pending_conversations(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Deadline of the scheduled flush for `conversation_id`, if any.
    pub fn deadline(&self, conversation_id: &str) -> Option<Instant> {
        self.inner.lock().pending.get(conversation_id).map(|p| p.deadline)
    }

    pub fn remembered_ids(&self) -> usize {
        self.inner.lock().seen.len()
    }
}

fn schedule(
    inner: &Arc<Inner>,
    conversation_id: String,
    epoch: u64,
    deadline: Instant,
) -> Result<JoinHandle<()>, TryCurrentError> {
    let runtime = Handle::try_current()?;
    let inner = Arc::downgrade(inner);

    Ok(runtime.spawn(async move {
        tokio::time::sleep_until(deadline).await;
        if let Some(inner) = inner.upgrade() {
            inner.flush(&conversation_id, epoch);
        }
    }))
}
