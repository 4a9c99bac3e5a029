//! Turns flushed conversations into replies.
//!
//! Each [`AggregatedMessage`] is handled on its own task so one slow answer
//! never holds up other conversations. Replies within one conversation still
//! go out in flush order.

use std::collections::HashMap;
use std::sync::Arc;

use serenity::async_trait;
use tokio::sync::mpsc;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::{
    commands::{self, Command},
    debounce::Debouncer,
    error::Result,
    metrics::{ANSWER_FAILURES, ANSWER_REQUESTS, COMMANDS_HANDLED, REPLIES_FAILED, REPLIES_SENT},
    reply::{build_reply, EMPTY_QUESTION_REPLY, FALLBACK_REPLY},
    schema::{AggregatedMessage, Answer, DocumentStats},
    sections::{metadata_filter, parse_sections},
    sync_state::SyncStateFile,
};

/// The external answer collaborator.
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn answer(&self, question: &str, metadata_filter: Option<&str>) -> Result<Answer>;

    async fn actual_document_stats(&self) -> Result<DocumentStats>;
}

#[async_trait]
impl<T: AnswerService + ?Sized> AnswerService for Arc<T> {
    async fn answer(&self, question: &str, metadata_filter: Option<&str>) -> Result<Answer> {
        (**self).answer(question, metadata_filter).await
    }

    async fn actual_document_stats(&self) -> Result<DocumentStats> {
        (**self).actual_document_stats().await
    }
}

/// Delivers a rendered reply to a conversation.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_reply(&self, conversation_id: &str, text: &str) -> Result<()>;
}

pub struct Dispatcher<A, R> {
    answers: A,
    replies: R,
    sync_state: SyncStateFile,
}

impl<A, R> Dispatcher<A, R>
where
    A: AnswerService + 'static,
    R: ReplySink + 'static,
{
    pub fn new(answers: A, replies: R, sync_state: SyncStateFile) -> Self {
        Self {
            answers,
            replies,
            sync_state,
        }
    }

    /// Consumes flushes until every sender is gone, then waits for in-flight replies.
    pub async fn run(self: Arc<Self>, mut flushes: mpsc::UnboundedReceiver<AggregatedMessage>) {
        let mut in_flight = JoinSet::new();
        // Completion signal of the latest task per conversation.
        let mut tails: HashMap<String, oneshot::Receiver<()>> = HashMap::new();

        while let Some(message) = flushes.recv().await {
            tails.retain(|_, done| matches!(done.try_recv(), Err(TryRecvError::Empty)));

            let (finished, done) = oneshot::channel();
            let previous = tails.insert(message.conversation_id.clone(), done);
            let this = Arc::clone(&self);
            in_flight.spawn(async move {
                if let Some(previous) = previous {
                    // Err only means the earlier task panicked.
                    let _ = previous.await;
                }
                this.handle(message).await;
                let _ = finished.send(());
            });

            // Reap finished tasks so the set doesn't grow with uptime.
            while let Some(done) = in_flight.try_join_next() {
                if let Err(err) = done {
                    error!(error = %err, "Reply task panicked");
                }
            }
        }

        while let Some(done) = in_flight.join_next().await {
            if let Err(err) = done {
                error!(error = %err, "Reply task panicked");
            }
        }
        info!("Flush channel closed; dispatcher stopped");
    }

    /// Graceful teardown: closes the coordinator, answers what it still
    /// buffered, then waits for `worker` (the task running [`Dispatcher::run`])
    /// to finish every batch that was already flushed.
    pub async fn shutdown(&self, debouncer: &Debouncer, worker: JoinHandle<()>) {
        let pending = debouncer.close();
        if !pending.is_empty() {
            info!(count = pending.len(), "Answering buffered conversations before exit");
        }
        for message in pending {
            self.handle(message).await;
        }

        if let Err(err) = worker.await {
            error!(error = %err, "Dispatcher task failed");
        }
    }

    pub async fn handle(&self, message: AggregatedMessage) {
        let reply = self.respond(&message.text).await;

        match self.replies.send_reply(&message.conversation_id, &reply).await {
            Ok(()) => {
                REPLIES_SENT.inc();
                info!(
                    batch_id = %message.batch_id,
                    conversation_id = %message.conversation_id,
                    len = reply.len(),
                    "Sent reply"
                );
            }
            Err(err) => {
                REPLIES_FAILED.inc();
                error!(
                    batch_id = %message.batch_id,
                    conversation_id = %message.conversation_id,
                    error = %err,
                    "Failed to send reply"
                );
            }
        }
    }

    /// Produces the reply text for one aggregated message. Never fails:
    /// collaborator errors become user-visible texts.
    pub async fn respond(&self, text: &str) -> String {
        if let Some(command) = Command::detect(text) {
            COMMANDS_HANDLED.inc();
            info!(command = command.name(), "Handling special command");
            return match command {
                Command::Stats => self.stats_reply().await,
                Command::Audit => self.audit_reply().await,
            };
        }

        let (question, tags) = parse_sections(text.trim());
        if question.trim().is_empty() {
            return EMPTY_QUESTION_REPLY.to_string();
        }

        let filter = metadata_filter(&tags);
        ANSWER_REQUESTS.inc();
        match self.answers.answer(&question, filter.as_deref()).await {
            Ok(answer) => build_reply(&answer.text, &answer.citations, &tags),
            Err(err) => {
                ANSWER_FAILURES.inc();
                error!(error = %err, filter = ?filter, "Answer service failed");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    async fn stats_reply(&self) -> String {
        match self.sync_state.load().await {
            Ok(state) => commands::render_stats(&state),
            Err(err) => {
                warn!(path = %self.sync_state.path().display(), error = %err, "Sync state unavailable");
                commands::sync_state_failure(&err)
            }
        }
    }

    async fn audit_reply(&self) -> String {
        let expected = match self.sync_state.load().await {
            Ok(state) => state.document_stats(),
            Err(err) => {
                warn!(path = %self.sync_state.path().display(), error = %err, "Sync state unavailable");
                return commands::sync_state_failure(&err);
            }
        };

        match self.answers.actual_document_stats().await {
            Ok(actual) => commands::render_audit(&expected, &actual),
            Err(err) => {
                error!(error = %err, "Live document count failed");
                commands::live_store_failure(&err)
            }
        }
    }
}
