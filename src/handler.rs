use std::sync::Arc;

use serenity::{
    async_trait,
    http::Http,
    model::{channel::Message, gateway::Ready, id::ChannelId},
    prelude::*,
};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    debounce::{Debouncer, Submission},
    dispatch::ReplySink,
    error::{Error, Result},
    health::HealthChecker,
    reply::{split_message, MAX_MESSAGE_CHARS},
    schema::InboundMessage,
};

pub struct Handler {
    pub debouncer: Debouncer,
    pub health: Arc<HealthChecker>,
}

impl Handler {
    fn inbound(msg: &Message) -> InboundMessage {
        InboundMessage {
            conversation_id: msg.channel_id.to_string(),
            message_id: msg.id.to_string(),
            text: msg.content.clone(),
            timestamp: msg.timestamp.to_rfc3339().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);
        self.health.set_discord_connected(true).await;
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        // Direct messages only; never answer other bots.
        if msg.author.bot || msg.guild_id.is_some() {
            return;
        }

        let event = Self::inbound(&msg);
        let outcome = self.debouncer.submit(
            &event.conversation_id,
            &event.message_id,
            &event.text,
            Instant::now(),
        );

        match outcome {
            Submission::Accepted => debug!(
                conversation_id = %event.conversation_id,
                message_id = %event.message_id,
                sent_at = %event.timestamp,
                "Accepted message"
            ),
            Submission::Duplicate => info!(
                conversation_id = %event.conversation_id,
                message_id = %event.message_id,
                "Ignored redelivered message"
            ),
        }
    }
}

/// Sends replies into Discord DM channels.
pub struct DiscordReplies {
    http: Arc<Http>,
}

impl DiscordReplies {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ReplySink for DiscordReplies {
    async fn send_reply(&self, conversation_id: &str, text: &str) -> Result<()> {
        let channel = conversation_id
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .map(ChannelId::new)
            .ok_or_else(|| Error::InvalidConversation(conversation_id.to_string()))?;

        for part in split_message(text, MAX_MESSAGE_CHARS) {
            if part.trim().is_empty() {
                continue;
            }
            channel.say(&self.http, part).await?;
        }
        Ok(())
    }
}
