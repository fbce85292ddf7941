//! Canonical-message publisher.
//!
//! The publisher owns at most one message in the target channel and edits
//! it in place on every cycle.
//!
//! # State machine
//! - **NONE** (no handle): the next publish sends a new message; success
//!   stores the handle.
//! - **OWNED** (handle present): the next publish edits in place. A
//!   not-found response means the message was deleted out-of-band: the
//!   handle is dropped and a fresh send happens within the same cycle. Any
//!   other error keeps the handle and retries on the next cycle.
//!
//! Send/edit failures are logged, never propagated: a downstream outage
//! must not take down the polling loop.

use tokio::sync::RwLock;
use tracing::{info, warn};

use chat_api::{ChatError, DiscordClient, Embed, MessageSummary};

use crate::config::FleetConfig;
use crate::probe::ProbeResult;
use crate::render;

/// Messages examined during startup cleanup (one listing page).
pub const CLEANUP_SCAN_LIMIT: u8 = 50;

/// The downstream message primitives the publisher needs. Implemented by
/// the real [`DiscordClient`] and by scripted mocks in tests.
#[allow(async_fn_in_trait)]
pub trait ChatApi {
    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> Result<String, ChatError>;
    async fn edit_embed(
        &self,
        channel_id: &str,
        message_id: &str,
        embed: &Embed,
    ) -> Result<(), ChatError>;
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), ChatError>;
    async fn list_recent(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<MessageSummary>, ChatError>;
}

impl ChatApi for DiscordClient {
    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> Result<String, ChatError> {
        self.create_message(channel_id, embed).await
    }

    async fn edit_embed(
        &self,
        channel_id: &str,
        message_id: &str,
        embed: &Embed,
    ) -> Result<(), ChatError> {
        self.edit_message(channel_id, message_id, embed).await
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), ChatError> {
        DiscordClient::delete_message(self, channel_id, message_id).await
    }

    async fn list_recent(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<MessageSummary>, ChatError> {
        DiscordClient::list_recent(self, channel_id, limit).await
    }
}

pub struct Publisher<C: ChatApi> {
    chat: C,
    channel_id: String,
    self_user_id: String,
    /// Canonical message handle; single writer per tick, read/write lock
    /// for any outside observers.
    handle: RwLock<Option<String>>,
}

impl<C: ChatApi> Publisher<C> {
    pub fn new(chat: C, channel_id: String, self_user_id: String) -> Self {
        Publisher {
            chat,
            channel_id,
            self_user_id,
            handle: RwLock::new(None),
        }
    }

    pub async fn handle(&self) -> Option<String> {
        self.handle.read().await.clone()
    }

    /// Delete our own messages left over from previous runs so restarts do
    /// not accumulate status messages in the channel.
    pub async fn cleanup_startup(&self) {
        let messages = match self.chat.list_recent(&self.channel_id, CLEANUP_SCAN_LIMIT).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "could not list channel messages for startup cleanup");
                return;
            }
        };
        let mut deleted = 0usize;
        for message in messages.iter().filter(|m| m.author_id == self.self_user_id) {
            match self.chat.delete_message(&self.channel_id, &message.id).await {
                Ok(()) | Err(ChatError::NotFound) => deleted += 1,
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "failed to delete stale status message");
                }
            }
        }
        if deleted > 0 {
            info!(deleted, "removed stale status messages from previous runs");
        }
    }

    /// Publish one cycle's status document; drives the state machine.
    pub async fn publish(&self, cfg: &FleetConfig, results: &[ProbeResult]) {
        let embed = render::status_embed(cfg, results);
        match self.handle().await {
            None => self.send_new(&embed).await,
            Some(message_id) => {
                match self
                    .chat
                    .edit_embed(&self.channel_id, &message_id, &embed)
                    .await
                {
                    Ok(()) => {}
                    Err(ChatError::NotFound) => {
                        info!(%message_id, "status message was deleted out-of-band; recreating");
                        self.set_handle(None).await;
                        self.send_new(&embed).await;
                    }
                    Err(e) => {
                        warn!(%message_id, error = %e, "status edit failed; will retry next cycle");
                    }
                }
            }
        }
    }

    async fn send_new(&self, embed: &Embed) {
        match self.chat.send_embed(&self.channel_id, embed).await {
            Ok(message_id) => {
                info!(%message_id, "status message created");
                self.set_handle(Some(message_id)).await;
            }
            Err(e) => warn!(error = %e, "status send failed; will retry next cycle"),
        }
    }

    async fn set_handle(&self, value: Option<String>) {
        *self.handle.write().await = value;
    }
}
