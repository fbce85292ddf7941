//! Minimal Discord REST client for channel-message maintenance.
//!
//! Covers exactly the four message primitives the statusboard needs:
//! create, edit, delete, and list-recent, plus an identity lookup used at
//! startup to learn the bot's own user id.
//!
//! # Endpoints
//! - `GET  /users/@me`
//! - `POST /channels/{channel_id}/messages`
//! - `PATCH /channels/{channel_id}/messages/{message_id}`
//! - `DELETE /channels/{channel_id}/messages/{message_id}`
//! - `GET  /channels/{channel_id}/messages?limit=N`
//!
//! # Error mapping
//! HTTP 404 maps to [`ChatError::NotFound`] so callers can distinguish
//! "message deleted out-of-band" from every other failure. All other non-2xx
//! statuses map to [`ChatError::Api`].

use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Embed wire types
// ---------------------------------------------------------------------------

/// A rich embed, serialized into the Discord message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// RGB color as a single integer, e.g. `0x2ECC71`.
    pub color: u32,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    /// ISO-8601 timestamp shown next to the footer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// The bot's own identity, from `GET /users/@me`.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
}

/// One entry from a channel message listing.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSummary {
    pub id: String,
    pub author_id: String,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    id: String,
    author: AuthorPayload,
}

#[derive(Debug, Deserialize)]
struct AuthorPayload {
    id: String,
}

#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    embeds: [&'a Embed; 1],
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The target (message or channel) does not exist (HTTP 404).
    #[error("not found")]
    NotFound,
    /// Any other non-success status from the API.
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
    /// Connection, TLS, or timeout failure before a status was received.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Authenticated Discord REST client.
#[derive(Debug, Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl DiscordClient {
    pub fn new(token: &str) -> Result<Self, ChatError> {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Construct against a non-default API base (tests point this at a
    /// local fixture server).
    pub fn with_api_base(token: &str, api_base: &str) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(DiscordClient {
            http,
            api_base: api_base.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
        })
    }

    /// Fetch the bot's own identity. Called once at startup; a failure here
    /// is a fatal session error.
    pub async fn current_user(&self) -> Result<CurrentUser, ChatError> {
        let url = format!("{}/users/@me", self.api_base);
        let response = self.get(&url).await?;
        response
            .json::<CurrentUser>()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))
    }

    /// Post a new embed message; returns the new message id.
    pub async fn create_message(
        &self,
        channel_id: &str,
        embed: &Embed,
    ) -> Result<String, ChatError> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let response = self
            .http
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&OutgoingMessage { embeds: [embed] })
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        let response = check_status(response).await?;
        let message: MessagePayload = response
            .json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;
        debug!(channel_id, message_id = %message.id, "message created");
        Ok(message.id)
    }

    /// Replace the embed of an existing message in place.
    pub async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        embed: &Embed,
    ) -> Result<(), ChatError> {
        let url = format!(
            "{}/channels/{}/messages/{}",
            self.api_base, channel_id, message_id
        );
        let response = self
            .http
            .patch(&url)
            .header("Authorization", self.auth_header())
            .json(&OutgoingMessage { embeds: [embed] })
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn delete_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), ChatError> {
        let url = format!(
            "{}/channels/{}/messages/{}",
            self.api_base, channel_id, message_id
        );
        let response = self
            .http
            .delete(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }

    /// List the most recent `limit` messages in a channel (single page).
    pub async fn list_recent(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<MessageSummary>, ChatError> {
        let url = format!(
            "{}/channels/{}/messages?limit={}",
            self.api_base, channel_id, limit
        );
        let response = self.get(&url).await?;
        let messages: Vec<MessagePayload> = response
            .json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;
        Ok(messages
            .into_iter()
            .map(|m| MessageSummary {
                id: m.id,
                author_id: m.author.id,
            })
            .collect())
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, ChatError> {
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        check_status(response).await
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ChatError::NotFound);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ChatError::Api {
        status: status.as_u16(),
        message,
    })
}
