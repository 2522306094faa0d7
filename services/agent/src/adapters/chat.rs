//! services/agent/src/adapters/chat.rs
//!
//! This module contains the adapter for the Microsoft Graph chat API.
//! It implements the `MessageSource` port from the `core` crate, fetching
//! one-to-one chat previews newer than the caller's watermark.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use taskpilot_core::domain::InboundMessage;
use taskpilot_core::ports::{MessageSource, PortError, PortResult};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `MessageSource` port against Microsoft Graph.
#[derive(Clone)]
pub struct GraphChatAdapter {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    /// The assistant's own directory id, used to drop self-authored previews.
    self_id: String,
}

impl GraphChatAdapter {
    /// Creates the adapter, resolving the authenticated identity once so
    /// later polls can filter out the assistant's own messages.
    pub async fn connect(base_url: String, access_token: String) -> PortResult<Self> {
        let client = reqwest::Client::new();

        let response = client
            .get(format!("{base_url}/me"))
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| PortError::Retryable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PortError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(PortError::Retryable(format!(
                "identity lookup returned {}",
                response.status()
            )));
        }

        let me: Me = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            access_token,
            self_id: me.id,
        })
    }
}

//=========================================================================================
// Graph Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct Me {
    id: String,
}

#[derive(Deserialize)]
struct ChatCollection {
    #[serde(default)]
    value: Vec<ChatPreview>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatPreview {
    chat_type: String,
    last_message_preview: Option<LastMessagePreview>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastMessagePreview {
    created_date_time: DateTime<Utc>,
    body: MessageBody,
    from: Option<MessageFrom>,
}

#[derive(Deserialize)]
struct MessageBody {
    content: String,
}

#[derive(Deserialize)]
struct MessageFrom {
    user: Option<GraphUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    display_name: String,
}

/// Keeps one-to-one chats whose last message was written by someone else
/// after `since`, normalized to oldest-first so the caller processes them in
/// conversational order. Graph returns them newest-first.
fn collect_new_messages(
    chats: Vec<ChatPreview>,
    self_id: &str,
    since: DateTime<Utc>,
) -> Vec<InboundMessage> {
    let mut messages: Vec<InboundMessage> = chats
        .into_iter()
        .filter(|chat| chat.chat_type == "oneOnOne")
        .filter_map(|chat| chat.last_message_preview)
        .filter_map(|preview| {
            let user = preview.from.and_then(|from| from.user)?;
            if user.id == self_id || preview.created_date_time <= since {
                return None;
            }
            Some(InboundMessage {
                sender_name: user.display_name,
                sender_id: user.id,
                text: preview.body.content,
                created_at: preview.created_date_time,
            })
        })
        .collect();

    messages.sort_by_key(|message| message.created_at);
    messages
}

//=========================================================================================
// `MessageSource` Trait Implementation
//=========================================================================================

#[async_trait]
impl MessageSource for GraphChatAdapter {
    async fn poll(&self, since: DateTime<Utc>) -> PortResult<Vec<InboundMessage>> {
        // Sorted descending server-side and re-sorted ascending after the
        // client-side filters, matching the order the chats endpoint indexes.
        let response = self
            .client
            .get(format!("{}/me/chats", self.base_url))
            .query(&[
                ("$expand", "lastMessagePreview"),
                ("$orderby", "lastMessagePreview/createdDateTime desc"),
            ])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| PortError::Retryable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PortError::Retryable(format!(
                "chats request returned {}",
                response.status()
            )));
        }

        let chats: ChatCollection = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let messages = collect_new_messages(chats.value, &self.self_id, since);
        debug!("{} chat preview(s) newer than {}", messages.len(), since);
        Ok(messages)
    }
}
