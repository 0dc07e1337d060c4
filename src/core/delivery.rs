//! Outbound side of the warden: what gets sent and the platform trait that sends it.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::core::error::DeliveryError;
use crate::core::model::MessageReference;

/// Body of a reply or DM. Replies carry an embed colour, DMs are plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_color: Option<u32>,
}

impl OutboundMessage {
    pub fn plain(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            embed_color: None,
        }
    }

    pub fn embed(body: impl Into<String>, color: u32) -> Self {
        Self {
            body: body.into(),
            embed_color: Some(color),
        }
    }
}

/// Sends messages through the chat platform. Implementations do not retry.
pub trait ChatPlatform: Send + Sync {
    fn send_reply(
        &self,
        channel_id: &str,
        reference: Option<&MessageReference>,
        message: &OutboundMessage,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;

    fn send_direct_message(
        &self,
        user_id: &str,
        message: &OutboundMessage,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
