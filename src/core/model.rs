use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = String;
pub type ChannelId = String;
pub type GuildId = String;

/// One incoming guild message, plus what we know about its author.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageContext {
    pub message_id: String,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author_id: UserId,
    /// Set for messages authored by the warden itself
    pub is_bot: bool,
    pub content: String,
    pub author_joined_at: Option<DateTime<Utc>>,
}

impl MessageContext {
    pub fn reference(&self) -> MessageReference {
        MessageReference {
            message_id: self.message_id.clone(),
            channel_id: self.channel_id.clone(),
            guild_id: self.guild_id.clone(),
        }
    }
}

/// Points a reply back at the message it answers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReference {
    pub message_id: String,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    Message(MessageContext),
    MemberJoin {
        guild_id: Option<GuildId>,
        user_id: UserId,
    },
}
