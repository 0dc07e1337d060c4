//! Offline replay of chat events.
//!
//! Events are read as JSON lines, one per message or member join, and run
//! through a [`Warden`] in order. The [`ConsolePlatform`] writes every
//! delivered reply or DM back out as a JSON line, which makes rule sets easy to
//! try out without a live gateway connection.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::coordinator::Warden;
use super::delivery::{ChatPlatform, OutboundMessage};
use super::error::DeliveryError;
use super::model::{ChatEvent, MessageContext, MessageReference};
use super::roles::StaticRoles;

/// One line of replay input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    Message {
        id: String,
        channel_id: String,
        #[serde(default)]
        guild_id: Option<String>,
        author_id: String,
        content: String,
        /// Role names the author holds at the time of the message
        #[serde(default)]
        roles: Vec<String>,
        #[serde(default)]
        joined_at: Option<DateTime<Utc>>,
    },
    MemberJoin {
        #[serde(default)]
        guild_id: Option<String>,
        user_id: String,
    },
}

impl ReplayEvent {
    /// Split into the chat event and the author roles it carried.
    pub fn into_parts(self) -> (ChatEvent, Option<(String, Vec<String>)>) {
        match self {
            Self::Message {
                id,
                channel_id,
                guild_id,
                author_id,
                content,
                roles,
                joined_at,
            } => {
                let author_roles = (author_id.clone(), roles);
                let message = MessageContext {
                    message_id: id,
                    channel_id,
                    guild_id,
                    author_id,
                    is_bot: false,
                    content,
                    author_joined_at: joined_at,
                };
                (ChatEvent::Message(message), Some(author_roles))
            }
            Self::MemberJoin { guild_id, user_id } => (ChatEvent::MemberJoin { guild_id, user_id }, None),
        }
    }
}

/// Blank lines and `#` comments yield `None`.
pub fn parse_event_line(line: &str) -> Result<Option<ReplayEvent>, serde_json::Error> {
    let trimmed = line.trim().trim_start_matches('\u{feff}');
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some)
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ConsoleRecord<'a> {
    Reply {
        channel_id: &'a str,
        reference: Option<&'a MessageReference>,
        body: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        embed_color: Option<u32>,
    },
    DirectMessage {
        user_id: &'a str,
        body: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        embed_color: Option<u32>,
    },
}

/// Platform stand-in that writes outbound messages as JSON lines.
pub struct ConsolePlatform<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> ConsolePlatform<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_record(&self, record: &ConsoleRecord<'_>) -> Result<(), DeliveryError> {
        let line = serde_json::to_string(record)?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::other("console output lock poisoned"))?;
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> ChatPlatform for ConsolePlatform<W> {
    async fn send_reply(
        &self,
        channel_id: &str,
        reference: Option<&MessageReference>,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        self.write_record(&ConsoleRecord::Reply {
            channel_id,
            reference,
            body: &message.body,
            embed_color: message.embed_color,
        })
    }

    async fn send_direct_message(&self, user_id: &str, message: &OutboundMessage) -> Result<(), DeliveryError> {
        self.write_record(&ConsoleRecord::DirectMessage {
            user_id,
            body: &message.body,
            embed_color: message.embed_color,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub actions: usize,
    pub skipped_lines: usize,
}

/// Feed every event in `reader` through the warden, in order.
///
/// Roles carried by message lines are recorded in `roles` before the message
/// is evaluated, so `roles` should be the resolver the warden was built with.
pub async fn replay<B, P>(
    reader: B,
    warden: &Warden<P, StaticRoles>,
    roles: &StaticRoles,
) -> io::Result<ReplaySummary>
where
    B: BufRead,
    P: ChatPlatform + 'static,
{
    let mut summary = ReplaySummary::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let event = match parse_event_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(err) => {
                warn!("Skipping replay line {}: {}", line_no + 1, err);
                summary.skipped_lines += 1;
                continue;
            }
        };

        let (event, author_roles) = event.into_parts();
        if let Some((author_id, held)) = author_roles {
            roles.set_roles(&author_id, held);
        }

        summary.events += 1;
        if !warden.handle_event(event).await.is_no_action() {
            summary.actions += 1;
        }
    }

    debug!(
        "Replayed {} events, {} actions, {} skipped lines",
        summary.events, summary.actions, summary.skipped_lines
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::engine::RuleEngine;
    use crate::core::config::WardenConfig;
    use std::sync::Arc;

    const CONFIG: &str = r#"{
        "join_warning_message": "Welcome, staff never DM first.",
        "embed_color": 16711680,
        "alert_rules": [
            {
                "keywords": ["giveaway"],
                "warning_message": "Mods only.",
                "excluded_roles": ["Moderator"]
            },
            {
                "keywords": ["wallet", "seed phrase"],
                "warning_message": "Never share your seed phrase.",
                "omit_members_older_than_days": 30
            }
        ]
    }"#;

    fn setup() -> (
        Arc<ConsolePlatform<Vec<u8>>>,
        Arc<StaticRoles>,
        Warden<ConsolePlatform<Vec<u8>>, StaticRoles>,
    ) {
        let config = WardenConfig::from_json(CONFIG).unwrap();
        let engine = Arc::new(RuleEngine::from_config(&config).unwrap());
        let platform = Arc::new(ConsolePlatform::new(Vec::new()));
        let roles = Arc::new(StaticRoles::new());
        let warden = Warden::new(engine, Arc::clone(&platform), Arc::clone(&roles), "bot").with_config(&config);
        (platform, roles, warden)
    }

    fn output_lines(platform: Arc<ConsolePlatform<Vec<u8>>>) -> Vec<serde_json::Value> {
        let platform = Arc::try_unwrap(platform).ok().expect("platform still shared");
        let bytes = platform.into_inner();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_parse_event_lines() {
        assert_eq!(parse_event_line("   ").unwrap(), None);
        assert_eq!(parse_event_line("# comment").unwrap(), None);

        let event = parse_event_line(
            r#"{"type":"message","id":"1","channel_id":"c","author_id":"u","content":"hi","joined_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap()
        .unwrap();
        let (chat, roles) = event.into_parts();
        match chat {
            ChatEvent::Message(msg) => {
                assert_eq!(msg.content, "hi");
                assert!(msg.author_joined_at.is_some());
                assert_eq!(msg.guild_id, None);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(roles, Some(("u".to_string(), Vec::new())));

        assert!(parse_event_line(r#"{"type":"reaction"}"#).is_err());
    }

    #[tokio::test]
    async fn test_replay_writes_actions() {
        let (platform, roles, warden) = setup();
        let input = [
            r#"{"type":"member_join","guild_id":"g","user_id":"new"}"#,
            r#"{"type":"message","id":"1","channel_id":"c","guild_id":"g","author_id":"u1","content":"GIVEAWAY time"}"#,
            r#"{"type":"message","id":"2","channel_id":"c","guild_id":"g","author_id":"mod","content":"giveaway time","roles":["Moderator"]}"#,
            "not json",
            r#"{"type":"message","id":"3","channel_id":"c","guild_id":"g","author_id":"bot","content":"giveaway"}"#,
            r#"{"type":"message","id":"4","channel_id":"c","guild_id":"g","author_id":"u2","content":"post your seed phrase","joined_at":"2000-01-01T00:00:00Z"}"#,
        ]
        .join("\n");

        let summary = replay(input.as_bytes(), &warden, &roles).await.unwrap();
        assert_eq!(
            summary,
            ReplaySummary {
                events: 5,
                actions: 2,
                skipped_lines: 1,
            }
        );

        drop(warden);
        let lines = output_lines(platform);
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0]["kind"], "direct_message");
        assert_eq!(lines[0]["user_id"], "new");
        assert_eq!(lines[0]["body"], "Welcome, staff never DM first.");
        assert!(lines[0].get("embed_color").is_none());

        assert_eq!(lines[1]["kind"], "reply");
        assert_eq!(lines[1]["channel_id"], "c");
        assert_eq!(lines[1]["reference"]["message_id"], "1");
        assert_eq!(lines[1]["body"], "Mods only.");
        assert_eq!(lines[1]["embed_color"], 16711680);
    }
}
