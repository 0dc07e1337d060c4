use std::sync::Arc;

use log::{debug, warn};
use tokio::task::JoinHandle;

use super::alerts::engine::RuleEngine;
use super::alerts::model::{Action, ActionResult, Delivery, JoinWarning};
use super::config::{WardenConfig, DEFAULT_EMBED_COLOR};
use super::delivery::{ChatPlatform, OutboundMessage};
use super::model::{ChatEvent, MessageContext};
use super::roles::RoleResolver;

/// Routes chat events to the rule engine and delivers whatever it decides.
///
/// Everything held here is read-only once built, so one `Arc<Warden>` can be
/// shared by any number of concurrently running event tasks.
pub struct Warden<P, R> {
    engine: Arc<RuleEngine>,
    platform: Arc<P>,
    resolver: Arc<R>,
    bot_user_id: String,
    join_warning: JoinWarning,
    embed_color: u32,
}

impl<P, R> Warden<P, R>
where
    P: ChatPlatform + 'static,
    R: RoleResolver + 'static,
{
    pub fn new(
        engine: Arc<RuleEngine>,
        platform: Arc<P>,
        resolver: Arc<R>,
        bot_user_id: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            platform,
            resolver,
            bot_user_id: bot_user_id.into(),
            join_warning: JoinWarning::default(),
            embed_color: DEFAULT_EMBED_COLOR,
        }
    }

    /// Picks up the join warning and embed colour from the config.
    pub fn with_config(mut self, config: &WardenConfig) -> Self {
        self.join_warning = JoinWarning::new(config.join_warning_message.clone());
        self.embed_color = config.embed_color;
        self
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Handle one event on a fresh task.
    pub fn spawn(self: &Arc<Self>, event: ChatEvent) -> JoinHandle<ActionResult> {
        let warden = Arc::clone(self);
        tokio::spawn(async move { warden.handle_event(event).await })
    }

    /// Decide and deliver. Returns the decision even if delivery failed.
    pub async fn handle_event(&self, event: ChatEvent) -> ActionResult {
        match event {
            ChatEvent::Message(message) => self.handle_message(message).await,
            ChatEvent::MemberJoin { user_id, .. } => self.handle_member_join(&user_id).await,
        }
    }

    async fn handle_message(&self, mut message: MessageContext) -> ActionResult {
        // Ignore messages sent by the bot itself
        if message.author_id == self.bot_user_id {
            message.is_bot = true;
        }

        let evaluation = self.engine.evaluate(&message, self.resolver.as_ref()).await;
        if let ActionResult::Fired(action) = &evaluation.action {
            self.deliver(action, &message.author_id, Some(&message)).await;
        }
        evaluation.action
    }

    async fn handle_member_join(&self, user_id: &str) -> ActionResult {
        let action = self.join_warning.action();
        match &action {
            ActionResult::Fired(fired) => self.deliver(fired, user_id, None).await,
            ActionResult::NoAction => debug!("No join warning configured, skipping {}", user_id),
        }
        action
    }

    async fn deliver(&self, action: &Action, recipient_id: &str, origin: Option<&MessageContext>) {
        let result = match (action.delivery, origin) {
            (Delivery::InlineReply, Some(message)) => {
                let outbound = OutboundMessage::embed(action.text.clone(), self.embed_color);
                self.platform
                    .send_reply(&message.channel_id, Some(&message.reference()), &outbound)
                    .await
            }
            (Delivery::InlineReply, None) => {
                warn!("Inline reply for {} has no message to reply to", recipient_id);
                return;
            }
            (Delivery::DirectMessage, _) => {
                let outbound = OutboundMessage::plain(action.text.clone());
                self.platform.send_direct_message(recipient_id, &outbound).await
            }
        };

        if let Err(err) = result {
            warn!("{}", err);
        }
    }
}
