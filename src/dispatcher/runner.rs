//! Event dispatcher runner.
//!
//! Every inbound event is handled on its own task so a slow cowsay run
//! never holds up other chat traffic:
//! 1. Ready → join the target channel
//! 2. Message with a registered command → run the handler, post the reply
//! 3. Any other message → log it
//! 4. Subscription / joined → log it

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chat::{ChatEvent, ChatMessage, ChatSender, ChatSub, Room};
use crate::commands::{CommandHandler, CommandInvocation, CommandRegistry};
use crate::config::BotSettings;

/// Messages that can be sent to the dispatcher.
#[derive(Debug, Clone)]
pub enum DispatcherMessage {
    /// Stop reading events.
    Shutdown,
}

/// Routes chat events to their handlers.
pub struct EventDispatcher {
    /// Shared, read-only bot settings.
    settings: Arc<BotSettings>,

    /// Command name → handler mapping.
    registry: CommandRegistry,

    /// Command executor.
    handler: CommandHandler,

    /// Outbound side of the chat connection.
    chat: Arc<dyn ChatSender>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    #[must_use]
    pub fn new(
        settings: Arc<BotSettings>,
        registry: CommandRegistry,
        handler: CommandHandler,
        chat: Arc<dyn ChatSender>,
    ) -> Self {
        Self {
            settings,
            registry,
            handler,
            chat,
        }
    }

    /// Runs the dispatch loop until shutdown or until the event stream ends.
    ///
    /// Handler tasks still running at shutdown are left to finish on their own.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ChatEvent>,
        mut control: mpsc::Receiver<DispatcherMessage>,
    ) {
        info!(
            "Event dispatcher started with {} commands",
            self.registry.len()
        );

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("Chat event stream ended");
                        break;
                    };
                    let dispatcher = Arc::clone(&self);
                    tokio::spawn(async move {
                        dispatcher.dispatch(event).await;
                    });
                }
                msg = control.recv() => {
                    match msg {
                        Some(DispatcherMessage::Shutdown) | None => {
                            info!("Event dispatcher shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Handles a single event to completion.
    pub async fn dispatch(&self, event: ChatEvent) {
        match event {
            ChatEvent::Ready => self.on_ready().await,
            ChatEvent::Joined(room) => on_joined(&room),
            ChatEvent::Message(message) => self.on_message(message).await,
            ChatEvent::Subscription(sub) => on_sub(&sub),
        }
    }

    async fn on_ready(&self) {
        info!("Bot is ready for work, joining channels");
        if let Err(e) = self.chat.join_room(&self.settings.target_channel).await {
            warn!("Failed to join #{}: {}", self.settings.target_channel, e);
        }
    }

    async fn on_message(&self, message: ChatMessage) {
        let command = CommandInvocation::parse(&message, &self.settings.command_prefix)
            .and_then(|inv| self.registry.resolve(&inv.name).map(|kind| (kind, inv)));

        let Some((kind, invocation)) = command else {
            info!("in {}, {} said: {}", message.room, message.user, message.text);
            return;
        };

        let result = self.handler.execute(kind, &invocation).await;
        debug!(
            "!{} for {}: success={}",
            invocation.name, invocation.user, result.success
        );

        let Some(reply) = result.reply else {
            return;
        };

        if let Err(e) = self
            .chat
            .send_message(
                &invocation.room.name,
                &reply,
                invocation.message_id.as_deref(),
            )
            .await
        {
            warn!("Failed to reply in #{}: {}", invocation.room, e);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn on_joined(room: &Room) {
    info!("Joined #{}", room);
}

fn on_sub(sub: &ChatSub) {
    info!(
        "New subscription in {}: Type: {} Message: {}",
        sub.room, sub.sub_plan, sub.sub_message
    );
    info!(
        "{} in {} ({}): {}",
        sub.sub_type, sub.room, sub.sub_plan_name, sub.system_message
    );
}
