//! Command handler implementation.

use std::sync::Arc;

use tracing::{error, info};

use super::renderer::TextRenderer;
use super::types::{CommandInvocation, CommandKind, CommandResult};
use crate::config::BotSettings;

/// Refusal sent when `reply` is used without text.
pub const REPLY_REFUSAL: &str = "you did not tell me what to reply with";

/// Executes commands against the bot settings.
pub struct CommandHandler {
    /// Shared, read-only bot settings.
    settings: Arc<BotSettings>,

    /// Renderer used by the cowsay command.
    renderer: Arc<dyn TextRenderer>,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(settings: Arc<BotSettings>, renderer: Arc<dyn TextRenderer>) -> Self {
        Self { settings, renderer }
    }

    /// Executes a resolved command.
    pub async fn execute(&self, kind: CommandKind, invocation: &CommandInvocation) -> CommandResult {
        info!(
            "in {}: {} used {}",
            invocation.room, invocation.user, invocation.name
        );

        if kind.is_privileged() && !self.settings.is_allowed(&invocation.user.name) {
            info!(
                "in {}: {} sent a !{} but isn't on the allow-list",
                invocation.room, invocation.user, invocation.name
            );
            return CommandResult::silent();
        }

        match kind {
            CommandKind::Reply => handle_reply(invocation),
            CommandKind::Cowsay => self.handle_cowsay(invocation).await,
        }
    }

    async fn handle_cowsay(&self, invocation: &CommandInvocation) -> CommandResult {
        let CommandInvocation {
            name, user, room, parameter, ..
        } = invocation;

        if parameter.is_empty() {
            info!("in {room}: {user} sent !{name} without params");
            return CommandResult::error(format!("you did not tell me what to {name} with"));
        }

        info!("in {room}: {user} used {name} with: {parameter}");
        match self.renderer.render(parameter).await {
            Ok(rendered) => CommandResult::success(format!("{user}: {rendered}")),
            Err(e) => {
                error!("in {room}: !{name} for {user} failed: {e}");
                CommandResult::error(format!("{user}: sorry, {name} failed"))
            }
        }
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn handle_reply(invocation: &CommandInvocation) -> CommandResult {
    let CommandInvocation {
        user, room, parameter, ..
    } = invocation;

    if parameter.is_empty() {
        info!("in {room}: {user} sent !reply without params");
        return CommandResult::error(REPLY_REFUSAL);
    }

    info!("in {room}: {user} used reply with: {parameter}");
    CommandResult::success(format!("{user}: {parameter}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::chat::{ChatUser, Room};
    use crate::commands::renderer::RenderError;

    /// Renderer that records its inputs and wraps them in a fake cow.
    #[derive(Default)]
    pub(crate) struct RecordingRenderer {
        pub(crate) calls: Mutex<Vec<String>>,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl TextRenderer for RecordingRenderer {
        async fn render(&self, text: &str) -> Result<String, RenderError> {
            self.calls.lock().unwrap().push(text.to_owned());
            if self.fail {
                return Err(RenderError::InvalidUtf8 {
                    program: "cowsay".to_owned(),
                });
            }
            Ok(format!("< {text} >\n  \\ ^__^"))
        }
    }

    fn invocation(user: &str, name: &str, parameter: &str) -> CommandInvocation {
        CommandInvocation {
            name: name.to_owned(),
            user: ChatUser::new(user),
            parameter: parameter.to_owned(),
            room: Room::new("syntax976"),
            message_id: None,
        }
    }

    fn handler(renderer: Arc<RecordingRenderer>) -> CommandHandler {
        CommandHandler::new(Arc::new(BotSettings::default()), renderer)
    }

    #[tokio::test]
    async fn test_reply_echoes_parameter() {
        let handler = handler(Arc::default());
        let result = handler
            .execute(CommandKind::Reply, &invocation("eve", "reply", "hello world"))
            .await;
        assert_eq!(result, CommandResult::success("eve: hello world"));
    }

    #[tokio::test]
    async fn test_reply_without_parameter() {
        let handler = handler(Arc::default());
        for user in ["billweiss", "eve"] {
            let result = handler
                .execute(CommandKind::Reply, &invocation(user, "reply", ""))
                .await;
            assert_eq!(result.reply.as_deref(), Some(REPLY_REFUSAL));
            assert!(!result.success);
        }
    }

    #[tokio::test]
    async fn test_cowsay_for_allowed_user() {
        let renderer = Arc::new(RecordingRenderer::default());
        let handler = handler(Arc::clone(&renderer));

        let result = handler
            .execute(CommandKind::Cowsay, &invocation("billweiss", "asdf", "moo"))
            .await;

        assert_eq!(*renderer.calls.lock().unwrap(), vec!["moo".to_owned()]);
        assert!(result.success);
        let reply = result.reply.unwrap();
        assert!(reply.starts_with("billweiss: "));
        assert!(reply.contains("moo"));
    }

    #[tokio::test]
    async fn test_cowsay_ignores_other_users() {
        let renderer = Arc::new(RecordingRenderer::default());
        let handler = handler(Arc::clone(&renderer));

        let result = handler
            .execute(CommandKind::Cowsay, &invocation("eve", "asdf", "moo"))
            .await;

        assert_eq!(result, CommandResult::silent());
        assert!(renderer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_allow_list_checked_before_parameter() {
        let renderer = Arc::new(RecordingRenderer::default());
        let handler = handler(Arc::clone(&renderer));

        // A stranger gets no refusal text either, only silence.
        let result = handler
            .execute(CommandKind::Cowsay, &invocation("eve", "moo", ""))
            .await;

        assert_eq!(result, CommandResult::silent());
        assert!(renderer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cowsay_without_parameter() {
        let renderer = Arc::new(RecordingRenderer::default());
        let handler = handler(Arc::clone(&renderer));

        let result = handler
            .execute(CommandKind::Cowsay, &invocation("beardbyte", "asdf", ""))
            .await;

        assert_eq!(
            result.reply.as_deref(),
            Some("you did not tell me what to asdf with")
        );
        assert!(renderer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cowsay_failure_is_reported() {
        let renderer = Arc::new(RecordingRenderer {
            fail: true,
            ..RecordingRenderer::default()
        });
        let handler = handler(Arc::clone(&renderer));

        let result = handler
            .execute(CommandKind::Cowsay, &invocation("billweiss", "asdf", "moo"))
            .await;

        assert!(!result.success);
        assert_eq!(result.reply.as_deref(), Some("billweiss: sorry, asdf failed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cowsay_with_real_process() {
        let settings = Arc::new(BotSettings::default());
        let renderer = crate::commands::ProcessRenderer::new("echo", settings.render_timeout());
        let handler = CommandHandler::new(settings, Arc::new(renderer));

        let result = handler
            .execute(CommandKind::Cowsay, &invocation("billweiss", "asdf", "moo"))
            .await;

        assert_eq!(result, CommandResult::success("billweiss: moo\n"));
    }
}
