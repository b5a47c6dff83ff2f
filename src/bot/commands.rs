//! Slash command handling

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

use crate::localization::t;
use crate::service::ImageService;
use crate::transform::{TransformDialogue, TransformState};

use super::message_handler::sender_id;
use super::messaging::notify;
use super::ui_builder::{
    clear_message, gallery_message, help_message, stats_message, unexpected_error_message,
    welcome_message,
};

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show the welcome message")]
    Start,
    #[command(description = "get help and prompt tips")]
    Help,
    #[command(description = "view your usage statistics")]
    Stats,
    #[command(description = "list your saved images")]
    Gallery,
    #[command(description = "cancel a pending transformation and delete your uploads")]
    Clear,
}

async fn handle_command(
    bot: &Bot,
    msg: &Message,
    cmd: Command,
    user_id: u64,
    dialogue: &TransformDialogue,
    state: &TransformState,
    service: &ImageService,
) -> Result<()> {
    info!(user_id, command = ?cmd, "Command received");

    let text = match cmd {
        Command::Start => {
            let first_name = msg
                .from
                .as_ref()
                .map(|user| user.first_name.as_str())
                .unwrap_or("there");
            welcome_message(first_name)
        }
        Command::Help => help_message(service.cooldown_secs()),
        Command::Stats => stats_message(user_id, &service.session(user_id), state),
        Command::Gallery => match service.gallery(user_id) {
            Ok(entries) => gallery_message(&entries),
            Err(e) => {
                error!(user_id, error = %e, "Failed to list gallery");
                t("gallery-failed")
            }
        },
        Command::Clear => match service.clear(user_id, dialogue).await {
            Ok(removed) => clear_message(removed),
            Err(e) => {
                error!(user_id, error = %e, "Failed to clear uploads");
                t("clear-failed")
            }
        },
    };

    notify(bot, msg.chat.id, &text).await;
    Ok(())
}

pub async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Command,
    dialogue: TransformDialogue,
    state: TransformState,
    service: Arc<ImageService>,
) -> Result<()> {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };

    if let Err(e) = handle_command(&bot, &msg, cmd, user_id, &dialogue, &state, &service).await {
        error!(user_id, error = ?e, "Unexpected error while handling command");
        notify(&bot, msg.chat.id, &unexpected_error_message(&e.to_string())).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("/start", "imagine_bot").unwrap(), Command::Start);
        assert_eq!(Command::parse("/stats", "imagine_bot").unwrap(), Command::Stats);
        assert_eq!(
            Command::parse("/gallery@imagine_bot", "imagine_bot").unwrap(),
            Command::Gallery
        );
        assert!(Command::parse("/unknown", "imagine_bot").is_err());
        assert!(Command::parse("a sunset over the sea", "imagine_bot").is_err());
    }

    #[test]
    fn test_command_descriptions() {
        let descriptions = Command::descriptions().to_string();
        for command in ["/start", "/help", "/stats", "/gallery", "/clear"] {
            assert!(descriptions.contains(command), "missing {command}");
        }
    }
}
