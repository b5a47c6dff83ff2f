//! Message delivery helpers.
//!
//! Formatted (HTML) delivery can fail when Telegram rejects the markup or the
//! network drops. Notifications degrade to plain text and never propagate a
//! delivery failure back into the handler.

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile, MessageId, ParseMode};
use tracing::{debug, error, warn};

use super::ui_builder::strip_html;

/// Send an HTML message, returning the sent message
pub async fn send_html(bot: &Bot, chat_id: ChatId, text: &str) -> Result<Message> {
    let message = bot
        .send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(message)
}

/// Best-effort notification.
///
/// Tries HTML first, then the same text stripped of markup. A failure of the
/// fallback is logged and swallowed.
pub async fn notify(bot: &Bot, chat_id: ChatId, text: &str) {
    let Err(e) = send_html(bot, chat_id, text).await else {
        return;
    };
    warn!(chat_id = %chat_id, error = %e, "Formatted delivery failed, falling back to plain text");

    if let Err(fallback_err) = bot.send_message(chat_id, strip_html(text)).await {
        error!(chat_id = %chat_id, error = %fallback_err, "Plain text delivery failed too");
    }
}

/// Replace the text of a status message, sending a new message if the edit fails
pub async fn edit_or_notify(bot: &Bot, chat_id: ChatId, message_id: MessageId, text: &str) {
    let edited = bot
        .edit_message_text(chat_id, message_id, text)
        .parse_mode(ParseMode::Html)
        .await;

    if let Err(e) = edited {
        warn!(chat_id = %chat_id, error = %e, "Failed to edit status message");
        notify(bot, chat_id, text).await;
    }
}

pub async fn delete_quietly(bot: &Bot, chat_id: ChatId, message_id: MessageId) {
    if let Err(e) = bot.delete_message(chat_id, message_id).await {
        debug!(chat_id = %chat_id, error = %e, "Failed to delete status message");
    }
}

pub async fn show_upload_action(bot: &Bot, chat_id: ChatId) {
    if let Err(e) = bot.send_chat_action(chat_id, ChatAction::UploadPhoto).await {
        debug!(chat_id = %chat_id, error = %e, "Failed to send chat action");
    }
}

/// Send a photo with an HTML caption
pub async fn send_photo(bot: &Bot, chat_id: ChatId, photo: InputFile, caption: &str) -> Result<()> {
    bot.send_photo(chat_id, photo)
        .caption(caption)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}
