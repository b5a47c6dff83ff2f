//! Message Handler module for processing incoming Telegram messages

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileId;
use tracing::{debug, error, info};

use crate::localization::t;
use crate::service::ImageService;
use crate::transform::{TransformDialogue, TransformState};

use super::generation_flow::{run_generation, run_transform};
use super::messaging::notify;
use super::ui_builder::unexpected_error_message;

/// What an incoming message carries, as far as routing is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming<'a> {
    Text(&'a str),
    Photo { caption: Option<&'a str> },
    Other,
}

impl<'a> Incoming<'a> {
    pub fn of(msg: &'a Message) -> Self {
        if let Some(text) = msg.text() {
            Incoming::Text(text)
        } else if msg.photo().is_some() {
            Incoming::Photo {
                caption: msg.caption(),
            }
        } else {
            Incoming::Other
        }
    }
}

/// What the bot does with an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Generate(&'a str),
    Transform(&'a str),
    /// Store the photo; a non-blank caption is transformed right away
    StoreUpload { instruction: Option<&'a str> },
    Busy,
    UnknownCommand,
    Unsupported,
}

/// Decide how to handle `incoming` given the chat's transformation state
pub fn route<'a>(state: &TransformState, incoming: Incoming<'a>) -> Route<'a> {
    match incoming {
        Incoming::Text(text) if text.starts_with('/') => Route::UnknownCommand,
        Incoming::Text(_) | Incoming::Photo { .. } if state.is_processing() => Route::Busy,
        Incoming::Text(text) if state.is_awaiting_instruction() => Route::Transform(text),
        Incoming::Text(text) => Route::Generate(text),
        Incoming::Photo { caption } => Route::StoreUpload {
            instruction: caption.map(str::trim).filter(|caption| !caption.is_empty()),
        },
        Incoming::Other => Route::Unsupported,
    }
}

/// Download a Telegram file into memory.
///
/// Download errors never carry the file URL, which embeds the bot token.
pub async fn download_file(bot: &Bot, file_id: FileId, timeout: Duration) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id).await?;

    let mut bytes = Vec::new();
    tokio::time::timeout(timeout, bot.download_file(&file.path, &mut bytes))
        .await
        .map_err(|_| anyhow!("Download timed out after {}s", timeout.as_secs()))??;
    Ok(bytes)
}

/// Replace every occurrence of `token` in `text`
pub fn redact_token(text: &str, token: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    text.replace(token, "<redacted>")
}

/// Telegram user id of the sender, if the message has one
pub fn sender_id(msg: &Message) -> Option<u64> {
    msg.from.as_ref().map(|user| user.id.0)
}

async fn store_upload(
    bot: &Bot,
    msg: &Message,
    user_id: u64,
    dialogue: &TransformDialogue,
    service: &Arc<ImageService>,
) -> Result<bool> {
    let Some(largest_photo) = msg.photo().and_then(|photos| photos.last()) else {
        return Ok(false);
    };
    debug!(user_id, width = largest_photo.width, height = largest_photo.height, "Received photo message from user");

    let stored = match download_file(bot, largest_photo.file.id.clone(), service.download_timeout()).await {
        Ok(bytes) => service.register_upload(user_id, &bytes, dialogue).await,
        Err(e) => Err(e),
    };
    if let Err(e) = stored {
        let details = redact_token(&format!("{e:#}"), bot.token());
        error!(user_id, error = %details, "Failed to store uploaded photo");
        notify(bot, msg.chat.id, &t("upload-failed")).await;
        return Ok(false);
    }
    Ok(true)
}

async fn handle_message(
    bot: &Bot,
    msg: &Message,
    user_id: u64,
    dialogue: &TransformDialogue,
    state: &TransformState,
    service: &Arc<ImageService>,
) -> Result<()> {
    let chat_id = msg.chat.id;

    match route(state, Incoming::of(msg)) {
        Route::Generate(prompt) => run_generation(bot, chat_id, user_id, prompt, service).await,
        Route::Transform(instruction) => {
            run_transform(bot, chat_id, user_id, instruction, dialogue, service).await
        }
        Route::StoreUpload { instruction } => {
            if !store_upload(bot, msg, user_id, dialogue, service).await? {
                return Ok(());
            }
            match instruction {
                Some(instruction) => {
                    info!(user_id, "Photo carries a caption, transforming right away");
                    run_transform(bot, chat_id, user_id, instruction, dialogue, service).await
                }
                None => {
                    notify(bot, chat_id, &t("upload-received")).await;
                    Ok(())
                }
            }
        }
        Route::Busy => {
            notify(bot, chat_id, &t("transform-busy")).await;
            Ok(())
        }
        Route::UnknownCommand => {
            notify(bot, chat_id, &t("unknown-command")).await;
            Ok(())
        }
        Route::Unsupported => {
            debug!(chat_id = %chat_id, "Received unsupported message type from user");
            notify(bot, chat_id, &t("unsupported")).await;
            Ok(())
        }
    }
}

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    dialogue: TransformDialogue,
    state: TransformState,
    service: Arc<ImageService>,
) -> Result<()> {
    let Some(user_id) = sender_id(&msg) else {
        debug!(chat_id = %msg.chat.id, "Ignoring message without a sender");
        return Ok(());
    };

    if let Err(e) = handle_message(&bot, &msg, user_id, &dialogue, &state, &service).await {
        let details = redact_token(&format!("{e:#}"), bot.token());
        error!(user_id, error = %details, "Unexpected error while handling message");
        notify(&bot, msg.chat.id, &unexpected_error_message(&details)).await;
    }

    Ok(())
}
