//! Chat side of a generation: cooldown reply, status message, photo delivery
//! and error reporting.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::{error, info, warn};

use crate::generation::validate_prompt;
use crate::media::SavedImage;
use crate::service::{GenerationOutcome, ImageService};
use crate::transform::{validate_instruction, TransformDialogue};

use super::messaging::{delete_quietly, edit_or_notify, notify, send_html, send_photo, show_upload_action};
use super::ui_builder::{
    cooldown_message, delivery_fallback_message, generated_caption, generating_message,
    generation_error_message, instruction_rejection_message, prompt_rejection_message,
    transform_error_message, transformed_caption, transforming_message,
};

/// Generate an image for a free-text prompt and deliver it
pub async fn run_generation(
    bot: &Bot,
    chat_id: ChatId,
    user_id: u64,
    prompt: &str,
    service: &Arc<ImageService>,
) -> anyhow::Result<()> {
    let prompt = match validate_prompt(prompt) {
        Ok(prompt) => prompt,
        Err(reason) => {
            notify(bot, chat_id, &prompt_rejection_message(reason)).await;
            return Ok(());
        }
    };

    let decision = service.admit(user_id);
    if !decision.allowed {
        notify(bot, chat_id, &cooldown_message(decision.wait_seconds)).await;
        return Ok(());
    }

    info!(user_id, prompt = %prompt, "Image requested");
    let status = send_html(bot, chat_id, &generating_message(&prompt)).await?;
    show_upload_action(bot, chat_id).await;

    match service.generate(user_id, &prompt).await {
        Ok(outcome) => {
            let caption = generated_caption(&prompt, &outcome.image, outcome.saved.as_ref());
            deliver(bot, chat_id, &outcome, &caption).await;
            delete_quietly(bot, chat_id, status.id).await;
        }
        Err(e) => {
            error!(user_id, error = %e, "Error generating image");
            edit_or_notify(bot, chat_id, status.id, &generation_error_message(&e)).await;
        }
    }

    Ok(())
}

/// Transform the chat's pending upload with `instruction` and deliver it.
///
/// A cooldown rejection leaves the pending upload untouched.
pub async fn run_transform(
    bot: &Bot,
    chat_id: ChatId,
    user_id: u64,
    instruction: &str,
    dialogue: &TransformDialogue,
    service: &Arc<ImageService>,
) -> anyhow::Result<()> {
    let instruction = match validate_instruction(instruction) {
        Ok(instruction) => instruction,
        Err(reason) => {
            notify(bot, chat_id, &instruction_rejection_message(reason)).await;
            return Ok(());
        }
    };

    let decision = service.admit(user_id);
    if !decision.allowed {
        notify(bot, chat_id, &cooldown_message(decision.wait_seconds)).await;
        return Ok(());
    }

    info!(user_id, instruction = %instruction, "Transformation requested");
    let status = send_html(bot, chat_id, &transforming_message(&instruction)).await?;
    show_upload_action(bot, chat_id).await;

    match service.transform(user_id, &instruction, dialogue).await {
        Ok(outcome) => {
            let caption = transformed_caption(&instruction, &outcome.image, outcome.saved.as_ref());
            deliver(bot, chat_id, &outcome, &caption).await;
            delete_quietly(bot, chat_id, status.id).await;
        }
        Err(e) => {
            error!(user_id, error = %e, "Error transforming image");
            edit_or_notify(bot, chat_id, status.id, &transform_error_message(&e)).await;
        }
    }

    Ok(())
}

/// Send the generated image: by URL, then from the archived copy, then as a
/// link. Delivery failures never fail the request.
async fn deliver(bot: &Bot, chat_id: ChatId, outcome: &GenerationOutcome, caption: &str) {
    match reqwest::Url::parse(&outcome.image.url) {
        Ok(url) => match send_photo(bot, chat_id, InputFile::url(url), caption).await {
            Ok(()) => return,
            Err(e) => warn!(chat_id = %chat_id, error = %e, "Failed to send photo by URL"),
        },
        Err(e) => warn!(chat_id = %chat_id, error = %e, "Image API returned an invalid URL"),
    }

    if let Some(SavedImage { path, .. }) = &outcome.saved {
        match send_photo(bot, chat_id, InputFile::file(path.clone()), caption).await {
            Ok(()) => return,
            Err(e) => warn!(chat_id = %chat_id, error = %e, "Failed to send archived photo"),
        }
    }

    notify(
        bot,
        chat_id,
        &format!("{}\n\n{}", caption, delivery_fallback_message(&outcome.image.url)),
    )
    .await;
}
