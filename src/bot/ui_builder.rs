//! UI Builder module for formatting outgoing messages

use teloxide::utils::html;

use crate::generation::{GeneratedImage, MAX_PROMPT_LENGTH};
use crate::generation_errors::GenerationError;
use crate::localization::{t, t_args};
use crate::media::{GalleryEntry, SavedImage};
use crate::service::TransformError;
use crate::session::UserSession;
use crate::transform::{TransformState, MAX_INSTRUCTION_LENGTH};

/// Telegram's limit for photo captions
pub const MAX_CAPTION_LENGTH: usize = 1024;
/// How much of a prompt is echoed back in status messages and stats
pub const PROMPT_DISPLAY_LENGTH: usize = 200;
pub const REVISED_PROMPT_DISPLAY_LENGTH: usize = 600;
pub const UNEXPECTED_ERROR_DISPLAY_LENGTH: usize = 100;
pub const GALLERY_PREVIEW_COUNT: usize = 5;

/// Shorten `text` to at most `max_chars` characters, ending in "..." when cut
pub fn truncate_for_display(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Truncate, then escape for HTML parse mode
fn display(text: &str, max_chars: usize) -> String {
    html::escape(&truncate_for_display(text, max_chars))
}

pub fn welcome_message(first_name: &str) -> String {
    t_args("welcome", &[("name", &html::escape(first_name))])
}

pub fn help_message(cooldown_secs: u64) -> String {
    format!(
        "{}\n\n{}",
        t("help-title"),
        t_args("help-body", &[("cooldown", &cooldown_secs.to_string())])
    )
}

pub fn stats_message(user_id: u64, session: &UserSession, state: &TransformState) -> String {
    let last_prompt = match &session.last_prompt {
        Some(prompt) => format!("<i>{}</i>", display(prompt, 50)),
        None => t("stats-no-prompt"),
    };

    let mut text = t_args(
        "stats",
        &[
            ("generated", &session.images_generated.to_string()),
            ("transformed", &session.images_transformed.to_string()),
            ("uploaded", &session.images_uploaded.to_string()),
            ("last_prompt", &last_prompt),
            ("user_id", &user_id.to_string()),
        ],
    );
    if state.pending_upload().is_some() {
        text.push_str("\n\n");
        text.push_str(&t("stats-pending-upload"));
    }
    text
}

pub fn cooldown_message(wait_seconds: u64) -> String {
    t_args("cooldown-wait", &[("seconds", &wait_seconds.to_string())])
}

pub fn generating_message(prompt: &str) -> String {
    t_args("generating", &[("prompt", &display(prompt, PROMPT_DISPLAY_LENGTH))])
}

pub fn transforming_message(instruction: &str) -> String {
    t_args(
        "transforming",
        &[("instruction", &display(instruction, PROMPT_DISPLAY_LENGTH))],
    )
}

fn caption(
    key: &str,
    arg: &str,
    user_text: &str,
    image: &GeneratedImage,
    saved: Option<&SavedImage>,
) -> String {
    let build = |prompt_len: usize, revised_len: usize| {
        let revised = image.revised_prompt.as_deref().unwrap_or(user_text);
        let mut text = t_args(
            key,
            &[
                (arg, &display(user_text, prompt_len)),
                ("revised", &display(revised, revised_len)),
            ],
        );
        if let Some(saved) = saved {
            text.push_str("\n\n");
            text.push_str(&t_args("saved-note", &[("size_kb", &saved.size_kb.to_string())]));
        }
        text
    };

    let text = build(PROMPT_DISPLAY_LENGTH, REVISED_PROMPT_DISPLAY_LENGTH);
    if text.chars().count() <= MAX_CAPTION_LENGTH {
        return text;
    }
    // Escaping can grow the text; retry with a much shorter excerpt
    build(40, 100)
}

pub fn generated_caption(prompt: &str, image: &GeneratedImage, saved: Option<&SavedImage>) -> String {
    caption("generated-caption", "prompt", prompt, image, saved)
}

pub fn transformed_caption(
    instruction: &str,
    image: &GeneratedImage,
    saved: Option<&SavedImage>,
) -> String {
    caption("transformed-caption", "instruction", instruction, image, saved)
}

/// Chat text for a failed generation
pub fn generation_error_message(err: &GenerationError) -> String {
    let body = match err {
        GenerationError::RateLimited(_) => t("error-rate-limited"),
        GenerationError::ConnectionFailed(_) => t("error-connection"),
        GenerationError::ContentPolicyViolation(_) => t("error-content-policy"),
        GenerationError::Api { code, .. } => t_args("error-api", &[("code", &html::escape(code))]),
    };
    format!("{}\n\n{}", t("error-title"), body)
}

/// Chat text for a failed transformation, with a hint that the upload is kept
pub fn transform_error_message(err: &TransformError) -> String {
    match err {
        TransformError::Generation(e) => format!(
            "{}\n\n{}",
            generation_error_message(e),
            t("transform-retry-hint")
        ),
        TransformError::Preparation(_) => t("error-prepare"),
        TransformError::AlreadyProcessing => t("transform-busy"),
        TransformError::NoPendingUpload => t("upload-received"),
        TransformError::State(details) => unexpected_error_message(details),
    }
}

pub fn prompt_rejection_message(reason: &str) -> String {
    match reason {
        "too_long" => t_args("prompt-too-long", &[("max", &MAX_PROMPT_LENGTH.to_string())]),
        _ => t("prompt-empty"),
    }
}

pub fn instruction_rejection_message(reason: &str) -> String {
    match reason {
        "too_long" => t_args(
            "instruction-too-long",
            &[("max", &MAX_INSTRUCTION_LENGTH.to_string())],
        ),
        _ => t("instruction-empty"),
    }
}

pub fn unexpected_error_message(details: &str) -> String {
    t_args(
        "error-unexpected",
        &[("details", &display(details, UNEXPECTED_ERROR_DISPLAY_LENGTH))],
    )
}

pub fn delivery_fallback_message(url: &str) -> String {
    t_args("delivery-fallback", &[("url", &html::escape(url))])
}

pub fn gallery_message(entries: &[GalleryEntry]) -> String {
    if entries.is_empty() {
        return t("gallery-empty");
    }

    let total_kb: u64 = entries.iter().map(|entry| entry.size_kb).sum();
    let mut lines = vec![t_args(
        "gallery-header",
        &[
            ("count", &entries.len().to_string()),
            ("total_kb", &total_kb.to_string()),
        ],
    )];
    lines.push(String::new());

    for entry in entries.iter().take(GALLERY_PREVIEW_COUNT) {
        lines.push(t_args(
            "gallery-item",
            &[
                ("name", &html::escape(&entry.file_name)),
                ("size_kb", &entry.size_kb.to_string()),
            ],
        ));
    }
    if entries.len() > GALLERY_PREVIEW_COUNT {
        lines.push(t_args(
            "gallery-more",
            &[("count", &(entries.len() - GALLERY_PREVIEW_COUNT).to_string())],
        ));
    }

    lines.join("\n")
}

pub fn clear_message(removed: usize) -> String {
    t_args("clear-done", &[("removed", &removed.to_string())])
}

/// Plain-text rendering of an HTML message, used when formatted delivery fails
pub fn strip_html(text: &str) -> String {
    let mut plain = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => plain.push(c),
            _ => {}
        }
    }
    plain
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}
