//! Bot module for handling Telegram interactions
//!
//! - `commands`: `/start`, `/help`, `/stats`, `/gallery`, `/clear`
//! - `message_handler`: free text and photo messages
//! - `generation_flow`: status messages, delivery and error replies for a generation
//! - `messaging`: delivery helpers with plain-text fallback
//! - `ui_builder`: formats outgoing messages

pub mod commands;
pub mod generation_flow;
pub mod message_handler;
pub mod messaging;
pub mod ui_builder;

use std::sync::Arc;

use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dispatching::{HandlerExt, UpdateFilterExt};
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;

use crate::service::ImageService;
use crate::transform::TransformState;

pub use commands::{command_handler, Command};
pub use message_handler::message_handler;

/// Route commands first, then all other messages, until Ctrl-C.
///
/// Every message enters the chat's transformation dialogue, so handlers
/// receive both the `TransformDialogue` and the current `TransformState`.
pub async fn run_dispatcher(bot: Bot, service: Arc<ImageService>) {
    let handler = Update::filter_message()
        .enter_dialogue::<Message, InMemStorage<TransformState>, TransformState>()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(command_handler),
        )
        .branch(dptree::endpoint(message_handler));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![service, InMemStorage::<TransformState>::new()])
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
