//! # Imagine Telegram Bot
//!
//! A Telegram bot that turns text prompts into images with OpenAI's image
//! API, and reimagines uploaded photos from a follow-up instruction.

pub mod bot;
pub mod config;
pub mod generation;
pub mod generation_errors;
pub mod localization;
pub mod logging;
pub mod media;
pub mod openai;
pub mod rate_limiter;
pub mod service;
pub mod session;
pub mod transform;
