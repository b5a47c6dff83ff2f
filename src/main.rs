use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::info;

use imagine_bot::bot;
use imagine_bot::config::Config;
use imagine_bot::localization::init_localization;
use imagine_bot::logging::init_logging;
use imagine_bot::service::ImageService;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Fatal error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let log_path = init_logging(&config.log_dir, config.log_json)?;
    info!(log_file = %log_path.display(), "Starting Imagine Telegram Bot");

    init_localization()?;

    let service = Arc::new(ImageService::from_config(&config)?);
    info!(
        model = %config.image_model,
        cooldown_secs = config.cooldown.as_secs(),
        generated_dir = %config.generated_dir.display(),
        uploaded_dir = %config.uploaded_dir.display(),
        "Image service ready"
    );

    let bot = Bot::new(config.telegram_token);

    info!("Bot initialized, starting dispatcher");
    bot::run_dispatcher(bot, service).await;

    info!("Bot stopped");
    Ok(())
}
