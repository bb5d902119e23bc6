/// Terarelay Bot - Main Entry Point
///
/// Telegram bot built with teloxide that resolves Terabox share links to
/// direct video URLs and relays the videos back to the chat.
mod commands;
mod delivery;

use std::sync::Arc;

use anyhow::Context;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

use terarelay_resolver::{LinkMatcher, ResolutionPipeline, ResolverPool};
use terarelay_shared::config::{BotConfig, ExtractionConfig};
use terarelay_shared::task_queue::TaskQueue;

use commands::{AppState, Command};

/// Finished tasks are kept this long for /status.
const TASK_RETENTION_SECS: i64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("terarelay_bot=info".parse()?)
                .add_directive("terarelay_resolver=info".parse()?)
                .add_directive("terarelay_shared=info".parse()?),
        )
        .init();

    info!("=== Terarelay Bot Starting ===");

    let bot_config = BotConfig::from_env().context("Invalid bot configuration")?;
    let extraction = ExtractionConfig::from_env().context("Invalid extraction configuration")?;

    std::fs::create_dir_all(&extraction.download_dir)
        .with_context(|| format!("Failed to create download directory {:?}", extraction.download_dir))?;

    let matcher = LinkMatcher::new(&extraction.domains)?;
    let pipeline = Arc::new(ResolutionPipeline::from_config(&extraction)?);
    let task_queue = Arc::new(TaskQueue::new(bot_config.max_concurrent));
    let (pool, reports) = ResolverPool::new(pipeline, task_queue.clone());

    info!(
        "Resolver ready: {} domain(s), {} slot(s), {} profile",
        extraction.domains.len(),
        bot_config.max_concurrent,
        extraction.default_profile
    );

    let state = Arc::new(AppState {
        pool: pool.clone(),
        matcher,
        default_profile: extraction.default_profile,
    });

    let bot = Bot::new(bot_config.token.clone());

    // Polling fails with 409 Conflict while a webhook is set
    match bot.delete_webhook().send().await {
        Ok(_) => info!("Webhook cleared (ready for polling)"),
        Err(e) => warn!("Failed to delete webhook: {} (continuing anyway)", e),
    }

    match bot.set_my_commands(Command::bot_commands()).await {
        Ok(_) => info!("Bot commands synced with Telegram"),
        Err(e) => error!("Failed to sync bot commands: {}", e),
    }

    if let Some(admin_id) = bot_config.admin_chat_id {
        let msg = format!(
            "Terarelay Bot online\nQueue: {} slots\nUpload limit: {} MB",
            bot_config.max_concurrent,
            bot_config.max_upload_bytes / 1024 / 1024
        );
        match bot.send_message(ChatId(admin_id), msg).await {
            Ok(_) => info!("Admin startup notification sent"),
            Err(e) => warn!("Failed to send admin notification: {}", e),
        }
    }

    tokio::spawn(delivery::run_delivery(
        bot.clone(),
        pool,
        reports,
        bot_config.max_upload_bytes,
    ));

    // Drop finished task records after the retention period
    let cleanup_queue = task_queue.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            let removed = cleanup_queue.cleanup_old(TASK_RETENTION_SECS).await;
            if removed > 0 {
                info!("Removed {} finished task record(s)", removed);
            }
        }
    });

    info!("Bot initialized, starting dispatcher...");

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint({
                    let state = state.clone();
                    move |bot: Bot, msg: Message, cmd: Command| {
                        let state = state.clone();
                        async move { commands::handle_command(bot, msg, cmd, state).await }
                    }
                }),
        )
        .branch(Update::filter_message().endpoint({
            let state = state.clone();
            move |bot: Bot, msg: Message| {
                let state = state.clone();
                async move { commands::handle_message(bot, msg, state).await }
            }
        }));

    Dispatcher::builder(bot, handler)
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.kind);
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Terarelay Bot stopped.");
    Ok(())
}
