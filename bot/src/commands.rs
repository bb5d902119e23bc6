/// Telegram bot command handlers.
///
/// Handles /start, /help, /link, /status and plain messages carrying
/// share links.
use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::info;

use terarelay_resolver::{LinkMatcher, ResolutionJob, ResolverPool};
use terarelay_shared::models::{CandidateLink, HeaderProfile, ResolveOptions};
use terarelay_shared::task_queue::{QueueStats, TrackedTask};

/// Bot command definitions.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Terarelay commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Show help")]
    Help,
    #[command(description = "Get the direct video link without downloading")]
    Link(String),
    #[command(description = "Show queue status and your recent links")]
    Status,
}

/// Shared application state passed to handlers.
pub struct AppState {
    pub pool: ResolverPool,
    pub matcher: LinkMatcher,
    pub default_profile: HeaderProfile,
}

const NO_LINK_REPLY: &str = "Send me a Terabox link.";

const HELP_TEXT: &str = "\
Terarelay

Send me a Terabox share link and I'll fetch the video for you.
Several links in one message are handled one by one.

Commands:
/link <url> - Reply with the direct video link only
/status - Show the queue and your recent links
/help - Show this message

Files above the upload limit are answered with a direct link instead.";

/// Handle incoming commands.
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    match cmd {
        Command::Start | Command::Help => {
            bot.send_message(msg.chat.id, HELP_TEXT).await?;
        }
        Command::Link(arg) => cmd_link(bot, msg, arg, state).await?,
        Command::Status => cmd_status(bot, msg, state).await?,
    }
    Ok(())
}

/// /link <url> - Resolve without downloading.
async fn cmd_link(bot: Bot, msg: Message, arg: String, state: Arc<AppState>) -> ResponseResult<()> {
    let links: Vec<CandidateLink> = state.matcher.find_links(&arg).collect();
    if links.is_empty() {
        bot.send_message(msg.chat.id, "Usage: /link <terabox url>").await?;
        return Ok(());
    }
    submit_links(&bot, msg.chat.id, links, false, &state).await
}

/// /status - Queue stats plus the caller's tracked tasks.
async fn cmd_status(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let queue = state.pool.queue();
    let stats = queue.stats().await;
    let tasks = queue.get_user_tasks(msg.chat.id.0).await;
    bot.send_message(msg.chat.id, status_text(&stats, &tasks)).await?;
    Ok(())
}

fn status_text(stats: &QueueStats, tasks: &[TrackedTask]) -> String {
    let mut text = format!(
        "Queue Status:\n\
         Running: {}/{}\n\
         Queued: {}\n\
         Completed: {}\n\
         Failed: {}\n",
        stats.running, stats.max_concurrent, stats.queued, stats.completed, stats.failed,
    );

    if tasks.is_empty() {
        text.push_str("\nNo recent links.");
        return text;
    }

    text.push_str("\nYour links:\n");
    let now = Utc::now();
    for task in tasks.iter().rev().take(10) {
        let short_id: String = task.task_id.chars().take(8).collect();
        let age = (now - task.enqueued_at).num_seconds().max(0);
        text.push_str(&format!("  {} {} {}s ago", short_id, task.status, age));
        if let Some(kind) = &task.error_kind {
            text.push_str(&format!(" ({})", kind));
        }
        text.push('\n');
    }
    text
}

/// Plain text messages: resolve and download every recognised link.
pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let links: Vec<CandidateLink> = state.matcher.find_links(text).collect();
    if links.is_empty() {
        bot.send_message(msg.chat.id, NO_LINK_REPLY).await?;
        return Ok(());
    }

    info!("Detected {} link(s) from chat {}", links.len(), msg.chat.id.0);
    submit_links(&bot, msg.chat.id, links, true, &state).await
}

/// Post one status message per link and submit one job for each.
async fn submit_links(
    bot: &Bot,
    chat_id: ChatId,
    links: Vec<CandidateLink>,
    download: bool,
    state: &AppState,
) -> ResponseResult<()> {
    let total = links.len();
    for (index, link) in links.into_iter().enumerate() {
        let position = index + 1;
        let status = bot
            .send_message(chat_id, format!("[{}/{}] Resolving {}", position, total, link.normalized_url))
            .await?;

        let job = ResolutionJob {
            chat_id: chat_id.0,
            status_message_id: status.id.0,
            position,
            total,
            link,
            options: ResolveOptions {
                profile: state.default_profile,
                download,
            },
            attempt: 1,
        };
        let task_id = state.pool.submit(job).await;
        info!("Submitted task {} [{}/{}] for chat {}", task_id, position, total, chat_id.0);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use terarelay_shared::task_queue::TaskState;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start", "terarelay_bot").unwrap(), Command::Start);
        assert_eq!(
            Command::parse("/link https://1024tera.com/s/1abc", "terarelay_bot").unwrap(),
            Command::Link("https://1024tera.com/s/1abc".into())
        );
        assert_eq!(Command::parse("/status", "terarelay_bot").unwrap(), Command::Status);
        assert!(Command::parse("/download x", "terarelay_bot").is_err());
    }

    #[test]
    fn test_status_text() {
        let stats = QueueStats {
            max_concurrent: 3,
            running: 1,
            queued: 0,
            completed: 4,
            failed: 1,
            total_tracked: 6,
        };
        let task = TrackedTask {
            task_id: "0123456789abcdef".into(),
            chat_id: 1,
            label: "https://1024tera.com/s/1abc".into(),
            status: TaskState::Failed,
            error_kind: Some("no_metadata_found".into()),
            enqueued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };

        let text = status_text(&stats, &[task]);
        assert!(text.contains("Running: 1/3"));
        assert!(text.contains("01234567 failed"));
        assert!(text.contains("(no_metadata_found)"));
        assert!(!text.contains("89abcdef"));

        assert!(status_text(&stats, &[]).ends_with("No recent links."));
    }
}
