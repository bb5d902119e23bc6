/// Delivers resolution reports back to chats.
///
/// Consumes the pool's report channel: uploads downloaded files within the
/// upload limit, answers with a direct link otherwise, and resubmits jobs
/// once with the mobile profile when the failure looks profile-specific.
use std::path::PathBuf;

use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use terarelay_resolver::{MediaResult, ResolutionJob, ResolutionReport, ResolverPool};
use terarelay_shared::errors::ResolveError;
use terarelay_shared::models::HeaderProfile;

/// What to send for a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryPlan {
    Upload { path: PathBuf, size_bytes: u64 },
    TooLarge { size_bytes: u64 },
    LinkOnly,
}

pub fn plan_delivery(media: &MediaResult, max_upload_bytes: u64) -> DeliveryPlan {
    match (media.local_path(), media.size_bytes) {
        (Some(path), Some(size_bytes)) if size_bytes <= max_upload_bytes => DeliveryPlan::Upload {
            path: path.to_path_buf(),
            size_bytes,
        },
        (Some(_), Some(size_bytes)) => DeliveryPlan::TooLarge { size_bytes },
        _ => DeliveryPlan::LinkOnly,
    }
}

/// Retry once with the mobile profile when a desktop first attempt failed
/// in a way that depends on the served markup.
pub fn should_retry(job: &ResolutionJob, error: &ResolveError) -> bool {
    error.suggests_alternate_profile() && job.options.profile == HeaderProfile::Desktop && job.attempt == 1
}

fn megabytes(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / 1024.0 / 1024.0)
}

/// Status text once both upload attempts failed.
fn upload_failed_text(tag: &str, url: &str) -> String {
    format!("{} Upload failed.\nDownload link: {}", tag, url)
}

/// Drain the report channel until every sender is gone.
pub async fn run_delivery(
    bot: Bot,
    pool: ResolverPool,
    mut reports: UnboundedReceiver<ResolutionReport>,
    max_upload_bytes: u64,
) {
    while let Some(report) = reports.recv().await {
        let bot = bot.clone();
        let pool = pool.clone();
        tokio::spawn(async move {
            let task_id = report.task_id.clone();
            if let Err(e) = deliver(&bot, &pool, report, max_upload_bytes).await {
                error!("Failed to deliver task {}: {}", task_id, e);
            }
        });
    }
    info!("Report channel closed, delivery stopped");
}

async fn deliver(
    bot: &Bot,
    pool: &ResolverPool,
    report: ResolutionReport,
    max_upload_bytes: u64,
) -> ResponseResult<()> {
    let ResolutionReport { task_id, job, outcome } = report;
    let chat_id = ChatId(job.chat_id);
    let status_id = MessageId(job.status_message_id);
    let tag = format!("[{}/{}]", job.position, job.total);

    let media = match outcome {
        Ok(media) => media,
        Err(error) if should_retry(&job, &error) => {
            let retry = job.retry_with_alternate_profile();
            info!(
                "Task {} failed with {}, retrying with {} profile",
                task_id,
                error.kind(),
                retry.options.profile
            );
            bot.edit_message_text(chat_id, status_id, format!("{} Trying again as a {} client...", tag, retry.options.profile))
                .await?;
            pool.submit(retry).await;
            return Ok(());
        }
        Err(error) => {
            bot.edit_message_text(chat_id, status_id, format!("{} {}", tag, error.user_hint()))
                .await?;
            return Ok(());
        }
    };

    send_media(bot, chat_id, status_id, &tag, media, max_upload_bytes).await
}

async fn send_media(
    bot: &Bot,
    chat_id: ChatId,
    status_id: MessageId,
    tag: &str,
    mut media: MediaResult,
    max_upload_bytes: u64,
) -> ResponseResult<()> {
    let plan = plan_delivery(&media, max_upload_bytes);
    // Deleted on drop, including early returns below.
    let local = media.local.take();

    match plan {
        DeliveryPlan::Upload { path, size_bytes } => {
            bot.edit_message_text(chat_id, status_id, format!("{} Uploading {}...", tag, megabytes(size_bytes)))
                .await?;
            if let Err(e) = bot.send_video(chat_id, InputFile::file(&path)).await {
                warn!("Failed to send video, trying document: {}", e);
                if let Err(e) = bot.send_document(chat_id, InputFile::file(&path)).await {
                    let text = upload_failed_text(tag, &media.selected_url);
                    if let Err(edit) = bot.edit_message_text(chat_id, status_id, text).await {
                        warn!("Failed to report upload failure: {}", edit);
                    }
                    return Err(e);
                }
            }
            bot.edit_message_text(chat_id, status_id, format!("{} Done", tag)).await?;
        }
        DeliveryPlan::TooLarge { size_bytes } => {
            bot.edit_message_text(
                chat_id,
                status_id,
                format!(
                    "{} The video is {}, over the {} upload limit.\nDownload link: {}",
                    tag,
                    megabytes(size_bytes),
                    megabytes(max_upload_bytes),
                    media.selected_url
                ),
            )
            .await?;
        }
        DeliveryPlan::LinkOnly => {
            bot.edit_message_text(chat_id, status_id, format!("{} Download link: {}", tag, media.selected_url))
                .await?;
        }
    }

    if let Some(handle) = local {
        let path = handle.path().to_path_buf();
        match handle.close() {
            Ok(()) => debug!("Removed {:?}", path),
            Err(e) => warn!("Failed to remove {:?}: {}", path, e),
        }
    }
    Ok(())
}
