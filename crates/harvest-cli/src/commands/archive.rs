use anyhow::{bail, Context as _, Result};
use harvest_core::output::read_json;
use harvest_core::{Channel, Direction, HarvestError, MessageArchiver};

use super::Context;
use crate::ui;

pub async fn run(
    ctx: &Context,
    chat_id: &str,
    from: Option<&str>,
    direction: Option<Direction>,
    max: Option<usize>,
) -> Result<()> {
    let executor = ctx.executor()?;
    let mut archiver = MessageArchiver::from_config(&executor, &ctx.registry, &ctx.output, &ctx.config.archive);
    if let Some(direction) = direction {
        archiver = archiver.with_direction(direction);
    }

    let pb = ui::spinner(&format!("Archiving {chat_id}"));
    match archiver.archive_chat(chat_id, from, max).await {
        Ok(archive) => {
            pb.finish_and_clear();
            let suffix = if archive.truncated { " (truncated)" } else { "" };
            ui::success(&format!("{chat_id}: {} messages{suffix}", archive.fetched_count));
            ui::hint(&ctx.output.archive_path(chat_id).display().to_string());
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("Failed");
            if let HarvestError::ArchiveIncomplete { fetched, .. } = &e {
                ui::error(&format!("{chat_id}: stopped after {fetched} messages"));
                ui::hint(&format!(
                    "Partial archive kept at {}",
                    ctx.output.archive_path(chat_id).display()
                ));
            }
            Err(e.into())
        }
    }
}

pub async fn run_all(ctx: &Context, max: Option<usize>, concurrency: Option<usize>) -> Result<()> {
    let path = ctx.output.unique_chats_path();
    let chats: Vec<Channel> = read_json(&path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .with_context(|| format!("{} not found; run `harvest collect` first", path.display()))?;
    if chats.is_empty() {
        ui::info("No chats to archive.");
        return Ok(());
    }

    let executor = ctx.executor()?;
    let archiver = MessageArchiver::from_config(&executor, &ctx.registry, &ctx.output, &ctx.config.archive);
    let ids: Vec<String> = chats.into_iter().map(|c| c.chat_id).collect();
    let concurrency = concurrency.unwrap_or(ctx.config.archive.concurrency);

    let pb = ui::progress_bar(ids.len() as u64, "Archiving chats");
    let summaries = archiver
        .archive_all(&ids, max, concurrency, |summary| {
            pb.set_message(summary.chat_id.clone());
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();

    let failed: Vec<_> = summaries.iter().filter(|s| s.error.is_some()).collect();
    let messages: usize = summaries.iter().map(|s| s.fetched_count).sum();
    ui::success(&format!(
        "{} chats archived, {} messages",
        summaries.len() - failed.len(),
        messages
    ));
    let truncated = summaries.iter().filter(|s| s.truncated && s.error.is_none()).count();
    if truncated > 0 {
        ui::info(&format!("{truncated} stopped at the message limit"));
    }
    for summary in &failed {
        ui::error(&format!(
            "{}: {}",
            summary.chat_id,
            summary.error.as_deref().unwrap_or_default()
        ));
    }
    ui::hint(&ctx.output.archives_dir().display().to_string());

    if !failed.is_empty() {
        bail!("{} of {} chats incomplete; partial archives were kept", failed.len(), summaries.len());
    }
    Ok(())
}
