use anyhow::Result;
use harvest_core::output::write_json_atomic;
use harvest_core::{CheckpointStore, CollectOptions, CollectReport, Collector, HarvestError, SystemClock};

use super::Context;
use crate::ui;

pub async fn run(ctx: &Context, max_members: Option<usize>, fresh: bool, discard_corrupt: bool) -> Result<()> {
    if discard_corrupt && !fresh {
        let store = CheckpointStore::new(ctx.output.checkpoint_path());
        if let Err(HarvestError::ResumeStateCorrupt { reason, .. }) = store.load() {
            let moved = store.quarantine()?;
            ui::warn(&format!("Checkpoint was corrupt ({reason}); moved to {}", moved.display()));
        }
    }

    let executor = ctx.executor()?;
    let mut options = CollectOptions::from_config(&ctx.config.collect);
    options.max_members = max_members;
    options.fresh = fresh;

    let pb = ui::progress_bar(0, "Discovering channels");
    let pb_progress = pb.clone();
    let result = Collector::new(&executor, &ctx.registry, &ctx.output, &SystemClock, options)
        .on_progress(move |p| {
            pb_progress.set_length(p.total as u64);
            pb_progress.set_position(p.index as u64 + 1);
            pb_progress.set_message(p.member.display_name.clone());
        })
        .run()
        .await;

    let report = match result {
        Ok(report) => {
            pb.finish_and_clear();
            report
        }
        Err(e) => {
            pb.abandon_with_message("Failed");
            if let HarvestError::ResumeStateCorrupt { .. } = e {
                ui::hint("Run again with --discard-corrupt to start over, or --fresh to ignore it.");
            } else if e.is_unauthorized() {
                ui::hint("The API token was rejected. Progress up to the last checkpoint is kept.");
            }
            return Err(e.into());
        }
    };

    write_json_atomic(&ctx.output.report_path(), &report)?;
    print_report(ctx, &report);
    Ok(())
}

fn print_report(ctx: &Context, report: &CollectReport) {
    if let Some(index) = report.resumed_from {
        ui::info(&format!("Resumed at member {} of {}", index + 1, report.members_total));
    }
    ui::success(&format!(
        "{} unique channels from {} members",
        report.unique_channels, report.members_processed
    ));
    if report.checkpoints_written > 0 {
        ui::info(&format!("{} checkpoints written", report.checkpoints_written));
    }
    if !report.skipped.is_empty() {
        ui::warn(&format!("{} members skipped:", report.skipped.len()));
        for skipped in &report.skipped {
            ui::error(&format!(
                "#{} {}: {} ({} attempts)",
                skipped.index + 1,
                skipped.member_id,
                skipped.cause,
                skipped.attempts
            ));
        }
    }
    ui::hint(&format!("Channels: {}", ctx.output.unique_chats_path().display()));
    ui::hint(&format!("Members:  {}", ctx.output.members_path().display()));
}
