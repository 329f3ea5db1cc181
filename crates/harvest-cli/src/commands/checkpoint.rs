use anyhow::Result;
use harvest_core::CheckpointStore;

use super::Context;
use crate::ui;

pub fn show(ctx: &Context) -> Result<()> {
    let store = CheckpointStore::new(ctx.output.checkpoint_path());
    let Some(restored) = store.load()? else {
        ui::info("No checkpoint; the next collect starts from the first member.");
        return Ok(());
    };

    let cursor = restored.checkpoint.cursor;
    ui::header("Checkpoint");
    ui::info(&format!(
        "Last processed member: {} of {}",
        cursor.last_processed_member_index + 1,
        cursor.total_members_at_last_checkpoint
    ));
    ui::info(&format!("Channels so far:       {}", restored.set.len()));
    if !restored.checkpoint.skipped.is_empty() {
        let ids: Vec<&str> = restored
            .checkpoint
            .skipped
            .iter()
            .map(|s| s.member_id.as_str())
            .collect();
        ui::warn(&format!("Skipped members:       {}", ids.join(", ")));
    }
    ui::info(&format!(
        "Saved at:              {}",
        restored.checkpoint.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    ui::hint(&store.path().display().to_string());
    Ok(())
}

pub fn clear(ctx: &Context) -> Result<()> {
    let store = CheckpointStore::new(ctx.output.checkpoint_path());
    if !store.exists() {
        ui::info("No checkpoint to clear.");
        return Ok(());
    }
    store.clear()?;
    ui::success("Checkpoint cleared");
    Ok(())
}
