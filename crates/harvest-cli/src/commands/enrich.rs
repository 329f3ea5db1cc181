use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use harvest_core::output::{read_json, write_json_atomic};
use harvest_core::{Archive, Author, Directory, Enricher};

use super::Context;
use crate::ui;

pub fn run(ctx: &Context, archive_path: &Path, directory: Option<PathBuf>) -> Result<()> {
    let archive: Archive = read_json(archive_path)
        .with_context(|| format!("failed to read archive {}", archive_path.display()))?
        .with_context(|| format!("archive not found: {}", archive_path.display()))?;

    let directory_path = directory.unwrap_or_else(|| ctx.output.members_path());
    let directory = Directory::load(&directory_path)
        .with_context(|| format!("failed to load directory {}", directory_path.display()))?;

    let enriched = Enricher::new(&directory).enrich(&archive);
    let out = ctx.output.enriched_path(&archive.chat_id);
    write_json_atomic(&out, &enriched)?;

    let resolved = enriched
        .messages
        .iter()
        .filter(|m| matches!(m.author, Author::Resolved { .. }))
        .count();
    ui::success(&format!(
        "{}: {} of {} messages attributed ({} directory entries)",
        archive.chat_id,
        resolved,
        enriched.messages.len(),
        directory.len()
    ));
    if !enriched.unresolved_authors.is_empty() {
        ui::warn(&format!(
            "{} authors not in directory: {}",
            enriched.unresolved_authors.len(),
            enriched.unresolved_authors.join(", ")
        ));
    }
    ui::hint(&out.display().to_string());
    Ok(())
}
