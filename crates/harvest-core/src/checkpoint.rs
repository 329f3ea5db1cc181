//! Resume state for the collection run, persisted as a single JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collect::SkippedMember;
use crate::dedup::DedupSet;
use crate::error::{HarvestError, Result};
use crate::model::Channel;
use crate::output::write_json_atomic;

/// Where enumeration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumerationCursor {
    /// Zero-based index of the last fully processed member.
    pub last_processed_member_index: usize,
    pub total_members_at_last_checkpoint: usize,
}

impl EnumerationCursor {
    /// Index of the first member still to be processed.
    pub fn resume_index(&self) -> usize {
        self.last_processed_member_index + 1
    }
}

/// Snapshot of an in-progress collection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub cursor: EnumerationCursor,
    pub dedup_set: Vec<Channel>,
    /// Members at or before the cursor whose discovery failed. Absent in
    /// checkpoints written before skips were recorded.
    #[serde(default)]
    pub skipped: Vec<SkippedMember>,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        cursor: EnumerationCursor,
        set: &DedupSet,
        skipped: &[SkippedMember],
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            cursor,
            dedup_set: set.to_vec(),
            skipped: skipped.to_vec(),
            saved_at,
        }
    }

    /// Rebuild the dedup set, rejecting duplicate chat ids.
    pub fn restore_set(&self) -> std::result::Result<DedupSet, String> {
        let mut set = DedupSet::new();
        for channel in &self.dedup_set {
            if !set.insert(channel.clone()) {
                return Err(format!("duplicate chatId {} in dedupSet", channel.chat_id));
            }
        }
        Ok(set)
    }

    fn validate(&self) -> std::result::Result<DedupSet, String> {
        let cursor = &self.cursor;
        if cursor.last_processed_member_index >= cursor.total_members_at_last_checkpoint {
            return Err(format!(
                "lastProcessedMemberIndex {} out of range for {} members",
                cursor.last_processed_member_index, cursor.total_members_at_last_checkpoint
            ));
        }
        self.restore_set()
    }
}

/// A checkpoint that passed validation, with its set already rebuilt.
#[derive(Debug, Clone)]
pub struct Restored {
    pub checkpoint: Checkpoint,
    pub set: DedupSet,
}

/// Single-file checkpoint persistence. Each save fully replaces the
/// previous checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write atomically; a crash mid-write leaves the previous checkpoint.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        write_json_atomic(&self.path, checkpoint)?;
        debug!(
            path = ?self.path,
            index = checkpoint.cursor.last_processed_member_index,
            channels = checkpoint.dedup_set.len(),
            "saved checkpoint"
        );
        Ok(())
    }

    /// Load the most recent checkpoint.
    ///
    /// A missing file is `Ok(None)`. A file that fails to parse or validate
    /// is [`HarvestError::ResumeStateCorrupt`]; it is never silently ignored.
    pub fn load(&self) -> Result<Option<Restored>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(HarvestError::io(&self.path, e)),
        };

        let checkpoint: Checkpoint =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;
        let set = checkpoint.validate().map_err(|reason| self.corrupt(reason))?;
        Ok(Some(Restored { checkpoint, set }))
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HarvestError::io(&self.path, e)),
        }
    }

    /// Move a corrupt checkpoint aside so a fresh run can start.
    pub fn quarantine(&self) -> Result<PathBuf> {
        let target = self.path.with_extension("json.corrupt");
        fs::rename(&self.path, &target).map_err(|e| HarvestError::io(&self.path, e))?;
        warn!(from = ?self.path, to = ?target, "moved corrupt checkpoint aside");
        Ok(target)
    }

    fn corrupt(&self, reason: String) -> HarvestError {
        HarvestError::ResumeStateCorrupt {
            path: self.path.clone(),
            reason,
        }
    }
}
