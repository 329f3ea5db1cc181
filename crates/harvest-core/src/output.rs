//! Output locations and atomic JSON persistence.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{HarvestError, Result};

/// Root directory every dataset is written under.
#[derive(Debug, Clone)]
pub struct OutputRoot {
    dir: PathBuf,
}

impl OutputRoot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join("checkpoint.json")
    }

    pub fn unique_chats_path(&self) -> PathBuf {
        self.dir.join("unique_chats.json")
    }

    pub fn members_path(&self) -> PathBuf {
        self.dir.join("members.json")
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join("collect_report.json")
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.dir.join("archives")
    }

    pub fn archive_path(&self, chat_id: &str) -> PathBuf {
        self.archives_dir().join(format!("{}.json", safe_file_stem(chat_id)))
    }

    pub fn enriched_path(&self, chat_id: &str) -> PathBuf {
        self.archives_dir()
            .join(format!("{}.enriched.json", safe_file_stem(chat_id)))
    }

    pub fn raw_path(&self, endpoint: &str, stamp: &str) -> PathBuf {
        self.dir.join("raw").join(format!("{endpoint}_{stamp}.json"))
    }
}

fn safe_file_stem(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect()
}

/// Write `value` as pretty JSON, replacing `path` atomically.
///
/// The bytes go to a sibling temp file which is synced and then renamed over
/// the target, so a reader sees either the old file or the new one.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp_path).map_err(|e| HarvestError::io(&tmp_path, e))?;
        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| HarvestError::io(&tmp_path, e))?;
    }
    fs::rename(&tmp_path, path).map_err(|e| HarvestError::io(path, e))?;
    Ok(())
}

/// Read a JSON file; `Ok(None)` if it doesn't exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(HarvestError::io(path, e)),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}
