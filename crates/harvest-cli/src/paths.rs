//! Data directory resolution.
//!
//! Resolved once at startup and handed to the library as an `OutputRoot`.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Base directory for checkpoints, datasets and archives.
///
/// `--data-dir`, then `HARVEST_DATA_DIR`, then the platform data directory,
/// then `.harvest` in the working directory.
pub fn data_dir(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir;
    }
    if let Some(dir) = std::env::var_os("HARVEST_DATA_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dirs) = ProjectDirs::from("", "", "harvest") {
        return dirs.data_dir().to_path_buf();
    }
    PathBuf::from(".harvest")
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("harvest.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_dir_wins() {
        let dir = data_dir(Some(PathBuf::from("/tmp/somewhere")));
        assert_eq!(dir, PathBuf::from("/tmp/somewhere"));
        assert_eq!(config_path(&dir), PathBuf::from("/tmp/somewhere/harvest.toml"));
    }
}
