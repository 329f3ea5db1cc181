//! Author name resolution for archived chats.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HarvestError, Result};
use crate::model::{Archive, DirectoryEntry};
use crate::output::read_json;

/// Member id to display name lookup.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    names: HashMap<String, String>,
}

impl Directory {
    pub fn from_entries(entries: impl IntoIterator<Item = DirectoryEntry>) -> Self {
        Self {
            names: entries
                .into_iter()
                .map(|e| (e.member_id, e.display_name))
                .collect(),
        }
    }

    /// Accepts an array of `{memberId, displayName}` or an object mapping
    /// member id to name.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(_) => {
                let entries: Vec<DirectoryEntry> = serde_json::from_value(value)?;
                Ok(Self::from_entries(entries))
            }
            Value::Object(map) => Ok(Self {
                names: map
                    .into_iter()
                    .filter_map(|(id, name)| name.as_str().map(|n| (id, n.to_string())))
                    .collect(),
            }),
            _ => Err(HarvestError::Config(
                "directory must be a JSON array or object".into(),
            )),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let value: Value = read_json(path)?.ok_or_else(|| {
            HarvestError::Config(format!("directory file not found: {}", path.display()))
        })?;
        Self::from_value(value)
    }

    pub fn name(&self, member_id: &str) -> Option<&str> {
        self.names.get(member_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Author {
    Resolved { id: String, name: String },
    /// No directory entry for this id.
    Unresolved { id: String },
}

impl Author {
    pub fn id(&self) -> &str {
        match self {
            Author::Resolved { id, .. } | Author::Unresolved { id } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedMessage {
    pub id: String,
    pub author: Author,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedArchive {
    pub chat_id: String,
    pub messages: Vec<EnrichedMessage>,
    /// Distinct author ids with no directory entry, sorted.
    pub unresolved_authors: Vec<String>,
}

pub struct Enricher<'a> {
    directory: &'a Directory,
}

impl<'a> Enricher<'a> {
    pub fn new(directory: &'a Directory) -> Self {
        Self { directory }
    }

    /// Every message is kept; authors missing from the directory are marked
    /// unresolved.
    pub fn enrich(&self, archive: &Archive) -> EnrichedArchive {
        let mut unresolved = BTreeSet::new();
        let messages = archive
            .messages
            .iter()
            .map(|m| {
                let author = match self.directory.name(&m.author_id) {
                    Some(name) => Author::Resolved {
                        id: m.author_id.clone(),
                        name: name.to_string(),
                    },
                    None => {
                        unresolved.insert(m.author_id.clone());
                        Author::Unresolved {
                            id: m.author_id.clone(),
                        }
                    }
                };
                EnrichedMessage {
                    id: m.id.clone(),
                    author,
                    timestamp: m.timestamp,
                    text: m.text.clone(),
                }
            })
            .collect();

        EnrichedArchive {
            chat_id: archive.chat_id.clone(),
            messages,
            unresolved_authors: unresolved.into_iter().collect(),
        }
    }
}
