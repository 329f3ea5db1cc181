//! Channel deduplication across members.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::model::Channel;

/// Channels keyed by chat id. Grows monotonically; the first discovery of a
/// chat id is kept and later ones are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupSet {
    channels: BTreeMap<String, Channel>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the chat id is already present. Returns whether the
    /// channel was new.
    pub fn insert(&mut self, channel: Channel) -> bool {
        match self.channels.entry(channel.chat_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(channel);
                true
            }
        }
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        self.channels.contains_key(chat_id)
    }

    pub fn get(&self, chat_id: &str) -> Option<&Channel> {
        self.channels.get(chat_id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Every key of `self` is present in `other` with the same channel.
    pub fn is_subset_of(&self, other: &DedupSet) -> bool {
        self.channels
            .iter()
            .all(|(id, channel)| other.channels.get(id) == Some(channel))
    }

    /// Channels ordered by chat id.
    pub fn to_vec(&self) -> Vec<Channel> {
        self.channels.values().cloned().collect()
    }

    pub fn into_vec(self) -> Vec<Channel> {
        self.channels.into_values().collect()
    }
}

#[derive(Debug, Default)]
pub struct DedupAggregator {
    set: DedupSet,
}

impl DedupAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a restored set.
    pub fn seeded(set: DedupSet) -> Self {
        Self { set }
    }

    /// Add discovered channels; returns how many were new.
    pub fn add_channels(&mut self, channels: impl IntoIterator<Item = Channel>) -> usize {
        channels
            .into_iter()
            .filter(|c| self.set.insert(c.clone()))
            .count()
    }

    pub fn set(&self) -> &DedupSet {
        &self.set
    }

    pub fn into_set(self) -> DedupSet {
        self.set
    }
}
