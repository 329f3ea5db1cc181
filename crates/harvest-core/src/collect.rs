//! The channel collection run.
//!
//! Enumerates every member, discovers each member's channels and folds them
//! into one deduplicated set. Progress is checkpointed every
//! `checkpoint_every` processed members so an interrupted run picks up at
//! the member after the last checkpoint with its set restored.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore, EnumerationCursor};
use crate::clock::Clock;
use crate::config::CollectConfig;
use crate::dedup::{DedupAggregator, DedupSet};
use crate::error::{HarvestError, Result};
use crate::members::{ChannelDiscovery, MemberEnumerator};
use crate::model::{DirectoryEntry, Member};
use crate::output::{write_json_atomic, OutputRoot};
use crate::registry::EndpointRegistry;
use crate::retry::RetryExecutor;

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub checkpoint_every: usize,
    pub member_page_size: usize,
    /// Only process the first N members of the listing.
    pub max_members: Option<usize>,
    /// Ignore any existing checkpoint and start from the first member.
    pub fresh: bool,
}

impl CollectOptions {
    pub fn from_config(config: &CollectConfig) -> Self {
        Self {
            checkpoint_every: config.checkpoint_every,
            member_page_size: config.member_page_size,
            max_members: None,
            fresh: false,
        }
    }
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self::from_config(&CollectConfig::default())
    }
}

/// A member whose channel discovery failed. The run continued without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedMember {
    pub member_id: String,
    pub index: usize,
    pub cause: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectReport {
    pub members_total: usize,
    /// Members handled by this run, skipped ones included.
    pub members_processed: usize,
    /// Zero-based index this run started at when resuming.
    pub resumed_from: Option<usize>,
    pub skipped: Vec<SkippedMember>,
    pub checkpoints_written: usize,
    pub unique_channels: usize,
}

/// Per-member progress, reported after each member is handled.
#[derive(Debug, Clone, Copy)]
pub struct MemberProgress<'m> {
    pub index: usize,
    pub total: usize,
    pub member: &'m Member,
    pub new_channels: usize,
    pub skipped: bool,
}

type ProgressFn<'a> = Box<dyn Fn(MemberProgress<'_>) + Send + Sync + 'a>;

pub struct Collector<'a> {
    executor: &'a RetryExecutor,
    registry: &'a EndpointRegistry,
    output: &'a OutputRoot,
    clock: &'a dyn Clock,
    options: CollectOptions,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> Collector<'a> {
    pub fn new(
        executor: &'a RetryExecutor,
        registry: &'a EndpointRegistry,
        output: &'a OutputRoot,
        clock: &'a dyn Clock,
        options: CollectOptions,
    ) -> Self {
        Self {
            executor,
            registry,
            output,
            clock,
            options,
            progress: None,
        }
    }

    pub fn on_progress(mut self, f: impl Fn(MemberProgress<'_>) + Send + Sync + 'a) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn checkpoint_store(&self) -> CheckpointStore {
        CheckpointStore::new(self.output.checkpoint_path())
    }

    /// Run the collection to completion.
    ///
    /// Fails without touching the remote API if the checkpoint is corrupt.
    /// A 401 during discovery aborts the run, leaving the last checkpoint in
    /// place; any other per-member failure is recorded and skipped.
    pub async fn run(&self) -> Result<CollectReport> {
        if self.options.checkpoint_every == 0 {
            return Err(HarvestError::Config("checkpoint_every must be at least 1".into()));
        }

        let store = self.checkpoint_store();
        let restored = if self.options.fresh {
            None
        } else {
            store.load()?
        };

        let mut members = MemberEnumerator::new(self.executor, self.registry, self.options.member_page_size)
            .enumerate_members()?
            .collect_all()
            .await?;
        if let Some(max) = self.options.max_members {
            members.truncate(max);
        }
        let total = members.len();

        let mut report = CollectReport {
            members_total: total,
            ..Default::default()
        };

        let (start, mut aggregator) = match restored {
            Some(restored) => {
                let cursor = restored.checkpoint.cursor;
                if cursor.total_members_at_last_checkpoint != total {
                    warn!(
                        checkpoint_total = cursor.total_members_at_last_checkpoint,
                        current_total = total,
                        "member count changed since checkpoint"
                    );
                }
                let start = cursor.resume_index();
                info!(
                    resume_index = start,
                    channels = restored.set.len(),
                    "resuming from checkpoint"
                );
                report.resumed_from = Some(start);
                report.skipped = restored.checkpoint.skipped;
                (start, DedupAggregator::seeded(restored.set))
            }
            None => (0, DedupAggregator::new()),
        };

        let discovery = ChannelDiscovery::new(self.executor, self.registry);
        let mut since_checkpoint = 0;

        for (index, member) in members.iter().enumerate().skip(start) {
            let (new_channels, skipped) = match discovery.discover_channels(member).await {
                Ok(channels) => (aggregator.add_channels(channels), false),
                Err(e) if e.is_unauthorized() => {
                    warn!(member_id = %member.id, index, "token rejected, aborting run");
                    return Err(e);
                }
                Err(e) => {
                    warn!(member_id = %member.id, index, error = %e, "skipping member");
                    report.skipped.push(SkippedMember {
                        member_id: member.id.clone(),
                        index,
                        cause: e.to_string(),
                        attempts: e.attempts(),
                    });
                    (0, true)
                }
            };
            report.members_processed += 1;
            since_checkpoint += 1;

            if let Some(progress) = &self.progress {
                progress(MemberProgress {
                    index,
                    total,
                    member,
                    new_channels,
                    skipped,
                });
            }

            if since_checkpoint == self.options.checkpoint_every {
                self.write_checkpoint(&store, index, total, aggregator.set(), &report.skipped)?;
                report.checkpoints_written += 1;
                since_checkpoint = 0;
            }
        }

        let set = aggregator.into_set();
        report.unique_channels = set.len();
        self.write_datasets(&set, &members)?;
        store.clear()?;

        info!(
            members = report.members_processed,
            skipped = report.skipped.len(),
            channels = report.unique_channels,
            "collection complete"
        );
        Ok(report)
    }

    fn write_checkpoint(
        &self,
        store: &CheckpointStore,
        index: usize,
        total: usize,
        set: &DedupSet,
        skipped: &[SkippedMember],
    ) -> Result<()> {
        let cursor = EnumerationCursor {
            last_processed_member_index: index,
            total_members_at_last_checkpoint: total,
        };
        store.save(&Checkpoint::new(cursor, set, skipped, self.clock.now()))?;
        debug!(index, channels = set.len(), "checkpoint written");
        Ok(())
    }

    fn write_datasets(&self, set: &DedupSet, members: &[Member]) -> Result<()> {
        write_json_atomic(&self.output.unique_chats_path(), &set.to_vec())?;
        let directory: Vec<DirectoryEntry> = members.iter().map(Member::directory_entry).collect();
        write_json_atomic(&self.output.members_path(), &directory)?;
        Ok(())
    }
}
