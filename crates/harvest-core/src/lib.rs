//! Bulk collection of chat channels and message histories from a
//! token-authenticated remote API.
//!
//! Every remote call is a [`transport::Transport::send`] wrapped by
//! [`RetryExecutor`]. List resources are walked page by page with
//! [`PagedFetcher`]. [`Collector`] builds the deduplicated channel set with
//! periodic checkpoints, [`MessageArchiver`] pulls chat histories and
//! [`Enricher`] resolves author names afterwards.

pub mod archive;
pub mod checkpoint;
pub mod clock;
pub mod collect;
pub mod config;
pub mod dedup;
pub mod enrich;
pub mod error;
pub mod members;
pub mod model;
pub mod output;
pub mod paging;
pub mod registry;
pub mod retry;
pub mod transport;

#[cfg(test)]
mod testing;

pub use archive::{ChatSummary, MessageArchiver};
pub use checkpoint::{Checkpoint, CheckpointStore, EnumerationCursor};
pub use clock::{Clock, FixedClock, SystemClock};
pub use collect::{CollectOptions, CollectReport, Collector, MemberProgress, SkippedMember};
pub use config::{HarvestConfig, MESSAGE_PAGE_CAP};
pub use dedup::{DedupAggregator, DedupSet};
pub use enrich::{Author, Directory, EnrichedArchive, Enricher};
pub use error::{HarvestError, Result};
pub use members::{ChannelDiscovery, MemberEnumerator};
pub use model::{Archive, Channel, DirectoryEntry, Member, Message};
pub use output::OutputRoot;
pub use paging::{Direction, PagedFetcher};
pub use registry::{EndpointDescriptor, EndpointRegistry};
pub use retry::{RetryExecutor, RetryPolicy};
pub use transport::{CallError, HttpTransport, Transport};
