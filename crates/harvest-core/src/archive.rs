//! Per-chat message history archiving.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ArchiveConfig, MESSAGE_PAGE_CAP};
use crate::error::{HarvestError, Result};
use crate::model::{parse_items, Archive, Message};
use crate::output::{write_json_atomic, OutputRoot};
use crate::paging::{Direction, PageStrategy, PagedFetcher, ResourceDescriptor};
use crate::registry::{params, EndpointRegistry, CHAT_MESSAGES};
use crate::retry::RetryExecutor;

pub struct MessageArchiver<'a> {
    executor: &'a RetryExecutor,
    registry: &'a EndpointRegistry,
    output: &'a OutputRoot,
    direction: Direction,
    page_size: usize,
}

/// Outcome of one chat in a bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub chat_id: String,
    pub fetched_count: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<'a> MessageArchiver<'a> {
    pub fn new(executor: &'a RetryExecutor, registry: &'a EndpointRegistry, output: &'a OutputRoot) -> Self {
        Self {
            executor,
            registry,
            output,
            direction: Direction::default(),
            page_size: MESSAGE_PAGE_CAP,
        }
    }

    pub fn from_config(
        executor: &'a RetryExecutor,
        registry: &'a EndpointRegistry,
        output: &'a OutputRoot,
        config: &ArchiveConfig,
    ) -> Self {
        Self::new(executor, registry, output)
            .with_direction(config.direction)
            .with_page_size(config.effective_page_size())
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Requested items per page, clamped to the API's hard cap.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MESSAGE_PAGE_CAP);
        self
    }

    /// Fetch a chat's history and write it to `archives/<chatId>.json`.
    ///
    /// The result holds no repeated ids and is ordered by timestamp. With
    /// `max_messages`, stops once that many unique messages are held and
    /// marks the archive truncated unless the end was also observed.
    ///
    /// If a page fetch fails, whatever was gathered is written with
    /// `truncated = true` and [`HarvestError::ArchiveIncomplete`] is
    /// returned.
    pub async fn archive_chat(
        &self,
        chat_id: &str,
        from_message_id: Option<&str>,
        max_messages: Option<usize>,
    ) -> Result<Archive> {
        let resource = ResourceDescriptor {
            endpoint: CHAT_MESSAGES,
            params: params([("chatId", chat_id)]),
            strategy: PageStrategy::MessageAnchor {
                direction: self.direction,
            },
            page_size: self.page_size,
            item_keys: &["messages"],
        };
        let mut fetcher = PagedFetcher::new(self.executor, self.registry, resource)?
            .starting_at(from_message_id.map(str::to_string));

        let mut seen = HashSet::new();
        let mut held = Held::new(self.direction);
        let mut truncated = max_messages == Some(0);

        while !truncated {
            let page = match fetcher.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    warn!(chat_id, fetched = held.len(), error = %e, "archive interrupted");
                    let fetched = held.len();
                    self.persist(chat_id, held.into_chronological(), true)?;
                    return Err(HarvestError::ArchiveIncomplete {
                        chat_id: chat_id.to_string(),
                        fetched,
                        source: Box::new(e),
                    });
                }
            };

            let parsed = parse_items(CHAT_MESSAGES, &page.items, |v| Message::from_value(v, chat_id));
            let mut batch = Vec::new();
            let mut remaining = parsed.into_iter().filter(|m| seen.insert(m.id.clone())).peekable();
            while let Some(message) = remaining.next() {
                batch.push(message);
                if max_messages.is_some_and(|max| held.len() + batch.len() >= max) {
                    truncated = remaining.peek().is_some() || !page.end_of_data;
                    break;
                }
            }
            let fresh = batch.len();
            held.push_page(batch);
            if max_messages.is_some_and(|max| held.len() >= max) {
                break;
            }
            if fresh == 0 && !page.items.is_empty() {
                debug!(chat_id, "page held no new messages, stopping");
                break;
            }
        }

        let archive = self.persist(chat_id, held.into_chronological(), truncated)?;
        info!(
            chat_id,
            messages = archive.fetched_count,
            truncated = archive.truncated,
            pages = fetcher.pages_fetched(),
            "archived chat"
        );
        Ok(archive)
    }

    /// Archive several chats with at most `concurrency` in flight.
    ///
    /// A failing chat does not stop the others; its summary carries the
    /// error. Summaries are returned ordered by chat id.
    pub async fn archive_all(
        &self,
        chat_ids: &[String],
        max_messages: Option<usize>,
        concurrency: usize,
        on_done: impl Fn(&ChatSummary),
    ) -> Vec<ChatSummary> {
        let mut summaries: Vec<ChatSummary> = stream::iter(chat_ids.iter().map(|chat_id| async move {
            match self.archive_chat(chat_id, None, max_messages).await {
                Ok(archive) => ChatSummary {
                    chat_id: chat_id.clone(),
                    fetched_count: archive.fetched_count,
                    truncated: archive.truncated,
                    error: None,
                },
                Err(e) => ChatSummary {
                    chat_id: chat_id.clone(),
                    fetched_count: match &e {
                        HarvestError::ArchiveIncomplete { fetched, .. } => *fetched,
                        _ => 0,
                    },
                    truncated: true,
                    error: Some(e.to_string()),
                },
            }
        }))
        .buffer_unordered(concurrency.max(1))
        .inspect(|summary| on_done(summary))
        .collect()
        .await;

        summaries.sort_by(|a, b| a.chat_id.cmp(&b.chat_id));
        summaries
    }

    /// Write the archive. `messages` arrive in chronological sequence, so the
    /// stable sort leaves equal timestamps in that sequence.
    fn persist(&self, chat_id: &str, mut messages: Vec<Message>, truncated: bool) -> Result<Archive> {
        messages.sort_by_key(|m| m.timestamp);
        let archive = Archive {
            chat_id: chat_id.to_string(),
            fetched_count: messages.len(),
            messages,
            truncated,
        };
        write_json_atomic(&self.output.archive_path(chat_id), &archive)?;
        Ok(archive)
    }
}

/// Messages gathered so far, kept page by page.
///
/// The listing returns each page newest first. `Before` pages walk back in
/// time and `After` pages walk forward, so chronological order is each page
/// reversed, with the page order reversed too for `Before`.
struct Held {
    direction: Direction,
    pages: Vec<Vec<Message>>,
    count: usize,
}

impl Held {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            pages: Vec::new(),
            count: 0,
        }
    }

    fn len(&self) -> usize {
        self.count
    }

    fn push_page(&mut self, mut page: Vec<Message>) {
        if page.is_empty() {
            return;
        }
        page.reverse();
        self.count += page.len();
        self.pages.push(page);
    }

    fn into_chronological(mut self) -> Vec<Message> {
        if self.direction != Direction::After {
            self.pages.reverse();
        }
        self.pages.into_iter().flatten().collect()
    }
}
