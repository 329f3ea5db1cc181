//! Sequential pagination over one list resource.
//!
//! A [`PagedFetcher`] is pulled one page at a time with
//! [`PagedFetcher::next_page`]. Nothing is fetched until asked for, and page
//! N+1 is only requested after page N has returned, since its cursor comes
//! from page N. [`PagedFetcher::cursor`] exposes the restart point; feeding
//! it back through [`PagedFetcher::starting_at`] resumes the sequence there.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::model::{extract_items, first_str};
use crate::registry::{EndpointDescriptor, EndpointRegistry};
use crate::retry::RetryExecutor;

/// Traversal direction of the message listing, relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Older messages first (from newest towards the beginning).
    #[default]
    Before,
    /// Newer messages (from the anchor, or the beginning, towards now).
    After,
    /// Messages surrounding the anchor; a single page.
    Around,
}

impl Direction {
    pub fn as_param(&self) -> &'static str {
        match self {
            Direction::Before => "Before",
            Direction::After => "After",
            Direction::Around => "Around",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

impl FromStr for Direction {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "before" => Ok(Direction::Before),
            "after" => Ok(Direction::After),
            "around" => Ok(Direction::Around),
            other => Err(HarvestError::Config(format!("unknown direction: {other}"))),
        }
    }
}

/// How the cursor for the next page is derived.
#[derive(Debug, Clone)]
pub enum PageStrategy {
    /// 1-based page numbers; the cursor is the next page number.
    PageNumber {
        page_param: &'static str,
        size_param: &'static str,
    },
    /// Anchor message id; the cursor is the id of the boundary message.
    MessageAnchor { direction: Direction },
}

/// What to paginate over.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub endpoint: &'static str,
    /// Fixed parameters sent with every page (path placeholders included).
    pub params: BTreeMap<String, String>,
    pub strategy: PageStrategy,
    pub page_size: usize,
    /// Resource-specific envelope keys, e.g. `members`.
    pub item_keys: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Value>,
    /// Cursor this page was requested with.
    pub cursor: Option<String>,
    /// Cursor for the following page, if the sequence continues.
    pub next_cursor: Option<String>,
    /// Fewer items than requested: the resource has no more data.
    pub end_of_data: bool,
    /// The caller-supplied item budget was reached with this page.
    pub budget_reached: bool,
    pub attempts: u32,
}

pub struct PagedFetcher<'a> {
    executor: &'a RetryExecutor,
    descriptor: &'a EndpointDescriptor,
    resource: ResourceDescriptor,
    cursor: Option<String>,
    budget: Option<usize>,
    yielded: usize,
    pages: usize,
    done: bool,
}

impl<'a> PagedFetcher<'a> {
    pub fn new(
        executor: &'a RetryExecutor,
        registry: &'a EndpointRegistry,
        resource: ResourceDescriptor,
    ) -> Result<Self> {
        let descriptor = registry.get(resource.endpoint)?;
        if resource.page_size == 0 {
            return Err(HarvestError::Config("page size must be at least 1".into()));
        }
        Ok(Self {
            executor,
            descriptor,
            resource,
            cursor: None,
            budget: None,
            yielded: 0,
            pages: 0,
            done: false,
        })
    }

    /// Resume from a previously persisted cursor.
    pub fn starting_at(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Stop once this many items have been yielded.
    pub fn with_budget(mut self, budget: Option<usize>) -> Self {
        self.budget = budget;
        self
    }

    /// Cursor of the next page to be requested.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    fn page_params(&self) -> BTreeMap<String, String> {
        let mut params = self.resource.params.clone();
        let size = self.resource.page_size.to_string();
        match &self.resource.strategy {
            PageStrategy::PageNumber {
                page_param,
                size_param,
            } => {
                let page = self.cursor.clone().unwrap_or_else(|| "1".to_string());
                params.insert(page_param.to_string(), page);
                params.insert(size_param.to_string(), size);
            }
            PageStrategy::MessageAnchor { direction } => {
                params.insert("direction".to_string(), direction.as_param().to_string());
                params.insert("limit".to_string(), size);
                if let Some(anchor) = &self.cursor {
                    params.insert("fromMessageId".to_string(), anchor.clone());
                }
            }
        }
        params
    }

    fn derive_next_cursor(&self, items: &[Value]) -> Option<String> {
        match &self.resource.strategy {
            PageStrategy::PageNumber { .. } => {
                let current: u64 = self
                    .cursor
                    .as_deref()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(1);
                Some((current + 1).to_string())
            }
            PageStrategy::MessageAnchor { direction } => {
                let boundary = match direction {
                    Direction::Before => items.last(),
                    Direction::After => items.first(),
                    Direction::Around => None,
                }?;
                first_str(boundary, &["id", "messageId"])
            }
        }
    }

    /// Fetch the next page, or `None` once the sequence has ended.
    ///
    /// On error the cursor is left untouched, so calling again retries the
    /// same page.
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.done {
            return Ok(None);
        }
        if let Some(budget) = self.budget {
            if self.yielded >= budget {
                self.done = true;
                return Ok(None);
            }
        }

        let request = self.descriptor.render(&self.page_params())?;
        let response = self.executor.execute(&request).await?;
        let mut items = extract_items(self.resource.endpoint, &response.body, self.resource.item_keys)?;
        self.pages += 1;

        let requested = self.resource.page_size;
        let mut end_of_data = items.len() < requested;
        let mut next_cursor = if end_of_data {
            None
        } else {
            self.derive_next_cursor(&items)
        };
        if next_cursor.is_none() || next_cursor == self.cursor {
            // Anchor did not advance or cannot be derived.
            end_of_data = true;
            next_cursor = None;
        }

        let mut budget_reached = false;
        if let Some(budget) = self.budget {
            let remaining = budget.saturating_sub(self.yielded);
            if items.len() >= remaining {
                items.truncate(remaining);
                budget_reached = true;
            }
        }

        debug!(
            endpoint = self.resource.endpoint,
            page = self.pages,
            items = items.len(),
            end_of_data,
            budget_reached,
            "fetched page"
        );

        self.yielded += items.len();
        let page = Page {
            items,
            cursor: self.cursor.clone(),
            next_cursor: next_cursor.clone(),
            end_of_data,
            budget_reached,
            attempts: response.attempts,
        };

        self.cursor = next_cursor;
        if end_of_data || budget_reached {
            self.done = true;
        }
        Ok(Some(page))
    }

    /// Drain the sequence into one list.
    pub async fn collect_all(mut self) -> Result<Vec<Value>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page.items);
        }
        Ok(all)
    }
}
