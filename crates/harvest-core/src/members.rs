//! Organization member listing and per-member channel discovery.

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use crate::error::Result;
use crate::model::{extract_items, parse_items, Channel, Member};
use crate::paging::{PageStrategy, PagedFetcher, ResourceDescriptor};
use crate::registry::{params, EndpointRegistry, ORGANIZATION_MEMBERS, USER_CHANNELS};
use crate::retry::RetryExecutor;

pub struct MemberEnumerator<'a> {
    executor: &'a RetryExecutor,
    registry: &'a EndpointRegistry,
    page_size: usize,
}

impl<'a> MemberEnumerator<'a> {
    pub fn new(executor: &'a RetryExecutor, registry: &'a EndpointRegistry, page_size: usize) -> Self {
        Self {
            executor,
            registry,
            page_size,
        }
    }

    /// Lazy member sequence in the listing's own order.
    pub fn enumerate_members(&self) -> Result<MemberSequence<'a>> {
        let resource = ResourceDescriptor {
            endpoint: ORGANIZATION_MEMBERS,
            params: BTreeMap::new(),
            strategy: PageStrategy::PageNumber {
                page_param: "page",
                size_param: "perPage",
            },
            page_size: self.page_size,
            item_keys: &["members"],
        };
        Ok(MemberSequence {
            fetcher: PagedFetcher::new(self.executor, self.registry, resource)?,
            buffered: VecDeque::new(),
        })
    }
}

pub struct MemberSequence<'a> {
    fetcher: PagedFetcher<'a>,
    buffered: VecDeque<Member>,
}

impl MemberSequence<'_> {
    pub async fn next(&mut self) -> Result<Option<Member>> {
        loop {
            if let Some(member) = self.buffered.pop_front() {
                return Ok(Some(member));
            }
            match self.fetcher.next_page().await? {
                Some(page) => self
                    .buffered
                    .extend(parse_items(ORGANIZATION_MEMBERS, &page.items, Member::from_value)),
                None => return Ok(None),
            }
        }
    }

    pub async fn collect_all(mut self) -> Result<Vec<Member>> {
        let mut members = Vec::new();
        while let Some(member) = self.next().await? {
            members.push(member);
        }
        Ok(members)
    }
}

pub struct ChannelDiscovery<'a> {
    executor: &'a RetryExecutor,
    registry: &'a EndpointRegistry,
}

impl<'a> ChannelDiscovery<'a> {
    pub fn new(executor: &'a RetryExecutor, registry: &'a EndpointRegistry) -> Self {
        Self { executor, registry }
    }

    /// List the channels one member participates in.
    pub async fn discover_channels(&self, member: &Member) -> Result<Vec<Channel>> {
        let request = self
            .registry
            .get(USER_CHANNELS)?
            .render(&params([("userId", member.id.as_str())]))?;
        let response = self.executor.execute(&request).await?;
        let items = extract_items(USER_CHANNELS, &response.body, &["channels"])?;
        let channels = parse_items(USER_CHANNELS, &items, |v| Channel::from_value(v, &member.id));
        debug!(member_id = %member.id, channels = channels.len(), attempts = response.attempts, "discovered channels");
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::HarvestError;
    use crate::retry::RetryPolicy;
    use crate::testing::{FakeOrg, ScriptedTransport};
    use crate::transport::CallError;
    use serde_json::json;

    #[tokio::test]
    async fn test_enumerates_all_members_in_order() {
        let org = Arc::new(FakeOrg::new().members(23, 1));
        let executor = RetryExecutor::new(org.clone(), RetryPolicy::default());
        let registry = EndpointRegistry::builtin();

        let members = MemberEnumerator::new(&executor, &registry, 10)
            .enumerate_members()
            .unwrap()
            .collect_all()
            .await
            .unwrap();
        let ids: Vec<_> = members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), 23);
        assert_eq!(ids[0], "m01");
        assert_eq!(ids[22], "m23");
        assert_eq!(members[0].display_name, "User M01");
    }

    #[tokio::test]
    async fn test_sequence_is_lazy() {
        let org = Arc::new(FakeOrg::new().members(30, 1));
        let executor = RetryExecutor::new(org.clone(), RetryPolicy::default());
        let registry = EndpointRegistry::builtin();

        let mut seq = MemberEnumerator::new(&executor, &registry, 10)
            .enumerate_members()
            .unwrap();
        assert_eq!(org.calls(ORGANIZATION_MEMBERS), 0);
        for _ in 0..10 {
            seq.next().await.unwrap().unwrap();
        }
        assert_eq!(org.calls(ORGANIZATION_MEMBERS), 1);
        seq.next().await.unwrap().unwrap();
        assert_eq!(org.calls(ORGANIZATION_MEMBERS), 2);
    }

    #[tokio::test]
    async fn test_members_without_id_are_skipped() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(json!({"data": {"items": [
            {"chatUserId": "a"},
            {"status": "orphan"},
            {"userId": "b"}
        ]}}));
        let executor = RetryExecutor::new(transport, RetryPolicy::default());
        let registry = EndpointRegistry::builtin();

        let members = MemberEnumerator::new(&executor, &registry, 100)
            .enumerate_members()
            .unwrap()
            .collect_all()
            .await
            .unwrap();
        assert_eq!(members.len(), 2);
    }

    #[tokio::test]
    async fn test_discover_channels_tags_member() {
        let org = Arc::new(FakeOrg::new().member("u1", &["C1", "C2"]));
        let executor = RetryExecutor::new(org.clone(), RetryPolicy::default());
        let registry = EndpointRegistry::builtin();
        let member = Member {
            id: "u1".into(),
            display_name: "U".into(),
            status: String::new(),
        };

        let channels = ChannelDiscovery::new(&executor, &registry)
            .discover_channels(&member)
            .await
            .unwrap();
        assert_eq!(channels.len(), 2);
        assert!(channels.iter().all(|c| c.discovered_by_member_id == "u1"));
    }

    #[tokio::test]
    async fn test_discover_channels_propagates_rejection() {
        let org = Arc::new(FakeOrg::new().member("u1", &["C1"]).failing_member("u1", CallError::status(404)));
        let executor = RetryExecutor::new(org, RetryPolicy::default());
        let registry = EndpointRegistry::builtin();
        let member = Member {
            id: "u1".into(),
            display_name: "U".into(),
            status: String::new(),
        };

        let err = ChannelDiscovery::new(&executor, &registry)
            .discover_channels(&member)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Rejected { status: 404, .. }));
    }
}
