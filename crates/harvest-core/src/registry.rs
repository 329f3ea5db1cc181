//! Static registry of remote endpoints.
//!
//! The registry is built once by the composition root and passed by
//! reference. Each [`EndpointDescriptor`] knows its path template and which
//! parameters it accepts; [`EndpointDescriptor::render`] turns a parameter
//! set into a concrete [`ApiRequest`].

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{HarvestError, Result};

pub const ORGANIZATION_MEMBERS: &str = "organization_members";
pub const USER_CHANNELS: &str = "user_channels";
pub const CHAT_MESSAGES: &str = "chat_messages";
pub const CHATS_TEAMS: &str = "chats_teams";

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
        }
    }
}

/// A registered endpoint.
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    pub name: &'static str,
    pub path_template: &'static str,
    pub method: Method,
    /// Parameters that must be supplied. Includes every path placeholder.
    pub required: Vec<&'static str>,
    /// Query parameters that may be supplied.
    pub optional: Vec<&'static str>,
    pub description: &'static str,
}

impl EndpointDescriptor {
    pub fn get(name: &'static str, path_template: &'static str, description: &'static str) -> Self {
        let required = PLACEHOLDER_RE
            .captures_iter(path_template)
            .filter_map(|c| c.get(1))
            .map(|m| &path_template[m.start()..m.end()])
            .collect();
        Self {
            name,
            path_template,
            method: Method::Get,
            required,
            optional: Vec::new(),
            description,
        }
    }

    pub fn with_optional(mut self, params: &[&'static str]) -> Self {
        self.optional.extend_from_slice(params);
        self
    }

    pub fn is_parameterized(&self) -> bool {
        !self.required.is_empty()
    }

    fn accepts(&self, param: &str) -> bool {
        self.required.contains(&param) || self.optional.contains(&param)
    }

    /// Substitute path placeholders and collect the remaining parameters
    /// into the query string.
    pub fn render(&self, params: &BTreeMap<String, String>) -> Result<ApiRequest> {
        for param in params.keys() {
            if !self.accepts(param) {
                return Err(HarvestError::UnexpectedParameter {
                    endpoint: self.name.to_string(),
                    param: param.clone(),
                });
            }
        }
        if let Some(missing) = self.required.iter().find(|p| !params.contains_key(**p)) {
            return Err(HarvestError::MissingParameter {
                endpoint: self.name.to_string(),
                param: missing.to_string(),
            });
        }

        let path = PLACEHOLDER_RE
            .replace_all(self.path_template, |caps: &regex::Captures| {
                let key = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                params.get(key).cloned().unwrap_or_default()
            })
            .into_owned();

        let placeholders: Vec<&str> = PLACEHOLDER_RE
            .captures_iter(self.path_template)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        let query = params
            .iter()
            .filter(|(k, _)| !placeholders.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(ApiRequest {
            endpoint: self.name.to_string(),
            method: self.method,
            path,
            query,
        })
    }
}

/// A fully rendered request, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub endpoint: String,
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Name → descriptor lookup.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<&'static str, EndpointDescriptor>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoints used by the collection pipeline plus the team listing.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            EndpointDescriptor::get(
                ORGANIZATION_MEMBERS,
                "/chats/organization/members",
                "All organization members using chats",
            )
            .with_optional(&["page", "perPage"]),
        );
        registry.register(EndpointDescriptor::get(
            USER_CHANNELS,
            "/chats/channels/{userId}",
            "Channels a member participates in",
        ));
        registry.register(
            EndpointDescriptor::get(
                CHAT_MESSAGES,
                "/chats/channel/{chatId}/messages",
                "Message history of one chat",
            )
            .with_optional(&["viewerId", "fromMessageId", "parrentMessageId", "direction", "limit"]),
        );
        registry.register(EndpointDescriptor::get(
            CHATS_TEAMS,
            "/chats/teams",
            "All teams (group chats)",
        ));
        registry
    }

    pub fn register(&mut self, descriptor: EndpointDescriptor) {
        self.endpoints.insert(descriptor.name, descriptor);
    }

    pub fn get(&self, name: &str) -> Result<&EndpointDescriptor> {
        self.endpoints
            .get(name)
            .ok_or_else(|| HarvestError::UnknownEndpoint(name.to_string()))
    }

    /// Descriptors sorted by name.
    pub fn list(&self) -> Vec<&EndpointDescriptor> {
        let mut all: Vec<_> = self.endpoints.values().collect();
        all.sort_by_key(|d| d.name);
        all
    }
}

/// Build a parameter map from string pairs.
pub fn params<K, V, I>(pairs: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
