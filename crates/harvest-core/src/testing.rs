//! In-memory transports for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::registry::{ApiRequest, CHAT_MESSAGES, ORGANIZATION_MEMBERS, USER_CHANNELS};
use crate::transport::{CallError, Transport};

type Scripted = (Option<Duration>, Result<Value, CallError>);

/// Replays a fixed queue of outcomes, one per call.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ApiRequest>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, body: Value) {
        self.script.lock().unwrap().push_back((None, Ok(body)));
    }

    pub fn push_err(&self, err: CallError) {
        self.script.lock().unwrap().push_back((None, Err(err)));
    }

    pub fn push_delayed(&self, delay: Duration, outcome: Result<Value, CallError>) {
        self.script.lock().unwrap().push_back((Some(delay), outcome));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<Value, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some((Some(delay), outcome)) => {
                tokio::time::sleep(delay).await;
                outcome
            }
            Some((None, outcome)) => outcome,
            None => Err(CallError::Other("script exhausted".into())),
        }
    }
}

/// A simulated organisation: members, their channels and chat histories.
#[derive(Default)]
pub struct FakeOrg {
    members: Vec<Value>,
    channels: HashMap<String, Vec<Value>>,
    /// Per chat, oldest first.
    messages: HashMap<String, Vec<Value>>,
    failing_members: HashMap<String, CallError>,
    /// Chat id → (successful pages served before failing, error).
    failing_chats: HashMap<String, (usize, CallError)>,
    /// Interrupt after this many channel listings have been served.
    channel_call_limit: Mutex<Option<usize>>,
    served_pages: Mutex<HashMap<String, usize>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeOrg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member whose channel listing returns the given chat ids.
    pub fn member(mut self, id: &str, chats: &[&str]) -> Self {
        self.members.push(json!({
            "chatUserId": id,
            "status": "active",
            "chatMemberProfile": {"firstName": "User", "lastName": id.to_uppercase()},
        }));
        let channels = chats
            .iter()
            .map(|c| json!({"chatId": c, "name": format!("chat {c} via {id}")}))
            .collect();
        self.channels.insert(id.to_string(), channels);
        self
    }

    pub fn members(mut self, count: usize, chats_per_member: usize) -> Self {
        for i in 1..=count {
            let id = format!("m{i:02}");
            let chats: Vec<String> = (0..chats_per_member)
                .map(|j| format!("c{}", (i + j) % (count + 1)))
                .collect();
            let refs: Vec<&str> = chats.iter().map(|s| s.as_str()).collect();
            self = self.member(&id, &refs);
        }
        self
    }

    /// Chat with `count` messages, ids `<chat>-0001..`, one second apart.
    pub fn chat(mut self, chat_id: &str, count: usize) -> Self {
        let messages = (1..=count)
            .map(|i| {
                json!({
                    "id": format!("{chat_id}-{i:04}"),
                    "authorId": format!("m{:02}", (i % 3) + 1),
                    "createdAtMs": 1_700_000_000_000i64 + (i as i64) * 1000,
                    "text": format!("message {i}"),
                })
            })
            .collect();
        self.messages.insert(chat_id.to_string(), messages);
        self
    }

    pub fn failing_member(mut self, id: &str, err: CallError) -> Self {
        self.failing_members.insert(id.to_string(), err);
        self
    }

    pub fn failing_chat_after(mut self, chat_id: &str, pages: usize, err: CallError) -> Self {
        self.failing_chats.insert(chat_id.to_string(), (pages, err));
        self
    }

    /// Make every channel listing after the first `n` fail with a
    /// non-transient error that aborts a run.
    pub fn interrupt_after_channel_calls(&self, n: Option<usize>) {
        *self.channel_call_limit.lock().unwrap() = n;
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    fn bump(&self, endpoint: &str) -> usize {
        let mut calls = self.calls.lock().unwrap();
        let n = calls.entry(endpoint.to_string()).or_default();
        *n += 1;
        *n
    }

    fn serve_members(&self, request: &ApiRequest) -> Result<Value, CallError> {
        let page: usize = request.query_value("page").and_then(|p| p.parse().ok()).unwrap_or(1);
        let per_page: usize = request
            .query_value("perPage")
            .and_then(|p| p.parse().ok())
            .unwrap_or(100);
        let items: Vec<Value> = self
            .members
            .iter()
            .skip((page.max(1) - 1) * per_page)
            .take(per_page)
            .cloned()
            .collect();
        Ok(json!({"data": {"items": items}}))
    }

    fn serve_channels(&self, request: &ApiRequest, call_no: usize) -> Result<Value, CallError> {
        if let Some(limit) = *self.channel_call_limit.lock().unwrap() {
            if call_no > limit {
                return Err(CallError::status(401));
            }
        }
        let user_id = request
            .path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if let Some(err) = self.failing_members.get(&user_id) {
            return Err(err.clone());
        }
        let channels = self.channels.get(&user_id).cloned().unwrap_or_default();
        Ok(json!({"data": channels}))
    }

    fn serve_messages(&self, request: &ApiRequest) -> Result<Value, CallError> {
        let chat_id = request
            .path
            .trim_start_matches("/chats/channel/")
            .trim_end_matches("/messages")
            .to_string();

        let served = {
            let mut pages = self.served_pages.lock().unwrap();
            let n = pages.entry(chat_id.clone()).or_default();
            *n += 1;
            *n
        };
        if let Some((ok_pages, err)) = self.failing_chats.get(&chat_id) {
            if served > *ok_pages {
                return Err(err.clone());
            }
        }

        let all = self
            .messages
            .get(&chat_id)
            .ok_or_else(|| CallError::status(404))?;
        let limit: usize = request.query_value("limit").and_then(|l| l.parse().ok()).unwrap_or(100);
        let direction = request.query_value("direction").unwrap_or("Before");
        let anchor = request
            .query_value("fromMessageId")
            .and_then(|id| all.iter().position(|m| m["id"] == id));

        // Pages are always newest first, like the real API.
        let page: Vec<Value> = match (direction, anchor) {
            ("After", Some(pos)) => all[pos + 1..].iter().take(limit).rev().cloned().collect(),
            ("After", None) => all.iter().take(limit).rev().cloned().collect(),
            (_, Some(pos)) => all[..pos].iter().rev().take(limit).cloned().collect(),
            (_, None) => all.iter().rev().take(limit).cloned().collect(),
        };
        Ok(json!({"data": {"items": page}}))
    }
}

#[async_trait]
impl Transport for FakeOrg {
    async fn send(&self, request: &ApiRequest) -> Result<Value, CallError> {
        let call_no = self.bump(&request.endpoint);
        match request.endpoint.as_str() {
            ORGANIZATION_MEMBERS => self.serve_members(request),
            USER_CHANNELS => self.serve_channels(request, call_no),
            CHAT_MESSAGES => self.serve_messages(request),
            _ => Err(CallError::status(404)),
        }
    }
}

/// Distinct chat ids across every member's channel listing.
pub fn distinct_chats(org: &FakeOrg) -> HashSet<String> {
    org.channels
        .values()
        .flatten()
        .filter_map(|c| c["chatId"].as_str().map(str::to_string))
        .collect()
}
