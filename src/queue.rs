//! Pending send requests, in insertion order.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One pending unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub to: String,
    pub subject: String,
    pub html: String,
    /// Key into the recipient status store; `None` for untracked sends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    /// Accepted for callers that set it. Draining order is strictly FIFO.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Deliveries attempted so far; only grows when requeueing is enabled.
    #[serde(default)]
    pub attempts: u32,
}

impl SendRequest {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
            recipient_id: None,
            priority: None,
            attempts: 0,
        }
    }

    /// Track this send in the recipient status store.
    pub fn recipient_id(mut self, id: impl Into<String>) -> Self {
        self.recipient_id = Some(id.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// FIFO store of pending requests.
#[derive(Debug, Default)]
pub struct QueueStore {
    items: VecDeque<SendRequest>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail and return the new length.
    pub fn push(&mut self, request: SendRequest) -> usize {
        self.items.push_back(request);
        self.items.len()
    }

    /// Remove up to `max` items from the head.
    pub fn take_batch(&mut self, max: usize) -> Vec<SendRequest> {
        let n = max.min(self.items.len());
        self.items.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot of pending items, head first.
    pub fn pending(&self) -> Vec<SendRequest> {
        self.items.iter().cloned().collect()
    }
}
