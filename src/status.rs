//! Boundary to the external recipient status store.
//!
//! The delivery executor reports per-recipient outcomes here on a
//! best-effort basis; a failing store never affects delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::MailError;

/// Final delivery state of one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    Sent,
    Failed,
}

/// Fields written to the status store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: RecipientStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StatusUpdate {
    pub fn sent(message_id: impl Into<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            status: RecipientStatus::Sent,
            message_id: Some(message_id.into()),
            sent_at: Some(sent_at),
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: RecipientStatus::Failed,
            message_id: None,
            sent_at: None,
            error_message: Some(error_message.into()),
        }
    }
}

/// Persistence for per-recipient delivery outcomes.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn update(&self, recipient_id: &str, update: StatusUpdate) -> Result<(), MailError>;
}

/// Store that drops updates after logging them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStatusStore;

#[async_trait]
impl StatusStore for NoopStatusStore {
    async fn update(&self, recipient_id: &str, update: StatusUpdate) -> Result<(), MailError> {
        tracing::debug!(recipient_id, status = ?update.status, "Status update discarded");
        Ok(())
    }
}

/// In-memory store that records every update in arrival order.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    updates: RwLock<Vec<(String, StatusUpdate)>>,
    fail_with: RwLock<Option<String>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in an Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every following update fail (the update is not recorded).
    pub fn set_failure(&self, message: impl Into<String>) {
        *self.fail_with.write() = Some(message.into());
    }

    pub fn clear_failure(&self) {
        *self.fail_with.write() = None;
    }

    /// All recorded updates, oldest first.
    pub fn all(&self) -> Vec<(String, StatusUpdate)> {
        self.updates.read().clone()
    }

    /// Updates recorded for one recipient, oldest first.
    pub fn updates_for(&self, recipient_id: &str) -> Vec<StatusUpdate> {
        self.updates
            .read()
            .iter()
            .filter(|(id, _)| id == recipient_id)
            .map(|(_, update)| update.clone())
            .collect()
    }

    /// Latest update for one recipient.
    pub fn latest(&self, recipient_id: &str) -> Option<StatusUpdate> {
        self.updates_for(recipient_id).pop()
    }

    pub fn count(&self) -> usize {
        self.updates.read().len()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn update(&self, recipient_id: &str, update: StatusUpdate) -> Result<(), MailError> {
        if let Some(ref message) = *self.fail_with.read() {
            return Err(MailError::Status(message.clone()));
        }
        self.updates.write().push((recipient_id.to_string(), update));
        Ok(())
    }
}
