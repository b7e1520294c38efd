//! Messenger trait abstractions
//!
//! The transport seam. The bot only talks to `Messenger`, so tests drive it
//! with `MockMessenger` and the binary with `StdioMessenger`.

use crate::engine::model::{Affordance, ProfileHints, UserId};
use async_trait::async_trait;
use futures::future::join_all;

/// Raw inbound payload, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPayload {
    Text(String),
    Contact {
        owner_id: Option<UserId>,
        phone: String,
        first_name: Option<String>,
        last_name: Option<String>,
    },
    Button(String),
}

/// One inbound transport event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub sender: UserId,
    pub profile: ProfileHints,
    pub payload: RawPayload,
}

impl Update {
    pub fn text(sender: &UserId, text: impl Into<String>) -> Self {
        Self {
            sender: sender.clone(),
            profile: ProfileHints::default(),
            payload: RawPayload::Text(text.into()),
        }
    }

    pub fn button(sender: &UserId, token: impl Into<String>) -> Self {
        Self {
            sender: sender.clone(),
            profile: ProfileHints::default(),
            payload: RawPayload::Button(token.into()),
        }
    }

    pub fn with_profile(mut self, profile: ProfileHints) -> Self {
        self.profile = profile;
        self
    }
}

/// Result type for messenger operations
pub type MessengerResult<T> = Result<T, MessengerError>;

/// Messenger errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessengerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Delivery to {0} failed")]
    Delivery(UserId),

    #[error("Transport closed")]
    Closed,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Chat transport
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send text with optional buttons to one user
    async fn send(
        &self,
        recipient: &UserId,
        text: &str,
        affordances: &[Affordance],
    ) -> MessengerResult<()>;

    /// Send the same text to several users.
    ///
    /// Every recipient is attempted concurrently; the first failure in
    /// recipient order is returned.
    async fn notify_many(&self, recipients: &[UserId], text: &str) -> MessengerResult<()> {
        let sends = recipients.iter().map(|r| self.send(r, text, &[]));
        join_all(sends).await.into_iter().collect()
    }

    /// Next inbound update; `None` once the transport is closed
    async fn receive(&self) -> MessengerResult<Option<Update>>;
}
