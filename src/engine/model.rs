//! Deal Engine Data Model
//!
//! Explicit records for users, drafts and deals. Every optional field is
//! declared and defaulted here so persisted records round-trip through
//! serde without ad-hoc keys.

use super::conversation::DialogState;
use super::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Platform user identifier (opaque, stable)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deal identifier (`deal_<YYYYMMDDHHMMSS>_<creatorId>[_<n>]`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(pub String);

impl DealId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of favor being negotiated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealType {
    Charity,
    Debt,
    Service,
    Venture,
}

impl DealType {
    pub const ALL: [DealType; 4] = [
        DealType::Charity,
        DealType::Debt,
        DealType::Service,
        DealType::Venture,
    ];

    /// Canonical value accepted as input and used in button tokens
    pub fn canonical(&self) -> &'static str {
        match self {
            DealType::Charity => "charity",
            DealType::Debt => "debt",
            DealType::Service => "service",
            DealType::Venture => "venture",
        }
    }

    /// Decorated label shown on keyboards (never parsed back)
    pub fn label(&self) -> &'static str {
        match self {
            DealType::Charity => "🤲 Charity",
            DealType::Debt => "💰 Debt",
            DealType::Service => "🔧 Service",
            DealType::Venture => "💡 Venture",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            DealType::Charity => "Charity",
            DealType::Debt => "Debt",
            DealType::Service => "Service",
            DealType::Venture => "Venture",
        }
    }
}

impl FromStr for DealType {
    type Err = ValidationError;

    /// Matches the canonical value, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        DealType::ALL
            .into_iter()
            .find(|t| t.canonical() == value)
            .ok_or(ValidationError::InvalidDealType)
    }
}

/// Deal lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl DealStatus {
    /// Terminal deals reject every further event
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DealStatus::Completed | DealStatus::Cancelled | DealStatus::Expired
        )
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DealStatus::Pending => "pending",
            DealStatus::Active => "active",
            DealStatus::Completed => "completed",
            DealStatus::Cancelled => "cancelled",
            DealStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Role a user plays in a deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Initiator,
    Counterparty,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("Initiator"),
            Role::Counterparty => f.write_str("Counterparty"),
        }
    }
}

/// Relay session pointer: present iff the user is chatting on an active deal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveChat {
    pub deal_id: DealId,
    pub counterpart_id: UserId,
}

/// Deal fields collected across conversation turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftDeal {
    pub deal_type: Option<DealType>,
    pub amount: Option<f64>,
    pub terms: Option<String>,
    pub duration_days: Option<u32>,
    pub selected_counterparts: BTreeSet<UserId>,
}

/// Profile fields carried by an inbound transport event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileHints {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Registered or prospective bot user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// Normalized (no `+`, no whitespace)
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_registered: bool,
    #[serde(default)]
    pub reputation: u32,
    #[serde(default)]
    pub completed_deals: u32,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub state: DialogState,
    #[serde(default)]
    pub active_conversation: Option<DraftDeal>,
    #[serde(default)]
    pub active_chat: Option<ActiveChat>,
}

impl User {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            username: None,
            first_name: None,
            last_name: None,
            phone: None,
            is_registered: false,
            reputation: 0,
            completed_deals: 0,
            role: None,
            state: DialogState::Idle,
            active_conversation: None,
            active_chat: None,
        }
    }

    /// Name shown to counterparts: first name, then @username, then raw id
    pub fn display_name(&self) -> String {
        if let Some(first) = self.first_name.as_deref().filter(|s| !s.is_empty()) {
            return first.to_string();
        }
        if let Some(username) = self.username.as_deref().filter(|s| !s.is_empty()) {
            return format!("@{}", username);
        }
        self.id.0.clone()
    }
}

/// Auxiliary, non-lifecycle deal fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealMetadata {
    pub currency: Option<String>,
    pub payment_method: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Partial metadata update; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub currency: Option<String>,
    pub payment_method: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Audit trail action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealAction {
    Created,
    Accepted,
    Declined,
    Completed,
    Cancelled,
    Expired,
    MetadataUpdated,
}

/// Append-only audit entry; `user_id` is `None` for system actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub action: DealAction,
    pub user_id: Option<UserId>,
}

/// A negotiated deal between an initiator and one counterparty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub creator_id: UserId,
    /// Always contains `creator_id`; counterparts join on accept
    pub members: Vec<UserId>,
    pub invited: Vec<UserId>,
    pub deal_type: DealType,
    pub amount: f64,
    pub terms: String,
    pub duration_days: u32,
    pub status: DealStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: DealMetadata,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Deal {
    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }

    pub fn is_invited(&self, user: &UserId) -> bool {
        self.invited.contains(user)
    }

    /// Role of `user` within this deal
    pub fn role_of(&self, user: &UserId) -> Role {
        if &self.creator_id == user {
            Role::Initiator
        } else {
            Role::Counterparty
        }
    }

    /// The other member of an accepted deal
    pub fn partner_of(&self, user: &UserId) -> Option<&UserId> {
        self.members.iter().find(|m| *m != user)
    }

    /// Everyone who should hear about this deal: members, then invitees
    pub fn participants(&self) -> Vec<UserId> {
        let mut all = self.members.clone();
        for user in &self.invited {
            if !all.contains(user) {
                all.push(user.clone());
            }
        }
        all
    }

    pub(crate) fn record(&mut self, action: DealAction, user: Option<&UserId>, now: DateTime<Utc>) {
        self.updated_at = now;
        self.history.push(HistoryEntry {
            timestamp: now,
            action,
            user_id: user.cloned(),
        });
    }
}

/// Button offered alongside a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affordance {
    pub label: String,
    pub token: String,
}

impl Affordance {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// Why a notice is being sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    /// Reply to the user who triggered the event
    Reply,
    /// Deal invitation to a counterpart
    Invitation,
    /// Lifecycle change pushed to deal participants
    Lifecycle,
    /// Free text relayed from a chat partner
    Relay { from: UserId },
}

/// Outbound message produced by the engine, delivered by the bot
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub recipient: UserId,
    pub text: String,
    pub affordances: Vec<Affordance>,
    pub kind: NoticeKind,
}

impl Notice {
    pub fn reply(recipient: &UserId, text: impl Into<String>) -> Self {
        Self {
            recipient: recipient.clone(),
            text: text.into(),
            affordances: Vec::new(),
            kind: NoticeKind::Reply,
        }
    }

    pub fn lifecycle(recipient: &UserId, text: impl Into<String>) -> Self {
        Self {
            recipient: recipient.clone(),
            text: text.into(),
            affordances: Vec::new(),
            kind: NoticeKind::Lifecycle,
        }
    }

    pub fn with_affordances(mut self, affordances: Vec<Affordance>) -> Self {
        self.affordances = affordances;
        self
    }
}
