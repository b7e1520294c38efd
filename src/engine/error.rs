//! Deal engine errors
//!
//! Every error is recoverable: the caller's state is left untouched and the
//! user gets a rejection message. There is no fatal category in the engine.

use super::model::{DealId, DealStatus};

/// Result type for engine operations
pub type DealResult<T> = Result<T, DealError>;

/// Bad user input. The user is re-prompted and nothing advances.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Amount must be a positive number")]
    InvalidAmount,

    #[error("Duration must be a positive whole number of days")]
    InvalidDuration,

    #[error("Unknown deal type")]
    InvalidDealType,

    #[error("Phone number must contain digits only")]
    InvalidPhoneFormat,

    #[error("Terms must not be empty")]
    EmptyTerms,
}

/// Engine errors surfaced to users as rejection messages
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DealError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Contact does not belong to the sender")]
    OwnershipMismatch,

    #[error("User is not registered")]
    NotRegistered,

    #[error("User not found")]
    UserNotFound,

    #[error("No deal draft in progress")]
    NoActiveDraft,

    #[error("No counterparts selected")]
    NoCounterpartsSelected,

    #[error("Deal not found: {0}")]
    DealNotFound(DealId),

    #[error("Deal {id} is {status} and can no longer change")]
    DealNotMutable { id: DealId, status: DealStatus },

    #[error("Deal {id} is {status}; cannot {event}")]
    InvalidTransition {
        id: DealId,
        status: DealStatus,
        event: &'static str,
    },

    #[error("User was not invited to this deal")]
    NotInvited,

    #[error("User is not a member of this deal")]
    NotAMember,

    #[error("User is not in an active chat")]
    NotInChat,
}
