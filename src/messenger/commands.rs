//! Inbound event classification
//!
//! Turns raw transport payloads into `InboundEvent`s. Menu button labels are
//! mapped back to the commands they stand for; deal-type labels are not,
//! the deal-type step only accepts canonical values.

use super::templates::{
    LABEL_ACTIVE_DEALS, LABEL_BACK, LABEL_CREATE_DEAL, LABEL_HELP, LABEL_PROFILE,
};
use super::traits::RawPayload;
use crate::engine::conversation::InboundEvent;
use crate::engine::users::SharedContact;

/// Classify a raw payload
pub fn classify(payload: RawPayload) -> InboundEvent {
    match payload {
        RawPayload::Contact {
            owner_id,
            phone,
            first_name,
            last_name,
        } => InboundEvent::ContactShared(SharedContact {
            owner_id,
            phone,
            first_name,
            last_name,
        }),
        // Buttons may carry a slash command (main menu, deal list)
        RawPayload::Button(token) => {
            parse_command(&token).unwrap_or(InboundEvent::ButtonPressed(token))
        }
        RawPayload::Text(text) => classify_text(text),
    }
}

fn classify_text(text: String) -> InboundEvent {
    let trimmed = text.trim();

    if let Some(name) = menu_label_command(trimmed) {
        return InboundEvent::CommandInvoked {
            name: name.to_string(),
            args: Vec::new(),
        };
    }

    parse_command(trimmed).unwrap_or(InboundEvent::TextInput(text))
}

fn menu_label_command(label: &str) -> Option<&'static str> {
    match label {
        LABEL_CREATE_DEAL => Some("newdeal"),
        LABEL_ACTIVE_DEALS => Some("deals"),
        LABEL_PROFILE => Some("profile"),
        LABEL_HELP => Some("help"),
        LABEL_BACK => Some("menu"),
        _ => None,
    }
}

/// Parse `/name arg…` into a command event.
///
/// Names are lowercased and a `@botname` suffix is dropped
/// (`/start@DealVaultBot`). A bare `/` is not a command.
pub fn parse_command(text: &str) -> Option<InboundEvent> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;

    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    if name.is_empty() {
        return None;
    }

    Some(InboundEvent::CommandInvoked {
        name,
        args: parts.map(str::to_string).collect(),
    })
}
