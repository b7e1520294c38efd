//! Pairing Router
//!
//! Counterpart discovery, selection, invitation fan-out and chat relay.
//! A relay only ever goes to the sender's current chat partner, never to
//! anyone else.

use super::conversation::{selection_of, DialogState, SearchMode, SelectedCounterpart};
use super::deals::DealStore;
use super::error::{DealError, DealResult};
use super::lifecycle::{DealLifecycleManager, DealTerms};
use super::model::{ActiveChat, DealId, DealStatus, Notice, NoticeKind, User, UserId};
use super::users::{normalize_phone, UserRegistry};
use crate::messenger::templates;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Look up a registered counterpart other than `requester`
pub fn find_counterpart<'u>(
    users: &'u UserRegistry,
    requester: &UserId,
    query: &str,
    mode: SearchMode,
) -> Option<&'u User> {
    match mode {
        SearchMode::Username => users.find_by_username(query, requester),
        SearchMode::Phone | SearchMode::Contact => users.find_by_phone(query, requester),
    }
}

/// Digits-only input (after phone normalization) is a phone search
fn detect_mode(query: &str) -> SearchMode {
    let normalized = normalize_phone(query);
    if !normalized.is_empty() && normalized.chars().all(|c| c.is_ascii_digit()) {
        SearchMode::Phone
    } else {
        SearchMode::Username
    }
}

pub struct PairingRouter<'a> {
    users: &'a mut UserRegistry,
    deals: &'a mut DealStore,
    now: DateTime<Utc>,
    outbox: &'a mut Vec<Notice>,
}

impl<'a> PairingRouter<'a> {
    pub fn new(
        users: &'a mut UserRegistry,
        deals: &'a mut DealStore,
        now: DateTime<Utc>,
        outbox: &'a mut Vec<Notice>,
    ) -> Self {
        Self {
            users,
            deals,
            now,
            outbox,
        }
    }

    /// Resolve a free-form query to a registered user, by phone or username
    pub fn select_counterpart(&self, requester: &UserId, query: &str) -> Option<UserId> {
        find_counterpart(self.users, requester, query, detect_mode(query)).map(|u| u.id.clone())
    }

    /// Add or remove `candidate` from the requester's draft selection
    pub fn toggle_selection(
        &mut self,
        requester: &UserId,
        candidate: &UserId,
    ) -> DealResult<Vec<SelectedCounterpart>> {
        let selectable = candidate != requester
            && self
                .users
                .get(candidate)
                .is_some_and(|u| u.is_registered);

        let user = self
            .users
            .get_mut(requester)
            .ok_or(DealError::UserNotFound)?;
        let draft = user
            .active_conversation
            .as_mut()
            .ok_or(DealError::NoActiveDraft)?;

        if !draft.selected_counterparts.remove(candidate) {
            if !selectable {
                return Err(DealError::UserNotFound);
            }
            draft.selected_counterparts.insert(candidate.clone());
        }
        Ok(selection_of(self.users, requester))
    }

    /// Turn the requester's draft into one pending deal per selected
    /// counterpart and send each an invitation.
    ///
    /// The draft is discarded afterwards; the initiator waits in chat mode
    /// until someone accepts.
    pub fn finalize_invitations(&mut self, requester: &UserId) -> DealResult<Vec<DealId>> {
        let user = self.users.get(requester).ok_or(DealError::UserNotFound)?;
        if !user.is_registered {
            return Err(DealError::NotRegistered);
        }
        let draft = user
            .active_conversation
            .clone()
            .ok_or(DealError::NoActiveDraft)?;
        if draft.selected_counterparts.is_empty() {
            return Err(DealError::NoCounterpartsSelected);
        }
        let terms = match (
            draft.deal_type,
            draft.amount,
            draft.terms,
            draft.duration_days,
        ) {
            (Some(deal_type), Some(amount), Some(terms), Some(duration_days)) => DealTerms {
                deal_type,
                amount,
                terms,
                duration_days,
            },
            _ => return Err(DealError::NoActiveDraft),
        };

        let initiator_name = user.display_name();
        let mut created = Vec::new();
        let mut names = Vec::new();

        for counterpart in &draft.selected_counterparts {
            let deal_id = DealLifecycleManager::new(
                &mut *self.users,
                &mut *self.deals,
                self.now,
                &mut *self.outbox,
            )
            .create(requester, counterpart, terms.clone())?;

            if let Some(deal) = self.deals.get(&deal_id) {
                self.outbox.push(Notice {
                    recipient: counterpart.clone(),
                    text: templates::msg_invitation(&initiator_name, deal),
                    affordances: templates::invitation_affordances(&deal_id),
                    kind: NoticeKind::Invitation,
                });
            }
            names.push(
                self.users
                    .get(counterpart)
                    .map(|u| u.display_name())
                    .unwrap_or_else(|| counterpart.to_string()),
            );
            created.push(deal_id);
        }

        if let Some(user) = self.users.get_mut(requester) {
            user.active_conversation = None;
            user.state = DialogState::ActiveChat;
        }
        self.outbox.push(
            Notice::reply(requester, templates::msg_invitations_sent(&names))
                .with_affordances(templates::main_menu_affordances()),
        );

        info!(initiator = %requester, deals = created.len(), "invitations sent");
        Ok(created)
    }

    /// Point the user's chat at another active deal they belong to
    pub fn focus(&mut self, user_id: &UserId, deal_id: &DealId) -> DealResult<()> {
        let deal = self
            .deals
            .get(deal_id)
            .ok_or_else(|| DealError::DealNotFound(deal_id.clone()))?;
        if deal.status.is_terminal() {
            return Err(DealError::DealNotMutable {
                id: deal_id.clone(),
                status: deal.status,
            });
        }
        if !deal.is_member(user_id) {
            return Err(DealError::NotAMember);
        }
        let partner = match (deal.status, deal.partner_of(user_id)) {
            (DealStatus::Active, Some(partner)) => partner.clone(),
            _ => {
                return Err(DealError::InvalidTransition {
                    id: deal_id.clone(),
                    status: deal.status,
                    event: "chat",
                });
            }
        };
        let role = deal.role_of(user_id);
        let partner_name = self
            .users
            .get(&partner)
            .map(|u| u.display_name())
            .unwrap_or_else(|| partner.to_string());
        let text = templates::msg_chat_focused(deal, &partner_name);

        let user = self.users.get_mut(user_id).ok_or(DealError::UserNotFound)?;
        user.active_chat = Some(ActiveChat {
            deal_id: deal_id.clone(),
            counterpart_id: partner,
        });
        user.role = Some(role);
        if user.active_conversation.take().is_some() {
            debug!(user = %user_id, "draft dropped on chat switch");
        }
        user.state = DialogState::ActiveChat;

        let notice = Notice::reply(user_id, text).with_affordances(templates::chat_affordances());
        self.outbox.push(notice);
        Ok(())
    }

    /// Build the relay notice for `text` from `sender` to their chat partner
    pub fn relay(&self, sender: &UserId, text: &str) -> DealResult<Notice> {
        let user = self.users.get(sender).ok_or(DealError::UserNotFound)?;
        let chat = user.active_chat.as_ref().ok_or(DealError::NotInChat)?;

        let deal = self
            .deals
            .get(&chat.deal_id)
            .filter(|d| d.status == DealStatus::Active && d.is_member(sender))
            .ok_or(DealError::NotInChat)?;

        let partner = &chat.counterpart_id;
        let partner_focus = self
            .users
            .get(partner)
            .and_then(|u| u.active_chat.as_ref())
            .map(|c| &c.deal_id);
        let other_deal = match partner_focus {
            Some(focused) if focused == &deal.id => None,
            _ => Some(&deal.id),
        };

        debug!(deal = %deal.id, from = %sender, to = %partner, "relaying message");
        Ok(Notice {
            recipient: partner.clone(),
            text: templates::msg_relay(
                &user.display_name(),
                deal.role_of(sender),
                text,
                other_deal,
            ),
            affordances: Vec::new(),
            kind: NoticeKind::Relay {
                from: sender.clone(),
            },
        })
    }
}
