//! Deal Lifecycle Manager
//!
//! The only component allowed to change a deal's status.
//!
//! ```text
//! pending --accept--> active --complete--> completed
//!    |                  |----cancel----> cancelled
//!    |--decline-------> cancelled
//!    |--expire--------> expired <--expire-- active
//! ```
//!
//! Terminal deals reject every event with `DealNotMutable`. Each transition
//! appends one history entry and queues notices; nothing here does I/O.

use super::conversation::DialogState;
use super::deals::DealStore;
use super::error::{DealError, DealResult, ValidationError};
use super::model::{
    ActiveChat, Deal, DealAction, DealId, DealMetadata, DealStatus, DealType, MetadataUpdate,
    Notice, Role, UserId,
};
use super::users::UserRegistry;
use crate::messenger::templates;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

/// Fields a deal is created from
#[derive(Debug, Clone, PartialEq)]
pub struct DealTerms {
    pub deal_type: DealType,
    pub amount: f64,
    pub terms: String,
    pub duration_days: u32,
}

impl DealTerms {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ValidationError::InvalidAmount);
        }
        if self.terms.trim().is_empty() {
            return Err(ValidationError::EmptyTerms);
        }
        if self.duration_days == 0 {
            return Err(ValidationError::InvalidDuration);
        }
        Ok(())
    }
}

pub struct DealLifecycleManager<'a> {
    users: &'a mut UserRegistry,
    deals: &'a mut DealStore,
    now: DateTime<Utc>,
    outbox: &'a mut Vec<Notice>,
}

impl<'a> DealLifecycleManager<'a> {
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

    /// Create a pending deal from `creator` to a single invited counterpart
    pub fn create(
        &mut self,
        creator: &UserId,
        counterpart: &UserId,
        terms: DealTerms,
    ) -> DealResult<DealId> {
        terms.validate()?;
        match self.users.get(creator) {
            Some(user) if user.is_registered => {}
            Some(_) => return Err(DealError::NotRegistered),
            None => return Err(DealError::UserNotFound),
        }

        let id = self.deals.next_id(creator, self.now);
        let mut deal = Deal {
            id: id.clone(),
            creator_id: creator.clone(),
            members: vec![creator.clone()],
            invited: vec![counterpart.clone()],
            deal_type: terms.deal_type,
            amount: terms.amount,
            terms: terms.terms,
            duration_days: terms.duration_days,
            status: DealStatus::Pending,
            created_at: self.now,
            updated_at: self.now,
            completion_date: None,
            metadata: DealMetadata::default(),
            history: Vec::new(),
        };
        deal.record(DealAction::Created, Some(creator), self.now);
        self.deals.insert(deal);

        info!(deal = %id, creator = %creator, counterpart = %counterpart, "deal created");
        Ok(id)
    }

    /// pending -> active; the invitee joins and both sides enter the chat
    pub fn accept(&mut self, deal_id: &DealId, user: &UserId) -> DealResult<()> {
        let now = self.now;
        let deal = self.mutable_deal(deal_id)?;
        if deal.status != DealStatus::Pending {
            return Err(invalid(deal, "accept"));
        }
        if !deal.is_invited(user) || deal.is_member(user) {
            return Err(DealError::NotInvited);
        }

        deal.status = DealStatus::Active;
        deal.members.push(user.clone());
        deal.record(DealAction::Accepted, Some(user), now);
        let deal = deal.clone();
        info!(deal = %deal_id, user = %user, "deal accepted");

        let creator = deal.creator_id.clone();
        let creator_name = self.name_of(&creator);
        let accepter_name = self.name_of(user);

        self.join_chat(user, deal_id, &creator, Role::Counterparty);
        self.outbox.push(
            Notice::lifecycle(
                user,
                templates::msg_chat_header(&deal, &creator_name, Role::Counterparty),
            )
            .with_affordances(templates::chat_affordances()),
        );

        if self.join_chat(&creator, deal_id, user, Role::Initiator) {
            self.outbox.push(
                Notice::lifecycle(
                    &creator,
                    templates::msg_chat_header(&deal, &accepter_name, Role::Initiator),
                )
                .with_affordances(templates::chat_affordances()),
            );
        } else {
            self.outbox.push(Notice::lifecycle(
                &creator,
                templates::msg_accepted_elsewhere(&deal, &accepter_name),
            ));
        }
        Ok(())
    }

    /// pending -> cancelled, by an invitee
    pub fn decline(&mut self, deal_id: &DealId, user: &UserId) -> DealResult<()> {
        let now = self.now;
        let deal = self.mutable_deal(deal_id)?;
        if deal.status != DealStatus::Pending {
            return Err(invalid(deal, "decline"));
        }
        if !deal.is_invited(user) || deal.is_member(user) {
            return Err(DealError::NotInvited);
        }

        deal.status = DealStatus::Cancelled;
        deal.record(DealAction::Declined, Some(user), now);
        let deal = deal.clone();
        info!(deal = %deal_id, user = %user, "deal declined");

        let by = self.name_of(user);
        self.outbox.push(Notice::lifecycle(
            &deal.creator_id,
            templates::msg_deal_declined(&deal, &by),
        ));
        self.outbox.push(
            Notice::reply(user, templates::msg_deal_declined(&deal, "You"))
                .with_affordances(templates::main_menu_affordances()),
        );
        Ok(())
    }

    /// active -> completed; every member gains one reputation point
    pub fn complete(&mut self, deal_id: &DealId, user: &UserId) -> DealResult<()> {
        let now = self.now;
        let deal = self.mutable_deal(deal_id)?;
        if deal.status != DealStatus::Active {
            return Err(invalid(deal, "complete"));
        }
        if !deal.is_member(user) {
            return Err(DealError::NotAMember);
        }

        deal.status = DealStatus::Completed;
        deal.completion_date = Some(now);
        deal.record(DealAction::Completed, Some(user), now);
        let deal = deal.clone();
        info!(deal = %deal_id, user = %user, "deal completed");

        for member in &deal.members {
            if let Some(u) = self.users.get_mut(member) {
                u.reputation += 1;
                u.completed_deals += 1;
            }
        }
        self.release_chats(&deal);

        for member in &deal.members {
            self.outbox.push(
                Notice::lifecycle(member, templates::msg_deal_completed(&deal))
                    .with_affordances(templates::main_menu_affordances()),
            );
        }
        Ok(())
    }

    /// active -> cancelled, by a member
    pub fn cancel(&mut self, deal_id: &DealId, user: &UserId) -> DealResult<()> {
        let now = self.now;
        let deal = self.mutable_deal(deal_id)?;
        if deal.status != DealStatus::Active {
            return Err(invalid(deal, "cancel"));
        }
        if !deal.is_member(user) {
            return Err(DealError::NotAMember);
        }

        deal.status = DealStatus::Cancelled;
        deal.record(DealAction::Cancelled, Some(user), now);
        let deal = deal.clone();
        info!(deal = %deal_id, user = %user, "deal cancelled");

        self.release_chats(&deal);
        let by = self.name_of(user);
        for member in &deal.members {
            self.outbox.push(
                Notice::lifecycle(member, templates::msg_deal_cancelled(&deal, &by))
                    .with_affordances(templates::main_menu_affordances()),
            );
        }
        Ok(())
    }

    /// Expire every pending or active deal older than `expiry`.
    ///
    /// Returns the expired ids in order.
    pub fn expire_stale(&mut self, expiry: Duration) -> Vec<DealId> {
        let Some(cutoff) = self.now.checked_sub_signed(expiry) else {
            debug!(?expiry, "expiry reaches before the representable range");
            return Vec::new();
        };
        let stale = self.deals.stale_ids(cutoff);

        for deal_id in &stale {
            let Some(deal) = self.deals.get_mut(deal_id) else {
                continue;
            };
            deal.status = DealStatus::Expired;
            deal.record(DealAction::Expired, None, self.now);
            let deal = deal.clone();

            self.release_chats(&deal);
            for participant in deal.participants() {
                self.outbox
                    .push(Notice::lifecycle(&participant, templates::msg_deal_expired(&deal)));
            }
        }

        if !stale.is_empty() {
            info!(count = stale.len(), "expired stale deals");
        }
        stale
    }

    /// Change auxiliary fields of a non-terminal deal
    pub fn update_metadata(
        &mut self,
        deal_id: &DealId,
        user: &UserId,
        update: MetadataUpdate,
    ) -> DealResult<()> {
        let now = self.now;
        let deal = self.mutable_deal(deal_id)?;
        if !deal.is_member(user) {
            return Err(DealError::NotAMember);
        }

        if let Some(currency) = update.currency {
            deal.metadata.currency = Some(currency);
        }
        if let Some(method) = update.payment_method {
            deal.metadata.payment_method = Some(method);
        }
        if let Some(deadline) = update.deadline {
            deal.metadata.deadline = Some(deadline);
        }
        deal.record(DealAction::MetadataUpdated, Some(user), now);
        debug!(deal = %deal_id, "metadata updated");
        Ok(())
    }

    /// Pair `user` with `counterpart` on `deal_id`.
    ///
    /// A user in the middle of a draft keeps their dialog state so the draft
    /// still owns their text; they switch over with /chat. Returns whether
    /// the user entered the chat.
    fn join_chat(
        &mut self,
        user: &UserId,
        deal_id: &DealId,
        counterpart: &UserId,
        role: Role,
    ) -> bool {
        let Some(record) = self.users.get_mut(user) else {
            return false;
        };
        record.active_chat = Some(ActiveChat {
            deal_id: deal_id.clone(),
            counterpart_id: counterpart.clone(),
        });
        record.role = Some(role);
        if record.state.is_drafting() {
            debug!(deal = %deal_id, user = %user, "user busy drafting, chat left unfocused");
            return false;
        }
        record.state = DialogState::ActiveChat;
        true
    }

    fn mutable_deal(&mut self, deal_id: &DealId) -> DealResult<&mut Deal> {
        let deal = self
            .deals
            .get_mut(deal_id)
            .ok_or_else(|| DealError::DealNotFound(deal_id.clone()))?;
        if deal.status.is_terminal() {
            return Err(DealError::DealNotMutable {
                id: deal_id.clone(),
                status: deal.status,
            });
        }
        Ok(deal)
    }

    /// Drop relay pointers that still aim at `deal`
    fn release_chats(&mut self, deal: &Deal) {
        for participant in deal.participants() {
            let Some(user) = self.users.get_mut(&participant) else {
                continue;
            };
            let focused = user
                .active_chat
                .as_ref()
                .is_some_and(|chat| chat.deal_id == deal.id);
            if focused {
                user.active_chat = None;
                user.role = None;
                if user.state == DialogState::ActiveChat {
                    user.state = DialogState::Idle;
                }
            }
        }
    }

    fn name_of(&self, user: &UserId) -> String {
        self.users
            .get(user)
            .map(|u| u.display_name())
            .unwrap_or_else(|| user.to_string())
    }
}

fn invalid(deal: &Deal, event: &'static str) -> DealError {
    DealError::InvalidTransition {
        id: deal.id.clone(),
        status: deal.status,
        event,
    }
}
