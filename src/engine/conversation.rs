//! Conversation State Machine
//!
//! Tracks, per user, which step of the deal dialogue they are in and
//! collects the draft fields one validated turn at a time.
//!
//! `route` is the single dispatch table: (state, event) -> Route. Nothing
//! else in the crate decides what an inbound event means, so a new step
//! cannot end up unreachable or handled twice.

use super::error::{DealError, DealResult, ValidationError};
use super::model::{DealId, DealType, DraftDeal, UserId};
use super::pairing::find_counterpart;
use super::users::{validate_phone, SharedContact, UserRegistry};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How typed text is interpreted while picking counterparts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Username,
    Phone,
    Contact,
}

/// Per-user dialogue position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "step", content = "mode", rename_all = "snake_case")]
pub enum DialogState {
    #[default]
    Idle,
    SharingContact,
    SelectingDealType,
    EnteringAmount,
    EnteringTerms,
    EnteringDuration,
    SelectingCounterparts(SearchMode),
    /// Free text is relayed to the chat partner
    ActiveChat,
}

impl DialogState {
    /// States that own a draft
    pub fn is_drafting(&self) -> bool {
        matches!(
            self,
            DialogState::SelectingDealType
                | DialogState::EnteringAmount
                | DialogState::EnteringTerms
                | DialogState::EnteringDuration
                | DialogState::SelectingCounterparts(_)
        )
    }
}

/// Classified inbound event (produced by the messenger's classifier)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    TextInput(String),
    ContactShared(SharedContact),
    ButtonPressed(String),
    CommandInvoked { name: String, args: Vec<String> },
}

/// What an event means in the sender's current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Start,
    Help,
    Profile,
    ListDeals,
    ReturnToMenu,
    BeginDraft,
    Register(SharedContact),
    Submit(String),
    SetSearchMode(SearchMode),
    SelectContact(SharedContact),
    Toggle(UserId),
    ConfirmSelection,
    Accept(DealId),
    Decline(DealId),
    Complete(Option<DealId>),
    Cancel(Option<DealId>),
    Focus(DealId),
    Relay(String),
    Unrecognized,
}

/// Dispatch table: the meaning of `event` for a user in `state`.
///
/// Global commands and deal buttons win in every state; everything else is
/// resolved against the current step.
pub fn route(state: DialogState, event: &InboundEvent) -> Route {
    if let InboundEvent::CommandInvoked { name, args } = event {
        return route_command(state, name, args);
    }

    if let InboundEvent::ButtonPressed(token) = event {
        if let Some(route) = route_global_button(token) {
            return route;
        }
    }

    match (state, event) {
        (DialogState::SelectingCounterparts(_), InboundEvent::ContactShared(contact)) => {
            Route::SelectContact(contact.clone())
        }
        (_, InboundEvent::ContactShared(contact)) => Route::Register(contact.clone()),

        (DialogState::SelectingDealType, InboundEvent::ButtonPressed(token)) => token
            .strip_prefix("create_")
            .map(|value| Route::Submit(value.to_string()))
            .unwrap_or(Route::Unrecognized),

        (
            DialogState::SelectingDealType
            | DialogState::EnteringAmount
            | DialogState::EnteringTerms
            | DialogState::EnteringDuration,
            InboundEvent::TextInput(text),
        ) => Route::Submit(text.clone()),

        (DialogState::SelectingCounterparts(_), InboundEvent::ButtonPressed(token)) => {
            match token.as_str() {
                "search:username" => Route::SetSearchMode(SearchMode::Username),
                "search:phone" => Route::SetSearchMode(SearchMode::Phone),
                "search:contact" => Route::SetSearchMode(SearchMode::Contact),
                "confirm" => Route::ConfirmSelection,
                other => other
                    .strip_prefix("toggle:")
                    .map(|id| Route::Toggle(UserId::new(id)))
                    .unwrap_or(Route::Unrecognized),
            }
        }
        (DialogState::SelectingCounterparts(_), InboundEvent::TextInput(text)) => {
            Route::Submit(text.clone())
        }

        (DialogState::ActiveChat, InboundEvent::TextInput(text)) => Route::Relay(text.clone()),

        _ => Route::Unrecognized,
    }
}

fn route_command(state: DialogState, name: &str, args: &[String]) -> Route {
    let deal_arg = || args.first().map(|a| DealId(a.clone()));

    match name {
        "start" => Route::Start,
        "help" => Route::Help,
        "menu" | "cancel" => Route::ReturnToMenu,
        "newdeal" => Route::BeginDraft,
        "profile" => Route::Profile,
        "deals" => Route::ListDeals,
        "accept" => deal_arg().map_or(Route::Unrecognized, Route::Accept),
        "decline" => deal_arg().map_or(Route::Unrecognized, Route::Decline),
        "chat" => deal_arg().map_or(Route::Unrecognized, Route::Focus),
        "complete" => Route::Complete(deal_arg()),
        "cancel_deal" => Route::Cancel(deal_arg()),
        "done" if matches!(state, DialogState::SelectingCounterparts(_)) => {
            Route::ConfirmSelection
        }
        _ => Route::Unrecognized,
    }
}

fn route_global_button(token: &str) -> Option<Route> {
    let deal = |prefix: &str| token.strip_prefix(prefix).map(|id| DealId(id.to_string()));

    match token {
        "main_menu" => Some(Route::ReturnToMenu),
        "complete_deal" => Some(Route::Complete(None)),
        "cancel_deal" => Some(Route::Cancel(None)),
        _ => deal("accept:")
            .map(Route::Accept)
            .or_else(|| deal("decline:").map(Route::Decline))
            .or_else(|| deal("complete:").map(|id| Route::Complete(Some(id))))
            .or_else(|| deal("cancel:").map(|id| Route::Cancel(Some(id)))),
    }
}

/// Counterpart currently in the draft's selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedCounterpart {
    pub id: UserId,
    pub name: String,
}

/// Next prompt after a successful step
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    ChooseDealType,
    EnterAmount,
    EnterTerms,
    EnterDuration,
    ChooseCounterparts {
        mode: SearchMode,
        selected: Vec<SelectedCounterpart>,
    },
    CounterpartAdded {
        name: String,
        selected: Vec<SelectedCounterpart>,
    },
    /// Search came back empty; the user may retry or finish
    NoUsersFound {
        query: String,
        selected: Vec<SelectedCounterpart>,
    },
}

/// Parse a positive, finite amount
pub fn parse_amount(input: &str) -> Result<f64, ValidationError> {
    match input.trim().parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount > 0.0 => Ok(amount),
        _ => Err(ValidationError::InvalidAmount),
    }
}

/// Parse a positive whole number of days
pub fn parse_duration_days(input: &str) -> Result<u32, ValidationError> {
    match input.trim().parse::<u32>() {
        Ok(days) if days > 0 => Ok(days),
        _ => Err(ValidationError::InvalidDuration),
    }
}

/// Per-user dialogue driver over the user registry
pub struct ConversationStateMachine<'a> {
    users: &'a mut UserRegistry,
}

impl<'a> ConversationStateMachine<'a> {
    pub fn new(users: &'a mut UserRegistry) -> Self {
        Self { users }
    }

    /// Start deal creation.
    ///
    /// With `reset_draft` any draft in progress is discarded and a fresh one
    /// begins; without it an existing draft is resumed at its current step.
    /// Two drafts are never merged.
    pub fn begin(&mut self, user_id: &UserId, reset_draft: bool) -> DealResult<Prompt> {
        let user = self.users.get_mut(user_id).ok_or(DealError::UserNotFound)?;
        if !user.is_registered {
            return Err(DealError::NotRegistered);
        }

        if !reset_draft && user.active_conversation.is_some() && user.state.is_drafting() {
            debug!(user = %user_id, state = ?user.state, "resuming draft");
            let state = user.state;
            return Ok(self.prompt_for(user_id, state));
        }

        if user.active_conversation.is_some() {
            debug!(user = %user_id, "discarding previous draft");
        }
        user.active_conversation = Some(DraftDeal::default());
        user.state = DialogState::SelectingDealType;
        Ok(Prompt::ChooseDealType)
    }

    /// Validate `input` for the current step and advance on success.
    ///
    /// On error nothing changes: no field is set and the step is repeated.
    pub fn submit(&mut self, user_id: &UserId, input: &str) -> DealResult<Prompt> {
        let state = self
            .users
            .get(user_id)
            .ok_or(DealError::UserNotFound)?
            .state;

        match state {
            DialogState::SelectingDealType => {
                let deal_type: DealType = input.parse()?;
                self.update_draft(user_id, DialogState::EnteringAmount, |d| {
                    d.deal_type = Some(deal_type)
                })?;
                Ok(Prompt::EnterAmount)
            }
            DialogState::EnteringAmount => {
                let amount = parse_amount(input)?;
                self.update_draft(user_id, DialogState::EnteringTerms, |d| {
                    d.amount = Some(amount)
                })?;
                Ok(Prompt::EnterTerms)
            }
            DialogState::EnteringTerms => {
                if input.trim().is_empty() {
                    return Err(ValidationError::EmptyTerms.into());
                }
                let terms = input.to_string();
                self.update_draft(user_id, DialogState::EnteringDuration, |d| {
                    d.terms = Some(terms)
                })?;
                Ok(Prompt::EnterDuration)
            }
            DialogState::EnteringDuration => {
                let days = parse_duration_days(input)?;
                let next = DialogState::SelectingCounterparts(SearchMode::default());
                self.update_draft(user_id, next, |d| d.duration_days = Some(days))?;
                Ok(self.prompt_for(user_id, next))
            }
            DialogState::SelectingCounterparts(SearchMode::Contact) => {
                // Typed text while waiting for a contact card: repeat the ask
                Ok(self.prompt_for(user_id, state))
            }
            DialogState::SelectingCounterparts(mode) => self.search(user_id, input, mode),
            _ => Err(DealError::NoActiveDraft),
        }
    }

    /// Switch how counterpart searches are interpreted
    pub fn set_search_mode(&mut self, user_id: &UserId, mode: SearchMode) -> DealResult<Prompt> {
        let next = DialogState::SelectingCounterparts(mode);
        self.require_selecting(user_id)?;
        self.update_draft(user_id, next, |_| {})?;
        Ok(self.prompt_for(user_id, next))
    }

    /// Add the owner of a shared contact card to the selection
    pub fn select_contact(
        &mut self,
        user_id: &UserId,
        contact: &SharedContact,
    ) -> DealResult<Prompt> {
        self.require_selecting(user_id)?;
        let phone = validate_phone(&contact.phone)?;
        self.search(user_id, &phone, SearchMode::Phone)
    }

    /// Check that the user may finalize: selecting counterparts with at
    /// least one chosen.
    pub fn ready_to_finalize(&self, user_id: &UserId) -> DealResult<()> {
        let user = self.users.get(user_id).ok_or(DealError::UserNotFound)?;
        let draft = match (user.state, user.active_conversation.as_ref()) {
            (DialogState::SelectingCounterparts(_), Some(draft)) => draft,
            _ => return Err(DealError::NoActiveDraft),
        };
        if draft.selected_counterparts.is_empty() {
            return Err(DealError::NoCounterpartsSelected);
        }
        Ok(())
    }

    /// Discard the draft unconditionally and go back to the main menu
    pub fn abandon(&mut self, user_id: &UserId) -> DealResult<()> {
        let user = self.users.get_mut(user_id).ok_or(DealError::UserNotFound)?;
        if user.active_conversation.take().is_some() {
            debug!(user = %user_id, "draft abandoned");
        }
        user.state = DialogState::Idle;
        Ok(())
    }

    /// Ask an unregistered user for their contact card
    pub fn request_contact(&mut self, user_id: &UserId) -> DealResult<()> {
        let user = self.users.get_mut(user_id).ok_or(DealError::UserNotFound)?;
        if !user.is_registered {
            user.state = DialogState::SharingContact;
        }
        Ok(())
    }

    /// Prompt matching `state`, including the current selection
    pub fn prompt_for(&self, user_id: &UserId, state: DialogState) -> Prompt {
        match state {
            DialogState::EnteringAmount => Prompt::EnterAmount,
            DialogState::EnteringTerms => Prompt::EnterTerms,
            DialogState::EnteringDuration => Prompt::EnterDuration,
            DialogState::SelectingCounterparts(mode) => Prompt::ChooseCounterparts {
                mode,
                selected: selection_of(self.users, user_id),
            },
            _ => Prompt::ChooseDealType,
        }
    }

    fn search(&mut self, user_id: &UserId, query: &str, mode: SearchMode) -> DealResult<Prompt> {
        let found = find_counterpart(self.users, user_id, query, mode)
            .map(|u| (u.id.clone(), u.display_name()));

        match found {
            Some((counterpart, name)) => {
                let state = self.users.get(user_id).map(|u| u.state).unwrap_or_default();
                self.update_draft(user_id, state, |d| {
                    d.selected_counterparts.insert(counterpart);
                })?;
                Ok(Prompt::CounterpartAdded {
                    name,
                    selected: selection_of(self.users, user_id),
                })
            }
            None => Ok(Prompt::NoUsersFound {
                query: query.trim().to_string(),
                selected: selection_of(self.users, user_id),
            }),
        }
    }

    fn require_selecting(&self, user_id: &UserId) -> DealResult<()> {
        match self.users.get(user_id).map(|u| u.state) {
            Some(DialogState::SelectingCounterparts(_)) => Ok(()),
            Some(_) => Err(DealError::NoActiveDraft),
            None => Err(DealError::UserNotFound),
        }
    }

    fn update_draft(
        &mut self,
        user_id: &UserId,
        next: DialogState,
        apply: impl FnOnce(&mut DraftDeal),
    ) -> DealResult<()> {
        let user = self.users.get_mut(user_id).ok_or(DealError::UserNotFound)?;
        let draft = user
            .active_conversation
            .as_mut()
            .ok_or(DealError::NoActiveDraft)?;
        apply(draft);
        user.state = next;
        Ok(())
    }
}

/// Current selection with display names, in id order
pub fn selection_of(users: &UserRegistry, user_id: &UserId) -> Vec<SelectedCounterpart> {
    users
        .get(user_id)
        .and_then(|u| u.active_conversation.as_ref())
        .map(|draft| {
            draft
                .selected_counterparts
                .iter()
                .map(|id| SelectedCounterpart {
                    id: id.clone(),
                    name: users
                        .get(id)
                        .map(|u| u.display_name())
                        .unwrap_or_else(|| id.to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::ProfileHints;
    use proptest::prelude::*;

    fn id(s: &str) -> UserId {
        UserId::new(s)
    }

    fn registry_with(users: &[(&str, &str, &str)]) -> UserRegistry {
        let mut registry = UserRegistry::new();
        for (user, username, phone) in users {
            registry.get_or_create(
                &id(user),
                &ProfileHints {
                    username: Some(username.to_string()),
                    ..Default::default()
                },
            );
            registry
                .complete_registration(
                    &id(user),
                    &SharedContact {
                        owner_id: Some(id(user)),
                        phone: phone.to_string(),
                        first_name: None,
                        last_name: None,
                    },
                )
                .unwrap();
        }
        registry
    }

    fn text(s: &str) -> InboundEvent {
        InboundEvent::TextInput(s.to_string())
    }

    fn button(s: &str) -> InboundEvent {
        InboundEvent::ButtonPressed(s.to_string())
    }

    fn command(name: &str, args: &[&str]) -> InboundEvent {
        InboundEvent::CommandInvoked {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Drive a to the counterpart step with a fixed draft
    fn drafted(registry: &mut UserRegistry) {
        let mut machine = ConversationStateMachine::new(registry);
        machine.begin(&id("a"), true).unwrap();
        machine.submit(&id("a"), "debt").unwrap();
        machine.submit(&id("a"), "100").unwrap();
        machine.submit(&id("a"), "repay in 1mo").unwrap();
        machine.submit(&id("a"), "30").unwrap();
    }

    #[test]
    fn test_route_global_commands_win_in_every_state() {
        for state in [
            DialogState::Idle,
            DialogState::EnteringAmount,
            DialogState::SelectingCounterparts(SearchMode::Phone),
            DialogState::ActiveChat,
        ] {
            assert_eq!(route(state, &command("menu", &[])), Route::ReturnToMenu);
            assert_eq!(route(state, &button("main_menu")), Route::ReturnToMenu);
            assert_eq!(
                route(state, &command("accept", &["deal_1"])),
                Route::Accept(DealId("deal_1".to_string()))
            );
        }
    }

    #[test]
    fn test_route_text_depends_on_state() {
        assert_eq!(
            route(DialogState::EnteringAmount, &text("5")),
            Route::Submit("5".to_string())
        );
        assert_eq!(
            route(DialogState::ActiveChat, &text("hello")),
            Route::Relay("hello".to_string())
        );
        assert_eq!(
            route(DialogState::Idle, &text("hello")),
            Route::Unrecognized
        );
    }

    #[test]
    fn test_route_contact_registers_or_selects() {
        let contact = SharedContact {
            owner_id: Some(id("b")),
            phone: "1".to_string(),
            first_name: None,
            last_name: None,
        };
        let event = InboundEvent::ContactShared(contact.clone());
        assert_eq!(
            route(DialogState::SharingContact, &event),
            Route::Register(contact.clone())
        );
        assert_eq!(
            route(
                DialogState::SelectingCounterparts(SearchMode::Contact),
                &event
            ),
            Route::SelectContact(contact)
        );
    }

    #[test]
    fn test_route_counterpart_buttons() {
        let state = DialogState::SelectingCounterparts(SearchMode::Username);
        assert_eq!(route(state, &button("toggle:b")), Route::Toggle(id("b")));
        assert_eq!(route(state, &button("confirm")), Route::ConfirmSelection);
        assert_eq!(route(state, &command("done", &[])), Route::ConfirmSelection);
        assert_eq!(
            route(state, &button("search:phone")),
            Route::SetSearchMode(SearchMode::Phone)
        );
        assert_eq!(
            route(DialogState::Idle, &command("done", &[])),
            Route::Unrecognized
        );
    }

    #[test]
    fn test_route_deal_type_button() {
        assert_eq!(
            route(DialogState::SelectingDealType, &button("create_venture")),
            Route::Submit("venture".to_string())
        );
    }

    #[test]
    fn test_begin_requires_registration() {
        let mut registry = UserRegistry::new();
        registry.get_or_create(&id("u"), &ProfileHints::default());
        let mut machine = ConversationStateMachine::new(&mut registry);
        assert_eq!(machine.begin(&id("u"), true), Err(DealError::NotRegistered));
    }

    #[test]
    fn test_full_draft_walk() {
        let mut registry = registry_with(&[("a", "alice", "111"), ("b", "bob", "5551234")]);
        drafted(&mut registry);

        let draft = registry
            .get(&id("a"))
            .unwrap()
            .active_conversation
            .clone()
            .unwrap();
        assert_eq!(draft.deal_type, Some(DealType::Debt));
        assert_eq!(draft.amount, Some(100.0));
        assert_eq!(draft.terms.as_deref(), Some("repay in 1mo"));
        assert_eq!(draft.duration_days, Some(30));
        assert_eq!(
            registry.get(&id("a")).unwrap().state,
            DialogState::SelectingCounterparts(SearchMode::Username)
        );
    }

    #[test]
    fn test_invalid_deal_type_repeats_step() {
        let mut registry = registry_with(&[("a", "alice", "111")]);
        let mut machine = ConversationStateMachine::new(&mut registry);
        machine.begin(&id("a"), true).unwrap();

        assert_eq!(
            machine.submit(&id("a"), "💰 Debt"),
            Err(DealError::Validation(ValidationError::InvalidDealType))
        );
        assert_eq!(
            registry.get(&id("a")).unwrap().state,
            DialogState::SelectingDealType
        );
    }

    #[test]
    fn test_invalid_duration_repeats_step() {
        let mut registry = registry_with(&[("a", "alice", "111")]);
        let mut machine = ConversationStateMachine::new(&mut registry);
        machine.begin(&id("a"), true).unwrap();
        machine.submit(&id("a"), "service").unwrap();
        machine.submit(&id("a"), "5.5").unwrap();
        machine.submit(&id("a"), "fix the roof").unwrap();

        for bad in ["0", "-3", "2.5", "soon", ""] {
            assert_eq!(
                machine.submit(&id("a"), bad),
                Err(DealError::Validation(ValidationError::InvalidDuration))
            );
        }
        let user = registry.get(&id("a")).unwrap();
        assert_eq!(user.state, DialogState::EnteringDuration);
        assert_eq!(
            user.active_conversation.as_ref().unwrap().duration_days,
            None
        );
    }

    #[test]
    fn test_blank_terms_rejected_but_text_kept_verbatim() {
        let mut registry = registry_with(&[("a", "alice", "111")]);
        let mut machine = ConversationStateMachine::new(&mut registry);
        machine.begin(&id("a"), true).unwrap();
        machine.submit(&id("a"), "charity").unwrap();
        machine.submit(&id("a"), "1").unwrap();

        assert_eq!(
            machine.submit(&id("a"), "   "),
            Err(DealError::Validation(ValidationError::EmptyTerms))
        );
        machine.submit(&id("a"), "  keep  spacing ").unwrap();
        let draft = registry
            .get(&id("a"))
            .unwrap()
            .active_conversation
            .clone()
            .unwrap();
        assert_eq!(draft.terms.as_deref(), Some("  keep  spacing "));
    }

    #[test]
    fn test_begin_without_reset_resumes_draft() {
        let mut registry = registry_with(&[("a", "alice", "111")]);
        let mut machine = ConversationStateMachine::new(&mut registry);
        machine.begin(&id("a"), true).unwrap();
        machine.submit(&id("a"), "debt").unwrap();

        assert_eq!(machine.begin(&id("a"), false), Ok(Prompt::EnterAmount));
        assert_eq!(machine.begin(&id("a"), true), Ok(Prompt::ChooseDealType));
        let user = registry.get(&id("a")).unwrap();
        assert_eq!(user.active_conversation, Some(DraftDeal::default()));
    }

    #[test]
    fn test_search_by_username_and_phone() {
        let mut registry = registry_with(&[
            ("a", "alice", "111"),
            ("b", "bob", "5551234"),
            ("c", "carol", "+1 555 0000"),
        ]);
        drafted(&mut registry);
        let mut machine = ConversationStateMachine::new(&mut registry);

        let prompt = machine.submit(&id("a"), "BOB").unwrap();
        assert!(matches!(
            prompt,
            Prompt::CounterpartAdded { ref name, .. } if name == "@bob"
        ));

        machine
            .set_search_mode(&id("a"), SearchMode::Phone)
            .unwrap();
        machine.submit(&id("a"), "15550000").unwrap();

        let prompt = machine.submit(&id("a"), "999").unwrap();
        match prompt {
            Prompt::NoUsersFound { query, selected } => {
                assert_eq!(query, "999");
                assert_eq!(selected.len(), 2);
            }
            other => panic!("Expected NoUsersFound, got {:?}", other),
        }
    }

    #[test]
    fn test_search_excludes_self() {
        let mut registry = registry_with(&[("a", "alice", "111")]);
        drafted(&mut registry);
        let mut machine = ConversationStateMachine::new(&mut registry);
        assert!(matches!(
            machine.submit(&id("a"), "alice").unwrap(),
            Prompt::NoUsersFound { .. }
        ));
    }

    #[test]
    fn test_select_contact_by_phone() {
        let mut registry = registry_with(&[("a", "alice", "111"), ("b", "bob", "5551234")]);
        drafted(&mut registry);
        let mut machine = ConversationStateMachine::new(&mut registry);
        machine
            .set_search_mode(&id("a"), SearchMode::Contact)
            .unwrap();

        let contact = SharedContact {
            owner_id: None,
            phone: "+555 1234".to_string(),
            first_name: Some("Bob".to_string()),
            last_name: None,
        };
        machine.select_contact(&id("a"), &contact).unwrap();
        let draft = registry
            .get(&id("a"))
            .unwrap()
            .active_conversation
            .clone()
            .unwrap();
        assert!(draft.selected_counterparts.contains(&id("b")));
    }

    #[test]
    fn test_ready_to_finalize_requires_selection() {
        let mut registry = registry_with(&[("a", "alice", "111")]);
        drafted(&mut registry);
        let machine = ConversationStateMachine::new(&mut registry);
        assert_eq!(
            machine.ready_to_finalize(&id("a")),
            Err(DealError::NoCounterpartsSelected)
        );
    }

    #[test]
    fn test_abandon_discards_draft() {
        let mut registry = registry_with(&[("a", "alice", "111")]);
        drafted(&mut registry);
        ConversationStateMachine::new(&mut registry)
            .abandon(&id("a"))
            .unwrap();
        let user = registry.get(&id("a")).unwrap();
        assert!(user.active_conversation.is_none());
        assert_eq!(user.state, DialogState::Idle);
    }

    proptest! {
        #[test]
        fn prop_positive_amount_advances(amount in 0.01f64..1.0e9) {
            let mut registry = registry_with(&[("a", "alice", "111")]);
            let mut machine = ConversationStateMachine::new(&mut registry);
            machine.begin(&id("a"), true).unwrap();
            machine.submit(&id("a"), "debt").unwrap();

            prop_assert_eq!(
                machine.submit(&id("a"), &amount.to_string()),
                Ok(Prompt::EnterTerms)
            );
            let user = registry.get(&id("a")).unwrap();
            prop_assert_eq!(user.state, DialogState::EnteringTerms);
            prop_assert_eq!(
                user.active_conversation.as_ref().unwrap().amount,
                Some(amount)
            );
        }

        #[test]
        fn prop_bad_amount_stays(input in "(-[0-9]{1,6}(\\.[0-9]{1,2})?|0|0\\.0|[a-z ]{1,10}|)") {
            let mut registry = registry_with(&[("a", "alice", "111")]);
            let mut machine = ConversationStateMachine::new(&mut registry);
            machine.begin(&id("a"), true).unwrap();
            machine.submit(&id("a"), "debt").unwrap();

            prop_assert_eq!(
                machine.submit(&id("a"), &input),
                Err(DealError::Validation(ValidationError::InvalidAmount))
            );
            let user = registry.get(&id("a")).unwrap();
            prop_assert_eq!(user.state, DialogState::EnteringAmount);
            prop_assert_eq!(user.active_conversation.as_ref().unwrap().amount, None);
        }
    }
}
