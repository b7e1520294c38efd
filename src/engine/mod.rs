//! Deal Engine
//!
//! Ties the user registry, deal store and the three state machines together
//! behind one entry point, `DealEngine::handle_event`. The engine is pure
//! state: it takes the current time as an argument and returns notices for
//! the messenger to deliver.

pub mod conversation;
pub mod deals;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod pairing;
pub mod users;

pub use conversation::{
    route, ConversationStateMachine, DialogState, InboundEvent, Prompt, Route, SearchMode,
};
pub use deals::DealStore;
pub use error::{DealError, DealResult, ValidationError};
pub use lifecycle::{DealLifecycleManager, DealTerms};
pub use model::{
    Deal, DealId, DealStatus, DealType, Notice, NoticeKind, ProfileHints, User, UserId,
};
pub use pairing::PairingRouter;
pub use users::{SharedContact, UserRegistry};

use crate::messenger::templates;
use crate::persistence::{Collection, Store, StoreResult};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

/// Default age after which open deals expire
pub const DEFAULT_EXPIRY_DAYS: i64 = 30;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pending or active deals older than this are expired by the sweep
    pub expiry: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::days(DEFAULT_EXPIRY_DAYS),
        }
    }
}

/// Deal negotiation engine
#[derive(Debug, Default)]
pub struct DealEngine {
    users: UserRegistry,
    deals: DealStore,
    config: EngineConfig,
}

impl DealEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            users: UserRegistry::new(),
            deals: DealStore::new(),
            config,
        }
    }

    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    pub fn deals(&self) -> &DealStore {
        &self.deals
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn conversation(&mut self) -> ConversationStateMachine<'_> {
        ConversationStateMachine::new(&mut self.users)
    }

    pub fn lifecycle<'a>(
        &'a mut self,
        now: DateTime<Utc>,
        outbox: &'a mut Vec<Notice>,
    ) -> DealLifecycleManager<'a> {
        DealLifecycleManager::new(&mut self.users, &mut self.deals, now, outbox)
    }

    pub fn pairing<'a>(
        &'a mut self,
        now: DateTime<Utc>,
        outbox: &'a mut Vec<Notice>,
    ) -> PairingRouter<'a> {
        PairingRouter::new(&mut self.users, &mut self.deals, now, outbox)
    }

    /// Process one inbound event from `sender`.
    ///
    /// Rejected events leave all state as it was and produce a single
    /// rejection reply. Input rejected mid-draft repeats the current step.
    pub fn handle_event(
        &mut self,
        sender: &UserId,
        hints: &ProfileHints,
        event: InboundEvent,
        now: DateTime<Utc>,
    ) -> Vec<Notice> {
        let state = self.users.get_or_create(sender, hints).state;
        let route = route(state, &event);
        debug!(user = %sender, ?state, ?route, "event routed");

        let mut outbox = Vec::new();
        if let Err(err) = self.dispatch(sender, state, route, now, &mut outbox) {
            debug!(user = %sender, error = %err, "event rejected");
            let notice = self.rejection(sender, &err);
            outbox.push(notice);
        }
        outbox
    }

    /// Rejection reply for `err`, carrying the keyboard of the step the
    /// user is still on when they can simply try again.
    fn rejection(&mut self, sender: &UserId, err: &DealError) -> Notice {
        let mut notice = Notice::reply(sender, templates::msg_rejection(err));
        let state = self.users.get(sender).map(|u| u.state).unwrap_or_default();
        let retry = matches!(
            err,
            DealError::Validation(_) | DealError::NoCounterpartsSelected
        );

        if retry && state.is_drafting() {
            let prompt = self.conversation().prompt_for(sender, state);
            let prompt = templates::prompt_notice(sender, &prompt);
            notice.text = format!("{}\n\n{}", notice.text, prompt.text);
            notice.affordances = prompt.affordances;
        } else if state == DialogState::SharingContact {
            notice = notice.with_affordances(templates::share_contact_affordances());
        }
        notice
    }

    /// Expire stale deals; returns their ids and the notices to deliver
    pub fn expire_stale(&mut self, now: DateTime<Utc>) -> (Vec<DealId>, Vec<Notice>) {
        let expiry = self.config.expiry;
        let mut outbox = Vec::new();
        let expired = self.lifecycle(now, &mut outbox).expire_stale(expiry);
        (expired, outbox)
    }

    fn dispatch(
        &mut self,
        sender: &UserId,
        state: DialogState,
        route: Route,
        now: DateTime<Utc>,
        outbox: &mut Vec<Notice>,
    ) -> DealResult<()> {
        match route {
            Route::Start | Route::ReturnToMenu if !self.is_registered(sender) => {
                self.conversation().request_contact(sender)?;
                outbox.push(
                    Notice::reply(sender, templates::msg_welcome_unregistered())
                        .with_affordances(templates::share_contact_affordances()),
                );
            }
            Route::Start => {
                let name = self.registered(sender)?.display_name();
                outbox.push(
                    Notice::reply(sender, templates::msg_welcome_back(&name))
                        .with_affordances(templates::main_menu_affordances()),
                );
            }
            Route::ReturnToMenu => {
                let had_draft = state.is_drafting();
                self.conversation().abandon(sender)?;
                let prefix = had_draft.then(templates::msg_draft_discarded);
                self.main_menu(sender, prefix, outbox);
            }
            Route::Help => outbox.push(
                Notice::reply(sender, templates::msg_help())
                    .with_affordances(templates::main_menu_affordances()),
            ),
            Route::Unrecognized => {
                let mut notice = Notice::reply(sender, templates::msg_unrecognized(state));
                if state == DialogState::SharingContact {
                    notice = notice.with_affordances(templates::share_contact_affordances());
                }
                outbox.push(notice);
            }
            Route::Register(contact) => {
                let name = self
                    .users
                    .complete_registration(sender, &contact)?
                    .display_name();
                if let Some(user) = self.users.get_mut(sender) {
                    if user.state == DialogState::SharingContact {
                        user.state = DialogState::Idle;
                    }
                }
                outbox.push(
                    Notice::reply(sender, templates::msg_registered(&name))
                        .with_affordances(templates::main_menu_affordances()),
                );
            }
            Route::BeginDraft => {
                let prompt = self.conversation().begin(sender, true)?;
                outbox.push(templates::prompt_notice(sender, &prompt));
            }
            Route::Submit(text) => {
                let prompt = self.conversation().submit(sender, &text)?;
                outbox.push(templates::prompt_notice(sender, &prompt));
            }
            Route::SetSearchMode(mode) => {
                let prompt = self.conversation().set_search_mode(sender, mode)?;
                outbox.push(templates::prompt_notice(sender, &prompt));
            }
            Route::SelectContact(contact) => {
                let prompt = self.conversation().select_contact(sender, &contact)?;
                outbox.push(templates::prompt_notice(sender, &prompt));
            }
            Route::Toggle(candidate) => {
                let selected = self.pairing(now, outbox).toggle_selection(sender, &candidate)?;
                let mode = match state {
                    DialogState::SelectingCounterparts(mode) => mode,
                    _ => SearchMode::default(),
                };
                outbox.push(templates::prompt_notice(
                    sender,
                    &Prompt::ChooseCounterparts { mode, selected },
                ));
            }
            Route::ConfirmSelection => {
                self.conversation().ready_to_finalize(sender)?;
                self.pairing(now, outbox).finalize_invitations(sender)?;
            }
            Route::Profile => {
                let user = self.registered(sender)?;
                let open = self
                    .deals
                    .for_user(sender)
                    .iter()
                    .filter(|d| !d.status.is_terminal())
                    .count();
                outbox.push(
                    Notice::reply(sender, templates::msg_profile(user, open))
                        .with_affordances(templates::main_menu_affordances()),
                );
            }
            Route::ListDeals => {
                self.registered(sender)?;
                let open: Vec<(&Deal, String)> = self
                    .deals
                    .for_user(sender)
                    .into_iter()
                    .filter(|d| !d.status.is_terminal())
                    .map(|d| (d, self.counterpart_name(d, sender)))
                    .collect();
                outbox.push(templates::deal_list_notice(sender, &open));
            }
            Route::Accept(deal_id) => {
                self.registered(sender)?;
                self.lifecycle(now, outbox).accept(&deal_id, sender)?;
            }
            Route::Decline(deal_id) => {
                self.registered(sender)?;
                self.lifecycle(now, outbox).decline(&deal_id, sender)?;
            }
            Route::Complete(deal_id) => {
                let deal_id = self.resolve_chat_deal(sender, deal_id)?;
                self.lifecycle(now, outbox).complete(&deal_id, sender)?;
            }
            Route::Cancel(deal_id) => {
                let deal_id = self.resolve_chat_deal(sender, deal_id)?;
                self.lifecycle(now, outbox).cancel(&deal_id, sender)?;
            }
            Route::Focus(deal_id) => {
                self.registered(sender)?;
                self.pairing(now, outbox).focus(sender, &deal_id)?;
            }
            Route::Relay(text) => {
                let notice = self.pairing(now, outbox).relay(sender, &text)?;
                outbox.push(notice);
            }
        }
        Ok(())
    }

    fn main_menu(&self, user_id: &UserId, prefix: Option<String>, outbox: &mut Vec<Notice>) {
        let name = self
            .users
            .get(user_id)
            .map(|u| u.display_name())
            .unwrap_or_else(|| user_id.to_string());
        let menu = templates::msg_main_menu(&name);
        let text = match prefix {
            Some(prefix) => format!("{}\n\n{}", prefix, menu),
            None => menu,
        };
        outbox.push(
            Notice::reply(user_id, text).with_affordances(templates::main_menu_affordances()),
        );
    }

    /// Name of the other side of `deal` from `viewer`'s point of view
    fn counterpart_name(&self, deal: &Deal, viewer: &UserId) -> String {
        let other = if &deal.creator_id == viewer {
            deal.partner_of(viewer).or_else(|| deal.invited.first())
        } else {
            Some(&deal.creator_id)
        };
        other
            .map(|id| {
                self.users
                    .get(id)
                    .map(|u| u.display_name())
                    .unwrap_or_else(|| id.to_string())
            })
            .unwrap_or_else(|| "nobody".to_string())
    }

    fn is_registered(&self, user_id: &UserId) -> bool {
        self.users.get(user_id).is_some_and(|u| u.is_registered)
    }

    fn registered(&self, user_id: &UserId) -> DealResult<&User> {
        match self.users.get(user_id) {
            Some(user) if user.is_registered => Ok(user),
            Some(_) => Err(DealError::NotRegistered),
            None => Err(DealError::UserNotFound),
        }
    }

    /// Explicit deal id, or the deal the user is chatting on
    fn resolve_chat_deal(&self, user_id: &UserId, explicit: Option<DealId>) -> DealResult<DealId> {
        let user = self.registered(user_id)?;
        match explicit {
            Some(deal_id) => Ok(deal_id),
            None => user
                .active_chat
                .as_ref()
                .map(|chat| chat.deal_id.clone())
                .ok_or(DealError::NotInChat),
        }
    }

    /// Write every user and deal record into `store`, drop records the
    /// engine no longer holds, and flush.
    pub fn save_to(&self, store: &mut dyn Store) -> StoreResult<()> {
        for user in self.users.iter() {
            store.put(
                Collection::Users,
                user.id.as_str(),
                serde_json::to_value(user)?,
            )?;
        }
        for deal in self.deals.iter() {
            store.put(
                Collection::Deals,
                deal.id.as_str(),
                serde_json::to_value(deal)?,
            )?;
        }

        for (key, _) in store.entries(Collection::Users)? {
            if self.users.get(&UserId(key.clone())).is_none() {
                store.delete(Collection::Users, &key)?;
            }
        }
        for (key, _) in store.entries(Collection::Deals)? {
            if self.deals.get(&DealId(key.clone())).is_none() {
                store.delete(Collection::Deals, &key)?;
            }
        }
        store.flush()
    }

    /// Rebuild an engine from `store`.
    ///
    /// Records that no longer parse are skipped with a warning rather than
    /// failing the whole load.
    pub fn load_from(store: &dyn Store, config: EngineConfig) -> StoreResult<Self> {
        let mut engine = Self::new(config);

        for (key, value) in store.entries(Collection::Users)? {
            match serde_json::from_value::<User>(value) {
                Ok(user) => engine.users.insert(user),
                Err(e) => warn!(key = %key, error = %e, "skipping unreadable user record"),
            }
        }
        for (key, value) in store.entries(Collection::Deals)? {
            match serde_json::from_value::<Deal>(value) {
                Ok(deal) => engine.deals.insert(deal),
                Err(e) => warn!(key = %key, error = %e, "skipping unreadable deal record"),
            }
        }

        debug!(
            users = engine.users.len(),
            deals = engine.deals.len(),
            "engine restored"
        );
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn id(s: &str) -> UserId {
        UserId::new(s)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn command(name: &str) -> InboundEvent {
        InboundEvent::CommandInvoked {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    fn register(engine: &mut DealEngine, user: &str) {
        engine.handle_event(&id(user), &ProfileHints::default(), command("start"), t0());
        engine.handle_event(
            &id(user),
            &ProfileHints::default(),
            InboundEvent::ContactShared(SharedContact {
                owner_id: Some(id(user)),
                phone: "5550000".to_string(),
                first_name: Some(user.to_uppercase()),
                last_name: None,
            }),
            t0(),
        );
    }

    #[test]
    fn test_start_asks_unregistered_user_for_contact() {
        let mut engine = DealEngine::default();
        let notices =
            engine.handle_event(&id("u"), &ProfileHints::default(), command("start"), t0());

        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].affordances[0].token, "share_contact");
        assert_eq!(
            engine.users().get(&id("u")).unwrap().state,
            DialogState::SharingContact
        );
    }

    #[test]
    fn test_registration_gate() {
        let mut engine = DealEngine::default();
        let notices =
            engine.handle_event(&id("u"), &ProfileHints::default(), command("newdeal"), t0());
        assert_eq!(
            notices[0].text,
            templates::msg_rejection(&DealError::NotRegistered)
        );

        let notices =
            engine.handle_event(&id("u"), &ProfileHints::default(), command("deals"), t0());
        assert_eq!(
            notices[0].text,
            templates::msg_rejection(&DealError::NotRegistered)
        );
    }

    #[test]
    fn test_registration_moves_to_idle() {
        let mut engine = DealEngine::default();
        register(&mut engine, "a");
        let user = engine.users().get(&id("a")).unwrap();
        assert!(user.is_registered);
        assert_eq!(user.state, DialogState::Idle);
    }

    #[test]
    fn test_menu_discards_draft() {
        let mut engine = DealEngine::default();
        register(&mut engine, "a");
        engine.handle_event(&id("a"), &ProfileHints::default(), command("newdeal"), t0());
        let notices =
            engine.handle_event(&id("a"), &ProfileHints::default(), command("menu"), t0());

        let text = &notices[0].text;
        assert!(text.starts_with(&templates::msg_draft_discarded()));
        let user = engine.users().get(&id("a")).unwrap();
        assert!(user.active_conversation.is_none());
        assert_eq!(user.state, DialogState::Idle);
    }

    #[test]
    fn test_rejected_amount_repeats_prompt() {
        let mut engine = DealEngine::default();
        register(&mut engine, "a");
        let hints = ProfileHints::default();
        engine.handle_event(&id("a"), &hints, command("newdeal"), t0());
        engine.handle_event(
            &id("a"),
            &hints,
            InboundEvent::ButtonPressed("create_debt".to_string()),
            t0(),
        );

        let notices = engine.handle_event(
            &id("a"),
            &hints,
            InboundEvent::TextInput("abc".to_string()),
            t0(),
        );
        assert_eq!(notices.len(), 1);
        let rejection = templates::msg_rejection(&ValidationError::InvalidAmount.into());
        assert!(notices[0].text.starts_with(&rejection));
        let expected = templates::prompt_notice(&id("a"), &Prompt::EnterAmount);
        assert_eq!(notices[0].affordances, expected.affordances);
        assert_eq!(
            engine.users().get(&id("a")).unwrap().state,
            DialogState::EnteringAmount
        );
    }

    #[test]
    fn test_bad_phone_offers_contact_button_again() {
        let mut engine = DealEngine::default();
        let hints = ProfileHints::default();
        engine.handle_event(&id("u"), &hints, command("start"), t0());

        let notices = engine.handle_event(
            &id("u"),
            &hints,
            InboundEvent::ContactShared(SharedContact {
                owner_id: Some(id("u")),
                phone: "not a number".to_string(),
                first_name: None,
                last_name: None,
            }),
            t0(),
        );
        assert_eq!(
            notices[0].text,
            templates::msg_rejection(&ValidationError::InvalidPhoneFormat.into())
        );
        assert_eq!(notices[0].affordances, templates::share_contact_affordances());
        assert!(!engine.users().get(&id("u")).unwrap().is_registered);
    }

    #[test]
    fn test_text_while_idle_is_unrecognized() {
        let mut engine = DealEngine::default();
        register(&mut engine, "a");
        let notices = engine.handle_event(
            &id("a"),
            &ProfileHints::default(),
            InboundEvent::TextInput("hello".to_string()),
            t0(),
        );
        assert_eq!(
            notices[0].text,
            templates::msg_unrecognized(DialogState::Idle)
        );
    }

    #[test]
    fn test_complete_without_chat() {
        let mut engine = DealEngine::default();
        register(&mut engine, "a");
        let notices = engine.handle_event(
            &id("a"),
            &ProfileHints::default(),
            InboundEvent::ButtonPressed("complete_deal".to_string()),
            t0(),
        );
        assert_eq!(
            notices[0].text,
            templates::msg_rejection(&DealError::NotInChat)
        );
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let mut engine = DealEngine::default();
        register(&mut engine, "a");
        register(&mut engine, "b");

        let mut store = MemoryStore::new();
        engine.save_to(&mut store).unwrap();
        assert_eq!(store.len(Collection::Users), 2);

        let restored = DealEngine::load_from(&store, EngineConfig::default()).unwrap();
        assert_eq!(restored.users().len(), 2);
        assert_eq!(
            restored.users().get(&id("a")),
            engine.users().get(&id("a"))
        );
    }

    #[test]
    fn test_load_skips_unreadable_records() {
        let mut store = MemoryStore::new();
        store
            .put(Collection::Users, "1", json!({"id": "1"}))
            .unwrap();
        store
            .put(Collection::Users, "2", json!({"nope": true}))
            .unwrap();
        store.put(Collection::Deals, "d", json!("garbage")).unwrap();

        let engine = DealEngine::load_from(&store, EngineConfig::default()).unwrap();
        assert_eq!(engine.users().len(), 1);
        assert!(engine.deals().is_empty());
    }
}
