//! DealVault bot
//!
//! Event loop around the engine: receive an update, classify it, let the
//! engine apply it, then deliver the resulting notices. One task owns the
//! engine, so events are applied strictly one at a time and every state
//! change (including two-user changes on accept) lands before any message
//! for it is sent.
//!
//! Delivery is fire-and-forget: a failed send is logged and never rolls
//! back the state change that produced it. A failed relay is reported back
//! to its sender.

use super::commands::classify;
use super::templates;
use super::traits::{Messenger, MessengerResult, Update};
use crate::engine::model::{DealId, Notice, NoticeKind};
use crate::engine::DealEngine;
use crate::persistence::{Store, StoreResult};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bot scheduling configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// How often the expiry sweep runs
    pub sweep_interval: Duration,
    /// How often engine state is written to the store
    pub autosave_interval: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60 * 60),
            autosave_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Outcome of relaying one chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayResult {
    Delivered,
    DeliveryFailed(String),
}

enum Wake {
    Update(MessengerResult<Option<Update>>),
    Sweep,
    Autosave,
    Shutdown,
}

/// DealVault bot
pub struct DealBot<M: Messenger> {
    messenger: M,
    engine: DealEngine,
    store: Box<dyn Store>,
    config: BotConfig,
}

impl<M: Messenger> DealBot<M> {
    pub fn new(messenger: M, engine: DealEngine, store: Box<dyn Store>, config: BotConfig) -> Self {
        Self {
            messenger,
            engine,
            store,
            config,
        }
    }

    pub fn engine(&self) -> &DealEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut DealEngine {
        &mut self.engine
    }

    pub fn messenger(&self) -> &M {
        &self.messenger
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Run until the transport closes or Ctrl-C; state is saved on the way out
    pub async fn run(&mut self) -> StoreResult<()> {
        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        let mut autosave = tokio::time::interval(self.config.autosave_interval);
        // Both intervals fire immediately; skip that first tick
        sweep.tick().await;
        autosave.tick().await;

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!("DealVault bot running");
        loop {
            let wake = tokio::select! {
                update = self.messenger.receive() => Wake::Update(update),
                _ = sweep.tick() => Wake::Sweep,
                _ = autosave.tick() => Wake::Autosave,
                _ = &mut shutdown => Wake::Shutdown,
            };

            match wake {
                Wake::Update(Ok(Some(update))) => {
                    self.handle_update(update).await;
                }
                Wake::Update(Ok(None)) => {
                    info!("transport closed");
                    break;
                }
                Wake::Update(Err(e)) => {
                    warn!("Error receiving updates, will retry: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Wake::Sweep => {
                    self.sweep_at(Utc::now()).await;
                }
                Wake::Autosave => self.autosave(),
                Wake::Shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        self.save()
    }

    /// Apply one update now
    pub async fn handle_update(&mut self, update: Update) -> Vec<RelayResult> {
        self.handle_update_at(update, Utc::now()).await
    }

    /// Apply one update at `now`; returns the outcome of any relays it caused
    pub async fn handle_update_at(
        &mut self,
        update: Update,
        now: DateTime<Utc>,
    ) -> Vec<RelayResult> {
        let Update {
            sender,
            profile,
            payload,
        } = update;
        let event = classify(payload);
        debug!(user = %sender, ?event, "update received");

        let notices = self.engine.handle_event(&sender, &profile, event, now);
        self.deliver(notices).await
    }

    /// Expire stale deals at `now` and notify their participants
    pub async fn sweep_at(&mut self, now: DateTime<Utc>) -> Vec<DealId> {
        let (expired, notices) = self.engine.expire_stale(now);
        self.deliver(notices).await;
        expired
    }

    /// Snapshot the engine into the store
    pub fn save(&mut self) -> StoreResult<()> {
        self.engine.save_to(self.store.as_mut())
    }

    fn autosave(&mut self) {
        match self.save() {
            Ok(()) => debug!("autosave complete"),
            Err(e) => warn!("Autosave failed: {}", e),
        }
    }

    async fn deliver(&self, notices: Vec<Notice>) -> Vec<RelayResult> {
        let mut relays = Vec::new();

        for notice in notices {
            let sent = self
                .messenger
                .send(&notice.recipient, &notice.text, &notice.affordances)
                .await;

            match (sent, &notice.kind) {
                (Ok(()), NoticeKind::Relay { .. }) => relays.push(RelayResult::Delivered),
                (Ok(()), _) => {}
                (Err(e), NoticeKind::Relay { from }) => {
                    warn!(to = %notice.recipient, error = %e, "relay delivery failed");
                    let partner = self
                        .engine
                        .users()
                        .get(&notice.recipient)
                        .map(|u| u.display_name())
                        .unwrap_or_else(|| notice.recipient.to_string());
                    if let Err(e) = self
                        .messenger
                        .send(from, &templates::msg_relay_failed(&partner), &[])
                        .await
                    {
                        warn!(to = %from, error = %e, "could not report failed relay");
                    }
                    relays.push(RelayResult::DeliveryFailed(e.to_string()));
                }
                (Err(e), _) => {
                    warn!(to = %notice.recipient, error = %e, "notice delivery failed");
                }
            }
        }
        relays
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::UserId;
    use crate::messenger::mock::MockMessenger;
    use crate::persistence::{Collection, MemoryStore};

    fn bot() -> DealBot<MockMessenger> {
        DealBot::new(
            MockMessenger::new(),
            DealEngine::default(),
            Box::new(MemoryStore::new()),
            BotConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_start_replies_to_sender() {
        let mut bot = bot();
        let user = UserId::new("1");
        bot.handle_update(Update::text(&user, "/start")).await;

        let sent = bot.messenger().sent_to(&user);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, templates::msg_welcome_unregistered());
    }

    #[tokio::test]
    async fn test_failed_reply_does_not_roll_back_state() {
        let mut bot = bot();
        let user = UserId::new("1");
        bot.messenger().set_unreachable(&user, true);
        bot.handle_update(Update::text(&user, "/start")).await;

        assert!(bot.messenger().sent_messages().is_empty());
        assert_eq!(
            bot.engine().users().get(&user).unwrap().state,
            crate::engine::DialogState::SharingContact
        );
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_saves() {
        let mut bot = bot();
        let user = UserId::new("1");
        bot.messenger().push_update(Update::text(&user, "/start"));
        bot.messenger().push_update(Update::text(&user, "/help"));

        bot.run().await.unwrap();

        assert_eq!(bot.messenger().sent_to(&user).len(), 2);
        assert_eq!(bot.store().entries(Collection::Users).unwrap().len(), 1);
    }
}
