//! Engine state survives a restart on the JSON file store.

use chrono::{DateTime, TimeZone, Utc};
use dealvault::engine::model::{DealId, ProfileHints, UserId};
use dealvault::engine::{DealEngine, DealStatus, DialogState, EngineConfig};
use dealvault::messenger::mock::MockMessenger;
use dealvault::messenger::{BotConfig, DealBot, RawPayload, Update};
use dealvault::persistence::{Collection, JsonFileStore, Store};
use std::fs;
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn open_bot(dir: &TempDir) -> DealBot<MockMessenger> {
    let store = JsonFileStore::open(dir.path()).unwrap();
    let engine = DealEngine::load_from(&store, EngineConfig::default()).unwrap();
    DealBot::new(
        MockMessenger::new(),
        engine,
        Box::new(store),
        BotConfig::default(),
    )
}

async fn send(bot: &mut DealBot<MockMessenger>, update: Update) {
    bot.handle_update_at(update, t0()).await;
}

async fn register(bot: &mut DealBot<MockMessenger>, user: &UserId, username: &str, name: &str) {
    let hints = ProfileHints {
        username: Some(username.to_string()),
        first_name: None,
        last_name: None,
    };
    send(bot, Update::text(user, "/start").with_profile(hints)).await;
    send(
        bot,
        Update {
            sender: user.clone(),
            profile: ProfileHints::default(),
            payload: RawPayload::Contact {
                owner_id: Some(user.clone()),
                phone: format!("+1 555 {}", user),
                first_name: Some(name.to_string()),
                last_name: None,
            },
        },
    )
    .await;
}

/// Two registered users chatting on an active debt deal
async fn seed(dir: &TempDir) -> DealId {
    let mut bot = open_bot(dir);
    let (a, b) = (UserId::new("100"), UserId::new("200"));
    register(&mut bot, &a, "alice", "A").await;
    register(&mut bot, &b, "bob", "B").await;

    for text in ["/newdeal", "debt", "250", "split the rent", "14", "@bob"] {
        send(&mut bot, Update::text(&a, text)).await;
    }
    send(&mut bot, Update::button(&a, "confirm")).await;

    let deal_id = DealId("deal_20240601120000_100".to_string());
    send(&mut bot, Update::button(&b, format!("accept:{}", deal_id))).await;
    bot.save().unwrap();
    deal_id
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let deal_id = seed(&dir).await;

    assert!(dir.path().join("users.json").exists());
    assert!(dir.path().join("deals.json").exists());

    let bot = open_bot(&dir);
    let engine = bot.engine();
    assert_eq!(engine.users().len(), 2);

    let deal = engine.deals().get(&deal_id).unwrap();
    assert_eq!(deal.status, DealStatus::Active);
    assert_eq!(deal.amount, 250.0);
    assert_eq!(deal.terms, "split the rent");
    assert_eq!(deal.history.len(), 2);

    let alice = engine.users().get(&UserId::new("100")).unwrap();
    assert!(alice.is_registered);
    assert_eq!(alice.state, DialogState::ActiveChat);
    assert_eq!(
        alice.active_chat.as_ref().map(|c| &c.deal_id),
        Some(&deal_id)
    );
}

#[tokio::test]
async fn test_relay_continues_after_restart() {
    let dir = TempDir::new().unwrap();
    seed(&dir).await;

    let mut bot = open_bot(&dir);
    let (a, b) = (UserId::new("100"), UserId::new("200"));
    send(&mut bot, Update::text(&b, "still on?")).await;

    let sent = bot.messenger().sent_to(&a);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "B (Counterparty): still on?");
}

#[tokio::test]
async fn test_completion_persists() {
    let dir = TempDir::new().unwrap();
    let deal_id = seed(&dir).await;

    let mut bot = open_bot(&dir);
    send(
        &mut bot,
        Update::button(&UserId::new("200"), "complete_deal"),
    )
    .await;
    bot.save().unwrap();

    let store = JsonFileStore::open(dir.path()).unwrap();
    let deal = store.get(Collection::Deals, deal_id.as_str()).unwrap();
    assert_eq!(deal["status"], "completed");
    let user = store.get(Collection::Users, "100").unwrap();
    assert_eq!(user["reputation"], 1);
}

#[tokio::test]
async fn test_corrupted_deals_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    seed(&dir).await;
    fs::write(dir.path().join("deals.json"), b"{ not json").unwrap();

    let bot = open_bot(&dir);
    assert!(bot.engine().deals().is_empty());
    assert_eq!(bot.engine().users().len(), 2);
    assert!(dir.path().join("backups").is_dir());
}
