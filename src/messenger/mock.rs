//! Mock Messenger for Testing
//!
//! Queued inbound updates, recorded outbound messages and per-recipient
//! delivery failures, without a real transport.

use super::traits::*;
use crate::engine::model::{Affordance, UserId};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Mock messenger for testing
#[derive(Clone, Default)]
pub struct MockMessenger {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    inbound: VecDeque<Update>,
    sent: Vec<SentMessage>,
    unreachable: HashSet<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: UserId,
    pub text: String,
    pub affordances: Vec<Affordance>,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound update
    pub fn push_update(&self, update: Update) {
        self.state.lock().unwrap().inbound.push_back(update);
    }

    /// Every message sent so far
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Messages sent to one recipient
    pub fn sent_to(&self, recipient: &UserId) -> Vec<SentMessage> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|m| &m.recipient == recipient)
            .cloned()
            .collect()
    }

    pub fn clear_sent(&self) {
        self.state.lock().unwrap().sent.clear();
    }

    /// Make deliveries to `recipient` fail
    pub fn set_unreachable(&self, recipient: &UserId, unreachable: bool) {
        let mut state = self.state.lock().unwrap();
        if unreachable {
            state.unreachable.insert(recipient.clone());
        } else {
            state.unreachable.remove(recipient);
        }
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn send(
        &self,
        recipient: &UserId,
        text: &str,
        affordances: &[Affordance],
    ) -> MessengerResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable.contains(recipient) {
            return Err(MessengerError::Delivery(recipient.clone()));
        }
        state.sent.push(SentMessage {
            recipient: recipient.clone(),
            text: text.to_string(),
            affordances: affordances.to_vec(),
        });
        Ok(())
    }

    /// Drains the queue, then reports the transport closed
    async fn receive(&self) -> MessengerResult<Option<Update>> {
        Ok(self.state.lock().unwrap().inbound.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_sends() {
        let messenger = MockMessenger::new();
        let alice = UserId::new("a");
        messenger.send(&alice, "hi", &[]).await.unwrap();

        assert_eq!(messenger.sent_to(&alice).len(), 1);
        assert_eq!(messenger.sent_messages()[0].text, "hi");
    }

    #[tokio::test]
    async fn test_unreachable_recipient() {
        let messenger = MockMessenger::new();
        let bob = UserId::new("b");
        messenger.set_unreachable(&bob, true);

        assert_eq!(
            messenger.send(&bob, "hi", &[]).await,
            Err(MessengerError::Delivery(bob.clone()))
        );
        assert!(messenger.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_notify_many_attempts_everyone() {
        let messenger = MockMessenger::new();
        let (a, b, c) = (UserId::new("a"), UserId::new("b"), UserId::new("c"));
        messenger.set_unreachable(&b, true);

        let result = messenger
            .notify_many(&[a.clone(), b.clone(), c.clone()], "news")
            .await;
        assert_eq!(result, Err(MessengerError::Delivery(b)));
        assert_eq!(messenger.sent_to(&a).len(), 1);
        assert_eq!(messenger.sent_to(&c).len(), 1);
    }

    #[tokio::test]
    async fn test_receive_drains_then_closes() {
        let messenger = MockMessenger::new();
        messenger.push_update(Update::text(&UserId::new("a"), "/start"));

        assert!(messenger.receive().await.unwrap().is_some());
        assert!(messenger.receive().await.unwrap().is_none());
    }
}
