//! Shared harness for engine integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use credora_engine::{Engine, EngineConfig, Notification, Notifier, NotifyError};
use credora_ledger::{MemoryStore, Posting};
use credora_types::{Actor, Currency, TransactionType, UserId};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, Mutex};

/// Forwards every notification to a channel the test can drain
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.tx
            .send(notification)
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub admin: Actor,
    notifications: Mutex<mpsc::UnboundedReceiver<Notification>>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Engine::new(store.clone(), EngineConfig::default())
            .with_notifier(Arc::new(RecordingNotifier { tx }));
        Self {
            engine,
            store,
            admin: Actor::admin(UserId::new()),
            notifications: Mutex::new(rx),
        }
    }

    pub fn customer(&self) -> Actor {
        Actor::customer(UserId::new())
    }

    /// Fund a wallet directly through the ledger
    pub async fn fund(&self, user: UserId, amount: Decimal) {
        self.engine
            .ledger()
            .credit(Posting::new(user, TransactionType::Deposit, amount, Currency::ngn(), "Seed"))
            .await
            .unwrap();
    }

    pub async fn balance(&self, user: UserId) -> Decimal {
        self.engine.ledger().balance(&user).await.unwrap()
    }

    /// Wait for the next delivered notification
    pub async fn next_notification(&self) -> Notification {
        let mut rx = self.notifications.lock().await;
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("notification not delivered in time")
            .expect("notifier channel closed")
    }
}
