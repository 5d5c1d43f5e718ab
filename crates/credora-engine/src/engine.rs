//! The engine: orchestration over the wallet ledger
//!
//! Operations are grouped by workflow in sibling modules, each adding an
//! `impl Engine` block. Every mutating operation follows the same shape:
//! take the affected wallet locks, re-read the entities under the lock,
//! check the lifecycle state, stage everything into one [`UnitOfWork`],
//! commit, then notify.

use std::sync::Arc;

use credora_ledger::{LedgerStore, UnitOfWork, WalletLedger};
use credora_types::{Actor, AuditRecord, CredoraError, Currency, Result, UserId};
use tracing::warn;

use crate::config::EngineConfig;
use crate::notify::{Notification, Notifier, TracingNotifier};

/// Ledger & loan-lifecycle engine
#[derive(Clone)]
pub struct Engine {
    pub(crate) ledger: WalletLedger,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) config: EngineConfig,
}

impl Engine {
    pub fn new(store: Arc<dyn LedgerStore>, config: EngineConfig) -> Self {
        Self {
            ledger: WalletLedger::new(store),
            notifier: Arc::new(TracingNotifier),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn ledger(&self) -> &WalletLedger {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn LedgerStore> {
        self.ledger.store()
    }

    pub(crate) async fn commit(&self, unit: UnitOfWork) -> Result<()> {
        self.ledger.commit(unit).await
    }

    /// Requested currency, or the configured default
    pub(crate) fn currency_or_default(&self, currency: Option<Currency>) -> Currency {
        currency.unwrap_or_else(|| self.config.default_currency.clone())
    }

    /// Fire-and-forget delivery
    pub(crate) fn notify(&self, notification: Notification) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let user_id = notification.user_id;
            if let Err(e) = notifier.notify(notification).await {
                warn!(user_id = %user_id, error = %e, "Notification delivery failed");
            }
        });
    }
}

/// Resolve an entity the caller may see.
///
/// Missing entities and entities owned by someone else are both `NotFound`,
/// so customers cannot probe for other users' ids.
pub(crate) fn visible<T>(
    actor: &Actor,
    entity: Option<T>,
    owner: impl Fn(&T) -> UserId,
    name: &'static str,
    id: impl ToString,
) -> Result<T> {
    match entity {
        Some(entity) if actor.can_view(&owner(&entity)) => Ok(entity),
        _ => Err(CredoraError::not_found(name, id)),
    }
}

/// Like [`visible`], but only the owner may act; an admin gets `Unauthorized`
pub(crate) fn owned<T>(
    actor: &Actor,
    entity: Option<T>,
    owner: impl Fn(&T) -> UserId,
    name: &'static str,
    id: impl ToString,
) -> Result<T> {
    let entity = visible(actor, entity, &owner, name, id)?;
    if owner(&entity) != actor.user_id {
        return Err(CredoraError::unauthorized(format!(
            "only the owner may act on this {}",
            name.to_lowercase()
        )));
    }
    Ok(entity)
}

/// Fail with `Unauthorized` unless the caller may read `user_id`'s data
pub(crate) fn ensure_can_view(actor: &Actor, user_id: &UserId) -> Result<()> {
    if actor.can_view(user_id) {
        Ok(())
    } else {
        Err(CredoraError::unauthorized(format!(
            "{} may not read data of {}",
            actor.user_id, user_id
        )))
    }
}

pub(crate) fn audit(
    actor: &Actor,
    action: &str,
    resource_type: &str,
    resource_id: impl ToString,
    details: serde_json::Value,
) -> AuditRecord {
    AuditRecord::new(actor.user_id, action, resource_type, resource_id, details)
}

/// Non-empty, trimmed free text
pub(crate) fn required_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CredoraError::validation(field, "must not be empty"))
    } else {
        Ok(trimmed.to_string())
    }
}
