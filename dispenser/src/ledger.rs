use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::{ActionEvent, ActionKind, ClaimRecord};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("ledger backend unavailable: {0}")]
    Backend(String),
}

/// Durable record of granted actions, keyed by (token type, address), with
/// one logical collection per action kind.
///
/// `record_action` must be an atomic find-or-create-then-append upsert:
/// concurrent callers for the same key cannot both observe themselves as
/// the creator of the first entry. The returned "created" flag is
/// informational only — correctness never hangs on it. No caching layer
/// sits in front of an implementation; every check is a fresh read.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// True iff a record with at least one event of `kind` exists.
    async fn has_prior(
        &self,
        kind: ActionKind,
        token_type: &str,
        address: &str,
    ) -> Result<bool, LedgerError>;

    /// Full record, used to recover a previously assigned token id without
    /// re-querying the chain.
    async fn prior_record(
        &self,
        kind: ActionKind,
        token_type: &str,
        address: &str,
    ) -> Result<Option<ClaimRecord>, LedgerError>;

    /// True iff any drip record, regardless of token type or holder, names
    /// this beneficiary.
    async fn has_prior_beneficiary(&self, beneficiary: &str) -> Result<bool, LedgerError>;

    /// Atomic upsert-append. Returns whether this call created a brand-new
    /// record.
    async fn record_action(
        &self,
        token_type: &str,
        address: &str,
        event: ActionEvent,
    ) -> Result<bool, LedgerError>;
}

type Key = (String, String);

/// In-process ledger. The per-collection write lock is the atomicity domain
/// for the find-or-create-append upsert; a durable document store slots in
/// behind the same trait in production.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    drips: RwLock<HashMap<Key, ClaimRecord>>,
    allowlists: RwLock<HashMap<Key, ClaimRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, kind: ActionKind) -> &RwLock<HashMap<Key, ClaimRecord>> {
        match kind {
            ActionKind::Drip => &self.drips,
            ActionKind::Allowlist => &self.allowlists,
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn has_prior(
        &self,
        kind: ActionKind,
        token_type: &str,
        address: &str,
    ) -> Result<bool, LedgerError> {
        let key = (token_type.to_owned(), address.to_owned());
        let collection = self.collection(kind).read().await;
        Ok(collection.get(&key).is_some_and(|record| !record.actions.is_empty()))
    }

    async fn prior_record(
        &self,
        kind: ActionKind,
        token_type: &str,
        address: &str,
    ) -> Result<Option<ClaimRecord>, LedgerError> {
        let key = (token_type.to_owned(), address.to_owned());
        let collection = self.collection(kind).read().await;
        Ok(collection.get(&key).filter(|record| !record.actions.is_empty()).cloned())
    }

    async fn has_prior_beneficiary(&self, beneficiary: &str) -> Result<bool, LedgerError> {
        let drips = self.drips.read().await;
        Ok(drips.values().any(|record| {
            record.actions.iter().any(|event| event.beneficiary.as_deref() == Some(beneficiary))
        }))
    }

    async fn record_action(
        &self,
        token_type: &str,
        address: &str,
        event: ActionEvent,
    ) -> Result<bool, LedgerError> {
        let key = (token_type.to_owned(), address.to_owned());
        let mut collection = self.collection(event.kind).write().await;
        let created = !collection.contains_key(&key);
        collection
            .entry(key)
            .or_insert_with(|| ClaimRecord::new(token_type, address))
            .actions
            .push(event);
        Ok(created)
    }
}
