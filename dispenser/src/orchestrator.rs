use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::future;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::address::{EvmAddress, parse_substrate_address};
use crate::eligibility::EligibilityCheck;
use crate::gateway::{ChainGateway, TxStatus, TxWatch};
use crate::ledger::{LedgerError, LedgerStore};
use crate::model::{ActionEvent, ActionKind, MintMetadata, RequesterIdentity};
use crate::status::{DEFAULT_TOKEN, DispenseStatus};

/// Terminal states of the per-request state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `RECORDED`: the action was confirmed in-block this request.
    Granted { token_id: String },
    /// `ALREADY_GRANTED`: idempotent no-op with the previously assigned id.
    AlreadyGranted { token_id: String },
    /// `REJECTED_NO_PRIOR_NO_BALANCE`.
    NotEligible,
    /// `REJECTED_INVALID` for the holder address.
    InvalidAddress,
    /// `REJECTED_INVALID` for the drip recipient.
    InvalidRecipient,
    /// `GRANT_FAILED`: dispatch fault, timeout or collaborator outage.
    Failed,
}

impl Outcome {
    pub fn status(&self, kind: ActionKind) -> DispenseStatus {
        match (self, kind) {
            (Self::Granted { .. }, ActionKind::Allowlist) => DispenseStatus::AllowSuccess,
            (Self::Granted { .. }, ActionKind::Drip) => DispenseStatus::DripSuccess,
            (Self::AlreadyGranted { .. }, ActionKind::Allowlist) => {
                DispenseStatus::PriorAllowObserved
            }
            (Self::AlreadyGranted { .. }, ActionKind::Drip) => DispenseStatus::PriorDripObserved,
            (Self::NotEligible, _) => DispenseStatus::ZeroBalanceObserved,
            (Self::InvalidAddress, _) => DispenseStatus::InvalidEthAddress,
            (Self::InvalidRecipient, _) => DispenseStatus::InvalidSubstrateAddress,
            (Self::Failed, ActionKind::Allowlist) => DispenseStatus::AllowFail,
            (Self::Failed, ActionKind::Drip) => DispenseStatus::DripFail,
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Self::Granted { token_id } | Self::AlreadyGranted { token_id } => token_id,
            _ => DEFAULT_TOKEN,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Drip amount in base units.
    pub drip_amount: u128,
    /// Interval between side-channel confirmation polls.
    pub poll_interval: Duration,
    /// Patience window for inclusion. A request that outlives it returns
    /// `GRANT_FAILED`; re-requesting is safe because the prior check will
    /// find anything that landed in the meantime.
    pub submit_patience: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            drip_amount: 0,
            poll_interval: Duration::from_secs(1),
            submit_patience: Duration::from_secs(120),
        }
    }
}

const GUARD_PRUNE_THRESHOLD: usize = 1024;

/// Per-(kind, token type, address) mutual exclusion for the
/// check-then-submit window. Serializes concurrent first-time claims so
/// two never-seen requests cannot both pass the prior check and both
/// submit; the ledger upsert stays the arbiter of record book-keeping.
#[derive(Debug, Default)]
struct ClaimGuard {
    slots: Mutex<HashMap<(ActionKind, String, String), Arc<Mutex<()>>>>,
}

impl ClaimGuard {
    async fn lock(&self, kind: ActionKind, token_type: &str, address: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().await;
            if slots.len() > GUARD_PRUNE_THRESHOLD {
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            slots
                .entry((kind, token_type.to_owned(), address.to_owned()))
                .or_default()
                .clone()
        };
        slot.lock_owned().await
    }
}

/// Composes ledger, chain gateway and eligibility checker into the
/// at-most-once grant protocol.
pub struct Orchestrator<G, L, E> {
    gateway: Arc<G>,
    ledger: Arc<L>,
    checker: Arc<E>,
    config: OrchestratorConfig,
    guard: ClaimGuard,
}

impl<G, L, E> Orchestrator<G, L, E>
where
    G: ChainGateway,
    L: LedgerStore,
    E: EligibilityCheck,
{
    pub fn new(
        gateway: Arc<G>,
        ledger: Arc<L>,
        checker: Arc<E>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { gateway, ledger, checker, config, guard: ClaimGuard::default() }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Allowlist registration flow.
    pub async fn allowlist(
        &self,
        meta: &MintMetadata,
        raw_holder: &str,
        identity: RequesterIdentity,
    ) -> Outcome {
        // VALIDATED
        let Ok(holder) = EvmAddress::parse(raw_holder) else {
            return Outcome::InvalidAddress;
        };
        let _claim = self.guard.lock(ActionKind::Allowlist, &meta.token_type, holder.as_str()).await;

        // PRIOR_CHECK against the ledger
        let prior = match self
            .ledger
            .prior_record(ActionKind::Allowlist, &meta.token_type, holder.as_str())
            .await
        {
            Ok(prior) => prior,
            Err(err) => {
                error!(token_type = %meta.token_type, holder = %holder, "ledger read failed: {err}");
                return Outcome::Failed;
            }
        };

        if let Some(record) = prior {
            let token_id = record.token_id().unwrap_or(DEFAULT_TOKEN).to_owned();
            if !meta.is_whitelist() {
                // The recorded grant already executed on-chain; answer from
                // the ledger with no further chain interaction.
                return Outcome::AlreadyGranted { token_id };
            }
            // Whitelist two-phase: the ledger entry was written at seed
            // time and is itself eligibility evidence, but the on-chain
            // registration must still happen exactly once.
            return match self.gateway.allowlist_entry(meta.mint_id, &holder).await {
                Ok(Some(_)) => Outcome::AlreadyGranted { token_id },
                Ok(None) => self.submit_allowlist_and_record(meta, &holder, token_id, identity).await,
                Err(err) => {
                    error!(holder = %holder, "allowlist query failed: {err}");
                    Outcome::Failed
                }
            };
        }

        // No ledger prior: consult the chain directly. A chain-present,
        // ledger-absent entry is a reporting gap from an earlier run and is
        // healed here instead of re-submitting.
        match self.gateway.allowlist_entry(meta.mint_id, &holder).await {
            Ok(Some(status)) => {
                let token_id = self
                    .checker
                    .check(meta, &holder)
                    .await
                    .token_id
                    .unwrap_or_else(|| DEFAULT_TOKEN.to_owned());
                info!(
                    token_type = %meta.token_type, holder = %holder, ?status,
                    token = %token_id, "allowlist entry on chain but not in ledger, healing"
                );
                let event = ActionEvent::allowlist(Some(token_id.clone()), identity);
                if let Err(err) =
                    self.ledger.record_action(&meta.token_type, holder.as_str(), event).await
                {
                    error!(holder = %holder, "ledger heal failed: {err}");
                }
                return Outcome::AlreadyGranted { token_id };
            }
            Ok(None) => {}
            Err(err) => {
                error!(holder = %holder, "allowlist query failed: {err}");
                return Outcome::Failed;
            }
        }

        // ELIGIBILITY_CHECK
        let result = self.checker.check(meta, &holder).await;
        if !result.eligible {
            return Outcome::NotEligible;
        }
        let token_id = result.token_id.unwrap_or_else(|| DEFAULT_TOKEN.to_owned());

        self.submit_allowlist_and_record(meta, &holder, token_id, identity).await
    }

    /// Drip flow: one-time balance transfer gated on holder eligibility.
    pub async fn drip(
        &self,
        meta: &MintMetadata,
        raw_holder: &str,
        raw_recipient: &str,
        identity: RequesterIdentity,
    ) -> Outcome {
        // VALIDATED
        let Ok(holder) = EvmAddress::parse(raw_holder) else {
            return Outcome::InvalidAddress;
        };
        let Ok(recipient) = parse_substrate_address(raw_recipient) else {
            return Outcome::InvalidRecipient;
        };
        let _claim = self.guard.lock(ActionKind::Drip, &meta.token_type, holder.as_str()).await;

        // PRIOR_CHECK: either the holder already dripped, or the recipient
        // was already a beneficiary of some other holder's drip.
        let recipient_str = recipient.to_string();
        match self.drip_prior(meta, &holder, &recipient_str).await {
            Ok(Some(token_id)) => return Outcome::AlreadyGranted { token_id },
            Ok(None) => {}
            Err(err) => {
                error!(token_type = %meta.token_type, holder = %holder, "ledger read failed: {err}");
                return Outcome::Failed;
            }
        }

        // ELIGIBILITY_CHECK
        let result = self.checker.check(meta, &holder).await;
        if !result.eligible {
            return Outcome::NotEligible;
        }

        // CHAIN_SUBMIT. The pre-submission balance feeds the side-channel
        // confirmation signal; losing it only disables that signal.
        let amount = self.config.drip_amount;
        let before = match self.gateway.free_balance(&recipient).await {
            Ok(balance) => Some(balance),
            Err(err) => {
                warn!(recipient = %recipient_str, "pre-submission balance read failed: {err}");
                None
            }
        };
        let watch = match self.gateway.submit_transfer(&recipient, amount).await {
            Ok(watch) => Some(watch),
            Err(err) => {
                // A submission exception does not reliably mean the
                // transfer failed to land; fall through to polling.
                warn!(recipient = %recipient_str, "transfer submission errored, polling instead: {err}");
                None
            }
        };

        let gateway = Arc::clone(&self.gateway);
        let recipient_poll = recipient.clone();
        let poll_interval = self.config.poll_interval;
        let confirmed = self
            .await_confirmation(watch, async move {
                let Some(before) = before else { return future::pending().await };
                loop {
                    tokio::time::sleep(poll_interval).await;
                    if let Ok(now) = gateway.free_balance(&recipient_poll).await {
                        if now.saturating_sub(before) == amount && amount > 0 {
                            return true;
                        }
                    }
                }
            })
            .await;
        if !confirmed {
            return Outcome::Failed;
        }

        // RECORDED
        let token_id = result.token_id.unwrap_or_else(|| DEFAULT_TOKEN.to_owned());
        let event = ActionEvent::drip(amount, recipient_str, Some(token_id.clone()), identity);
        if let Err(err) = self.ledger.record_action(&meta.token_type, holder.as_str(), event).await
        {
            // The transfer cannot be rolled back; the next request heals
            // the ledger through the prior/beneficiary checks.
            error!(
                token_type = %meta.token_type, holder = %holder,
                "reporting gap: drip landed on-chain but ledger write failed: {err}"
            );
        }
        info!(token_type = %meta.token_type, holder = %holder, amount, "drip confirmed");
        Outcome::Granted { token_id }
    }

    async fn drip_prior(
        &self,
        meta: &MintMetadata,
        holder: &EvmAddress,
        recipient: &str,
    ) -> Result<Option<String>, LedgerError> {
        let record =
            self.ledger.prior_record(ActionKind::Drip, &meta.token_type, holder.as_str()).await?;
        if let Some(record) = record {
            return Ok(Some(record.token_id().unwrap_or(DEFAULT_TOKEN).to_owned()));
        }
        let beneficiary_seen = self.ledger.has_prior_beneficiary(recipient).await?;
        Ok(beneficiary_seen.then(|| DEFAULT_TOKEN.to_owned()))
    }

    async fn submit_allowlist_and_record(
        &self,
        meta: &MintMetadata,
        holder: &EvmAddress,
        token_id: String,
        identity: RequesterIdentity,
    ) -> Outcome {
        let watch = match self.gateway.submit_allowlist(meta.mint_id, holder).await {
            Ok(watch) => Some(watch),
            Err(err) => {
                warn!(holder = %holder, "allowlist submission errored, polling instead: {err}");
                None
            }
        };

        let gateway = Arc::clone(&self.gateway);
        let mint_id = meta.mint_id;
        let holder_poll = holder.clone();
        let poll_interval = self.config.poll_interval;
        let confirmed = self
            .await_confirmation(watch, async move {
                loop {
                    tokio::time::sleep(poll_interval).await;
                    if let Ok(Some(_)) = gateway.allowlist_entry(mint_id, &holder_poll).await {
                        return true;
                    }
                }
            })
            .await;
        if !confirmed {
            return Outcome::Failed;
        }

        let event = ActionEvent::allowlist(Some(token_id.clone()), identity);
        if let Err(err) = self.ledger.record_action(&meta.token_type, holder.as_str(), event).await
        {
            error!(
                token_type = %meta.token_type, holder = %holder,
                "reporting gap: registration landed on-chain but ledger write failed: {err}"
            );
        }
        info!(token_type = %meta.token_type, holder = %holder, token = %token_id, "allowlist confirmed");
        Outcome::Granted { token_id }
    }

    /// Two independent signals race to complete one state transition: the
    /// submit-and-watch stream and a storage/balance side channel. Either
    /// may confirm; a decoded dispatch fault is a definitive failure; the
    /// patience window bounds everything.
    async fn await_confirmation<S>(&self, watch: Option<TxWatch>, side_channel: S) -> bool
    where
        S: Future<Output = bool> + Send,
    {
        let primary = async {
            let Some(mut watch) = watch else { return future::pending().await };
            loop {
                match watch.next().await {
                    Some(TxStatus::InBlock { hash }) => {
                        info!(%hash, "transaction in block");
                        return true;
                    }
                    Some(TxStatus::Finalized { hash }) => {
                        info!(%hash, "transaction finalized");
                        return true;
                    }
                    Some(TxStatus::Dispatch(fault)) => {
                        error!(
                            "dispatch error: {}.{} - {}",
                            fault.section, fault.name, fault.docs
                        );
                        return false;
                    }
                    Some(TxStatus::Dropped) => {
                        warn!("transaction dropped from the pool, deferring to side channel");
                        return future::pending().await;
                    }
                    Some(_) => {}
                    // Watch closed without a decision; side channel decides.
                    None => return future::pending().await,
                }
            }
        };

        match timeout(self.config.submit_patience, async {
            tokio::select! {
                decided = primary => decided,
                decided = side_channel => decided,
            }
        })
        .await
        {
            Ok(decided) => decided,
            Err(_) => {
                warn!("chain timeout: inclusion not observed within the patience window");
                false
            }
        }
    }
}
