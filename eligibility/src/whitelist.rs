//! Whitelist eligibility: membership in the ledger only. There is no live
//! balance source in this mode; an address qualifies iff an administrative
//! bulk-import seeded it.

use std::sync::Arc;

use async_trait::async_trait;

use dripgate_dispenser::address::EvmAddress;
use dripgate_dispenser::eligibility::EligibilityResult;
use dripgate_dispenser::ledger::LedgerStore;
use dripgate_dispenser::model::{ActionKind, MintMetadata};

use crate::{EligibilityStrategy, StrategyError};

pub struct WhitelistMembership<L> {
    ledger: Arc<L>,
}

impl<L> WhitelistMembership<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<L: LedgerStore + 'static> EligibilityStrategy for WhitelistMembership<L> {
    async fn check(
        &self,
        meta: &MintMetadata,
        holder: &EvmAddress,
    ) -> Result<EligibilityResult, StrategyError> {
        let record = self
            .ledger
            .prior_record(ActionKind::Allowlist, &meta.token_type, holder.as_str())
            .await
            .map_err(|err| StrategyError::Unavailable(err.to_string()))?;
        Ok(match record {
            Some(record) => {
                EligibilityResult::eligible(record.token_id().map(str::to_owned))
            }
            None => EligibilityResult::ineligible(),
        })
    }
}
