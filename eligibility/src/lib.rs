//! # Dripgate Eligibility
//!
//! One [`EligibilityStrategy`] implementation per eligibility source,
//! selected by the strategy tag in [`MintMetadata`]:
//!
//! - [`contract::ContractBalance`] — `balanceOf` static call over JSON-RPC
//!   `eth_call`.
//! - [`whitelist::WhitelistMembership`] — ledger membership only, seeded by
//!   administrative bulk-import.
//! - [`partner`] — REST holder check, paginated GraphQL aggregation and
//!   composite bit-flag partners.
//!
//! The [`StrategyChecker`] dispatcher folds every strategy failure into
//! "ineligible": an upstream outage must never read as eligible.

pub mod contract;
pub mod partner;
pub mod whitelist;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use dripgate_dispenser::address::EvmAddress;
use dripgate_dispenser::eligibility::{EligibilityCheck, EligibilityResult};
use dripgate_dispenser::ledger::LedgerStore;
use dripgate_dispenser::model::{MintMetadata, PartnerKind, StrategyKind};

pub use contract::ContractBalance;
pub use partner::{FlagComposite, GraphqlAggregation, RestHolderCheck};
pub use whitelist::WhitelistMembership;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("strategy misconfigured: missing {0}")]
    Misconfigured(&'static str),
    #[error("eligibility source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed eligibility payload: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for StrategyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// One eligibility source. Implementations may fail; the dispatcher decides
/// what failure means.
#[async_trait]
pub trait EligibilityStrategy: Send + Sync {
    async fn check(
        &self,
        meta: &MintMetadata,
        holder: &EvmAddress,
    ) -> Result<EligibilityResult, StrategyError>;
}

/// Strategy dispatcher keyed by the [`StrategyKind`] tag in the mint
/// metadata.
pub struct StrategyChecker<L> {
    whitelist: WhitelistMembership<L>,
    contract: ContractBalance,
    rest: RestHolderCheck,
    graphql: GraphqlAggregation,
    flags: FlagComposite,
}

impl<L: LedgerStore + 'static> StrategyChecker<L> {
    pub fn new(client: reqwest::Client, ledger: Arc<L>) -> Self {
        Self {
            whitelist: WhitelistMembership::new(ledger),
            contract: ContractBalance::new(client.clone()),
            rest: RestHolderCheck::new(client.clone()),
            graphql: GraphqlAggregation::new(client.clone()),
            flags: FlagComposite::new(client),
        }
    }

    fn strategy(&self, kind: StrategyKind) -> &dyn EligibilityStrategy {
        match kind {
            StrategyKind::Whitelist => &self.whitelist,
            StrategyKind::Contract => &self.contract,
            StrategyKind::Partner(PartnerKind::Rest) => &self.rest,
            StrategyKind::Partner(PartnerKind::Graphql) => &self.graphql,
            StrategyKind::Partner(PartnerKind::Flags) => &self.flags,
        }
    }
}

#[async_trait]
impl<L: LedgerStore + 'static> EligibilityCheck for StrategyChecker<L> {
    async fn check(&self, meta: &MintMetadata, holder: &EvmAddress) -> EligibilityResult {
        match self.strategy(meta.strategy).check(meta, holder).await {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    token_type = %meta.token_type, holder = %holder,
                    "eligibility check failed, treating as ineligible: {err}"
                );
                EligibilityResult::ineligible()
            }
        }
    }
}
