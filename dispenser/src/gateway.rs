use async_trait::async_trait;
use futures::stream::BoxStream;
use sp_core::crypto::AccountId32;
use thiserror::Error;

use crate::address::EvmAddress;

/// Decoded runtime dispatch error, in module/section/name form for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFault {
    pub section: String,
    pub name: String,
    pub docs: String,
}

/// Transaction status updates, as reported by the submit-and-watch
/// subscription. Inclusion in a candidate block is the accepted success
/// signal; finality is a bonus, not a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Ready,
    InBlock { hash: String },
    Finalized { hash: String },
    /// The transaction landed but the runtime rejected the dispatch.
    Dispatch(DispatchFault),
    /// Dropped, usurped or invalid: the watch cannot decide the outcome.
    Dropped,
}

pub type TxWatch = BoxStream<'static, TxStatus>;

/// State of an on-chain allowlist entry for a holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowlistStatus {
    /// Registered and still available for minting.
    Available,
    /// Registered and already consumed by a mint.
    Minted,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("chain connection failed: {0}")]
    Connection(String),
    #[error("transaction rejected by node: {0}")]
    Submission(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("malformed storage value: {0}")]
    Codec(String),
}

/// Opaque chain capability: submit a state change and watch it towards
/// inclusion, or query allowlist/balance state directly.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Sign and submit an allowlist registration for `holder` under the
    /// `mint_id` namespace.
    async fn submit_allowlist(
        &self,
        mint_id: u32,
        holder: &EvmAddress,
    ) -> Result<TxWatch, GatewayError>;

    /// Sign and submit a balance transfer of `amount` base units.
    async fn submit_transfer(
        &self,
        recipient: &AccountId32,
        amount: u128,
    ) -> Result<TxWatch, GatewayError>;

    /// Direct storage query of the allowlist namespace.
    async fn allowlist_entry(
        &self,
        mint_id: u32,
        holder: &EvmAddress,
    ) -> Result<Option<AllowlistStatus>, GatewayError>;

    /// Free balance of `who`, in base units.
    async fn free_balance(&self, who: &AccountId32) -> Result<u128, GatewayError>;
}
