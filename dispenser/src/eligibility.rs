use async_trait::async_trait;

use crate::address::EvmAddress;
use crate::model::MintMetadata;

/// Transient per-request answer from an eligibility source. Never
/// persisted directly; only folded into an [`crate::model::ActionEvent`]
/// on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibilityResult {
    pub eligible: bool,
    pub token_id: Option<String>,
}

impl EligibilityResult {
    pub fn eligible(token_id: Option<String>) -> Self {
        Self { eligible: true, token_id }
    }

    pub fn ineligible() -> Self {
        Self::default()
    }
}

/// Answers whether `holder` currently qualifies for the token type
/// described by `meta`.
///
/// Infallible at this boundary on purpose: a partner call that throws or
/// returns malformed data must read as ineligible, so an upstream outage
/// can never be conflated with "eligible".
#[async_trait]
pub trait EligibilityCheck: Send + Sync {
    async fn check(&self, meta: &MintMetadata, holder: &EvmAddress) -> EligibilityResult;
}
