use serde::{Deserialize, Serialize};

/// Token id reported when no chain-assigned identifier is known.
pub const DEFAULT_TOKEN: &str = "0x00";

/// Wire-level status vocabulary.
///
/// Every handler response is HTTP 200 carrying one of these strings; callers
/// branch on the string, never on an HTTP error code. No error type crosses
/// the orchestrator boundary — everything resolves to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispenseStatus {
    /// Holder address failed the hex-40 EVM validity check.
    #[serde(rename = "invalid-eth-address")]
    InvalidEthAddress,
    /// Drip recipient failed the ss58/hex substrate validity check.
    #[serde(rename = "invalid-substrate-address")]
    InvalidSubstrateAddress,
    /// No prior grant and the live eligibility check came back negative.
    #[serde(rename = "zero-balance-observed")]
    ZeroBalanceObserved,
    /// Allowlist action already granted; idempotent no-op, not an error.
    #[serde(rename = "prior-allow-observed")]
    PriorAllowObserved,
    /// Drip already granted to this holder or beneficiary.
    #[serde(rename = "prior-drip-observed")]
    PriorDripObserved,
    #[serde(rename = "allow-success")]
    AllowSuccess,
    #[serde(rename = "allow-fail")]
    AllowFail,
    #[serde(rename = "drip-success")]
    DripSuccess,
    #[serde(rename = "drip-fail")]
    DripFail,
    /// No mint metadata is configured for the requested token type.
    #[serde(rename = "unknown-mint-type")]
    UnknownMintType,
}

impl DispenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidEthAddress => "invalid-eth-address",
            Self::InvalidSubstrateAddress => "invalid-substrate-address",
            Self::ZeroBalanceObserved => "zero-balance-observed",
            Self::PriorAllowObserved => "prior-allow-observed",
            Self::PriorDripObserved => "prior-drip-observed",
            Self::AllowSuccess => "allow-success",
            Self::AllowFail => "allow-fail",
            Self::DripSuccess => "drip-success",
            Self::DripFail => "drip-fail",
            Self::UnknownMintType => "unknown-mint-type",
        }
    }
}

impl core::fmt::Display for DispenseStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
