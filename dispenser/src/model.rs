use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two state-changing actions the dispenser can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// One-time balance transfer to a qualifying address.
    Drip,
    /// On-chain registration permitting a future minting action.
    Allowlist,
}

/// Requester audit trail carried into every recorded action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterIdentity {
    pub ip: Option<String>,
    pub agent: Option<String>,
}

/// One granted (or administratively seeded) action. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub time: DateTime<Utc>,
    pub kind: ActionKind,
    /// Chain-assigned identifier, when the eligibility source reports one.
    pub token_id: Option<String>,
    pub identity: RequesterIdentity,
    /// Drip amount in base units; `None` for allowlist actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u128>,
    /// Substrate beneficiary of a drip; `None` for allowlist actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beneficiary: Option<String>,
}

impl ActionEvent {
    pub fn allowlist(token_id: Option<String>, identity: RequesterIdentity) -> Self {
        Self {
            time: Utc::now(),
            kind: ActionKind::Allowlist,
            token_id,
            identity,
            amount: None,
            beneficiary: None,
        }
    }

    pub fn drip(
        amount: u128,
        beneficiary: String,
        token_id: Option<String>,
        identity: RequesterIdentity,
    ) -> Self {
        Self {
            time: Utc::now(),
            kind: ActionKind::Drip,
            token_id,
            identity,
            amount: Some(amount),
            beneficiary: Some(beneficiary),
        }
    }
}

/// One record per (token type, address); its `actions` sequence is
/// append-only and, once it holds a grant for an action kind, must never be
/// superseded by a second grant for the same key. That is the at-most-once
/// invariant everything else here protects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub token_type: String,
    pub address: String,
    pub actions: Vec<ActionEvent>,
}

impl ClaimRecord {
    pub fn new(token_type: &str, address: &str) -> Self {
        Self { token_type: token_type.to_owned(), address: address.to_owned(), actions: Vec::new() }
    }

    /// First recorded token id, used to answer repeat requests without
    /// re-querying the chain.
    pub fn token_id(&self) -> Option<&str> {
        self.actions.iter().find_map(|event| event.token_id.as_deref())
    }
}

/// Which partner protocol a customized eligibility check speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerKind {
    /// Plain JSON holder-check endpoint, optionally credentialed.
    Rest,
    /// Paginated GraphQL aggregation with a minimum qualifying count.
    Graphql,
    /// Independent boolean sub-checks OR-ed into a bitmask token id.
    Flags,
}

/// Eligibility strategy tag. Replaces the legacy
/// `isWhitelist`/`isContract`/`isCustomize` boolean triple with one
/// polymorphic selector; [`StrategyKind::from_flags`] preserves the legacy
/// precedence for metadata imported from the old shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Membership in the ledger only, pre-seeded by administrative
    /// bulk-import. No live balance source exists in this mode.
    Whitelist,
    /// `balanceOf` static call against the configured contract endpoint.
    Contract,
    Partner(PartnerKind),
}

impl StrategyKind {
    /// Legacy flag triple, evaluated whitelist first, then contract, then
    /// partner. `None` when no flag is set.
    pub fn from_flags(
        is_whitelist: bool,
        is_contract: bool,
        is_customize: bool,
        partner: PartnerKind,
    ) -> Option<Self> {
        if is_whitelist {
            Some(Self::Whitelist)
        } else if is_contract {
            Some(Self::Contract)
        } else if is_customize {
            Some(Self::Partner(partner))
        } else {
            None
        }
    }
}

/// Strategy-specific parameters. Which fields matter depends on the
/// strategy tag; unused fields stay at their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraMetadata {
    /// JSON-RPC endpoint for contract-strategy `eth_call` queries.
    pub rpc_endpoint: Option<String>,
    /// Contract address for contract-strategy queries.
    pub contract: Option<String>,
    /// Method signature answering the chain-assigned token id.
    pub token_call: String,
    /// Partner endpoint for customized checks.
    pub partner_url: Option<String>,
    /// Shared credential forwarded to the partner, when required.
    pub partner_credential: Option<String>,
    /// GraphQL page size.
    pub page_size: u32,
    /// Minimum qualifying sub-items across pages before eligibility.
    pub min_qualifying: u32,
}

impl Default for ExtraMetadata {
    fn default() -> Self {
        Self {
            rpc_endpoint: None,
            contract: None,
            token_call: "tokenIdOf(address)".to_owned(),
            partner_url: None,
            partner_credential: None,
            page_size: 50,
            min_qualifying: 1,
        }
    }
}

/// Per token type configuration, created and updated by administrative
/// action and read-only to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintMetadata {
    pub token_type: String,
    /// On-chain identifier of this token type's allowlist namespace.
    pub mint_id: u32,
    pub strategy: StrategyKind,
    #[serde(default)]
    pub extra: ExtraMetadata,
}

impl MintMetadata {
    pub fn is_whitelist(&self) -> bool {
        matches!(self.strategy, StrategyKind::Whitelist)
    }
}
