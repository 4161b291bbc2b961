//! # Dripgate Dispenser
//!
//! Core of the token-gated drip / allowlist dispenser: the ordering and
//! idempotency protocol that decides, under concurrent requests and
//! partially-observable distributed state (ledger + chain), whether an
//! address may receive an action, and that grants each address the action
//! at most once despite retries, slow finality and overlapping requests.
//!
//! ## Overview
//!
//! Three collaborators are consumed through contracts defined here:
//!
//! - [`ledger::LedgerStore`] — durable record of "this address already got
//!   this action for this token type", with an atomic find-or-create-append
//!   upsert as the sole arbiter of first-writer-wins book-keeping.
//! - [`gateway::ChainGateway`] — submits state-changing transactions,
//!   reports block inclusion and answers direct allowlist/balance queries.
//! - [`eligibility::EligibilityCheck`] — answers whether an address
//!   currently holds/qualifies for a token type; upstream outages read as
//!   ineligible, never as eligible.
//!
//! The [`orchestrator::Orchestrator`] composes them into the per-request
//! state machine `START → VALIDATED → PRIOR_CHECK → ELIGIBILITY_CHECK →
//! CHAIN_SUBMIT → CONFIRMED → RECORDED`, with early-exit terminal states
//! for invalid addresses, ineligible holders, prior grants and failed
//! grants. Block inclusion (not finality) completes a grant; finality is a
//! bonus signal, never a requirement.

pub mod address;
pub mod eligibility;
pub mod gateway;
pub mod ledger;
pub mod model;
pub mod orchestrator;
pub mod status;

#[cfg(test)]
mod mock;
#[cfg(test)]
mod tests;

pub use address::{AddressError, EvmAddress};
pub use eligibility::{EligibilityCheck, EligibilityResult};
pub use gateway::{AllowlistStatus, ChainGateway, DispatchFault, GatewayError, TxStatus, TxWatch};
pub use ledger::{LedgerError, LedgerStore, MemoryLedger};
pub use model::{ActionEvent, ActionKind, ClaimRecord, MintMetadata, RequesterIdentity};
pub use orchestrator::{Orchestrator, OrchestratorConfig, Outcome};
pub use status::{DEFAULT_TOKEN, DispenseStatus};
