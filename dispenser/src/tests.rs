use sp_core::crypto::{AccountId32, Ss58Codec};

use crate::mock::{
    DRIP_AMOUNT, MockChecker, SubmitBehavior, TEST_MINT_ID, contract_meta, new_harness,
    whitelist_meta,
};
use crate::model::{ActionEvent, ActionKind, PartnerKind, RequesterIdentity, StrategyKind};
use crate::orchestrator::Outcome;
use crate::status::DispenseStatus;
use crate::{AllowlistStatus, ChainGateway, DEFAULT_TOKEN, LedgerStore};

const HOLDER: &str = "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd";
const OTHER_HOLDER: &str = "0x1111111111111111111111111111111111111111";

fn identity() -> RequesterIdentity {
    RequesterIdentity { ip: Some("203.0.113.7".to_owned()), agent: Some("test-agent".to_owned()) }
}

fn recipient() -> String {
    AccountId32::from([9u8; 32]).to_ss58check()
}

#[tokio::test]
async fn fresh_allowlist_claim_works() {
    let harness = new_harness(SubmitBehavior::InBlock, MockChecker::eligible("0x1f"));
    let meta = contract_meta("BAB");

    // Never-seen holder with a nonzero balance: submit, record, succeed.
    let outcome = harness.orchestrator.allowlist(&meta, HOLDER, identity()).await;
    assert_eq!(outcome, Outcome::Granted { token_id: "0x1f".to_owned() });
    assert_eq!(outcome.status(ActionKind::Allowlist), DispenseStatus::AllowSuccess);
    assert_eq!(harness.gateway.submissions(), 1);

    // The grant is in the ledger with the chain-assigned token id.
    let record = harness
        .ledger
        .prior_record(ActionKind::Allowlist, "BAB", HOLDER)
        .await
        .unwrap()
        .expect("record created");
    assert_eq!(record.token_id(), Some("0x1f"));
    assert_eq!(record.actions.len(), 1);
}

#[tokio::test]
async fn repeat_request_short_circuits_without_chain_access() {
    let harness = new_harness(SubmitBehavior::InBlock, MockChecker::eligible("0x1f"));
    let meta = contract_meta("BAB");

    let first = harness.orchestrator.allowlist(&meta, HOLDER, identity()).await;
    assert_eq!(first, Outcome::Granted { token_id: "0x1f".to_owned() });
    let queries_after_first = harness.gateway.queries();

    // Second request answers from the ledger: same token id, no further
    // submission, no further chain queries, no second eligibility check.
    let second = harness.orchestrator.allowlist(&meta, HOLDER, identity()).await;
    assert_eq!(second, Outcome::AlreadyGranted { token_id: "0x1f".to_owned() });
    assert_eq!(second.status(ActionKind::Allowlist), DispenseStatus::PriorAllowObserved);
    assert_eq!(harness.gateway.submissions(), 1);
    assert_eq!(harness.gateway.queries(), queries_after_first);
    assert_eq!(harness.checker.calls(), 1);
}

#[tokio::test]
async fn zero_balance_rejection_is_stable() {
    let harness = new_harness(SubmitBehavior::InBlock, MockChecker::ineligible());
    let meta = contract_meta("BAB");

    for _ in 0..3 {
        let outcome = harness.orchestrator.allowlist(&meta, HOLDER, identity()).await;
        assert_eq!(outcome, Outcome::NotEligible);
        assert_eq!(outcome.status(ActionKind::Allowlist), DispenseStatus::ZeroBalanceObserved);
    }
    assert_eq!(harness.gateway.submissions(), 0);
    assert!(!harness.ledger.has_prior(ActionKind::Allowlist, "BAB", HOLDER).await.unwrap());
}

#[tokio::test]
async fn invalid_address_rejected_without_side_effects() {
    let harness = new_harness(SubmitBehavior::InBlock, MockChecker::eligible("0x1f"));
    let meta = contract_meta("BAB");

    for raw in ["xyz", "0xabc", "0xabcdefabcdefabcdefabcdefabcdefabcdefabcg", ""] {
        let outcome = harness.orchestrator.allowlist(&meta, raw, identity()).await;
        assert_eq!(outcome, Outcome::InvalidAddress);
        assert_eq!(outcome.status(ActionKind::Allowlist), DispenseStatus::InvalidEthAddress);
        assert_eq!(outcome.token(), DEFAULT_TOKEN);
    }

    // Neither the store nor the chain was touched.
    assert_eq!(harness.gateway.submissions(), 0);
    assert_eq!(harness.gateway.queries(), 0);
    assert_eq!(harness.checker.calls(), 0);
}

#[tokio::test]
async fn concurrent_first_claims_grant_at_most_once() {
    let harness = new_harness(SubmitBehavior::InBlock, MockChecker::eligible("0x1f"));
    let meta = contract_meta("BAB");

    // Two near-simultaneous requests for a never-before-seen address.
    let a = {
        let orchestrator = harness.orchestrator.clone();
        let meta = meta.clone();
        tokio::spawn(async move { orchestrator.allowlist(&meta, HOLDER, identity()).await })
    };
    let b = {
        let orchestrator = harness.orchestrator.clone();
        let meta = meta.clone();
        tokio::spawn(async move { orchestrator.allowlist(&meta, HOLDER, identity()).await })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    // Exactly one submission landed; the loser observed the prior grant.
    assert_eq!(harness.gateway.submissions(), 1);
    let granted = [&a, &b].iter().filter(|o| matches!(o, Outcome::Granted { .. })).count();
    let prior = [&a, &b].iter().filter(|o| matches!(o, Outcome::AlreadyGranted { .. })).count();
    assert_eq!((granted, prior), (1, 1));
    assert_eq!(a.token(), b.token());

    // And the ledger holds exactly one granting event.
    let record =
        harness.ledger.prior_record(ActionKind::Allowlist, "BAB", HOLDER).await.unwrap().unwrap();
    assert_eq!(record.actions.len(), 1);
}

#[tokio::test]
async fn whitelist_two_phase_works() {
    let harness = new_harness(SubmitBehavior::InBlock, MockChecker::eligible("0x0"));
    let meta = whitelist_meta("babwhitelist");

    // Administrative bulk-seed wrote the ledger; nothing is on chain yet.
    harness
        .ledger
        .record_action("babwhitelist", HOLDER, ActionEvent::allowlist(None, identity()))
        .await
        .unwrap();
    assert!(
        harness
            .gateway
            .allowlist_entry(TEST_MINT_ID, &crate::EvmAddress::parse(HOLDER).unwrap())
            .await
            .unwrap()
            .is_none()
    );

    // First live request performs the registration exactly once.
    let first = harness.orchestrator.allowlist(&meta, HOLDER, identity()).await;
    assert!(matches!(first, Outcome::Granted { .. }));
    assert_eq!(harness.gateway.submissions(), 1);

    // Subsequent requests short-circuit without re-submitting.
    let second = harness.orchestrator.allowlist(&meta, HOLDER, identity()).await;
    assert!(matches!(second, Outcome::AlreadyGranted { .. }));
    assert_eq!(harness.gateway.submissions(), 1);
}

#[tokio::test]
async fn whitelist_rejects_unseeded_address() {
    // Whitelist mode has no live balance path: an unseeded address is
    // ineligible no matter what any checker would say.
    let harness = new_harness(SubmitBehavior::InBlock, MockChecker::ineligible());
    let meta = whitelist_meta("babwhitelist");

    let outcome = harness.orchestrator.allowlist(&meta, HOLDER, identity()).await;
    assert_eq!(outcome, Outcome::NotEligible);
    assert_eq!(harness.gateway.submissions(), 0);
}

#[tokio::test]
async fn onchain_entry_heals_missing_ledger_record() {
    let harness = new_harness(SubmitBehavior::InBlock, MockChecker::eligible("0x2a"));
    let meta = contract_meta("BAB");

    // Grant landed in an earlier run but the ledger write was lost.
    harness.gateway.seed_allowlist(TEST_MINT_ID, HOLDER, AllowlistStatus::Available).await;

    let outcome = harness.orchestrator.allowlist(&meta, HOLDER, identity()).await;
    assert_eq!(outcome, Outcome::AlreadyGranted { token_id: "0x2a".to_owned() });
    // Healed, not re-submitted.
    assert_eq!(harness.gateway.submissions(), 0);
    assert!(harness.ledger.has_prior(ActionKind::Allowlist, "BAB", HOLDER).await.unwrap());
}

#[tokio::test]
async fn minted_entry_reads_as_prior_grant() {
    let harness = new_harness(SubmitBehavior::InBlock, MockChecker::eligible("0x2a"));
    let meta = contract_meta("BAB");

    // The registration was consumed by a mint in an earlier run; that is
    // still a prior grant, not a fresh failure.
    harness.gateway.seed_allowlist(TEST_MINT_ID, HOLDER, AllowlistStatus::Minted).await;

    let outcome = harness.orchestrator.allowlist(&meta, HOLDER, identity()).await;
    assert_eq!(outcome, Outcome::AlreadyGranted { token_id: "0x2a".to_owned() });
    assert_eq!(outcome.status(ActionKind::Allowlist), DispenseStatus::PriorAllowObserved);
    assert_eq!(harness.gateway.submissions(), 0);
    assert!(harness.ledger.has_prior(ActionKind::Allowlist, "BAB", HOLDER).await.unwrap());
}

#[tokio::test]
async fn dispatch_fault_fails_the_grant() {
    let harness = new_harness(SubmitBehavior::DispatchFault, MockChecker::eligible("0x1f"));
    let meta = contract_meta("BAB");

    let outcome = harness.orchestrator.allowlist(&meta, HOLDER, identity()).await;
    assert_eq!(outcome, Outcome::Failed);
    assert_eq!(outcome.status(ActionKind::Allowlist), DispenseStatus::AllowFail);
    assert!(!harness.ledger.has_prior(ActionKind::Allowlist, "BAB", HOLDER).await.unwrap());
}

#[tokio::test]
async fn silent_watch_confirms_through_storage_poll() {
    // The watch stream ends without a decision; the storage side channel
    // must complete the state machine on its own.
    let harness = new_harness(SubmitBehavior::Silent, MockChecker::eligible("0x1f"));
    let meta = contract_meta("BAB");

    let outcome = harness.orchestrator.allowlist(&meta, HOLDER, identity()).await;
    assert_eq!(outcome, Outcome::Granted { token_id: "0x1f".to_owned() });
    assert!(harness.ledger.has_prior(ActionKind::Allowlist, "BAB", HOLDER).await.unwrap());
}

#[tokio::test]
async fn drip_works_and_repeats_observe_prior() {
    let harness = new_harness(SubmitBehavior::InBlock, MockChecker::eligible("0x1f"));
    let meta = contract_meta("BAB");

    let outcome = harness.orchestrator.drip(&meta, HOLDER, &recipient(), identity()).await;
    assert_eq!(outcome, Outcome::Granted { token_id: "0x1f".to_owned() });
    assert_eq!(outcome.status(ActionKind::Drip), DispenseStatus::DripSuccess);

    let record =
        harness.ledger.prior_record(ActionKind::Drip, "BAB", HOLDER).await.unwrap().unwrap();
    assert_eq!(record.actions[0].amount, Some(DRIP_AMOUNT));
    assert_eq!(record.actions[0].beneficiary.as_deref(), Some(recipient().as_str()));

    let again = harness.orchestrator.drip(&meta, HOLDER, &recipient(), identity()).await;
    assert_eq!(again, Outcome::AlreadyGranted { token_id: "0x1f".to_owned() });
    assert_eq!(again.status(ActionKind::Drip), DispenseStatus::PriorDripObserved);
    assert_eq!(harness.gateway.submissions(), 1);
}

#[tokio::test]
async fn drip_balance_delta_confirms_without_callback() {
    // No status callback arrives; the observed balance delta equal to the
    // drip amount is an equally valid confirmation signal.
    let harness = new_harness(SubmitBehavior::Silent, MockChecker::eligible("0x1f"));
    let meta = contract_meta("BAB");

    let outcome = harness.orchestrator.drip(&meta, HOLDER, &recipient(), identity()).await;
    assert_eq!(outcome, Outcome::Granted { token_id: "0x1f".to_owned() });
    assert!(harness.ledger.has_prior(ActionKind::Drip, "BAB", HOLDER).await.unwrap());
}

#[tokio::test]
async fn drip_blocks_repeat_beneficiary_across_holders() {
    let harness = new_harness(SubmitBehavior::InBlock, MockChecker::eligible("0x1f"));
    let meta = contract_meta("BAB");

    let first = harness.orchestrator.drip(&meta, HOLDER, &recipient(), identity()).await;
    assert!(matches!(first, Outcome::Granted { .. }));

    // A different eligible holder naming the same beneficiary is a prior.
    let second = harness.orchestrator.drip(&meta, OTHER_HOLDER, &recipient(), identity()).await;
    assert!(matches!(second, Outcome::AlreadyGranted { .. }));
    assert_eq!(harness.gateway.submissions(), 1);
}

#[tokio::test]
async fn drip_invalid_recipient_is_rejected() {
    let harness = new_harness(SubmitBehavior::InBlock, MockChecker::eligible("0x1f"));
    let meta = contract_meta("BAB");

    let outcome = harness.orchestrator.drip(&meta, HOLDER, "not-an-address", identity()).await;
    assert_eq!(outcome, Outcome::InvalidRecipient);
    assert_eq!(outcome.status(ActionKind::Drip), DispenseStatus::InvalidSubstrateAddress);
    assert_eq!(harness.gateway.submissions(), 0);
}

#[tokio::test]
async fn lost_transaction_times_out_as_failed() {
    let harness = new_harness(SubmitBehavior::Lost, MockChecker::eligible("0x1f"));
    let meta = contract_meta("BAB");

    let outcome = harness.orchestrator.drip(&meta, HOLDER, &recipient(), identity()).await;
    assert_eq!(outcome, Outcome::Failed);
    // Nothing recorded; a later re-request starts clean.
    assert!(!harness.ledger.has_prior(ActionKind::Drip, "BAB", HOLDER).await.unwrap());
}

#[test]
fn evm_address_parsing_normalizes() {
    let mixed = "0xABCDEFabcdefABCDEFabcdefabcdefABCDEFabcd";
    let parsed = crate::EvmAddress::parse(mixed).unwrap();
    assert_eq!(parsed.as_str(), "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd");
    // Bare form is accepted and prefixed.
    let bare = crate::EvmAddress::parse("abcdefabcdefabcdefabcdefabcdefabcdefabcd").unwrap();
    assert_eq!(parsed, bare);
    assert_eq!(parsed.to_bytes()[0], 0xab);

    assert!(crate::EvmAddress::parse("0xabc").is_err());
    assert!(crate::EvmAddress::parse("0xabcdefabcdefabcdefabcdefabcdefabcdefabcdZZ").is_err());
}

#[test]
fn substrate_address_parsing_accepts_ss58_and_hex() {
    let account = AccountId32::from([3u8; 32]);
    assert_eq!(
        crate::address::parse_substrate_address(&account.to_ss58check()).unwrap(),
        account
    );
    let hex = format!("0x{}", "03".repeat(32));
    assert_eq!(crate::address::parse_substrate_address(&hex).unwrap(), account);
    assert!(crate::address::parse_substrate_address("dmvSXhJWeJEKT!!!").is_err());
    assert!(crate::address::parse_substrate_address("0x0303").is_err());
}

#[test]
fn strategy_flags_keep_legacy_precedence() {
    use StrategyKind::*;
    // Whitelist wins over everything, then contract, then partner.
    assert_eq!(StrategyKind::from_flags(true, true, true, PartnerKind::Rest), Some(Whitelist));
    assert_eq!(StrategyKind::from_flags(false, true, true, PartnerKind::Rest), Some(Contract));
    assert_eq!(
        StrategyKind::from_flags(false, false, true, PartnerKind::Graphql),
        Some(Partner(PartnerKind::Graphql))
    );
    assert_eq!(StrategyKind::from_flags(false, false, false, PartnerKind::Rest), None);
}

#[tokio::test]
async fn memory_ledger_upsert_reports_creation_once() {
    let ledger = crate::MemoryLedger::new();
    let created =
        ledger.record_action("BAB", HOLDER, ActionEvent::allowlist(None, identity())).await.unwrap();
    assert!(created);
    let created = ledger
        .record_action("BAB", HOLDER, ActionEvent::allowlist(Some("0x1".into()), identity()))
        .await
        .unwrap();
    assert!(!created);

    let record = ledger.prior_record(ActionKind::Allowlist, "BAB", HOLDER).await.unwrap().unwrap();
    assert_eq!(record.actions.len(), 2);
    // Drip and allowlist collections are separate.
    assert!(!ledger.has_prior(ActionKind::Drip, "BAB", HOLDER).await.unwrap());
}
