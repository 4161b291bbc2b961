//! Scripted collaborators for orchestrator scenario tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use sp_core::crypto::AccountId32;
use tokio::sync::Mutex;

use crate::address::EvmAddress;
use crate::eligibility::{EligibilityCheck, EligibilityResult};
use crate::gateway::{
    AllowlistStatus, ChainGateway, DispatchFault, GatewayError, TxStatus, TxWatch,
};
use crate::ledger::MemoryLedger;
use crate::model::{ExtraMetadata, MintMetadata, StrategyKind};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};

pub const TEST_MINT_ID: u32 = 7;
pub const DRIP_AMOUNT: u128 = 1_000;

/// How the scripted chain answers a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitBehavior {
    /// Normal path: apply the state change, report `Ready` then `InBlock`.
    InBlock,
    /// Apply the state change but end the watch without a decision, so the
    /// side-channel poll has to confirm.
    Silent,
    /// Report a decoded dispatch fault; no state change happens.
    DispatchFault,
    /// Swallow the transaction entirely: no state change, no updates.
    Lost,
}

pub struct MockGateway {
    pub behavior: SubmitBehavior,
    pub allowlist: Mutex<HashMap<(u32, String), AllowlistStatus>>,
    pub balances: Mutex<HashMap<AccountId32, u128>>,
    pub submissions: AtomicUsize,
    pub queries: AtomicUsize,
}

impl MockGateway {
    pub fn new(behavior: SubmitBehavior) -> Self {
        Self {
            behavior,
            allowlist: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            submissions: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub async fn seed_allowlist(&self, mint_id: u32, holder: &str, status: AllowlistStatus) {
        self.allowlist.lock().await.insert((mint_id, holder.to_owned()), status);
    }

    fn watch(&self) -> TxWatch {
        match self.behavior {
            SubmitBehavior::InBlock => stream::iter(vec![
                TxStatus::Ready,
                TxStatus::InBlock { hash: "0xb10c".to_owned() },
            ])
            .boxed(),
            SubmitBehavior::Silent | SubmitBehavior::Lost => {
                stream::iter(Vec::<TxStatus>::new()).boxed()
            }
            SubmitBehavior::DispatchFault => stream::iter(vec![TxStatus::Dispatch(DispatchFault {
                section: "allowlist".to_owned(),
                name: "AlreadyRegistered".to_owned(),
                docs: "the holder is already registered".to_owned(),
            })])
            .boxed(),
        }
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn submit_allowlist(
        &self,
        mint_id: u32,
        holder: &EvmAddress,
    ) -> Result<TxWatch, GatewayError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if !matches!(self.behavior, SubmitBehavior::DispatchFault | SubmitBehavior::Lost) {
            self.allowlist
                .lock()
                .await
                .insert((mint_id, holder.as_str().to_owned()), AllowlistStatus::Available);
        }
        Ok(self.watch())
    }

    async fn submit_transfer(
        &self,
        recipient: &AccountId32,
        amount: u128,
    ) -> Result<TxWatch, GatewayError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if !matches!(self.behavior, SubmitBehavior::DispatchFault | SubmitBehavior::Lost) {
            *self.balances.lock().await.entry(recipient.clone()).or_insert(0) += amount;
        }
        Ok(self.watch())
    }

    async fn allowlist_entry(
        &self,
        mint_id: u32,
        holder: &EvmAddress,
    ) -> Result<Option<AllowlistStatus>, GatewayError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.allowlist.lock().await.get(&(mint_id, holder.as_str().to_owned())).copied())
    }

    async fn free_balance(&self, who: &AccountId32) -> Result<u128, GatewayError> {
        Ok(self.balances.lock().await.get(who).copied().unwrap_or(0))
    }
}

pub struct MockChecker {
    pub result: Mutex<EligibilityResult>,
    pub calls: AtomicUsize,
}

impl MockChecker {
    pub fn eligible(token_id: &str) -> Self {
        Self {
            result: Mutex::new(EligibilityResult::eligible(Some(token_id.to_owned()))),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn ineligible() -> Self {
        Self { result: Mutex::new(EligibilityResult::ineligible()), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EligibilityCheck for MockChecker {
    async fn check(&self, _meta: &MintMetadata, _holder: &EvmAddress) -> EligibilityResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.lock().await.clone()
    }
}

pub type TestOrchestrator = Orchestrator<MockGateway, MemoryLedger, MockChecker>;

pub struct TestHarness {
    pub gateway: Arc<MockGateway>,
    pub ledger: Arc<MemoryLedger>,
    pub checker: Arc<MockChecker>,
    pub orchestrator: Arc<TestOrchestrator>,
}

pub fn new_harness(behavior: SubmitBehavior, checker: MockChecker) -> TestHarness {
    let gateway = Arc::new(MockGateway::new(behavior));
    let ledger = Arc::new(MemoryLedger::new());
    let checker = Arc::new(checker);
    let config = OrchestratorConfig {
        drip_amount: DRIP_AMOUNT,
        poll_interval: std::time::Duration::from_millis(10),
        submit_patience: std::time::Duration::from_millis(500),
    };
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&gateway),
        Arc::clone(&ledger),
        Arc::clone(&checker),
        config,
    ));
    TestHarness { gateway, ledger, checker, orchestrator }
}

pub fn contract_meta(token_type: &str) -> MintMetadata {
    MintMetadata {
        token_type: token_type.to_owned(),
        mint_id: TEST_MINT_ID,
        strategy: StrategyKind::Contract,
        extra: ExtraMetadata::default(),
    }
}

pub fn whitelist_meta(token_type: &str) -> MintMetadata {
    MintMetadata {
        token_type: token_type.to_owned(),
        mint_id: TEST_MINT_ID,
        strategy: StrategyKind::Whitelist,
        extra: ExtraMetadata::default(),
    }
}
