//! Substrate RPC gateway. One websocket client is shared across requests,
//! rebuilt lazily after a disconnect; submissions go through the
//! author submit-and-watch subscription and storage reads through
//! `state_getStorage`.

use std::sync::Arc;

use async_trait::async_trait;
use codec::Decode;
use futures::StreamExt;
use jsonrpsee::core::client::{ClientT, Subscription, SubscriptionClientT};
use jsonrpsee::rpc_params;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use serde_json::Value;
use sp_core::crypto::{AccountId32, Ss58Codec};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, warn};

use dripgate_dispenser::address::EvmAddress;
use dripgate_dispenser::gateway::{
    AllowlistStatus, ChainGateway, DispatchFault, GatewayError, TxStatus, TxWatch,
};

use crate::config::ChainConfig;
use crate::tx::{
    self, AccountInfo, AllowlistEntry, RuntimeEnv, Signer, account_storage_key,
    allowlist_storage_key, events_storage_key,
};

/// Lazily connected websocket client. Every caller goes through [`get`];
/// a client that has lost its connection is replaced on the next call.
pub struct SharedRpcClient {
    endpoint: String,
    slot: RwLock<Option<Arc<WsClient>>>,
}

impl SharedRpcClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), slot: RwLock::new(None) }
    }

    pub async fn get(&self) -> Result<Arc<WsClient>, GatewayError> {
        if let Some(client) = self.slot.read().await.as_ref()
            && client.is_connected()
        {
            return Ok(client.clone());
        }
        let mut slot = self.slot.write().await;
        if let Some(client) = slot.as_ref()
            && client.is_connected()
        {
            return Ok(client.clone());
        }
        debug!(endpoint = %self.endpoint, "connecting rpc client");
        let client = WsClientBuilder::default()
            .build(&self.endpoint)
            .await
            .map_err(|err| GatewayError::Connection(err.to_string()))?;
        let client = Arc::new(client);
        *slot = Some(client.clone());
        Ok(client)
    }
}

/// `System::ExtrinsicFailed` record for one extrinsic in the raw
/// `System.Events` bytes. Metadata-free on purpose: the record prefix
/// (`Phase::ApplyExtrinsic` tag, extrinsic index, System pallet index 0,
/// `ExtrinsicFailed` variant 1) is a fixed 7-byte shape and the
/// `DispatchError` behind it decodes without type information.
pub fn find_extrinsic_fault(events: &[u8], extrinsic_index: u32) -> Option<DispatchFault> {
    let mut needle = Vec::with_capacity(7);
    needle.push(0u8); // Phase::ApplyExtrinsic
    needle.extend_from_slice(&extrinsic_index.to_le_bytes());
    needle.push(0u8); // System pallet
    needle.push(1u8); // ExtrinsicFailed
    let at = events.windows(needle.len()).position(|window| window == needle)?;
    Some(decode_dispatch_error(&events[at + needle.len()..]))
}

fn decode_dispatch_error(raw: &[u8]) -> DispatchFault {
    let fault = |section: &str, name: String| DispatchFault {
        section: section.to_owned(),
        name,
        docs: "extrinsic included but its dispatch failed".to_owned(),
    };
    match raw.first() {
        // DispatchError::Module { index, error: [u8; 4] }
        Some(3) if raw.len() >= 6 => DispatchFault {
            section: format!("module {}", raw[1]),
            name: format!("error {}", raw[2]),
            docs: "extrinsic included but its dispatch failed".to_owned(),
        },
        Some(0) => fault("runtime", "Other".to_owned()),
        Some(1) => fault("runtime", "CannotLookup".to_owned()),
        Some(2) => fault("runtime", "BadOrigin".to_owned()),
        Some(tag) => fault("runtime", format!("error tag {tag}")),
        None => fault("runtime", "unknown".to_owned()),
    }
}

/// Index of one submitted extrinsic inside a `chain_getBlock` answer, by
/// byte-for-byte comparison with the block body.
pub fn extrinsic_index(block: &Value, extrinsic: &str) -> Option<u32> {
    block
        .pointer("/block/extrinsics")?
        .as_array()?
        .iter()
        .position(|entry| entry.as_str().is_some_and(|hex| hex.eq_ignore_ascii_case(extrinsic)))
        .map(|position| position as u32)
}

async fn dispatch_fault_at(
    client: &WsClient,
    block_hash: &str,
    extrinsic: &str,
) -> Result<Option<DispatchFault>, GatewayError> {
    let block: Value = client
        .request("chain_getBlock", rpc_params![block_hash])
        .await
        .map_err(|err| GatewayError::Query(err.to_string()))?;
    let Some(index) = extrinsic_index(&block, extrinsic) else {
        return Err(GatewayError::Query(format!("extrinsic not found in block {block_hash}")));
    };
    let raw: Option<String> = client
        .request("state_getStorage", rpc_params![events_storage_key(), block_hash])
        .await
        .map_err(|err| GatewayError::Query(err.to_string()))?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    Ok(find_extrinsic_fault(&decode_hex(&raw)?, index))
}

fn included(hash: String, finalized: bool) -> TxStatus {
    if finalized { TxStatus::Finalized { hash } } else { TxStatus::InBlock { hash } }
}

/// Inclusion alone does not make a grant: the block's events decide
/// whether the dispatch succeeded.
async fn inspect_inclusion(
    client: Arc<WsClient>,
    extrinsic: &str,
    hash: String,
    finalized: bool,
) -> TxStatus {
    match dispatch_fault_at(&client, &hash, extrinsic).await {
        Ok(Some(fault)) => TxStatus::Dispatch(fault),
        Ok(None) => included(hash, finalized),
        Err(err) => {
            // Inclusion is real even when the events read flakes; the
            // orchestrator's side checks still stand between a phantom
            // success and the ledger.
            warn!(error = %err, "could not inspect included extrinsic");
            included(hash, finalized)
        }
    }
}

/// Map one raw watch update onto the gateway vocabulary. Broadcast and
/// queueing noise is skipped; everything the node gives up on collapses
/// into `Dropped` and leaves the decision to the side channel.
pub fn decode_status(raw: &Value) -> Option<TxStatus> {
    if let Some(tag) = raw.as_str() {
        return match tag {
            "ready" => Some(TxStatus::Ready),
            "future" => None,
            "dropped" | "invalid" => Some(TxStatus::Dropped),
            _ => None,
        };
    }
    let object = raw.as_object()?;
    if let Some(hash) = object.get("inBlock").and_then(Value::as_str) {
        return Some(TxStatus::InBlock { hash: hash.to_owned() });
    }
    if let Some(hash) = object.get("finalized").and_then(Value::as_str) {
        return Some(TxStatus::Finalized { hash: hash.to_owned() });
    }
    if ["usurped", "finalityTimeout", "retracted", "dropped", "invalid"]
        .iter()
        .any(|tag| object.contains_key(*tag))
    {
        return Some(TxStatus::Dropped);
    }
    None
}

/// [`ChainGateway`] over a live node.
pub struct RpcChainGateway {
    rpc: SharedRpcClient,
    signer: Signer,
    chain: ChainConfig,
    env: OnceCell<RuntimeEnv>,
}

impl RpcChainGateway {
    pub fn new(rpc: SharedRpcClient, signer: Signer, chain: ChainConfig) -> Self {
        Self { rpc, signer, chain, env: OnceCell::new() }
    }

    /// Runtime constants the signed payload commits to, fetched once.
    async fn runtime_env(&self) -> Result<&RuntimeEnv, GatewayError> {
        self.env
            .get_or_try_init(|| async {
                let client = self.rpc.get().await?;
                let version: Value = client
                    .request("state_getRuntimeVersion", rpc_params![])
                    .await
                    .map_err(|err| GatewayError::Query(err.to_string()))?;
                let spec_version = version
                    .get("specVersion")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| GatewayError::Codec("runtime version".to_owned()))?;
                let transaction_version = version
                    .get("transactionVersion")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| GatewayError::Codec("runtime version".to_owned()))?;
                let genesis: String = client
                    .request("chain_getBlockHash", rpc_params![0u32])
                    .await
                    .map_err(|err| GatewayError::Query(err.to_string()))?;
                let genesis_hash: [u8; 32] = decode_hex(&genesis)?
                    .try_into()
                    .map_err(|_| GatewayError::Codec("genesis hash".to_owned()))?;
                Ok(RuntimeEnv {
                    spec_version: spec_version as u32,
                    transaction_version: transaction_version as u32,
                    genesis_hash,
                })
            })
            .await
    }

    async fn storage(&self, key: &str) -> Result<Option<Vec<u8>>, GatewayError> {
        let client = self.rpc.get().await?;
        let raw: Option<String> = client
            .request("state_getStorage", rpc_params![key])
            .await
            .map_err(|err| GatewayError::Query(err.to_string()))?;
        raw.map(|hex| decode_hex(&hex)).transpose()
    }

    async fn next_nonce(&self) -> Result<u32, GatewayError> {
        let client = self.rpc.get().await?;
        client
            .request("system_accountNextIndex", rpc_params![self.signer.account().to_ss58check()])
            .await
            .map_err(|err| GatewayError::Query(err.to_string()))
    }

    /// Sign, submit and hand back the watch subscription as a status stream.
    async fn submit(&self, call: Vec<u8>) -> Result<TxWatch, GatewayError> {
        let env = self.runtime_env().await?.clone();
        let nonce = self.next_nonce().await?;
        let extrinsic = tx::build_signed(&self.signer, &env, nonce, &call);

        let client = self.rpc.get().await?;
        let extrinsic_hex = encode_hex(&extrinsic);
        let subscription: Subscription<Value> = client
            .subscribe(
                "author_submitAndWatchExtrinsic",
                rpc_params![extrinsic_hex.clone()],
                "author_unwatchExtrinsic",
            )
            .await
            .map_err(|err| GatewayError::Submission(err.to_string()))?;

        let watch = subscription
            .filter_map(move |update| {
                let client = client.clone();
                let extrinsic_hex = extrinsic_hex.clone();
                async move {
                    match update {
                        Ok(raw) => match decode_status(&raw) {
                            Some(TxStatus::InBlock { hash }) => {
                                Some(inspect_inclusion(client, &extrinsic_hex, hash, false).await)
                            }
                            Some(TxStatus::Finalized { hash }) => {
                                Some(inspect_inclusion(client, &extrinsic_hex, hash, true).await)
                            }
                            other => other,
                        },
                        Err(err) => {
                            warn!(error = %err, "watch subscription broke");
                            Some(TxStatus::Dropped)
                        }
                    }
                }
            })
            .boxed();
        Ok(watch)
    }
}

#[async_trait]
impl ChainGateway for RpcChainGateway {
    async fn submit_allowlist(
        &self,
        mint_id: u32,
        holder: &EvmAddress,
    ) -> Result<TxWatch, GatewayError> {
        let call = tx::allowlist_call(self.chain.allowlist_call_index, mint_id, holder.to_bytes());
        self.submit(call).await
    }

    async fn submit_transfer(
        &self,
        recipient: &AccountId32,
        amount: u128,
    ) -> Result<TxWatch, GatewayError> {
        let call = tx::transfer_call(self.chain.transfer_call_index, recipient, amount);
        self.submit(call).await
    }

    async fn allowlist_entry(
        &self,
        mint_id: u32,
        holder: &EvmAddress,
    ) -> Result<Option<AllowlistStatus>, GatewayError> {
        let key = allowlist_storage_key(
            &self.chain.allowlist_pallet,
            &self.chain.allowlist_storage,
            mint_id,
            holder.to_bytes(),
        );
        let Some(raw) = self.storage(&key).await? else {
            return Ok(None);
        };
        let entry = AllowlistEntry::decode(&mut &raw[..])
            .map_err(|err| GatewayError::Codec(err.to_string()))?;
        Ok(Some(match entry {
            AllowlistEntry::Available => AllowlistStatus::Available,
            AllowlistEntry::AlreadyMinted(_) => AllowlistStatus::Minted,
        }))
    }

    async fn free_balance(&self, who: &AccountId32) -> Result<u128, GatewayError> {
        let Some(raw) = self.storage(&account_storage_key(who)).await? else {
            // No storage entry yet means an untouched account.
            return Ok(0);
        };
        let info = AccountInfo::decode(&mut &raw[..])
            .map_err(|err| GatewayError::Codec(err.to_string()))?;
        Ok(info.data.free)
    }
}

fn encode_hex(raw: &[u8]) -> String {
    let mut out = String::with_capacity(2 + raw.len() * 2);
    out.push_str("0x");
    for byte in raw {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn decode_hex(raw: &str) -> Result<Vec<u8>, GatewayError> {
    let bare = raw.strip_prefix("0x").unwrap_or(raw);
    if bare.len() % 2 != 0 {
        return Err(GatewayError::Codec(format!("odd-length hex: {raw}")));
    }
    (0..bare.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&bare[i..i + 2], 16)
                .map_err(|_| GatewayError::Codec(format!("bad hex: {raw}")))
        })
        .collect()
}
