//! Contract-backed eligibility: a `balanceOf(address)` static call against
//! the configured contract endpoint, plus a parallel token-id query.

use async_trait::async_trait;
use sp_core::hashing::keccak_256;

use dripgate_dispenser::address::EvmAddress;
use dripgate_dispenser::eligibility::EligibilityResult;
use dripgate_dispenser::model::MintMetadata;

use crate::{EligibilityStrategy, StrategyError};

const BALANCE_CALL: &str = "balanceOf(address)";

/// First 4 bytes of the keccak-256 hash of the canonical method signature,
/// e.g. `balanceOf(address)` -> `0x70a08231`.
pub fn method_selector(signature: &str) -> String {
    let hash = keccak_256(signature.as_bytes());
    let mut out = String::with_capacity(10);
    out.push_str("0x");
    for byte in &hash[..4] {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Selector followed by each argument left-padded to 32 bytes.
pub fn encode_call(signature: &str, args: &[&str]) -> String {
    let mut data = method_selector(signature);
    for arg in args {
        let bare = arg.strip_prefix("0x").unwrap_or(arg);
        data.push_str(&format!("{bare:0>64}"));
    }
    data
}

/// Both the 32-byte all-zero hex encoding and the integer literals `"0"` /
/// `"0x0"` are canonical zero and must compare equal for eligibility.
pub fn is_zero_quantity(result: &str) -> bool {
    let bare = result.strip_prefix("0x").unwrap_or(result);
    !bare.is_empty() && bare.bytes().all(|b| b == b'0')
}

pub struct ContractBalance {
    client: reqwest::Client,
}

impl ContractBalance {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// JSON-RPC `eth_call` against `endpoint`, returning the raw `result`
    /// hex string.
    async fn eth_call(
        &self,
        endpoint: &str,
        contract: &str,
        data: String,
    ) -> Result<String, StrategyError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": contract, "data": data }, "latest"],
        });
        let json: serde_json::Value =
            self.client.post(endpoint).json(&body).send().await?.json().await?;
        json.get("result")
            .and_then(|value| value.as_str())
            .map(str::to_owned)
            .ok_or_else(|| StrategyError::Malformed(json.to_string()))
    }
}

#[async_trait]
impl EligibilityStrategy for ContractBalance {
    async fn check(
        &self,
        meta: &MintMetadata,
        holder: &EvmAddress,
    ) -> Result<EligibilityResult, StrategyError> {
        let endpoint = meta
            .extra
            .rpc_endpoint
            .as_deref()
            .ok_or(StrategyError::Misconfigured("rpc_endpoint"))?;
        let contract =
            meta.extra.contract.as_deref().ok_or(StrategyError::Misconfigured("contract"))?;

        let balance = self
            .eth_call(endpoint, contract, encode_call(BALANCE_CALL, &[holder.as_str()]))
            .await?;
        if is_zero_quantity(&balance) {
            return Ok(EligibilityResult::ineligible());
        }

        // The token id travels on a parallel query; losing it degrades the
        // response but not the grant.
        let token_id = match self
            .eth_call(endpoint, contract, encode_call(&meta.extra.token_call, &[holder.as_str()]))
            .await
        {
            Ok(token) => Some(token),
            Err(err) => {
                tracing::warn!(holder = %holder, "token id query failed: {err}");
                None
            }
        };
        Ok(EligibilityResult::eligible(token_id))
    }
}
