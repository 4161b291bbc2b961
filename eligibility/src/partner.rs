//! Partner-specific eligibility integrations. Each speaks one protocol and
//! honors the same contract: `(eligible, token_id)` out, errors reserved
//! for the dispatcher to fold into "ineligible".

use async_trait::async_trait;
use serde_json::Value;

use dripgate_dispenser::address::EvmAddress;
use dripgate_dispenser::eligibility::EligibilityResult;
use dripgate_dispenser::model::MintMetadata;

use crate::{EligibilityStrategy, StrategyError};

/// Safety cap on GraphQL pagination.
const MAX_PAGES: u32 = 32;

/// Composite token id: one bit per boolean sub-check, OR-ed into a manual
/// bitmask and rendered with the fixed `0x0` prefix convention.
pub fn flags_token_id(flags: &[bool]) -> String {
    let mask = flags
        .iter()
        .enumerate()
        .fold(0u32, |acc, (bit, set)| if *set { acc | (1 << bit) } else { acc });
    format!("0x0{mask:x}")
}

/// Count of qualifying entries and of returned entries on one GraphQL page.
pub fn count_qualifying(page: &Value) -> Result<(usize, usize), StrategyError> {
    let items = page
        .pointer("/data/holdings")
        .and_then(Value::as_array)
        .ok_or_else(|| StrategyError::Malformed(page.to_string()))?;
    let qualifying = items
        .iter()
        .filter(|item| item.get("qualified").and_then(Value::as_bool).unwrap_or(false))
        .count();
    Ok((qualifying, items.len()))
}

/// Plain JSON holder-check endpoint: `GET {partner_url}/{holder}` answering
/// `{ "holder": bool, "tokenId": "0x..." }`, optionally credentialed.
pub struct RestHolderCheck {
    client: reqwest::Client,
}

impl RestHolderCheck {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EligibilityStrategy for RestHolderCheck {
    async fn check(
        &self,
        meta: &MintMetadata,
        holder: &EvmAddress,
    ) -> Result<EligibilityResult, StrategyError> {
        let url =
            meta.extra.partner_url.as_deref().ok_or(StrategyError::Misconfigured("partner_url"))?;
        let mut request = self.client.get(format!("{url}/{holder}"));
        if let Some(credential) = &meta.extra.partner_credential {
            request = request.header("x-api-key", credential);
        }
        let json: Value = request.send().await?.json().await?;

        let holds = json
            .get("holder")
            .and_then(Value::as_bool)
            .ok_or_else(|| StrategyError::Malformed(json.to_string()))?;
        if !holds {
            return Ok(EligibilityResult::ineligible());
        }
        let token_id = json.get("tokenId").and_then(Value::as_str).map(str::to_owned);
        Ok(EligibilityResult::eligible(token_id))
    }
}

/// Paginated GraphQL aggregation: the holder qualifies once the number of
/// qualifying sub-items across pages reaches the configured minimum.
pub struct GraphqlAggregation {
    client: reqwest::Client,
}

impl GraphqlAggregation {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

const HOLDINGS_QUERY: &str = "query Holdings($address: String!, $first: Int!, $skip: Int!) \
    { holdings(address: $address, first: $first, skip: $skip) { qualified } }";

#[async_trait]
impl EligibilityStrategy for GraphqlAggregation {
    async fn check(
        &self,
        meta: &MintMetadata,
        holder: &EvmAddress,
    ) -> Result<EligibilityResult, StrategyError> {
        let url =
            meta.extra.partner_url.as_deref().ok_or(StrategyError::Misconfigured("partner_url"))?;
        let page_size = meta.extra.page_size.max(1);
        let minimum = meta.extra.min_qualifying.max(1) as usize;

        let mut qualifying = 0usize;
        for page in 0..MAX_PAGES {
            let body = serde_json::json!({
                "query": HOLDINGS_QUERY,
                "variables": {
                    "address": holder.as_str(),
                    "first": page_size,
                    "skip": page * page_size,
                },
            });
            let json: Value = self.client.post(url).json(&body).send().await?.json().await?;
            let (page_qualifying, returned) = count_qualifying(&json)?;
            qualifying += page_qualifying;
            if qualifying >= minimum {
                return Ok(EligibilityResult::eligible(None));
            }
            if returned < page_size as usize {
                break;
            }
        }
        Ok(EligibilityResult::ineligible())
    }
}

/// Composite-flag partner: one endpoint reports independent boolean
/// sub-checks; any set bit qualifies and the bitmask becomes the token id.
pub struct FlagComposite {
    client: reqwest::Client,
}

impl FlagComposite {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EligibilityStrategy for FlagComposite {
    async fn check(
        &self,
        meta: &MintMetadata,
        holder: &EvmAddress,
    ) -> Result<EligibilityResult, StrategyError> {
        let url =
            meta.extra.partner_url.as_deref().ok_or(StrategyError::Misconfigured("partner_url"))?;
        let mut request = self.client.get(format!("{url}/{holder}"));
        if let Some(credential) = &meta.extra.partner_credential {
            request = request.header("x-api-key", credential);
        }
        let json: Value = request.send().await?.json().await?;

        let checks = json
            .get("checks")
            .and_then(Value::as_array)
            .ok_or_else(|| StrategyError::Malformed(json.to_string()))?;
        let flags: Vec<bool> =
            checks.iter().map(|check| check.as_bool().unwrap_or(false)).collect();
        if flags.iter().any(|set| *set) {
            Ok(EligibilityResult::eligible(Some(flags_token_id(&flags))))
        } else {
            Ok(EligibilityResult::ineligible())
        }
    }
}
