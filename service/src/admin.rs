//! Administrative surface: mint metadata upserts, whitelist bulk-seeding
//! and a configuration snapshot. Guarded by a pre-shared key whose blake2
//! digest sits in the config; with no digest configured the whole surface
//! answers 401.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use sp_core::hashing::blake2_256;
use tracing::{info, warn};

use dripgate_dispenser::address::EvmAddress;
use dripgate_dispenser::ledger::LedgerStore;
use dripgate_dispenser::model::{ActionEvent, ActionKind, MintMetadata, RequesterIdentity};

use crate::handlers::{AppState, normalize_token};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Constant-shape key check: digest comparison, never the raw key.
pub fn key_matches(expected: [u8; 32], presented: &str) -> bool {
    blake2_256(presented.as_bytes()) == expected
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.admin_hash else {
        return false;
    };
    headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|key| key_matches(expected, key))
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" })))
}

/// `POST /admin/mint`: create or replace the metadata for one token type.
pub async fn upsert_mint(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(meta): Json<MintMetadata>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let token_type = normalize_token(Some(&meta.token_type));
    let meta = MintMetadata { token_type: token_type.clone(), ..meta };
    info!(%token_type, strategy = ?meta.strategy, "mint metadata upserted");
    let replaced = state.registry.write().await.insert(token_type, meta).is_some();
    (StatusCode::OK, Json(json!({ "replaced": replaced })))
}

#[derive(Debug, Deserialize)]
pub struct SeedEntry {
    pub address: String,
    #[serde(default, alias = "tokenId")]
    pub token_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedRequest {
    #[serde(default, alias = "tokenType")]
    pub token_type: Option<String>,
    pub entries: Vec<SeedEntry>,
}

/// `POST /admin/seed`: bulk-import whitelist membership into the ledger.
/// Ledger-only: the on-chain registration still happens one holder at a
/// time when each holder shows up to claim.
pub async fn seed_whitelist(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SeedRequest>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let token_type = normalize_token(request.token_type.as_deref());
    let ledger = state.orchestrator.ledger();

    let (mut created, mut existing, mut invalid) = (0u64, 0u64, 0u64);
    for entry in request.entries {
        let Ok(address) = EvmAddress::parse(&entry.address) else {
            warn!(address = %entry.address, "skipping unparseable seed address");
            invalid += 1;
            continue;
        };
        let event = ActionEvent::allowlist(entry.token_id, RequesterIdentity::default());
        match ledger.record_action(&token_type, address.as_str(), event).await {
            Ok(true) => created += 1,
            Ok(false) => existing += 1,
            Err(err) => {
                warn!(address = %address, "seed write failed: {err}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": err.to_string(), "created": created })),
                );
            }
        }
    }
    info!(%token_type, created, existing, invalid, "whitelist seeded");
    (StatusCode::OK, Json(json!({ "created": created, "existing": existing, "invalid": invalid })))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub address: String,
    #[serde(default, alias = "tokenType")]
    pub token_type: Option<String>,
}

/// `POST /admin/status`: ledger snapshot for one (token type, address)
/// key, both action kinds.
pub async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<StatusRequest>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let token_type = normalize_token(request.token_type.as_deref());
    let Ok(address) = EvmAddress::parse(&request.address) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid-eth-address" })));
    };
    let ledger = state.orchestrator.ledger();
    let mut snapshot = serde_json::Map::new();
    for kind in [ActionKind::Allowlist, ActionKind::Drip] {
        let record = match ledger.prior_record(kind, &token_type, address.as_str()).await {
            Ok(record) => record,
            Err(err) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": err.to_string() })),
                );
            }
        };
        let key = match kind {
            ActionKind::Allowlist => "allowlist",
            ActionKind::Drip => "drip",
        };
        snapshot.insert(key.to_owned(), json!(record));
    }
    snapshot.insert("configured".to_owned(), json!(state.mint(&token_type).await.is_some()));
    (StatusCode::OK, Json(Value::Object(snapshot)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_check_compares_digests() {
        let expected = blake2_256(b"hunter2");
        assert!(key_matches(expected, "hunter2"));
        assert!(!key_matches(expected, "hunter3"));
        assert!(!key_matches(expected, ""));
    }
}
