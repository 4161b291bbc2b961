//! Public request surface. Every dispenser response is HTTP 200 carrying a
//! `{status, token}` body; callers branch on the status string.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, header};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::info;

use dripgate_dispenser::ledger::MemoryLedger;
use dripgate_dispenser::model::{ActionKind, MintMetadata, RequesterIdentity};
use dripgate_dispenser::orchestrator::{Orchestrator, Outcome};
use dripgate_dispenser::status::{DEFAULT_TOKEN, DispenseStatus};
use dripgate_eligibility::StrategyChecker;

use crate::gateway::RpcChainGateway;

pub type ServiceOrchestrator =
    Orchestrator<RpcChainGateway, MemoryLedger, StrategyChecker<MemoryLedger>>;

/// Token type assumed when the request names none.
pub const DEFAULT_TOKEN_TYPE: &str = "BAB";

pub struct AppState {
    pub orchestrator: ServiceOrchestrator,
    /// Mint metadata per normalized token type, admin-writable at runtime.
    pub registry: RwLock<HashMap<String, MintMetadata>>,
    /// blake2 digest of the admin pre-shared key; `None` disables admin.
    pub admin_hash: Option<[u8; 32]>,
}

impl AppState {
    pub async fn mint(&self, token_type: &str) -> Option<MintMetadata> {
        self.registry.read().await.get(token_type).cloned()
    }
}

/// Uppercased canonical token type. The legacy `zk` alias maps onto its
/// underlying token so `zkBAB` and `BAB` share one grant namespace.
pub fn normalize_token(raw: Option<&str>) -> String {
    let trimmed = raw.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TOKEN_TYPE);
    let lowered = trimmed.to_ascii_lowercase();
    let bare = lowered.strip_prefix("zk").unwrap_or(&lowered);
    bare.to_ascii_uppercase()
}

/// Requester audit trail: proxy-reported address first, socket peer as the
/// fallback.
pub fn identity(peer: SocketAddr, headers: &HeaderMap) -> RequesterIdentity {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').next().unwrap_or(value).trim().to_owned());
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    RequesterIdentity { ip: forwarded.or_else(|| Some(peer.ip().to_string())), agent }
}

#[derive(Debug, Serialize)]
pub struct DispenseReply {
    pub status: DispenseStatus,
    pub token: String,
}

impl DispenseReply {
    fn from_outcome(outcome: &Outcome, kind: ActionKind) -> Self {
        Self { status: outcome.status(kind), token: outcome.token().to_owned() }
    }

    fn unknown_mint() -> Self {
        Self { status: DispenseStatus::UnknownMintType, token: DEFAULT_TOKEN.to_owned() }
    }
}

#[derive(Debug, Deserialize)]
pub struct ShortlistRequest {
    /// Holder address; `shortlist` is the legacy wire name.
    #[serde(alias = "shortlist")]
    pub address: String,
    #[serde(default, alias = "tokenType")]
    pub token_type: Option<String>,
}

/// `POST /shortlist`: allowlist registration for an EVM holder.
pub async fn shortlist(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<ShortlistRequest>,
) -> Json<DispenseReply> {
    let token_type = normalize_token(request.token_type.as_deref());
    let Some(meta) = state.mint(&token_type).await else {
        info!(%token_type, "shortlist request for unconfigured token type");
        return Json(DispenseReply::unknown_mint());
    };
    let outcome =
        state.orchestrator.allowlist(&meta, &request.address, identity(peer, &headers)).await;
    Json(DispenseReply::from_outcome(&outcome, ActionKind::Allowlist))
}

#[derive(Debug, Default, Deserialize)]
pub struct DripQuery {
    #[serde(default, alias = "tokenType")]
    pub token_type: Option<String>,
}

/// `GET /drip/{holder}/{recipient}`: one-time transfer to a substrate
/// recipient, gated on the EVM holder's eligibility.
pub async fn drip(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path((holder, recipient)): Path<(String, String)>,
    Query(query): Query<DripQuery>,
) -> Json<DispenseReply> {
    let token_type = normalize_token(query.token_type.as_deref());
    let Some(meta) = state.mint(&token_type).await else {
        info!(%token_type, "drip request for unconfigured token type");
        return Json(DispenseReply::unknown_mint());
    };
    let outcome =
        state.orchestrator.drip(&meta, &holder, &recipient, identity(peer, &headers)).await;
    Json(DispenseReply::from_outcome(&outcome, ActionKind::Drip))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
