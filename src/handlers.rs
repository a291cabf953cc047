//! The HTTP management surface: claim inspection, manual
//! settlement, and runtime reconfiguration endpoints, wired as an axum
//! `Router` over shared state.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::RwLock;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use claim_chain_evm::config::Eip155ChainConfig;
use claim_chain_xrp::config::XrplChainConfig;
use claim_core::{ChannelRegistry, SettlementStatus, SettlementTrigger};
use claim_store::ClaimStore;
use claim_types::{Chain, ChainAdapter};

#[cfg(feature = "aptos")]
use claim_chain_aptos::config::AptosChainConfig;

/// Snapshots of the currently-applied per-chain config, kept for inspection
/// and returned by the `/configure-*` endpoints. Hot-swapping the live
/// adapters themselves requires a process restart picking up the new
/// values — this endpoint validates and records intent, it does not splice
/// a new signer into an already-running [`claim_types::ChainAdapter`]
/// trait object.
#[derive(Debug, Default, Clone)]
pub struct RuntimeConfig {
    pub evm: Option<Eip155ChainConfig>,
    pub xrp: Option<XrplChainConfig>,
    #[cfg(feature = "aptos")]
    pub aptos: Option<AptosChainConfig>,
}

#[derive(Clone)]
pub struct AppState {
    pub claim_exchange_enabled: bool,
    pub store: ClaimStore,
    pub registry: Arc<ChannelRegistry>,
    pub settlement: Arc<SettlementTrigger>,
    pub adapters: Arc<HashMap<Chain, Arc<dyn ChainAdapter>>>,
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_root))
        .route("/claims/{peer_id}", get(get_claims))
        .route("/settlement/execute", post(post_settlement_execute))
        .route(
            "/settlement/status/{peer_id}",
            get(get_settlement_status),
        )
        .route("/configure-evm", post(post_configure_evm))
        .route("/configure-xrp", post(post_configure_xrp))
        .route("/configure-settlement", post(post_configure_settlement))
}

#[cfg(feature = "aptos")]
pub fn aptos_routes() -> Router<AppState> {
    Router::new().route("/configure-aptos", post(post_configure_aptos))
}

#[instrument(skip_all)]
async fn get_root() -> impl IntoResponse {
    (StatusCode::OK, format!("Hello from {}!", env!("CARGO_PKG_NAME")))
}

#[derive(Debug, Deserialize)]
struct ClaimsQuery {
    chain: Option<String>,
}

/// `GET /claims/:peerId?chain=evm|xrp|aptos` → stored claims.
#[instrument(skip(state))]
async fn get_claims(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
    Query(query): Query<ClaimsQuery>,
) -> Response {
    if !state.claim_exchange_enabled {
        return disabled_response();
    }
    match query.chain {
        Some(raw) => match Chain::from_str(&raw) {
            Ok(chain) => {
                let claims = state.store.claims_for_peer_chain(&peer_id, chain);
                (StatusCode::OK, Json(json!({ "peerId": peer_id, "claims": claims }))).into_response()
            }
            Err(e) => bad_request(e.to_string()),
        },
        None => {
            let grouped = state.store.claims_for_peer(&peer_id);
            (StatusCode::OK, Json(json!({ "peerId": peer_id, "claimsByChain": grouped }))).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettlementExecuteRequest {
    peer_id: String,
    /// Which chain's channel to settle ("tokenId") — here the chain
    /// discriminator is the only notion of asset this subsystem has.
    token_id: String,
}

/// `POST /settlement/execute { peerId, tokenId }` → triggers
/// `cooperative_settle`.
#[instrument(skip(state))]
async fn post_settlement_execute(
    State(state): State<AppState>,
    Json(body): Json<SettlementExecuteRequest>,
) -> Response {
    if !state.claim_exchange_enabled {
        return disabled_response();
    }
    let chain = match Chain::from_str(&body.token_id) {
        Ok(chain) => chain,
        Err(e) => return bad_request(e.to_string()),
    };
    let cumulative = state
        .registry
        .find_channel(&body.peer_id, chain)
        .and_then(|s| s.transferred())
        .unwrap_or(0);
    // Force-trigger regardless of threshold: an operator-invoked execute is
    // an explicit request, not a debit-driven crossing.
    state.settlement.check_and_trigger(&body.peer_id, chain, cumulative.max(u128::MAX / 2));
    (
        StatusCode::OK,
        Json(json!({ "peerId": body.peer_id, "chain": chain, "status": "triggered" })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct SettlementStatusQuery {
    #[serde(rename = "tokenId")]
    token_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettlementStatusResponse {
    peer_id: String,
    chain: Chain,
    balance: u128,
    status: SettlementStatus,
}

/// `GET /settlement/status/:peerId?tokenId=…` → current balance and state
/// ∈ {Idle, Pending, InProgress}.
#[instrument(skip(state))]
async fn get_settlement_status(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
    Query(query): Query<SettlementStatusQuery>,
) -> Response {
    if !state.claim_exchange_enabled {
        return disabled_response();
    }
    let chain = match Chain::from_str(&query.token_id) {
        Ok(chain) => chain,
        Err(e) => return bad_request(e.to_string()),
    };
    let balance = state
        .registry
        .find_channel(&peer_id, chain)
        .and_then(|s| s.transferred())
        .unwrap_or(0);
    let status = state.settlement.status(&peer_id, chain);
    (
        StatusCode::OK,
        Json(SettlementStatusResponse {
            peer_id,
            chain,
            balance,
            status,
        }),
    )
        .into_response()
}

/// `POST /configure-evm` — runtime reconfiguration.
#[instrument(skip(state))]
async fn post_configure_evm(
    State(state): State<AppState>,
    Json(config): Json<Eip155ChainConfig>,
) -> Response {
    let mut guard = state.runtime_config.write().expect("runtime config lock poisoned");
    guard.evm = Some(config);
    tracing::info!("EVM chain configuration recorded; restart to apply");
    (StatusCode::OK, Json(json!({ "status": "recorded" }))).into_response()
}

/// `POST /configure-xrp` — runtime reconfiguration.
#[instrument(skip(state))]
async fn post_configure_xrp(
    State(state): State<AppState>,
    Json(config): Json<XrplChainConfig>,
) -> Response {
    let mut guard = state.runtime_config.write().expect("runtime config lock poisoned");
    guard.xrp = Some(config);
    tracing::info!("XRP chain configuration recorded; restart to apply");
    (StatusCode::OK, Json(json!({ "status": "recorded" }))).into_response()
}

/// `POST /configure-aptos` — runtime reconfiguration.
#[cfg(feature = "aptos")]
#[instrument(skip(state))]
async fn post_configure_aptos(
    State(state): State<AppState>,
    Json(config): Json<AptosChainConfig>,
) -> Response {
    let mut guard = state.runtime_config.write().expect("runtime config lock poisoned");
    guard.aptos = Some(config);
    tracing::info!("Aptos chain configuration recorded; restart to apply");
    (StatusCode::OK, Json(json!({ "status": "recorded" }))).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigureSettlementRequest {
    threshold: u128,
}

/// `POST /configure-settlement { threshold }` — runtime reconfiguration.
#[instrument(skip(state))]
async fn post_configure_settlement(
    State(state): State<AppState>,
    Json(body): Json<ConfigureSettlementRequest>,
) -> Response {
    state.settlement.set_threshold(body.threshold);
    (
        StatusCode::OK,
        Json(json!({ "status": "applied", "threshold": body.threshold })),
    )
        .into_response()
}

fn disabled_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "claim exchange subsystem is disabled" })),
    )
        .into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message.into() }))).into_response()
}
