//! Payment-channel claim exchange relay node: wires the Chain Adapters,
//! Channel Registry, Claim Manager, Settlement Trigger, and Wire Bridge
//! together behind an HTTP management surface and a length-prefixed TCP
//! wire listener.

mod config;
mod handlers;
mod sig_down;
mod telemetry;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use claim_chain_evm::Eip155ChainAdapter;
use claim_chain_xrp::XrplChainAdapter;
use claim_core::{ChannelRegistry, ClaimManager, SettlementTrigger};
use claim_store::{ClaimStore, NonceStore};
use claim_types::{Chain, ChainAdapter};
use wire_bridge::{LoggingEventHandler, WireBridge};

use crate::config::Settings;
use crate::handlers::{AppState, RuntimeConfig};
use crate::sig_down::SigDown;
use crate::telemetry::Telemetry;

#[cfg(feature = "aptos")]
use claim_chain_aptos::AptosChainAdapter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _telemetry = Telemetry::new();

    let settings = Settings::load()?;

    let claim_store = ClaimStore::open("data/claims")?;
    let nonce_store = NonceStore::open("data/claims")?;

    let mut adapters: HashMap<Chain, Arc<dyn ChainAdapter>> = HashMap::new();

    if let Some(evm_config) = &settings.evm {
        let adapter = Eip155ChainAdapter::from_config(evm_config)?.with_nonce_store(nonce_store.clone());
        adapters.insert(Chain::Evm, Arc::new(adapter));
        tracing::info!("EVM chain adapter configured");
    }
    if let Some(xrp_config) = &settings.xrp {
        let adapter = XrplChainAdapter::from_config(xrp_config)?;
        adapters.insert(Chain::Xrp, Arc::new(adapter));
        tracing::info!("XRP chain adapter configured");
    }
    #[cfg(feature = "aptos")]
    if let Some(aptos_config) = &settings.aptos {
        let adapter =
            AptosChainAdapter::from_config(aptos_config)?.with_nonce_store(nonce_store.clone());
        adapters.insert(Chain::Aptos, Arc::new(adapter));
        tracing::info!("Aptos chain adapter configured");
    }

    let registry = Arc::new(ChannelRegistry::new());
    let claim_manager = Arc::new(ClaimManager::new(
        registry.clone(),
        claim_store.clone(),
        adapters.clone(),
    ));
    let settlement = Arc::new(SettlementTrigger::new(
        registry.clone(),
        claim_store.clone(),
        adapters.clone(),
        settings.settlement_threshold,
    ));
    let bridge = Arc::new(WireBridge::new(
        settings.local_address.clone(),
        settings.claim_exchange_enabled,
        claim_manager,
        registry.clone(),
        settlement.clone(),
        Arc::new(LoggingEventHandler),
    ));

    let runtime_config = Arc::new(RwLock::new(RuntimeConfig {
        evm: settings.evm.clone(),
        xrp: settings.xrp.clone(),
        #[cfg(feature = "aptos")]
        aptos: settings.aptos.clone(),
    }));

    let app_state = AppState {
        claim_exchange_enabled: settings.claim_exchange_enabled,
        store: claim_store,
        registry,
        settlement,
        adapters: Arc::new(adapters),
        runtime_config,
    };

    let mut router = Router::new().merge(handlers::routes());
    #[cfg(feature = "aptos")]
    {
        router = router.merge(handlers::aptos_routes());
    }
    let http_endpoints = router
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let http_addr = SocketAddr::new(settings.host, settings.port);
    let http_listener = tokio::net::TcpListener::bind(http_addr).await.unwrap_or_else(|e| {
        tracing::error!("failed to bind HTTP management surface to {}: {}", http_addr, e);
        std::process::exit(1);
    });
    tracing::info!("HTTP management surface listening on http://{}", http_addr);

    let wire_addr = SocketAddr::new(settings.host, settings.port + 1);
    let wire_listener = tokio::net::TcpListener::bind(wire_addr).await.unwrap_or_else(|e| {
        tracing::error!("failed to bind wire protocol listener to {}: {}", wire_addr, e);
        std::process::exit(1);
    });
    tracing::info!("wire protocol listener on {}", wire_addr);

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();

    let local_address = settings.local_address.clone();
    let wire_cancellation = cancellation_token.clone();
    let wire_task = tokio::spawn(async move {
        wire_bridge::serve(
            wire_listener,
            bridge,
            move |addr| format!("{local_address}:{addr}"),
            wire_cancellation,
        )
        .await;
    });

    let http_cancellation = cancellation_token.clone();
    axum::serve(http_listener, http_endpoints)
        .with_graceful_shutdown(async move { http_cancellation.cancelled().await })
        .await?;

    wire_task.await.ok();

    Ok(())
}
