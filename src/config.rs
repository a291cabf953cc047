//! Configuration for the claim-relay binary.

use std::env;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use url::Url;

use claim_chain_evm::config::Eip155ChainConfig;
use claim_chain_xrp::config::XrplChainConfig;

#[cfg(feature = "aptos")]
use claim_chain_aptos::config::AptosChainConfig;

/// CLI arguments for the claim-relay node.
#[derive(Parser, Debug)]
#[command(name = "claim-relay")]
#[command(about = "Payment-channel claim exchange relay node")]
struct CliArgs {
    /// Path to an optional JSON configuration file overlaying environment
    /// defaults.
    #[arg(long, short, env = "CONFIG")]
    config: Option<PathBuf>,
}

/// Node configuration. Every field falls back to an environment variable,
/// then a hardcoded default, composing `clap::Parser` CLI flags with
/// `serde`-level env-var defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "defaults::port")]
    pub port: u16,
    #[serde(default = "defaults::host")]
    pub host: IpAddr,
    /// This node's own peer id, used as the `local_address` the Wire Bridge
    /// refuses to forward prepares further than.
    #[serde(default = "defaults::local_address")]
    pub local_address: String,
    /// Master feature flag for the whole subsystem.
    #[serde(default = "defaults::claim_exchange_enabled")]
    pub claim_exchange_enabled: bool,
    /// `SETTLEMENT_THRESHOLD`, decimal base units.
    #[serde(default = "defaults::settlement_threshold")]
    pub settlement_threshold: u128,
    /// `FIRST_HOP_URL` for forwarding non-local prepares.
    #[serde(default = "defaults::first_hop_url")]
    pub first_hop_url: Option<Url>,
    #[serde(default = "defaults::evm")]
    pub evm: Option<Eip155ChainConfig>,
    #[serde(default = "defaults::xrp")]
    pub xrp: Option<XrplChainConfig>,
    #[cfg(feature = "aptos")]
    #[serde(default = "defaults::aptos")]
    pub aptos: Option<AptosChainConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Settings {
    /// Loads settings from an optional `--config`/`$CONFIG` JSON file
    /// overlaying environment-variable defaults. With no file present,
    /// settings come entirely from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let content = match cli_args.config {
            Some(path) => fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?,
            None => "{}".to_string(),
        };
        Ok(serde_json::from_str(&content)?)
    }
}

mod defaults {
    use super::*;

    pub fn port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8088)
    }

    pub fn host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    pub fn local_address() -> String {
        env::var("LOCAL_ADDRESS").unwrap_or_else(|_| "local-node".to_string())
    }

    pub fn claim_exchange_enabled() -> bool {
        env::var("CLAIM_EXCHANGE_ENABLED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true)
    }

    pub fn settlement_threshold() -> u128 {
        env::var("SETTLEMENT_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1_000_000_000)
    }

    pub fn first_hop_url() -> Option<Url> {
        env::var("FIRST_HOP_URL").ok().and_then(|s| s.parse().ok())
    }

    /// Built from `EVM_*` env vars; `None` (chain disabled) unless at least
    /// the required fields are present.
    pub fn evm() -> Option<Eip155ChainConfig> {
        let rpc_url = env::var("EVM_RPC_URL").ok()?.parse().ok()?;
        let private_key = env::var("EVM_PRIVATE_KEY").ok()?;
        let token_network_address = env::var("EVM_TOKEN_NETWORK_ADDRESS").ok()?.parse().ok()?;
        let chain_id = env::var("EVM_CHAIN_ID").ok()?.parse().ok()?;
        let domain_name =
            env::var("EVM_DOMAIN_NAME").unwrap_or_else(|_| "TokenNetwork".to_string());
        let domain_version = env::var("EVM_DOMAIN_VERSION").unwrap_or_else(|_| "1".to_string());
        Some(Eip155ChainConfig {
            chain_id,
            rpc_url,
            private_key,
            token_network_address,
            domain_name,
            domain_version,
        })
    }

    /// Built from `XRP_*` env vars; `None` (chain disabled) unless at least
    /// the required fields are present.
    pub fn xrp() -> Option<XrplChainConfig> {
        let rpc_url = env::var("XRP_RPC_URL").ok()?;
        let signing_key_hex = env::var("XRP_SIGNING_KEY").ok()?;
        let account = env::var("XRP_ACCOUNT").ok()?;
        let standalone = env::var("XRP_STANDALONE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);
        Some(XrplChainConfig {
            rpc_url,
            signing_key_hex,
            account,
            standalone,
        })
    }

    /// Built from `APTOS_*` env vars; `None` (chain disabled) unless at
    /// least the required fields are present.
    #[cfg(feature = "aptos")]
    pub fn aptos() -> Option<AptosChainConfig> {
        let rpc_url = env::var("APTOS_RPC_URL").ok()?;
        let fallback_rpc_url = env::var("APTOS_FALLBACK_RPC_URL").ok();
        let private_key_hex = env::var("APTOS_PRIVATE_KEY").ok()?;
        let module_address = env::var("APTOS_MODULE_ADDRESS").ok()?;
        let coin_type =
            env::var("APTOS_COIN_TYPE").unwrap_or_else(|_| "0x1::aptos_coin::AptosCoin".to_string());
        Some(AptosChainConfig {
            rpc_url,
            fallback_rpc_url,
            private_key_hex,
            module_address,
            coin_type,
        })
    }
}
