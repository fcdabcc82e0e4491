// Configuration management module
// This file handles loading of the process configuration from an optional file
// and environment variables, the executor limits, and the venues file
//
// Numan Thabit 2025 Nov

use alloy_primitives::Address;
use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::bounds::MAX_SLIPPAGE_BPS;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// JSON-RPC endpoint of an Ethereum node, e.g. http://127.0.0.1:8545
    pub jsonrpc_endpoint: Url,
    /// Account the node (or its external signer) sends transactions from
    pub sender: Address,
    /// HTTP API bind address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// YAML file describing venues and their routers
    #[serde(default = "default_venues_file")]
    pub venues_file: PathBuf,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_venues_file() -> PathBuf {
    PathBuf::from("config/venues.yaml")
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let file = std::env::var("SWAP_CONFIG").unwrap_or_else(|_| "config/swap-aggr".to_string());
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix("SWAP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let app: AppConfig = cfg.try_deserialize()?;
        app.executor.validate()?;
        Ok(app)
    }
}

/// Process-wide execution limits. Loaded once; callers may override per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub default_slippage_bps: u32,
    pub default_deadline_seconds: u64,
    pub max_price_impact_bps: u32,
    pub per_venue_timeout_ms: u64,
    pub max_hops: usize,
    pub gas_limit: u64,
    pub confirmation_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_slippage_bps: 50,
            default_deadline_seconds: 1_200,
            max_price_impact_bps: 1_000,
            per_venue_timeout_ms: 2_000,
            max_hops: 3,
            gas_limit: 500_000,
            confirmation_timeout_ms: 120_000,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.default_slippage_bps <= MAX_SLIPPAGE_BPS,
            "default_slippage_bps {} outside [0, {MAX_SLIPPAGE_BPS}]",
            self.default_slippage_bps
        );
        ensure!(self.per_venue_timeout_ms > 0, "per_venue_timeout_ms must be positive");
        ensure!(
            self.confirmation_timeout_ms > 0,
            "confirmation_timeout_ms must be positive"
        );
        ensure!(self.gas_limit > 0, "gas_limit must be positive");
        Ok(())
    }

    pub fn per_venue_timeout(&self) -> Duration {
        Duration::from_millis(self.per_venue_timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn with_overrides(&self, overrides: &ConfigOverrides) -> Self {
        Self {
            default_slippage_bps: overrides
                .default_slippage_bps
                .unwrap_or(self.default_slippage_bps),
            default_deadline_seconds: overrides
                .default_deadline_seconds
                .unwrap_or(self.default_deadline_seconds),
            max_price_impact_bps: overrides
                .max_price_impact_bps
                .unwrap_or(self.max_price_impact_bps),
            per_venue_timeout_ms: overrides
                .per_venue_timeout_ms
                .unwrap_or(self.per_venue_timeout_ms),
            max_hops: overrides.max_hops.unwrap_or(self.max_hops),
            gas_limit: overrides.gas_limit.unwrap_or(self.gas_limit),
            confirmation_timeout_ms: overrides
                .confirmation_timeout_ms
                .unwrap_or(self.confirmation_timeout_ms),
        }
    }
}

/// Per-call overrides of [`ExecutorConfig`]; unset fields keep the process value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConfigOverrides {
    pub default_slippage_bps: Option<u32>,
    pub default_deadline_seconds: Option<u64>,
    pub max_price_impact_bps: Option<u32>,
    pub per_venue_timeout_ms: Option<u64>,
    pub max_hops: Option<usize>,
    pub gas_limit: Option<u64>,
    pub confirmation_timeout_ms: Option<u64>,
}

/// Contents of the venues file: the router registry source plus pricing parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct VenuesFile {
    /// Wrapped native token (WETH) used in paths when callers trade the native asset
    pub wrapped_native: Address,
    pub venues: Vec<VenueSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum VenueSpec {
    ConstantProduct {
        id: String,
        router: Address,
        factory: Address,
        #[serde(default = "default_pair_fee_bps")]
        fee_bps: u32,
        #[serde(default = "default_pair_gas")]
        gas_estimate: u64,
    },
    ConcentratedLiquidity {
        id: String,
        router: Address,
        factory: Address,
        quoter: Address,
        fee_tiers: Vec<u32>,
        #[serde(default = "default_router_gas_overhead")]
        gas_overhead: u64,
    },
}

fn default_pair_fee_bps() -> u32 {
    30
}

fn default_pair_gas() -> u64 {
    130_000
}

fn default_router_gas_overhead() -> u64 {
    60_000
}

impl VenueSpec {
    pub fn id(&self) -> &str {
        match self {
            Self::ConstantProduct { id, .. } | Self::ConcentratedLiquidity { id, .. } => id,
        }
    }

    pub fn router(&self) -> Address {
        match self {
            Self::ConstantProduct { router, .. } | Self::ConcentratedLiquidity { router, .. } => {
                *router
            }
        }
    }
}

impl VenuesFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read venues file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parse venues file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let file: VenuesFile = serde_yaml::from_str(raw)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for venue in &self.venues {
            if !seen.insert(venue.id()) {
                bail!("duplicate venue id: {}", venue.id());
            }
            match venue {
                VenueSpec::ConstantProduct { id, fee_bps, .. } => {
                    ensure!(*fee_bps < 10_000, "venue {id}: fee_bps {fee_bps} must be below 10000");
                }
                VenueSpec::ConcentratedLiquidity { id, fee_tiers, .. } => {
                    ensure!(!fee_tiers.is_empty(), "venue {id}: fee_tiers must not be empty");
                    for tier in fee_tiers {
                        ensure!(
                            *tier < 1_000_000,
                            "venue {id}: fee tier {tier} must be below 1000000"
                        );
                    }
                }
            }
        }
        Ok(())
    }
}
