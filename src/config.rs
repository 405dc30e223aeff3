use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::env;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::types::{AccountAddress, Network};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub settlement: SettlementConfig,
    pub reconciliation: ReconciliationConfig,
    pub anchors: AnchorSet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettlementConfig {
    /// Bounded wait for ledger inclusion; timeout maps to LedgerUnavailable
    pub confirmation_timeout_seconds: u64,
    /// Upper bound on listing prices
    pub max_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    pub interval_minutes: u64,
}

/// One anchor identity per network, fixed at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct AnchorSet {
    pub production: AnchorConfig,
    pub test: AnchorConfig,
}

impl AnchorSet {
    pub fn for_network(&self, network: Network) -> &AnchorConfig {
        match network {
            Network::Production => &self.production,
            Network::Test => &self.test,
        }
    }
}

/// The custodial identity holding NFTs in escrow on one network.
#[derive(Debug, Clone, Deserialize)]
pub struct AnchorConfig {
    pub network: Network,
    pub address: AccountAddress,
}

impl AnchorConfig {
    /// Derive the anchor address from a network-scoped secret seed.
    ///
    /// The network code is mixed into the digest so the same seed yields
    /// distinct identities on production and test.
    pub fn from_seed(network: Network, seed: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(network.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(seed.as_bytes());
        let digest = hasher.finalize();

        let mut address = String::with_capacity(1 + digest.len() * 2);
        address.push('G');
        for byte in digest {
            let _ = write!(address, "{:02X}", byte);
        }

        Self {
            network,
            address: AccountAddress::new(address),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenv::dotenv().ok();

        let production_seed = env::var("ANCHOR_SEED_PRODUCTION")
            .unwrap_or_else(|_| "dev-anchor-production".to_string());
        let test_seed =
            env::var("ANCHOR_SEED_TEST").unwrap_or_else(|_| "dev-anchor-test".to_string());

        let confirmation_timeout_seconds = env::var("SETTLEMENT_CONFIRMATION_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let max_price = env::var("SETTLEMENT_MAX_PRICE")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or_else(|| Decimal::from(1_000_000_000));

        let interval_minutes = env::var("RECONCILIATION_INTERVAL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15);

        Ok(Config {
            settlement: SettlementConfig {
                confirmation_timeout_seconds,
                max_price,
            },
            reconciliation: ReconciliationConfig { interval_minutes },
            anchors: AnchorSet {
                production: AnchorConfig::from_seed(Network::Production, &production_seed),
                test: AnchorConfig::from_seed(Network::Test, &test_seed),
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            settlement: SettlementConfig {
                confirmation_timeout_seconds: 5,
                max_price: Decimal::from(1_000_000_000),
            },
            reconciliation: ReconciliationConfig {
                interval_minutes: 15,
            },
            anchors: AnchorSet {
                production: AnchorConfig::from_seed(Network::Production, "dev-anchor-production"),
                test: AnchorConfig::from_seed(Network::Test, "dev-anchor-test"),
            },
        }
    }
}
