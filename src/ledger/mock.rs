use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{LedgerClient, TokenHolding, TransferIntent, TransferReceipt};
use crate::error::{EscrowError, Result};
use crate::types::{AccountAddress, Network, TokenAddress};

#[derive(Debug, Clone, Copy)]
struct TokenMeta {
    supply: i64,
    decimals: u32,
}

// Unregistered tokens look fungible so they never pass the NFT shape filter.
const FUNGIBLE_META: TokenMeta = TokenMeta {
    supply: i64::MAX,
    decimals: 7,
};

#[derive(Default)]
struct NetworkState {
    balances: HashMap<(AccountAddress, TokenAddress), i64>,
    tokens: HashMap<TokenAddress, TokenMeta>,
}

/// Mock ledger for tests and local development.
///
/// Balance moves happen under a single write lock, so a 1-unit NFT transfer
/// is atomic against concurrent submissions, the same guarantee a real
/// ledger's transaction-acceptance rules provide. Supports configurable
/// latency, a success-rate knob for chaos-style tests, per-token rejection
/// and a full outage switch.
pub struct MockLedger {
    latency_ms: u64,
    success_rate: f64,
    networks: Arc<RwLock<HashMap<Network, NetworkState>>>,
    offline: AtomicBool,
    rejected_tokens: Arc<RwLock<HashSet<TokenAddress>>>,
    submissions: Arc<RwLock<Vec<TransferIntent>>>,
    balance_reads: Arc<RwLock<Vec<TokenAddress>>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::with_latency(0, 1.0)
    }

    pub fn with_latency(latency_ms: u64, success_rate: f64) -> Self {
        Self {
            latency_ms,
            success_rate,
            networks: Arc::new(RwLock::new(HashMap::new())),
            offline: AtomicBool::new(false),
            rejected_tokens: Arc::new(RwLock::new(HashSet::new())),
            submissions: Arc::new(RwLock::new(Vec::new())),
            balance_reads: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a token with explicit shape.
    pub async fn register_token(
        &self,
        network: Network,
        token: TokenAddress,
        supply: i64,
        decimals: u32,
    ) {
        let mut networks = self.networks.write().await;
        networks
            .entry(network)
            .or_default()
            .tokens
            .insert(token, TokenMeta { supply, decimals });
    }

    /// Register a supply-1, zero-decimal token.
    pub async fn register_nft(&self, network: Network, token: TokenAddress) {
        self.register_token(network, token, 1, 0).await;
    }

    /// Credit an account out of thin air (test setup only).
    pub async fn credit(
        &self,
        network: Network,
        account: &AccountAddress,
        token: &TokenAddress,
        amount: i64,
    ) {
        let mut networks = self.networks.write().await;
        *networks
            .entry(network)
            .or_default()
            .balances
            .entry((account.clone(), token.clone()))
            .or_insert(0) += amount;
    }

    /// Current balance without going through the client trait (assertions).
    pub async fn balance_of(
        &self,
        network: Network,
        account: &AccountAddress,
        token: &TokenAddress,
    ) -> i64 {
        self.networks
            .read()
            .await
            .get(&network)
            .and_then(|state| state.balances.get(&(account.clone(), token.clone())))
            .copied()
            .unwrap_or(0)
    }

    /// Simulate a full ledger outage; reads and submissions fail transport.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every transfer of `token` is rejected by the ledger until cleared.
    pub async fn reject_transfers_of(&self, token: TokenAddress) {
        self.rejected_tokens.write().await.insert(token);
    }

    pub async fn clear_rejections(&self) {
        self.rejected_tokens.write().await.clear();
    }

    /// All submission attempts, accepted or not.
    pub async fn submissions(&self) -> Vec<TransferIntent> {
        self.submissions.read().await.clone()
    }

    /// How many balance reads targeted `token`.
    pub async fn balance_reads_of(&self, token: &TokenAddress) -> usize {
        self.balance_reads
            .read()
            .await
            .iter()
            .filter(|t| *t == token)
            .count()
    }

    fn should_succeed(&self) -> bool {
        if self.success_rate >= 1.0 {
            return true;
        }
        let mut rng = rand::thread_rng();
        rng.gen::<f64>() <= self.success_rate
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(EscrowError::LedgerUnavailable(
                "mock ledger offline".to_string(),
            ));
        }
        Ok(())
    }

    fn rejection(&self, intent: &TransferIntent, reason: &str) -> TransferReceipt {
        warn!(
            "Mock ledger: rejecting transfer of {} from {}: {}",
            intent.token, intent.from, reason
        );
        TransferReceipt {
            accepted: false,
            reference: format!("TX-{}", Uuid::new_v4()),
            reason: Some(reason.to_string()),
            included_at: Utc::now(),
        }
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_balance(
        &self,
        network: Network,
        account: &AccountAddress,
        token: &TokenAddress,
    ) -> Result<i64> {
        self.simulate_latency().await;
        self.check_online()?;

        self.balance_reads.write().await.push(token.clone());
        Ok(self.balance_of(network, account, token).await)
    }

    async fn get_holdings(
        &self,
        network: Network,
        account: &AccountAddress,
    ) -> Result<Vec<TokenHolding>> {
        self.simulate_latency().await;
        self.check_online()?;

        let networks = self.networks.read().await;
        let Some(state) = networks.get(&network) else {
            return Ok(Vec::new());
        };

        Ok(state
            .balances
            .iter()
            .filter(|((owner, _), balance)| owner == account && **balance > 0)
            .map(|((_, token), balance)| {
                let meta = state.tokens.get(token).copied().unwrap_or(FUNGIBLE_META);
                TokenHolding {
                    token: token.clone(),
                    balance: *balance,
                    supply: meta.supply,
                    decimals: meta.decimals,
                }
            })
            .collect())
    }

    async fn submit_transfer(
        &self,
        network: Network,
        intent: &TransferIntent,
    ) -> Result<TransferReceipt> {
        self.simulate_latency().await;
        self.check_online()?;

        self.submissions.write().await.push(intent.clone());

        if self.rejected_tokens.read().await.contains(&intent.token) {
            return Ok(self.rejection(intent, "transfer rejected by ledger"));
        }
        if !self.should_succeed() {
            return Ok(self.rejection(intent, "simulated ledger failure"));
        }
        if intent.amount <= 0 {
            return Ok(self.rejection(intent, "non-positive amount"));
        }

        // Debit and credit under one write lock; this is the atomicity the
        // real ledger gives a single transaction.
        let mut networks = self.networks.write().await;
        let state = networks.entry(network).or_default();
        let from_key = (intent.from.clone(), intent.token.clone());
        let available = state.balances.get(&from_key).copied().unwrap_or(0);
        if available < intent.amount {
            drop(networks);
            return Ok(self.rejection(intent, "insufficient balance"));
        }

        *state.balances.entry(from_key).or_insert(0) -= intent.amount;
        *state
            .balances
            .entry((intent.to.clone(), intent.token.clone()))
            .or_insert(0) += intent.amount;

        let reference = format!("TX-{}", Uuid::new_v4());
        info!(
            "Mock ledger: transferred {} {} from {} to {} ({})",
            intent.amount, intent.token, intent.from, intent.to, reference
        );

        Ok(TransferReceipt {
            accepted: true,
            reference,
            reason: None,
            included_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str) -> AccountAddress {
        AccountAddress::new(name)
    }

    #[tokio::test]
    async fn test_transfer_moves_balance() {
        let ledger = MockLedger::new();
        let token = TokenAddress::new("NFT001");
        ledger.register_nft(Network::Test, token.clone()).await;
        ledger.credit(Network::Test, &account("GA"), &token, 1).await;

        let receipt = ledger
            .submit_transfer(
                Network::Test,
                &TransferIntent {
                    from: account("GA"),
                    to: account("GB"),
                    token: token.clone(),
                    amount: 1,
                    memo: "test".to_string(),
                },
            )
            .await
            .unwrap();

        assert!(receipt.accepted);
        assert_eq!(ledger.balance_of(Network::Test, &account("GA"), &token).await, 0);
        assert_eq!(ledger.balance_of(Network::Test, &account("GB"), &token).await, 1);
    }

    #[tokio::test]
    async fn test_insufficient_balance_is_rejected_not_errored() {
        let ledger = MockLedger::new();
        let token = TokenAddress::new("NFT001");

        let receipt = ledger
            .submit_transfer(
                Network::Test,
                &TransferIntent {
                    from: account("GA"),
                    to: account("GB"),
                    token,
                    amount: 1,
                    memo: "test".to_string(),
                },
            )
            .await
            .unwrap();

        assert!(!receipt.accepted);
        assert!(receipt.reason.is_some());
    }

    #[tokio::test]
    async fn test_offline_fails_transport() {
        let ledger = MockLedger::new();
        ledger.set_offline(true);

        let err = ledger
            .get_balance(Network::Test, &account("GA"), &TokenAddress::new("NFT001"))
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::LedgerUnavailable(_)));
    }

    #[tokio::test]
    async fn test_holdings_carry_token_shape() {
        let ledger = MockLedger::new();
        let nft = TokenAddress::new("NFT001");
        let fungible = TokenAddress::new("USDC:test");
        ledger.register_nft(Network::Test, nft.clone()).await;
        ledger.credit(Network::Test, &account("GA"), &nft, 1).await;
        ledger
            .credit(Network::Test, &account("GA"), &fungible, 5_000)
            .await;

        let holdings = ledger.get_holdings(Network::Test, &account("GA")).await.unwrap();
        assert_eq!(holdings.len(), 2);

        let nft_holding = holdings.iter().find(|h| h.token == nft).unwrap();
        assert!(nft_holding.is_nft());

        let fungible_holding = holdings.iter().find(|h| h.token == fungible).unwrap();
        assert!(!fungible_holding.is_nft());
    }

    #[tokio::test]
    async fn test_networks_are_isolated() {
        let ledger = MockLedger::new();
        let token = TokenAddress::new("NFT001");
        ledger.credit(Network::Test, &account("GA"), &token, 1).await;

        assert_eq!(
            ledger
                .balance_of(Network::Production, &account("GA"), &token)
                .await,
            0
        );
    }
}
