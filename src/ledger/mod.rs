pub mod mock;

pub use mock::MockLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{AccountAddress, Network, TokenAddress};

/// A token balance held by an account, with enough shape information to
/// recognize NFTs (supply = 1, zero decimals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenHolding {
    pub token: TokenAddress,
    pub balance: i64,
    pub supply: i64,
    pub decimals: u32,
}

impl TokenHolding {
    pub fn is_nft(&self) -> bool {
        self.supply == 1 && self.decimals == 0
    }
}

/// A signed transfer to submit to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferIntent {
    pub from: AccountAddress,
    pub to: AccountAddress,
    pub token: TokenAddress,
    pub amount: i64,
    pub memo: String,
}

/// Outcome of a submitted transfer. `accepted == false` means the ledger
/// rejected the transaction; transport failures are errors instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub accepted: bool,
    pub reference: String,
    pub reason: Option<String>,
    pub included_at: DateTime<Utc>,
}

/// Thin capability over the distributed ledger.
///
/// The ledger is the sole source of truth for custody and the authority on
/// double-spend prevention. Implementations block until inclusion is
/// confirmed or fail with `LedgerUnavailable` on transport trouble; they
/// never guess at an ambiguous outcome.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Live balance of `token` held by `account`.
    async fn get_balance(
        &self,
        network: Network,
        account: &AccountAddress,
        token: &TokenAddress,
    ) -> Result<i64>;

    /// All positive balances held by `account`.
    async fn get_holdings(
        &self,
        network: Network,
        account: &AccountAddress,
    ) -> Result<Vec<TokenHolding>>;

    /// Submit a signed transfer and wait for inclusion.
    async fn submit_transfer(
        &self,
        network: Network,
        intent: &TransferIntent,
    ) -> Result<TransferReceipt>;
}
