//! Escrow custody service
//!
//! Owns all ledger interaction on behalf of the anchor account. Custody is
//! always verified against the live ledger; the listing store's status field
//! is never accepted as proof that the anchor holds a token.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{AnchorConfig, Config};
use crate::error::{EscrowError, Result};
use crate::ledger::{LedgerClient, TokenHolding, TransferIntent, TransferReceipt};
use crate::types::{AccountAddress, Network, TokenAddress};

/// Live custody state of one token.
#[derive(Debug, Clone, Copy)]
pub struct CustodyStatus {
    pub held: bool,
    pub balance: i64,
}

pub struct EscrowCustodyService {
    ledger: Arc<dyn LedgerClient>,
    config: Arc<Config>,
}

impl EscrowCustodyService {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: Arc<Config>) -> Self {
        Self { ledger, config }
    }

    /// The anchor identity for a network.
    pub fn anchor(&self, network: Network) -> &AnchorConfig {
        self.config.anchors.for_network(network)
    }

    /// Read the anchor's current balance of `token` from the ledger.
    pub async fn verify_custody(
        &self,
        token: &TokenAddress,
        network: Network,
    ) -> Result<CustodyStatus> {
        let anchor = self.anchor(network);
        let balance = self
            .ledger
            .get_balance(network, &anchor.address, token)
            .await?;

        Ok(CustodyStatus {
            held: balance > 0,
            balance,
        })
    }

    /// All tokens the anchor currently holds with positive balance.
    pub async fn holdings(&self, network: Network) -> Result<Vec<TokenHolding>> {
        let anchor = self.anchor(network);
        let holdings = self.ledger.get_holdings(network, &anchor.address).await?;
        Ok(holdings.into_iter().filter(|h| h.balance > 0).collect())
    }

    /// Release exactly one unit of `token` from escrow to `recipient`.
    ///
    /// Blocks until the ledger confirms inclusion or the configured timeout
    /// elapses. On timeout the outcome is ambiguous and reported as
    /// `LedgerUnavailable`; callers must re-verify custody before retrying,
    /// never resubmit blindly.
    pub async fn transfer_out(
        &self,
        token: &TokenAddress,
        network: Network,
        recipient: &AccountAddress,
    ) -> Result<TransferReceipt> {
        let custody = self.verify_custody(token, network).await?;
        if custody.balance <= 0 {
            return Err(EscrowError::InsufficientCustody {
                token: token.clone(),
                balance: custody.balance,
            });
        }

        let anchor = self.anchor(network);
        let intent = TransferIntent {
            from: anchor.address.clone(),
            to: recipient.clone(),
            token: token.clone(),
            amount: 1,
            memo: format!("escrow-release:{}", token),
        };

        let timeout = Duration::from_secs(self.config.settlement.confirmation_timeout_seconds);
        let receipt = match tokio::time::timeout(
            timeout,
            self.ledger.submit_transfer(network, &intent),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(EscrowError::LedgerUnavailable(format!(
                    "no confirmation for transfer of {} within {}s",
                    token,
                    self.config.settlement.confirmation_timeout_seconds
                )));
            }
        };

        if !receipt.accepted {
            return Err(EscrowError::SubmissionRejected(
                receipt
                    .reason
                    .unwrap_or_else(|| format!("transfer {} rejected", receipt.reference)),
            ));
        }

        info!(
            "Released token {} from escrow to {} on {} ({})",
            token, recipient, network, receipt.reference
        );

        Ok(receipt)
    }
}
