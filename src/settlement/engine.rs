//! Settlement engine
//!
//! Orchestrates the buy, list and cancel flows. The currency leg and the
//! NFT leg are independently failable ledger operations with no atomic swap
//! between them; every partial-failure window maps either to a clean abort
//! (nothing moved), a retryable error, or a pending settlement fault that
//! reconciliation repairs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::custody::EscrowCustodyService;
use crate::error::{EscrowError, Result};
use crate::ledger::{LedgerClient, TransferIntent};
use crate::listing::ListingLifecycle;
use crate::metrics::Metrics;
use crate::store::ListingStore;
use crate::types::{AccountAddress, Listing, ListingStatus, NewListing};

/// Outcome of a completed purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyReceipt {
    pub listing_id: Uuid,
    pub payment_reference: String,
    pub nft_reference: String,
    pub sold_at: DateTime<Utc>,
}

/// Whether the cancelled listing's NFT made it back to the seller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NftReturn {
    Returned { reference: String },
    /// The NFT stays in anchor custody pending manual recovery. The listing
    /// is cancelled either way; it never silently revives.
    Pending { reason: String },
}

/// Outcome of a cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelReceipt {
    pub listing_id: Uuid,
    pub nft_return: NftReturn,
}

pub struct SettlementEngine {
    store: Arc<dyn ListingStore>,
    ledger: Arc<dyn LedgerClient>,
    custody: Arc<EscrowCustodyService>,
    lifecycle: ListingLifecycle,
    config: Arc<Config>,
    metrics: Metrics,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn ListingStore>,
        ledger: Arc<dyn LedgerClient>,
        custody: Arc<EscrowCustodyService>,
        config: Arc<Config>,
        metrics: Metrics,
    ) -> Self {
        let lifecycle = ListingLifecycle::new(store.clone(), custody.clone());
        Self {
            store,
            ledger,
            custody,
            lifecycle,
            config,
            metrics,
        }
    }

    /// Create a listing for an NFT the seller already moved into escrow.
    pub async fn create_listing(&self, request: NewListing) -> Result<Listing> {
        if request.price > self.config.settlement.max_price {
            return Err(EscrowError::Validation(format!(
                "price {} exceeds maximum {}",
                request.price, self.config.settlement.max_price
            )));
        }

        let listing = self.lifecycle.create(request).await?;
        self.metrics.record_listing_created();
        Ok(listing)
    }

    /// Buy flow. Payment is always confirmed before NFT release is
    /// attempted; the sell transition is a conditional write, so at most one
    /// settlement ever succeeds per listing.
    pub async fn buy_listing(
        &self,
        listing_id: Uuid,
        buyer: &AccountAddress,
    ) -> Result<BuyReceipt> {
        let listing = self
            .store
            .get(listing_id)
            .await?
            .ok_or(EscrowError::ListingNotFound(listing_id))?;
        if listing.status != ListingStatus::Active {
            return Err(EscrowError::ListingNotActive {
                id: listing_id,
                status: listing.status,
            });
        }

        let currency_token = listing.currency.asset_address(listing.network);
        let price_units = listing.currency.to_base_units(listing.price)?;

        // Advisory funds check: re-read the live balance immediately before
        // committing funds. The ledger's own atomicity at submit time is
        // the authoritative check.
        let available = self
            .ledger
            .get_balance(listing.network, buyer, &currency_token)
            .await?;
        if available < price_units {
            return Err(EscrowError::InsufficientFunds {
                required: listing.price,
                available: listing.currency.from_base_units(available),
                currency: listing.currency,
            });
        }

        let custody = self
            .custody
            .verify_custody(&listing.token, listing.network)
            .await?;
        if !custody.held {
            return Err(EscrowError::InsufficientCustody {
                token: listing.token.clone(),
                balance: custody.balance,
            });
        }

        // Currency leg: buyer pays the anchor. Failure here aborts with no
        // state change; the listing stays active and the call is retryable.
        let anchor = self.custody.anchor(listing.network);
        let payment = TransferIntent {
            from: buyer.clone(),
            to: anchor.address.clone(),
            token: currency_token,
            amount: price_units,
            memo: format!("listing-payment:{}", listing_id),
        };
        let payment_receipt = match self.ledger.submit_transfer(listing.network, &payment).await {
            Ok(receipt) if receipt.accepted => receipt,
            Ok(receipt) => {
                return Err(EscrowError::PaymentFailed(
                    receipt
                        .reason
                        .unwrap_or_else(|| format!("payment {} rejected", receipt.reference)),
                ));
            }
            Err(err @ EscrowError::LedgerUnavailable(_)) => return Err(err),
            Err(err) => return Err(EscrowError::PaymentFailed(err.to_string())),
        };

        info!(
            "Payment {} of {} {} confirmed for listing {}",
            payment_receipt.reference, listing.price, listing.currency, listing_id
        );

        // NFT leg: the critical non-atomic boundary. Payment has landed and
        // the release may still fail.
        let nft_receipt = match self
            .custody
            .transfer_out(&listing.token, listing.network, buyer)
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                return Err(self
                    .classify_release_failure(&listing, &payment_receipt.reference, err)
                    .await);
            }
        };

        // Record the sale. A conflicting write here, after the NFT already
        // left escrow, leaves a stale-looking listing that reconciliation
        // downgrades; it is surfaced, not swallowed.
        let sold = match self.lifecycle.mark_sold(listing_id).await {
            Ok(listing) => listing,
            Err(err) => {
                self.metrics.record_settlement_fault();
                error!(
                    "Listing {} delivered token {} but the sold write failed: {}",
                    listing_id, listing.token, err
                );
                return Err(EscrowError::SettlementFault {
                    listing_id,
                    step: "mark_sold",
                    payment_reference: payment_receipt.reference,
                    detail: err.to_string(),
                });
            }
        };

        self.metrics.record_settlement();
        info!(
            "Listing {} settled: token {} to {}, payment {}",
            listing_id, sold.token, buyer, payment_receipt.reference
        );

        Ok(BuyReceipt {
            listing_id,
            payment_reference: payment_receipt.reference,
            nft_reference: nft_receipt.reference,
            sold_at: sold.sold_at.unwrap_or_else(Utc::now),
        })
    }

    /// Cancel flow: mark cancelled first, then return the NFT. A failed
    /// return leaves the listing cancelled with the NFT in custody pending
    /// manual recovery; a cancelled listing must never silently revive.
    pub async fn cancel_listing(&self, listing_id: Uuid) -> Result<CancelReceipt> {
        let cancelled = self.lifecycle.mark_cancelled(listing_id).await?;
        self.metrics.record_listing_cancelled();

        let nft_return = match self
            .custody
            .transfer_out(&cancelled.token, cancelled.network, &cancelled.seller)
            .await
        {
            Ok(receipt) => NftReturn::Returned {
                reference: receipt.reference,
            },
            Err(err) => {
                warn!(
                    "Listing {} cancelled but token {} stays in escrow pending recovery: {}",
                    listing_id, cancelled.token, err
                );
                NftReturn::Pending {
                    reason: err.to_string(),
                }
            }
        };

        Ok(CancelReceipt {
            listing_id,
            nft_return,
        })
    }

    /// Re-verify custody and move the listing to the matching status.
    pub async fn recover_listing(&self, listing_id: Uuid) -> Result<Listing> {
        self.lifecycle.recover(listing_id).await
    }

    /// Decide what a failed NFT release means, with a fresh custody read
    /// rather than a guess.
    ///
    /// Custody already drained means a concurrent settlement took the
    /// token: the loser observes `ListingNotActive`. Custody still present
    /// (or unreadable) with a landed payment is a pending settlement fault;
    /// the listing stays active and no refund is attempted here, since a
    /// blind refund double-spends if the release actually landed after a
    /// client-visible timeout.
    async fn classify_release_failure(
        &self,
        listing: &Listing,
        payment_reference: &str,
        err: EscrowError,
    ) -> EscrowError {
        self.metrics.record_settlement_fault();

        match self
            .custody
            .verify_custody(&listing.token, listing.network)
            .await
        {
            Ok(custody) if !custody.held => {
                warn!(
                    "Payment {} landed for listing {} but token {} was settled concurrently",
                    payment_reference, listing.id, listing.token
                );
                let status = self
                    .store
                    .get(listing.id)
                    .await
                    .ok()
                    .flatten()
                    .map(|l| l.status)
                    .unwrap_or(listing.status);
                EscrowError::ListingNotActive {
                    id: listing.id,
                    status,
                }
            }
            _ => {
                error!(
                    "Pending settlement fault: payment {} landed for listing {} but release of {} failed: {}",
                    payment_reference, listing.id, listing.token, err
                );
                EscrowError::SettlementFault {
                    listing_id: listing.id,
                    step: "transfer_out",
                    payment_reference: payment_reference.to_string(),
                    detail: err.to_string(),
                }
            }
        }
    }
}
