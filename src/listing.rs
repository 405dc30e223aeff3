//! Listing state machine
//!
//! Guards the legal status transitions of a listing record. All transitions
//! go through the store's conditional write; nothing here holds an
//! in-process lock, so any number of engine instances stay correct against
//! the same store.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::custody::EscrowCustodyService;
use crate::error::{EscrowError, Result};
use crate::store::ListingStore;
use crate::types::{Listing, ListingStatus, NewListing};

#[derive(Clone)]
pub struct ListingLifecycle {
    store: Arc<dyn ListingStore>,
    custody: Arc<EscrowCustodyService>,
}

impl ListingLifecycle {
    pub fn new(store: Arc<dyn ListingStore>, custody: Arc<EscrowCustodyService>) -> Self {
        Self { store, custody }
    }

    /// Create an Active listing.
    ///
    /// The seller must have moved the NFT to anchor custody beforehand;
    /// custody is re-verified against the ledger here, and a missing escrow
    /// fails the create with no store write.
    pub async fn create(&self, listing: NewListing) -> Result<Listing> {
        listing.validate()?;

        let custody = self
            .custody
            .verify_custody(&listing.token, listing.network)
            .await?;
        if !custody.held {
            return Err(EscrowError::PreconditionFailed(format!(
                "anchor does not custody token {} on {}",
                listing.token, listing.network
            )));
        }

        let record = self.store.create(listing).await?;
        info!(
            "Created listing {} for token {} on {} at {} {}",
            record.id, record.token, record.network, record.price, record.currency
        );

        Ok(record)
    }

    /// Sell transition, `Active -> Sold`. Exactly one caller can win this
    /// write for a given listing; losers observe `ListingNotActive`.
    pub async fn mark_sold(&self, id: Uuid) -> Result<Listing> {
        self.conditional(id, ListingStatus::Active, ListingStatus::Sold)
            .await
    }

    /// Cancel transition, `Active -> Cancelled`. Marks intent only; the NFT
    /// return is the settlement engine's concern.
    pub async fn mark_cancelled(&self, id: Uuid) -> Result<Listing> {
        self.conditional(id, ListingStatus::Active, ListingStatus::Cancelled)
            .await
    }

    /// Recovery transition, `Cancelled -> Active`. Only reachable through
    /// `recover`, which re-verifies custody first. The store re-checks the
    /// (token, network) uniqueness invariant on the way back in.
    async fn reactivate(&self, id: Uuid) -> Result<Listing> {
        self.store
            .update_status(id, ListingStatus::Cancelled, ListingStatus::Active)
            .await
    }

    /// Re-verify custody and settle the listing on the matching status.
    ///
    /// A cancelled listing whose NFT is still in escrow becomes active
    /// again; an active listing whose NFT left escrow is downgraded to
    /// cancelled. Sold listings are terminal and refused.
    pub async fn recover(&self, id: Uuid) -> Result<Listing> {
        let listing = self
            .store
            .get(id)
            .await?
            .ok_or(EscrowError::ListingNotFound(id))?;
        if listing.status == ListingStatus::Sold {
            return Err(EscrowError::PreconditionFailed(format!(
                "listing {} is sold; terminal listings cannot be recovered",
                id
            )));
        }

        let custody = self
            .custody
            .verify_custody(&listing.token, listing.network)
            .await?;

        match (custody.held, listing.status) {
            (true, ListingStatus::Cancelled) => {
                let recovered = self.reactivate(id).await?;
                info!(
                    "Recovered listing {} to active; token {} still in escrow",
                    id, recovered.token
                );
                Ok(recovered)
            }
            (false, ListingStatus::Active) => {
                let cancelled = self.mark_cancelled(id).await?;
                warn!(
                    "Recovered listing {} to cancelled; token {} no longer in escrow",
                    id, cancelled.token
                );
                Ok(cancelled)
            }
            // Status already matches custody
            _ => Ok(listing),
        }
    }

    async fn conditional(
        &self,
        id: Uuid,
        expected: ListingStatus,
        new: ListingStatus,
    ) -> Result<Listing> {
        match self.store.update_status(id, expected, new).await {
            Ok(listing) => Ok(listing),
            Err(EscrowError::ConflictingState { id, actual, .. }) => {
                Err(EscrowError::ListingNotActive { id, status: actual })
            }
            Err(other) => Err(other),
        }
    }
}
