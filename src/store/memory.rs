use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ListingStore;
use crate::error::{EscrowError, Result};
use crate::types::{Listing, ListingStatus, Network, NewListing};

/// In-memory listing store.
///
/// All writes happen under a single write lock, which gives the same
/// atomicity a relational row CAS would: a status check and its update are
/// one indivisible step against concurrent callers.
#[derive(Clone, Default)]
pub struct MemoryListingStore {
    listings: Arc<RwLock<HashMap<Uuid, Listing>>>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn has_active_conflict(
        listings: &HashMap<Uuid, Listing>,
        listing: &Listing,
    ) -> bool {
        listings.values().any(|other| {
            other.id != listing.id
                && other.network == listing.network
                && other.token == listing.token
                && other.status == ListingStatus::Active
        })
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn create(&self, listing: NewListing) -> Result<Listing> {
        let mut listings = self.listings.write().await;

        let duplicate = listings.values().any(|other| {
            other.network == listing.network
                && other.token == listing.token
                && other.status == ListingStatus::Active
        });
        if duplicate {
            return Err(EscrowError::DuplicateActiveListing {
                token: listing.token,
                network: listing.network,
            });
        }

        let now = Utc::now();
        let record = Listing {
            id: Uuid::new_v4(),
            token: listing.token,
            seller: listing.seller,
            price: listing.price,
            currency: listing.currency,
            network: listing.network,
            status: ListingStatus::Active,
            created_at: now,
            updated_at: now,
            sold_at: None,
        };
        listings.insert(record.id, record.clone());

        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Listing>> {
        Ok(self.listings.read().await.get(&id).cloned())
    }

    async fn list_by_network_and_status(
        &self,
        network: Network,
        status: ListingStatus,
    ) -> Result<Vec<Listing>> {
        Ok(self
            .listings
            .read()
            .await
            .values()
            .filter(|l| l.network == network && l.status == status)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: ListingStatus,
        new: ListingStatus,
    ) -> Result<Listing> {
        if !expected.can_transition_to(new) {
            return Err(EscrowError::InvalidTransition {
                from: expected,
                to: new,
            });
        }

        let mut listings = self.listings.write().await;

        let current = listings
            .get(&id)
            .cloned()
            .ok_or(EscrowError::ListingNotFound(id))?;
        if current.status != expected {
            return Err(EscrowError::ConflictingState {
                id,
                expected,
                actual: current.status,
            });
        }

        if new == ListingStatus::Active && Self::has_active_conflict(&listings, &current) {
            return Err(EscrowError::DuplicateActiveListing {
                token: current.token,
                network: current.network,
            });
        }

        let record = listings.get_mut(&id).ok_or(EscrowError::ListingNotFound(id))?;
        record.status = new;
        record.updated_at = Utc::now();
        if new == ListingStatus::Sold {
            record.sold_at = Some(record.updated_at);
        }

        Ok(record.clone())
    }
}
