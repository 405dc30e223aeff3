pub mod memory;

pub use memory::MemoryListingStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Listing, ListingStatus, Network, NewListing};

/// Keyed record store for listings.
///
/// `update_status` is the conditional-write primitive the concurrency story
/// hangs on: the store, not an in-process lock, is the serialization point,
/// because multiple engine instances may run against it concurrently. Any
/// backing implementation needs atomic compare-and-swap on a single record
/// plus the (token, network) active-uniqueness check on writes into Active.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Create an Active listing. Fails with `DuplicateActiveListing` when an
    /// Active listing for the same (token, network) already exists.
    async fn create(&self, listing: NewListing) -> Result<Listing>;

    /// Fetch a listing by id.
    async fn get(&self, id: Uuid) -> Result<Option<Listing>>;

    /// All listings on a network with the given status.
    async fn list_by_network_and_status(
        &self,
        network: Network,
        status: ListingStatus,
    ) -> Result<Vec<Listing>>;

    /// Conditional status write. Fails with `ConflictingState` when the
    /// current status differs from `expected`, and with `InvalidTransition`
    /// when the transition itself is illegal. Writes into Active re-check
    /// the uniqueness invariant.
    async fn update_status(
        &self,
        id: Uuid,
        expected: ListingStatus,
        new: ListingStatus,
    ) -> Result<Listing>;
}
