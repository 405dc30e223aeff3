//! NFT escrow and settlement core
//!
//! A custodial anchor account holds NFTs in escrow while they are listed for
//! sale; this crate owns the listing lifecycle, the custody layer, the
//! settlement flows and the reconciliation loop that repairs divergence
//! between ledger custody and the off-chain listing record.
//!
//! # Architecture
//!
//! - **No atomic swap**: the currency leg and the NFT leg are sequential,
//!   independently failable ledger operations; recovery is designed around
//!   that, not wished away
//! - **Store as serialization point**: correctness under concurrency rests
//!   on the listing store's conditional status write, not in-process locks,
//!   so multiple engine instances can run against one store
//! - **Ledger as custody truth**: listing status is never trusted as proof
//!   of custody; every escrow-affecting action re-reads the ledger

pub mod config;
pub mod custody;
pub mod error;
pub mod ledger;
pub mod listing;
pub mod metrics;
pub mod reconciliation;
pub mod settlement;
pub mod store;
pub mod types;

// Re-exports
pub use config::{AnchorConfig, Config};
pub use custody::{CustodyStatus, EscrowCustodyService};
pub use error::{EscrowError, Result};
pub use ledger::{LedgerClient, MockLedger, TokenHolding, TransferIntent, TransferReceipt};
pub use listing::ListingLifecycle;
pub use metrics::Metrics;
pub use reconciliation::{
    OrphanAttribution, OrphanRecovery, OrphanedToken, ReconciliationReport, ReconciliationService,
    StaleListing,
};
pub use settlement::{BuyReceipt, CancelReceipt, NftReturn, SettlementEngine};
pub use store::{ListingStore, MemoryListingStore};
pub use types::{
    AccountAddress, Currency, Listing, ListingStatus, Network, NewListing, TokenAddress,
};
