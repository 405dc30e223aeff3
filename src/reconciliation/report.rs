use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AccountAddress, Network, TokenAddress};

/// Who, if anyone, the listing record attributes an orphaned token to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrphanAttribution {
    /// A prior listing names the token; its seller is the last known owner.
    Known {
        listing_id: Uuid,
        seller: AccountAddress,
    },
    /// No listing record names the token. Manual intervention only; the
    /// system has no record of a rightful owner to return it to.
    Unattributed,
}

/// A token held in anchor custody with no corresponding active listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedToken {
    pub token: TokenAddress,
    pub balance: i64,
    pub attribution: OrphanAttribution,
}

impl OrphanedToken {
    pub fn is_unattributed(&self) -> bool {
        self.attribution == OrphanAttribution::Unattributed
    }
}

/// A listing marked active whose NFT is no longer held by the anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleListing {
    pub listing_id: Uuid,
    pub token: TokenAddress,
    pub seller: AccountAddress,
}

/// Read-only comparison of ledger truth vs store truth. Detection never
/// moves funds; repairs are separate, named operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub network: Network,
    pub orphaned: Vec<OrphanedToken>,
    pub stale: Vec<StaleListing>,
    pub ran_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned.is_empty() && self.stale.is_empty()
    }
}

/// Outcome of returning an orphaned token to its last known owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanRecovery {
    pub token: TokenAddress,
    pub recipient: AccountAddress,
    pub reference: String,
    /// The prior listing record that attributed the token.
    pub listing_id: Uuid,
}
