//! Reconciliation service
//!
//! Ledger operations and store writes are not atomic with each other, so
//! divergence between anchor custody and the listing record is an expected,
//! recoverable condition. This service detects it (read-only) and exposes
//! explicit repair operations; it never moves funds on its own initiative.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::report::{
    OrphanAttribution, OrphanRecovery, OrphanedToken, ReconciliationReport, StaleListing,
};
use crate::custody::EscrowCustodyService;
use crate::error::{EscrowError, Result};
use crate::metrics::Metrics;
use crate::store::ListingStore;
use crate::types::{AccountAddress, Listing, ListingStatus, Network, TokenAddress};

pub struct ReconciliationService {
    store: Arc<dyn ListingStore>,
    custody: Arc<EscrowCustodyService>,
    metrics: Metrics,
}

impl ReconciliationService {
    pub fn new(
        store: Arc<dyn ListingStore>,
        custody: Arc<EscrowCustodyService>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            custody,
            metrics,
        }
    }

    /// Compare anchor custody against active listings for one network.
    ///
    /// Orphans are NFTs held by the anchor with no active listing; stale
    /// listings claim active while the anchor holds zero of the token.
    /// Idempotent: with no intervening state change, two runs produce the
    /// same sets.
    pub async fn reconcile(&self, network: Network) -> Result<ReconciliationReport> {
        let holdings = self.custody.holdings(network).await?;
        let nfts: Vec<_> = holdings.into_iter().filter(|h| h.is_nft()).collect();

        let active = self
            .store
            .list_by_network_and_status(network, ListingStatus::Active)
            .await?;
        let active_tokens: HashSet<TokenAddress> =
            active.iter().map(|l| l.token.clone()).collect();
        let held_tokens: HashSet<TokenAddress> = nfts.iter().map(|h| h.token.clone()).collect();

        let mut orphaned = Vec::new();
        for holding in &nfts {
            if active_tokens.contains(&holding.token) {
                continue;
            }
            let attribution = self.attribute(network, &holding.token).await?;
            orphaned.push(OrphanedToken {
                token: holding.token.clone(),
                balance: holding.balance,
                attribution,
            });
        }

        let stale: Vec<StaleListing> = active
            .iter()
            .filter(|l| !held_tokens.contains(&l.token))
            .map(|l| StaleListing {
                listing_id: l.id,
                token: l.token.clone(),
                seller: l.seller.clone(),
            })
            .collect();

        self.metrics.record_reconciliation(orphaned.len(), stale.len());

        let report = ReconciliationReport {
            network,
            orphaned,
            stale,
            ran_at: Utc::now(),
        };
        if report.is_clean() {
            info!("Reconciliation on {}: custody and listings agree", network);
        } else {
            warn!(
                "Reconciliation on {}: {} orphaned token(s), {} stale listing(s)",
                network,
                report.orphaned.len(),
                report.stale.len()
            );
        }

        Ok(report)
    }

    /// Downgrade a verified-stale active listing to cancelled.
    ///
    /// The NFT already left custody through a path not reflected in this
    /// listing (typically a successful but unrecorded sale); custody is
    /// re-verified before the write so a live listing is never downgraded.
    pub async fn apply_stale_correction(&self, listing_id: Uuid) -> Result<Listing> {
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

        let custody = self
            .custody
            .verify_custody(&listing.token, listing.network)
            .await?;
        if custody.held {
            return Err(EscrowError::PreconditionFailed(format!(
                "listing {} is not stale; anchor still custodies {}",
                listing_id, listing.token
            )));
        }

        let corrected = self
            .store
            .update_status(listing_id, ListingStatus::Active, ListingStatus::Cancelled)
            .await?;
        info!(
            "Corrected stale listing {} to cancelled; token {} left custody unrecorded",
            listing_id, corrected.token
        );

        Ok(corrected)
    }

    /// Return an orphaned token to `recipient` and ensure its prior listing
    /// record is terminal.
    ///
    /// Refuses tokens that still have an active listing (not orphans) and
    /// tokens no listing record ever named (`UnattributedCustody`); those
    /// stay with the anchor until an operator decides.
    pub async fn recover_orphan(
        &self,
        token: &TokenAddress,
        recipient: &AccountAddress,
        network: Network,
    ) -> Result<OrphanRecovery> {
        let custody = self.custody.verify_custody(token, network).await?;
        if !custody.held {
            return Err(EscrowError::InsufficientCustody {
                token: token.clone(),
                balance: custody.balance,
            });
        }

        let active = self
            .store
            .list_by_network_and_status(network, ListingStatus::Active)
            .await?;
        if active.iter().any(|l| &l.token == token) {
            return Err(EscrowError::PreconditionFailed(format!(
                "token {} has an active listing on {}; not an orphan",
                token, network
            )));
        }

        let prior = match self.attribute(network, token).await? {
            OrphanAttribution::Known { listing_id, .. } => listing_id,
            OrphanAttribution::Unattributed => {
                return Err(EscrowError::UnattributedCustody {
                    token: token.clone(),
                    network,
                });
            }
        };

        let receipt = self.custody.transfer_out(token, network, recipient).await?;

        // The prior record is already terminal (cancelled or sold) whenever
        // attribution found it; nothing to rewrite. Log the repair so it is
        // auditable next to the detection that motivated it.
        info!(
            "Recovered orphaned token {} on {} to {} ({}), attributed by listing {}",
            token, network, recipient, receipt.reference, prior
        );

        Ok(OrphanRecovery {
            token: token.clone(),
            recipient: recipient.clone(),
            reference: receipt.reference,
            listing_id: prior,
        })
    }

    /// Scheduled reconciliation loop. Detection only; repairs stay manual
    /// so they can be reviewed before any transfer executes.
    pub async fn run_scheduled(self: Arc<Self>, network: Network, every: Duration) {
        let mut ticker = interval(every);
        info!(
            "Starting reconciliation loop for {} every {:?}",
            network, every
        );

        loop {
            ticker.tick().await;

            match self.reconcile(network).await {
                Ok(report) if !report.is_clean() => {
                    warn!(
                        "Reconciliation divergence on {}: {}",
                        network,
                        serde_json::to_string(&report).unwrap_or_default()
                    );
                }
                Ok(_) => {}
                Err(err) => error!("Reconciliation run failed on {}: {}", network, err),
            }
        }
    }

    /// Latest prior listing record naming `token`, searching terminal
    /// statuses. When several records exist, the most recently updated one
    /// wins; its seller is the last known owner.
    async fn attribute(
        &self,
        network: Network,
        token: &TokenAddress,
    ) -> Result<OrphanAttribution> {
        let mut prior: Option<Listing> = None;
        for status in [ListingStatus::Cancelled, ListingStatus::Sold] {
            for listing in self.store.list_by_network_and_status(network, status).await? {
                if &listing.token == token
                    && prior
                        .as_ref()
                        .map_or(true, |p| listing.updated_at > p.updated_at)
                {
                    prior = Some(listing);
                }
            }
        }

        Ok(match prior {
            Some(listing) => OrphanAttribution::Known {
                listing_id: listing.id,
                seller: listing.seller,
            },
            None => OrphanAttribution::Unattributed,
        })
    }
}
