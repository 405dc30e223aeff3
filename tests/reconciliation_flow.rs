// Reconciliation scenarios: orphan and stale detection, repair operations,
// idempotency, and network isolation. Divergence is produced the way it
// happens in production: transfers that bypass the listing record, failed
// NFT returns, and custody that was never listed.

use std::sync::Arc;

use escrow_engine::{
    AccountAddress, Config, Currency, EscrowCustodyService, EscrowError, LedgerClient,
    ListingStatus, ListingStore, Metrics, MockLedger, MemoryListingStore, Network, NewListing,
    OrphanAttribution, ReconciliationService, SettlementEngine, TokenAddress, TransferIntent,
};
use rust_decimal_macros::dec;

struct Harness {
    ledger: Arc<MockLedger>,
    store: Arc<MemoryListingStore>,
    engine: Arc<SettlementEngine>,
    recon: Arc<ReconciliationService>,
    anchor: AccountAddress,
}

fn harness() -> Harness {
    let config = Arc::new(Config::default());
    let anchor = config.anchors.for_network(Network::Test).address.clone();
    let ledger = Arc::new(MockLedger::new());
    let store = Arc::new(MemoryListingStore::new());
    let custody = Arc::new(EscrowCustodyService::new(ledger.clone(), config.clone()));
    let metrics = Metrics::default();
    let engine = Arc::new(SettlementEngine::new(
        store.clone(),
        ledger.clone(),
        custody.clone(),
        config,
        metrics.clone(),
    ));
    let recon = Arc::new(ReconciliationService::new(
        store.clone(),
        custody,
        metrics,
    ));
    Harness {
        ledger,
        store,
        engine,
        recon,
        anchor,
    }
}

async fn escrow_nft(h: &Harness, token: &TokenAddress) {
    h.ledger.register_nft(Network::Test, token.clone()).await;
    h.ledger.credit(Network::Test, &h.anchor, token, 1).await;
}

fn listing_for(token: &TokenAddress, seller: &str) -> NewListing {
    NewListing {
        token: token.clone(),
        seller: AccountAddress::new(seller),
        price: dec!(10),
        currency: Currency::Usdc,
        network: Network::Test,
    }
}

/// Drain the anchor's custody of `token` without touching the store, the
/// shape of every unrecorded transfer.
async fn drain_custody(h: &Harness, token: &TokenAddress) {
    let receipt = h
        .ledger
        .submit_transfer(
            Network::Test,
            &TransferIntent {
                from: h.anchor.clone(),
                to: AccountAddress::new("GELSEWHERE"),
                token: token.clone(),
                amount: 1,
                memo: "out-of-band".to_string(),
            },
        )
        .await
        .unwrap();
    assert!(receipt.accepted);
}

#[tokio::test]
async fn consistent_state_reconciles_clean() {
    let h = harness();
    let token = TokenAddress::new("NFT001");
    escrow_nft(&h, &token).await;
    h.engine
        .create_listing(listing_for(&token, "GSELLER"))
        .await
        .unwrap();

    let report = h.recon.reconcile(Network::Test).await.unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn unlisted_custody_is_reported_unattributed() {
    let h = harness();
    let token = TokenAddress::new("NFT001");
    // Custodied but no listing record ever named it
    escrow_nft(&h, &token).await;

    let report = h.recon.reconcile(Network::Test).await.unwrap();
    assert_eq!(report.orphaned.len(), 1);
    assert_eq!(report.orphaned[0].token, token);
    assert!(report.orphaned[0].is_unattributed());
    assert!(report.stale.is_empty());

    // Detection reported it; repair refuses it
    let err = h
        .recon
        .recover_orphan(&token, &AccountAddress::new("GSOMEONE"), Network::Test)
        .await
        .unwrap_err();
    assert!(matches!(err, EscrowError::UnattributedCustody { .. }));
    assert_eq!(h.ledger.balance_of(Network::Test, &h.anchor, &token).await, 1);
}

#[tokio::test]
async fn failed_cancel_return_leaves_attributed_orphan() {
    let h = harness();
    let token = TokenAddress::new("NFT001");
    escrow_nft(&h, &token).await;

    let listing = h
        .engine
        .create_listing(listing_for(&token, "GSELLER"))
        .await
        .unwrap();
    h.ledger.reject_transfers_of(token.clone()).await;
    h.engine.cancel_listing(listing.id).await.unwrap();
    h.ledger.clear_rejections().await;

    // Cancelled listing, NFT stuck in escrow: an orphan with a known owner
    let report = h.recon.reconcile(Network::Test).await.unwrap();
    assert_eq!(report.orphaned.len(), 1);
    match &report.orphaned[0].attribution {
        OrphanAttribution::Known { listing_id, seller } => {
            assert_eq!(*listing_id, listing.id);
            assert_eq!(seller.as_str(), "GSELLER");
        }
        OrphanAttribution::Unattributed => panic!("expected attribution to the prior listing"),
    }
}

#[tokio::test]
async fn recovering_an_orphan_returns_it_and_stays_terminal() {
    let h = harness();
    let token = TokenAddress::new("NFT001");
    escrow_nft(&h, &token).await;

    let listing = h
        .engine
        .create_listing(listing_for(&token, "GSELLER"))
        .await
        .unwrap();
    h.ledger.reject_transfers_of(token.clone()).await;
    h.engine.cancel_listing(listing.id).await.unwrap();
    h.ledger.clear_rejections().await;

    let seller = AccountAddress::new("GSELLER");
    let recovery = h
        .recon
        .recover_orphan(&token, &seller, Network::Test)
        .await
        .unwrap();
    assert_eq!(recovery.listing_id, listing.id);

    // NFT back with the seller, anchor custody drained
    assert_eq!(h.ledger.balance_of(Network::Test, &seller, &token).await, 1);
    assert_eq!(h.ledger.balance_of(Network::Test, &h.anchor, &token).await, 0);

    let stored = h.store.get(listing.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ListingStatus::Cancelled);

    // Nothing left to report
    let report = h.recon.reconcile(Network::Test).await.unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn recover_orphan_refuses_actively_listed_tokens() {
    let h = harness();
    let token = TokenAddress::new("NFT001");
    escrow_nft(&h, &token).await;
    h.engine
        .create_listing(listing_for(&token, "GSELLER"))
        .await
        .unwrap();

    let err = h
        .recon
        .recover_orphan(&token, &AccountAddress::new("GSELLER"), Network::Test)
        .await
        .unwrap_err();
    assert!(matches!(err, EscrowError::PreconditionFailed(_)));
    assert_eq!(h.ledger.balance_of(Network::Test, &h.anchor, &token).await, 1);
}

#[tokio::test]
async fn attribution_picks_the_most_recent_prior_listing() {
    let h = harness();
    let token = TokenAddress::new("NFT001");
    escrow_nft(&h, &token).await;

    // Two generations of listings for the same token, different sellers
    let first = h
        .engine
        .create_listing(listing_for(&token, "GSELLER1"))
        .await
        .unwrap();
    h.ledger.reject_transfers_of(token.clone()).await;
    h.engine.cancel_listing(first.id).await.unwrap();

    let second = h
        .engine
        .create_listing(listing_for(&token, "GSELLER2"))
        .await
        .unwrap();
    h.engine.cancel_listing(second.id).await.unwrap();
    h.ledger.clear_rejections().await;

    let report = h.recon.reconcile(Network::Test).await.unwrap();
    assert_eq!(report.orphaned.len(), 1);
    match &report.orphaned[0].attribution {
        OrphanAttribution::Known { listing_id, seller } => {
            assert_eq!(*listing_id, second.id);
            assert_eq!(seller.as_str(), "GSELLER2");
        }
        OrphanAttribution::Unattributed => panic!("expected attribution"),
    }
}

#[tokio::test]
async fn active_listing_without_custody_is_stale() {
    let h = harness();
    let token = TokenAddress::new("NFT001");
    escrow_nft(&h, &token).await;

    let listing = h
        .engine
        .create_listing(listing_for(&token, "GSELLER"))
        .await
        .unwrap();
    drain_custody(&h, &token).await;

    let report = h.recon.reconcile(Network::Test).await.unwrap();
    assert!(report.orphaned.is_empty());
    assert_eq!(report.stale.len(), 1);
    assert_eq!(report.stale[0].listing_id, listing.id);
    assert_eq!(report.stale[0].token, token);

    // Applying the correction downgrades the listing
    let corrected = h.recon.apply_stale_correction(listing.id).await.unwrap();
    assert_eq!(corrected.status, ListingStatus::Cancelled);

    let report = h.recon.reconcile(Network::Test).await.unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn stale_correction_refuses_listings_still_backed_by_custody() {
    let h = harness();
    let token = TokenAddress::new("NFT001");
    escrow_nft(&h, &token).await;

    let listing = h
        .engine
        .create_listing(listing_for(&token, "GSELLER"))
        .await
        .unwrap();

    let err = h.recon.apply_stale_correction(listing.id).await.unwrap_err();
    assert!(matches!(err, EscrowError::PreconditionFailed(_)));

    let stored = h.store.get(listing.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ListingStatus::Active);
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let h = harness();

    // One orphan, one stale listing, one consistent listing
    let orphan = TokenAddress::new("NFT001");
    escrow_nft(&h, &orphan).await;

    let stale_token = TokenAddress::new("NFT002");
    escrow_nft(&h, &stale_token).await;
    h.engine
        .create_listing(listing_for(&stale_token, "GSELLER"))
        .await
        .unwrap();
    drain_custody(&h, &stale_token).await;

    let healthy = TokenAddress::new("NFT003");
    escrow_nft(&h, &healthy).await;
    h.engine
        .create_listing(listing_for(&healthy, "GSELLER"))
        .await
        .unwrap();

    let mut first = h.recon.reconcile(Network::Test).await.unwrap();
    let mut second = h.recon.reconcile(Network::Test).await.unwrap();

    // Holdings enumerate in no particular order; compare as sets
    first.orphaned.sort_by(|a, b| a.token.as_str().cmp(b.token.as_str()));
    second.orphaned.sort_by(|a, b| a.token.as_str().cmp(b.token.as_str()));
    first.stale.sort_by_key(|s| s.listing_id);
    second.stale.sort_by_key(|s| s.listing_id);

    assert_eq!(first.orphaned, second.orphaned);
    assert_eq!(first.stale, second.stale);
    assert_eq!(first.orphaned.len(), 1);
    assert_eq!(first.stale.len(), 1);
}

#[tokio::test]
async fn fungible_anchor_holdings_are_not_orphans() {
    let h = harness();
    // Settlement proceeds accumulate on the anchor; they are not NFTs
    h.ledger
        .credit(
            Network::Test,
            &h.anchor,
            &Currency::Usdc.asset_address(Network::Test),
            500_000_000,
        )
        .await;

    let report = h.recon.reconcile(Network::Test).await.unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn reconciliation_is_network_scoped() {
    let h = harness();
    let token = TokenAddress::new("NFT001");
    escrow_nft(&h, &token).await;

    let test_report = h.recon.reconcile(Network::Test).await.unwrap();
    assert_eq!(test_report.orphaned.len(), 1);

    // The same token means nothing on the other network
    let production_report = h.recon.reconcile(Network::Production).await.unwrap();
    assert!(production_report.is_clean());
}

#[tokio::test]
async fn unrecorded_sale_heals_through_stale_correction() {
    let h = harness();
    let token = TokenAddress::new("NFT001");
    let buyer = AccountAddress::new("GBUYER");
    escrow_nft(&h, &token).await;

    let listing = h
        .engine
        .create_listing(listing_for(&token, "GSELLER"))
        .await
        .unwrap();

    // The NFT leaves custody as a sale would move it, but the sold write
    // never happened (crash between the transfer and the store update)
    h.ledger
        .submit_transfer(
            Network::Test,
            &TransferIntent {
                from: h.anchor.clone(),
                to: buyer.clone(),
                token: token.clone(),
                amount: 1,
                memo: format!("escrow-release:{}", token),
            },
        )
        .await
        .unwrap();

    let report = h.recon.reconcile(Network::Test).await.unwrap();
    assert_eq!(report.stale.len(), 1);

    h.recon.apply_stale_correction(listing.id).await.unwrap();
    let stored = h.store.get(listing.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ListingStatus::Cancelled);

    // The buyer keeps the NFT; the record just stopped claiming it
    assert_eq!(h.ledger.balance_of(Network::Test, &buyer, &token).await, 1);
}
