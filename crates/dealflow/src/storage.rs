//! Persistence seam for the engine. The Postgres implementation lives in
//! [`crate::persistence`]; unit tests use an in-memory implementation with
//! the same compare-and-set contract.
//!
//! `Auction.status`, `Offer.status` and `SelectedDeal.status` are the only
//! fields requiring read-modify-write discipline; every `transition_*`
//! method is a conditional update that writes only if the entity is still
//! in the expected state and reports whether it did. Callers may be spread
//! over several processes, so the guard must live in the store, not in an
//! application-level mutex.

use {
    crate::error::Result,
    chrono::{DateTime, Utc},
    model::{
        auction::{Auction, AuctionStatus, AuctionVehicle},
        deal::{
            DealStatus, Deposit, FeeCollection, FinancingPath, InsuranceEvidence, SelectedDeal,
            ServiceFee,
        },
        ids::{AuctionId, BuyerId, DealId, DealerId, OfferId, VehicleId},
        money::Cents,
        offer::Offer,
        shortlist::ShortlistItem,
    },
};

#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    // --- shortlist ---

    /// Adds a vehicle to the buyer's shortlist, atomically enforcing the
    /// active-item capacity. Idempotent when the vehicle is already active;
    /// revives a tombstoned item. Fails with `CapacityExceeded` when the
    /// buyer already holds `model::SHORTLIST_CAPACITY` active items, even
    /// under concurrent adds.
    async fn add_shortlist_item(
        &self,
        buyer: BuyerId,
        vehicle: VehicleId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Soft-removes an item; a no-op when the item is absent or already
    /// removed.
    async fn remove_shortlist_item(
        &self,
        buyer: BuyerId,
        vehicle: VehicleId,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Marks one active item as the primary choice, clearing any other.
    async fn mark_primary_choice(&self, buyer: BuyerId, vehicle: VehicleId) -> Result<()>;

    async fn active_shortlist(&self, buyer: BuyerId) -> Result<Vec<ShortlistItem>>;

    // --- auctions ---

    /// Creates a draft auction with its immutable vehicle snapshot, the
    /// invited-dealer set and a pending deposit row, all or nothing.
    async fn create_auction(
        &self,
        buyer: BuyerId,
        vehicles: Vec<AuctionVehicle>,
        dealers: Vec<DealerId>,
        deposit: Cents,
        now: DateTime<Utc>,
    ) -> Result<AuctionId>;

    async fn auction(&self, id: AuctionId) -> Result<Option<Auction>>;

    async fn auction_vehicles(&self, id: AuctionId) -> Result<Vec<AuctionVehicle>>;

    async fn is_invited(&self, id: AuctionId, dealer: DealerId) -> Result<bool>;

    /// `Draft -> Open` recording the deadline; false if not in `Draft`.
    async fn open_auction(
        &self,
        id: AuctionId,
        opened_at: DateTime<Utc>,
        closes_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Guarded status flip; false means the entity was no longer in `from`.
    async fn transition_auction(
        &self,
        id: AuctionId,
        from: AuctionStatus,
        to: AuctionStatus,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Open auctions whose deadline has passed, for the closing sweep.
    async fn open_auctions_past_deadline(&self, now: DateTime<Utc>) -> Result<Vec<Auction>>;

    // --- offers ---

    /// Inserts a live offer, marking the dealer's previous live offer on
    /// the auction `Countered`. Submissions from different dealers never
    /// block one another.
    async fn submit_offer(
        &self,
        auction: AuctionId,
        dealer: DealerId,
        vehicle: VehicleId,
        price: Cents,
        financing: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<OfferId>;

    async fn offer(&self, id: OfferId) -> Result<Option<Offer>>;

    /// Sealed-bid read path: only the dealer's own offers.
    async fn offers_for_dealer(&self, auction: AuctionId, dealer: DealerId) -> Result<Vec<Offer>>;

    async fn offers_for_auction(&self, auction: AuctionId) -> Result<Vec<Offer>>;

    async fn offer_count(&self, auction: AuctionId) -> Result<i64>;

    async fn accepted_offer_count(&self, auction: AuctionId) -> Result<i64>;

    // --- winner selection ---

    /// The exclusivity-critical operation, performed as one atomic unit:
    /// flip the auction `Closed -> Completed` (losing that race is
    /// `Error::AlreadyDecided`), accept the chosen offer, reject every
    /// other live offer, create the single `SelectedDeal`, create its
    /// service fee with `min(deposit, base_fee)` credited exactly once,
    /// and record the first pipeline event. Never produces two accepted
    /// offers or two deals for one auction.
    async fn decide_winner(
        &self,
        auction: AuctionId,
        offer: OfferId,
        base_fee: Cents,
        now: DateTime<Utc>,
    ) -> Result<DealId>;

    // --- deposits ---

    async fn deposit_for_auction(&self, auction: AuctionId) -> Result<Option<Deposit>>;

    /// Marks the deposit paid. False for a duplicate settlement
    /// notification, which callers treat as a no-op.
    async fn settle_deposit_paid(&self, auction: AuctionId) -> Result<bool>;

    async fn settle_deposit_failed(&self, auction: AuctionId) -> Result<bool>;

    /// Starts a refund on a paid, uncredited deposit; refund and credit are
    /// mutually exclusive forever. True also when a started refund was never
    /// confirmed, so a failed payment call can be retried; false once the
    /// refund finished or the deposit was credited.
    async fn begin_deposit_refund(&self, auction: AuctionId) -> Result<bool>;

    /// Records the payment collaborator's refund confirmation; false unless
    /// a refund is in flight.
    async fn settle_deposit_refunded(
        &self,
        auction: AuctionId,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Auctions with a started but unconfirmed deposit refund, for the
    /// sweep to re-drive.
    async fn refund_pending_auctions(&self) -> Result<Vec<AuctionId>>;

    // --- deals ---

    async fn deal(&self, id: DealId) -> Result<Option<SelectedDeal>>;

    async fn deal_for_auction(&self, auction: AuctionId) -> Result<Option<SelectedDeal>>;

    /// Guarded pipeline transition; the orchestrator validates the edge.
    async fn transition_deal(
        &self,
        id: DealId,
        from: DealStatus,
        to: DealStatus,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Write-once; false when a financing path was already recorded.
    async fn set_financing(
        &self,
        id: DealId,
        path: FinancingPath,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Write-once; false when evidence was already recorded.
    async fn set_insurance_evidence(
        &self,
        id: DealId,
        evidence: InsuranceEvidence,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// May overwrite: a re-upload replaces the failed document.
    async fn set_contract_document(
        &self,
        id: DealId,
        document: String,
        now: DateTime<Utc>,
    ) -> Result<()>;

    async fn set_esign_completed(&self, id: DealId, now: DateTime<Utc>) -> Result<bool>;

    async fn set_pickup_code(&self, id: DealId, code: String, now: DateTime<Utc>) -> Result<bool>;

    // --- service fees ---

    async fn fee_for_deal(&self, deal: DealId) -> Result<Option<ServiceFee>>;

    /// Records the collection method; false once either method was
    /// confirmed, which permanently disables the other.
    async fn collect_fee(
        &self,
        deal: DealId,
        method: FeeCollection,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    // --- deal events ---

    async fn record_deal_event(
        &self,
        deal: DealId,
        status: DealStatus,
        now: DateTime<Utc>,
    ) -> Result<()>;

    async fn deal_events(&self, deal: DealId) -> Result<Vec<(DateTime<Utc>, DealStatus)>>;

    async fn delete_deal_events_before(&self, timestamp: DateTime<Utc>) -> Result<u64>;
}
