//! Postgres-backed [`Storage`] implementation over the `database` crate.
//! Converts between the engine's domain types and the database rows; the
//! multi-statement operations run in a single transaction so their
//! atomicity promises hold across processes.

use {
    crate::{
        error::{Error, Result},
        storage::Storage,
    },
    chrono::{DateTime, Utc},
    database::{auction_participants, auctions, deal_events, deposits, offers, selected_deals,
        service_fees, shortlist_items},
    model::{
        SHORTLIST_CAPACITY,
        auction::{Auction, AuctionStatus, AuctionVehicle},
        deal::{
            DealStatus, Deposit, DepositStatus, FeeCollection, FinancingPath, InsuranceEvidence,
            SelectedDeal, ServiceFee,
        },
        ids::{AuctionId, BuyerId, DealId, DealerId, DepositId, OfferId, VehicleId},
        money::Cents,
        offer::{Offer, OfferStatus},
        shortlist::ShortlistItem,
    },
    sqlx::PgPool,
};

#[derive(Clone)]
pub struct Postgres(pub PgPool);

impl Postgres {
    /// Connects and verifies the store is actually reachable. An
    /// unconfigured store is a startup error, never a silent zero-state.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(Self(pool))
    }
}

#[async_trait::async_trait]
impl Storage for Postgres {
    async fn add_shortlist_item(
        &self,
        buyer: BuyerId,
        vehicle: VehicleId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.0.begin().await?;
        // one add per buyer at a time; held until commit or rollback
        shortlist_items::lock_buyer(&mut tx, buyer.0).await?;
        let active = shortlist_items::active(&mut tx, buyer.0).await?;
        if active.iter().any(|item| item.vehicle_id == vehicle.0) {
            // idempotent re-add
            return Ok(());
        }
        if shortlist_items::count_active(&mut tx, buyer.0).await? >= SHORTLIST_CAPACITY {
            return Err(Error::CapacityExceeded);
        }
        shortlist_items::upsert(&mut tx, buyer.0, vehicle.0, note.as_deref(), now).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_shortlist_item(
        &self,
        buyer: BuyerId,
        vehicle: VehicleId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut ex = self.0.acquire().await?;
        shortlist_items::soft_remove(&mut ex, buyer.0, vehicle.0, now).await?;
        Ok(())
    }

    async fn mark_primary_choice(&self, buyer: BuyerId, vehicle: VehicleId) -> Result<()> {
        let mut ex = self.0.acquire().await?;
        shortlist_items::mark_primary(&mut ex, buyer.0, vehicle.0).await?;
        Ok(())
    }

    async fn active_shortlist(&self, buyer: BuyerId) -> Result<Vec<ShortlistItem>> {
        let mut ex = self.0.acquire().await?;
        let items = shortlist_items::active(&mut ex, buyer.0).await?;
        Ok(items.into_iter().map(shortlist_item_from_row).collect())
    }

    async fn create_auction(
        &self,
        buyer: BuyerId,
        vehicles: Vec<AuctionVehicle>,
        dealers: Vec<DealerId>,
        deposit: Cents,
        now: DateTime<Utc>,
    ) -> Result<AuctionId> {
        let mut tx = self.0.begin().await?;
        let id = auctions::insert(&mut tx, buyer.0, now).await?;
        let vehicle_rows: Vec<_> = vehicles
            .iter()
            .map(|v| auctions::AuctionVehicle {
                vehicle_id: v.vehicle_id.0,
                is_primary_choice: v.is_primary_choice,
            })
            .collect();
        auctions::insert_vehicles(&mut tx, id, &vehicle_rows).await?;
        let dealer_ids: Vec<_> = dealers.iter().map(|d| d.0).collect();
        auction_participants::insert_all(&mut tx, id, &dealer_ids, now).await?;
        deposits::insert(&mut tx, id, buyer.0, deposit.0, now).await?;
        tx.commit().await?;
        Ok(AuctionId(id))
    }

    async fn auction(&self, id: AuctionId) -> Result<Option<Auction>> {
        let mut ex = self.0.acquire().await?;
        Ok(auctions::fetch(&mut ex, id.0).await?.map(auction_from_row))
    }

    async fn auction_vehicles(&self, id: AuctionId) -> Result<Vec<AuctionVehicle>> {
        let mut ex = self.0.acquire().await?;
        let rows = auctions::vehicles(&mut ex, id.0).await?;
        Ok(rows
            .into_iter()
            .map(|row| AuctionVehicle {
                vehicle_id: VehicleId(row.vehicle_id),
                is_primary_choice: row.is_primary_choice,
            })
            .collect())
    }

    async fn is_invited(&self, id: AuctionId, dealer: DealerId) -> Result<bool> {
        let mut ex = self.0.acquire().await?;
        Ok(auction_participants::is_invited(&mut ex, id.0, dealer.0).await?)
    }

    async fn open_auction(
        &self,
        id: AuctionId,
        opened_at: DateTime<Utc>,
        closes_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut ex = self.0.acquire().await?;
        Ok(auctions::set_open(&mut ex, id.0, opened_at, closes_at).await?)
    }

    async fn transition_auction(
        &self,
        id: AuctionId,
        from: AuctionStatus,
        to: AuctionStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut ex = self.0.acquire().await?;
        Ok(auctions::update_status_guarded(
            &mut ex,
            id.0,
            auction_status_to_row(from),
            auction_status_to_row(to),
            now,
        )
        .await?)
    }

    async fn open_auctions_past_deadline(&self, now: DateTime<Utc>) -> Result<Vec<Auction>> {
        let mut ex = self.0.acquire().await?;
        let rows = auctions::open_past_deadline(&mut ex, now).await?;
        Ok(rows.into_iter().map(auction_from_row).collect())
    }

    async fn submit_offer(
        &self,
        auction: AuctionId,
        dealer: DealerId,
        vehicle: VehicleId,
        price: Cents,
        financing: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<OfferId> {
        let mut tx = self.0.begin().await?;
        let id = offers::supersede_and_insert(
            &mut tx,
            auction.0,
            dealer.0,
            vehicle.0,
            price.0,
            financing.as_ref(),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(OfferId(id))
    }

    async fn offer(&self, id: OfferId) -> Result<Option<Offer>> {
        let mut ex = self.0.acquire().await?;
        Ok(offers::fetch(&mut ex, id.0).await?.map(offer_from_row))
    }

    async fn offers_for_dealer(&self, auction: AuctionId, dealer: DealerId) -> Result<Vec<Offer>> {
        let mut ex = self.0.acquire().await?;
        let rows = offers::for_dealer(&mut ex, auction.0, dealer.0).await?;
        Ok(rows.into_iter().map(offer_from_row).collect())
    }

    async fn offers_for_auction(&self, auction: AuctionId) -> Result<Vec<Offer>> {
        let mut ex = self.0.acquire().await?;
        let rows = offers::all_for_auction(&mut ex, auction.0).await?;
        Ok(rows.into_iter().map(offer_from_row).collect())
    }

    async fn offer_count(&self, auction: AuctionId) -> Result<i64> {
        let mut ex = self.0.acquire().await?;
        Ok(offers::count_for_auction(&mut ex, auction.0).await?)
    }

    async fn accepted_offer_count(&self, auction: AuctionId) -> Result<i64> {
        let mut ex = self.0.acquire().await?;
        Ok(offers::count_accepted(&mut ex, auction.0).await?)
    }

    async fn decide_winner(
        &self,
        auction: AuctionId,
        offer: OfferId,
        base_fee: Cents,
        now: DateTime<Utc>,
    ) -> Result<DealId> {
        let mut tx = self.0.begin().await?;

        let auction_row = auctions::fetch(&mut tx, auction.0)
            .await?
            .ok_or(Error::NotFound("auction"))?;
        let offer_row = offers::fetch(&mut tx, offer.0)
            .await?
            .ok_or(Error::NotFound("offer"))?;
        if offer_row.auction_id != auction.0 {
            return Err(Error::Validation(
                "offer does not belong to this auction".into(),
            ));
        }

        // only the first caller observes Closed; the loser gets AlreadyDecided
        let flipped = auctions::update_status_guarded(
            &mut tx,
            auction.0,
            auctions::AuctionStatus::Closed,
            auctions::AuctionStatus::Completed,
            now,
        )
        .await?;
        if !flipped {
            return Err(Error::AlreadyDecided);
        }
        if !offers::accept_exclusive(&mut tx, auction.0, offer.0, now).await? {
            // dropping the uncommitted transaction rolls the flip back
            return Err(Error::StaleState("offer is no longer live"));
        }

        let deal = selected_deals::insert(
            &mut tx,
            auction.0,
            auction_row.buyer_id,
            offer_row.dealer_id,
            offer.0,
            offer_row.vehicle_id,
            now,
        )
        .await?;

        // the deposit credit is applied exactly once, here
        let credited = deposits::mark_credited(&mut tx, auction.0, deal).await?;
        let credit = if credited {
            let deposit = deposits::fetch_for_auction(&mut tx, auction.0)
                .await?
                .ok_or(Error::NotFound("deposit"))?;
            deposit.amount_cents.min(base_fee.0)
        } else {
            0
        };
        service_fees::insert(&mut tx, deal, base_fee.0, credit, now).await?;
        deal_events::insert(
            &mut tx,
            &deal_events::DealEvent {
                deal_id: deal,
                timestamp: now,
                status: selected_deals::DealStatus::PendingFinancing,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(DealId(deal))
    }

    async fn deposit_for_auction(&self, auction: AuctionId) -> Result<Option<Deposit>> {
        let mut ex = self.0.acquire().await?;
        Ok(deposits::fetch_for_auction(&mut ex, auction.0)
            .await?
            .map(deposit_from_row))
    }

    async fn settle_deposit_paid(&self, auction: AuctionId) -> Result<bool> {
        let mut ex = self.0.acquire().await?;
        Ok(deposits::mark_paid(&mut ex, auction.0).await?)
    }

    async fn settle_deposit_failed(&self, auction: AuctionId) -> Result<bool> {
        let mut ex = self.0.acquire().await?;
        Ok(deposits::mark_failed(&mut ex, auction.0).await?)
    }

    async fn begin_deposit_refund(&self, auction: AuctionId) -> Result<bool> {
        let mut ex = self.0.acquire().await?;
        Ok(deposits::mark_refund_pending(&mut ex, auction.0).await?)
    }

    async fn settle_deposit_refunded(
        &self,
        auction: AuctionId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut ex = self.0.acquire().await?;
        Ok(deposits::mark_refunded(&mut ex, auction.0, now).await?)
    }

    async fn refund_pending_auctions(&self) -> Result<Vec<AuctionId>> {
        let mut ex = self.0.acquire().await?;
        let rows = deposits::refund_pending(&mut ex).await?;
        Ok(rows.into_iter().map(|row| AuctionId(row.auction_id)).collect())
    }

    async fn deal(&self, id: DealId) -> Result<Option<SelectedDeal>> {
        let mut ex = self.0.acquire().await?;
        Ok(selected_deals::fetch(&mut ex, id.0).await?.map(deal_from_row))
    }

    async fn deal_for_auction(&self, auction: AuctionId) -> Result<Option<SelectedDeal>> {
        let mut ex = self.0.acquire().await?;
        Ok(selected_deals::fetch_for_auction(&mut ex, auction.0)
            .await?
            .map(deal_from_row))
    }

    async fn transition_deal(
        &self,
        id: DealId,
        from: DealStatus,
        to: DealStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut ex = self.0.acquire().await?;
        Ok(selected_deals::update_status_guarded(
            &mut ex,
            id.0,
            deal_status_to_row(from),
            deal_status_to_row(to),
            now,
        )
        .await?)
    }

    async fn set_financing(
        &self,
        id: DealId,
        path: FinancingPath,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut ex = self.0.acquire().await?;
        let (path, lender_ref) = match &path {
            FinancingPath::Cash => ("cash", None),
            FinancingPath::Lender { lender_ref } => ("lender", Some(lender_ref.as_str())),
        };
        Ok(selected_deals::set_financing(&mut ex, id.0, path, lender_ref, now).await?)
    }

    async fn set_insurance_evidence(
        &self,
        id: DealId,
        evidence: InsuranceEvidence,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut ex = self.0.acquire().await?;
        Ok(
            selected_deals::set_insurance_evidence(&mut ex, id.0, &evidence.to_string(), now)
                .await?,
        )
    }

    async fn set_contract_document(
        &self,
        id: DealId,
        document: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut ex = self.0.acquire().await?;
        selected_deals::set_contract_document(&mut ex, id.0, &document, now).await?;
        Ok(())
    }

    async fn set_esign_completed(&self, id: DealId, now: DateTime<Utc>) -> Result<bool> {
        let mut ex = self.0.acquire().await?;
        Ok(selected_deals::set_esign_completed(&mut ex, id.0, now).await?)
    }

    async fn set_pickup_code(&self, id: DealId, code: String, now: DateTime<Utc>) -> Result<bool> {
        let mut ex = self.0.acquire().await?;
        Ok(selected_deals::set_pickup_code(&mut ex, id.0, &code, now).await?)
    }

    async fn fee_for_deal(&self, deal: DealId) -> Result<Option<ServiceFee>> {
        let mut ex = self.0.acquire().await?;
        Ok(service_fees::fetch_for_deal(&mut ex, deal.0)
            .await?
            .map(fee_from_row))
    }

    async fn collect_fee(
        &self,
        deal: DealId,
        method: FeeCollection,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut ex = self.0.acquire().await?;
        Ok(service_fees::mark_collected(&mut ex, deal.0, &method.to_string(), now).await?)
    }

    async fn record_deal_event(
        &self,
        deal: DealId,
        status: DealStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut ex = self.0.acquire().await?;
        deal_events::insert(
            &mut ex,
            &deal_events::DealEvent {
                deal_id: deal.0,
                timestamp: now,
                status: deal_status_to_row(status),
            },
        )
        .await?;
        Ok(())
    }

    async fn deal_events(&self, deal: DealId) -> Result<Vec<(DateTime<Utc>, DealStatus)>> {
        let mut ex = self.0.acquire().await?;
        let events = deal_events::fetch_all(&mut ex, deal.0).await?;
        Ok(events
            .into_iter()
            .map(|event| (event.timestamp, deal_status_from_row(event.status)))
            .collect())
    }

    async fn delete_deal_events_before(&self, timestamp: DateTime<Utc>) -> Result<u64> {
        let mut ex = self.0.acquire().await?;
        Ok(deal_events::delete_before(&mut ex, timestamp).await?)
    }
}

fn shortlist_item_from_row(row: shortlist_items::ShortlistItem) -> ShortlistItem {
    ShortlistItem {
        buyer_id: BuyerId(row.buyer_id),
        vehicle_id: VehicleId(row.vehicle_id),
        note: row.note,
        is_primary_choice: row.is_primary_choice,
        added_at: row.added_at,
        removed_at: row.removed_at,
    }
}

fn auction_from_row(row: auctions::Auction) -> Auction {
    Auction {
        id: AuctionId(row.id),
        buyer_id: BuyerId(row.buyer_id),
        status: auction_status_from_row(row.status),
        created_at: row.created_at,
        opened_at: row.opened_at,
        closes_at: row.closes_at,
        closed_at: row.closed_at,
    }
}

fn auction_status_from_row(status: auctions::AuctionStatus) -> AuctionStatus {
    match status {
        auctions::AuctionStatus::Draft => AuctionStatus::Draft,
        auctions::AuctionStatus::Open => AuctionStatus::Open,
        auctions::AuctionStatus::Closed => AuctionStatus::Closed,
        auctions::AuctionStatus::Completed => AuctionStatus::Completed,
        auctions::AuctionStatus::Cancelled => AuctionStatus::Cancelled,
        auctions::AuctionStatus::NoOffers => AuctionStatus::NoOffers,
    }
}

fn auction_status_to_row(status: AuctionStatus) -> auctions::AuctionStatus {
    match status {
        AuctionStatus::Draft => auctions::AuctionStatus::Draft,
        AuctionStatus::Open => auctions::AuctionStatus::Open,
        AuctionStatus::Closed => auctions::AuctionStatus::Closed,
        AuctionStatus::Completed => auctions::AuctionStatus::Completed,
        AuctionStatus::Cancelled => auctions::AuctionStatus::Cancelled,
        AuctionStatus::NoOffers => auctions::AuctionStatus::NoOffers,
    }
}

fn offer_from_row(row: offers::Offer) -> Offer {
    Offer {
        id: OfferId(row.id),
        auction_id: AuctionId(row.auction_id),
        dealer_id: DealerId(row.dealer_id),
        vehicle_id: VehicleId(row.vehicle_id),
        price: Cents(row.price_cents),
        financing_options: row.financing_options,
        status: offer_status_from_row(row.status),
        submitted_at: row.submitted_at,
        decided_at: row.decided_at,
    }
}

fn offer_status_from_row(status: offers::OfferStatus) -> OfferStatus {
    match status {
        offers::OfferStatus::Pending => OfferStatus::Pending,
        offers::OfferStatus::Active => OfferStatus::Active,
        offers::OfferStatus::Accepted => OfferStatus::Accepted,
        offers::OfferStatus::Rejected => OfferStatus::Rejected,
        offers::OfferStatus::Expired => OfferStatus::Expired,
        offers::OfferStatus::Countered => OfferStatus::Countered,
    }
}

fn deposit_from_row(row: deposits::Deposit) -> Deposit {
    Deposit {
        id: DepositId(row.id),
        auction_id: AuctionId(row.auction_id),
        buyer_id: BuyerId(row.buyer_id),
        amount: Cents(row.amount_cents),
        status: match row.status {
            deposits::DepositStatus::Pending => DepositStatus::Pending,
            deposits::DepositStatus::Paid => DepositStatus::Paid,
            deposits::DepositStatus::RefundPending => DepositStatus::RefundPending,
            deposits::DepositStatus::Refunded => DepositStatus::Refunded,
            deposits::DepositStatus::Failed => DepositStatus::Failed,
        },
        created_at: row.created_at,
        refunded_at: row.refunded_at,
        credited_deal: row.credited_deal_id.map(DealId),
    }
}

fn deal_from_row(row: selected_deals::SelectedDeal) -> SelectedDeal {
    let financing = match row.financing_path.as_deref() {
        Some("cash") => Some(FinancingPath::Cash),
        Some("lender") => Some(FinancingPath::Lender {
            lender_ref: row.lender_ref.clone().unwrap_or_default(),
        }),
        _ => None,
    };
    SelectedDeal {
        id: DealId(row.id),
        auction_id: AuctionId(row.auction_id),
        buyer_id: BuyerId(row.buyer_id),
        dealer_id: DealerId(row.dealer_id),
        offer_id: OfferId(row.offer_id),
        vehicle_id: VehicleId(row.vehicle_id),
        status: deal_status_from_row(row.status),
        financing,
        insurance_evidence: row
            .insurance_evidence
            .as_deref()
            .and_then(|evidence| evidence.parse().ok()),
        contract_document: row.contract_document,
        esign_completed_at: row.esign_completed_at,
        pickup_code: row.pickup_code,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn fee_from_row(row: service_fees::ServiceFee) -> ServiceFee {
    ServiceFee {
        deal_id: DealId(row.deal_id),
        base: Cents(row.base_cents),
        deposit_credit: Cents(row.deposit_credit_cents),
        final_amount: Cents(row.final_cents),
        collected: row
            .collected_method
            .as_deref()
            .and_then(|method| method.parse().ok()),
        collected_at: row.collected_at,
    }
}

fn deal_status_from_row(status: selected_deals::DealStatus) -> DealStatus {
    use selected_deals::DealStatus as Row;
    match status {
        Row::PendingFinancing => DealStatus::PendingFinancing,
        Row::FinancingSelected => DealStatus::FinancingSelected,
        Row::FeePending => DealStatus::FeePending,
        Row::FeePaid => DealStatus::FeePaid,
        Row::InsurancePending => DealStatus::InsurancePending,
        Row::InsuranceComplete => DealStatus::InsuranceComplete,
        Row::ContractPending => DealStatus::ContractPending,
        Row::ContractUploaded => DealStatus::ContractUploaded,
        Row::EsignPending => DealStatus::EsignPending,
        Row::EsignComplete => DealStatus::EsignComplete,
        Row::PickupScheduled => DealStatus::PickupScheduled,
        Row::Completed => DealStatus::Completed,
        Row::Cancelled => DealStatus::Cancelled,
    }
}

fn deal_status_to_row(status: DealStatus) -> selected_deals::DealStatus {
    use selected_deals::DealStatus as Row;
    match status {
        DealStatus::PendingFinancing => Row::PendingFinancing,
        DealStatus::FinancingSelected => Row::FinancingSelected,
        DealStatus::FeePending => Row::FeePending,
        DealStatus::FeePaid => Row::FeePaid,
        DealStatus::InsurancePending => Row::InsurancePending,
        DealStatus::InsuranceComplete => Row::InsuranceComplete,
        DealStatus::ContractPending => Row::ContractPending,
        DealStatus::ContractUploaded => Row::ContractUploaded,
        DealStatus::EsignPending => Row::EsignPending,
        DealStatus::EsignComplete => Row::EsignComplete,
        DealStatus::PickupScheduled => Row::PickupScheduled,
        DealStatus::Completed => Row::Completed,
        DealStatus::Cancelled => Row::Cancelled,
    }
}
