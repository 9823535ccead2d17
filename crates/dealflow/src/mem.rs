//! In-memory [`Storage`] for component tests. One mutex guards the whole
//! state, so every operation is atomic and the guarded check-and-set
//! semantics match the Postgres implementation.

use {
    crate::{
        error::{Error, Result},
        storage::Storage,
    },
    chrono::{DateTime, Utc},
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
    std::{
        collections::{HashMap, HashSet},
        sync::Mutex,
    },
};

#[derive(Default)]
pub struct InMemory(Mutex<State>);

#[derive(Default)]
struct State {
    next_id: i64,
    shortlist: Vec<ShortlistItem>,
    auctions: HashMap<AuctionId, Auction>,
    vehicles: HashMap<AuctionId, Vec<AuctionVehicle>>,
    participants: HashMap<AuctionId, HashSet<DealerId>>,
    offers: HashMap<OfferId, Offer>,
    deposits: HashMap<AuctionId, Deposit>,
    deals: HashMap<DealId, SelectedDeal>,
    fees: HashMap<DealId, ServiceFee>,
    events: Vec<(DealId, DateTime<Utc>, DealStatus)>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[async_trait::async_trait]
impl Storage for InMemory {
    async fn add_shortlist_item(
        &self,
        buyer: BuyerId,
        vehicle: VehicleId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        if let Some(item) = state
            .shortlist
            .iter_mut()
            .find(|item| item.buyer_id == buyer && item.vehicle_id == vehicle)
        {
            if item.is_active() {
                return Ok(());
            }
            let active = state
                .shortlist
                .iter()
                .filter(|item| item.buyer_id == buyer && item.is_active())
                .count();
            if active >= usize::try_from(SHORTLIST_CAPACITY).unwrap() {
                return Err(Error::CapacityExceeded);
            }
            let item = state
                .shortlist
                .iter_mut()
                .find(|item| item.buyer_id == buyer && item.vehicle_id == vehicle)
                .unwrap();
            item.removed_at = None;
            item.note = note;
            item.added_at = now;
            return Ok(());
        }
        let active = state
            .shortlist
            .iter()
            .filter(|item| item.buyer_id == buyer && item.is_active())
            .count();
        if active >= usize::try_from(SHORTLIST_CAPACITY).unwrap() {
            return Err(Error::CapacityExceeded);
        }
        state.shortlist.push(ShortlistItem {
            buyer_id: buyer,
            vehicle_id: vehicle,
            note,
            is_primary_choice: false,
            added_at: now,
            removed_at: None,
        });
        Ok(())
    }

    async fn remove_shortlist_item(
        &self,
        buyer: BuyerId,
        vehicle: VehicleId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        if let Some(item) = state.shortlist.iter_mut().find(|item| {
            item.buyer_id == buyer && item.vehicle_id == vehicle && item.is_active()
        }) {
            item.removed_at = Some(now);
        }
        Ok(())
    }

    async fn mark_primary_choice(&self, buyer: BuyerId, vehicle: VehicleId) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        for item in state
            .shortlist
            .iter_mut()
            .filter(|item| item.buyer_id == buyer && item.is_active())
        {
            item.is_primary_choice = item.vehicle_id == vehicle;
        }
        Ok(())
    }

    async fn active_shortlist(&self, buyer: BuyerId) -> Result<Vec<ShortlistItem>> {
        let state = self.0.lock().unwrap();
        Ok(state
            .shortlist
            .iter()
            .filter(|item| item.buyer_id == buyer && item.is_active())
            .cloned()
            .collect())
    }

    async fn create_auction(
        &self,
        buyer: BuyerId,
        vehicles: Vec<AuctionVehicle>,
        dealers: Vec<DealerId>,
        deposit: Cents,
        now: DateTime<Utc>,
    ) -> Result<AuctionId> {
        let mut state = self.0.lock().unwrap();
        let id = AuctionId(state.next_id());
        state.auctions.insert(
            id,
            Auction {
                id,
                buyer_id: buyer,
                status: AuctionStatus::Draft,
                created_at: now,
                opened_at: None,
                closes_at: None,
                closed_at: None,
            },
        );
        state.vehicles.insert(id, vehicles);
        state.participants.insert(id, dealers.into_iter().collect());
        let deposit_id = DepositId(state.next_id());
        state.deposits.insert(
            id,
            Deposit {
                id: deposit_id,
                auction_id: id,
                buyer_id: buyer,
                amount: deposit,
                status: DepositStatus::Pending,
                created_at: now,
                refunded_at: None,
                credited_deal: None,
            },
        );
        Ok(id)
    }

    async fn auction(&self, id: AuctionId) -> Result<Option<Auction>> {
        Ok(self.0.lock().unwrap().auctions.get(&id).cloned())
    }

    async fn auction_vehicles(&self, id: AuctionId) -> Result<Vec<AuctionVehicle>> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .vehicles
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_invited(&self, id: AuctionId, dealer: DealerId) -> Result<bool> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .participants
            .get(&id)
            .is_some_and(|dealers| dealers.contains(&dealer)))
    }

    async fn open_auction(
        &self,
        id: AuctionId,
        opened_at: DateTime<Utc>,
        closes_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.0.lock().unwrap();
        match state.auctions.get_mut(&id) {
            Some(auction) if auction.status == AuctionStatus::Draft => {
                auction.status = AuctionStatus::Open;
                auction.opened_at = Some(opened_at);
                auction.closes_at = Some(closes_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_auction(
        &self,
        id: AuctionId,
        from: AuctionStatus,
        to: AuctionStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.0.lock().unwrap();
        match state.auctions.get_mut(&id) {
            Some(auction) if auction.status == from => {
                auction.status = to;
                if from == AuctionStatus::Open {
                    auction.closed_at = Some(now);
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn open_auctions_past_deadline(&self, now: DateTime<Utc>) -> Result<Vec<Auction>> {
        let state = self.0.lock().unwrap();
        let mut auctions: Vec<_> = state
            .auctions
            .values()
            .filter(|auction| {
                auction.status == AuctionStatus::Open
                    && auction.closes_at.is_some_and(|deadline| deadline <= now)
            })
            .cloned()
            .collect();
        auctions.sort_by_key(|auction| auction.closes_at);
        Ok(auctions)
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
        let mut state = self.0.lock().unwrap();
        for offer in state.offers.values_mut().filter(|offer| {
            offer.auction_id == auction && offer.dealer_id == dealer && !offer.status.is_terminal()
        }) {
            offer.status = OfferStatus::Countered;
            offer.decided_at = Some(now);
        }
        let id = OfferId(state.next_id());
        state.offers.insert(
            id,
            Offer {
                id,
                auction_id: auction,
                dealer_id: dealer,
                vehicle_id: vehicle,
                price,
                financing_options: financing,
                status: OfferStatus::Active,
                submitted_at: now,
                decided_at: None,
            },
        );
        Ok(id)
    }

    async fn offer(&self, id: OfferId) -> Result<Option<Offer>> {
        Ok(self.0.lock().unwrap().offers.get(&id).cloned())
    }

    async fn offers_for_dealer(&self, auction: AuctionId, dealer: DealerId) -> Result<Vec<Offer>> {
        let state = self.0.lock().unwrap();
        let mut offers: Vec<_> = state
            .offers
            .values()
            .filter(|offer| offer.auction_id == auction && offer.dealer_id == dealer)
            .cloned()
            .collect();
        offers.sort_by_key(|offer| offer.id);
        Ok(offers)
    }

    async fn offers_for_auction(&self, auction: AuctionId) -> Result<Vec<Offer>> {
        let state = self.0.lock().unwrap();
        let mut offers: Vec<_> = state
            .offers
            .values()
            .filter(|offer| offer.auction_id == auction)
            .cloned()
            .collect();
        offers.sort_by_key(|offer| offer.id);
        Ok(offers)
    }

    async fn offer_count(&self, auction: AuctionId) -> Result<i64> {
        let state = self.0.lock().unwrap();
        Ok(i64::try_from(
            state
                .offers
                .values()
                .filter(|offer| offer.auction_id == auction)
                .count(),
        )
        .unwrap())
    }

    async fn accepted_offer_count(&self, auction: AuctionId) -> Result<i64> {
        let state = self.0.lock().unwrap();
        Ok(i64::try_from(
            state
                .offers
                .values()
                .filter(|offer| {
                    offer.auction_id == auction && offer.status == OfferStatus::Accepted
                })
                .count(),
        )
        .unwrap())
    }

    async fn decide_winner(
        &self,
        auction: AuctionId,
        offer: OfferId,
        base_fee: Cents,
        now: DateTime<Utc>,
    ) -> Result<DealId> {
        let mut state = self.0.lock().unwrap();
        let auction_row = state
            .auctions
            .get(&auction)
            .cloned()
            .ok_or(Error::NotFound("auction"))?;
        let offer_row = state
            .offers
            .get(&offer)
            .cloned()
            .ok_or(Error::NotFound("offer"))?;
        if offer_row.auction_id != auction {
            return Err(Error::Validation(
                "offer does not belong to this auction".into(),
            ));
        }
        if auction_row.status != AuctionStatus::Closed {
            return Err(Error::AlreadyDecided);
        }
        if offer_row.status.is_terminal() {
            return Err(Error::StaleState("offer is no longer live"));
        }

        let entry = state.auctions.get_mut(&auction).unwrap();
        entry.status = AuctionStatus::Completed;
        for other in state
            .offers
            .values_mut()
            .filter(|other| other.auction_id == auction && !other.status.is_terminal())
        {
            other.status = if other.id == offer {
                OfferStatus::Accepted
            } else {
                OfferStatus::Rejected
            };
            other.decided_at = Some(now);
        }

        let deal = DealId(state.next_id());
        state.deals.insert(
            deal,
            SelectedDeal {
                id: deal,
                auction_id: auction,
                buyer_id: auction_row.buyer_id,
                dealer_id: offer_row.dealer_id,
                offer_id: offer,
                vehicle_id: offer_row.vehicle_id,
                status: DealStatus::PendingFinancing,
                financing: None,
                insurance_evidence: None,
                contract_document: None,
                esign_completed_at: None,
                pickup_code: None,
                created_at: now,
                updated_at: now,
            },
        );
        let credit = match state.deposits.get_mut(&auction) {
            Some(deposit)
                if deposit.status == DepositStatus::Paid && deposit.credited_deal.is_none() =>
            {
                deposit.credited_deal = Some(deal);
                deposit.amount.min(base_fee)
            }
            _ => Cents(0),
        };
        state.fees.insert(
            deal,
            ServiceFee {
                deal_id: deal,
                base: base_fee,
                deposit_credit: credit,
                final_amount: base_fee.saturating_sub(credit),
                collected: None,
                collected_at: None,
            },
        );
        state.events.push((deal, now, DealStatus::PendingFinancing));
        Ok(deal)
    }

    async fn deposit_for_auction(&self, auction: AuctionId) -> Result<Option<Deposit>> {
        Ok(self.0.lock().unwrap().deposits.get(&auction).cloned())
    }

    async fn settle_deposit_paid(&self, auction: AuctionId) -> Result<bool> {
        let mut state = self.0.lock().unwrap();
        match state.deposits.get_mut(&auction) {
            Some(deposit) if deposit.status == DepositStatus::Pending => {
                deposit.status = DepositStatus::Paid;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn settle_deposit_failed(&self, auction: AuctionId) -> Result<bool> {
        let mut state = self.0.lock().unwrap();
        match state.deposits.get_mut(&auction) {
            Some(deposit) if deposit.status == DepositStatus::Pending => {
                deposit.status = DepositStatus::Failed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn begin_deposit_refund(&self, auction: AuctionId) -> Result<bool> {
        let mut state = self.0.lock().unwrap();
        match state.deposits.get_mut(&auction) {
            Some(deposit)
                if matches!(
                    deposit.status,
                    DepositStatus::Paid | DepositStatus::RefundPending
                ) && deposit.credited_deal.is_none() =>
            {
                deposit.status = DepositStatus::RefundPending;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn settle_deposit_refunded(&self, auction: AuctionId, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.0.lock().unwrap();
        match state.deposits.get_mut(&auction) {
            Some(deposit) if deposit.status == DepositStatus::RefundPending => {
                deposit.status = DepositStatus::Refunded;
                deposit.refunded_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn refund_pending_auctions(&self) -> Result<Vec<AuctionId>> {
        let state = self.0.lock().unwrap();
        let mut auctions: Vec<_> = state
            .deposits
            .values()
            .filter(|deposit| deposit.status == DepositStatus::RefundPending)
            .map(|deposit| deposit.auction_id)
            .collect();
        auctions.sort();
        Ok(auctions)
    }

    async fn deal(&self, id: DealId) -> Result<Option<SelectedDeal>> {
        Ok(self.0.lock().unwrap().deals.get(&id).cloned())
    }

    async fn deal_for_auction(&self, auction: AuctionId) -> Result<Option<SelectedDeal>> {
        let state = self.0.lock().unwrap();
        Ok(state
            .deals
            .values()
            .find(|deal| deal.auction_id == auction)
            .cloned())
    }

    async fn transition_deal(
        &self,
        id: DealId,
        from: DealStatus,
        to: DealStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.0.lock().unwrap();
        match state.deals.get_mut(&id) {
            Some(deal) if deal.status == from => {
                deal.status = to;
                deal.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_financing(
        &self,
        id: DealId,
        path: FinancingPath,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.0.lock().unwrap();
        match state.deals.get_mut(&id) {
            Some(deal) if deal.financing.is_none() => {
                deal.financing = Some(path);
                deal.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_insurance_evidence(
        &self,
        id: DealId,
        evidence: InsuranceEvidence,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.0.lock().unwrap();
        match state.deals.get_mut(&id) {
            Some(deal) if deal.insurance_evidence.is_none() => {
                deal.insurance_evidence = Some(evidence);
                deal.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_contract_document(
        &self,
        id: DealId,
        document: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        if let Some(deal) = state.deals.get_mut(&id) {
            deal.contract_document = Some(document);
            deal.updated_at = now;
        }
        Ok(())
    }

    async fn set_esign_completed(&self, id: DealId, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.0.lock().unwrap();
        match state.deals.get_mut(&id) {
            Some(deal) if deal.esign_completed_at.is_none() => {
                deal.esign_completed_at = Some(now);
                deal.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_pickup_code(&self, id: DealId, code: String, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.0.lock().unwrap();
        match state.deals.get_mut(&id) {
            Some(deal) if deal.pickup_code.is_none() => {
                deal.pickup_code = Some(code);
                deal.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fee_for_deal(&self, deal: DealId) -> Result<Option<ServiceFee>> {
        Ok(self.0.lock().unwrap().fees.get(&deal).cloned())
    }

    async fn collect_fee(
        &self,
        deal: DealId,
        method: FeeCollection,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.0.lock().unwrap();
        match state.fees.get_mut(&deal) {
            Some(fee) if fee.collected.is_none() => {
                fee.collected = Some(method);
                fee.collected_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_deal_event(
        &self,
        deal: DealId,
        status: DealStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        // duplicate consecutive statuses are dropped, as in the database
        let latest = state
            .events
            .iter()
            .filter(|(id, ..)| *id == deal)
            .next_back();
        if latest.is_none_or(|(_, _, previous)| *previous != status) {
            state.events.push((deal, now, status));
        }
        Ok(())
    }

    async fn deal_events(&self, deal: DealId) -> Result<Vec<(DateTime<Utc>, DealStatus)>> {
        let state = self.0.lock().unwrap();
        Ok(state
            .events
            .iter()
            .filter(|(id, ..)| *id == deal)
            .map(|(_, timestamp, status)| (*timestamp, *status))
            .collect())
    }

    async fn delete_deal_events_before(&self, timestamp: DateTime<Utc>) -> Result<u64> {
        let mut state = self.0.lock().unwrap();
        let before = state.events.len();
        state.events.retain(|(_, at, _)| *at >= timestamp);
        Ok((before - state.events.len()) as u64)
    }
}
