//! Sealed-bid offer intake. Dealers see their own offers only; the
//! all-offers read is restricted to the owning buyer or an admin and only
//! once the auction has left the open state.

use {
    crate::{
        error::{Error, Result},
        storage::Storage,
    },
    chrono::Utc,
    model::{
        auction::AuctionStatus,
        ids::{AuctionId, BuyerId, DealerId, OfferId, VehicleId},
        money::Cents,
        offer::Offer,
    },
    std::sync::Arc,
};

/// Who is asking on the unsealed read path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Caller {
    Buyer(BuyerId),
    Admin,
}

pub struct OfferIntake {
    store: Arc<dyn Storage>,
}

impl OfferIntake {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    /// Submits a sealed offer. A prior live offer from the same dealer is
    /// marked countered; this supersede is the only offer mutation a
    /// dealer may perform. Submissions from different dealers never block
    /// one another.
    pub async fn submit_offer(
        &self,
        auction: AuctionId,
        dealer: DealerId,
        vehicle: VehicleId,
        price: Cents,
        financing_options: Option<serde_json::Value>,
    ) -> Result<OfferId> {
        if !price.is_positive() {
            return Err(Error::Validation("offer price must be positive".into()));
        }
        let now = Utc::now();
        let auction_row = self
            .store
            .auction(auction)
            .await?
            .ok_or(Error::NotFound("auction"))?;
        if !auction_row.accepts_offers(now) {
            return Err(Error::AuctionNotOpen);
        }
        if !self.store.is_invited(auction, dealer).await? {
            return Err(Error::Validation(
                "dealer is not invited to this auction".into(),
            ));
        }
        let vehicles = self.store.auction_vehicles(auction).await?;
        if !vehicles.iter().any(|v| v.vehicle_id == vehicle) {
            return Err(Error::Validation(
                "vehicle is not part of this auction".into(),
            ));
        }
        let id = self
            .store
            .submit_offer(auction, dealer, vehicle, price, financing_options, now)
            .await?;
        tracing::debug!(?auction, ?dealer, offer = ?id, "offer submitted");
        Ok(id)
    }

    /// A dealer's own offers, including superseded ones. The sealed-bid
    /// read path: never exposes another dealer's price.
    pub async fn dealer_offers(&self, auction: AuctionId, dealer: DealerId) -> Result<Vec<Offer>> {
        self.store.offers_for_dealer(auction, dealer).await
    }

    /// Every offer on the auction, for the owning buyer or an admin.
    /// Sealed until the auction leaves the open state.
    pub async fn all_offers(&self, auction: AuctionId, caller: Caller) -> Result<Vec<Offer>> {
        let auction_row = self
            .store
            .auction(auction)
            .await?
            .ok_or(Error::NotFound("auction"))?;
        match caller {
            Caller::Admin => {}
            Caller::Buyer(buyer) if auction_row.buyer_id == buyer => {}
            Caller::Buyer(_) => {
                return Err(Error::Validation("auction belongs to another buyer".into()));
            }
        }
        if matches!(
            auction_row.status,
            AuctionStatus::Draft | AuctionStatus::Open
        ) {
            return Err(Error::PreconditionNotMet {
                condition: "offers stay sealed until the auction closes",
            });
        }
        self.store.offers_for_auction(auction).await
    }
}
