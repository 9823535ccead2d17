use {
    crate::{
        ids::{AuctionId, DealerId, OfferId, VehicleId},
        money::Cents,
    },
    chrono::{DateTime, Utc},
};

#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    serde::Deserialize,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Active,
    Accepted,
    Rejected,
    Expired,
    /// Superseded by a newer offer from the same dealer.
    Countered,
}

impl OfferStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Active)
    }
}

/// A sealed dealer offer. At most one offer per (auction, dealer) is
/// non-terminal at a time; across an auction at most one offer may ever
/// reach `Accepted`.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Offer {
    pub id: OfferId,
    pub auction_id: AuctionId,
    pub dealer_id: DealerId,
    /// The vehicle from the auction snapshot this offer is for.
    pub vehicle_id: VehicleId,
    /// Out-the-door price.
    pub price: Cents,
    /// Dealer-provided financing sub-options, opaque to the engine.
    pub financing_options: Option<serde_json::Value>,
    pub status: OfferStatus,
    pub submitted_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}
