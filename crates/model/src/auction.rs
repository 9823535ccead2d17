use {
    crate::ids::{AuctionId, BuyerId, VehicleId},
    chrono::{DateTime, Utc},
};

/// Lifecycle of an auction.
///
/// `Draft -> Open -> Closed -> (Completed | NoOffers)`, with `Cancelled`
/// reachable from `Draft` or `Open` only.
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
pub enum AuctionStatus {
    Draft,
    Open,
    Closed,
    Completed,
    Cancelled,
    NoOffers,
}

impl AuctionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoOffers)
    }
}

/// An auction created from a snapshot of a buyer's shortlist. The vehicle
/// set and the invited-dealer set are immutable once the auction is open.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Auction {
    pub id: AuctionId,
    pub buyer_id: BuyerId,
    pub status: AuctionStatus,
    pub created_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closes_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Auction {
    /// Offers are accepted while the auction is open and the deadline has
    /// not passed.
    pub fn accepts_offers(&self, now: DateTime<Utc>) -> bool {
        self.status == AuctionStatus::Open && self.closes_at.is_some_and(|closes| now < closes)
    }
}

/// A vehicle snapshotted into an auction from the shortlist.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuctionVehicle {
    pub vehicle_id: VehicleId,
    pub is_primary_choice: bool,
}
