use {
    crate::ids::{BuyerId, VehicleId},
    chrono::{DateTime, Utc},
};

/// One candidate vehicle on a buyer's shortlist. Items are soft-removed
/// (tombstoned with a removal timestamp) so historical auctions keep their
/// referential integrity.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ShortlistItem {
    pub buyer_id: BuyerId,
    pub vehicle_id: VehicleId,
    pub note: Option<String>,
    pub is_primary_choice: bool,
    pub added_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
}

impl ShortlistItem {
    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }
}
