//! Domain types shared by the lifecycle engine and its persistence layer.
//! Pure data, no I/O.

pub mod auction;
pub mod deal;
pub mod ids;
pub mod money;
pub mod offer;
pub mod partner;
pub mod shortlist;

use money::Cents;

/// Maximum number of active (non-removed) items on a buyer's shortlist.
pub const SHORTLIST_CAPACITY: i64 = 10;

/// Flat refundable deposit collected when a buyer initiates an auction.
pub const DEPOSIT_AMOUNT: Cents = Cents(9_900);

/// Base service fee before the deposit credit is applied.
pub const BASE_SERVICE_FEE: Cents = Cents(49_900);
