//! Auction and deal lifecycle engine: sealed-bid reverse auctions among
//! invited dealers, race-free exclusive winner selection, and the gated
//! purchase pipeline that follows, with deposit and service fee
//! bookkeeping.

pub mod arbitrator;
pub mod arguments;
pub mod auction;
pub mod closer;
pub mod collaborators;
pub mod deal;
pub mod deposit;
pub mod error;
pub mod events;
#[cfg(test)]
mod mem;
pub mod offers;
pub mod persistence;
pub mod run;
pub mod shortlist;
pub mod storage;

pub use error::{Error, Result};
