//! Strongly typed identifiers. All of them map to `BIGINT` columns.

macro_rules! id_type {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(
            Clone,
            Copy,
            Debug,
            Default,
            Eq,
            PartialEq,
            Ord,
            PartialOrd,
            Hash,
            serde::Deserialize,
            serde::Serialize,
            derive_more::Display,
            derive_more::From,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);
    };
}

id_type!(
    /// A registered buyer.
    BuyerId
);
id_type!(
    /// A dealer invited to auctions.
    DealerId
);
id_type!(
    /// A listed inventory vehicle.
    VehicleId
);
id_type!(AuctionId);
id_type!(OfferId);
id_type!(
    /// A `SelectedDeal`, created exactly once per auction.
    DealId
);
id_type!(DepositId);
