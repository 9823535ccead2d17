use {
    crate::{PgTransaction, auctions::AuctionId},
    chrono::{DateTime, Utc},
    sqlx::{PgConnection, types::JsonValue},
};

pub type OfferId = i64;

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "OfferStatus")]
#[sqlx(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Active,
    Accepted,
    Rejected,
    Expired,
    Countered,
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Offer {
    pub id: OfferId,
    pub auction_id: AuctionId,
    pub dealer_id: i64,
    pub vehicle_id: i64,
    pub price_cents: i64,
    pub financing_options: Option<JsonValue>,
    pub status: OfferStatus,
    pub submitted_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Inserts a dealer's offer as `Active`, marking any prior live offer from
/// the same dealer `Countered`. Both statements run in the caller's
/// transaction, which keeps the one-live-offer-per-dealer invariant.
pub async fn supersede_and_insert(
    ex: &mut PgTransaction<'_>,
    auction_id: AuctionId,
    dealer_id: i64,
    vehicle_id: i64,
    price_cents: i64,
    financing_options: Option<&JsonValue>,
    now: DateTime<Utc>,
) -> Result<OfferId, sqlx::Error> {
    const SUPERSEDE: &str = r#"
UPDATE auction_offers
SET status = 'countered', decided_at = $3
WHERE auction_id = $1 AND dealer_id = $2 AND status IN ('pending', 'active')
    ;"#;
    const INSERT: &str = r#"
INSERT INTO auction_offers
    (auction_id, dealer_id, vehicle_id, price_cents, financing_options, status, submitted_at)
VALUES ($1, $2, $3, $4, $5, 'active', $6)
RETURNING id
    ;"#;
    sqlx::query(SUPERSEDE)
        .bind(auction_id)
        .bind(dealer_id)
        .bind(now)
        .execute(&mut **ex)
        .await?;
    let (id,) = sqlx::query_as(INSERT)
        .bind(auction_id)
        .bind(dealer_id)
        .bind(vehicle_id)
        .bind(price_cents)
        .bind(financing_options)
        .bind(now)
        .fetch_one(&mut **ex)
        .await?;
    Ok(id)
}

pub async fn fetch(ex: &mut PgConnection, id: OfferId) -> Result<Option<Offer>, sqlx::Error> {
    const QUERY: &str = r#"SELECT * FROM auction_offers WHERE id = $1;"#;
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

/// The sealed-bid read path: a dealer only ever reads offers scoped to
/// their own id. There is deliberately no unscoped per-dealer query.
pub async fn for_dealer(
    ex: &mut PgConnection,
    auction_id: AuctionId,
    dealer_id: i64,
) -> Result<Vec<Offer>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM auction_offers
WHERE auction_id = $1 AND dealer_id = $2
ORDER BY submitted_at
    ;"#;
    sqlx::query_as(QUERY)
        .bind(auction_id)
        .bind(dealer_id)
        .fetch_all(ex)
        .await
}

pub async fn all_for_auction(
    ex: &mut PgConnection,
    auction_id: AuctionId,
) -> Result<Vec<Offer>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM auction_offers WHERE auction_id = $1 ORDER BY submitted_at
    ;"#;
    sqlx::query_as(QUERY).bind(auction_id).fetch_all(ex).await
}

pub async fn count_for_auction(
    ex: &mut PgConnection,
    auction_id: AuctionId,
) -> Result<i64, sqlx::Error> {
    const QUERY: &str = r#"SELECT COUNT(*) FROM auction_offers WHERE auction_id = $1;"#;
    let (count,) = sqlx::query_as(QUERY).bind(auction_id).fetch_one(ex).await?;
    Ok(count)
}

pub async fn count_accepted(
    ex: &mut PgConnection,
    auction_id: AuctionId,
) -> Result<i64, sqlx::Error> {
    const QUERY: &str = r#"
SELECT COUNT(*) FROM auction_offers WHERE auction_id = $1 AND status = 'accepted'
    ;"#;
    let (count,) = sqlx::query_as(QUERY).bind(auction_id).fetch_one(ex).await?;
    Ok(count)
}

/// Accepts the chosen offer and rejects every other live offer on the
/// auction. Returns whether the chosen offer was still live. Runs in the
/// caller's transaction together with the auction status flip.
pub async fn accept_exclusive(
    ex: &mut PgTransaction<'_>,
    auction_id: AuctionId,
    offer_id: OfferId,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const ACCEPT: &str = r#"
UPDATE auction_offers
SET status = 'accepted', decided_at = $3
WHERE id = $2 AND auction_id = $1 AND status IN ('pending', 'active')
    ;"#;
    const REJECT_REST: &str = r#"
UPDATE auction_offers
SET status = 'rejected', decided_at = $3
WHERE auction_id = $1 AND id != $2 AND status IN ('pending', 'active')
    ;"#;
    let accepted = sqlx::query(ACCEPT)
        .bind(auction_id)
        .bind(offer_id)
        .bind(now)
        .execute(&mut **ex)
        .await?
        .rows_affected();
    if accepted == 0 {
        return Ok(false);
    }
    sqlx::query(REJECT_REST)
        .bind(auction_id)
        .bind(offer_id)
        .bind(now)
        .execute(&mut **ex)
        .await?;
    Ok(true)
}
