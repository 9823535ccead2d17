use {
    chrono::{DateTime, Utc},
    sqlx::PgConnection,
};

pub type AuctionId = i64;

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "AuctionStatus")]
#[sqlx(rename_all = "snake_case")]
pub enum AuctionStatus {
    Draft,
    Open,
    Closed,
    Completed,
    Cancelled,
    NoOffers,
}

#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct Auction {
    pub id: AuctionId,
    pub buyer_id: i64,
    pub status: AuctionStatus,
    pub created_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closes_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct AuctionVehicle {
    pub vehicle_id: i64,
    pub is_primary_choice: bool,
}

pub async fn insert(
    ex: &mut PgConnection,
    buyer_id: i64,
    now: DateTime<Utc>,
) -> Result<AuctionId, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO auctions (buyer_id, status, created_at)
VALUES ($1, 'draft', $2)
RETURNING id
    ;"#;
    let (id,) = sqlx::query_as(QUERY)
        .bind(buyer_id)
        .bind(now)
        .fetch_one(ex)
        .await?;
    Ok(id)
}

pub async fn insert_vehicles(
    ex: &mut PgConnection,
    auction_id: AuctionId,
    vehicles: &[AuctionVehicle],
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO auction_vehicles (auction_id, vehicle_id, is_primary_choice)
VALUES ($1, $2, $3)
    ;"#;
    for vehicle in vehicles {
        sqlx::query(QUERY)
            .bind(auction_id)
            .bind(vehicle.vehicle_id)
            .bind(vehicle.is_primary_choice)
            .execute(&mut *ex)
            .await?;
    }
    Ok(())
}

pub async fn fetch(
    ex: &mut PgConnection,
    id: AuctionId,
) -> Result<Option<Auction>, sqlx::Error> {
    const QUERY: &str = r#"SELECT * FROM auctions WHERE id = $1;"#;
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

pub async fn vehicles(
    ex: &mut PgConnection,
    id: AuctionId,
) -> Result<Vec<AuctionVehicle>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT vehicle_id, is_primary_choice FROM auction_vehicles WHERE auction_id = $1
    ;"#;
    sqlx::query_as(QUERY).bind(id).fetch_all(ex).await
}

/// Flips `Draft -> Open`, recording the deadline. Returns whether the row
/// was actually in `Draft`.
pub async fn set_open(
    ex: &mut PgConnection,
    id: AuctionId,
    opened_at: DateTime<Utc>,
    closes_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE auctions
SET status = 'open', opened_at = $2, closes_at = $3
WHERE id = $1 AND status = 'draft'
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(id)
        .bind(opened_at)
        .bind(closes_at)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Conditional status flip. Returns whether the row was in the expected
/// status; the loser of a concurrent flip observes `false`.
pub async fn update_status_guarded(
    ex: &mut PgConnection,
    id: AuctionId,
    from: AuctionStatus,
    to: AuctionStatus,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE auctions
SET status = $3,
    closed_at = CASE WHEN $2 = 'open'::AuctionStatus THEN $4 ELSE closed_at END
WHERE id = $1 AND status = $2
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Open auctions whose deadline has passed, for the closing sweep.
pub async fn open_past_deadline(
    ex: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<Vec<Auction>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM auctions
WHERE status = 'open' AND closes_at <= $1
ORDER BY closes_at
    ;"#;
    sqlx::query_as(QUERY).bind(now).fetch_all(ex).await
}
