use {
    crate::auctions::AuctionId,
    chrono::{DateTime, Utc},
    sqlx::PgConnection,
};

pub type DepositId = i64;

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "DepositStatus")]
#[sqlx(rename_all = "snake_case")]
pub enum DepositStatus {
    Pending,
    Paid,
    RefundPending,
    Refunded,
    Failed,
}

#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct Deposit {
    pub id: DepositId,
    pub auction_id: AuctionId,
    pub buyer_id: i64,
    pub amount_cents: i64,
    pub status: DepositStatus,
    pub created_at: DateTime<Utc>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub credited_deal_id: Option<i64>,
}

pub async fn insert(
    ex: &mut PgConnection,
    auction_id: AuctionId,
    buyer_id: i64,
    amount_cents: i64,
    now: DateTime<Utc>,
) -> Result<DepositId, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO deposits (auction_id, buyer_id, amount_cents, status, created_at)
VALUES ($1, $2, $3, 'pending', $4)
RETURNING id
    ;"#;
    let (id,) = sqlx::query_as(QUERY)
        .bind(auction_id)
        .bind(buyer_id)
        .bind(amount_cents)
        .bind(now)
        .fetch_one(ex)
        .await?;
    Ok(id)
}

pub async fn fetch_for_auction(
    ex: &mut PgConnection,
    auction_id: AuctionId,
) -> Result<Option<Deposit>, sqlx::Error> {
    const QUERY: &str = r#"SELECT * FROM deposits WHERE auction_id = $1;"#;
    sqlx::query_as(QUERY)
        .bind(auction_id)
        .fetch_optional(ex)
        .await
}

/// Settles the deposit as paid. Guarded on `Pending` so duplicate payment
/// notifications for an already-settled deposit affect no rows.
pub async fn mark_paid(
    ex: &mut PgConnection,
    auction_id: AuctionId,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE deposits SET status = 'paid' WHERE auction_id = $1 AND status = 'pending'
    ;"#;
    let result = sqlx::query(QUERY).bind(auction_id).execute(ex).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_failed(
    ex: &mut PgConnection,
    auction_id: AuctionId,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE deposits SET status = 'failed' WHERE auction_id = $1 AND status = 'pending'
    ;"#;
    let result = sqlx::query(QUERY).bind(auction_id).execute(ex).await?;
    Ok(result.rows_affected() > 0)
}

/// Starts a refund on a paid, uncredited deposit. The guard makes refund
/// and credit mutually exclusive; an already-started refund matches again
/// so a failed payment call can be retried.
pub async fn mark_refund_pending(
    ex: &mut PgConnection,
    auction_id: AuctionId,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE deposits
SET status = 'refund_pending'
WHERE auction_id = $1
    AND status IN ('paid', 'refund_pending')
    AND credited_deal_id IS NULL
    ;"#;
    let result = sqlx::query(QUERY).bind(auction_id).execute(ex).await?;
    Ok(result.rows_affected() > 0)
}

/// Finishes a refund once the payment collaborator confirmed it.
pub async fn mark_refunded(
    ex: &mut PgConnection,
    auction_id: AuctionId,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE deposits
SET status = 'refunded', refunded_at = $2
WHERE auction_id = $1 AND status = 'refund_pending'
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(auction_id)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Deposits whose refund was started but never confirmed, for the sweep.
pub async fn refund_pending(ex: &mut PgConnection) -> Result<Vec<Deposit>, sqlx::Error> {
    const QUERY: &str = r#"SELECT * FROM deposits WHERE status = 'refund_pending';"#;
    sqlx::query_as(QUERY).fetch_all(ex).await
}

/// Credits a paid, unrefunded deposit against a deal's service fee. Applied
/// at most once; the mirror guard of [`mark_refunded`].
pub async fn mark_credited(
    ex: &mut PgConnection,
    auction_id: AuctionId,
    deal_id: i64,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE deposits
SET credited_deal_id = $2
WHERE auction_id = $1 AND status = 'paid' AND refunded_at IS NULL AND credited_deal_id IS NULL
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(auction_id)
        .bind(deal_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}
