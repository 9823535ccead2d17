use {
    crate::auctions::AuctionId,
    chrono::{DateTime, Utc},
    sqlx::PgConnection,
};

/// Dealers invited to an auction; one row per dealer per auction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct Participant {
    pub auction_id: AuctionId,
    pub dealer_id: i64,
    pub invited_at: DateTime<Utc>,
}

pub async fn insert_all(
    ex: &mut PgConnection,
    auction_id: AuctionId,
    dealer_ids: &[i64],
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO auction_participants (auction_id, dealer_id, invited_at)
VALUES ($1, $2, $3)
ON CONFLICT DO NOTHING
    ;"#;
    for dealer_id in dealer_ids {
        sqlx::query(QUERY)
            .bind(auction_id)
            .bind(dealer_id)
            .bind(now)
            .execute(&mut *ex)
            .await?;
    }
    Ok(())
}

pub async fn is_invited(
    ex: &mut PgConnection,
    auction_id: AuctionId,
    dealer_id: i64,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
SELECT COUNT(*) FROM auction_participants WHERE auction_id = $1 AND dealer_id = $2
    ;"#;
    let (count,): (i64,) = sqlx::query_as(QUERY)
        .bind(auction_id)
        .bind(dealer_id)
        .fetch_one(ex)
        .await?;
    Ok(count > 0)
}

pub async fn fetch(
    ex: &mut PgConnection,
    auction_id: AuctionId,
) -> Result<Vec<Participant>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM auction_participants WHERE auction_id = $1 ORDER BY dealer_id
    ;"#;
    sqlx::query_as(QUERY).bind(auction_id).fetch_all(ex).await
}
