use {
    crate::selected_deals::DealId,
    chrono::{DateTime, Utc},
    sqlx::PgConnection,
};

#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct ServiceFee {
    pub deal_id: DealId,
    pub base_cents: i64,
    pub deposit_credit_cents: i64,
    pub final_cents: i64,
    pub collected_method: Option<String>,
    pub collected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub async fn insert(
    ex: &mut PgConnection,
    deal_id: DealId,
    base_cents: i64,
    deposit_credit_cents: i64,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO service_fees (deal_id, base_cents, deposit_credit_cents, final_cents, created_at)
VALUES ($1, $2, $3, $2 - $3, $4)
    ;"#;
    sqlx::query(QUERY)
        .bind(deal_id)
        .bind(base_cents)
        .bind(deposit_credit_cents)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn fetch_for_deal(
    ex: &mut PgConnection,
    deal_id: DealId,
) -> Result<Option<ServiceFee>, sqlx::Error> {
    const QUERY: &str = r#"SELECT * FROM service_fees WHERE deal_id = $1;"#;
    sqlx::query_as(QUERY).bind(deal_id).fetch_optional(ex).await
}

/// Records the collection method. Guarded so the first confirmed method
/// permanently disables the other.
pub async fn mark_collected(
    ex: &mut PgConnection,
    deal_id: DealId,
    method: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE service_fees
SET collected_method = $2, collected_at = $3
WHERE deal_id = $1 AND collected_method IS NULL
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(deal_id)
        .bind(method)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use {super::*, sqlx::Connection};

    #[tokio::test]
    #[ignore]
    async fn postgres_collection_methods_mutually_exclusive() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER(&mut db).await.unwrap();

        let now = Utc::now();
        let auction = crate::auctions::insert(&mut db, 1, now).await.unwrap();
        crate::auctions::set_open(&mut db, auction, now, now + chrono::Duration::hours(1))
            .await
            .unwrap();
        let mut tx = sqlx::Connection::begin(&mut *db).await.unwrap();
        let offer =
            crate::offers::supersede_and_insert(&mut tx, auction, 10, 7, 2_750_000, None, now)
                .await
                .unwrap();
        tx.commit().await.unwrap();
        let deal = crate::selected_deals::insert(&mut db, auction, 1, 10, offer, 7, now)
            .await
            .unwrap();

        insert(&mut db, deal, 49_900, 9_900, now).await.unwrap();
        let fee = fetch_for_deal(&mut db, deal).await.unwrap().unwrap();
        assert_eq!(fee.final_cents, 40_000);

        assert!(mark_collected(&mut db, deal, "direct_capture", now).await.unwrap());
        // the other method is permanently disabled
        assert!(!mark_collected(&mut db, deal, "loan_inclusion", now).await.unwrap());
        let fee = fetch_for_deal(&mut db, deal).await.unwrap().unwrap();
        assert_eq!(fee.collected_method.as_deref(), Some("direct_capture"));
    }
}
