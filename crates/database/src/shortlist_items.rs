use {
    chrono::{DateTime, Utc},
    sqlx::PgConnection,
};

#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct ShortlistItem {
    pub buyer_id: i64,
    pub vehicle_id: i64,
    pub note: Option<String>,
    pub is_primary_choice: bool,
    pub added_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
}

/// Inserts an item or revives a tombstoned one. Re-adding a vehicle that is
/// already active is a no-op, which makes the operation idempotent.
pub async fn upsert(
    ex: &mut PgConnection,
    buyer_id: i64,
    vehicle_id: i64,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO shortlist_items (buyer_id, vehicle_id, note, added_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (buyer_id, vehicle_id) DO UPDATE
SET note = $3, added_at = $4, removed_at = NULL
WHERE shortlist_items.removed_at IS NOT NULL
    ;"#;
    sqlx::query(QUERY)
        .bind(buyer_id)
        .bind(vehicle_id)
        .bind(note)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(())
}

/// Takes the buyer's transaction-scoped advisory lock. Concurrent adds for
/// one buyer must serialize on this before counting: a `FOR UPDATE` count
/// cannot do it, since with zero active rows it locks nothing, and a blocked
/// transaction re-evaluates only the rows its scan already found, never a
/// concurrent insert.
pub async fn lock_buyer(ex: &mut PgConnection, buyer_id: i64) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"SELECT pg_advisory_xact_lock($1);"#;
    sqlx::query(QUERY).bind(buyer_id).execute(ex).await?;
    Ok(())
}

pub async fn count_active(ex: &mut PgConnection, buyer_id: i64) -> Result<i64, sqlx::Error> {
    const QUERY: &str = r#"
SELECT COUNT(*) FROM shortlist_items
WHERE buyer_id = $1 AND removed_at IS NULL
    ;"#;
    let (count,) = sqlx::query_as(QUERY).bind(buyer_id).fetch_one(ex).await?;
    Ok(count)
}

/// Soft-deletes an item, retaining it for audit. Returns the number of rows
/// affected; removing an absent or already-removed item affects none.
pub async fn soft_remove(
    ex: &mut PgConnection,
    buyer_id: i64,
    vehicle_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE shortlist_items
SET removed_at = $3
WHERE buyer_id = $1 AND vehicle_id = $2 AND removed_at IS NULL
    ;"#;
    Ok(sqlx::query(QUERY)
        .bind(buyer_id)
        .bind(vehicle_id)
        .bind(now)
        .execute(ex)
        .await?
        .rows_affected())
}

/// Marks one active item as the primary choice and clears the mark from the
/// rest, in a single statement so at most one is ever marked.
pub async fn mark_primary(
    ex: &mut PgConnection,
    buyer_id: i64,
    vehicle_id: i64,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE shortlist_items
SET is_primary_choice = (vehicle_id = $2)
WHERE buyer_id = $1 AND removed_at IS NULL
    ;"#;
    Ok(sqlx::query(QUERY)
        .bind(buyer_id)
        .bind(vehicle_id)
        .execute(ex)
        .await?
        .rows_affected())
}

pub async fn active(
    ex: &mut PgConnection,
    buyer_id: i64,
) -> Result<Vec<ShortlistItem>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM shortlist_items
WHERE buyer_id = $1 AND removed_at IS NULL
ORDER BY added_at
    ;"#;
    sqlx::query_as(QUERY).bind(buyer_id).fetch_all(ex).await
}

#[cfg(test)]
mod tests {
    use {super::*, sqlx::Connection};

    #[tokio::test]
    #[ignore]
    async fn postgres_add_remove_readd() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER(&mut db).await.unwrap();

        let now = Utc::now();
        upsert(&mut db, 1, 7, Some("low miles"), now).await.unwrap();
        // idempotent re-add of an active item
        upsert(&mut db, 1, 7, None, now).await.unwrap();
        let items = active(&mut db, 1).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].note.as_deref(), Some("low miles"));

        assert_eq!(soft_remove(&mut db, 1, 7, now).await.unwrap(), 1);
        // second removal is a no-op
        assert_eq!(soft_remove(&mut db, 1, 7, now).await.unwrap(), 0);
        assert!(active(&mut db, 1).await.unwrap().is_empty());

        // the tombstone is revived on re-add
        lock_buyer(&mut db, 1).await.unwrap();
        upsert(&mut db, 1, 7, None, now).await.unwrap();
        assert_eq!(active(&mut db, 1).await.unwrap().len(), 1);
        assert_eq!(count_active(&mut db, 1).await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_single_primary_choice() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER(&mut db).await.unwrap();

        let now = Utc::now();
        for vehicle in [1, 2, 3] {
            upsert(&mut db, 5, vehicle, None, now).await.unwrap();
        }
        mark_primary(&mut db, 5, 2).await.unwrap();
        mark_primary(&mut db, 5, 3).await.unwrap();
        let items = active(&mut db, 5).await.unwrap();
        let primary: Vec<_> = items.iter().filter(|i| i.is_primary_choice).collect();
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].vehicle_id, 3);
    }
}
