//! Stores timestamped status events of every deal throughout its pipeline.
//! Used for diagnostics and to audit pipeline monotonicity.

use {
    crate::selected_deals::{DealId, DealStatus},
    chrono::{DateTime, Utc},
    sqlx::PgConnection,
    tracing::instrument,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct DealEvent {
    pub deal_id: DealId,
    pub timestamp: DateTime<Utc>,
    pub status: DealStatus,
}

/// Inserts an event unless the latest event for the deal already carries the
/// same status, so repeated observations do not bloat the table.
pub async fn insert(ex: &mut PgConnection, event: &DealEvent) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
WITH latest AS (
    SELECT status
    FROM deal_events
    WHERE deal_id = $1
    ORDER BY timestamp DESC
    LIMIT 1
)
INSERT INTO deal_events (deal_id, timestamp, status)
SELECT $1, $2, $3
WHERE NOT EXISTS (SELECT 1 FROM latest WHERE status = $3)
    ;"#;
    sqlx::query(QUERY)
        .bind(event.deal_id)
        .bind(event.timestamp)
        .bind(event.status)
        .execute(ex)
        .await
        .map(|_| ())
}

pub async fn fetch_all(
    ex: &mut PgConnection,
    deal_id: DealId,
) -> Result<Vec<DealEvent>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM deal_events WHERE deal_id = $1 ORDER BY timestamp
    ;"#;
    sqlx::query_as(QUERY).bind(deal_id).fetch_all(ex).await
}

pub async fn latest(
    ex: &mut PgConnection,
    deal_id: DealId,
) -> Result<Option<DealEvent>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM deal_events WHERE deal_id = $1 ORDER BY timestamp DESC LIMIT 1
    ;"#;
    sqlx::query_as(QUERY).bind(deal_id).fetch_optional(ex).await
}

/// Deletes rows before the provided timestamp. Returns the number of rows
/// removed; called by the periodic cleanup task.
#[instrument(skip_all)]
pub async fn delete_before(
    ex: &mut PgConnection,
    timestamp: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = r#"DELETE FROM deal_events WHERE timestamp < $1;"#;
    sqlx::query(QUERY)
        .bind(timestamp)
        .execute(ex)
        .await
        .map(|result| result.rows_affected())
}
