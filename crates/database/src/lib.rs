pub mod auction_participants;
pub mod auctions;
pub mod deal_events;
pub mod deposits;
pub mod offers;
pub mod selected_deals;
pub mod service_fees;
pub mod shortlist_items;

use sqlx::{Executor, PgConnection};

// Design:
//
// Functions that execute multiple statements take `&mut PgTransaction` to
// indicate this and to ensure the whole function succeeds or fails together.
// Functions that execute a single statement take `&mut PgConnection`. We call
// the parameter `ex` for `Executor`, the trait whose methods run queries.
// This lets callers decide whether to use a function as part of a bigger
// transaction or standalone; `PgTransaction` derefs to `PgConnection`.
// Callers are responsible for calling `commit`.
//
// Status flips are conditional updates (`... WHERE status = <expected>`)
// returning the number of affected rows, so concurrent writers race in the
// database rather than in process memory.
//
// For tests a useful pattern is to start a transaction at the beginning of
// the test, use it for all queries and never commit it. The uncommitted
// transaction is rolled back on drop, which lets postgres tests run in
// parallel without clearing tables first.

pub type PgTransaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

/// The names of tables we use in the db.
pub const TABLES: &[&str] = &[
    "shortlist_items",
    "auctions",
    "auction_vehicles",
    "auction_participants",
    "auction_offers",
    "deposits",
    "selected_deals",
    "service_fees",
    "deal_events",
];

/// Delete all data in the database. Only used by tests.
#[allow(non_snake_case)]
pub async fn clear_DANGER(ex: &mut PgConnection) -> sqlx::Result<()> {
    for table in TABLES {
        ex.execute(format!("TRUNCATE {table} CASCADE;").as_str())
            .await?;
    }
    Ok(())
}
