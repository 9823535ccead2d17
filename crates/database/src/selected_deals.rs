use {
    crate::{auctions::AuctionId, offers::OfferId},
    chrono::{DateTime, Utc},
    sqlx::PgConnection,
};

pub type DealId = i64;

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "DealStatus")]
#[sqlx(rename_all = "snake_case")]
pub enum DealStatus {
    PendingFinancing,
    FinancingSelected,
    FeePending,
    FeePaid,
    InsurancePending,
    InsuranceComplete,
    ContractPending,
    ContractUploaded,
    EsignPending,
    EsignComplete,
    PickupScheduled,
    Completed,
    Cancelled,
}

#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct SelectedDeal {
    pub id: DealId,
    pub auction_id: AuctionId,
    pub buyer_id: i64,
    pub dealer_id: i64,
    pub offer_id: OfferId,
    pub vehicle_id: i64,
    pub status: DealStatus,
    pub financing_path: Option<String>,
    pub lender_ref: Option<String>,
    pub insurance_evidence: Option<String>,
    pub contract_document: Option<String>,
    pub esign_completed_at: Option<DateTime<Utc>>,
    pub pickup_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inserts the deal row. The unique index on `auction_id` rejects a second
/// deal for the same auction at the storage level.
pub async fn insert(
    ex: &mut PgConnection,
    auction_id: AuctionId,
    buyer_id: i64,
    dealer_id: i64,
    offer_id: OfferId,
    vehicle_id: i64,
    now: DateTime<Utc>,
) -> Result<DealId, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO selected_deals
    (auction_id, buyer_id, dealer_id, offer_id, vehicle_id, status, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, 'pending_financing', $6, $6)
RETURNING id
    ;"#;
    let (id,) = sqlx::query_as(QUERY)
        .bind(auction_id)
        .bind(buyer_id)
        .bind(dealer_id)
        .bind(offer_id)
        .bind(vehicle_id)
        .bind(now)
        .fetch_one(ex)
        .await?;
    Ok(id)
}

pub async fn fetch(ex: &mut PgConnection, id: DealId) -> Result<Option<SelectedDeal>, sqlx::Error> {
    const QUERY: &str = r#"SELECT * FROM selected_deals WHERE id = $1;"#;
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

pub async fn fetch_for_auction(
    ex: &mut PgConnection,
    auction_id: AuctionId,
) -> Result<Option<SelectedDeal>, sqlx::Error> {
    const QUERY: &str = r#"SELECT * FROM selected_deals WHERE auction_id = $1;"#;
    sqlx::query_as(QUERY)
        .bind(auction_id)
        .fetch_optional(ex)
        .await
}

/// Conditional pipeline transition; the caller validates the edge, this
/// only guarantees the row was still in `from`.
pub async fn update_status_guarded(
    ex: &mut PgConnection,
    id: DealId,
    from: DealStatus,
    to: DealStatus,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE selected_deals SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2
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

/// Records the chosen financing path. Write-once.
pub async fn set_financing(
    ex: &mut PgConnection,
    id: DealId,
    path: &str,
    lender_ref: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE selected_deals
SET financing_path = $2, lender_ref = $3, updated_at = $4
WHERE id = $1 AND financing_path IS NULL
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(id)
        .bind(path)
        .bind(lender_ref)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Records the evidence that satisfied the insurance gate. Write-once.
pub async fn set_insurance_evidence(
    ex: &mut PgConnection,
    id: DealId,
    evidence: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE selected_deals
SET insurance_evidence = $2, updated_at = $3
WHERE id = $1 AND insurance_evidence IS NULL
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(id)
        .bind(evidence)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Records the contract document reference. May be overwritten by a
/// re-upload after a failed scan.
pub async fn set_contract_document(
    ex: &mut PgConnection,
    id: DealId,
    document: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE selected_deals SET contract_document = $2, updated_at = $3 WHERE id = $1
    ;"#;
    sqlx::query(QUERY)
        .bind(id)
        .bind(document)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn set_esign_completed(
    ex: &mut PgConnection,
    id: DealId,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE selected_deals
SET esign_completed_at = $2, updated_at = $2
WHERE id = $1 AND esign_completed_at IS NULL
    ;"#;
    let result = sqlx::query(QUERY).bind(id).bind(now).execute(ex).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_pickup_code(
    ex: &mut PgConnection,
    id: DealId,
    code: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE selected_deals
SET pickup_code = $2, updated_at = $3
WHERE id = $1 AND pickup_code IS NULL
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(id)
        .bind(code)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}
