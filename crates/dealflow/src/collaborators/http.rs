//! Thin JSON-over-HTTP adapters for the collaborator traits. No wire format
//! is mandated for the partners; these clients assume the conventional REST
//! endpoints the platform gateway exposes and stay out of the engine's way.

use {
    super::{
        ContractScanning, InventoryChecking, LenderGateway, Notifying, PaymentProcessing,
        PickupCoordination, Transition,
    },
    anyhow::{Context, Result, anyhow},
    model::{
        ids::{AuctionId, DealId, VehicleId},
        money::Cents,
        partner::{MonthlyImpact, PaymentOutcome, ScanReport, VehicleAvailability},
    },
    reqwest::Client,
    std::time::Duration,
    url::Url,
};

pub struct HttpCollaborators {
    base: Url,
    client: Client,
}

impl HttpCollaborators {
    pub fn new(base: Url, timeout: Duration) -> Self {
        Self {
            base,
            client: Client::builder().timeout(timeout).build().unwrap(),
        }
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("bad collaborator path {path}"))
    }

    async fn get<Response>(&self, path: &str) -> Result<Response>
    where
        Response: serde::de::DeserializeOwned,
    {
        let url = self.url(path)?;
        let response = self.client.get(url.clone()).send().await.context("send")?;
        decode(url, response).await
    }

    async fn post<Response>(&self, path: &str, request: &impl serde::Serialize) -> Result<Response>
    where
        Response: serde::de::DeserializeOwned,
    {
        let url = self.url(path)?;
        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await
            .context("send")?;
        decode(url, response).await
    }
}

async fn decode<Response>(url: Url, response: reqwest::Response) -> Result<Response>
where
    Response: serde::de::DeserializeOwned,
{
    let status = response.status().as_u16();
    let body = response.text().await.context("body")?;
    if status != 200 {
        return Err(anyhow!("bad status {status}, url {url}, body {body:?}"));
    }
    serde_json::from_str(&body).with_context(|| format!("bad json, url {url}, body {body:?}"))
}

#[derive(serde::Deserialize)]
struct AvailabilityResponse {
    availability: VehicleAvailability,
}

#[derive(serde::Serialize)]
struct AmountRequest {
    amount_cents: i64,
}

#[derive(serde::Deserialize)]
struct CodeResponse {
    code: String,
}

#[derive(serde::Serialize)]
struct CodeRequest<'a> {
    code: &'a str,
}

#[derive(serde::Deserialize)]
struct ValidResponse {
    valid: bool,
}

#[async_trait::async_trait]
impl InventoryChecking for HttpCollaborators {
    async fn availability(&self, vehicle: VehicleId) -> Result<VehicleAvailability> {
        let response: AvailabilityResponse =
            self.get(&format!("inventory/vehicles/{vehicle}")).await?;
        Ok(response.availability)
    }
}

#[async_trait::async_trait]
impl PaymentProcessing for HttpCollaborators {
    async fn capture_deposit(&self, auction: AuctionId, amount: Cents) -> Result<PaymentOutcome> {
        self.post(
            &format!("payments/deposits/{auction}/capture"),
            &AmountRequest { amount_cents: amount.0 },
        )
        .await
    }

    async fn capture_fee(&self, deal: DealId, amount: Cents) -> Result<PaymentOutcome> {
        self.post(
            &format!("payments/fees/{deal}/capture"),
            &AmountRequest { amount_cents: amount.0 },
        )
        .await
    }

    async fn refund_deposit(&self, auction: AuctionId, amount: Cents) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                &format!("payments/deposits/{auction}/refund"),
                &AmountRequest { amount_cents: amount.0 },
            )
            .await?;
        Ok(())
    }
}

#[derive(serde::Serialize)]
struct FeeInclusionRequest {
    deal_id: DealId,
    amount_cents: i64,
}

/// The lender reports the monthly delta both as a decimal dollar amount and
/// as pre-multiplied cents; the cents field wins when they disagree.
#[derive(serde::Deserialize)]
struct FeeInclusionResponse {
    per_month: Option<f64>,
    per_month_cents: Option<i64>,
    term_months: u32,
}

#[async_trait::async_trait]
impl LenderGateway for HttpCollaborators {
    async fn authorize_fee_inclusion(&self, deal: DealId, amount: Cents) -> Result<MonthlyImpact> {
        let response: FeeInclusionResponse = self
            .post(
                "lender/fee-inclusion",
                &FeeInclusionRequest { deal_id: deal, amount_cents: amount.0 },
            )
            .await?;
        let per_month = Cents::from_dual(response.per_month, response.per_month_cents)
            .ok_or_else(|| anyhow!("fee-inclusion response carries no monthly amount"))?;
        Ok(MonthlyImpact {
            per_month,
            term_months: response.term_months,
        })
    }
}

#[async_trait::async_trait]
impl ContractScanning for HttpCollaborators {
    async fn scan_status(&self, document: &str) -> Result<ScanReport> {
        self.get(&format!("contracts/scans/{document}")).await
    }
}

#[async_trait::async_trait]
impl PickupCoordination for HttpCollaborators {
    async fn issue_code(&self, deal: DealId) -> Result<String> {
        let response: CodeResponse = self
            .post(&format!("pickup/{deal}/code"), &serde_json::json!({}))
            .await?;
        Ok(response.code)
    }

    async fn validate_code(&self, deal: DealId, code: &str) -> Result<bool> {
        let response: ValidResponse = self
            .post(&format!("pickup/{deal}/validate"), &CodeRequest { code })
            .await?;
        Ok(response.valid)
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
enum NotificationPayload {
    Auction { id: AuctionId, status: String },
    Deal { id: DealId, status: String },
}

#[async_trait::async_trait]
impl Notifying for HttpCollaborators {
    async fn transition(&self, transition: Transition) {
        let payload = match transition {
            Transition::Auction { id, status } => NotificationPayload::Auction {
                id,
                status: status.to_string(),
            },
            Transition::Deal { id, status } => NotificationPayload::Deal {
                id,
                status: status.to_string(),
            },
        };
        // fire and forget: a failed notification never blocks the transition
        if let Err(err) = self
            .post::<serde_json::Value>("notifications", &payload)
            .await
        {
            tracing::warn!(?err, "failed to send transition notification");
        }
    }
}
