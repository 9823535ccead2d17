//! Trait seams for the external services the engine consults. Their
//! internals are out of scope; the engine only depends on the answers
//! modeled in `model::partner`.
//!
//! Every call through these traits is fallible and potentially slow, so
//! call sites wrap them in [`with_timeout`]; an elapsed timeout is a
//! retryable [`Error::CollaboratorUnavailable`], never an implicit success.

pub mod http;

use {
    crate::error::Error,
    model::{
        auction::AuctionStatus,
        deal::DealStatus,
        ids::{AuctionId, DealId, VehicleId},
        money::Cents,
        partner::{MonthlyImpact, PaymentOutcome, ScanReport, VehicleAvailability},
    },
    std::{future::Future, time::Duration},
};

/// Queried for vehicle availability before shortlisting and before auction
/// creation.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InventoryChecking: Send + Sync {
    async fn availability(&self, vehicle: VehicleId) -> anyhow::Result<VehicleAvailability>;
}

/// Receives capture and refund requests for deposits and service fees.
/// Settlement notifications may arrive more than once; consumers settle
/// them idempotently.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PaymentProcessing: Send + Sync {
    async fn capture_deposit(
        &self,
        auction: AuctionId,
        amount: Cents,
    ) -> anyhow::Result<PaymentOutcome>;
    async fn capture_fee(&self, deal: DealId, amount: Cents) -> anyhow::Result<PaymentOutcome>;
    async fn refund_deposit(&self, auction: AuctionId, amount: Cents) -> anyhow::Result<()>;
}

/// Authorizes rolling the service fee into the buyer's loan principal.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LenderGateway: Send + Sync {
    async fn authorize_fee_inclusion(
        &self,
        deal: DealId,
        amount: Cents,
    ) -> anyhow::Result<MonthlyImpact>;
}

/// Reports the contract-verification scan consulted before e-signature.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContractScanning: Send + Sync {
    async fn scan_status(&self, document: &str) -> anyhow::Result<ScanReport>;
}

/// Issues and validates the unique pickup code.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PickupCoordination: Send + Sync {
    async fn issue_code(&self, deal: DealId) -> anyhow::Result<String>;
    async fn validate_code(&self, deal: DealId, code: &str) -> anyhow::Result<bool>;
}

/// A state transition worth telling the outside world about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transition {
    Auction { id: AuctionId, status: AuctionStatus },
    Deal { id: DealId, status: DealStatus },
}

/// Fire-and-forget notifications on every state transition. Failure to
/// notify must never block or roll back the transition itself, so the
/// method is infallible; implementations log their own errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Notifying: Send + Sync {
    async fn transition(&self, transition: Transition);
}

/// Bounds a collaborator call. Failures and timeouts map to the same
/// retryable error class so callers know to retry rather than give up.
pub(crate) async fn with_timeout<T>(
    name: &'static str,
    timeout: Duration,
    call: impl Future<Output = anyhow::Result<T>> + Send,
) -> Result<T, Error> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            tracing::warn!(name, ?err, "collaborator call failed");
            Err(Error::CollaboratorUnavailable { name })
        }
        Err(_elapsed) => {
            tracing::warn!(name, "collaborator call timed out");
            Err(Error::CollaboratorUnavailable { name })
        }
    }
}
