//! Bookkeeping for the buyer's refundable auction deposit. A deposit is
//! refunded XOR credited toward the service fee, never both; the database
//! guards enforce the exclusivity, this component drives the refund side.

use {
    crate::{
        collaborators::{PaymentProcessing, with_timeout},
        error::Result,
        storage::Storage,
    },
    chrono::Utc,
    model::{deal::Deposit, ids::AuctionId},
    std::{sync::Arc, time::Duration},
};

pub struct DepositLedger {
    store: Arc<dyn Storage>,
    payments: Arc<dyn PaymentProcessing>,
    collaborator_timeout: Duration,
}

impl DepositLedger {
    pub fn new(
        store: Arc<dyn Storage>,
        payments: Arc<dyn PaymentProcessing>,
        collaborator_timeout: Duration,
    ) -> Self {
        Self {
            store,
            payments,
            collaborator_timeout,
        }
    }

    pub async fn deposit(&self, auction: AuctionId) -> Result<Option<Deposit>> {
        self.store.deposit_for_auction(auction).await
    }

    /// Refunds the auction's deposit if it is paid and was never credited.
    /// A no-op otherwise, so the no-offer sweep and an explicit cancel can
    /// both call it without coordination. Returns whether a refund was
    /// issued.
    ///
    /// The refund is recorded as in flight before the payment call and
    /// confirmed after it, so a collaborator failure leaves the deposit
    /// refund-pending and a later call picks the refund back up.
    pub async fn refund(&self, auction: AuctionId) -> Result<bool> {
        if !self.store.begin_deposit_refund(auction).await? {
            return Ok(false);
        }
        let deposit = self
            .store
            .deposit_for_auction(auction)
            .await?
            .ok_or(crate::error::Error::NotFound("deposit"))?;
        with_timeout(
            "payments",
            self.collaborator_timeout,
            self.payments.refund_deposit(auction, deposit.amount),
        )
        .await?;
        self.store.settle_deposit_refunded(auction, Utc::now()).await?;
        Metrics::get().deposit_refunds.inc();
        tracing::info!(?auction, amount = %deposit.amount, "refunded auction deposit");
        Ok(true)
    }

    /// Re-drives refunds whose payment call never got confirmed.
    pub async fn retry_pending_refunds(&self) -> Result<()> {
        for auction in self.store.refund_pending_auctions().await? {
            if let Err(err) = self.refund(auction).await {
                tracing::error!(?auction, ?err, "deposit refund retry failed");
            }
        }
        Ok(())
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "deposits")]
struct Metrics {
    /// Number of auction deposits refunded.
    deposit_refunds: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
