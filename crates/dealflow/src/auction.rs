//! Auction creation and its temporal window. An auction snapshots the
//! shortlist's active items at creation; once open, vehicle set and
//! invited-dealer set are immutable.

use {
    crate::{
        collaborators::{
            InventoryChecking, Notifying, PaymentProcessing, Transition, with_timeout,
        },
        deposit::DepositLedger,
        error::{Error, Result},
        storage::Storage,
    },
    chrono::{Duration as ChronoDuration, Utc},
    model::{
        DEPOSIT_AMOUNT,
        auction::{Auction, AuctionStatus, AuctionVehicle},
        ids::{AuctionId, BuyerId, DealerId},
        partner::{PaymentOutcome, VehicleAvailability},
    },
    std::{sync::Arc, time::Duration},
};

pub struct AuctionManager {
    store: Arc<dyn Storage>,
    inventory: Arc<dyn InventoryChecking>,
    payments: Arc<dyn PaymentProcessing>,
    deposits: Arc<DepositLedger>,
    notifier: Arc<dyn Notifying>,
    /// How long an auction stays open once the deposit is confirmed.
    auction_duration: ChronoDuration,
    collaborator_timeout: Duration,
}

impl AuctionManager {
    pub fn new(
        store: Arc<dyn Storage>,
        inventory: Arc<dyn InventoryChecking>,
        payments: Arc<dyn PaymentProcessing>,
        deposits: Arc<DepositLedger>,
        notifier: Arc<dyn Notifying>,
        auction_duration: Duration,
        collaborator_timeout: Duration,
    ) -> Self {
        Self {
            store,
            inventory,
            payments,
            deposits,
            notifier,
            auction_duration: ChronoDuration::from_std(auction_duration)
                .unwrap_or(ChronoDuration::hours(72)),
            collaborator_timeout,
        }
    }

    /// Creates a draft auction from the buyer's current active shortlist
    /// and requests the deposit capture. The draft flips to open via
    /// [`Self::deposit_notification`], either from the synchronous capture
    /// outcome or from a later asynchronous settlement notification.
    pub async fn create_auction(
        &self,
        buyer: BuyerId,
        dealers: Vec<DealerId>,
    ) -> Result<AuctionId> {
        if dealers.is_empty() {
            return Err(Error::Validation("no dealers invited".into()));
        }
        let shortlist = self.store.active_shortlist(buyer).await?;
        if shortlist.is_empty() {
            return Err(Error::EmptyShortlist);
        }
        for item in &shortlist {
            let availability = with_timeout(
                "inventory",
                self.collaborator_timeout,
                self.inventory.availability(item.vehicle_id),
            )
            .await?;
            if availability != VehicleAvailability::Available {
                return Err(Error::VehicleUnavailable);
            }
        }
        let vehicles = shortlist
            .iter()
            .map(|item| AuctionVehicle {
                vehicle_id: item.vehicle_id,
                is_primary_choice: item.is_primary_choice,
            })
            .collect();
        let auction = self
            .store
            .create_auction(buyer, vehicles, dealers, DEPOSIT_AMOUNT, Utc::now())
            .await?;
        tracing::info!(?auction, ?buyer, "created draft auction");

        let outcome = with_timeout(
            "payments",
            self.collaborator_timeout,
            self.payments.capture_deposit(auction, DEPOSIT_AMOUNT),
        )
        .await?;
        self.deposit_notification(auction, outcome).await?;
        Ok(auction)
    }

    /// Consumes a deposit settlement notification. Duplicate notifications
    /// for an already-settled deposit are no-ops.
    pub async fn deposit_notification(
        &self,
        auction: AuctionId,
        outcome: PaymentOutcome,
    ) -> Result<()> {
        match outcome {
            PaymentOutcome::Captured { reference } => {
                if !self.store.settle_deposit_paid(auction).await? {
                    tracing::debug!(?auction, "duplicate deposit settlement ignored");
                    return Ok(());
                }
                tracing::info!(?auction, reference, "deposit captured");
                let now = Utc::now();
                if self
                    .store
                    .open_auction(auction, now, now + self.auction_duration)
                    .await?
                {
                    self.notifier
                        .transition(Transition::Auction {
                            id: auction,
                            status: AuctionStatus::Open,
                        })
                        .await;
                }
                Ok(())
            }
            PaymentOutcome::Declined { reason } => {
                if self.store.settle_deposit_failed(auction).await? {
                    tracing::warn!(?auction, reason, "deposit capture declined");
                }
                Ok(())
            }
        }
    }

    pub async fn auction(&self, id: AuctionId) -> Result<Auction> {
        self.store
            .auction(id)
            .await?
            .ok_or(Error::NotFound("auction"))
    }

    pub async fn vehicles(&self, id: AuctionId) -> Result<Vec<AuctionVehicle>> {
        self.store.auction_vehicles(id).await
    }

    /// Cancels an auction from draft or open, refunding a paid deposit.
    /// Idempotent: cancelling an already-cancelled auction succeeds. Not
    /// permitted once closed or completed.
    pub async fn cancel(&self, id: AuctionId) -> Result<()> {
        let auction = self.auction(id).await?;
        match auction.status {
            AuctionStatus::Cancelled => return Ok(()),
            AuctionStatus::Draft | AuctionStatus::Open => {}
            _ => {
                return Err(Error::PreconditionNotMet {
                    condition: "auction can only be cancelled from draft or open",
                });
            }
        }
        if !self
            .store
            .transition_auction(id, auction.status, AuctionStatus::Cancelled, Utc::now())
            .await?
        {
            // someone else moved it; re-read to keep cancel idempotent
            let auction = self.auction(id).await?;
            if auction.status == AuctionStatus::Cancelled {
                return Ok(());
            }
            return Err(Error::StaleState("auction status changed"));
        }
        tracing::info!(auction = ?id, "cancelled auction");
        self.deposits.refund(id).await?;
        self.notifier
            .transition(Transition::Auction {
                id,
                status: AuctionStatus::Cancelled,
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            collaborators::{
                MockInventoryChecking, MockNotifying, MockPaymentProcessing,
            },
            mem::InMemory,
        },
        model::{deal::DepositStatus, ids::VehicleId},
    };

    struct Fixture {
        store: Arc<InMemory>,
        manager: AuctionManager,
    }

    fn fixture(payments: MockPaymentProcessing) -> Fixture {
        let store = Arc::new(InMemory::default());
        let mut inventory = MockInventoryChecking::new();
        inventory
            .expect_availability()
            .returning(|_| Ok(VehicleAvailability::Available));
        let mut notifier = MockNotifying::new();
        notifier.expect_transition().returning(|_| ());
        let payments = Arc::new(payments);
        let deposits = Arc::new(DepositLedger::new(
            store.clone(),
            payments.clone(),
            Duration::from_secs(1),
        ));
        let manager = AuctionManager::new(
            store.clone(),
            Arc::new(inventory),
            payments,
            deposits,
            Arc::new(notifier),
            Duration::from_secs(72 * 3600),
            Duration::from_secs(1),
        );
        Fixture { store, manager }
    }

    fn capturing_payments() -> MockPaymentProcessing {
        let mut payments = MockPaymentProcessing::new();
        payments.expect_capture_deposit().returning(|_, _| {
            Ok(PaymentOutcome::Captured {
                reference: "pay-1".into(),
            })
        });
        payments.expect_refund_deposit().returning(|_, _| Ok(()));
        payments
    }

    async fn shortlist_vehicle(store: &InMemory, buyer: BuyerId) {
        store
            .add_shortlist_item(buyer, VehicleId(1), None, Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_shortlist_rejected() {
        let fixture = fixture(capturing_payments());
        assert!(matches!(
            fixture.manager.create_auction(BuyerId(1), vec![DealerId(1)]).await,
            Err(Error::EmptyShortlist)
        ));
    }

    #[tokio::test]
    async fn successful_deposit_opens_the_auction() {
        let fixture = fixture(capturing_payments());
        shortlist_vehicle(&fixture.store, BuyerId(1)).await;
        let auction = fixture
            .manager
            .create_auction(BuyerId(1), vec![DealerId(1), DealerId(2)])
            .await
            .unwrap();
        let auction = fixture.manager.auction(auction).await.unwrap();
        assert_eq!(auction.status, AuctionStatus::Open);
        assert!(auction.closes_at.unwrap() > Utc::now());
        let deposit = fixture
            .store
            .deposit_for_auction(auction.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deposit.status, DepositStatus::Paid);
    }

    #[tokio::test]
    async fn declined_deposit_keeps_the_draft() {
        let mut payments = MockPaymentProcessing::new();
        payments.expect_capture_deposit().returning(|_, _| {
            Ok(PaymentOutcome::Declined {
                reason: "insufficient funds".into(),
            })
        });
        let fixture = fixture(payments);
        shortlist_vehicle(&fixture.store, BuyerId(1)).await;
        let auction = fixture
            .manager
            .create_auction(BuyerId(1), vec![DealerId(1)])
            .await
            .unwrap();
        let auction = fixture.manager.auction(auction).await.unwrap();
        assert_eq!(auction.status, AuctionStatus::Draft);
        let deposit = fixture
            .store
            .deposit_for_auction(auction.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deposit.status, DepositStatus::Failed);
    }

    #[tokio::test]
    async fn duplicate_settlement_notifications_are_noops() {
        let fixture = fixture(capturing_payments());
        shortlist_vehicle(&fixture.store, BuyerId(1)).await;
        let auction = fixture
            .manager
            .create_auction(BuyerId(1), vec![DealerId(1)])
            .await
            .unwrap();
        // the async notification arrives after the synchronous outcome
        fixture
            .manager
            .deposit_notification(
                auction,
                PaymentOutcome::Captured {
                    reference: "pay-1".into(),
                },
            )
            .await
            .unwrap();
        let auction = fixture.manager.auction(auction).await.unwrap();
        assert_eq!(auction.status, AuctionStatus::Open);
    }

    #[tokio::test]
    async fn cancel_refunds_and_is_idempotent() {
        let fixture = fixture(capturing_payments());
        shortlist_vehicle(&fixture.store, BuyerId(1)).await;
        let auction = fixture
            .manager
            .create_auction(BuyerId(1), vec![DealerId(1)])
            .await
            .unwrap();
        fixture.manager.cancel(auction).await.unwrap();
        fixture.manager.cancel(auction).await.unwrap();
        let deposit = fixture
            .store
            .deposit_for_auction(auction)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deposit.status, DepositStatus::Refunded);
    }

    #[tokio::test]
    async fn cancel_after_close_is_rejected() {
        let fixture = fixture(capturing_payments());
        shortlist_vehicle(&fixture.store, BuyerId(1)).await;
        let auction = fixture
            .manager
            .create_auction(BuyerId(1), vec![DealerId(1)])
            .await
            .unwrap();
        assert!(
            fixture
                .store
                .transition_auction(auction, AuctionStatus::Open, AuctionStatus::Closed, Utc::now())
                .await
                .unwrap()
        );
        assert!(matches!(
            fixture.manager.cancel(auction).await,
            Err(Error::PreconditionNotMet { .. })
        ));
    }
}
