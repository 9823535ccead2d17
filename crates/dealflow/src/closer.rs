//! Takes auctions out of the open state, either on an explicit close call
//! or when the periodic deadline sweep crosses `closes_at`. Whichever
//! happens first performs the transition; the loser observes the flip and
//! exits without error.

use {
    crate::{
        collaborators::{Notifying, Transition},
        deposit::DepositLedger,
        error::{Error, Result},
        storage::Storage,
    },
    chrono::Utc,
    model::{auction::AuctionStatus, ids::AuctionId},
    std::{sync::Arc, time::Duration},
};

pub struct AuctionCloser {
    store: Arc<dyn Storage>,
    deposits: Arc<DepositLedger>,
    notifier: Arc<dyn Notifying>,
}

/// Outcome of a close call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Closed {
    /// Closed with live offers; awaits the buyer's selection.
    AwaitingSelection,
    /// Closed with zero offers; the deposit refund was triggered.
    NoOffers,
    /// Another caller closed it first.
    AlreadyClosed,
}

impl AuctionCloser {
    pub fn new(
        store: Arc<dyn Storage>,
        deposits: Arc<DepositLedger>,
        notifier: Arc<dyn Notifying>,
    ) -> Self {
        Self {
            store,
            deposits,
            notifier,
        }
    }

    /// Transitions an open auction to closed. With zero offers the auction
    /// immediately moves on to no-offers and the deposit refund is
    /// triggered. Losing the open-to-closed race to another caller is not
    /// an error.
    pub async fn close(&self, auction: AuctionId) -> Result<Closed> {
        let now = Utc::now();
        if !self
            .store
            .transition_auction(auction, AuctionStatus::Open, AuctionStatus::Closed, now)
            .await?
        {
            let current = self
                .store
                .auction(auction)
                .await?
                .ok_or(Error::NotFound("auction"))?;
            return match current.status {
                AuctionStatus::Open => Err(Error::StaleState("auction status changed")),
                _ => Ok(Closed::AlreadyClosed),
            };
        }
        Metrics::get().auctions_closed.inc();

        if self.store.offer_count(auction).await? == 0 {
            self.store
                .transition_auction(auction, AuctionStatus::Closed, AuctionStatus::NoOffers, now)
                .await?;
            self.deposits.refund(auction).await?;
            Metrics::get().no_offer_outcomes.inc();
            tracing::info!(?auction, "auction closed with no offers, deposit refunded");
            self.notifier
                .transition(Transition::Auction {
                    id: auction,
                    status: AuctionStatus::NoOffers,
                })
                .await;
            return Ok(Closed::NoOffers);
        }
        tracing::info!(?auction, "auction closed, awaiting selection");
        self.notifier
            .transition(Transition::Auction {
                id: auction,
                status: AuctionStatus::Closed,
            })
            .await;
        Ok(Closed::AwaitingSelection)
    }

    /// One sweep pass over open auctions past their deadline, then over
    /// deposit refunds left unconfirmed by an earlier payment failure.
    /// Errors on a single auction are logged and do not stop the pass.
    pub async fn sweep_once(&self) -> Result<()> {
        let due = self.store.open_auctions_past_deadline(Utc::now()).await?;
        for auction in due {
            if let Err(err) = self.close(auction.id).await {
                tracing::error!(auction = ?auction.id, ?err, "failed to close auction");
            }
        }
        self.deposits.retry_pending_refunds().await?;
        Ok(())
    }

    /// The periodic deadline sweep. Sweep errors are logged, never fatal.
    pub async fn run_forever(self: Arc<Self>, interval: Duration) -> ! {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            if let Err(err) = self.sweep_once().await {
                tracing::error!(?err, "auction deadline sweep failed");
            }
        }
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "closer")]
struct Metrics {
    /// Number of auctions transitioned out of the open state.
    auctions_closed: prometheus::IntCounter,
    /// Number of auctions that closed with zero offers.
    no_offer_outcomes: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
