//! Exclusive winner selection. Concurrent selection attempts are resolved
//! by the storage layer's atomic check-and-set, never by an in-process
//! lock, since callers may be distributed across processes.

use {
    crate::{
        collaborators::{Notifying, Transition},
        error::{Error, Result},
        storage::Storage,
    },
    chrono::Utc,
    model::{
        BASE_SERVICE_FEE,
        auction::AuctionStatus,
        deal::{DealStatus, SelectedDeal},
        ids::{AuctionId, OfferId},
    },
    std::sync::Arc,
};

pub struct OfferArbitrator {
    store: Arc<dyn Storage>,
    notifier: Arc<dyn Notifying>,
}

impl OfferArbitrator {
    pub fn new(store: Arc<dyn Storage>, notifier: Arc<dyn Notifying>) -> Self {
        Self { store, notifier }
    }

    /// Accepts the chosen offer, rejects every other live offer, completes
    /// the auction and creates the single deal, as one atomic unit. A
    /// caller losing the race gets [`Error::AlreadyDecided`] and must
    /// re-fetch the authoritative deal rather than retry.
    pub async fn select_offer(&self, auction: AuctionId, offer: OfferId) -> Result<SelectedDeal> {
        let auction_row = self
            .store
            .auction(auction)
            .await?
            .ok_or(Error::NotFound("auction"))?;
        match auction_row.status {
            AuctionStatus::Closed => {}
            AuctionStatus::Completed => return Err(Error::AlreadyDecided),
            AuctionStatus::Open | AuctionStatus::Draft => {
                return Err(Error::PreconditionNotMet {
                    condition: "auction must be closed before selecting an offer",
                });
            }
            AuctionStatus::Cancelled | AuctionStatus::NoOffers => {
                return Err(Error::PreconditionNotMet {
                    condition: "auction ended without a selectable offer",
                });
            }
        }
        let offer_row = self
            .store
            .offer(offer)
            .await?
            .ok_or(Error::NotFound("offer"))?;
        if offer_row.auction_id != auction {
            return Err(Error::Validation(
                "offer does not belong to this auction".into(),
            ));
        }
        if offer_row.status.is_terminal() {
            return Err(Error::StaleState("offer is no longer live"));
        }

        let deal = match self
            .store
            .decide_winner(auction, offer, BASE_SERVICE_FEE, Utc::now())
            .await
        {
            Ok(deal) => deal,
            Err(Error::AlreadyDecided) => {
                Metrics::get().selection_races_lost.inc();
                return Err(Error::AlreadyDecided);
            }
            Err(err) => return Err(err),
        };

        // more than one accepted offer means the exclusivity guarantee is
        // broken; that is data corruption, not a recoverable error
        let accepted = self.store.accepted_offer_count(auction).await?;
        assert!(
            accepted == 1,
            "exclusivity violated: auction {auction} has {accepted} accepted offers",
        );

        tracing::info!(?auction, ?offer, ?deal, "winner selected");
        self.notifier
            .transition(Transition::Auction {
                id: auction,
                status: AuctionStatus::Completed,
            })
            .await;
        self.notifier
            .transition(Transition::Deal {
                id: deal,
                status: DealStatus::PendingFinancing,
            })
            .await;
        self.store
            .deal(deal)
            .await?
            .ok_or(Error::NotFound("deal"))
    }

    /// The authoritative deal for an auction, for callers recovering from
    /// [`Error::AlreadyDecided`].
    pub async fn selected_deal(&self, auction: AuctionId) -> Result<Option<SelectedDeal>> {
        self.store.deal_for_auction(auction).await
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "arbitrator")]
struct Metrics {
    /// Number of selection attempts that lost the exclusivity race.
    selection_races_lost: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
