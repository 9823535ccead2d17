use {
    crate::{
        arbitrator::OfferArbitrator,
        arguments::Arguments,
        auction::AuctionManager,
        closer::AuctionCloser,
        collaborators::http::HttpCollaborators,
        deal::DealOrchestrator,
        deposit::DepositLedger,
        events::DealEventsCleaner,
        offers::OfferIntake,
        persistence::Postgres,
        shortlist::ShortlistStore,
        storage::Storage,
    },
    observe::metrics::LivenessChecking,
    std::sync::Arc,
};

/// All engine components wired onto one storage backend and one partner
/// gateway. The embedding service calls straight into the fields.
pub struct Engine {
    pub shortlist: ShortlistStore,
    pub auctions: AuctionManager,
    pub offers: OfferIntake,
    pub closer: Arc<AuctionCloser>,
    pub arbitrator: OfferArbitrator,
    pub deposits: Arc<DepositLedger>,
    pub deals: DealOrchestrator,
    pub events: Arc<DealEventsCleaner>,
}

impl Engine {
    pub fn new(store: Arc<dyn Storage>, gateway: Arc<HttpCollaborators>, args: &Arguments) -> Self {
        let deposits = Arc::new(DepositLedger::new(
            store.clone(),
            gateway.clone(),
            args.collaborator_timeout,
        ));
        Self {
            shortlist: ShortlistStore::new(
                store.clone(),
                gateway.clone(),
                args.collaborator_timeout,
            ),
            auctions: AuctionManager::new(
                store.clone(),
                gateway.clone(),
                gateway.clone(),
                deposits.clone(),
                gateway.clone(),
                args.auction_duration,
                args.collaborator_timeout,
            ),
            offers: OfferIntake::new(store.clone()),
            closer: Arc::new(AuctionCloser::new(
                store.clone(),
                deposits.clone(),
                gateway.clone(),
            )),
            arbitrator: OfferArbitrator::new(store.clone(), gateway.clone()),
            deals: DealOrchestrator::new(
                store.clone(),
                gateway.clone(),
                gateway.clone(),
                gateway.clone(),
                gateway.clone(),
                gateway,
                args.collaborator_timeout,
            ),
            deposits,
            events: Arc::new(DealEventsCleaner::new(store, args.event_retention)),
        }
    }
}

struct Liveness;

#[async_trait::async_trait]
impl LivenessChecking for Liveness {
    async fn is_alive(&self) -> bool {
        true
    }
}

pub async fn run(args: Arguments) {
    // an unconfigured store is a startup failure, not an empty engine
    let storage = Postgres::connect(args.db_url.as_str())
        .await
        .expect("failed to connect to the database");
    let gateway = Arc::new(HttpCollaborators::new(
        args.partner_gateway_url.clone(),
        args.collaborator_timeout,
    ));
    let engine = Engine::new(Arc::new(storage), gateway, &args);

    let serve_metrics = observe::metrics::serve_metrics(Arc::new(Liveness), args.metrics_address);
    let sweep = tokio::task::spawn(engine.closer.clone().run_forever(args.sweep_interval));
    let cleanup = tokio::task::spawn(
        engine
            .events
            .clone()
            .run_forever(args.event_cleanup_interval),
    );

    tokio::select! {
        result = serve_metrics => panic!("serve_metrics exited {result:?}"),
        result = sweep => panic!("auction deadline sweep exited {result:?}"),
        result = cleanup => panic!("deal event cleanup exited {result:?}"),
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    let mut interrupt =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).unwrap();
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).unwrap();
    tokio::select! {
        _ = interrupt.recv() => (),
        _ = terminate.recv() => (),
    }
}

#[cfg(windows)]
async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.unwrap();
}
