//! Application state - shared handles to every pipeline service.
//!
//! `AppState` is cheap to clone (everything behind `Arc`) and is the one
//! place the pipeline gets wired together, for production HTTP stores and
//! for in-memory doubles alike.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;

use shared::AppResult;

use crate::booking::BookingOrchestrator;
use crate::core::{BackgroundTasks, Config, TaskKind};
use crate::device::DeviceNotifier;
use crate::ledger::ReservationLedger;
use crate::notify::NotificationService;
use crate::payment::{DemoGateway, HttpGateway, PaymentGateway, SettlementCoordinator};
use crate::store::{
    BackendStore, FallbackReader, HttpBackend, HttpMirror, LocalCache, MirrorStore,
};
use crate::sync::{ChangeFeed, SyncBridge, SyncWorker};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn BackendStore>,
    pub mirror: Arc<dyn MirrorStore>,
    pub cache: Arc<LocalCache>,
    pub feed: ChangeFeed,
    pub reader: Arc<FallbackReader>,
    pub ledger: Arc<ReservationLedger>,
    pub devices: Arc<DeviceNotifier>,
    pub bridge: Arc<SyncBridge>,
    pub coordinator: Arc<SettlementCoordinator>,
    pub orchestrator: Arc<BookingOrchestrator>,
}

impl AppState {
    /// Build the production state: HTTP stores and gateway from config.
    pub fn initialize(config: &Config) -> AppResult<Self> {
        let backend: Arc<dyn BackendStore> = Arc::new(HttpBackend::new(
            &config.backend_base_url,
            config.request_timeout_ms,
        )?);
        let mirror: Arc<dyn MirrorStore> = Arc::new(HttpMirror::new(
            &config.mirror_base_url,
            config.request_timeout_ms,
        )?);
        let gateway: Arc<dyn PaymentGateway> = Arc::new(HttpGateway::new(
            &config.gateway_base_url,
            &config.merchant_code,
            config.intent_timeout_ms,
            config.poll_timeout_ms,
        )?);
        Self::with_stores(config.clone(), backend, mirror, gateway)
    }

    /// Wire the pipeline around the given stores and gateway. Tests inject
    /// in-memory doubles here.
    pub fn with_stores(
        config: Config,
        backend: Arc<dyn BackendStore>,
        mirror: Arc<dyn MirrorStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> AppResult<Self> {
        let cache = Arc::new(LocalCache::open(&PathBuf::from(&config.work_dir))?);
        let feed = ChangeFeed::new();
        let demo = Arc::new(DemoGateway::new());
        let notify = NotificationService::from_config(&config).map(Arc::new);

        let reader = Arc::new(FallbackReader::new(
            backend.clone(),
            mirror.clone(),
            cache.clone(),
        ));
        let ledger = Arc::new(ReservationLedger::new(backend.clone(), feed.clone()));
        let devices = Arc::new(DeviceNotifier::new(backend.clone(), feed.clone()));
        let bridge = Arc::new(SyncBridge::new(backend.clone(), mirror.clone()));
        let coordinator = Arc::new(SettlementCoordinator::new(
            gateway,
            demo,
            backend.clone(),
            cache.clone(),
            ledger.clone(),
            devices.clone(),
            notify,
            feed.clone(),
        ));
        let orchestrator = Arc::new(BookingOrchestrator::new(
            backend.clone(),
            cache.clone(),
            reader.clone(),
            ledger.clone(),
            coordinator.clone(),
            devices.clone(),
            feed.clone(),
        ));

        Ok(Self {
            config,
            backend,
            mirror,
            cache,
            feed,
            reader,
            ledger,
            devices,
            bridge,
            coordinator,
            orchestrator,
        })
    }

    /// Start the background tasks:
    /// - mirror sync worker (change feed + periodic full resync),
    /// - expiry sweep over the local cache,
    /// - cache reconciliation (warmup, then piggybacked on the sweep).
    pub fn spawn_workers(&self, tasks: &mut BackgroundTasks) {
        let worker = SyncWorker::new(
            self.bridge.clone(),
            self.feed.subscribe(),
            self.config.full_sync_interval_secs,
            tasks.shutdown_token(),
        );
        tasks.spawn("mirror_sync", TaskKind::Worker, worker.run());

        let coordinator = self.coordinator.clone();
        tasks.spawn("cache_reconcile_warmup", TaskKind::Warmup, async move {
            if let Err(e) = coordinator.reconcile_cache().await {
                tracing::warn!("Startup cache reconcile failed: {e}");
            }
        });

        let orchestrator = self.orchestrator.clone();
        let coordinator = self.coordinator.clone();
        let sweep_interval = Duration::from_secs(self.config.expiry_sweep_interval_secs);
        let shutdown = tasks.shutdown_token();
        tasks.spawn("expiry_sweep", TaskKind::Periodic, async move {
            let mut interval = tokio::time::interval(sweep_interval);
            interval.tick().await; // skip immediate tick
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = orchestrator.sweep_expired() {
                            tracing::warn!("Expiry sweep failed: {e}");
                        }
                        if let Err(e) = coordinator.reconcile_cache().await {
                            tracing::warn!("Cache reconcile failed: {e}");
                        }
                    }
                }
            }
        });
    }

    pub fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.work_dir)
    }
}
