//! Service wiring: picks the store/bus/channel implementations from config
//! and builds every service on top of them.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use quitute_events::{BusError, EventEnvelope, InMemoryEventBus};
use quitute_infra::messaging::{ChannelError, InMemoryChannel, MessageChannel};
use quitute_infra::services::restock::TriggerBus;
use quitute_infra::services::{
    AvailabilityService, DispatcherConfig, NotificationDispatcher, RestockService, SaleService,
    SubscriptionService,
};
use quitute_infra::store::{InMemoryStore, InventoryStore, StockLedger, StoreError};
use quitute_infra::{
    NotificationWorker, RetryPolicy, SimulatorConfig, SupplierSimulator, WorkerHandle,
};
use quitute_inventory::{Catalog, Item};

#[cfg(feature = "redis")]
use quitute_infra::event_bus::{RedisStreamsEventBus, redis_streams};
#[cfg(feature = "redis")]
use quitute_infra::messaging::RedisChannel;
#[cfg(feature = "redis")]
use quitute_infra::store::PostgresStore;

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store setup failed: {0}")]
    Store(#[from] StoreError),

    #[error("event bus setup failed: {0}")]
    Bus(#[from] BusError),

    #[error("messaging channel setup failed: {0}")]
    Channel(#[from] ChannelError),

    #[error("catalog is invalid: {0}")]
    Catalog(#[from] quitute_core::DomainError),

    #[error("could not start notification worker: {0}")]
    Worker(#[from] std::io::Error),
}

pub type Store = dyn InventoryStore;

/// Everything the HTTP handlers need, shared behind an `Arc`.
pub struct AppServices {
    pub store: Arc<Store>,
    pub sales: SaleService<Store>,
    pub availability: AvailabilityService<Store>,
    pub restock: Arc<RestockService<Store>>,
    pub dispatcher: Arc<NotificationDispatcher<Store>>,
    pub subscriptions: SubscriptionService<Store>,
    pub simulator: Arc<SupplierSimulator<Store>>,
    _worker: WorkerHandle,
    periodic_simulator: Option<JoinHandle<()>>,
}

impl Drop for AppServices {
    fn drop(&mut self) {
        if let Some(task) = self.periodic_simulator.take() {
            task.abort();
        }
    }
}

struct Backends {
    store: Arc<Store>,
    bus: Arc<TriggerBus>,
    channel: Arc<dyn MessageChannel>,
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, StartupError> {
    let backends = build_backends(config).await?;
    wire(config, backends)
}

#[cfg(feature = "redis")]
async fn build_backends(config: &AppConfig) -> Result<Backends, StartupError> {
    if config.use_persistent_stores {
        return build_persistent_backends(config).await;
    }
    build_in_memory_backends(config).await
}

#[cfg(not(feature = "redis"))]
async fn build_backends(config: &AppConfig) -> Result<Backends, StartupError> {
    if config.use_persistent_stores {
        tracing::warn!(
            "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
        );
    }
    build_in_memory_backends(config).await
}

async fn build_in_memory_backends(config: &AppConfig) -> Result<Backends, StartupError> {
    let store = Arc::new(InMemoryStore::new());
    if config.seed_catalog {
        let catalog = Catalog::bakery();
        for entry in catalog.entries() {
            store.seed(Item::new(entry.item_id, entry.name.clone())?).await?;
        }
        info!(items = catalog.len(), "bakery catalog seeded at zero stock");
    }

    let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
    Ok(Backends {
        store,
        bus,
        channel: Arc::new(InMemoryChannel::new()),
    })
}

#[cfg(feature = "redis")]
async fn build_persistent_backends(config: &AppConfig) -> Result<Backends, StartupError> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| StoreError::Unavailable("DATABASE_URL is not set".to_string()))?;

    let store = PostgresStore::connect(database_url, 10).await?;
    store.migrate().await?;
    info!("postgres store ready");

    Ok(Backends {
        store: Arc::new(store),
        // One consumer group across processes: each trigger reaches one worker.
        bus: Arc::new(RedisStreamsEventBus::new(
            &config.redis_url,
            redis_streams::DEFAULT_STREAM_KEY,
        )?),
        channel: Arc::new(RedisChannel::new(&config.redis_url)?),
    })
}

fn wire(config: &AppConfig, backends: Backends) -> Result<AppServices, StartupError> {
    let Backends {
        store,
        bus,
        channel,
    } = backends;

    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        channel.clone(),
        DispatcherConfig::default()
            .with_topic(config.notify_topic.clone())
            .with_require_subscription(config.require_subscription),
    ));

    let retry = RetryPolicy::exponential(
        config.notify_max_attempts,
        Duration::from_millis(200),
        Duration::from_secs(10),
    );
    let worker = NotificationWorker::spawn(
        "notification-worker",
        bus.clone(),
        dispatcher.clone(),
        tokio::runtime::Handle::current(),
        retry,
    )?;

    let restock = Arc::new(RestockService::new(store.clone(), bus));
    let simulator = Arc::new(SupplierSimulator::new(
        restock.clone(),
        Catalog::bakery(),
        SimulatorConfig::default(),
    ));
    let periodic_simulator = config.simulator_interval.map(|interval| {
        info!(interval_secs = interval.as_secs(), "periodic supplier simulator enabled");
        simulator.clone().run_periodic(interval)
    });

    Ok(AppServices {
        sales: SaleService::new(store.clone()),
        availability: AvailabilityService::new(
            store.clone(),
            channel.clone(),
            config.notify_topic.clone(),
        ),
        subscriptions: SubscriptionService::new(store.clone(), channel, config.notify_topic.clone()),
        store,
        restock,
        dispatcher,
        simulator,
        _worker: worker,
        periodic_simulator,
    })
}
