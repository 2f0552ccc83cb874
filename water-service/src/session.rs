//! The snapshot currently being analysed.
//!
//! A snapshot pairs one registry with the catalog it was loaded against.
//! Readers clone the `Arc` and keep a consistent view while a refresh swaps
//! in a replacement.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use water_client::{MeterRegistry, PeriodCatalog};

#[derive(Debug)]
pub struct Snapshot {
    pub registry: MeterRegistry,
    pub catalog: PeriodCatalog,
    pub fingerprint: String,
    pub loaded_at: OffsetDateTime,
}

impl Snapshot {
    pub fn new(registry: MeterRegistry, catalog: PeriodCatalog) -> Self {
        Self {
            fingerprint: registry.fingerprint(),
            registry,
            catalog,
            loaded_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    current: Arc<RwLock<Option<Arc<Snapshot>>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().await.clone()
    }

    /// Replace the current snapshot, returning the previous one.
    pub async fn publish(&self, snapshot: Snapshot) -> Option<Arc<Snapshot>> {
        self.current.write().await.replace(Arc::new(snapshot))
    }
}
