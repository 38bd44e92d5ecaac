use order_store::{OrderStore, StoreError};
use read_model::{ColdOrderCache, OrderCache};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

/// Startup failure: the cache could not be rebuilt from the store.
/// The process must not serve reads or ingest messages after this.
#[derive(Debug, Error)]
pub enum WarmUpError {
    #[error("Failed to load orders for cache warm-up: {0}")]
    Load(#[from] StoreError),
}

/// Rebuilds the order cache from the store, once, at startup
pub struct WarmUpLoader {
    store: Arc<dyn OrderStore>,
}

impl WarmUpLoader {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Load every committed order and hand back the opened cache.
    ///
    /// On error the cold cache is dropped; there is no partially warmed state.
    pub async fn run(&self, cache: ColdOrderCache) -> Result<OrderCache, WarmUpError> {
        info!("Warming up order cache from the store...");
        let started = Instant::now();

        let orders = self.store.load_all().await.map_err(|e| {
            error!("Cache warm-up failed: {}", e);
            WarmUpError::Load(e)
        })?;

        let count = orders.len();
        let cache = cache.warm_up(orders);

        info!(
            "Cache warm-up finished: {} orders in {:.3}s",
            count,
            started.elapsed().as_secs_f64()
        );

        Ok(cache)
    }
}
