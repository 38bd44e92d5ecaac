use common::metrics;
use domain::OrderAggregate;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::cache::OrderCache;
use crate::LookupError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub cached_orders: usize,
}

/// Read-only access to orders for the HTTP layer.
///
/// Only ever touches the cache, so lookups never wait on the store or the bus.
#[derive(Debug, Clone)]
pub struct ReadGateway {
    cache: Arc<OrderCache>,
}

impl ReadGateway {
    pub fn new(cache: Arc<OrderCache>) -> Self {
        Self { cache }
    }

    pub async fn lookup(&self, order_uid: &str) -> Result<Arc<OrderAggregate>, LookupError> {
        let found = self.cache.get(order_uid).await;
        metrics::record_lookup(found.is_some());

        match found {
            Some(order) => {
                debug!("Cache hit for order: {}", order_uid);
                Ok(order)
            }
            None => {
                debug!("Order not found: {}", order_uid);
                Err(LookupError::NotFound(order_uid.to_string()))
            }
        }
    }

    pub async fn health_check(&self) -> HealthStatus {
        HealthStatus {
            status: "ok".to_string(),
            cached_orders: self.cache.len().await,
        }
    }
}
