pub mod postgres_order_store;

pub use postgres_order_store::PostgresOrderStore;

use async_trait::async_trait;
use domain::OrderAggregate;
use thiserror::Error;

/// Durable storage for whole order aggregates.
///
/// The store is the source of truth; the in-memory cache is rebuilt from
/// `load_all` on every start.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Write the header and every item of `order` as one atomic unit,
    /// replacing any rows previously stored under the same `order_uid`
    async fn upsert(&self, order: &OrderAggregate) -> Result<(), StoreError>;

    /// Load every committed aggregate with its full item list, in no particular order
    async fn load_all(&self) -> Result<Vec<OrderAggregate>, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Order {order_uid} has too many items: {count}")]
    TooManyItems { order_uid: String, count: usize },
}
