pub mod cache;
pub mod gateway;

pub use cache::{ColdOrderCache, OrderCache};
pub use gateway::{HealthStatus, ReadGateway};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Order not found: {0}")]
    NotFound(String),
}
