use thiserror::Error;

/// Reasons an inbound order message is rejected before it reaches the store
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed order message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Order failed validation: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

