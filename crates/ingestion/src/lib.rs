pub mod coordinator;
pub mod warm_up;

pub use coordinator::{IngestError, IngestStats, IngestionCoordinator};
pub use warm_up::{WarmUpError, WarmUpLoader};
