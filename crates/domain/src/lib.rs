pub mod aggregates;
pub mod errors;

pub use aggregates::order::{decode_order, Delivery, OrderAggregate, OrderItem, Payment};
pub use errors::DecodeError;
