use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::DecodeError;

/// The full record for one order: header, delivery, payment and items.
///
/// Field names match the inbound message and the HTTP response body. Every
/// key is required on decode; unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct OrderAggregate {
    #[validate(length(min = 1, max = 255, message = "order_uid must be 1..=255 characters"))]
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,

    #[validate(nested)]
    pub payment: Payment,

    #[validate(nested)]
    pub items: Vec<OrderItem>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i64,
    pub date_created: String,
    pub oof_shard: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,

    #[validate(range(min = 0, message = "Amount cannot be negative"))]
    pub amount: i64,
    pub payment_dt: i64,
    pub bank: String,

    #[validate(range(min = 0, message = "Delivery cost cannot be negative"))]
    pub delivery_cost: i64,

    #[validate(range(min = 0, message = "Goods total cannot be negative"))]
    pub goods_total: i64,

    #[validate(range(min = 0, message = "Custom fee cannot be negative"))]
    pub custom_fee: i64,
}

/// One line of an order. Owned by its parent aggregate; has no identity of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct OrderItem {
    pub chrt_id: i64,
    pub track_number: String,

    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price: i64,
    pub rid: String,
    pub name: String,

    #[validate(range(min = 0, max = 100, message = "Sale must be a percentage"))]
    pub sale: i64,
    pub size: String,

    #[validate(range(min = 0, message = "Total price cannot be negative"))]
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i64,
}

impl OrderAggregate {
    /// The cache and store key
    pub fn id(&self) -> &str {
        &self.order_uid
    }
}

/// Decode a raw bus message into a validated order aggregate
pub fn decode_order(payload: &[u8]) -> Result<OrderAggregate, DecodeError> {
    let order: OrderAggregate = serde_json::from_slice(payload)?;
    order.validate()?;
    Ok(order)
}
