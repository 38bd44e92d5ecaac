use super::{OrderStore, StoreError};
use async_trait::async_trait;
use common::metrics;
use domain::{Delivery, OrderAggregate, OrderItem, Payment};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info};

/// PostgreSQL implementation of the order store.
///
/// Orders live in two tables: `orders` holds the header with delivery and
/// payment flattened into prefixed columns, `items` holds one row per item
/// keyed by `(order_uid, position)`.
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the database pool (useful for testing)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn upsert_in_tx(&self, order: &OrderAggregate) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                order_uid, track_number, entry,
                delivery_name, delivery_phone, delivery_zip, delivery_city,
                delivery_address, delivery_region, delivery_email,
                payment_transaction, payment_request_id, payment_currency, payment_provider,
                payment_amount, payment_payment_dt, payment_bank,
                payment_delivery_cost, payment_goods_total, payment_custom_fee,
                locale, internal_signature, customer_id, delivery_service,
                shardkey, sm_id, date_created, oof_shard
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)
            ON CONFLICT (order_uid) DO UPDATE SET
                track_number = EXCLUDED.track_number,
                entry = EXCLUDED.entry,
                delivery_name = EXCLUDED.delivery_name,
                delivery_phone = EXCLUDED.delivery_phone,
                delivery_zip = EXCLUDED.delivery_zip,
                delivery_city = EXCLUDED.delivery_city,
                delivery_address = EXCLUDED.delivery_address,
                delivery_region = EXCLUDED.delivery_region,
                delivery_email = EXCLUDED.delivery_email,
                payment_transaction = EXCLUDED.payment_transaction,
                payment_request_id = EXCLUDED.payment_request_id,
                payment_currency = EXCLUDED.payment_currency,
                payment_provider = EXCLUDED.payment_provider,
                payment_amount = EXCLUDED.payment_amount,
                payment_payment_dt = EXCLUDED.payment_payment_dt,
                payment_bank = EXCLUDED.payment_bank,
                payment_delivery_cost = EXCLUDED.payment_delivery_cost,
                payment_goods_total = EXCLUDED.payment_goods_total,
                payment_custom_fee = EXCLUDED.payment_custom_fee,
                locale = EXCLUDED.locale,
                internal_signature = EXCLUDED.internal_signature,
                customer_id = EXCLUDED.customer_id,
                delivery_service = EXCLUDED.delivery_service,
                shardkey = EXCLUDED.shardkey,
                sm_id = EXCLUDED.sm_id,
                date_created = EXCLUDED.date_created,
                oof_shard = EXCLUDED.oof_shard
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.delivery.name)
        .bind(&order.delivery.phone)
        .bind(&order.delivery.zip)
        .bind(&order.delivery.city)
        .bind(&order.delivery.address)
        .bind(&order.delivery.region)
        .bind(&order.delivery.email)
        .bind(&order.payment.transaction)
        .bind(&order.payment.request_id)
        .bind(&order.payment.currency)
        .bind(&order.payment.provider)
        .bind(order.payment.amount)
        .bind(order.payment.payment_dt)
        .bind(&order.payment.bank)
        .bind(order.payment.delivery_cost)
        .bind(order.payment.goods_total)
        .bind(order.payment.custom_fee)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(&order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut *tx)
        .await?;

        // Redelivery of the same order must not accumulate item rows
        let removed = sqlx::query("DELETE FROM items WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed > 0 {
            debug!(
                "Replacing {} item rows for order {}",
                removed, order.order_uid
            );
        }

        for (index, item) in order.items.iter().enumerate() {
            let position = i32::try_from(index).map_err(|_| StoreError::TooManyItems {
                order_uid: order.order_uid.clone(),
                count: order.items.len(),
            })?;

            sqlx::query(
                r#"
                INSERT INTO items (
                    order_uid, position, chrt_id, track_number, price, rid,
                    name, sale, size, total_price, nm_id, brand, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(&order.order_uid)
            .bind(position)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<OrderAggregate>, StoreError> {
        let headers = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT
                order_uid, track_number, entry,
                delivery_name, delivery_phone, delivery_zip, delivery_city,
                delivery_address, delivery_region, delivery_email,
                payment_transaction, payment_request_id, payment_currency, payment_provider,
                payment_amount, payment_payment_dt, payment_bank,
                payment_delivery_cost, payment_goods_total, payment_custom_fee,
                locale, internal_signature, customer_id, delivery_service,
                shardkey, sm_id, date_created, oof_shard
            FROM orders
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let item_rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT
                order_uid, chrt_id, track_number, price, rid,
                name, sale, size, total_price, nm_id, brand, status
            FROM items
            ORDER BY order_uid, position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(assemble(headers, item_rows))
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn upsert(&self, order: &OrderAggregate) -> Result<(), StoreError> {
        let started = Instant::now();
        let result = self.upsert_in_tx(order).await;
        metrics::record_store_operation("upsert", result.is_ok(), started.elapsed().as_secs_f64());

        match &result {
            Ok(()) => info!(
                "Persisted order {} with {} items",
                order.order_uid,
                order.items.len()
            ),
            Err(e) => error!("Failed to persist order {}: {}", order.order_uid, e),
        }

        result
    }

    async fn load_all(&self) -> Result<Vec<OrderAggregate>, StoreError> {
        let started = Instant::now();
        let result = self.scan_all().await;
        metrics::record_store_operation("load_all", result.is_ok(), started.elapsed().as_secs_f64());

        if let Ok(orders) = &result {
            info!("Loaded {} orders from the store", orders.len());
        }

        result
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    delivery_name: String,
    delivery_phone: String,
    delivery_zip: String,
    delivery_city: String,
    delivery_address: String,
    delivery_region: String,
    delivery_email: String,
    payment_transaction: String,
    payment_request_id: String,
    payment_currency: String,
    payment_provider: String,
    payment_amount: i64,
    payment_payment_dt: i64,
    payment_bank: String,
    payment_delivery_cost: i64,
    payment_goods_total: i64,
    payment_custom_fee: i64,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i64,
    date_created: String,
    oof_shard: String,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    order_uid: String,
    chrt_id: i64,
    track_number: String,
    price: i64,
    rid: String,
    name: String,
    sale: i64,
    size: String,
    total_price: i64,
    nm_id: i64,
    brand: String,
    status: i64,
}

impl OrderRow {
    fn into_aggregate(self, items: Vec<OrderItem>) -> OrderAggregate {
        OrderAggregate {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery: Delivery {
                name: self.delivery_name,
                phone: self.delivery_phone,
                zip: self.delivery_zip,
                city: self.delivery_city,
                address: self.delivery_address,
                region: self.delivery_region,
                email: self.delivery_email,
            },
            payment: Payment {
                transaction: self.payment_transaction,
                request_id: self.payment_request_id,
                currency: self.payment_currency,
                provider: self.payment_provider,
                amount: self.payment_amount,
                payment_dt: self.payment_payment_dt,
                bank: self.payment_bank,
                delivery_cost: self.payment_delivery_cost,
                goods_total: self.payment_goods_total,
                custom_fee: self.payment_custom_fee,
            },
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

impl From<ItemRow> for OrderItem {
    fn from(row: ItemRow) -> Self {
        OrderItem {
            chrt_id: row.chrt_id,
            track_number: row.track_number,
            price: row.price,
            rid: row.rid,
            name: row.name,
            sale: row.sale,
            size: row.size,
            total_price: row.total_price,
            nm_id: row.nm_id,
            brand: row.brand,
            status: row.status,
        }
    }
}

/// Join header rows with their item rows. Item rows must arrive in position
/// order; orphaned items (no header) are dropped.
fn assemble(headers: Vec<OrderRow>, item_rows: Vec<ItemRow>) -> Vec<OrderAggregate> {
    let mut items_by_order: HashMap<String, Vec<OrderItem>> = HashMap::new();
    for row in item_rows {
        items_by_order
            .entry(row.order_uid.clone())
            .or_default()
            .push(row.into());
    }

    headers
        .into_iter()
        .map(|header| {
            let items = items_by_order.remove(&header.order_uid).unwrap_or_default();
            header.into_aggregate(items)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(order_uid: &str) -> OrderRow {
        OrderRow {
            order_uid: order_uid.to_string(),
            track_number: "TRACK".to_string(),
            entry: "WBIL".to_string(),
            delivery_name: "Test Testov".to_string(),
            delivery_phone: "+9720000000".to_string(),
            delivery_zip: "2639809".to_string(),
            delivery_city: "Kiryat Mozkin".to_string(),
            delivery_address: "Ploshad Mira 15".to_string(),
            delivery_region: "Kraiot".to_string(),
            delivery_email: "test@gmail.com".to_string(),
            payment_transaction: order_uid.to_string(),
            payment_request_id: String::new(),
            payment_currency: "USD".to_string(),
            payment_provider: "wbpay".to_string(),
            payment_amount: 1817,
            payment_payment_dt: 1637907727,
            payment_bank: "alpha".to_string(),
            payment_delivery_cost: 1500,
            payment_goods_total: 317,
            payment_custom_fee: 0,
            locale: "en".to_string(),
            internal_signature: String::new(),
            customer_id: "test".to_string(),
            delivery_service: "meest".to_string(),
            shardkey: "9".to_string(),
            sm_id: 99,
            date_created: "2021-11-26T06:22:19Z".to_string(),
            oof_shard: "1".to_string(),
        }
    }

    fn item(order_uid: &str, chrt_id: i64) -> ItemRow {
        ItemRow {
            order_uid: order_uid.to_string(),
            chrt_id,
            track_number: "TRACK".to_string(),
            price: 453,
            rid: format!("rid-{}", chrt_id),
            name: "Mascaras".to_string(),
            sale: 30,
            size: "0".to_string(),
            total_price: 317,
            nm_id: 2389212,
            brand: "Vivienne Sabo".to_string(),
            status: 202,
        }
    }

    #[test]
    fn test_assemble_groups_items_by_order() {
        let orders = assemble(
            vec![header("A1"), header("B2")],
            vec![item("A1", 1), item("A1", 2), item("B2", 3)],
        );

        assert_eq!(orders.len(), 2);
        let a1 = orders.iter().find(|o| o.order_uid == "A1").unwrap();
        let b2 = orders.iter().find(|o| o.order_uid == "B2").unwrap();

        let a1_ids: Vec<i64> = a1.items.iter().map(|i| i.chrt_id).collect();
        assert_eq!(a1_ids, vec![1, 2]);
        assert_eq!(b2.items.len(), 1);
        assert_eq!(b2.items[0].rid, "rid-3");
    }

    #[test]
    fn test_assemble_order_without_items() {
        let orders = assemble(vec![header("A1")], vec![]);

        assert_eq!(orders.len(), 1);
        assert!(orders[0].items.is_empty());
    }

    #[test]
    fn test_assemble_maps_flattened_columns() {
        let orders = assemble(vec![header("A1")], vec![item("A1", 9)]);
        let order = &orders[0];

        assert_eq!(order.delivery.city, "Kiryat Mozkin");
        assert_eq!(order.payment.delivery_cost, 1500);
        assert_eq!(order.payment.payment_dt, 1637907727);
        assert_eq!(order.items[0].status, 202);
    }

    #[test]
    fn test_assemble_drops_orphaned_items() {
        let orders = assemble(vec![header("A1")], vec![item("ZZ", 1)]);

        assert_eq!(orders.len(), 1);
        assert!(orders[0].items.is_empty());
    }
}
