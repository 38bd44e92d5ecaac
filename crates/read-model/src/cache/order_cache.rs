use common::metrics;
use domain::OrderAggregate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// An order cache that has not been populated yet.
///
/// It exposes no reads or writes. The only way forward is [`ColdOrderCache::warm_up`],
/// which consumes it, so nothing can observe the cache before warm-up and
/// warm-up cannot happen twice.
#[derive(Debug, Default)]
pub struct ColdOrderCache {
    _private: (),
}

impl ColdOrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the cache with every persisted order and open it for use
    pub fn warm_up<I>(self, orders: I) -> OrderCache
    where
        I: IntoIterator<Item = OrderAggregate>,
    {
        let entries: HashMap<String, Arc<OrderAggregate>> = orders
            .into_iter()
            .map(|order| (order.order_uid.clone(), Arc::new(order)))
            .collect();

        info!("Order cache warmed up with {} orders", entries.len());
        metrics::set_cache_entries(entries.len());

        OrderCache {
            entries: RwLock::new(entries),
        }
    }
}

/// In-process map from `order_uid` to the latest committed order.
///
/// Access is many readers and one writer (the ingestion loop). Values are
/// immutable `Arc`s: a `put` swaps the whole pointer under the write lock and
/// a `get` clones the pointer under the read lock, so a reader sees either the
/// old aggregate or the new one, never a mix. Neither lock is held across I/O.
///
/// The cache is unbounded; it mirrors the store's order history.
#[derive(Debug)]
pub struct OrderCache {
    entries: RwLock<HashMap<String, Arc<OrderAggregate>>>,
}

impl OrderCache {
    /// Get the cached order for `order_uid`
    pub async fn get(&self, order_uid: &str) -> Option<Arc<OrderAggregate>> {
        self.entries.read().await.get(order_uid).cloned()
    }

    /// Replace the entry for the order's id. Returns the previous entry, if any.
    ///
    /// Callers must only publish orders that have already been committed to the store.
    pub async fn put(&self, order: OrderAggregate) -> Option<Arc<OrderAggregate>> {
        let order_uid = order.order_uid.clone();
        let entry = Arc::new(order);

        let (previous, len) = {
            let mut entries = self.entries.write().await;
            let previous = entries.insert(order_uid.clone(), entry);
            (previous, entries.len())
        };

        metrics::set_cache_entries(len);
        debug!(
            "Cached order {} ({})",
            order_uid,
            if previous.is_some() { "replaced" } else { "new" }
        );

        previous
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Delivery, OrderItem, Payment};

    /// Every text field carries `version` so a mixed read is detectable
    fn order(order_uid: &str, version: i64, item_count: usize) -> OrderAggregate {
        let tag = format!("v{}", version);
        OrderAggregate {
            order_uid: order_uid.to_string(),
            track_number: tag.clone(),
            entry: tag.clone(),
            delivery: Delivery {
                name: tag.clone(),
                phone: tag.clone(),
                zip: tag.clone(),
                city: tag.clone(),
                address: tag.clone(),
                region: tag.clone(),
                email: tag.clone(),
            },
            payment: Payment {
                transaction: tag.clone(),
                request_id: tag.clone(),
                currency: "USD".to_string(),
                provider: tag.clone(),
                amount: version,
                payment_dt: version,
                bank: tag.clone(),
                delivery_cost: version,
                goods_total: version,
                custom_fee: item_count as i64,
            },
            items: (0..item_count)
                .map(|_| OrderItem {
                    chrt_id: version,
                    track_number: tag.clone(),
                    price: version,
                    rid: tag.clone(),
                    name: tag.clone(),
                    sale: 0,
                    size: tag.clone(),
                    total_price: version,
                    nm_id: version,
                    brand: tag.clone(),
                    status: 202,
                })
                .collect(),
            locale: "en".to_string(),
            internal_signature: tag.clone(),
            customer_id: tag.clone(),
            delivery_service: tag.clone(),
            shardkey: tag.clone(),
            sm_id: version,
            date_created: tag.clone(),
            oof_shard: tag,
        }
    }

    fn is_consistent(order: &OrderAggregate) -> bool {
        let v = order.sm_id;
        let tag = format!("v{}", v);
        order.track_number == tag
            && order.delivery.email == tag
            && order.payment.amount == v
            && order.items.len() as i64 == order.payment.custom_fee
            && order.items.iter().all(|i| i.chrt_id == v && i.name == tag)
    }

    #[tokio::test]
    async fn test_warm_up_populates_entries() {
        let cache = ColdOrderCache::new().warm_up(vec![order("A1", 1, 1), order("B2", 2, 2)]);

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("A1").await.unwrap().track_number, "v1");
        assert_eq!(cache.get("B2").await.unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn test_warm_up_with_nothing() {
        let cache = ColdOrderCache::new().warm_up(Vec::new());

        assert!(cache.is_empty().await);
        assert!(cache.get("A1").await.is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_whole_entry() {
        let cache = ColdOrderCache::new().warm_up(vec![order("A1", 3, 3)]);

        let previous = cache.put(order("A1", 1, 1)).await;
        assert_eq!(previous.unwrap().sm_id, 3);

        let current = cache.get("A1").await.unwrap();
        assert_eq!(*current, order("A1", 1, 1));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_put_new_key() {
        let cache = ColdOrderCache::new().warm_up(Vec::new());

        assert!(cache.put(order("A1", 1, 1)).await.is_none());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_reader_keeps_snapshot_after_replace() {
        let cache = ColdOrderCache::new().warm_up(vec![order("A1", 1, 1)]);

        let snapshot = cache.get("A1").await.unwrap();
        cache.put(order("A1", 2, 2)).await;

        assert_eq!(snapshot.sm_id, 1);
        assert!(is_consistent(&snapshot));
        assert_eq!(cache.get("A1").await.unwrap().sm_id, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reads_never_observe_mixed_versions() {
        let cache = Arc::new(ColdOrderCache::new().warm_up(vec![order("A1", 1, 1)]));

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for version in 1..=200 {
                    let item_count = (version % 5 + 1) as usize;
                    cache.put(order("A1", version, item_count)).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for _ in 0..500 {
                        let seen = cache.get("A1").await.unwrap();
                        assert!(is_consistent(&seen), "mixed read: {:?}", seen);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
