use common::metrics::{self, IngestStatus};
use domain::{decode_order, DecodeError};
use messaging::{ConsumerError, DeadLetter, DeadLetterSink, MessageSource};
use order_store::{OrderStore, StoreError};
use read_model::OrderCache;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const SOURCE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to decode order message: {0}")]
    Decode(#[from] DecodeError),

    #[error("Failed to persist order {order_uid}: {source}")]
    Persist {
        order_uid: String,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    /// Pipeline stage that rejected the message
    pub fn stage(&self) -> &'static str {
        match self {
            IngestError::Decode(_) => "decode",
            IngestError::Persist { .. } => "persist",
        }
    }
}

/// Counters for one run of the ingestion loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub ingested: u64,
    pub decode_failures: u64,
    pub persist_failures: u64,
    pub source_errors: u64,
}

/// Moves inbound messages into the store and then the cache, one at a time.
///
/// The cache is written only after the store has committed, so a lookup can
/// never return an order that would be missing after a restart. Messages are
/// never processed concurrently, which keeps updates to the same order in bus
/// order.
pub struct IngestionCoordinator {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    error_backoff: Duration,
}

impl IngestionCoordinator {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<OrderCache>) -> Self {
        Self {
            store,
            cache,
            dead_letters: None,
            error_backoff: SOURCE_ERROR_BACKOFF,
        }
    }

    /// Forward every dropped message to `sink`
    pub fn with_dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    /// Pause after a bus error before asking for the next message
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Decode, persist, then publish one message. Returns the order id on success.
    ///
    /// On any error the cache is left untouched.
    pub async fn handle_message(&self, payload: &[u8]) -> Result<String, IngestError> {
        let order = decode_order(payload)?;
        let order_uid = order.order_uid.clone();

        debug!(
            "Decoded order {} with {} items",
            order_uid,
            order.items.len()
        );

        self.store
            .upsert(&order)
            .await
            .map_err(|source| IngestError::Persist {
                order_uid: order_uid.clone(),
                source,
            })?;

        // Committed: safe to make visible
        self.cache.put(order).await;

        Ok(order_uid)
    }

    /// Consume `source` until it is exhausted or `shutdown` flips to `true`
    /// (or its sender is dropped).
    ///
    /// A message already received is always carried through to completion
    /// before shutdown is honoured. Delivery is at-least-once.
    pub async fn run<S>(&self, source: &mut S, mut shutdown: watch::Receiver<bool>) -> IngestStats
    where
        S: MessageSource + ?Sized,
    {
        let mut stats = IngestStats::default();
        info!("Starting order ingestion loop...");

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping ingestion");
                break;
            }

            let next = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown channel closed, stopping ingestion");
                        break;
                    }
                    continue;
                }
                next = source.next_message() => next,
            };

            match next {
                Ok(Some(payload)) => self.process(&payload, &mut stats).await,
                Ok(None) => {
                    info!("Message source exhausted");
                    break;
                }
                Err(ConsumerError::NoPayload) => {
                    warn!("Skipping message without payload");
                    stats.decode_failures += 1;
                    metrics::record_ingest(IngestStatus::DecodeError, 0.0);
                }
                Err(e) => {
                    error!("Error receiving from message bus: {}", e);
                    stats.source_errors += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(self.error_backoff) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        info!(
            "Ingestion loop stopped: {} ingested, {} decode failures, {} persist failures",
            stats.ingested, stats.decode_failures, stats.persist_failures
        );

        stats
    }

    async fn process(&self, payload: &[u8], stats: &mut IngestStats) {
        let started = Instant::now();
        let result = self.handle_message(payload).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(order_uid) => {
                stats.ingested += 1;
                metrics::record_ingest(IngestStatus::Persisted, elapsed);
                info!("Ingested order {}", order_uid);
            }
            Err(e) => {
                let status = match &e {
                    IngestError::Decode(_) => {
                        stats.decode_failures += 1;
                        IngestStatus::DecodeError
                    }
                    IngestError::Persist { .. } => {
                        stats.persist_failures += 1;
                        IngestStatus::PersistError
                    }
                };
                metrics::record_ingest(status, elapsed);
                error!("Dropping message: {}", e);

                self.dead_letter(&e, payload).await;
            }
        }
    }

    async fn dead_letter(&self, err: &IngestError, payload: &[u8]) {
        let Some(sink) = &self.dead_letters else {
            return;
        };

        let letter = DeadLetter::new(err.stage(), err, payload);
        match sink.send(&letter).await {
            Ok(()) => {
                metrics::record_dead_letter(true);
                debug!("Dead-lettered message {}", letter.id);
            }
            Err(e) => {
                metrics::record_dead_letter(false);
                error!("Failed to dead-letter message {}: {}", letter.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain::OrderAggregate;
    use mockall::{mock, Sequence};
    use read_model::ColdOrderCache;
    use serde_json::json;

    mock! {
        pub Store {}

        #[async_trait]
        impl OrderStore for Store {
            async fn upsert(&self, order: &OrderAggregate) -> Result<(), StoreError>;
            async fn load_all(&self) -> Result<Vec<OrderAggregate>, StoreError>;
        }
    }

    fn message(order_uid: &str, track_number: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "order_uid": order_uid,
            "track_number": track_number,
            "entry": "WBIL",
            "delivery": {
                "name": "Test Testov", "phone": "+9720000000", "zip": "2639809",
                "city": "Kiryat Mozkin", "address": "Ploshad Mira 15",
                "region": "Kraiot", "email": "test@gmail.com"
            },
            "payment": {
                "transaction": order_uid, "request_id": "", "currency": "USD",
                "provider": "wbpay", "amount": 1817, "payment_dt": 1637907727,
                "bank": "alpha", "delivery_cost": 1500, "goods_total": 317, "custom_fee": 0
            },
            "items": [{
                "chrt_id": 1, "track_number": track_number, "price": 453,
                "rid": "ab4219087a764ae0btest", "name": "Mascaras", "sale": 30,
                "size": "0", "total_price": 317, "nm_id": 2389212,
                "brand": "Vivienne Sabo", "status": 202
            }],
            "locale": "en",
            "internal_signature": "",
            "customer_id": "test",
            "delivery_service": "meest",
            "shardkey": "9",
            "sm_id": 99,
            "date_created": "2021-11-26T06:22:19Z",
            "oof_shard": "1"
        }))
        .unwrap()
    }

    fn empty_cache() -> Arc<OrderCache> {
        Arc::new(ColdOrderCache::new().warm_up(Vec::new()))
    }

    fn db_down() -> StoreError {
        StoreError::DatabaseError(sqlx::Error::PoolTimedOut)
    }

    #[tokio::test]
    async fn test_successful_message_is_persisted_then_cached() {
        let mut store = MockStore::new();
        store
            .expect_upsert()
            .withf(|order| order.order_uid == "A1" && order.track_number == "T1")
            .times(1)
            .returning(|_| Ok(()));

        let cache = empty_cache();
        let coordinator = IngestionCoordinator::new(Arc::new(store), cache.clone());

        let order_uid = coordinator.handle_message(&message("A1", "T1")).await.unwrap();

        assert_eq!(order_uid, "A1");
        assert_eq!(cache.get("A1").await.unwrap().track_number, "T1");
    }

    #[tokio::test]
    async fn test_decode_failure_never_reaches_store() {
        let mut store = MockStore::new();
        store.expect_upsert().never();

        let cache = empty_cache();
        let coordinator = IngestionCoordinator::new(Arc::new(store), cache.clone());

        let err = coordinator.handle_message(b"not json").await.unwrap_err();

        assert!(matches!(err, IngestError::Decode(_)));
        assert_eq!(err.stage(), "decode");
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_persist_failure_leaves_cache_untouched() {
        let mut store = MockStore::new();
        let mut seq = Sequence::new();
        store
            .expect_upsert()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        store
            .expect_upsert()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(db_down()));

        let cache = empty_cache();
        let coordinator = IngestionCoordinator::new(Arc::new(store), cache.clone());

        coordinator.handle_message(&message("A1", "T1")).await.unwrap();
        let err = coordinator
            .handle_message(&message("A1", "T2"))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Persist { ref order_uid, .. } if order_uid == "A1"));
        assert_eq!(cache.get("A1").await.unwrap().track_number, "T1");
    }

    #[tokio::test]
    async fn test_persist_failure_for_new_order_stays_absent() {
        let mut store = MockStore::new();
        store.expect_upsert().times(1).returning(|_| Err(db_down()));

        let cache = empty_cache();
        let coordinator = IngestionCoordinator::new(Arc::new(store), cache.clone());

        assert!(coordinator.handle_message(&message("A1", "T1")).await.is_err());
        assert!(cache.get("A1").await.is_none());
    }

    #[test]
    fn test_ingest_error_stage() {
        let err = IngestError::Persist {
            order_uid: "A1".to_string(),
            source: db_down(),
        };
        assert_eq!(err.stage(), "persist");
        assert!(err.to_string().contains("A1"));
    }
}
