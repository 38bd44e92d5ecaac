use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, register_int_gauge,
    CounterVec, Encoder, Histogram, HistogramVec, IntGauge, TextEncoder,
};

lazy_static! {
    // Ingestion metrics
    pub static ref INGEST_COUNTER: CounterVec = register_counter_vec!(
        "orders_ingested_total",
        "Total number of inbound order messages by outcome",
        &["status"]
    )
    .expect("metric cannot be created");

    pub static ref INGEST_DURATION: Histogram = register_histogram!(
        "orders_ingest_duration_seconds",
        "Time from message receipt to cache publish in seconds",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("metric cannot be created");

    // Store metrics
    pub static ref STORE_OPERATIONS: CounterVec = register_counter_vec!(
        "orders_store_operations_total",
        "Total number of order store operations",
        &["operation", "status"]
    )
    .expect("metric cannot be created");

    pub static ref STORE_DURATION: HistogramVec = register_histogram_vec!(
        "orders_store_duration_seconds",
        "Order store operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0]
    )
    .expect("metric cannot be created");

    // Read path metrics
    pub static ref LOOKUP_COUNTER: CounterVec = register_counter_vec!(
        "orders_lookups_total",
        "Total number of order lookups",
        &["status"]
    )
    .expect("metric cannot be created");

    pub static ref CACHE_ENTRIES: IntGauge = register_int_gauge!(
        "orders_cache_entries",
        "Number of orders held in the cache"
    )
    .expect("metric cannot be created");

    pub static ref DEAD_LETTER_COUNTER: CounterVec = register_counter_vec!(
        "orders_dead_letters_total",
        "Dropped messages forwarded to the dead-letter topic",
        &["status"]
    )
    .expect("metric cannot be created");
}

/// Outcome of a single inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Persisted,
    DecodeError,
    PersistError,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Persisted => "persisted",
            IngestStatus::DecodeError => "decode_error",
            IngestStatus::PersistError => "persist_error",
        }
    }
}

/// Get all metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn record_ingest(status: IngestStatus, duration_secs: f64) {
    INGEST_COUNTER.with_label_values(&[status.as_str()]).inc();
    INGEST_DURATION.observe(duration_secs);
}

pub fn record_store_operation(operation: &str, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "error" };
    STORE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
    STORE_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

pub fn record_lookup(hit: bool) {
    let status = if hit { "hit" } else { "miss" };
    LOOKUP_COUNTER.with_label_values(&[status]).inc();
}

pub fn set_cache_entries(count: usize) {
    CACHE_ENTRIES.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn record_dead_letter(success: bool) {
    let status = if success { "sent" } else { "failed" };
    DEAD_LETTER_COUNTER.with_label_values(&[status]).inc();
}
