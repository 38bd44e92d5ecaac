use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppConfig;

const DEFAULT_JAEGER_AGENT: &str = "localhost:6831";

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_level: String,
    pub jaeger_endpoint: Option<String>,
    pub enable_jaeger: bool,
}

impl TelemetryConfig {
    pub fn for_service(service_name: &str, config: &AppConfig) -> Self {
        Self {
            service_name: service_name.to_string(),
            log_level: config.log_level.clone(),
            jaeger_endpoint: config.jaeger_endpoint.clone(),
            enable_jaeger: config.enable_jaeger,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "order-service".to_string(),
            log_level: "info".to_string(),
            jaeger_endpoint: None,
            enable_jaeger: false,
        }
    }
}

/// Install the global tracing subscriber: JSON logs filtered by `RUST_LOG`
/// (or the configured level), plus a Jaeger exporter when enabled.
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .json();

    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    if config.enable_jaeger {
        let endpoint = config
            .jaeger_endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_JAEGER_AGENT.to_string());

        let tracer = opentelemetry_jaeger::new_agent_pipeline()
            .with_service_name(&config.service_name)
            .with_endpoint(endpoint)
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;

        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()?;
    } else {
        registry.try_init()?;
    }

    tracing::info!(
        service = %config.service_name,
        jaeger = config.enable_jaeger,
        "Telemetry initialized"
    );

    Ok(())
}

/// Flush pending spans before exit
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
