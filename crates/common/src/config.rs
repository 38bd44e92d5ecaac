use serde::Deserialize;
use std::str::FromStr;

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    /// Full connection string; takes precedence over the individual parts
    pub url: Option<String>,
}

impl DatabaseConfig {
    /// Build database URL from configuration
    pub fn url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.username, self.password, self.host, self.port, self.database
            ),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "orders".to_string(),
            max_connections: 10,
            url: None,
        }
    }
}

/// Message bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    /// Dropped messages are forwarded here when set
    pub dead_letter_topic: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "orders".to_string(),
            group_id: "order-service".to_string(),
            dead_letter_topic: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub http: HttpConfig,
    pub log_level: String,
    pub enable_jaeger: bool,
    pub jaeger_endpoint: Option<String>,
}

impl AppConfig {
    /// Read configuration from the process environment, loading `.env` first
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Missing or
    /// unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_defaults = DatabaseConfig::default();
        let kafka_defaults = KafkaConfig::default();

        let database = DatabaseConfig {
            host: lookup("DB_HOST").unwrap_or(db_defaults.host),
            port: parse_or(&lookup, "DB_PORT", db_defaults.port),
            username: lookup("DB_USER").unwrap_or(db_defaults.username),
            password: lookup("DB_PASSWORD").unwrap_or(db_defaults.password),
            database: lookup("DB_NAME").unwrap_or(db_defaults.database),
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", db_defaults.max_connections),
            url: lookup("DATABASE_URL"),
        };

        let kafka = KafkaConfig {
            brokers: lookup("KAFKA_BROKERS").unwrap_or(kafka_defaults.brokers),
            topic: lookup("KAFKA_TOPIC").unwrap_or(kafka_defaults.topic),
            group_id: lookup("CONSUMER_GROUP").unwrap_or(kafka_defaults.group_id),
            dead_letter_topic: lookup("DEAD_LETTER_TOPIC").filter(|t| !t.is_empty()),
        };

        Self {
            database,
            kafka,
            http: HttpConfig {
                port: parse_or(&lookup, "PORT", HttpConfig::default().port),
            },
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            enable_jaeger: parse_or(&lookup, "ENABLE_JAEGER", false),
            jaeger_endpoint: lookup("JAEGER_ENDPOINT"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
