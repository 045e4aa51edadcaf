//! Configuration management for Eventgram.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Event lifecycle policy
    pub policy: PolicyConfig,
    /// Blob storage configuration
    pub storage: StorageConfig,
    /// Image upload and processing configuration
    pub images: ImageConfig,
    /// Identity provider configuration
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log level used when `RUST_LOG` does not parse as a filter
    pub log_level: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
    /// Install the Prometheus exporter
    pub metrics_enabled: bool,
    /// Prometheus exporter port
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            shutdown_timeout: 30,
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

/// Event lifecycle policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Longest allowed event, in hours (default: one week)
    pub max_event_length_hours: i64,
    /// Furthest allowed start in the future, in hours (default: four weeks)
    pub max_lookahead_hours: i64,
    /// Whether the end of an event that already ended may still be moved
    pub allow_extending_expired: bool,
    /// Strict mode: events need a description
    pub require_description: bool,
    /// Page size for the event feed and post listings
    pub feed_page_size: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_event_length_hours: 168,
            max_lookahead_hours: 672,
            allow_extending_expired: true,
            require_description: true,
            feed_page_size: 20,
        }
    }
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket that holds uploaded images
    pub bucket: String,
    /// Base URL of public links to stored blobs
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "eventgram-uploads".to_string(),
            public_base_url: "https://storage.googleapis.com".to_string(),
        }
    }
}

/// Image upload and processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// Capacity of the image processing queue
    pub queue_capacity: usize,
    /// Longest side of the thumbnail variant
    pub thumbnail_size: u32,
    /// Longest side of the display variant
    pub display_size: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
            queue_capacity: 64,
            thumbnail_size: 100,
            display_size: 800,
        }
    }
}

/// Identity provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Static bearer tokens: `token=user_id:email;token=user_id:email`
    pub static_tokens: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Missing or unparseable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let server = ServerConfig::default();
        let policy = PolicyConfig::default();
        let storage = StorageConfig::default();
        let images = ImageConfig::default();

        Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or(server.host),
                port: parsed("PORT", server.port),
                log_level: env::var("RUST_LOG").unwrap_or(server.log_level),
                shutdown_timeout: parsed("SHUTDOWN_TIMEOUT", server.shutdown_timeout),
                metrics_enabled: parsed("METRICS_ENABLED", server.metrics_enabled),
                metrics_port: parsed("METRICS_PORT", server.metrics_port),
            },
            policy: PolicyConfig {
                max_event_length_hours: positive_hours(
                    "EVENT_MAX_LENGTH_HOURS",
                    env::var("EVENT_MAX_LENGTH_HOURS").ok(),
                    policy.max_event_length_hours,
                ),
                max_lookahead_hours: positive_hours(
                    "EVENT_MAX_LOOKAHEAD_HOURS",
                    env::var("EVENT_MAX_LOOKAHEAD_HOURS").ok(),
                    policy.max_lookahead_hours,
                ),
                allow_extending_expired: parsed(
                    "EVENT_ALLOW_EXTENDING_EXPIRED",
                    policy.allow_extending_expired,
                ),
                require_description: parsed(
                    "EVENT_REQUIRE_DESCRIPTION",
                    policy.require_description,
                ),
                feed_page_size: parsed("FEED_PAGE_SIZE", policy.feed_page_size),
            },
            storage: StorageConfig {
                bucket: env::var("BLOB_BUCKET").unwrap_or(storage.bucket),
                public_base_url: env::var("BLOB_PUBLIC_BASE_URL")
                    .unwrap_or(storage.public_base_url),
            },
            images: ImageConfig {
                max_upload_bytes: parsed("IMAGE_MAX_UPLOAD_BYTES", images.max_upload_bytes),
                queue_capacity: parsed("IMAGE_QUEUE_CAPACITY", images.queue_capacity),
                thumbnail_size: parsed("IMAGE_THUMBNAIL_SIZE", images.thumbnail_size),
                display_size: parsed("IMAGE_DISPLAY_SIZE", images.display_size),
            },
            auth: AuthConfig {
                static_tokens: env::var("AUTH_STATIC_TOKENS").unwrap_or_default(),
            },
        }
    }

    /// Address the HTTP server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// An hour count that is positive and representable as a `chrono::Duration`.
fn positive_hours(key: &str, raw: Option<String>, default: i64) -> i64 {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<i64>() {
        Ok(hours) if hours > 0 && chrono::Duration::try_hours(hours).is_some() => hours,
        _ => {
            tracing::warn!(key, value = %raw, default, "Ignoring invalid hour count");
            default
        },
    }
}
