//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dispatch service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the query dispatch service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Listener configuration (bind address, body limits).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Feature toggles.
    pub features: FeatureConfig,

    /// Data source cache behaviour.
    pub datasource_cache: DatasourceCacheConfig,

    /// Provisioned data sources served by the built-in cache.
    pub datasources: Vec<DatasourceConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout in seconds.
    pub request_secs: u64,

    /// Deadline for a single backend or expression call in seconds.
    pub backend_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60,
            backend_secs: 30,
        }
    }
}

/// Feature toggles.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct FeatureConfig {
    /// Allow batches that reference the expression engine.
    pub expressions_enabled: bool,
}

/// Data source cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DatasourceCacheConfig {
    /// How long a resolved data source stays cached per user.
    pub ttl_secs: u64,
}

impl Default for DatasourceCacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 5 }
    }
}

/// A provisioned data source.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DatasourceConfig {
    /// Numeric identifier referenced by `datasourceId` in queries.
    pub id: i64,

    /// Stable string identifier.
    #[serde(default)]
    pub uid: String,

    /// Display name.
    pub name: String,

    /// Type tag used to select the executor (e.g., "testdata").
    #[serde(rename = "type")]
    pub type_name: String,

    /// Owning organization.
    #[serde(default = "default_org_id")]
    pub org_id: i64,

    /// Users allowed to query this data source. Empty = everyone in the org.
    #[serde(default)]
    pub allowed_users: Vec<i64>,

    /// Opaque type-specific settings.
    #[serde(default)]
    pub json_data: serde_json::Value,
}

fn default_org_id() -> i64 {
    1
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Config with a single provisioned test-data source (id 1), handy for local runs.
    pub fn with_testdata() -> Self {
        let mut config = Self::default();
        config.datasources.push(DatasourceConfig {
            id: 1,
            uid: "testdata".to_string(),
            name: "TestData DB".to_string(),
            type_name: "testdata".to_string(),
            org_id: 1,
            allowed_users: Vec::new(),
            json_data: serde_json::Value::Null,
        });
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(config.timeouts.backend_secs, 30);
        assert!(!config.features.expressions_enabled);
        assert!(config.datasources.is_empty());
    }

    #[test]
    fn test_minimal_toml() {
        let config: DispatchConfig = toml::from_str(
            r#"
            [features]
            expressions_enabled = true

            [[datasources]]
            id = 7
            name = "prom"
            type = "prometheus"
            "#,
        )
        .unwrap();

        assert!(config.features.expressions_enabled);
        assert_eq!(config.datasources.len(), 1);
        let ds = &config.datasources[0];
        assert_eq!(ds.type_name, "prometheus");
        assert_eq!(ds.org_id, 1);
        assert!(ds.allowed_users.is_empty());
        assert_eq!(config.timeouts.request_secs, 60);
    }
}
