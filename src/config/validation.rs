//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check provisioned data sources are unique and addressable
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DispatchConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::DispatchConfig;
use crate::query::model::EXPRESSION_DATASOURCE_NAME;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("timeout {0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("duplicate data source id {0}")]
    DuplicateDatasourceId(i64),

    #[error("data source id {0} must be positive")]
    NonPositiveDatasourceId(i64),

    #[error("data source {0} has an empty name")]
    EmptyDatasourceName(i64),

    #[error("data source {0} uses the reserved name __expr__")]
    ReservedDatasourceName(i64),
}

/// Check a configuration, collecting every problem.
pub fn validate_config(config: &DispatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "metrics",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }
    if config.timeouts.backend_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("backend_secs"));
    }

    let mut seen = HashSet::new();
    for ds in &config.datasources {
        if ds.id <= 0 {
            errors.push(ValidationError::NonPositiveDatasourceId(ds.id));
        }
        if !seen.insert(ds.id) {
            errors.push(ValidationError::DuplicateDatasourceId(ds.id));
        }
        if ds.name.trim().is_empty() {
            errors.push(ValidationError::EmptyDatasourceName(ds.id));
        } else if ds.name == EXPRESSION_DATASOURCE_NAME {
            errors.push(ValidationError::ReservedDatasourceName(ds.id));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
