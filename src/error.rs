//! Error taxonomy for the query core.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Every violated request constraint, collected in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}: {details:?}")]
pub struct ValidationError {
    pub message: String,
    pub error: String,
    pub status_code: u16,
    pub details: Vec<String>,
}

impl ValidationError {
    pub fn new(details: Vec<String>) -> Self {
        Self {
            message: "Validation failed".to_string(),
            error: "Bad Request".to_string(),
            status_code: 400,
            details,
        }
    }

    pub fn single(detail: impl Into<String>) -> Self {
        Self::new(vec![detail.into()])
    }
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("query failed ({context}): {source}")]
    QueryExecution {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("not found: {0}")]
    NotFound(String),

    /// The connection pool itself failed; callers should rebuild the service.
    #[error("connection pool error: {0}")]
    Pool(String),
}

impl DashboardError {
    pub fn query(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::QueryExecution {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn is_pool_failure(&self) -> bool {
        matches!(self, DashboardError::Pool(_))
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
