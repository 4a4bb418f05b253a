//! Endpoint selection for a migration run.

use serde::{Deserialize, Serialize};

/// Which endpoints a run applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum EndpointFilter {
    IncludeAll,
    /// Exact name, compared case-insensitively
    SpecificEndpoint(String),
}

impl EndpointFilter {
    pub fn specific(name: impl Into<String>) -> Self {
        EndpointFilter::SpecificEndpoint(name.into())
    }

    pub fn should_include(&self, endpoint_name: &str) -> bool {
        match self {
            EndpointFilter::IncludeAll => true,
            EndpointFilter::SpecificEndpoint(name) => {
                name.to_lowercase() == endpoint_name.to_lowercase()
            }
        }
    }

    /// Value recorded in the run parameters
    pub fn as_parameter(&self) -> String {
        match self {
            EndpointFilter::IncludeAll => "*".to_string(),
            EndpointFilter::SpecificEndpoint(name) => name.clone(),
        }
    }
}

impl std::fmt::Display for EndpointFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointFilter::IncludeAll => write!(f, "all endpoints"),
            EndpointFilter::SpecificEndpoint(name) => write!(f, "endpoint '{}'", name),
        }
    }
}
