//! Extractor trait definitions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpuslot_core::{GpuslotResult, PriorityFactors};
use serde::{Deserialize, Serialize};

/// Priority factors and slot hints read from a free-text request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRequest {
    /// Requested resource type, if one was recognised
    pub resource_type: Option<String>,
    /// Requested slot start
    pub start: Option<DateTime<Utc>>,
    /// Requested slot end
    pub end: Option<DateTime<Utc>>,
    /// Short purpose summary
    pub purpose: Option<String>,
    pub factors: PriorityFactors,
}

/// Turns natural-language requests into structured factors
#[async_trait]
pub trait FactorExtractor: Send + Sync {
    /// Extract factors from `text`; relative times resolve against `now`
    async fn extract(&self, text: &str, now: DateTime<Utc>) -> GpuslotResult<ExtractedRequest>;

    /// Get the extractor name
    fn name(&self) -> &'static str;
}
