//! Remote-first extraction with a keyword fallback

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpuslot_core::GpuslotResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::rules::RuleBasedExtractor;
use crate::traits::{ExtractedRequest, FactorExtractor};

/// Tries `primary` within `timeout`; any error or timeout is answered by the
/// rule-based parser instead, so `extract` never fails
pub struct FallbackExtractor {
    primary: Arc<dyn FactorExtractor>,
    fallback: RuleBasedExtractor,
    timeout: Duration,
}

impl FallbackExtractor {
    pub fn new(primary: Arc<dyn FactorExtractor>, timeout: Duration) -> Self {
        Self {
            primary,
            fallback: RuleBasedExtractor::new(),
            timeout,
        }
    }
}

#[async_trait]
impl FactorExtractor for FallbackExtractor {
    async fn extract(&self, text: &str, now: DateTime<Utc>) -> GpuslotResult<ExtractedRequest> {
        match tokio::time::timeout(self.timeout, self.primary.extract(text, now)).await {
            Ok(Ok(extracted)) => return Ok(extracted),
            Ok(Err(e)) => warn!(
                extractor = self.primary.name(),
                error = %e,
                "Extraction failed, using keyword rules"
            ),
            Err(_) => warn!(
                extractor = self.primary.name(),
                timeout_ms = self.timeout.as_millis() as u64,
                "Extraction timed out, using keyword rules"
            ),
        }
        Ok(self.fallback.parse(text, now))
    }

    fn name(&self) -> &'static str {
        self.primary.name()
    }
}
