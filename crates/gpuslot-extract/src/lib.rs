//! gpuslot-extract: Free-text factor extraction
//!
//! This crate turns natural-language reservation requests into priority factors:
//! - Keyword rules for English and Japanese text
//! - A remote language-model client with a request budget
//! - A fallback chain that answers with the keyword rules on any remote failure

pub mod fallback;
pub mod remote;
pub mod rules;
pub mod traits;
pub mod usage;

pub use fallback::FallbackExtractor;
pub use remote::RemoteModelExtractor;
pub use rules::RuleBasedExtractor;
pub use traits::{ExtractedRequest, FactorExtractor};
pub use usage::{UsageLimiter, UsageStats, UsageStatus};

use gpuslot_core::{ExtractionConfig, ExtractionMode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Build the extractor selected by `config`. Remote mode without a usable
/// client degrades to keyword rules.
pub fn build_extractor(
    config: &ExtractionConfig,
    usage: Arc<UsageLimiter>,
) -> Arc<dyn FactorExtractor> {
    match config.mode {
        ExtractionMode::Rules => {
            info!("Using keyword rules for extraction");
            Arc::new(RuleBasedExtractor::new())
        }
        ExtractionMode::Remote => match RemoteModelExtractor::new(config, usage) {
            Ok(remote) => {
                info!(model = %config.model, "Using remote model for extraction");
                // Allow the HTTP client its own timeout before giving up on it.
                let timeout = Duration::from_secs(config.timeout_secs + 1);
                Arc::new(FallbackExtractor::new(Arc::new(remote), timeout))
            }
            Err(e) => {
                warn!(error = %e, "Remote extraction unavailable, using keyword rules");
                Arc::new(RuleBasedExtractor::new())
            }
        },
    }
}
