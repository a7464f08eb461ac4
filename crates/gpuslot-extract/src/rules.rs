//! Keyword-based factor extraction
//!
//! Works offline and never fails. Keyword tables cover English and Japanese
//! phrasing; anything unrecognised keeps the default factor value.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gpuslot_core::{
    AcademicNovelty, CollaborationType, DataConfidentiality, DeadlineFactors, DeadlineType,
    FundingFactors, FundingType, GpuslotResult, ImpactFactors, Level, Position, PriorityFactors,
    ProjectScale, PublicationTarget, PurposeFactors, Reproducibility, RequesterFactors,
    ResearchExperience, ResearchField, UrgencyLevel, UsageEfficiency, UsageType,
};
use tracing::debug;

use crate::traits::{ExtractedRequest, FactorExtractor};

/// Resource type assumed when the text names none
pub const DEFAULT_RESOURCE_TYPE: &str = "A100";

/// Longest purpose kept before truncation, in characters
pub const MAX_PURPOSE_CHARS: usize = 100;

/// Slot length assumed when the text gives no times
pub const DEFAULT_SLOT_HOURS: i64 = 4;

const RESOURCE_KEYWORDS: &[(&str, &[&str])] = &[
    ("V100", &["v100"]),
    ("RTX4090", &["rtx4090", "rtx 4090", "4090"]),
    ("H100", &["h100"]),
    ("A100", &["a100"]),
];

const TODAY: &[&str] = &["today", "tonight", "this afternoon", "今日", "本日"];
const IMMEDIATE: &[&str] = &["immediately", "right now", "asap", "至急"];
const URGENT: &[&str] = &["urgent", "hurry", "by end of day", "緊急", "急い", "今日中"];
const DEADLINE: &[&str] = &[
    "deadline", "paper", "submission", "presentation", "thesis", "論文", "発表", "締切",
];
const PAPER: &[&str] = &["paper", "submission", "論文"];
const CONFERENCE: &[&str] = &["conference", "presentation", "発表", "学会"];
const THESIS: &[&str] = &["thesis", "dissertation", "defense", "卒論", "修論", "博論"];

const MEDICAL: &[&str] = &["medical", "clinical", "medicine", "医療", "医学"];
const DISASTER: &[&str] = &["disaster", "earthquake", "flood", "災害", "防災"];
const CLIMATE: &[&str] = &["climate", "environment", "気候", "環境"];
const AI_SAFETY: &[&str] = &["ai safety", "alignment", "安全性"];
const NOVEL: &[&str] = &["novel", "new method", "breakthrough", "新しい", "革新"];

const GRANT: &[&str] = &["grant", "kakenhi", "科研費"];
const EXTERNAL_FUNDING: &[&str] = &["grant", "funded", "funding", "kakenhi", "科研費", "資金"];
const INDUSTRY: &[&str] = &["industry", "company", "企業", "共同研究"];

const EXPERIMENT: &[&str] = &["experiment", "実験"];
const LEARNING: &[&str] = &["learning", "study", "tutorial", "coursework", "学習", "勉強"];
const ANALYSIS: &[&str] = &["analysis", "analyze", "分析"];
const HEAVY: &[&str] = &["large-scale", "large scale", "massive", "大量", "高速"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Factors assumed for free text before any keyword applies
pub fn default_factors() -> PriorityFactors {
    PriorityFactors {
        deadline: DeadlineFactors {
            has_deadline: false,
            days_until_deadline: None,
            deadline_type: Some(DeadlineType::Other),
            urgency_level: Some(UrgencyLevel::Moderate),
        },
        impact: ImpactFactors {
            research_field: Some(ResearchField::BasicResearch),
            social_contribution: Some(Level::Medium),
            academic_novelty: Some(AcademicNovelty::Incremental),
            publication_target: Some(PublicationTarget::NoPublication),
        },
        funding: FundingFactors {
            has_external_funding: false,
            funding_type: Some(FundingType::Internal),
            project_scale: Some(ProjectScale::Medium),
            collaboration_type: Some(CollaborationType::Internal),
        },
        purpose: PurposeFactors {
            usage_type: Some(UsageType::ModelTraining),
            data_confidentiality: Some(DataConfidentiality::Public),
            reproducibility_requirement: Some(Reproducibility::Moderate),
            computational_complexity: Some(Level::Medium),
        },
        requester: Some(RequesterFactors {
            position: Some(Position::PhdStudent),
            research_experience: Some(ResearchExperience::Intermediate),
            past_usage_efficiency: Some(UsageEfficiency::Average),
            lab_priority: Some(Level::Medium),
        }),
    }
}

/// Shorten `text` to `MAX_PURPOSE_CHARS` characters, marking the cut
pub fn truncate_purpose(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > MAX_PURPOSE_CHARS {
        let head: String = trimmed.chars().take(MAX_PURPOSE_CHARS).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

/// Slot used when the text gives no times: tomorrow at this time, or within
/// the hour for "today" style requests
pub fn default_window(text: &str, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = if contains_any(&text.to_lowercase(), TODAY) {
        now + Duration::hours(1)
    } else {
        now + Duration::hours(24)
    };
    (start, start + Duration::hours(DEFAULT_SLOT_HOURS))
}

/// Rule-based extractor
#[derive(Debug, Clone, Default)]
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse `text` without any I/O
    pub fn parse(&self, text: &str, now: DateTime<Utc>) -> ExtractedRequest {
        let lower = text.to_lowercase();
        let mut factors = default_factors();

        let resource_type = RESOURCE_KEYWORDS
            .iter()
            .find(|(_, keywords)| contains_any(&lower, keywords))
            .map(|(name, _)| *name)
            .unwrap_or(DEFAULT_RESOURCE_TYPE);

        let deadline = &mut factors.deadline;
        if contains_any(&lower, IMMEDIATE) {
            deadline.urgency_level = Some(UrgencyLevel::Immediate);
            deadline.has_deadline = true;
        } else if contains_any(&lower, URGENT) {
            deadline.urgency_level = Some(UrgencyLevel::Urgent);
            deadline.has_deadline = true;
        }
        if contains_any(&lower, DEADLINE) {
            deadline.has_deadline = true;
        }
        if deadline.has_deadline {
            deadline.days_until_deadline = Some(1.0);
            deadline.deadline_type = Some(if contains_any(&lower, PAPER) {
                DeadlineType::PaperSubmission
            } else if contains_any(&lower, THESIS) {
                DeadlineType::ThesisDefense
            } else if contains_any(&lower, CONFERENCE) {
                DeadlineType::ConferencePresentation
            } else {
                DeadlineType::Other
            });
        }

        let impact = &mut factors.impact;
        if contains_any(&lower, MEDICAL) {
            impact.research_field = Some(ResearchField::Medical);
            impact.social_contribution = Some(Level::High);
        } else if contains_any(&lower, DISASTER) {
            impact.research_field = Some(ResearchField::DisasterPrevention);
        } else if contains_any(&lower, CLIMATE) {
            impact.research_field = Some(ResearchField::ClimateChange);
        } else if contains_any(&lower, AI_SAFETY) {
            impact.research_field = Some(ResearchField::AiSafety);
        }
        if contains_any(&lower, NOVEL) {
            impact.academic_novelty = Some(AcademicNovelty::Significant);
        }
        if contains_any(&lower, PAPER) {
            impact.publication_target = Some(PublicationTarget::MajorConference);
        }

        let funding = &mut factors.funding;
        if contains_any(&lower, EXTERNAL_FUNDING) || contains_any(&lower, INDUSTRY) {
            funding.has_external_funding = true;
            funding.funding_type = Some(if contains_any(&lower, GRANT) {
                FundingType::GovernmentGrant
            } else if contains_any(&lower, INDUSTRY) {
                FundingType::IndustryCollaboration
            } else {
                FundingType::Internal
            });
        }
        if contains_any(&lower, INDUSTRY) {
            funding.collaboration_type = Some(CollaborationType::IndustryAcademia);
        }

        // Later matches win: analysis beats learning beats experiment.
        let purpose = &mut factors.purpose;
        if contains_any(&lower, EXPERIMENT) {
            purpose.usage_type = Some(UsageType::ResearchExperiment);
        }
        if contains_any(&lower, LEARNING) {
            purpose.usage_type = Some(UsageType::Learning);
        }
        if contains_any(&lower, ANALYSIS) {
            purpose.usage_type = Some(UsageType::DataAnalysis);
        }
        if contains_any(&lower, HEAVY) {
            purpose.computational_complexity = Some(Level::High);
        }

        let (start, end) = default_window(text, now);

        debug!(
            resource_type = %resource_type,
            has_deadline = factors.deadline.has_deadline,
            "Parsed request with keyword rules"
        );

        ExtractedRequest {
            resource_type: Some(resource_type.to_string()),
            start: Some(start),
            end: Some(end),
            purpose: Some(truncate_purpose(text)),
            factors,
        }
    }
}

#[async_trait]
impl FactorExtractor for RuleBasedExtractor {
    async fn extract(&self, text: &str, now: DateTime<Utc>) -> GpuslotResult<ExtractedRequest> {
        Ok(self.parse(text, now))
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}
