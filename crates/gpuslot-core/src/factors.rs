//! Qualitative request attributes that feed the priority score
//!
//! Every sub-attribute is optional. A value that is absent, or that carries a
//! string outside the closed set, deserializes to `None` and is scored with the
//! table's neutral default instead of failing the request.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{GpuslotError, GpuslotResult};

/// Factor set supplied with every reservation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityFactors {
    /// Time pressure (weight 0.30)
    pub deadline: DeadlineFactors,
    /// Social and academic impact (weight 0.25)
    pub impact: ImpactFactors,
    /// Funding and project nature (weight 0.20)
    pub funding: FundingFactors,
    /// Intended usage (weight 0.15)
    pub purpose: PurposeFactors,
    /// Requester attributes (weight 0.10); scored neutrally when absent
    #[serde(default, alias = "user", skip_serializing_if = "Option::is_none")]
    pub requester: Option<RequesterFactors>,
}

impl PriorityFactors {
    /// Categories that must be present in an incoming factor document
    pub const REQUIRED_CATEGORIES: [&'static str; 4] = ["deadline", "impact", "funding", "purpose"];

    /// Parse a loosely-typed factor document, reporting missing categories
    /// as a validation error rather than a serde error.
    pub fn from_value(value: serde_json::Value) -> GpuslotResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            GpuslotError::Validation("priority factors must be an object".to_string())
        })?;

        let missing: Vec<&str> = Self::REQUIRED_CATEGORIES
            .iter()
            .copied()
            .filter(|category| object.get(*category).map_or(true, |v| v.is_null()))
            .collect();

        if !missing.is_empty() {
            return Err(GpuslotError::Validation(format!(
                "missing priority factor categories: {}",
                missing.join(", ")
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| GpuslotError::Validation(format!("invalid priority factors: {}", e)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeadlineFactors {
    #[serde(default)]
    pub has_deadline: bool,
    /// Days left; zero or negative once the deadline has passed
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub days_until_deadline: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub deadline_type: Option<DeadlineType>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub urgency_level: Option<UrgencyLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactFactors {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub research_field: Option<ResearchField>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub social_contribution: Option<Level>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub academic_novelty: Option<AcademicNovelty>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub publication_target: Option<PublicationTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundingFactors {
    #[serde(default)]
    pub has_external_funding: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub funding_type: Option<FundingType>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub project_scale: Option<ProjectScale>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub collaboration_type: Option<CollaborationType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurposeFactors {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub usage_type: Option<UsageType>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub data_confidentiality: Option<DataConfidentiality>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub reproducibility_requirement: Option<Reproducibility>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub computational_complexity: Option<Level>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequesterFactors {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub research_experience: Option<ResearchExperience>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub past_usage_efficiency: Option<UsageEfficiency>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub lab_priority: Option<Level>,
}

/// Accept any value and keep it only if it parses as `T`
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineType {
    PaperSubmission,
    ConferencePresentation,
    ProjectDelivery,
    ThesisDefense,
    Other,
    #[serde(rename = "none")]
    NoDeadline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Immediate,
    Urgent,
    Moderate,
    Flexible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchField {
    Medical,
    DisasterPrevention,
    ClimateChange,
    AiSafety,
    BasicResearch,
    Engineering,
    Other,
}

/// Three-step scale shared by several attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcademicNovelty {
    Breakthrough,
    Significant,
    Incremental,
    Learning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationTarget {
    TopTier,
    MajorConference,
    Journal,
    Workshop,
    #[serde(rename = "none")]
    NoPublication,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingType {
    GovernmentGrant,
    IndustryCollaboration,
    InternationalProject,
    Internal,
    Personal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectScale {
    Large,
    Medium,
    Small,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationType {
    MultiInstitutional,
    IndustryAcademia,
    International,
    Internal,
    Individual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    ResearchExperiment,
    ModelTraining,
    DataAnalysis,
    Reproduction,
    Learning,
    Testing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataConfidentiality {
    Confidential,
    Sensitive,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reproducibility {
    Critical,
    Important,
    Moderate,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Professor,
    AssociateProfessor,
    AssistantProfessor,
    Postdoc,
    PhdStudent,
    MasterStudent,
    Undergraduate,
    Staff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchExperience {
    Senior,
    Intermediate,
    Junior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageEfficiency {
    Excellent,
    Good,
    Average,
    Poor,
}
