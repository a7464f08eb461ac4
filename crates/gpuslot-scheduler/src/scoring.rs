//! Multi-factor priority scoring
//!
//! `score` is a pure function: each category is scored 0-100 from lookup
//! tables, weighted, and summed into a 0-100 total. Absent or unrecognised
//! attributes use the neutral default of their table.

use gpuslot_core::{
    AcademicNovelty, CollaborationType, DataConfidentiality, DeadlineFactors, DeadlineType,
    FundingFactors, FundingType, ImpactFactors, Level, Position, PriorityFactors, ProjectScale,
    PublicationTarget, PurposeFactors, Reproducibility, RequesterFactors, ResearchExperience,
    ResearchField, Tier, UrgencyLevel, UsageEfficiency, UsageType,
};
use serde::{Deserialize, Serialize};

/// Upper bound of every category and of the total
pub const MAX_SCORE: f64 = 100.0;

/// Deadline category score when the request has no deadline at all
pub const NO_DEADLINE_SCORE: u32 = 20;

/// Requester category score when no requester attributes are supplied
pub const NEUTRAL_REQUESTER_SCORE: u32 = 50;

/// Scoring categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Deadline,
    Impact,
    Funding,
    Purpose,
    Requester,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Deadline,
        Category::Impact,
        Category::Funding,
        Category::Purpose,
        Category::Requester,
    ];

    /// Fixed category weights; they sum to 1.0
    pub fn weight(&self) -> f64 {
        match self {
            Category::Deadline => 0.30,
            Category::Impact => 0.25,
            Category::Funding => 0.20,
            Category::Purpose => 0.15,
            Category::Requester => 0.10,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Deadline => write!(f, "deadline"),
            Category::Impact => write!(f, "impact"),
            Category::Funding => write!(f, "funding"),
            Category::Purpose => write!(f, "purpose"),
            Category::Requester => write!(f, "requester"),
        }
    }
}

/// Raw and weighted score of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: Category,
    /// Raw 0-100 score
    pub raw: f64,
    /// `raw * weight`
    pub weighted: f64,
}

/// Derived priority of a factor set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityScore {
    /// One entry per category, in `Category::ALL` order
    pub breakdown: Vec<CategoryScore>,
    /// Sum of the weighted scores (0-100)
    pub total: f64,
    /// `total` relative to `MAX_SCORE`, in percent
    pub percentage: f64,
    pub tier: Tier,
    /// Human-readable reasons, in rule order
    pub justification: Vec<String>,
}

impl PriorityScore {
    pub fn category(&self, category: Category) -> Option<&CategoryScore> {
        self.breakdown.iter().find(|c| c.category == category)
    }

    /// Short form used in decision reasons, e.g. "priority 86% (high)"
    pub fn summary(&self) -> String {
        format!("priority {:.0}% ({})", self.percentage, self.tier)
    }
}

/// Score a factor set
pub fn score(factors: &PriorityFactors) -> PriorityScore {
    let raw = [
        (Category::Deadline, deadline_score(&factors.deadline)),
        (Category::Impact, impact_score(&factors.impact)),
        (Category::Funding, funding_score(&factors.funding)),
        (Category::Purpose, purpose_score(&factors.purpose)),
        (Category::Requester, requester_score(factors.requester.as_ref())),
    ];

    let breakdown: Vec<CategoryScore> = raw
        .iter()
        .map(|(category, points)| {
            let raw = f64::from(*points);
            CategoryScore {
                category: *category,
                raw,
                weighted: raw * category.weight(),
            }
        })
        .collect();

    let total = breakdown
        .iter()
        .map(|c| c.weighted)
        .sum::<f64>()
        .clamp(0.0, MAX_SCORE);
    let percentage = total / MAX_SCORE * 100.0;

    PriorityScore {
        breakdown,
        total,
        percentage,
        tier: Tier::from_percentage(percentage),
        justification: justify(factors),
    }
}

fn capped(points: u32) -> u32 {
    points.min(MAX_SCORE as u32)
}

fn deadline_score(deadline: &DeadlineFactors) -> u32 {
    if !deadline.has_deadline {
        return NO_DEADLINE_SCORE;
    }

    let type_points = match deadline.deadline_type {
        Some(DeadlineType::PaperSubmission) => 25,
        Some(DeadlineType::ConferencePresentation) => 20,
        Some(DeadlineType::ProjectDelivery) => 15,
        Some(DeadlineType::ThesisDefense) => 20,
        Some(DeadlineType::Other) | None => 10,
        Some(DeadlineType::NoDeadline) => 0,
    };

    let urgency_points = match deadline.urgency_level {
        Some(UrgencyLevel::Immediate) => 35,
        Some(UrgencyLevel::Urgent) => 25,
        Some(UrgencyLevel::Moderate) | None => 15,
        Some(UrgencyLevel::Flexible) => 5,
    };

    let proximity_points = match deadline.days_until_deadline {
        Some(days) if days <= 3.0 => 20,
        Some(days) if days <= 7.0 => 15,
        Some(days) if days <= 14.0 => 10,
        Some(days) if days <= 30.0 => 5,
        _ => 0,
    };

    capped(40 + type_points + urgency_points + proximity_points)
}

fn impact_score(impact: &ImpactFactors) -> u32 {
    let field_points = match impact.research_field {
        Some(ResearchField::Medical) => 30,
        Some(ResearchField::DisasterPrevention) => 28,
        Some(ResearchField::ClimateChange) => 25,
        Some(ResearchField::AiSafety) => 22,
        Some(ResearchField::Engineering) => 18,
        Some(ResearchField::BasicResearch) => 15,
        Some(ResearchField::Other) | None => 10,
    };

    let contribution_points = match impact.social_contribution {
        Some(Level::High) => 25,
        Some(Level::Medium) | None => 15,
        Some(Level::Low) => 5,
    };

    let novelty_points = match impact.academic_novelty {
        Some(AcademicNovelty::Breakthrough) => 25,
        Some(AcademicNovelty::Significant) => 20,
        Some(AcademicNovelty::Incremental) | None => 10,
        Some(AcademicNovelty::Learning) => 5,
    };

    let publication_points = match impact.publication_target {
        Some(PublicationTarget::TopTier) => 20,
        Some(PublicationTarget::MajorConference) => 15,
        Some(PublicationTarget::Journal) => 12,
        Some(PublicationTarget::Workshop) => 8,
        Some(PublicationTarget::NoPublication) | None => 0,
    };

    capped(field_points + contribution_points + novelty_points + publication_points)
}

fn funding_score(funding: &FundingFactors) -> u32 {
    let source_points = if funding.has_external_funding {
        let type_points = match funding.funding_type {
            Some(FundingType::GovernmentGrant) => 25,
            Some(FundingType::InternationalProject) => 22,
            Some(FundingType::IndustryCollaboration) => 20,
            Some(FundingType::Internal) | None => 10,
            Some(FundingType::Personal) => 0,
        };
        30 + type_points
    } else {
        10
    };

    let scale_points = match funding.project_scale {
        Some(ProjectScale::Large) => 20,
        Some(ProjectScale::Medium) | None => 12,
        Some(ProjectScale::Small) => 5,
    };

    let collaboration_points = match funding.collaboration_type {
        Some(CollaborationType::International) => 18,
        Some(CollaborationType::MultiInstitutional) => 15,
        Some(CollaborationType::IndustryAcademia) => 12,
        Some(CollaborationType::Internal) | None => 8,
        Some(CollaborationType::Individual) => 3,
    };

    capped(source_points + scale_points + collaboration_points)
}

fn purpose_score(purpose: &PurposeFactors) -> u32 {
    let usage_points = match purpose.usage_type {
        Some(UsageType::ResearchExperiment) => 25,
        Some(UsageType::ModelTraining) => 20,
        Some(UsageType::DataAnalysis) => 18,
        Some(UsageType::Reproduction) => 15,
        Some(UsageType::Testing) | None => 10,
        Some(UsageType::Learning) => 8,
    };

    let confidentiality_points = match purpose.data_confidentiality {
        Some(DataConfidentiality::Confidential) => 15,
        Some(DataConfidentiality::Sensitive) | None => 10,
        Some(DataConfidentiality::Public) => 5,
    };

    let reproducibility_points = match purpose.reproducibility_requirement {
        Some(Reproducibility::Critical) => 20,
        Some(Reproducibility::Important) => 15,
        Some(Reproducibility::Moderate) | None => 10,
        Some(Reproducibility::Low) => 5,
    };

    let complexity_points = match purpose.computational_complexity {
        Some(Level::High) => 15,
        Some(Level::Medium) | None => 10,
        Some(Level::Low) => 5,
    };

    capped(usage_points + confidentiality_points + reproducibility_points + complexity_points)
}

fn requester_score(requester: Option<&RequesterFactors>) -> u32 {
    let Some(requester) = requester else {
        return NEUTRAL_REQUESTER_SCORE;
    };

    let position_points = match requester.position {
        Some(Position::Professor) => 25,
        Some(Position::AssociateProfessor) => 22,
        Some(Position::AssistantProfessor) => 18,
        Some(Position::Postdoc) => 15,
        Some(Position::PhdStudent) => 12,
        Some(Position::Staff) | None => 10,
        Some(Position::MasterStudent) => 8,
        Some(Position::Undergraduate) => 5,
    };

    let experience_points = match requester.research_experience {
        Some(ResearchExperience::Senior) => 20,
        Some(ResearchExperience::Intermediate) => 15,
        Some(ResearchExperience::Junior) => 8,
        None => 10,
    };

    let efficiency_points = match requester.past_usage_efficiency {
        Some(UsageEfficiency::Excellent) => 15,
        Some(UsageEfficiency::Good) => 12,
        Some(UsageEfficiency::Average) | None => 8,
        Some(UsageEfficiency::Poor) => 3,
    };

    let lab_points = match requester.lab_priority {
        Some(Level::High) => 15,
        Some(Level::Medium) | None => 10,
        Some(Level::Low) => 5,
    };

    capped(position_points + experience_points + efficiency_points + lab_points)
}

/// Independent rule checks over the raw factors
fn justify(factors: &PriorityFactors) -> Vec<String> {
    let mut reasons = Vec::new();

    let deadline = &factors.deadline;
    if deadline.has_deadline {
        match deadline.urgency_level {
            Some(UrgencyLevel::Immediate) => {
                reasons.push("has an immediate deadline that needs prompt allocation".to_string())
            }
            Some(UrgencyLevel::Urgent) => {
                reasons.push("has a near deadline that needs priority handling".to_string())
            }
            _ => {}
        }
        if deadline.deadline_type == Some(DeadlineType::PaperSubmission) {
            reasons.push("paper submission deadline tied directly to research output".to_string());
        }
    }

    match factors.impact.research_field {
        Some(ResearchField::Medical) => {
            reasons.push("medical research field with high social impact".to_string())
        }
        Some(ResearchField::DisasterPrevention) => {
            reasons.push("disaster prevention research contributing to public safety".to_string())
        }
        _ => {}
    }

    if factors.impact.academic_novelty == Some(AcademicNovelty::Breakthrough) {
        reasons.push("breakthrough work with very high academic value".to_string());
    }

    if factors.funding.has_external_funding {
        match factors.funding.funding_type {
            Some(FundingType::GovernmentGrant) => {
                reasons.push("funded by a government research grant".to_string())
            }
            Some(FundingType::IndustryCollaboration) => reasons
                .push("industry collaboration with practical application prospects".to_string()),
            _ => {}
        }
    }

    match factors.purpose.usage_type {
        Some(UsageType::Learning) => {
            reasons.push("learning usage ranks below research usage".to_string())
        }
        Some(UsageType::ResearchExperiment) => {
            reasons.push("research experiment tied directly to academic results".to_string())
        }
        _ => {}
    }

    if let Some(requester) = &factors.requester {
        match requester.position {
            Some(Position::Professor) | Some(Position::AssociateProfessor) => reasons
                .push("senior researcher whose work also affects supervised students".to_string()),
            Some(Position::Undergraduate) => {
                reasons.push("undergraduate usage warrants educational consideration".to_string())
            }
            _ => {}
        }
    }

    reasons
}
