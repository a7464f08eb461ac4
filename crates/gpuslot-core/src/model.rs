//! Reservation, PreemptionRequest, and Actor type definitions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{GpuslotError, GpuslotResult, PriorityFactors};

/// Half-open time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window, rejecting empty or inverted intervals
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> GpuslotResult<Self> {
        if start >= end {
            return Err(GpuslotError::Validation(format!(
                "start ({}) must be before end ({})",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Standard half-open overlap test; touching boundaries do not overlap
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Coarse priority bucket derived from the score percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    pub const HIGH_THRESHOLD: f64 = 75.0;
    pub const MEDIUM_THRESHOLD: f64 = 50.0;

    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= Self::HIGH_THRESHOLD {
            Tier::High
        } else if percentage >= Self::MEDIUM_THRESHOLD {
            Tier::Medium
        } else {
            Tier::Low
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::High => write!(f, "high"),
            Tier::Medium => write!(f, "medium"),
            Tier::Low => write!(f, "low"),
        }
    }
}

/// Request to reserve a resource-type timeline slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReservation {
    /// Requester identity
    pub requester_id: String,
    /// Display name of the requester
    #[serde(default)]
    pub requester_name: Option<String>,
    /// Resource type identifier (e.g., "A100")
    pub resource_type: String,
    /// Slot start (inclusive)
    pub start: DateTime<Utc>,
    /// Slot end (exclusive)
    pub end: DateTime<Utc>,
    /// Free-text purpose
    pub purpose: String,
    /// Qualitative priority attributes
    pub factors: PriorityFactors,
}

/// A persisted reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique identifier
    pub id: Uuid,
    /// Requester identity (owner)
    pub requester_id: String,
    /// Display name of the requester
    pub requester_name: Option<String>,
    /// Resource type identifier
    pub resource_type: String,
    /// Slot start (inclusive)
    pub start: DateTime<Utc>,
    /// Slot end (exclusive)
    pub end: DateTime<Utc>,
    /// Free-text purpose
    pub purpose: String,
    /// Factors the score was computed from
    pub factors: PriorityFactors,
    /// Priority percentage at admission time
    pub priority_score: f64,
    /// Tier derived from `priority_score`
    pub tier: Tier,
    /// Current lifecycle status
    pub status: ReservationStatus,
    /// Human-readable reason for the latest decision
    pub decision_reason: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Create a pending reservation from a request and its computed score
    pub fn new(request: NewReservation, priority_score: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester_id: request.requester_id,
            requester_name: request.requester_name,
            resource_type: request.resource_type,
            start: request.start,
            end: request.end,
            purpose: request.purpose,
            factors: request.factors,
            priority_score,
            tier: Tier::from_percentage(priority_score),
            status: ReservationStatus::Pending,
            decision_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.requester_id == user_id
    }
}

/// Reservation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Awaiting a decision
    Pending,
    /// Slot granted
    Approved,
    /// Refused by an administrator
    Rejected,
    /// Slot in use
    Active,
    /// Slot used and released
    Completed,
    /// Withdrawn or preempted
    Cancelled,
}

impl ReservationStatus {
    /// No outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Rejected | ReservationStatus::Completed | ReservationStatus::Cancelled
        )
    }

    /// Whether a reservation in this status occupies its timeline slot
    pub fn occupies_slot(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Pending | ReservationStatus::Approved | ReservationStatus::Active
        )
    }

    /// Edges of the lifecycle state machine
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Approved, Active)
                | (Approved, Cancelled)
                | (Active, Completed)
                | (Active, Cancelled)
        )
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationStatus::Pending => write!(f, "pending"),
            ReservationStatus::Approved => write!(f, "approved"),
            ReservationStatus::Rejected => write!(f, "rejected"),
            ReservationStatus::Active => write!(f, "active"),
            ReservationStatus::Completed => write!(f, "completed"),
            ReservationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = GpuslotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "approved" => Ok(ReservationStatus::Approved),
            "rejected" => Ok(ReservationStatus::Rejected),
            "active" => Ok(ReservationStatus::Active),
            "completed" => Ok(ReservationStatus::Completed),
            "cancelled" | "canceled" => Ok(ReservationStatus::Cancelled),
            other => Err(GpuslotError::Validation(format!(
                "unknown reservation status: {}",
                other
            ))),
        }
    }
}

/// Offer to the holder of a lower-priority reservation to yield its slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreemptionRequest {
    /// Unique identifier
    pub id: Uuid,
    /// The new, higher-priority reservation
    pub requesting_reservation_id: Uuid,
    /// The existing reservation asked to yield
    pub target_reservation_id: Uuid,
    /// Owner of the requesting reservation
    pub requester_id: String,
    /// Owner of the target reservation
    pub target_user_id: String,
    /// Why the holder is asked to yield
    pub justification: String,
    /// Current status
    pub status: PreemptionStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// After this instant the request can no longer be answered
    pub expires_at: DateTime<Utc>,
}

impl PreemptionRequest {
    pub fn new(
        requesting: &Reservation,
        target: &Reservation,
        justification: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            requesting_reservation_id: requesting.id,
            target_reservation_id: target.id,
            requester_id: requesting.requester_id.clone(),
            target_user_id: target.requester_id.clone(),
            justification,
            status: PreemptionStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Preemption request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreemptionStatus {
    Pending,
    Accepted,
    Declined,
}

impl std::fmt::Display for PreemptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreemptionStatus::Pending => write!(f, "pending"),
            PreemptionStatus::Accepted => write!(f, "accepted"),
            PreemptionStatus::Declined => write!(f, "declined"),
        }
    }
}

/// Holder's answer to a preemption request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreemptionDecision {
    Accepted,
    Declined,
}

impl PreemptionDecision {
    pub fn resulting_status(&self) -> PreemptionStatus {
        match self {
            PreemptionDecision::Accepted => PreemptionStatus::Accepted,
            PreemptionDecision::Declined => PreemptionStatus::Declined,
        }
    }
}

/// Who performs a lifecycle action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn requester(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: ActorRole::Requester,
        }
    }

    pub fn administrator(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: ActorRole::Administrator,
        }
    }

    /// The engine itself, for auto-approval and preemption side effects
    pub fn system() -> Self {
        Self {
            user_id: "system".to_string(),
            role: ActorRole::System,
        }
    }

    /// Administrators and the engine may perform any permitted transition
    pub fn is_privileged(&self) -> bool {
        matches!(self.role, ActorRole::Administrator | ActorRole::System)
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.user_id, self.role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Requester,
    Administrator,
    System,
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorRole::Requester => write!(f, "requester"),
            ActorRole::Administrator => write!(f, "administrator"),
            ActorRole::System => write!(f, "system"),
        }
    }
}
