//! Main scheduler logic

use chrono::{DateTime, Utc};
use gpuslot_core::{
    Actor, AdmissionConfig, GpuslotError, GpuslotResult, NewReservation, PreemptionDecision,
    PreemptionRequest, PriorityFactors, Reservation, ReservationRepository, ReservationStatus,
    ResourceCatalog,
};
use gpuslot_extract::rules::{default_window, truncate_purpose, DEFAULT_RESOURCE_TYPE};
use gpuslot_extract::{ExtractedRequest, FactorExtractor, RuleBasedExtractor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::admission::{AdmissionEngine, AdmissionResult};
use crate::lifecycle::ReservationLifecycle;
use crate::preemption::{PreemptionOutcome, PreemptionWorkflow};
use crate::scoring::{score, PriorityScore};

/// Optional filters for listing reservations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationFilter {
    pub user_id: Option<String>,
    pub status: Option<ReservationStatus>,
}

/// Scheduler ties admission, preemption, and lifecycle handling to one
/// repository
pub struct Scheduler {
    repository: Arc<dyn ReservationRepository>,
    admission: AdmissionEngine,
    preemption: PreemptionWorkflow,
    lifecycle: ReservationLifecycle,
    extractor: Arc<dyn FactorExtractor>,
    catalog: ResourceCatalog,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(
        repository: Arc<dyn ReservationRepository>,
        extractor: Arc<dyn FactorExtractor>,
        catalog: ResourceCatalog,
        config: AdmissionConfig,
    ) -> Self {
        info!(
            resource_types = catalog.resource_types.len(),
            gpus = catalog.total_gpus(),
            extractor = extractor.name(),
            preemption_ttl_hours = config.preemption_ttl_hours,
            serialize_admissions = config.serialize_admissions,
            "Scheduler initialized"
        );

        Self {
            admission: AdmissionEngine::new(repository.clone(), catalog.clone(), config),
            preemption: PreemptionWorkflow::new(repository.clone()),
            lifecycle: ReservationLifecycle::new(repository.clone()),
            repository,
            extractor,
            catalog,
        }
    }

    /// Scheduler with the default catalog, admission settings, and keyword
    /// extraction
    pub fn with_defaults(repository: Arc<dyn ReservationRepository>) -> Self {
        Self::new(
            repository,
            Arc::new(RuleBasedExtractor::new()),
            ResourceCatalog::default(),
            AdmissionConfig::default(),
        )
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    pub fn extractor_name(&self) -> &'static str {
        self.extractor.name()
    }

    /// Score a factor set without admitting anything
    pub fn score(&self, factors: &PriorityFactors) -> PriorityScore {
        score(factors)
    }

    /// Admit a structured reservation request
    pub async fn admit(&self, request: NewReservation) -> GpuslotResult<AdmissionResult> {
        self.admission.admit(request).await
    }

    /// Admit a free-text request on behalf of `requester_id`
    pub async fn admit_text(
        &self,
        requester_id: &str,
        requester_name: Option<String>,
        text: &str,
    ) -> GpuslotResult<AdmissionResult> {
        self.admit_text_at(requester_id, requester_name, text, Utc::now())
            .await
    }

    pub async fn admit_text_at(
        &self,
        requester_id: &str,
        requester_name: Option<String>,
        text: &str,
        now: DateTime<Utc>,
    ) -> GpuslotResult<AdmissionResult> {
        if text.trim().is_empty() {
            return Err(GpuslotError::Validation(
                "request text must not be empty".to_string(),
            ));
        }

        let extracted = match self.extractor.extract(text, now).await {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(
                    extractor = self.extractor.name(),
                    error = %e,
                    "Extraction failed, using keyword rules"
                );
                RuleBasedExtractor::new().parse(text, now)
            }
        };

        let request = self.request_from_extracted(requester_id, requester_name, text, extracted, now);
        info!(
            requester = %request.requester_id,
            resource_type = %request.resource_type,
            extractor = self.extractor.name(),
            "Admitting free-text request"
        );
        self.admission.admit_at(request, now).await
    }

    /// Fill hints the extractor left out
    fn request_from_extracted(
        &self,
        requester_id: &str,
        requester_name: Option<String>,
        text: &str,
        extracted: ExtractedRequest,
        now: DateTime<Utc>,
    ) -> NewReservation {
        let resource_type = extracted
            .resource_type
            .filter(|name| self.catalog.contains(name))
            .or_else(|| {
                self.catalog
                    .get(DEFAULT_RESOURCE_TYPE)
                    .or_else(|| self.catalog.resource_types.first())
                    .map(|r| r.name.clone())
            })
            .unwrap_or_else(|| DEFAULT_RESOURCE_TYPE.to_string());

        let (default_start, default_end) = default_window(text, now);
        let (start, end) = match (extracted.start, extracted.end) {
            (Some(start), Some(end)) => (start, end),
            _ => (default_start, default_end),
        };

        NewReservation {
            requester_id: requester_id.to_string(),
            requester_name,
            resource_type,
            start,
            end,
            purpose: extracted
                .purpose
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| truncate_purpose(text)),
            factors: extracted.factors,
        }
    }

    /// Answer a preemption request
    pub async fn respond(
        &self,
        preemption_id: Uuid,
        decision: PreemptionDecision,
        actor: &Actor,
    ) -> GpuslotResult<PreemptionOutcome> {
        self.preemption
            .respond(preemption_id, decision, actor, Utc::now())
            .await
    }

    /// Open preemption requests addressed to `user_id`
    pub async fn pending_for(&self, user_id: &str) -> GpuslotResult<Vec<PreemptionRequest>> {
        self.preemption.pending_for(user_id, Utc::now()).await
    }

    pub async fn cancel(
        &self,
        id: Uuid,
        actor: &Actor,
        reason: Option<String>,
    ) -> GpuslotResult<Reservation> {
        self.lifecycle.cancel(id, actor, reason, Utc::now()).await
    }

    /// Administrative status change
    pub async fn transition(
        &self,
        id: Uuid,
        status: ReservationStatus,
        actor: &Actor,
        reason: Option<String>,
    ) -> GpuslotResult<Reservation> {
        self.lifecycle
            .transition(id, status, actor, reason, Utc::now())
            .await
    }

    pub async fn get_reservation(&self, id: Uuid) -> GpuslotResult<Reservation> {
        self.repository
            .get_reservation(id)
            .await?
            .ok_or_else(|| GpuslotError::reservation_not_found(id))
    }

    /// Reservations matching `filter`, newest first
    pub async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> GpuslotResult<Vec<Reservation>> {
        let mut reservations = match &filter.user_id {
            Some(user_id) => self.repository.list_reservations_by_owner(user_id).await?,
            None => self.repository.list_reservations().await?,
        };
        if let Some(status) = filter.status {
            reservations.retain(|r| r.status == status);
        }
        reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reservations)
    }
}
