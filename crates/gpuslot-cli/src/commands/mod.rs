//! CLI commands implementation

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use gpuslot_core::{
    Actor, GpuResourceType, PreemptionDecision, PreemptionRequest, PriorityFactors, Reservation,
    ReservationStatus, Tier,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// API client for communicating with the daemon
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Who the CLI acts as
pub struct Identity {
    user: Option<String>,
    admin: bool,
}

impl Identity {
    pub fn new(user: Option<String>, admin: bool) -> Self {
        Self { user, admin }
    }

    fn user_id(&self) -> Result<&str> {
        self.user
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .context("this command needs --user")
    }

    fn actor(&self) -> Result<Actor> {
        let user_id = self.user_id()?;
        Ok(if self.admin {
            Actor::administrator(user_id)
        } else {
            Actor::requester(user_id)
        })
    }
}

/// Error body returned by the daemon
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    kind: String,
    message: String,
    retryable: bool,
}

/// Turn an error body into one line
fn describe_error(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let hint = if envelope.error.retryable {
                ", try again later"
            } else {
                ""
            };
            format!("{} ({}{})", envelope.error.message, envelope.error.kind, hint)
        }
        Err(_) => body.to_string(),
    }
}

async fn report_failure(action: &str, response: reqwest::Response) -> Result<()> {
    let status = response.status();
    let body = response.text().await?;
    eprintln!("Failed to {}: {} [{}]", action, describe_error(&body), status);
    Ok(())
}

/// Score breakdown entry from the API
#[derive(Debug, Deserialize)]
pub struct CategoryScoreResponse {
    pub category: String,
    pub raw: f64,
    pub weighted: f64,
}

/// Score response from the API
#[derive(Debug, Deserialize)]
pub struct ScoreResponse {
    pub breakdown: Vec<CategoryScoreResponse>,
    pub total: f64,
    pub percentage: f64,
    pub tier: Tier,
    pub justification: Vec<String>,
}

/// Admission response from the API
#[derive(Debug, Deserialize)]
pub struct AdmissionResponse {
    pub reservation: Reservation,
    pub score: ScoreResponse,
    pub conflicts: Vec<Reservation>,
    pub auto_approved: bool,
    pub preemptions_created: Vec<PreemptionRequest>,
}

/// Preemption response outcome from the API
#[derive(Debug, Deserialize)]
pub struct PreemptionOutcomeResponse {
    pub request: PreemptionRequest,
    pub requesting: Option<Reservation>,
    pub target: Option<Reservation>,
}

/// Usage response from the API
#[derive(Debug, Deserialize)]
pub struct UsageResponse {
    pub extractor: String,
    pub request_count: u32,
    pub daily_limit: u32,
    pub remaining_requests: u32,
    pub hours_until_reset: i64,
    pub utilization_percentage: u32,
    pub status: String,
}

/// Status response from the API
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub extractor: String,
    pub resource_types: usize,
    pub gpus: u32,
    pub reservations: BTreeMap<String, usize>,
}

/// Read a factor document, or produce neutral factors when no file is given
pub fn load_factors(path: Option<&Path>) -> Result<serde_json::Value> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid factor JSON in {}", path.display()))
        }
        None => Ok(serde_json::to_value(PriorityFactors::default())?),
    }
}

pub fn parse_decision(decision: &str) -> Result<PreemptionDecision> {
    match decision.to_lowercase().as_str() {
        "accept" | "accepted" | "yes" => Ok(PreemptionDecision::Accepted),
        "decline" | "declined" | "no" => Ok(PreemptionDecision::Declined),
        other => anyhow::bail!("unknown decision '{}', use accept or decline", other),
    }
}

/// Arguments for a structured reservation
pub struct ReserveArgs {
    pub resource_type: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub purpose: String,
    pub factors: Option<PathBuf>,
    pub name: Option<String>,
}

/// Request a slot with explicit times
pub async fn reserve(client: &ApiClient, identity: &Identity, args: ReserveArgs) -> Result<()> {
    #[derive(Serialize)]
    struct CreateRequest<'a> {
        requester_id: &'a str,
        requester_name: Option<String>,
        resource_type: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        purpose: String,
        factors: serde_json::Value,
    }

    let req = CreateRequest {
        requester_id: identity.user_id()?,
        requester_name: args.name,
        resource_type: args.resource_type,
        start: args.start,
        end: args.end,
        purpose: args.purpose,
        factors: load_factors(args.factors.as_deref())?,
    };

    let response = client
        .client
        .post(client.url("/api/v1/reservations"))
        .json(&req)
        .send()
        .await?;

    if response.status().is_success() {
        let admission: AdmissionResponse = response.json().await?;
        print_admission(&admission);
        Ok(())
    } else {
        report_failure("create reservation", response).await
    }
}

/// Request a slot in plain language
pub async fn ask(
    client: &ApiClient,
    identity: &Identity,
    text: String,
    name: Option<String>,
) -> Result<()> {
    #[derive(Serialize)]
    struct TextRequest<'a> {
        requester_id: &'a str,
        requester_name: Option<String>,
        text: String,
    }

    let req = TextRequest {
        requester_id: identity.user_id()?,
        requester_name: name,
        text,
    };

    let response = client
        .client
        .post(client.url("/api/v1/reservations/text"))
        .json(&req)
        .send()
        .await?;

    if response.status().is_success() {
        let admission: AdmissionResponse = response.json().await?;
        print_admission(&admission);
        Ok(())
    } else {
        report_failure("create reservation", response).await
    }
}

/// List reservations
pub async fn ls(client: &ApiClient, owner: Option<String>, status: Option<String>) -> Result<()> {
    let mut query = Vec::new();
    if let Some(owner) = owner {
        query.push(("user_id", owner));
    }
    if let Some(status) = status {
        query.push(("status", status));
    }

    let response = client
        .client
        .get(client.url("/api/v1/reservations"))
        .query(&query)
        .send()
        .await?;

    if !response.status().is_success() {
        return report_failure("list reservations", response).await;
    }

    let reservations: Vec<Reservation> = response.json().await?;
    if reservations.is_empty() {
        println!("No reservations found");
        return Ok(());
    }

    println!(
        "{:<36} {:<12} {:<8} {:<17} {:<17} {:<8} {:<10}",
        "ID", "OWNER", "GPU", "START", "END", "PRIO", "STATUS"
    );
    println!("{}", "-".repeat(114));
    for r in reservations {
        println!(
            "{:<36} {:<12} {:<8} {:<17} {:<17} {:<8} {:<10}",
            r.id,
            r.requester_id,
            r.resource_type,
            r.start.format("%Y-%m-%d %H:%M"),
            r.end.format("%Y-%m-%d %H:%M"),
            format!("{:.0}%", r.priority_score),
            r.status
        );
    }

    Ok(())
}

/// Show one reservation
pub async fn show(client: &ApiClient, id: Uuid) -> Result<()> {
    let response = client
        .client
        .get(client.url(&format!("/api/v1/reservations/{}", id)))
        .send()
        .await?;

    if response.status().is_success() {
        let reservation: Reservation = response.json().await?;
        print_reservation(&reservation);
        Ok(())
    } else {
        report_failure("get reservation", response).await
    }
}

/// Cancel a reservation
pub async fn cancel(
    client: &ApiClient,
    identity: &Identity,
    id: Uuid,
    reason: Option<String>,
) -> Result<()> {
    #[derive(Serialize)]
    struct CancelRequest {
        actor: Actor,
        reason: Option<String>,
    }

    let response = client
        .client
        .post(client.url(&format!("/api/v1/reservations/{}/cancel", id)))
        .json(&CancelRequest {
            actor: identity.actor()?,
            reason,
        })
        .send()
        .await?;

    if response.status().is_success() {
        let reservation: Reservation = response.json().await?;
        println!("Reservation {} cancelled", reservation.id);
        Ok(())
    } else {
        report_failure("cancel reservation", response).await
    }
}

/// Administrative status change
pub async fn transition(
    client: &ApiClient,
    identity: &Identity,
    id: Uuid,
    status: String,
    reason: Option<String>,
) -> Result<()> {
    #[derive(Serialize)]
    struct TransitionRequest {
        status: ReservationStatus,
        actor: Actor,
        reason: Option<String>,
    }

    let status: ReservationStatus = status.parse()?;
    let response = client
        .client
        .post(client.url(&format!("/api/v1/reservations/{}/transition", id)))
        .json(&TransitionRequest {
            status,
            actor: identity.actor()?,
            reason,
        })
        .send()
        .await?;

    if response.status().is_success() {
        let reservation: Reservation = response.json().await?;
        println!("Reservation {} is now {}", reservation.id, reservation.status);
        Ok(())
    } else {
        report_failure("change reservation status", response).await
    }
}

/// Preemption requests addressed to the current user
pub async fn pending(client: &ApiClient, identity: &Identity) -> Result<()> {
    let response = client
        .client
        .get(client.url("/api/v1/preemptions"))
        .query(&[("user_id", identity.user_id()?)])
        .send()
        .await?;

    if !response.status().is_success() {
        return report_failure("list preemption requests", response).await;
    }

    let requests: Vec<PreemptionRequest> = response.json().await?;
    if requests.is_empty() {
        println!("No pending preemption requests");
        return Ok(());
    }

    for request in requests {
        println!("Preemption request {}", request.id);
        println!("  From: {}", request.requester_id);
        println!("  Your reservation: {}", request.target_reservation_id);
        println!("  Expires: {}", request.expires_at.format("%Y-%m-%d %H:%M"));
        println!("  Reason: {}", request.justification);
        println!();
    }

    Ok(())
}

/// Answer a preemption request
pub async fn respond(
    client: &ApiClient,
    identity: &Identity,
    id: Uuid,
    decision: &str,
) -> Result<()> {
    #[derive(Serialize)]
    struct RespondRequest {
        decision: PreemptionDecision,
        actor: Actor,
    }

    let response = client
        .client
        .post(client.url(&format!("/api/v1/preemptions/{}/respond", id)))
        .json(&RespondRequest {
            decision: parse_decision(decision)?,
            actor: identity.actor()?,
        })
        .send()
        .await?;

    if !response.status().is_success() {
        return report_failure("answer preemption request", response).await;
    }

    let outcome: PreemptionOutcomeResponse = response.json().await?;
    println!("Preemption request {} {}", outcome.request.id, outcome.request.status);
    if let Some(target) = outcome.target {
        println!("  Your reservation {} is {}", target.id, target.status);
    }
    if let Some(requesting) = outcome.requesting {
        println!(
            "  Requesting reservation {} is {}",
            requesting.id, requesting.status
        );
    }

    Ok(())
}

/// Score a factor file
pub async fn score(client: &ApiClient, factors: &Path) -> Result<()> {
    let response = client
        .client
        .post(client.url("/api/v1/score"))
        .json(&load_factors(Some(factors))?)
        .send()
        .await?;

    if response.status().is_success() {
        let score: ScoreResponse = response.json().await?;
        print_score(&score);
        Ok(())
    } else {
        report_failure("score factors", response).await
    }
}

/// Show reservable resource types
pub async fn resources(client: &ApiClient) -> Result<()> {
    let response = client
        .client
        .get(client.url("/api/v1/resources"))
        .send()
        .await?;

    if !response.status().is_success() {
        return report_failure("get resources", response).await;
    }

    let resources: Vec<GpuResourceType> = response.json().await?;
    println!(
        "{:<10} {:<10} {:<14} {:<10} {:<6}",
        "NAME", "VENDOR", "ARCHITECTURE", "MEMORY", "GPUS"
    );
    for r in resources {
        println!(
            "{:<10} {:<10} {:<14} {:<10} {:<6}",
            r.name,
            format!("{:?}", r.vendor),
            r.architecture,
            r.memory,
            r.gpu_count
        );
    }

    Ok(())
}

/// Show extraction usage
pub async fn usage(client: &ApiClient) -> Result<()> {
    let response = client
        .client
        .get(client.url("/api/v1/extraction/usage"))
        .send()
        .await?;

    if !response.status().is_success() {
        return report_failure("get usage", response).await;
    }

    let usage: UsageResponse = response.json().await?;
    println!("Extractor: {}", usage.extractor);
    println!(
        "Requests: {}/{} ({}%, {})",
        usage.request_count, usage.daily_limit, usage.utilization_percentage, usage.status
    );
    println!("Remaining: {}", usage.remaining_requests);
    println!("Resets in: {}h", usage.hours_until_reset);

    Ok(())
}

/// Show system status
pub async fn status(client: &ApiClient) -> Result<()> {
    let response = client
        .client
        .get(client.url("/api/v1/status"))
        .send()
        .await?;

    if !response.status().is_success() {
        return report_failure("get status", response).await;
    }

    let status: StatusResponse = response.json().await?;
    println!("gpuslot v{}", status.version);
    println!();
    println!("Extractor: {}", status.extractor);
    println!(
        "Resources: {} types, {} GPUs",
        status.resource_types, status.gpus
    );
    let total: usize = status.reservations.values().sum();
    println!("Reservations: {}", total);
    for (state, count) in &status.reservations {
        println!("  {}: {}", state, count);
    }

    Ok(())
}

fn print_admission(admission: &AdmissionResponse) {
    print_reservation(&admission.reservation);
    println!();
    print_score(&admission.score);

    if admission.auto_approved {
        println!("\nApproved automatically");
    }
    if !admission.conflicts.is_empty() {
        println!("\nConflicts:");
        for c in &admission.conflicts {
            println!(
                "  {} {} {}-{} ({:.0}%)",
                c.id,
                c.requester_id,
                c.start.format("%H:%M"),
                c.end.format("%H:%M"),
                c.priority_score
            );
        }
    }
    if !admission.preemptions_created.is_empty() {
        println!("\nPreemption requests sent:");
        for p in &admission.preemptions_created {
            println!("  {} -> {}", p.id, p.target_user_id);
        }
    }
}

fn print_reservation(r: &Reservation) {
    println!("Reservation: {}", r.id);
    println!("  Owner: {}", r.requester_name.as_deref().unwrap_or(&r.requester_id));
    println!("  Resource: {}", r.resource_type);
    println!(
        "  Slot: {} - {}",
        r.start.format("%Y-%m-%d %H:%M"),
        r.end.format("%Y-%m-%d %H:%M")
    );
    println!("  Purpose: {}", r.purpose);
    println!("  Priority: {:.0}% ({})", r.priority_score, r.tier);
    println!("  Status: {}", r.status);
    if let Some(reason) = &r.decision_reason {
        println!("  Reason: {}", reason);
    }
}

fn print_score(score: &ScoreResponse) {
    println!(
        "Score: {:.2} ({:.0}%, {})",
        score.total, score.percentage, score.tier
    );
    for c in &score.breakdown {
        println!("  {:<10} {:>6.1} -> {:>5.2}", c.category, c.raw, c.weighted);
    }
    for reason in &score.justification {
        println!("  - {}", reason);
    }
}
