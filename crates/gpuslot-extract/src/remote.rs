//! Remote language-model extractor
//!
//! Sends a structured prompt to a generateContent-style endpoint and reads
//! the JSON object back out of the model's reply. Every call is counted
//! against a shared `UsageLimiter`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpuslot_core::{ExtractionConfig, GpuslotError, GpuslotResult, PriorityFactors};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::rules::truncate_purpose;
use crate::traits::{ExtractedRequest, FactorExtractor};
use crate::usage::UsageLimiter;

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Extractor backed by a hosted model
pub struct RemoteModelExtractor {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    usage: Arc<UsageLimiter>,
}

impl RemoteModelExtractor {
    /// Fails when no API key is configured
    pub fn new(config: &ExtractionConfig, usage: Arc<UsageLimiter>) -> GpuslotResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                GpuslotError::Config("extraction.api_key is required in remote mode".to_string())
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GpuslotError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            usage,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl FactorExtractor for RemoteModelExtractor {
    async fn extract(&self, text: &str, now: DateTime<Utc>) -> GpuslotResult<ExtractedRequest> {
        if !self.usage.try_acquire(now).await {
            return Err(GpuslotError::Upstream(
                "remote extraction budget exhausted".to_string(),
            ));
        }

        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(build_prompt(text, now)),
                }],
            }],
        };

        debug!(model = %self.model, "Calling remote extraction model");

        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| GpuslotError::Upstream(format!("remote model unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GpuslotError::Upstream(format!(
                "remote model returned {}",
                status
            )));
        }

        let reply: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GpuslotError::Upstream(format!("unreadable model reply: {}", e)))?;

        let output = reply
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .next()
            .ok_or_else(|| GpuslotError::Upstream("model reply had no text".to_string()))?;

        let extracted = parse_model_output(&output)?;
        info!(model = %self.model, "Remote extraction succeeded");
        Ok(extracted)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// Prompt asking for a single JSON object in the shape `parse_model_output`
/// accepts
pub fn build_prompt(text: &str, now: DateTime<Utc>) -> String {
    format!(
        r#"You are the assistant of a GPU reservation system. Extract the reservation
from the user's request and reply with one JSON object and nothing else.

Current time: {now}
Request: "{text}"

Schema:
{{
  "resource_type": "A100|V100|RTX4090|H100",
  "start": "RFC 3339 timestamp",
  "end": "RFC 3339 timestamp",
  "purpose": "short summary",
  "factors": {{
    "deadline": {{ "has_deadline": bool, "days_until_deadline": number,
      "deadline_type": "paper_submission|conference_presentation|project_delivery|thesis_defense|other",
      "urgency_level": "immediate|urgent|moderate|flexible" }},
    "impact": {{ "research_field": "medical|disaster_prevention|climate_change|ai_safety|basic_research|engineering|other",
      "social_contribution": "high|medium|low",
      "academic_novelty": "breakthrough|significant|incremental|learning",
      "publication_target": "top_tier|major_conference|journal|workshop|none" }},
    "funding": {{ "has_external_funding": bool,
      "funding_type": "government_grant|industry_collaboration|international_project|internal|personal",
      "project_scale": "large|medium|small",
      "collaboration_type": "multi_institutional|industry_academia|international|internal|individual" }},
    "purpose": {{ "usage_type": "research_experiment|model_training|data_analysis|reproduction|learning|testing",
      "data_confidentiality": "confidential|sensitive|public",
      "reproducibility_requirement": "critical|important|moderate|low",
      "computational_complexity": "high|medium|low" }},
    "requester": {{ "position": "professor|associate_professor|assistant_professor|postdoc|phd_student|master_student|undergraduate|staff",
      "research_experience": "senior|intermediate|junior",
      "past_usage_efficiency": "excellent|good|average|poor",
      "lab_priority": "high|medium|low" }}
  }}
}}"#,
        now = now.to_rfc3339(),
        text = text.replace('"', "'"),
    )
}

/// Pull the JSON object out of a reply that may wrap it in a code fence or
/// surrounding prose
pub fn extract_json_block(output: &str) -> Option<&str> {
    let fenced = output
        .find("```json")
        .map(|i| &output[i + "```json".len()..])
        .and_then(|rest| rest.find("```").map(|end| &rest[..end]));
    let candidate = fenced.unwrap_or(output);

    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end < start {
        return None;
    }
    Some(candidate[start..=end].trim())
}

/// Validate a model reply: times present and ordered, every required factor
/// category present
pub fn parse_model_output(output: &str) -> GpuslotResult<ExtractedRequest> {
    let block = extract_json_block(output)
        .ok_or_else(|| GpuslotError::Validation("model reply has no JSON object".to_string()))?;
    let value: Value = serde_json::from_str(block)?;

    let field = |name: &str| value.get(name).and_then(Value::as_str);
    let timestamp = |name: &str| -> GpuslotResult<DateTime<Utc>> {
        let raw = field(name)
            .ok_or_else(|| GpuslotError::Validation(format!("model reply is missing {}", name)))?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| GpuslotError::Validation(format!("bad {} '{}': {}", name, raw, e)))
    };

    let start = timestamp("start")?;
    let end = timestamp("end")?;
    if start >= end {
        return Err(GpuslotError::Validation(
            "model reply has start after end".to_string(),
        ));
    }

    let factors = value
        .get("factors")
        .cloned()
        .ok_or_else(|| GpuslotError::Validation("model reply is missing factors".to_string()))?;
    let factors = PriorityFactors::from_value(factors)?;

    Ok(ExtractedRequest {
        resource_type: field("resource_type").map(str::to_string),
        start: Some(start),
        end: Some(end),
        purpose: field("purpose").map(truncate_purpose),
        factors,
    })
}
