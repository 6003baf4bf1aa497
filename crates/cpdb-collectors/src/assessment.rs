//! Profile assessment through a chat-completion API in JSON mode.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use cpdb_core::ScoreBreakdown;
use cpdb_pipeline::{CollaboratorError, ProfileAssessor};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::CollectorError;
use crate::{build_client, check_status, endpoint, parse_base_url, read_json, HttpOptions};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";

const SYSTEM_PROMPT: &str = "You assess a professional's standing from their public \
profile data only. Score each criterion from 0 to 10: professional_seniority, \
company_prestige, career_progression, professional_network, skills_expertise. \
Respond with a JSON object: {\"overall_score\": number, \"criteria_scores\": \
{criterion: number}, \"evidence\": {criterion: [strings]}, \"summary\": string}.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatAssessor {
    client: Client,
    api_key: String,
    base_url: Url,
    model: String,
}

impl ChatAssessor {
    /// # Errors
    ///
    /// Returns [`CollectorError::Http`] if the HTTP client cannot be built.
    pub fn new(api_key: &str, model: &str, options: &HttpOptions) -> Result<Self, CollectorError> {
        Self::with_base_url(api_key, model, options, DEFAULT_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns [`CollectorError::Http`] if the HTTP client cannot be built,
    /// or [`CollectorError::InvalidBaseUrl`] for an unparsable URL.
    pub fn with_base_url(
        api_key: &str,
        model: &str,
        options: &HttpOptions,
        base_url: &str,
    ) -> Result<Self, CollectorError> {
        Ok(Self {
            client: build_client(options)?,
            api_key: api_key.to_owned(),
            base_url: parse_base_url(base_url)?,
            model: model.to_owned(),
        })
    }

    async fn score(&self, profile_data: &Value) -> Result<ScoreBreakdown, CollectorError> {
        let request = json!({
            "model": self.model,
            "temperature": 0.2,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(profile_data)},
            ],
        });

        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions")?)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = check_status(response, "assessment")?;
        let body = read_json(response, "chat completion").await?;
        let chat: ChatResponse =
            serde_json::from_value(body).map_err(|source| CollectorError::Deserialize {
                context: "chat completion".to_owned(),
                source,
            })?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| invalid("completion has no message content"))?;
        let breakdown = parse_breakdown(&content)?;
        tracing::info!(model = %self.model, score = breakdown.overall_score, "assessment scored");
        Ok(breakdown)
    }
}

#[async_trait]
impl ProfileAssessor for ChatAssessor {
    async fn assess(&self, profile_data: &Value) -> Result<ScoreBreakdown, CollaboratorError> {
        self.score(profile_data).await.map_err(CollaboratorError::from)
    }
}

fn invalid(reason: &str) -> CollectorError {
    CollectorError::InvalidResponse {
        service: "assessment",
        reason: reason.to_owned(),
    }
}

/// Reads the model's JSON answer. `overall_score` is required; per-criterion
/// scores are taken from `criteria_scores` (or `criteria`) when numeric.
pub(crate) fn parse_breakdown(content: &str) -> Result<ScoreBreakdown, CollectorError> {
    let answer: Value =
        serde_json::from_str(content).map_err(|source| CollectorError::Deserialize {
            context: "assessment content".to_owned(),
            source,
        })?;

    let overall_score = answer
        .get("overall_score")
        .and_then(Value::as_f64)
        .ok_or_else(|| invalid("missing numeric overall_score"))?;

    let criteria: BTreeMap<String, f64> = answer
        .get("criteria_scores")
        .or_else(|| answer.get("criteria"))
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(name, score)| score.as_f64().map(|s| (name.clone(), s)))
                .collect()
        })
        .unwrap_or_default();

    let summary = ["summary", "recommendation", "reasoning"]
        .iter()
        .filter_map(|key| answer.get(*key).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .map(str::to_owned);

    Ok(ScoreBreakdown {
        overall_score,
        criteria,
        evidence: answer.get("evidence").cloned().unwrap_or(Value::Null),
        summary,
    })
}

fn field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("n/a")
}

/// Renders the scraped sections as plain text for the model.
pub(crate) fn build_prompt(profile_data: &Value) -> String {
    let basic = &profile_data["basic_info"];
    let mut prompt = String::from("Assess this professional profile.\n\n");

    let _ = writeln!(prompt, "Name: {}", field(basic, "name"));
    let _ = writeln!(prompt, "Headline: {}", field(basic, "headline"));
    let _ = writeln!(prompt, "Location: {}", field(basic, "location"));
    let _ = writeln!(prompt, "Current company: {}", field(basic, "current_company"));
    let _ = writeln!(
        prompt,
        "Connections: {}",
        basic.get("connections_count").and_then(Value::as_u64).unwrap_or(0)
    );

    prompt.push_str("\nExperience:\n");
    for exp in profile_data["experience"].as_array().into_iter().flatten().take(5) {
        let _ = writeln!(
            prompt,
            "- {} at {} ({} to {})",
            field(exp, "title"),
            field(exp, "company"),
            field(exp, "start_date"),
            field(exp, "end_date"),
        );
    }

    prompt.push_str("\nEducation:\n");
    for edu in profile_data["education"].as_array().into_iter().flatten() {
        let _ = writeln!(
            prompt,
            "- {} in {} from {}",
            field(edu, "degree"),
            field(edu, "field"),
            field(edu, "school"),
        );
    }

    let skills: Vec<&str> = profile_data["skills"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .take(20)
        .collect();
    let _ = write!(
        prompt,
        "\nSkills: {}",
        if skills.is_empty() {
            "none listed".to_owned()
        } else {
            skills.join(", ")
        }
    );
    prompt
}
