use std::fmt::Write as _;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::llm::{ChatMessage, LlmClient, LlmError, LlmRequest, MessageRole, ResponseSchema};
use crate::matching::{JobRecord, prefilter::TalentCandidate};

/// How the candidate's experience relates to the job's stated level.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceFit {
    UnderQualified,
    GoodFit,
    OverQualified,
}

impl ExperienceFit {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceFit::UnderQualified => "under_qualified",
            ExperienceFit::GoodFit => "good_fit",
            ExperienceFit::OverQualified => "over_qualified",
        }
    }
}

/// Structured result the oracle must return for one candidate. Parsed
/// strictly; anything that deviates from this shape skips the candidate.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateEvaluation {
    pub match_score: i32,
    pub reasoning: String,
    pub skills_matched: Vec<String>,
    pub skills_missing: Vec<String>,
    pub certifications_matched: Vec<String>,
    pub certifications_missing: Vec<String>,
    pub experience_fit: ExperienceFit,
    pub location_score: i32,
}

/// Failure taxonomy for a single oracle invocation. The scoring loop branches
/// on these: rate limits skip the candidate, provider quota exhaustion aborts
/// the remaining loop, everything else skips with a log line.
#[derive(Debug)]
pub enum OracleError {
    RateLimited,
    QuotaExhausted,
    Malformed(String),
    Failed(anyhow::Error),
}

/// Capability injected into the pipeline so tests can score candidates with a
/// deterministic fake.
pub trait MatchOracle {
    fn evaluate(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<CandidateEvaluation, OracleError>> + Send;
}

/// JSON Schema forced onto the oracle via structured outputs.
pub fn evaluation_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "match_score": { "type": "integer", "minimum": 0, "maximum": 100 },
            "reasoning": { "type": "string" },
            "skills_matched": { "type": "array", "items": { "type": "string" } },
            "skills_missing": { "type": "array", "items": { "type": "string" } },
            "certifications_matched": { "type": "array", "items": { "type": "string" } },
            "certifications_missing": { "type": "array", "items": { "type": "string" } },
            "experience_fit": {
                "type": "string",
                "enum": ["under_qualified", "good_fit", "over_qualified"],
            },
            "location_score": { "type": "integer", "minimum": 0, "maximum": 100 },
        },
        "required": [
            "match_score",
            "reasoning",
            "skills_matched",
            "skills_missing",
            "certifications_matched",
            "certifications_missing",
            "experience_fit",
            "location_score",
        ],
        "additionalProperties": false,
    })
}

/// Parse and validate an oracle response body. Schema-valid JSON with scores
/// outside 0..=100 is rejected as malformed rather than clamped.
pub fn parse_evaluation(text: &str) -> Result<CandidateEvaluation, String> {
    let evaluation: CandidateEvaluation =
        serde_json::from_str(text).map_err(|err| format!("invalid evaluation JSON: {err}"))?;

    if !(0..=100).contains(&evaluation.match_score) {
        return Err(format!("match_score out of range: {}", evaluation.match_score));
    }
    if !(0..=100).contains(&evaluation.location_score) {
        return Err(format!(
            "location_score out of range: {}",
            evaluation.location_score
        ));
    }

    Ok(evaluation)
}

/// Natural-language prompt for one candidate against one job.
pub fn build_scoring_prompt(job: &JobRecord, candidate: &TalentCandidate) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "## Job opening");
    let _ = writeln!(prompt, "Title: {}", job.title);
    if let Some(job_type) = &job.job_type {
        let _ = writeln!(prompt, "Type: {job_type}");
    }
    let _ = writeln!(prompt, "Experience level: {}", job.experience_level);
    if let Some(location) = &job.location {
        let _ = writeln!(prompt, "Location: {location}");
    }
    let _ = writeln!(prompt, "Required skills: {}", join_or_none(&job.required_skills));
    let _ = writeln!(
        prompt,
        "Required certifications: {}",
        join_or_none(&job.required_certifications)
    );
    let _ = writeln!(prompt, "Description:\n{}", job.description);

    let _ = writeln!(prompt, "\n## Candidate profile");
    let _ = writeln!(prompt, "Years of experience: {}", candidate.years_experience);
    let _ = writeln!(prompt, "Availability: {}", candidate.availability_status);
    if let Some(location) = &candidate.location {
        let _ = writeln!(prompt, "Location: {location}");
    }
    if let Some(distance) = candidate.distance_km {
        let _ = writeln!(prompt, "Distance from job location: {distance:.0} km");
    }

    if candidate.skills.is_empty() {
        let _ = writeln!(prompt, "Skills: none listed");
    } else {
        let _ = writeln!(prompt, "Skills:");
        for skill in &candidate.skills {
            match &skill.industry {
                Some(industry) => {
                    let _ = writeln!(prompt, "- {} ({}, {industry})", skill.name, skill.level);
                }
                None => {
                    let _ = writeln!(prompt, "- {} ({})", skill.name, skill.level);
                }
            }
        }
    }

    if candidate.certifications.is_empty() {
        let _ = writeln!(prompt, "Certifications: none listed");
    } else {
        let _ = writeln!(prompt, "Certifications:");
        for certification in &candidate.certifications {
            match &certification.issuer {
                Some(issuer) => {
                    let _ = writeln!(prompt, "- {} (issued by {issuer})", certification.name);
                }
                None => {
                    let _ = writeln!(prompt, "- {}", certification.name);
                }
            }
        }
    }

    prompt
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Production oracle backed by the hosted completion service.
pub struct LlmOracle {
    client: LlmClient,
    model: String,
    instructions: String,
    tokens: AtomicI64,
}

impl LlmOracle {
    pub fn new(client: LlmClient, model: String, instructions: String) -> Self {
        Self {
            client,
            model,
            instructions,
            tokens: AtomicI64::new(0),
        }
    }

    /// Total tokens consumed across all calls made through this oracle.
    pub fn tokens_used(&self) -> i64 {
        self.tokens.load(Ordering::Relaxed)
    }
}

impl MatchOracle for LlmOracle {
    async fn evaluate(&self, prompt: &str) -> Result<CandidateEvaluation, OracleError> {
        let request = LlmRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::new(MessageRole::System, self.instructions.clone()),
                ChatMessage::new(MessageRole::User, prompt),
            ],
        )
        .with_response_schema(ResponseSchema::new(
            "talent_match_evaluation",
            evaluation_schema(),
        ));

        match self.client.execute(request).await {
            Ok(response) => {
                self.tokens
                    .fetch_add(response.token_usage.total_tokens as i64, Ordering::Relaxed);
                parse_evaluation(&response.text).map_err(OracleError::Malformed)
            }
            Err(LlmError::RateLimited { .. }) => Err(OracleError::RateLimited),
            Err(LlmError::QuotaExhausted { .. }) => Err(OracleError::QuotaExhausted),
            Err(LlmError::Payload(detail)) => Err(OracleError::Malformed(detail)),
            Err(err) => Err(OracleError::Failed(anyhow!(err))),
        }
    }
}
