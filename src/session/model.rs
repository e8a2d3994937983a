// The session's working memory and validation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Expired => "expired",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            "expired" => Ok(SessionStatus::Expired),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStep {
    Transcript,
    Summary,
    Violations,
    Narrative,
    FinalReview,
    Completed,
}

impl ValidationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStep::Transcript => "transcript",
            ValidationStep::Summary => "summary",
            ValidationStep::Violations => "violations",
            ValidationStep::Narrative => "narrative",
            ValidationStep::FinalReview => "final_review",
            ValidationStep::Completed => "completed",
        }
    }

    pub fn next(&self) -> ValidationStep {
        match self {
            ValidationStep::Transcript => ValidationStep::Summary,
            ValidationStep::Summary => ValidationStep::Violations,
            ValidationStep::Violations => ValidationStep::Narrative,
            ValidationStep::Narrative => ValidationStep::FinalReview,
            ValidationStep::FinalReview => ValidationStep::Completed,
            ValidationStep::Completed => ValidationStep::Completed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbHit {
    pub text: String,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintSource {
    Text,
    Audio,
    Image,
}

/// The orchestrator's working memory for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub current_validation_step: ValidationStep,
    pub awaiting_validation: bool,
    pub source: ComplaintSource,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub top_hits: Vec<KbHit>,
    pub violations: Vec<KbHit>,
    pub narrative: Option<String>,
    pub fir_number: Option<String>,
}

impl PipelineState {
    pub fn new(source: ComplaintSource, transcript: String) -> Self {
        Self {
            current_validation_step: ValidationStep::Transcript,
            awaiting_validation: true,
            source,
            transcript: Some(transcript),
            summary: None,
            top_hits: Vec::new(),
            violations: Vec::new(),
            narrative: None,
            fir_number: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub step: ValidationStep,
    pub approved: bool,
    pub user_input: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub status: SessionStatus,
    pub state: PipelineState,
    pub validation_history: Vec<ValidationRecord>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(source: ComplaintSource, transcript: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: SessionStatus::Active,
            state: PipelineState::new(source, transcript),
            validation_history: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}
