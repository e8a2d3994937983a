// The five-stage pipeline state machine: transcript -> summary -> violations
// -> narrative -> final_review -> completed. Advances are client-driven:
// each call processes exactly one transition and returns, waiting for the
// next `/validate` or `/regenerate`.

pub mod fir;

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures_util::future::join_all;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::kb::KbRetriever;
use crate::model_client::ModelClient;
use crate::persistence::fir_store::FirStore;
use crate::secrets::SecretStore;
use crate::session::model::{ComplaintSource, KbHit, Session, SessionStatus, ValidationRecord, ValidationStep};
use crate::session::SessionManager;

const TOP_HITS_FOR_VIOLATION_CHECK: usize = 10;

pub enum ComplaintInput {
    Text(String),
    Audio(Bytes),
    Image(Bytes),
}

impl ComplaintInput {
    /// Constructs a `ComplaintInput` from a multipart-derived trio of
    /// optional fields, rejecting any combination of more than one
    /// populated field.
    pub fn from_fields(
        text: Option<String>,
        audio: Option<Bytes>,
        image: Option<Bytes>,
    ) -> Result<Self, PipelineError> {
        match (text, audio, image) {
            (Some(t), None, None) => Ok(ComplaintInput::Text(t)),
            (None, Some(a), None) => Ok(ComplaintInput::Audio(a)),
            (None, None, Some(i)) => Ok(ComplaintInput::Image(i)),
            (None, None, None) => Err(PipelineError::InvalidInput(
                "one of text, audio, or image is required".to_string(),
            )),
            _ => Err(PipelineError::InvalidInput(
                "exactly one of text, audio, or image must be provided".to_string(),
            )),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct StepOutcome {
    pub session_id: Uuid,
    pub current_step: ValidationStep,
    pub awaiting_validation: bool,
    pub artifact: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regenerated: Option<bool>,
}

pub struct Orchestrator {
    sessions: Arc<SessionManager>,
    model_client: Arc<ModelClient>,
    kb: Arc<KbRetriever>,
    fir_store: Arc<FirStore>,
    secrets: Arc<SecretStore>,
    fir_auth_key: String,
    process_semaphore: Arc<tokio::sync::Semaphore>,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        model_client: Arc<ModelClient>,
        kb: Arc<KbRetriever>,
        fir_store: Arc<FirStore>,
        secrets: Arc<SecretStore>,
        fir_auth_key: String,
        max_concurrent_requests: usize,
    ) -> Self {
        Self {
            sessions,
            model_client,
            kb,
            fir_store,
            secrets,
            fir_auth_key,
            process_semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent_requests)),
        }
    }

    pub async fn process(&self, input: ComplaintInput) -> Result<StepOutcome, PipelineError> {
        let _permit = self
            .process_semaphore
            .acquire()
            .await
            .map_err(|_| PipelineError::Internal("semaphore closed".to_string()))?;

        let (source, transcript) = match input {
            ComplaintInput::Text(text) => (ComplaintSource::Text, text),
            ComplaintInput::Audio(bytes) => {
                let text = self.model_client.transcribe_audio(bytes).await?;
                (ComplaintSource::Audio, text)
            }
            ComplaintInput::Image(bytes) => {
                let text = self.model_client.ocr_image(bytes).await?;
                (ComplaintSource::Image, text)
            }
        };

        let session = Session::new(source, transcript.clone());
        let id = session.id;
        self.sessions.create(session).await?;

        Ok(StepOutcome {
            session_id: id,
            current_step: ValidationStep::Transcript,
            awaiting_validation: true,
            artifact: serde_json::json!({ "transcript": transcript }),
            regenerated: None,
        })
    }

    pub async fn status(&self, session_id: Uuid) -> Result<Arc<Session>, PipelineError> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("session {session_id}")))
    }

    pub async fn validate(
        &self,
        session_id: Uuid,
        approved: bool,
        user_input: Option<String>,
    ) -> Result<StepOutcome, PipelineError> {
        if !approved {
            return self.regenerate(session_id, user_input).await;
        }
        self.advance(session_id, user_input).await
    }

    async fn advance(&self, session_id: Uuid, user_input: Option<String>) -> Result<StepOutcome, PipelineError> {
        let session = self.status(session_id).await?;
        self.require_active(&session)?;
        let step = session.state.current_validation_step;

        match step {
            ValidationStep::Transcript => {
                let transcript = user_input.clone().or_else(|| session.state.transcript.clone());
                let Some(transcript) = transcript else {
                    return Err(PipelineError::InvalidInput("no transcript available".to_string()));
                };
                let summary = self.model_client.summarise(&transcript).await?;
                self.commit_advance(
                    session_id,
                    ValidationStep::Transcript,
                    user_input,
                    |state| {
                        state.transcript = Some(transcript.clone());
                        state.summary = Some(summary.clone());
                    },
                    serde_json::json!({ "summary": summary }),
                )
                .await
            }
            ValidationStep::Summary => {
                let summary = user_input.clone().or_else(|| session.state.summary.clone());
                let Some(summary) = summary else {
                    return Err(PipelineError::InvalidInput("no summary available".to_string()));
                };

                let hits = self.kb.query(&summary).await?;
                let top_hits = KbRetriever::top(&hits, TOP_HITS_FOR_VIOLATION_CHECK);
                let violations = self.check_violations(&summary, &top_hits).await;

                self.commit_advance(
                    session_id,
                    ValidationStep::Summary,
                    user_input,
                    |state| {
                        state.summary = Some(summary.clone());
                        state.top_hits = top_hits.clone();
                        state.violations = violations.clone();
                    },
                    serde_json::json!({ "violations": violations }),
                )
                .await
            }
            ValidationStep::Violations => {
                let summary = session
                    .state
                    .summary
                    .clone()
                    .ok_or_else(|| PipelineError::Internal("missing summary at violations stage".to_string()))?;
                let violation_texts: Vec<String> = session.state.violations.iter().map(|v| v.text.clone()).collect();
                let narrative = self.model_client.narrate(&summary, &violation_texts).await?;

                self.commit_advance(
                    session_id,
                    ValidationStep::Violations,
                    user_input,
                    |state| {
                        state.narrative = Some(narrative.clone());
                    },
                    serde_json::json!({ "narrative": narrative }),
                )
                .await
            }
            ValidationStep::Narrative => {
                let summary = session
                    .state
                    .summary
                    .clone()
                    .ok_or_else(|| PipelineError::Internal("missing summary at narrative stage".to_string()))?;
                let narrative = session
                    .state
                    .narrative
                    .clone()
                    .ok_or_else(|| PipelineError::Internal("missing narrative".to_string()))?;
                let fir_body = self.model_client.finalise(&summary, &narrative).await?;

                let fir_number = self
                    .fir_store
                    .insert_draft(&session_id.to_string(), &fir_body, fir::generate_fir_number)
                    .await?;

                let outcome = self
                    .commit_advance(
                        session_id,
                        ValidationStep::Narrative,
                        user_input,
                        |state| {
                            state.fir_number = Some(fir_number.clone());
                        },
                        serde_json::json!({ "fir_number": fir_number }),
                    )
                    .await?;
                Ok(outcome)
            }
            ValidationStep::FinalReview => Err(PipelineError::WrongStep {
                expected: "authenticate".to_string(),
                actual: step.as_str().to_string(),
            }),
            ValidationStep::Completed => Err(PipelineError::WrongStep {
                expected: "terminal".to_string(),
                actual: step.as_str().to_string(),
            }),
        }
    }

    /// Fans out `check_violation` across `hits` in parallel, bounded by the
    /// model client's own inference semaphore, preserving input order and
    /// biasing toward conservatism: an individual failed check is treated as
    /// "not a violation" rather than aborting the batch.
    async fn check_violations(&self, summary: &str, hits: &[KbHit]) -> Vec<KbHit> {
        let checks = hits.iter().map(|hit| async move {
            match self.model_client.check_violation(summary, &hit.text).await {
                Ok(is_violation) => is_violation,
                Err(e) => {
                    tracing::warn!("violation check failed for hit, treating as non-violation: {}", e);
                    false
                }
            }
        });

        let results = join_all(checks).await;
        hits.iter()
            .zip(results)
            .filter_map(|(hit, kept)| kept.then(|| hit.clone()))
            .collect()
    }

    /// Applies one stage transition under the session's lock. If a
    /// concurrent duplicate call already carried the session from
    /// `from_step` to `from_step.next()` (the double-submit case: two
    /// identical `/validate` requests racing on the same approval), this
    /// is treated as the same logical advance rather than an error — the
    /// mutation is skipped and the already-committed successor state is
    /// returned, so a retried approval never double-advances or pushes a
    /// second history entry.
    async fn commit_advance(
        &self,
        session_id: Uuid,
        from_step: ValidationStep,
        user_input: Option<String>,
        mutate: impl FnOnce(&mut crate::session::model::PipelineState),
        artifact: serde_json::Value,
    ) -> Result<StepOutcome, PipelineError> {
        let record = ValidationRecord {
            step: from_step,
            approved: true,
            user_input: user_input.clone(),
            at: Utc::now(),
        };
        let next_step = from_step.next();

        let session = self
            .sessions
            .update(session_id, move |session| {
                if session.state.current_validation_step == next_step {
                    let already_advanced = session
                        .validation_history
                        .last()
                        .is_some_and(|last| last.step == from_step && last.approved);
                    if already_advanced {
                        return Ok(());
                    }
                }
                if session.state.current_validation_step != from_step {
                    return Err(PipelineError::WrongStep {
                        expected: from_step.as_str().to_string(),
                        actual: session.state.current_validation_step.as_str().to_string(),
                    });
                }
                mutate(&mut session.state);
                session.state.current_validation_step = next_step;
                session.state.awaiting_validation = true;
                session.validation_history.push(record);
                if next_step == ValidationStep::Completed {
                    session.status = SessionStatus::Completed;
                }
                Ok(())
            })
            .await?;

        Ok(StepOutcome {
            session_id,
            current_step: session.state.current_validation_step,
            awaiting_validation: session.state.awaiting_validation,
            artifact,
            regenerated: None,
        })
    }

    pub async fn regenerate(&self, session_id: Uuid, user_input: Option<String>) -> Result<StepOutcome, PipelineError> {
        let session = self.status(session_id).await?;
        self.require_active(&session)?;
        let step = session.state.current_validation_step;

        let (artifact, regenerated) = match step {
            ValidationStep::Transcript => {
                // A text-sourced transcript has no upstream to re-run: the
                // step is a no-op, returning the stored text unchanged.
                if session.state.source == ComplaintSource::Text {
                    let transcript = session.state.transcript.clone().unwrap_or_default();
                    (serde_json::json!({ "transcript": transcript }), false)
                } else {
                    return Err(PipelineError::InvalidInput(
                        "re-transcription of audio/image sources is not supported once the session is created"
                            .to_string(),
                    ));
                }
            }
            ValidationStep::Summary => {
                let transcript = session
                    .state
                    .transcript
                    .clone()
                    .ok_or_else(|| PipelineError::Internal("missing transcript".to_string()))?;
                let hint = user_input.clone().unwrap_or_default();
                let prompt = if hint.is_empty() { transcript } else { format!("{transcript}\n\n{hint}") };
                let summary = self.model_client.summarise(&prompt).await?;
                self.sessions
                    .update(session_id, {
                        let summary = summary.clone();
                        move |s| {
                            s.state.summary = Some(summary.clone());
                            Ok(())
                        }
                    })
                    .await?;
                (serde_json::json!({ "summary": summary }), true)
            }
            ValidationStep::Violations => {
                let summary = session
                    .state
                    .summary
                    .clone()
                    .ok_or_else(|| PipelineError::Internal("missing summary".to_string()))?;
                let hits = self.kb.query(&summary).await?;
                let top_hits = KbRetriever::top(&hits, TOP_HITS_FOR_VIOLATION_CHECK);
                let violations = self.check_violations(&summary, &top_hits).await;
                self.sessions
                    .update(session_id, {
                        let top_hits = top_hits.clone();
                        let violations = violations.clone();
                        move |s| {
                            s.state.top_hits = top_hits.clone();
                            s.state.violations = violations.clone();
                            Ok(())
                        }
                    })
                    .await?;
                (serde_json::json!({ "violations": violations }), true)
            }
            ValidationStep::Narrative => {
                let summary = session
                    .state
                    .summary
                    .clone()
                    .ok_or_else(|| PipelineError::Internal("missing summary".to_string()))?;
                let violation_texts: Vec<String> = session.state.violations.iter().map(|v| v.text.clone()).collect();
                let narrative = self.model_client.narrate(&summary, &violation_texts).await?;
                self.sessions
                    .update(session_id, {
                        let narrative = narrative.clone();
                        move |s| {
                            s.state.narrative = Some(narrative.clone());
                            Ok(())
                        }
                    })
                    .await?;
                (serde_json::json!({ "narrative": narrative }), true)
            }
            ValidationStep::FinalReview | ValidationStep::Completed => {
                return Err(PipelineError::WrongStep {
                    expected: "transcript|summary|violations|narrative".to_string(),
                    actual: step.as_str().to_string(),
                })
            }
        };

        Ok(StepOutcome {
            session_id,
            current_step: step,
            awaiting_validation: true,
            artifact,
            regenerated: Some(regenerated),
        })
    }

    pub async fn authenticate(&self, fir_number: &str, auth_key: &str) -> Result<serde_json::Value, PipelineError> {
        let expected = self.secrets.get_or("FIR_AUTH_KEY", &self.fir_auth_key).await;
        if !crate::secrets::constant_time_eq(auth_key, &expected) {
            return Err(PipelineError::Unauthorized);
        }

        let record = self
            .fir_store
            .get(fir_number)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("fir {fir_number}")))?;

        if record.status != "draft" {
            return Err(PipelineError::WrongStep {
                expected: "draft".to_string(),
                actual: record.status,
            });
        }

        let mut hasher = Sha256::new();
        hasher.update(auth_key.as_bytes());
        let auth_key_hash = hex::encode(hasher.finalize());

        let affected = self.fir_store.finalize(fir_number, &auth_key_hash).await?;
        if affected == 0 {
            return Err(PipelineError::WrongStep {
                expected: "draft".to_string(),
                actual: "already finalized".to_string(),
            });
        }

        if let Ok(session_id) = Uuid::parse_str(&record.session_id) {
            let _ = self
                .sessions
                .update(session_id, |s| {
                    s.state.current_validation_step = ValidationStep::Completed;
                    s.state.awaiting_validation = false;
                    s.status = SessionStatus::Completed;
                    Ok(())
                })
                .await;
        }

        Ok(serde_json::json!({
            "fir_number": fir_number,
            "status": "finalized",
            "finalized_at": Utc::now(),
        }))
    }

    fn require_active(&self, session: &Session) -> Result<(), PipelineError> {
        if session.status != SessionStatus::Active {
            return Err(PipelineError::WrongStep {
                expected: "active".to_string(),
                actual: session.status.as_str().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    async fn test_orchestrator() -> Arc<Orchestrator> {
        AppState::new_test().await.expect("test state").orchestrator.clone()
    }

    #[tokio::test]
    async fn process_creates_session_awaiting_transcript_validation() {
        let orchestrator = test_orchestrator().await;
        let outcome = orchestrator
            .process(ComplaintInput::Text("a complaint about a stolen bicycle".to_string()))
            .await
            .expect("process should not touch the network for a text source");

        assert_eq!(outcome.current_step, ValidationStep::Transcript);
        assert!(outcome.awaiting_validation);
    }

    #[tokio::test]
    async fn commit_advance_rejects_a_session_not_at_from_step() {
        let orchestrator = test_orchestrator().await;
        let session = Session::new(ComplaintSource::Text, "transcript text".to_string());
        let id = session.id;
        orchestrator.sessions.create(session).await.unwrap();

        // The session is still at Transcript; advancing as if it were at
        // Summary must be rejected rather than silently mutating state.
        let result = orchestrator
            .commit_advance(id, ValidationStep::Summary, None, |_state| {}, serde_json::json!({}))
            .await;

        assert!(matches!(result, Err(PipelineError::WrongStep { .. })));
    }

    #[tokio::test]
    async fn commit_advance_is_monotonic() {
        let orchestrator = test_orchestrator().await;
        let session = Session::new(ComplaintSource::Text, "transcript text".to_string());
        let id = session.id;
        orchestrator.sessions.create(session).await.unwrap();

        let outcome = orchestrator
            .commit_advance(id, ValidationStep::Transcript, None, |state| state.summary = Some("s".to_string()), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.current_step, ValidationStep::Summary);

        let session = orchestrator.status(id).await.unwrap();
        assert_eq!(session.validation_history.len(), 1);
        assert_eq!(session.validation_history[0].step, ValidationStep::Transcript);
    }

    #[tokio::test]
    async fn commit_advance_is_idempotent_for_a_duplicate_submission() {
        let orchestrator = test_orchestrator().await;
        let session = Session::new(ComplaintSource::Text, "transcript text".to_string());
        let id = session.id;
        orchestrator.sessions.create(session).await.unwrap();

        orchestrator
            .commit_advance(id, ValidationStep::Transcript, None, |state| state.summary = Some("s".to_string()), serde_json::json!({}))
            .await
            .unwrap();

        // A retried identical approval for the step the session just left
        // must not error, double-advance, or append a second history entry.
        let outcome = orchestrator
            .commit_advance(id, ValidationStep::Transcript, None, |state| state.summary = Some("s".to_string()), serde_json::json!({}))
            .await
            .expect("duplicate advance of an already-committed step should be a no-op, not an error");

        assert_eq!(outcome.current_step, ValidationStep::Summary);
        let session = orchestrator.status(id).await.unwrap();
        assert_eq!(session.validation_history.len(), 1, "duplicate submit must not append a second history entry");
    }

    #[tokio::test]
    async fn validate_from_a_terminal_step_is_rejected() {
        let orchestrator = test_orchestrator().await;
        let session = Session::new(ComplaintSource::Text, "transcript text".to_string());
        let id = session.id;
        orchestrator.sessions.create(session).await.unwrap();
        orchestrator
            .sessions
            .update(id, |s| {
                s.state.current_validation_step = ValidationStep::Completed;
                Ok(())
            })
            .await
            .unwrap();

        let result = orchestrator.validate(id, true, None).await;
        assert!(matches!(result, Err(PipelineError::WrongStep { .. })));
    }

    #[tokio::test]
    async fn regenerate_on_a_text_transcript_is_a_no_op_that_does_not_flag_regenerated() {
        let orchestrator = test_orchestrator().await;
        let session = Session::new(ComplaintSource::Text, "original transcript".to_string());
        let id = session.id;
        orchestrator.sessions.create(session).await.unwrap();

        let outcome = orchestrator.regenerate(id, None).await.unwrap();
        assert_eq!(outcome.regenerated, Some(false));
        assert_eq!(outcome.artifact, serde_json::json!({ "transcript": "original transcript" }));
    }
}
