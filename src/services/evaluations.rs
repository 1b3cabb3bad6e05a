//! Scoring responses. The contract is "always an evaluation": model trouble of
//! any kind ends in the deterministic fallback, never in an error.

use tracing::{debug, info, instrument, warn};

use crate::domain::{Evaluation, Scenario};
use crate::error::AppError;
use crate::fallback::fallback_evaluation;
use crate::llm;
use crate::state::AppState;

/// Evaluate a stored response and persist the result. Already evaluated
/// responses return their stored evaluation without another model call.
#[instrument(level = "info", skip(state))]
pub async fn evaluate(state: &AppState, response_id: &str) -> Result<Evaluation, AppError> {
  let response = state.store.get_response(response_id)?
    .ok_or_else(|| AppError::NotFound("Response not found".into()))?;
  if let Some(existing) = response.evaluation {
    debug!(target: "evaluation", %response_id, "Response already evaluated");
    return Ok(existing);
  }

  let scenario = state.store.get_scenario(&response.scenario_id)?
    .ok_or_else(|| AppError::NotFound("Associated scenario not found".into()))?;

  let evaluation = assess(state, &scenario, &response.response_text).await;

  if state.store.record_evaluation(response_id, &evaluation)? {
    info!(target: "evaluation", %response_id, score = evaluation.overall_score.value(), source = evaluation.source.as_str(), "Evaluation saved");
    return Ok(evaluation);
  }

  // Someone else evaluated it while we were waiting on the model.
  state.store.get_response(response_id)?
    .and_then(|r| r.evaluation)
    .ok_or_else(|| AppError::Internal(format!("evaluation for {response_id} vanished")))
}

/// Model evaluation, or the fallback when the model is off, unreachable or incoherent.
async fn assess(state: &AppState, scenario: &Scenario, response_text: &str) -> Evaluation {
  let Some(model) = &state.llm else {
    warn!(target: "evaluation", scenario_id = %scenario.id, "Model client disabled; using fallback evaluation");
    return fallback_evaluation();
  };
  match llm::evaluate_response(model.as_ref(), &state.prompts, &scenario.title, &scenario.description, response_text).await {
    Ok(e) => e,
    Err(e) => {
      warn!(target: "evaluation", scenario_id = %scenario.id, error = %e, "Model evaluation failed; using fallback evaluation");
      fallback_evaluation()
    }
  }
}

#[instrument(level = "debug", skip(state))]
pub fn get(state: &AppState, response_id: &str) -> Result<Evaluation, AppError> {
  state.store.get_response(response_id)?
    .ok_or_else(|| AppError::NotFound("Response not found".into()))?
    .evaluation
    .ok_or_else(|| AppError::NotFound("Response has not been evaluated yet".into()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{Prompts, Settings};
  use crate::db::Store;
  use crate::domain::EvaluationSource;
  use crate::fallback::{FALLBACK_FEEDBACK, FALLBACK_SUGGESTIONS};
  use crate::llm::{ChatRequest, LanguageModel, LlmError};
  use crate::services::testing::*;
  use crate::services::{responses, scenarios};
  use async_trait::async_trait;
  use std::sync::{Arc, Mutex, OnceLock, Weak};

  /// State that stores responses without evaluating them on submit.
  fn deferred_state(model: &Arc<ScriptedModel>) -> AppState {
    let settings = Settings { evaluate_on_submit: false, ..Settings::default() };
    let llm: Arc<dyn crate::llm::LanguageModel> = model.clone();
    AppState::new(Store::open_in_memory().unwrap(), Some(llm), Prompts::default(), settings)
  }

  async fn submitted(state: &AppState) -> String {
    let s = scenarios::generate(state, "general", "beginner").await.unwrap();
    responses::submit(state, &s.id, ANSWER).await.unwrap().id
  }

  fn assert_is_fallback(e: &Evaluation) {
    assert_eq!(e.source, EvaluationSource::Fallback);
    assert_eq!(e.overall_score.value(), 7.0);
    assert_eq!(e.empathy_score.value(), 7.0);
    assert_eq!(e.feedback, FALLBACK_FEEDBACK);
    assert_eq!(e.improvement_suggestions, FALLBACK_SUGGESTIONS.map(String::from).to_vec());
  }

  #[tokio::test]
  async fn model_reply_is_parsed_and_stored() {
    let model = ScriptedModel::replying(&[SCENARIO_REPLY, EVALUATION_REPLY]);
    let state = deferred_state(&model);
    let id = submitted(&state).await;

    let e = evaluate(&state, &id).await.unwrap();
    assert_eq!(e.source, EvaluationSource::Model);
    assert_eq!(e.overall_score.value(), 8.5);
    assert_eq!(e.medical_accuracy_score.value(), 7.0);
    assert_eq!(e.improvement_suggestions, vec!["Check understanding with teach-back"]);
    assert_eq!(get(&state, &id).unwrap(), e);
  }

  #[tokio::test]
  async fn every_kind_of_model_failure_yields_the_same_fallback() {
    let failures = vec![
      Err(LlmError::Timeout(std::time::Duration::from_secs(30))),
      Err(LlmError::Connection("refused".into())),
      Err(LlmError::Status { status: 500, message: "boom".into() }),
      Ok("Great answer, 8/10!".to_string()),
      Ok("{\"score\": 42, \"feedback\": \"out of range\"}".to_string()),
    ];
    let mut first: Option<Evaluation> = None;
    for failure in failures {
      let model = ScriptedModel::new(vec![Ok(SCENARIO_REPLY.to_string()), failure]);
      let state = deferred_state(&model);
      let id = submitted(&state).await;

      let e = evaluate(&state, &id).await.unwrap();
      assert_is_fallback(&e);
      let stored = get(&state, &id).unwrap();
      assert_eq!(stored, e);
      if let Some(prev) = &first {
        assert_eq!(prev.overall_score, e.overall_score);
        assert_eq!(prev.feedback, e.feedback);
        assert_eq!(prev.improvement_suggestions, e.improvement_suggestions);
      }
      first = Some(e);
    }
  }

  #[tokio::test]
  async fn offline_evaluation_is_fallback() {
    let state = offline_state();
    let s = scenarios::generate(&state, "routine", "beginner").await.unwrap();
    let r = responses::submit(&state, &s.id, ANSWER).await.unwrap();
    assert_is_fallback(r.evaluation.as_ref().unwrap());
  }

  #[tokio::test]
  async fn evaluated_response_is_never_rescored() {
    let model = ScriptedModel::replying(&[SCENARIO_REPLY, EVALUATION_REPLY]);
    let state = deferred_state(&model);
    let id = submitted(&state).await;

    let first = evaluate(&state, &id).await.unwrap();
    let calls = model.calls();
    let second = evaluate(&state, &id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(model.calls(), calls);
  }

  /// Writes a competing evaluation for `response_id` while "thinking",
  /// then replies with a normal evaluation that should lose.
  struct RacingModel {
    state: OnceLock<Weak<AppState>>,
    response_id: Mutex<Option<String>>,
    winner: Evaluation,
  }

  #[async_trait]
  impl LanguageModel for RacingModel {
    fn name(&self) -> &str { "racing" }

    async fn complete(&self, req: &ChatRequest) -> Result<String, LlmError> {
      if !req.user.contains(ANSWER) {
        return Ok(SCENARIO_REPLY.to_string());
      }
      let state = self.state.get().and_then(Weak::upgrade).unwrap();
      let id = self.response_id.lock().unwrap().clone().unwrap();
      assert!(state.store.record_evaluation(&id, &self.winner).unwrap());
      Ok(EVALUATION_REPLY.to_string())
    }
  }

  #[tokio::test]
  async fn losing_a_race_returns_the_stored_evaluation() {
    let winner = Evaluation {
      feedback: "Scored by a concurrent request.".into(),
      source: EvaluationSource::Model,
      ..fallback_evaluation()
    };
    let model = Arc::new(RacingModel { state: OnceLock::new(), response_id: Mutex::new(None), winner: winner.clone() });
    let settings = Settings { evaluate_on_submit: false, ..Settings::default() };
    let llm: Arc<dyn LanguageModel> = model.clone();
    let state = Arc::new(AppState::new(Store::open_in_memory().unwrap(), Some(llm), Prompts::default(), settings));
    model.state.set(Arc::downgrade(&state)).unwrap();

    let id = submitted(&state).await;
    *model.response_id.lock().unwrap() = Some(id.clone());

    let e = evaluate(&state, &id).await.unwrap();
    assert_eq!(e, winner);
    assert_eq!(get(&state, &id).unwrap(), winner);
  }

  #[tokio::test]
  async fn unknown_response_is_not_found() {
    let state = offline_state();
    assert!(matches!(evaluate(&state, "ghost").await, Err(AppError::NotFound(_))));
    assert!(matches!(get(&state, "ghost"), Err(AppError::NotFound(_))));
  }

  #[tokio::test]
  async fn pending_evaluation_is_not_found() {
    let model = ScriptedModel::replying(&[SCENARIO_REPLY]);
    let state = deferred_state(&model);
    let id = submitted(&state).await;
    assert!(matches!(get(&state, &id), Err(AppError::NotFound(_))));
  }
}
