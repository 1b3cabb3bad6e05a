//! Accepting and reading trainee responses.

use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{normalize_response_text, now, Response};
use crate::error::AppError;
use crate::services::evaluations;
use crate::state::AppState;

/// Store a response. When `evaluate_on_submit` is set the evaluation step runs
/// right away and the returned response carries its evaluation.
#[instrument(level = "info", skip(state, response_text), fields(answer_len = response_text.len()))]
pub async fn submit(state: &AppState, scenario_id: &str, response_text: &str) -> Result<Response, AppError> {
  let text = normalize_response_text(response_text)?;
  if !state.store.scenario_exists(scenario_id)? {
    return Err(AppError::NotFound("Scenario not found".into()));
  }

  let ts = now();
  let response = Response {
    id: Uuid::new_v4().to_string(),
    scenario_id: scenario_id.to_string(),
    response_text: text,
    evaluation: None,
    submitted_at: ts,
    updated_at: ts,
  };
  state.store.insert_response(&response)?;
  info!(target: "evaluation", id = %response.id, %scenario_id, "Response saved");

  if !state.settings.evaluate_on_submit {
    return Ok(response);
  }
  evaluations::evaluate(state, &response.id).await?;
  get(state, &response.id)
}

#[instrument(level = "debug", skip(state))]
pub fn get(state: &AppState, id: &str) -> Result<Response, AppError> {
  state.store.get_response(id)?
    .ok_or_else(|| AppError::NotFound("Response not found".into()))
}
