//! HTTP endpoint handlers. These are thin wrappers that forward to the services.
//! Each handler is instrumented and logs parameters and basic result info.
//!
//! Store-only calls run on tokio's blocking pool via [`blocking`]; the scenario,
//! submit and evaluate paths are async and touch the store inline with
//! single-row statements around the model call.

use std::sync::Arc;

use axum::{extract::{Path, Query, State}, http::StatusCode, Json};
use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::protocol::*;
use crate::services::{evaluations, responses, scenarios};
use crate::services::scenarios::Categories;
use crate::state::AppState;

/// Run a synchronous service call off the async workers.
async fn blocking<T, F>(state: Arc<AppState>, f: F) -> Result<T, AppError>
where
  T: Send + 'static,
  F: FnOnce(&AppState) -> Result<T, AppError> + Send + 'static,
{
  tokio::task::spawn_blocking(move || f(&state))
    .await
    .map_err(|e| AppError::Internal(format!("blocking task failed: {e}")))?
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> Json<HealthOut> {
  let model = if state.llm.is_some() { "enabled" } else { "disabled" };
  let database = match blocking(state, |s| Ok(s.store.ping()?)).await {
    Ok(()) => "ok",
    Err(e) => {
      warn!(target: "carecomm_backend", error = %e, "Health check: database unavailable");
      "unavailable"
    }
  };
  Json(HealthOut {
    status: if database == "ok" { "healthy" } else { "degraded" },
    timestamp: chrono::Utc::now(),
    version: env!("CARGO_PKG_VERSION"),
    database,
    model,
  })
}

#[instrument(level = "info", skip(state, body), fields(category = %body.category, difficulty = %body.difficulty))]
pub async fn http_generate_scenario(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateScenarioIn>,
) -> Result<Json<ScenarioOut>, AppError> {
  let s = scenarios::generate(&state, &body.category, &body.difficulty).await?;
  info!(target: "scenario", id = %s.id, source = s.source.as_str(), "HTTP scenario generated");
  Ok(Json(s.into()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_scenario(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<ScenarioOut>, AppError> {
  let s = blocking(state, move |s| scenarios::get(s, &id)).await?;
  Ok(Json(s.into()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_categories(State(state): State<Arc<AppState>>) -> Result<Json<Categories>, AppError> {
  Ok(Json(blocking(state, scenarios::categories).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_scenario_responses(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Query(q): Query<ResponsesQuery>,
) -> Result<Json<Vec<ResponseOut>>, AppError> {
  let scenario_id = id.clone();
  let list = blocking(state, move |s| scenarios::list_responses(s, &scenario_id, q.limit)).await?;
  info!(target: "evaluation", scenario_id = %id, count = list.len(), "HTTP responses listed");
  Ok(Json(list.into_iter().map(ResponseOut::from).collect()))
}

#[instrument(level = "info", skip(state, body), fields(scenario_id = %body.scenario_id, answer_len = body.response_text.len()))]
pub async fn http_submit_response(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SubmitResponseIn>,
) -> Result<(StatusCode, Json<ResponseOut>), AppError> {
  let r = responses::submit(&state, &body.scenario_id, &body.response_text).await?;
  info!(target: "evaluation", id = %r.id, score = ?r.score(), "HTTP response submitted");
  Ok((StatusCode::CREATED, Json(r.into())))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_response(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<ResponseOut>, AppError> {
  let r = blocking(state, move |s| responses::get(s, &id)).await?;
  Ok(Json(r.into()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_evaluate_response(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<EvaluationOut>, AppError> {
  let e = evaluations::evaluate(&state, &id).await?;
  info!(target: "evaluation", response_id = %id, score = e.overall_score.value(), source = e.source.as_str(), "HTTP evaluation served");
  Ok(Json(EvaluationOut::new(&id, e)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_evaluation(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<EvaluationOut>, AppError> {
  let response_id = id.clone();
  let e = blocking(state, move |s| evaluations::get(s, &response_id)).await?;
  Ok(Json(EvaluationOut::new(&id, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::services::testing::offline_state;

  #[tokio::test]
  async fn blocking_returns_the_call_result() {
    let n = blocking(offline_state(), |s| Ok(s.store.distinct_categories()?.len())).await.unwrap();
    assert_eq!(n, 0);

    let err = blocking(offline_state(), |s| scenarios::get(s, "missing")).await;
    assert!(matches!(err, Err(AppError::NotFound(_))));
  }

  #[tokio::test]
  async fn blocking_panic_becomes_internal_error() {
    let err = blocking(offline_state(), |_| -> Result<(), AppError> { panic!("store exploded") }).await;
    assert!(matches!(err, Err(AppError::Internal(_))));
  }
}
