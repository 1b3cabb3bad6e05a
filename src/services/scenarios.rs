//! Scenario generation, lookup and category listing.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
  normalize_category, now, Difficulty, Response, Scenario, ScenarioSource, BUILTIN_CATEGORIES,
};
use crate::error::AppError;
use crate::fallback::fallback_scenario;
use crate::llm;
use crate::state::AppState;

pub const DEFAULT_RESPONSE_LIMIT: u32 = 10;
pub const MAX_RESPONSE_LIMIT: u32 = 50;

#[derive(Debug, Serialize, PartialEq)]
pub struct Categories {
  pub categories: Vec<String>,
  pub difficulty_levels: Vec<Difficulty>,
}

/// Generate and persist a scenario. Model failures never fail the call: the
/// fixed fallback scenario for the category is stored instead.
#[instrument(level = "info", skip(state))]
pub async fn generate(state: &AppState, category: &str, difficulty: &str) -> Result<Scenario, AppError> {
  let category = normalize_category(category)?;
  let difficulty: Difficulty = difficulty.parse()?;

  let (draft, source) = match &state.llm {
    Some(model) => match llm::generate_scenario(model.as_ref(), &state.prompts, &category, difficulty).await {
      Ok(d) => (d, ScenarioSource::Generated),
      Err(e) => {
        error!(target: "scenario", %category, %difficulty, error = %e, "Model generation failed; using fallback scenario");
        (fallback_scenario(&category), ScenarioSource::Fallback)
      }
    },
    None => {
      warn!(target: "scenario", %category, %difficulty, "Model client disabled; using fallback scenario");
      (fallback_scenario(&category), ScenarioSource::Fallback)
    }
  };

  let ts = now();
  let scenario = Scenario {
    id: Uuid::new_v4().to_string(),
    title: draft.title,
    description: draft.description,
    category,
    difficulty,
    source,
    created_at: ts,
    updated_at: ts,
  };
  state.store.insert_scenario(&scenario)?;
  info!(target: "scenario", id = %scenario.id, category = %scenario.category, %difficulty, source = scenario.source.as_str(), "Scenario saved");
  Ok(scenario)
}

#[instrument(level = "debug", skip(state))]
pub fn get(state: &AppState, id: &str) -> Result<Scenario, AppError> {
  state.store.get_scenario(id)?
    .ok_or_else(|| AppError::NotFound("Scenario not found".into()))
}

/// Built-in categories plus whatever has been stored, sorted and de-duplicated.
#[instrument(level = "debug", skip(state))]
pub fn categories(state: &AppState) -> Result<Categories, AppError> {
  let mut set: BTreeSet<String> = BUILTIN_CATEGORIES.iter().map(|c| c.to_string()).collect();
  set.extend(state.store.distinct_categories()?);
  Ok(Categories {
    categories: set.into_iter().collect(),
    difficulty_levels: Difficulty::ALL.to_vec(),
  })
}

/// Responses to a scenario, newest first.
#[instrument(level = "debug", skip(state))]
pub fn list_responses(state: &AppState, scenario_id: &str, limit: Option<u32>) -> Result<Vec<Response>, AppError> {
  let limit = limit.unwrap_or(DEFAULT_RESPONSE_LIMIT);
  if !(1..=MAX_RESPONSE_LIMIT).contains(&limit) {
    return Err(AppError::Validation(format!("limit must be between 1 and {MAX_RESPONSE_LIMIT}")));
  }
  if !state.store.scenario_exists(scenario_id)? {
    return Err(AppError::NotFound("Scenario not found".into()));
  }
  Ok(state.store.list_responses_for_scenario(scenario_id, limit)?)
}
