//! Domain models used by the backend: scenarios, responses, evaluations and the
//! small value types that guard their invariants.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use crate::error::AppError;

/// Categories that are always offered, whatever the store contains.
pub const BUILTIN_CATEGORIES: [&str; 3] = ["general", "emergency", "routine"];

pub const MAX_CATEGORY_LEN: usize = 100;
pub const MIN_RESPONSE_CHARS: usize = 10;
pub const MAX_RESPONSE_CHARS: usize = 2000;

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 10.0;

/// Current time truncated to what the store keeps (microseconds), so a value
/// read back compares equal to the one we handed out.
pub fn now() -> DateTime<Utc> {
  Utc::now().trunc_subsecs(6)
}

/// How hard the generated scenario should be.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Beginner,
  Intermediate,
  Advanced,
}

impl Difficulty {
  pub const ALL: [Difficulty; 3] = [Difficulty::Beginner, Difficulty::Intermediate, Difficulty::Advanced];

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Beginner => "beginner",
      Difficulty::Intermediate => "intermediate",
      Difficulty::Advanced => "advanced",
    }
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Difficulty {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "beginner" => Ok(Difficulty::Beginner),
      "intermediate" => Ok(Difficulty::Intermediate),
      "advanced" => Ok(Difficulty::Advanced),
      other => Err(AppError::Validation(format!(
        "Difficulty must be one of: beginner, intermediate, advanced (got '{other}')"
      ))),
    }
  }
}

/// Normalize and validate a category tag. The set is open; we only enforce shape.
pub fn normalize_category(raw: &str) -> Result<String, AppError> {
  let c = raw.trim().to_ascii_lowercase();
  if c.is_empty() {
    return Err(AppError::Validation("Category is required".into()));
  }
  if c.chars().count() > MAX_CATEGORY_LEN {
    return Err(AppError::Validation(format!("Category must be at most {MAX_CATEGORY_LEN} characters")));
  }
  if !c.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') {
    return Err(AppError::Validation("Category may only contain letters, digits, '-' and '_'".into()));
  }
  Ok(c)
}

/// Trim a submitted answer and enforce its length bounds (in characters).
pub fn normalize_response_text(raw: &str) -> Result<String, AppError> {
  let t = raw.trim();
  let n = t.chars().count();
  if n == 0 {
    return Err(AppError::Validation("Response text is required".into()));
  }
  if n < MIN_RESPONSE_CHARS {
    return Err(AppError::Validation(format!(
      "Response must be at least {MIN_RESPONSE_CHARS} characters long"
    )));
  }
  if n > MAX_RESPONSE_CHARS {
    return Err(AppError::Validation(format!(
      "Response must be at most {MAX_RESPONSE_CHARS} characters long"
    )));
  }
  Ok(t.to_string())
}

/// A score on the closed 1–10 scale.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Score(f64);

impl Score {
  /// Mid-high score handed out by the fallback evaluation.
  pub const NEUTRAL: Score = Score(7.0);

  /// `None` for NaN, infinities and anything outside [1, 10].
  pub fn new(v: f64) -> Option<Self> {
    (v.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&v)).then_some(Score(v))
  }

  /// Force a finite value into range. Non-finite input yields `None`.
  pub fn clamped(v: f64) -> Option<Self> {
    v.is_finite().then(|| Score(v.clamp(MIN_SCORE, MAX_SCORE)))
  }

  pub fn value(self) -> f64 { self.0 }
}

/// Where did a scenario come from?
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioSource {
  Generated,
  Fallback,
}

impl ScenarioSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      ScenarioSource::Generated => "generated",
      ScenarioSource::Fallback => "fallback",
    }
  }
}

impl FromStr for ScenarioSource {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "generated" => Ok(ScenarioSource::Generated),
      "fallback" => Ok(ScenarioSource::Fallback),
      other => Err(format!("unknown scenario source '{other}'")),
    }
  }
}

/// Who produced an evaluation?
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationSource {
  Model,
  Fallback,
}

impl EvaluationSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      EvaluationSource::Model => "model",
      EvaluationSource::Fallback => "fallback",
    }
  }
}

impl FromStr for EvaluationSource {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "model" => Ok(EvaluationSource::Model),
      "fallback" => Ok(EvaluationSource::Fallback),
      other => Err(format!("unknown evaluation source '{other}'")),
    }
  }
}

/// A practice scenario, persisted in `scenarios`.
#[derive(Clone, Debug, PartialEq)]
pub struct Scenario {
  pub id: String,
  pub title: String,
  pub description: String,
  pub category: String,
  pub difficulty: Difficulty,
  pub source: ScenarioSource,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Title + description as produced by the model or the fallback bank,
/// before an id and timestamps are assigned.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioDraft {
  pub title: String,
  pub description: String,
}

/// Scored feedback attached to a response.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
  pub overall_score: Score,
  pub empathy_score: Score,
  pub clarity_score: Score,
  pub professionalism_score: Score,
  pub medical_accuracy_score: Score,
  pub feedback: String,
  pub improvement_suggestions: Vec<String>,
  pub source: EvaluationSource,
  pub evaluated_at: DateTime<Utc>,
}

/// A trainee's answer, persisted in `responses`. `evaluation` is `None`
/// until the evaluation step has run.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
  pub id: String,
  pub scenario_id: String,
  pub response_text: String,
  pub evaluation: Option<Evaluation>,
  pub submitted_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Response {
  pub fn score(&self) -> Option<f64> { self.evaluation.as_ref().map(|e| e.overall_score.value()) }
  pub fn feedback(&self) -> Option<&str> { self.evaluation.as_ref().map(|e| e.feedback.as_str()) }
}
