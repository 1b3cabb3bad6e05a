//! Public request/response structs for the HTTP API (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, Evaluation, EvaluationSource, Response, Scenario, ScenarioSource};

//
// Scenarios
//

#[derive(Debug, Deserialize)]
pub struct GenerateScenarioIn {
    pub category: String,
    pub difficulty: String,
}

#[derive(Debug, Serialize)]
pub struct ScenarioOut {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub source: ScenarioSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Scenario> for ScenarioOut {
    fn from(s: Scenario) -> Self {
        Self {
            id: s.id,
            title: s.title,
            description: s.description,
            category: s.category,
            difficulty: s.difficulty,
            source: s.source,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResponsesQuery {
    pub limit: Option<u32>,
}

//
// Responses + evaluations
//

#[derive(Debug, Deserialize)]
pub struct SubmitResponseIn {
    pub scenario_id: String,
    pub response_text: String,
}

#[derive(Debug, Serialize)]
pub struct EvaluationOut {
    pub response_id: String,
    pub overall_score: f64,
    pub empathy_score: f64,
    pub clarity_score: f64,
    pub professionalism_score: f64,
    pub medical_accuracy_score: f64,
    pub detailed_feedback: String,
    pub improvement_suggestions: Vec<String>,
    pub source: EvaluationSource,
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationOut {
    pub fn new(response_id: &str, e: Evaluation) -> Self {
        Self {
            response_id: response_id.to_string(),
            overall_score: e.overall_score.value(),
            empathy_score: e.empathy_score.value(),
            clarity_score: e.clarity_score.value(),
            professionalism_score: e.professionalism_score.value(),
            medical_accuracy_score: e.medical_accuracy_score.value(),
            detailed_feedback: e.feedback,
            improvement_suggestions: e.improvement_suggestions,
            source: e.source,
            evaluated_at: e.evaluated_at,
        }
    }
}

/// A response with its embedded evaluation; `score`/`feedback` stay null until evaluated.
#[derive(Debug, Serialize)]
pub struct ResponseOut {
    pub id: String,
    pub scenario_id: String,
    pub response_text: String,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub evaluation: Option<EvaluationOut>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Response> for ResponseOut {
    fn from(r: Response) -> Self {
        let score = r.score();
        let feedback = r.feedback().map(str::to_string);
        let evaluation = r.evaluation.map(|e| EvaluationOut::new(&r.id, e));
        Self {
            id: r.id,
            scenario_id: r.scenario_id,
            response_text: r.response_text,
            score,
            feedback,
            evaluation,
            submitted_at: r.submitted_at,
            updated_at: r.updated_at,
        }
    }
}

//
// Health
//

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub database: &'static str,
    pub model: &'static str,
}
