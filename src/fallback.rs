//! Canned content served when the model is unreachable or replies with garbage.
//!
//! Everything here is deterministic: the same inputs always give the same text.

use crate::domain::{now, Evaluation, EvaluationSource, Score, ScenarioDraft};

pub const FALLBACK_FEEDBACK: &str = "Your response shows good communication effort. \
AI evaluation is temporarily unavailable, so this is a standard assessment; \
your response has been saved for review.";

pub const FALLBACK_SUGGESTIONS: [&str; 3] = [
  "Continue practicing active listening",
  "Focus on clear, concise communication",
  "Maintain professional empathy",
];

/// Pre-written scenario for a category. Unknown categories get the general one.
pub fn fallback_scenario(category: &str) -> ScenarioDraft {
  let (title, description) = match category {
    "emergency" => (
      "Emergency Communication",
      "A 45-year-old patient arrives with chest pain and is visibly anxious. \
Practice calming the patient while gathering critical information efficiently.",
    ),
    "routine" => (
      "Routine Check-up",
      "A generally healthy 35-year-old comes in for an annual check-up. \
Practice engaging the patient in a conversation about lifestyle and preventive care.",
    ),
    _ => (
      "General Healthcare Communication",
      "Practice professional communication with a patient in a healthcare setting: \
introduce yourself, explain what will happen next and check the patient's understanding.",
    ),
  };
  ScenarioDraft { title: title.into(), description: description.into() }
}

/// Neutral evaluation used whenever scoring fails.
pub fn fallback_evaluation() -> Evaluation {
  let s = Score::NEUTRAL;
  Evaluation {
    overall_score: s,
    empathy_score: s,
    clarity_score: s,
    professionalism_score: s,
    medical_accuracy_score: s,
    feedback: FALLBACK_FEEDBACK.into(),
    improvement_suggestions: FALLBACK_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
    source: EvaluationSource::Fallback,
    evaluated_at: now(),
  }
}
