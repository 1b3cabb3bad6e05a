//! Minimal client for a locally hosted, OpenAI-compatible model server (LM Studio and friends).
//!
//! We only call `/v1/chat/completions` and expect a JSON object somewhere in the reply.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! Every failure comes back as a typed `LlmError`; the scenario and evaluation services turn
//! those into fallback content, so nothing in here ever reaches an HTTP client as an error.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::{LlmSettings, Prompts};
use crate::domain::{now, Difficulty, Evaluation, EvaluationSource, Score, ScenarioDraft};
use crate::util::{extract_json_object, fill_template, trunc_for_log, truncate_chars};

const MAX_TITLE_CHARS: usize = 255;
const MAX_SUGGESTIONS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
  #[error("model request timed out after {0:?}")]
  Timeout(Duration),
  #[error("could not reach model server: {0}")]
  Connection(String),
  #[error("model server returned HTTP {status}: {message}")]
  Status { status: u16, message: String },
  #[error("could not decode model server reply: {0}")]
  Decode(String),
  #[error("model returned an empty completion")]
  EmptyCompletion,
  #[error("model reply is not usable: {0}")]
  Unparsable(String),
}

/// One system + user exchange.
#[derive(Clone, Debug)]
pub struct ChatRequest {
  pub system: String,
  pub user: String,
  pub temperature: f32,
  pub max_tokens: u32,
}

/// Seam between the services and whatever produces completions.
#[async_trait]
pub trait LanguageModel: Send + Sync {
  /// Model identifier, for logs.
  fn name(&self) -> &str;

  /// Raw text of the first completion choice.
  async fn complete(&self, req: &ChatRequest) -> Result<String, LlmError>;
}

#[derive(Clone)]
pub struct LmStudioClient {
  client: reqwest::Client,
  pub base_url: String,
  pub model: String,
  api_key: Option<String>,
  timeout: Duration,
}

impl LmStudioClient {
  pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
    let client = reqwest::Client::builder()
      .timeout(settings.timeout)
      .build()
      .map_err(|e| LlmError::Connection(e.to_string()))?;
    Ok(Self {
      client,
      base_url: settings.base_url.trim_end_matches('/').to_string(),
      model: settings.model.clone(),
      api_key: settings.api_key.clone(),
      timeout: settings.timeout,
    })
  }

  fn map_send_error(&self, e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
      LlmError::Timeout(self.timeout)
    } else if e.is_decode() {
      LlmError::Decode(e.to_string())
    } else {
      LlmError::Connection(e.to_string())
    }
  }
}

#[async_trait]
impl LanguageModel for LmStudioClient {
  fn name(&self) -> &str { &self.model }

  #[instrument(level = "info", target = "llm", skip(self, req), fields(model = %self.model, max_tokens = req.max_tokens))]
  async fn complete(&self, req: &ChatRequest) -> Result<String, LlmError> {
    let url = format!("{}/v1/chat/completions", self.base_url);
    let body = ChatCompletionRequest {
      model: &self.model,
      messages: vec![
        ChatMessageReq { role: "system", content: &req.system },
        ChatMessageReq { role: "user", content: &req.user },
      ],
      temperature: req.temperature,
      max_tokens: req.max_tokens,
      stream: false,
    };

    let mut builder = self.client.post(&url)
      .header(USER_AGENT, "carecomm-backend/0.1")
      .header(CONTENT_TYPE, "application/json");
    if let Some(key) = &self.api_key {
      builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
    }

    let start = Instant::now();
    let res = builder.json(&body).send().await.map_err(|e| self.map_send_error(e))?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_api_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      return Err(LlmError::Status { status, message });
    }

    let reply: ChatCompletionResponse = res.json().await.map_err(|e| self.map_send_error(e))?;
    if let Some(usage) = &reply.usage {
      info!(target: "llm", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "Model usage");
    }
    let text = reply.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .unwrap_or_default()
      .trim()
      .to_string();
    info!(target: "llm", elapsed = ?start.elapsed(), reply_len = text.len(), "Model reply received");

    if text.is_empty() {
      return Err(LlmError::EmptyCompletion);
    }
    Ok(text)
  }
}

// --- High-level helpers (domain-specialized) ---

/// Ask the model for a scenario title and description.
#[instrument(level = "info", target = "scenario", skip_all, fields(model = %model.name(), %category, %difficulty))]
pub async fn generate_scenario(
  model: &dyn LanguageModel,
  prompts: &Prompts,
  category: &str,
  difficulty: Difficulty,
) -> Result<ScenarioDraft, LlmError> {
  let pairs = [("category", category), ("difficulty", difficulty.as_str())];
  let req = ChatRequest {
    system: fill_template(&prompts.scenario_system, &pairs),
    user: fill_template(&prompts.scenario_user_template, &pairs),
    temperature: prompts.scenario_temperature,
    max_tokens: prompts.scenario_max_tokens,
  };
  let text = model.complete(&req).await?;
  let draft = parse_scenario_reply(&text).inspect_err(|e| {
    error!(target: "scenario", error = %e, reply = %trunc_for_log(&text, 120), "Unusable scenario reply");
  })?;
  info!(target: "scenario", title = %trunc_for_log(&draft.title, 50), description_len = draft.description.len(), "Scenario generated by model");
  Ok(draft)
}

/// Ask the model to score a response to a scenario.
#[instrument(level = "info", target = "evaluation", skip_all, fields(model = %model.name(), answer_len = response_text.len()))]
pub async fn evaluate_response(
  model: &dyn LanguageModel,
  prompts: &Prompts,
  scenario_title: &str,
  scenario_description: &str,
  response_text: &str,
) -> Result<Evaluation, LlmError> {
  let pairs = [
    ("scenario_title", scenario_title),
    ("scenario_description", scenario_description),
    ("user_response", response_text),
  ];
  let req = ChatRequest {
    system: prompts.evaluation_system.clone(),
    user: fill_template(&prompts.evaluation_user_template, &pairs),
    temperature: prompts.evaluation_temperature,
    max_tokens: prompts.evaluation_max_tokens,
  };
  let text = model.complete(&req).await?;
  parse_evaluation_reply(&text).inspect_err(|e| {
    error!(target: "evaluation", error = %e, reply = %trunc_for_log(&text, 120), "Unusable evaluation reply");
  })
}

// --- Reply parsing ---

#[derive(Deserialize)]
struct ScenarioReply {
  #[serde(default)] title: String,
  #[serde(default)] description: String,
}

pub fn parse_scenario_reply(text: &str) -> Result<ScenarioDraft, LlmError> {
  let json = extract_json_object(text).ok_or_else(|| LlmError::Unparsable("no JSON object in reply".into()))?;
  let r: ScenarioReply = serde_json::from_str(json).map_err(|e| LlmError::Unparsable(e.to_string()))?;
  let title = r.title.trim();
  let description = r.description.trim();
  if title.is_empty() || description.is_empty() {
    return Err(LlmError::Unparsable("title or description missing".into()));
  }
  Ok(ScenarioDraft { title: truncate_chars(title, MAX_TITLE_CHARS), description: description.to_string() })
}

#[derive(Deserialize)]
struct EvaluationReply {
  #[serde(default)] overall_score: Option<serde_json::Value>,
  #[serde(default)] score: Option<serde_json::Value>,
  #[serde(default)] empathy_score: Option<serde_json::Value>,
  #[serde(default)] clarity_score: Option<serde_json::Value>,
  #[serde(default)] professionalism_score: Option<serde_json::Value>,
  #[serde(default)] medical_accuracy_score: Option<serde_json::Value>,
  #[serde(default)] feedback: Option<serde_json::Value>,
  #[serde(default)] detailed_feedback: Option<serde_json::Value>,
  #[serde(default)] improvement_suggestions: Option<serde_json::Value>,
}

/// Non-empty trimmed text, if `v` is a string.
fn as_text(v: &serde_json::Value) -> Option<String> {
  v.as_str().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// A list of strings, or a single string taken as one suggestion.
fn as_suggestions(v: Option<&serde_json::Value>) -> Vec<String> {
  match v {
    Some(serde_json::Value::Array(items)) => items.iter().filter_map(as_text).take(MAX_SUGGESTIONS).collect(),
    Some(single) => as_text(single).into_iter().collect(),
    None => Vec::new(),
  }
}

/// Models send numbers as numbers or as strings ("8", "8/10" is not accepted).
fn as_number(v: &serde_json::Value) -> Option<f64> {
  match v {
    serde_json::Value::Number(n) => n.as_f64(),
    serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  }
}

/// Strict on the overall score (must be in 1-10), lenient on the rest:
/// missing sub-scores take the overall score, out-of-range ones are clamped.
pub fn parse_evaluation_reply(text: &str) -> Result<Evaluation, LlmError> {
  let json = extract_json_object(text).ok_or_else(|| LlmError::Unparsable("no JSON object in reply".into()))?;
  let r: EvaluationReply = serde_json::from_str(json).map_err(|e| LlmError::Unparsable(e.to_string()))?;

  // `overall_score` wins over the older `score` key; either may be absent or junk.
  let overall = [&r.overall_score, &r.score].into_iter()
    .find_map(|v| v.as_ref().and_then(as_number))
    .ok_or_else(|| LlmError::Unparsable("overall score missing or not a number".into()))?;
  let overall = Score::new(overall)
    .ok_or_else(|| LlmError::Unparsable(format!("overall score {overall} outside 1-10")))?;

  let sub = |v: &Option<serde_json::Value>| v.as_ref().and_then(as_number).and_then(Score::clamped).unwrap_or(overall);

  let feedback = [&r.feedback, &r.detailed_feedback].into_iter()
    .find_map(|v| v.as_ref().and_then(as_text))
    .ok_or_else(|| LlmError::Unparsable("feedback missing".into()))?;

  let improvement_suggestions = as_suggestions(r.improvement_suggestions.as_ref());

  Ok(Evaluation {
    overall_score: overall,
    empathy_score: sub(&r.empathy_score),
    clarity_score: sub(&r.clarity_score),
    professionalism_score: sub(&r.professionalism_score),
    medical_accuracy_score: sub(&r.medical_accuracy_score),
    feedback,
    improvement_suggestions,
    source: EvaluationSource::Model,
    evaluated_at: now(),
  })
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessageReq<'a>>,
  temperature: f32,
  max_tokens: u32,
  stream: bool,
}
#[derive(Serialize)]
struct ChatMessageReq<'a> { role: &'static str, content: &'a str }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum EObj { Obj { message: String }, Text(String) }
  match serde_json::from_str::<EWrap>(body).ok()?.error {
    EObj::Obj { message } | EObj::Text(message) => Some(message),
  }
}
