//! Runtime configuration: environment settings plus prompt templates that may be
//! overridden from a TOML file.
//!
//! Environment:
//!   PORT                : u16 (default 3000)
//!   DATABASE_URL        : default "sqlite://./carecomm.db"; "sqlite::memory:" for a throwaway store
//!   LLM_BASE_URL        : default "http://localhost:1234"; empty disables the model client
//!   LLM_API_KEY         : optional bearer token
//!   LLM_MODEL           : default "local-model"
//!   LLM_TIMEOUT_SECS    : default 30
//!   ALLOWED_ORIGINS     : comma-separated CORS origins; unset allows any origin
//!   EVALUATE_ON_SUBMIT  : "true" (default) / "false"
//!   PROMPTS_CONFIG_PATH : TOML file with `[prompts]` overrides

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  pub database_url: String,
  pub llm: Option<LlmSettings>,
  pub allowed_origins: Vec<String>,
  pub evaluate_on_submit: bool,
}

#[derive(Clone, Debug)]
pub struct LlmSettings {
  pub base_url: String,
  pub api_key: Option<String>,
  pub model: String,
  pub timeout: Duration,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      port: 3000,
      database_url: "sqlite://./carecomm.db".into(),
      llm: Some(LlmSettings::default()),
      allowed_origins: Vec::new(),
      evaluate_on_submit: true,
    }
  }
}

impl Default for LlmSettings {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:1234".into(),
      api_key: None,
      model: "local-model".into(),
      timeout: Duration::from_secs(30),
    }
  }
}

impl Settings {
  pub fn from_env() -> Self {
    Self::from_lookup(|k| std::env::var(k).ok())
  }

  /// Build settings from any key lookup; unparsable values keep their default.
  pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
    let d = Settings::default();
    let dl = LlmSettings::default();

    let port = match get("PORT") {
      Some(p) => p.trim().parse::<u16>().unwrap_or_else(|_| {
        warn!(target: "carecomm_backend", value = %p, "Invalid PORT; using default");
        d.port
      }),
      None => d.port,
    };

    let llm = match get("LLM_BASE_URL").map(|s| s.trim().to_string()) {
      Some(url) if url.is_empty() => None,
      base => Some(LlmSettings {
        base_url: base.unwrap_or(dl.base_url).trim_end_matches('/').to_string(),
        api_key: get("LLM_API_KEY").map(|k| k.trim().to_string()).filter(|k| !k.is_empty()),
        model: get("LLM_MODEL").filter(|m| !m.trim().is_empty()).unwrap_or(dl.model),
        timeout: get("LLM_TIMEOUT_SECS")
          .and_then(|s| s.trim().parse::<u64>().ok())
          .filter(|s| *s > 0)
          .map(Duration::from_secs)
          .unwrap_or(dl.timeout),
      }),
    };

    let allowed_origins = get("ALLOWED_ORIGINS")
      .map(|s| s.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect())
      .unwrap_or_default();

    let evaluate_on_submit = match get("EVALUATE_ON_SUBMIT").map(|s| s.trim().to_ascii_lowercase()) {
      Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
      _ => d.evaluate_on_submit,
    };

    Self {
      port,
      database_url: get("DATABASE_URL").unwrap_or(d.database_url),
      llm,
      allowed_origins,
      evaluate_on_submit,
    }
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompts and sampling parameters sent to the model.
/// Defaults target nursing communication practice; override them in TOML to tune tone.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub scenario_system: String,
  pub scenario_user_template: String,
  pub scenario_temperature: f32,
  pub scenario_max_tokens: u32,

  pub evaluation_system: String,
  pub evaluation_user_template: String,
  pub evaluation_temperature: f32,
  pub evaluation_max_tokens: u32,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      scenario_system: "You are a healthcare communication trainer. Generate realistic practice scenarios \
for nurses: clinical, patient-facing and inter-professional communication. \
Politely decline anything unrelated to medical scenario generation.".into(),
      scenario_user_template: "Generate a healthcare communication scenario for practice.\n\
Category: {category}\nDifficulty: {difficulty}\n\
Keep it realistic and focused on communication skills.\n\
Respond with JSON only: {\"title\": \"brief scenario title\", \"description\": \"scenario description\"}".into(),
      scenario_temperature: 0.5,
      scenario_max_tokens: 500,

      evaluation_system: "You are a healthcare communication expert evaluating nurse responses to patients, \
families and colleagues. Judge clarity, accuracy within nursing scope, empathy and tone, patient-centeredness, \
cultural sensitivity and professional standards. Highlight strengths, point out gaps or risks, and suggest \
specific improvements. Be constructive and actionable.".into(),
      evaluation_user_template: "Evaluate this healthcare communication response on a scale of 1-10.\n\n\
SCENARIO:\n{scenario_title}\n{scenario_description}\n\n\
USER'S RESPONSE:\n{user_response}\n\n\
Respond with JSON only:\n\
{\"overall_score\": 7.5, \"empathy_score\": 7.0, \"clarity_score\": 8.0, \"professionalism_score\": 7.5, \
\"medical_accuracy_score\": 7.0, \"feedback\": \"what worked and what to improve\", \
\"improvement_suggestions\": [\"suggestion 1\", \"suggestion 2\"]}".into(),
      evaluation_temperature: 0.3,
      evaluation_max_tokens: 1024,
    }
  }
}

/// Load prompt overrides from PROMPTS_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_prompt_config_from_env() -> Option<PromptConfig> {
  let path = std::env::var("PROMPTS_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<PromptConfig>(&s) {
      Ok(cfg) => {
        info!(target: "carecomm_backend", %path, "Loaded prompt config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "carecomm_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "carecomm_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
