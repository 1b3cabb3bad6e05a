//! Application state: the store, prompts, optional model client and settings.
//!
//! Shared as `Arc<AppState>` by every handler. The store serializes its own
//! access; nothing else here is mutable.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::{load_prompt_config_from_env, Prompts, Settings};
use crate::db::{DatabaseError, DatabaseTarget, Store};
use crate::llm::{LanguageModel, LmStudioClient};

pub struct AppState {
    pub store: Store,
    pub llm: Option<Arc<dyn LanguageModel>>,
    pub prompts: Prompts,
    pub settings: Settings,
}

impl AppState {
    /// Build state from settings: open the store, load prompt overrides, init the model client.
    #[instrument(level = "info", skip_all)]
    pub fn from_settings(settings: Settings) -> Result<Self, DatabaseError> {
        let store = Store::open(&DatabaseTarget::from_url(&settings.database_url))?;

        let prompts = load_prompt_config_from_env()
            .map(|c| c.prompts)
            .unwrap_or_default();

        let llm: Option<Arc<dyn LanguageModel>> = match &settings.llm {
            Some(cfg) => match LmStudioClient::new(cfg) {
                Ok(client) => {
                    info!(target: "carecomm_backend", base_url = %client.base_url, model = %client.model, timeout = ?cfg.timeout, "Model client enabled.");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    warn!(target: "carecomm_backend", error = %e, "Could not build model client; serving fallback content only.");
                    None
                }
            },
            None => {
                info!(target: "carecomm_backend", "Model client disabled (empty LLM_BASE_URL). Serving fallback content only.");
                None
            }
        };

        Ok(Self { store, llm, prompts, settings })
    }

    /// Explicit parts, used by tests and embedders.
    pub fn new(store: Store, llm: Option<Arc<dyn LanguageModel>>, prompts: Prompts, settings: Settings) -> Self {
        Self { store, llm, prompts, settings }
    }
}
