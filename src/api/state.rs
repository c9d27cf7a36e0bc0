use std::sync::Arc;
use std::time::Duration;

use crate::ai::chat::ChatGateway;
use crate::chat::ChatService;
use crate::core::{AppConfig, ChatError, load_system_prompt};
use crate::gemini::GeminiModel;
use crate::keys::KeyStore;

pub struct AppState {
    pub config: AppConfig,
    pub chat: ChatService,
}

impl AppState {
    pub fn new(config: AppConfig, chat: ChatService) -> Self {
        Self { config, chat }
    }

    /// Load the key file and system prompt and connect the model.
    /// Fails if either file is unusable.
    pub fn from_config(config: AppConfig) -> Result<Self, ChatError> {
        let keys = Arc::new(KeyStore::open(&config.keys_path, config.default_max_uses)?);
        let system_prompt = load_system_prompt(&config.prompt_path)?;
        let timeout = Duration::from_secs(config.model_timeout_secs);

        let gateway = match &config.gemini_api_key {
            Some(api_key) => {
                let model = GeminiModel::new(
                    &config.gemini_api_hostname,
                    api_key,
                    &config.gemini_model,
                    config.search_grounding,
                    timeout,
                )?;
                Some(ChatGateway::builder(Arc::new(model)).timeout(timeout).build())
            }
            None => {
                tracing::warn!("GEMINI_API_KEY is not set. Chat requests will return 503");
                None
            }
        };

        let chat = ChatService::new(
            keys,
            gateway,
            &system_prompt,
            &config.greeting,
            config.max_sessions,
        );
        Ok(Self::new(config, chat))
    }
}
