use std::env;
use std::fs;
use std::str::FromStr;

use super::error::ChatError;

pub const DEFAULT_GREETING: &str =
    "Hola, soy tu Asistente NEAE de Apoyo Docente para Andalucía. Sesión iniciada.";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub keys_path: String,
    pub prompt_path: String,
    pub static_dir: String,
    pub gemini_api_hostname: String,
    // When unset the server still starts but chat routes respond 503
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub search_grounding: bool,
    pub model_timeout_secs: u64,
    pub max_sessions: usize,
    pub default_max_uses: u32,
    pub secure_cookies: bool,
    pub greeting: String,
}

impl AppConfig {
    /// Read the config from environment variables. Call
    /// `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ChatError> {
        let storage_path = env::var("NEAE_STORAGE_PATH").unwrap_or("./".to_string());
        let storage_path = storage_path.trim_end_matches('/');
        let keys_path = env::var("NEAE_KEYS_PATH")
            .unwrap_or_else(|_| format!("{}/user_keys.json", storage_path));
        let prompt_path = env::var("NEAE_PROMPT_PATH")
            .unwrap_or_else(|_| format!("{}/prompt.txt", storage_path));
        let static_dir =
            env::var("NEAE_STATIC_DIR").unwrap_or_else(|_| format!("{}/static", storage_path));
        let gemini_api_hostname = env::var("NEAE_GEMINI_API_HOST")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());
        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let gemini_model =
            env::var("NEAE_GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-pro-latest".to_string());
        let greeting = env::var("NEAE_GREETING").unwrap_or_else(|_| DEFAULT_GREETING.to_string());

        let config = Self {
            keys_path,
            prompt_path,
            static_dir,
            gemini_api_hostname,
            gemini_api_key,
            gemini_model,
            search_grounding: parse_var("NEAE_SEARCH_GROUNDING", true)?,
            model_timeout_secs: parse_var("NEAE_MODEL_TIMEOUT_SECS", 120)?,
            max_sessions: parse_var("NEAE_MAX_SESSIONS", 1000)?,
            default_max_uses: parse_var("NEAE_DEFAULT_MAX_USES", 100)?,
            secure_cookies: parse_var("NEAE_SECURE_COOKIES", false)?,
            greeting,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that parse but can't work.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.max_sessions == 0 {
            return Err(ChatError::Config(String::from(
                "NEAE_MAX_SESSIONS must be greater than 0",
            )));
        }
        if self.default_max_uses == 0 {
            return Err(ChatError::Config(String::from(
                "NEAE_DEFAULT_MAX_USES must be greater than 0",
            )));
        }
        if self.model_timeout_secs == 0 {
            return Err(ChatError::Config(String::from(
                "NEAE_MODEL_TIMEOUT_SECS must be greater than 0",
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ChatError> {
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T, ChatError> {
    raw.trim()
        .parse()
        .map_err(|_| ChatError::Config(format!("Invalid value for {}: {:?}", name, raw)))
}

/// Load the system prompt used verbatim as the model's instructions.
/// A missing or blank prompt file is fatal.
pub fn load_system_prompt(path: &str) -> Result<String, ChatError> {
    let prompt = fs::read_to_string(path).map_err(|e| {
        ChatError::Config(format!("Could not read system prompt from {}: {}", path, e))
    })?;
    if prompt.trim().is_empty() {
        return Err(ChatError::Config(format!(
            "System prompt file {} is empty",
            path
        )));
    }
    Ok(prompt)
}
