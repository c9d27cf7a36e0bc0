pub mod config;
pub mod error;

pub use config::{AppConfig, load_system_prompt};
pub use error::ChatError;
