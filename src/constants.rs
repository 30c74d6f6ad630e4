// Process-wide defaults, overridable through the environment (or a .env file).

use std::env;
use std::time::Duration;

/// Directive prefixed to the newest question so the model answers in Portuguese.
pub const LANGUAGE_DIRECTIVE: &str = "Responda sempre em português.";

pub const SESSION_COOKIE: &str = "iroca_session";

lazy_static::lazy_static! {
    pub static ref OLLAMA_URL: String = env::var("OLLAMA_URL").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());
    pub static ref IROCA_CHAT_MODEL: String = env::var("IROCA_CHAT_MODEL").unwrap_or_else(|_| "gemma:2b".to_string());
    pub static ref IROCA_MODEL_DIR: String = env::var("IROCA_MODEL_DIR").unwrap_or_else(|_| "models".to_string());
    pub static ref CHAT_TIMEOUT: Duration = Duration::from_secs(
        env::var("IROCA_CHAT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120),
    );
}
