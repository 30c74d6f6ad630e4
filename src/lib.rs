pub mod categories;
pub mod chat;
pub mod constants;
pub mod conversation;
pub mod encoder;
pub mod error;
pub mod llm_interaction;
pub mod prediction;
pub mod regressor;
pub mod sessions;
pub mod web_server;

pub use categories::Category;
pub use chat::{ChatOrchestrator, Exchange};
pub use conversation::{ConversationLog, Speaker, Turn};
pub use error::{ChatServiceError, Error, Result};
pub use llm_interaction::{ChatBackend, ChatMessage, OllamaChat};
pub use prediction::{FallbackStrategy, ModelBundle, Prediction, PredictionRequest, Predictor};
