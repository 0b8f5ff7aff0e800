//! Client for the local inference service (Ollama-compatible HTTP API).

pub mod error;
pub mod ndjson;
pub mod ollama;

pub use error::ProviderError;
pub use ollama::{Generation, ModelCheck, OllamaClient, Reply, StreamChunk};
