//! Utility functions for the General Purpose Agent app
//!
//! Settings persistence and the wording of every transcript line produced
//! from inference-service results.

use providers::{Generation, ModelCheck, ProviderError, Reply};
use shared::settings::AppSettings;
use std::fs;
use std::path::PathBuf;

pub fn config_path() -> Option<PathBuf> {
    let proj = directories::ProjectDirs::from("com.local", "General Purpose Agent", "GeneralPurposeAgent")?;
    let _ = fs::create_dir_all(proj.config_dir());
    Some(proj.config_dir().join("settings.json"))
}

/// Load persisted settings. The bool is true on a fresh install.
pub fn load_settings_or_default() -> (AppSettings, bool) {
    let (mut settings, first_run) = match config_path() {
        Some(path) => match AppSettings::load(&path) {
            Ok(Some(s)) => (s, false),
            Ok(None) => (AppSettings::default(), true),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable settings");
                (AppSettings::default(), false)
            }
        },
        None => (AppSettings::default(), true),
    };
    settings.apply_env_overrides();
    (settings, first_run)
}

/// Save settings to disk
pub fn save_settings(settings: &AppSettings) {
    if let Some(path) = config_path() {
        if let Err(e) = settings.save(&path) {
            tracing::warn!(error = %e, "could not save settings");
        }
    }
}

/// Transcript line for the startup model check, plus the resulting availability.
pub fn model_check_line(check: &ModelCheck, model: &str, base_url: &str) -> (bool, String) {
    match check {
        ModelCheck::Available { .. } => (
            true,
            format!("Bot: Ollama connected. Model '{}' is available.", model),
        ),
        ModelCheck::Missing { available } => {
            let list = if available.is_empty() {
                "None".to_string()
            } else {
                available.join(", ")
            };
            (
                false,
                format!(
                    "Bot: Ollama connected, but model '{}' not found. Available models: {}.",
                    model, list
                ),
            )
        }
        ModelCheck::Unreachable(ProviderError::Connect(_)) => (
            false,
            format!(
                "Bot: Ollama service not found. Please ensure Ollama is running at {}.",
                base_url
            ),
        ),
        ModelCheck::Unreachable(ProviderError::Decode(_)) => (
            false,
            "Bot: Error decoding response from Ollama /api/tags. Is it running correctly?"
                .to_string(),
        ),
        ModelCheck::Unreachable(e) => (
            false,
            format!("Bot: Error connecting to Ollama or listing models: {}", e),
        ),
    }
}

pub fn warning_line(raw: &str) -> String {
    format!(
        "Bot: Warning - Could not decode a line from Ollama stream: {}",
        raw
    )
}

pub fn reply_line(reply: &Reply) -> String {
    match reply {
        Reply::Text(text) => format!("Bot: {}", text),
        Reply::ServiceError(e) => format!("Bot: Ollama error: {}", e),
        Reply::Empty => "Bot: No valid JSON response received from Ollama.".to_string(),
        Reply::Unexpected => {
            "Bot: Received an unexpected response format from Ollama.".to_string()
        }
    }
}

/// All lines for a finished, non-streamed generation: skipped lines first, then the reply.
pub fn generation_lines(generation: &Generation) -> Vec<String> {
    generation
        .warnings
        .iter()
        .map(|w| warning_line(w))
        .chain(std::iter::once(reply_line(&generation.reply)))
        .collect()
}

pub fn generate_error_line(error: &ProviderError) -> String {
    match error {
        ProviderError::Timeout => {
            "Bot: Request to Ollama timed out. The model might be taking too long to respond."
                .to_string()
        }
        ProviderError::Connect(_) => {
            "Bot: Connection error while sending message to Ollama. Is it still running?"
                .to_string()
        }
        ProviderError::Http { status, body } => format!(
            "Bot: HTTP error from Ollama API - Status {}: {}",
            status, body
        ),
        ProviderError::Request(e) => format!("Bot: Error sending request to Ollama: {}", e),
        ProviderError::Decode(_) => "Bot: Error decoding the final Ollama response.".to_string(),
    }
}
