//! Background jobs for the chat window
//!
//! Each user action runs on its own thread and reports back over a channel
//! that the window polls once per frame.

use crate::types::{ChatEvent, UpdateEvent};
use providers::{ModelCheck, OllamaClient, ProviderError};
use services::UpdateChecker;
use shared::settings::{OllamaSettings, UpdateSettings};
use std::sync::mpsc::Sender;

fn runtime() -> Result<tokio::runtime::Runtime, ProviderError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ProviderError::Request(format!("Failed to start async runtime: {}", e)))
}

/// List models and check that the configured one is served.
pub fn run_model_check(settings: OllamaSettings, tx: Sender<ModelCheck>) {
    let check = runtime().and_then(|rt| {
        let client = OllamaClient::new(&settings)?;
        Ok(rt.block_on(client.check_model(&settings.model)))
    });
    let _ = tx.send(check.unwrap_or_else(ModelCheck::Unreachable));
}

/// Send one prompt. Streams fragments when the settings ask for it.
pub fn run_generation(settings: OllamaSettings, prompt: String, tx: Sender<ChatEvent>) {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            let _ = tx.send(ChatEvent::Finished(Err(e)));
            return;
        }
    };
    let client = match OllamaClient::new(&settings) {
        Ok(c) => c,
        Err(e) => {
            let _ = tx.send(ChatEvent::Finished(Err(e)));
            return;
        }
    };

    if !client.streaming() {
        let result = rt.block_on(client.generate(&settings.model, &prompt));
        let _ = tx.send(ChatEvent::Finished(result));
        return;
    }

    let (chunk_tx, mut chunk_rx) = tokio::sync::mpsc::unbounded_channel();
    let forward_tx = tx.clone();
    let (result, _) = rt.block_on(async {
        tokio::join!(
            client.generate_stream(&settings.model, &prompt, chunk_tx),
            async move {
                // Ends once generate_stream drops its sender
                while let Some(chunk) = chunk_rx.recv().await {
                    let _ = forward_tx.send(ChatEvent::Chunk(chunk));
                }
            }
        )
    });
    if let Err(e) = result {
        let _ = tx.send(ChatEvent::Finished(Err(e)));
    }
}

/// Open/clone the checkout, fetch, compare and pull.
pub fn run_update_check(settings: UpdateSettings, tx: Sender<UpdateEvent>) {
    let checker = UpdateChecker::new(settings.repo_url, settings.local_repo_path);
    let progress_tx = tx.clone();
    let result = checker.check(move |line| {
        let _ = progress_tx.send(UpdateEvent::Progress(line));
    });
    let _ = tx.send(UpdateEvent::Finished(result));
}
