//! Core types for the General Purpose Agent app
//!
//! This module contains the window state, the messages background jobs send
//! back to it, and the state transitions for chat and update checks.

use crate::state::{run_generation, run_model_check, run_update_check};
use crate::utils::{generate_error_line, generation_lines, model_check_line, warning_line};
use providers::{Generation, ModelCheck, ProviderError, StreamChunk};
use services::UpdateError;
use shared::events::{Dialog, Transcript};
use shared::settings::AppSettings;
use shared::version::UpdateOutcome;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, TryRecvError};

/// Message from the chat worker
#[derive(Debug)]
pub enum ChatEvent {
    /// Streamed fragment, warning, error or end marker
    Chunk(StreamChunk),
    /// Non-streamed result, or a streamed request that failed before any chunk
    Finished(Result<Generation, ProviderError>),
}

/// Message from the update worker
#[derive(Debug)]
pub enum UpdateEvent {
    Progress(String),
    Finished(Result<UpdateOutcome, UpdateError>),
}

/// Main application state
pub struct AppState {
    pub settings: AppSettings,
    pub transcript: Transcript,
    pub input_text: String,
    pub ollama_available: bool,
    pub model_name: String,
    pub local_repo_path: PathBuf,
    /// Set when the user really wants to exit (tray Quit, or after an update)
    pub quitting: bool,
    pub dialog: Option<Dialog>,
    pub model_check_rx: Option<Receiver<ModelCheck>>,
    pub chat_rx: Option<Receiver<ChatEvent>>,
    pub update_rx: Option<Receiver<UpdateEvent>>,
    /// Transcript index of the reply currently streaming in
    streaming_line: Option<usize>,
    /// Whether the first minimize-to-tray balloon was already shown
    pub tray_notice_shown: bool,
}

impl AppState {
    pub fn new(settings: AppSettings) -> Self {
        Self {
            model_name: settings.ollama.model.clone(),
            local_repo_path: settings.updates.local_repo_path.clone(),
            settings,
            transcript: Transcript::new(),
            input_text: String::new(),
            ollama_available: false,
            quitting: false,
            dialog: None,
            model_check_rx: None,
            chat_rx: None,
            update_rx: None,
            streaming_line: None,
            tray_notice_shown: false,
        }
    }

    pub fn log_message(&mut self, message: impl Into<String>) {
        self.transcript.push(message);
    }

    /// Any background job in flight (the window keeps repainting while true)
    pub fn is_busy(&self) -> bool {
        self.model_check_rx.is_some() || self.chat_rx.is_some() || self.update_rx.is_some()
    }

    pub fn is_chatting(&self) -> bool {
        self.chat_rx.is_some()
    }

    pub fn is_updating(&self) -> bool {
        self.update_rx.is_some()
    }

    /// Check for completed background work (called each frame)
    pub fn poll(&mut self) {
        self.poll_model_check();
        self.poll_chat();
        self.poll_update();
    }

    // ---- model check -------------------------------------------------

    pub fn start_model_check(&mut self) {
        self.log_message("Bot: Checking Ollama connection and model availability...");
        let (tx, rx) = channel();
        self.model_check_rx = Some(rx);
        let settings = self.settings.ollama.clone();
        std::thread::spawn(move || run_model_check(settings, tx));
    }

    pub fn poll_model_check(&mut self) {
        let Some(rx) = &self.model_check_rx else {
            return;
        };
        let check = match rx.try_recv() {
            Ok(check) => check,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => ModelCheck::Unreachable(ProviderError::Request(
                "model check stopped unexpectedly".to_string(),
            )),
        };
        self.model_check_rx = None;
        self.apply_model_check(&check);
    }

    pub fn apply_model_check(&mut self, check: &ModelCheck) {
        let (available, line) =
            model_check_line(check, &self.model_name, &self.settings.ollama.base_url);
        self.ollama_available = available;
        self.log_message(line);
    }

    // ---- chat --------------------------------------------------------

    /// Submit the input line.
    pub fn send_message(&mut self) {
        if self.is_chatting() {
            return;
        }
        let user_text = self.input_text.trim().to_string();
        if user_text.is_empty() {
            return;
        }

        self.log_message(format!("You: {}", user_text));
        self.input_text.clear();

        if !self.ollama_available {
            self.log_message("Bot: Ollama is not available. Cannot process message.");
            return;
        }

        self.log_message("Bot: Sending message to Ollama...");
        let (tx, rx) = channel();
        self.chat_rx = Some(rx);
        self.streaming_line = None;
        let settings = self.settings.ollama.clone();
        std::thread::spawn(move || run_generation(settings, user_text, tx));
    }

    pub fn poll_chat(&mut self) {
        loop {
            let Some(rx) = &self.chat_rx else {
                return;
            };
            match rx.try_recv() {
                Ok(event) => {
                    if self.apply_chat_event(event) {
                        self.chat_rx = None;
                        return;
                    }
                }
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    // Worker exited mid-stream; keep whatever text arrived
                    if self.streaming_line.is_none() {
                        self.log_message(
                            "Bot: Error processing Ollama response: worker stopped unexpectedly",
                        );
                    }
                    self.chat_rx = None;
                    self.streaming_line = None;
                    return;
                }
            }
        }
    }

    /// Apply one chat event. Returns true when the exchange is over.
    pub fn apply_chat_event(&mut self, event: ChatEvent) -> bool {
        match event {
            ChatEvent::Finished(Ok(generation)) => {
                for line in generation_lines(&generation) {
                    self.log_message(line);
                }
                true
            }
            ChatEvent::Finished(Err(e)) | ChatEvent::Chunk(StreamChunk::Failed(e)) => {
                // Text streamed so far stays in the transcript
                self.log_message(generate_error_line(&e));
                if matches!(e, ProviderError::Connect(_)) {
                    self.ollama_available = false;
                }
                self.streaming_line = None;
                true
            }
            ChatEvent::Chunk(StreamChunk::Text(fragment)) => {
                match self.streaming_line {
                    Some(idx) => {
                        self.transcript.append_to(idx, &fragment);
                    }
                    None => {
                        let idx = self
                            .transcript
                            .push(format!("Bot: {}", fragment.trim_start()));
                        self.streaming_line = Some(idx);
                    }
                }
                false
            }
            ChatEvent::Chunk(StreamChunk::Warning(raw)) => {
                self.log_message(warning_line(&raw));
                false
            }
            ChatEvent::Chunk(StreamChunk::Error(e)) => {
                self.log_message(format!("Bot: Ollama error: {}", e));
                self.streaming_line = None;
                true
            }
            ChatEvent::Chunk(StreamChunk::Done) => {
                if self.streaming_line.take().is_none() {
                    self.log_message("Bot: No valid JSON response received from Ollama.");
                }
                true
            }
        }
    }

    // ---- updates -----------------------------------------------------

    pub fn check_for_updates(&mut self) {
        if self.is_updating() {
            return;
        }
        self.log_message("Checking for updates...");
        let (tx, rx) = channel();
        self.update_rx = Some(rx);
        let mut settings = self.settings.updates.clone();
        settings.local_repo_path = self.local_repo_path.clone();
        std::thread::spawn(move || run_update_check(settings, tx));
    }

    pub fn poll_update(&mut self) {
        loop {
            let Some(rx) = &self.update_rx else {
                return;
            };
            match rx.try_recv() {
                Ok(UpdateEvent::Progress(line)) => self.log_message(line),
                Ok(UpdateEvent::Finished(result)) => {
                    self.update_rx = None;
                    self.apply_update_result(result);
                    return;
                }
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.update_rx = None;
                    self.apply_update_result(Err(UpdateError::Unexpected(
                        "update check stopped unexpectedly".to_string(),
                    )));
                    return;
                }
            }
        }
    }

    pub fn apply_update_result(&mut self, result: Result<UpdateOutcome, UpdateError>) {
        match result {
            Ok(UpdateOutcome::UpToDate { commit }) => {
                tracing::info!(commit = %commit.short_sha(), "no updates");
                self.log_message("Application is up to date.");
                self.dialog = Some(Dialog::info(
                    "No Updates",
                    "Your application is currently up to date.",
                ));
            }
            Ok(UpdateOutcome::Updated { from, to, branch }) => {
                tracing::info!(from = %from.short_sha(), to = %to.short_sha(), %branch, "updated");
                self.dialog = Some(
                    Dialog::info(
                        "Update Complete",
                        "Application updated. Please restart the application.",
                    )
                    .then_quit(),
                );
                self.log_message("Simulating application restart by quitting...");
            }
            Err(e) => {
                tracing::warn!(error = %e, "update check failed");
                self.log_message(e.log_line());
                self.dialog = Some(e.dialog());
            }
        }
    }

    /// Close the current dialog. Returns true when the app should exit.
    pub fn dismiss_dialog(&mut self) -> bool {
        match self.dialog.take() {
            Some(d) if d.quit_on_close => {
                self.quitting = true;
                true
            }
            _ => false,
        }
    }
}
