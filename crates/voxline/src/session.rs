//! Backend session: the single piece of mutable state shared across requests.
//!
//! Tracks which backend process state we believe in and which model/voice is
//! loaded, so repeat requests for the same voice skip the load call. Every
//! transition goes through a method here and is logged.

use crate::config::BackendKind;
use tracing::{debug, info, warn};

/// Backend process lifecycle as seen from this side of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Uninitialized,
    HealthChecking,
    Launching,
    Ready,
}

/// Model/voice load lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelState {
    NoneLoaded,
    Loading(String),
    Loaded(String),
}

/// Loaded model/voice state owned by the `Synthesizer`.
#[derive(Debug, Clone)]
pub struct BackendSession {
    active_backend: BackendKind,
    process: ProcessState,
    model: ModelState,
    loaded_model: Option<String>,
    loaded_voice: Option<String>,
    language_override: Option<String>,
    model_type: Option<String>,
    speaker_embedding: Option<String>,
}

impl BackendSession {
    pub fn new(active_backend: BackendKind) -> Self {
        Self {
            active_backend,
            process: ProcessState::Uninitialized,
            model: ModelState::NoneLoaded,
            loaded_model: None,
            loaded_voice: None,
            language_override: None,
            model_type: None,
            speaker_embedding: None,
        }
    }

    pub fn active_backend(&self) -> BackendKind {
        self.active_backend
    }

    pub fn process_state(&self) -> ProcessState {
        self.process
    }

    pub fn model_state(&self) -> &ModelState {
        &self.model
    }

    pub fn is_ready(&self) -> bool {
        self.process == ProcessState::Ready
    }

    pub fn set_process_state(&mut self, next: ProcessState) {
        if self.process != next {
            debug!(from = ?self.process, to = ?next, backend = %self.active_backend, "Backend process state");
            self.process = next;
        }
    }

    /// Identity of the loaded model (remote) or model file stem (local).
    pub fn loaded_model(&self) -> Option<&str> {
        self.loaded_model.as_deref()
    }

    /// Identity of the last voice a request was switched to.
    pub fn loaded_voice(&self) -> Option<&str> {
        self.loaded_voice.as_deref()
    }

    /// Record the start of a model load.
    pub fn begin_loading(&mut self, model: &str) {
        debug!(model, "Loading model");
        self.model = ModelState::Loading(model.to_string());
    }

    /// Record a completed model load. Replaces whatever was loaded before.
    pub fn mark_model_loaded(&mut self, model: &str) {
        if self.loaded_model.as_deref() != Some(model) {
            info!(
                from = self.loaded_model.as_deref().unwrap_or("<none>"),
                to = model,
                "🔁 Model switched"
            );
        }
        self.loaded_model = Some(model.to_string());
        self.model = ModelState::Loaded(model.to_string());
    }

    /// A load failed; nothing we can vouch for is loaded any more.
    pub fn mark_load_failed(&mut self, model: &str) {
        warn!(model, "Model load failed; session has no loaded model");
        self.loaded_model = None;
        self.model = ModelState::NoneLoaded;
    }

    pub fn set_loaded_voice(&mut self, voice: &str) {
        if self.loaded_voice.as_deref() != Some(voice) {
            info!(
                from = self.loaded_voice.as_deref().unwrap_or("<none>"),
                to = voice,
                "🗣️ Voice switched"
            );
            self.loaded_voice = Some(voice.to_string());
        }
    }

    /// The voice is no longer trusted to be loaded; the next request reloads it.
    pub fn clear_loaded_voice(&mut self) {
        if let Some(voice) = self.loaded_voice.take() {
            debug!(voice, "Loaded voice cleared");
        }
    }

    /// A relaunched server starts on its own default model; forget ours.
    pub fn reset_model(&mut self) {
        if self.loaded_model.is_some() || self.model != ModelState::NoneLoaded {
            debug!(model = ?self.loaded_model, "Model state reset");
        }
        self.loaded_model = None;
        self.model = ModelState::NoneLoaded;
    }

    pub fn language_override(&self) -> Option<&str> {
        self.language_override.as_deref()
    }

    pub fn set_language_override(&mut self, language: Option<String>) {
        if self.language_override != language {
            info!(language = ?language, "Language override changed");
            self.language_override = language;
        }
    }

    /// Language to synthesize in: override if set, else `configured`.
    pub fn effective_language<'a>(&'a self, configured: &'a str) -> &'a str {
        self.language_override.as_deref().unwrap_or(configured)
    }

    pub fn model_type(&self) -> Option<&str> {
        self.model_type.as_deref()
    }

    pub fn speaker_embedding(&self) -> Option<&str> {
        self.speaker_embedding.as_deref()
    }

    /// Hints read from the local voice model descriptor.
    pub fn set_model_hints(&mut self, model_type: Option<String>, speaker_embedding: Option<String>) {
        self.model_type = model_type;
        self.speaker_embedding = speaker_embedding;
    }
}
