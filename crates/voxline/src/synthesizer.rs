//! **Synthesizer** - the public entry point.
//!
//! Owns the backend, its session state and the helpers around it. One call to
//! [`Synthesizer::synthesize`] turns a [`VoiceRequest`] into `out.wav` (plus
//! `out.lip` when the lip-sync tool is installed) under the voicelines folder.

use crate::backend::{LocalSynthBackend, RemoteServerBackend, TtsBackend};
use crate::config::{BackendKind, SynthConfig};
use crate::dispatcher::SynthesisDispatcher;
use crate::error::{SynthError, SynthResult};
use crate::lipsync::LipSyncInvoker;
use crate::playback;
use crate::process::BackendProcessManager;
use crate::retry::RetryPolicy;
use crate::segmenter::segment;
use crate::session::BackendSession;
use crate::speakers::CharacterVoices;
use crate::voice::{resolve, VoiceRequest};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// File stem of every finished voice line.
pub const OUTPUT_STEM: &str = "out";

/// Where a finished voice line ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisArtifact {
    pub audio_path: PathBuf,
    pub lip_path: Option<PathBuf>,
    pub phrase_count: usize,
    pub skipped_phrases: Vec<String>,
}

pub struct Synthesizer {
    config: SynthConfig,
    backend: Box<dyn TtsBackend>,
    session: BackendSession,
    manager: BackendProcessManager,
    dispatcher: SynthesisDispatcher,
    lipsync: LipSyncInvoker,
    initialized: bool,
}

impl Synthesizer {
    /// Build the backend named by `config.service`. `roster` feeds the remote speaker catalog.
    pub fn from_config(config: SynthConfig, roster: CharacterVoices) -> SynthResult<Self> {
        let backend: Box<dyn TtsBackend> = match config.service {
            BackendKind::LocalSynth => Box::new(LocalSynthBackend::new(&config)?),
            BackendKind::RemoteServer => Box::new(RemoteServerBackend::new(&config, roster)?),
        };
        Self::with_backend(config, backend)
    }

    /// Use an already-built backend. Its kind wins over `config.service`.
    pub fn with_backend(config: SynthConfig, backend: Box<dyn TtsBackend>) -> SynthResult<Self> {
        config.validate()?;
        let manager = BackendProcessManager::new(&config.process);
        let dispatcher = SynthesisDispatcher::new(RetryPolicy::from(&config.retry), manager.clone());
        Ok(Self {
            session: BackendSession::new(backend.kind()),
            lipsync: LipSyncInvoker::from_config(&config),
            manager,
            dispatcher,
            backend,
            config,
            initialized: false,
        })
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn session(&self) -> &BackendSession {
        &self.session
    }

    /// Make sure the backend is up and, the first time, let it load its catalog.
    pub fn start(&mut self) -> SynthResult<()> {
        self.manager.ensure_running(self.backend.as_mut(), &mut self.session)?;
        if !self.initialized {
            self.backend.initialize(&mut self.session)?;
            self.initialized = true;
        }
        Ok(())
    }

    pub fn audio_path(&self) -> PathBuf {
        self.config.voicelines_dir().join(format!("{}.wav", OUTPUT_STEM))
    }

    /// Synthesize one voice line.
    pub fn synthesize(&mut self, request: &VoiceRequest) -> SynthResult<SynthesisArtifact> {
        let started = Instant::now();
        if !self.session.is_ready() || !self.initialized {
            self.start()?;
        }

        let language = self.session.effective_language(&self.config.language).to_string();
        let known = self.backend.known_speakers(&language);
        let voice = resolve(request, self.backend.kind(), known.as_ref())?;
        debug!(voice = %voice.identity, tier = %voice.tier, "Voice resolved");
        self.manager
            .ensure_voice(self.backend.as_mut(), &mut self.session, &voice, request.accent.as_deref())?;

        info!("Synthesizing voiceline: {}", request.text.trim());
        let phrases = segment(&request.text, self.config.max_phrase_length);

        let dir = self.config.voicelines_dir();
        std::fs::create_dir_all(&dir)?;
        let audio_path = self.audio_path();
        clear_previous_output(&audio_path);

        let outcome = self.dispatcher.dispatch(
            self.backend.as_mut(),
            &mut self.session,
            &phrases,
            &audio_path,
            request.in_combat,
        )?;

        if !audio_path.exists() {
            error!("{} failed to generate voiceline at: {}", self.backend.kind(), audio_path.display());
            return Err(SynthError::SynthesisFailed(audio_path));
        }

        let lip_path = match self.lipsync.generate(&audio_path, &request.text) {
            Ok(lip) => Some(lip),
            Err(e) => {
                warn!(error = %e, "No lip file for this voiceline");
                None
            }
        };

        if self.config.debug_playback {
            if let Err(e) = playback::play_file(&audio_path) {
                warn!(error = %e, "Debug playback failed");
            }
        }

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Voiceline ready");
        Ok(SynthesisArtifact {
            audio_path,
            lip_path,
            phrase_count: outcome.phrase_count,
            skipped_phrases: outcome.skipped_phrases,
        })
    }
}

fn clear_previous_output(audio_path: &Path) {
    for path in [audio_path.to_path_buf(), audio_path.with_extension("lip")] {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove previous voiceline output");
            }
        }
    }
}
