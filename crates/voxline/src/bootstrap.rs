//! Legacy voice model bootstrap for the local backend.
//!
//! Version 1.0 models only load cleanly after the server has been cycled
//! through a known-good model sequence. Any failed load also gets one retry
//! after loading the game's fallback model.

use crate::config::Game;
use crate::error::{SynthError, SynthResult};
use crate::model::VoiceModelDescriptor;
use crate::session::BackendSession;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Text synthesized during the Fallout 4 warm-up.
pub const WARM_UP_PHRASE: &str = "test phrase";

/// What the bootstrap needs from a backend.
pub trait ModelLoader {
    /// Read the descriptor for a voice name.
    fn describe(&self, voice: &str) -> SynthResult<VoiceModelDescriptor>;

    /// Ask the server to load the model.
    fn load_model(&mut self, descriptor: &VoiceModelDescriptor) -> SynthResult<()>;

    /// Synthesize `text` to `out` with whatever model is loaded.
    fn synthesize_scratch(&mut self, session: &BackendSession, text: &str, out: &Path) -> SynthResult<()>;
}

#[derive(Debug, Clone)]
pub struct LegacyModelBootstrap {
    game: Game,
    scratch_dir: PathBuf,
}

impl LegacyModelBootstrap {
    /// `data_dir` hosts the scratch folder for the warm-up synthesis.
    pub fn new(game: Game, data_dir: &Path) -> Self {
        Self {
            game,
            scratch_dir: data_dir.join("FO4_data"),
        }
    }

    /// Whether `descriptor` needs the warm-up sequence.
    pub fn applies_to(descriptor: &VoiceModelDescriptor) -> bool {
        descriptor.model_version == Some(1.0)
    }

    pub fn warm_up_voices(&self) -> &'static [&'static str] {
        match self.game {
            Game::Skyrim => &["malenord"],
            Game::Fallout4 => &["piper", "maleeventoned", "piper", "maleeventoned"],
        }
    }

    pub fn fallback_voice(&self) -> &'static str {
        match self.game {
            Game::Skyrim => "malenord",
            Game::Fallout4 => "piper",
        }
    }

    pub fn scratch_file(&self) -> PathBuf {
        self.scratch_dir.join("temp.wav")
    }

    /// Cycle through the warm-up models. Failures along the way are logged only.
    pub fn warm_up<L: ModelLoader + ?Sized>(&self, loader: &mut L, session: &BackendSession) {
        info!(game = ?self.game, "🧊 Legacy 1.0 model detected; running warm-up sequence");
        for voice in self.warm_up_voices() {
            self.load_backup(loader, voice);
        }
        if self.game == Game::Fallout4 {
            let out = self.scratch_file();
            if let Err(e) = std::fs::create_dir_all(&self.scratch_dir) {
                warn!(dir = %self.scratch_dir.display(), error = %e, "Could not create warm-up folder");
            }
            if let Err(e) = loader.synthesize_scratch(session, WARM_UP_PHRASE, &out) {
                warn!(error = %e, "Warm-up synthesis failed");
            }
        }
    }

    fn load_backup<L: ModelLoader + ?Sized>(&self, loader: &mut L, voice: &str) {
        info!(voice, "Loading backup model");
        let result = loader.describe(voice).and_then(|d| loader.load_model(&d));
        match result {
            Ok(()) => info!(voice, "Backup model loaded"),
            Err(e) => error!(voice, error = %e, "Backup model failed to load"),
        }
    }

    /// Load `target` (warming up first if it is a 1.0 model); on failure load the
    /// fallback model and try once more.
    pub fn load<L: ModelLoader + ?Sized>(
        &self,
        loader: &mut L,
        session: &mut BackendSession,
        name: &str,
        target: &VoiceModelDescriptor,
    ) -> SynthResult<()> {
        if Self::applies_to(target) {
            self.warm_up(loader, session);
        }

        session.begin_loading(name);
        let first = match loader.load_model(target) {
            Ok(()) => {
                session.mark_model_loaded(name);
                info!(model = name, "✅ Target model loaded");
                return Ok(());
            }
            Err(e) => e,
        };

        error!(model = name, error = %first, "Target model failed to load; retrying after fallback model");
        self.load_backup(loader, self.fallback_voice());

        session.begin_loading(name);
        match loader.load_model(target) {
            Ok(()) => {
                session.mark_model_loaded(name);
                info!(model = name, "✅ Target model loaded on retry");
                Ok(())
            }
            Err(e) => {
                error!(model = name, error = %e, "Model failed to load; restart required");
                session.mark_load_failed(name);
                Err(SynthError::ModelLoadFailed(name.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::session::ModelState;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        fail_target_loads: usize,
    }

    impl ModelLoader for Recorder {
        fn describe(&self, voice: &str) -> SynthResult<VoiceModelDescriptor> {
            Ok(VoiceModelDescriptor {
                model_path: PathBuf::from(voice),
                model_type: None,
                model_version: Some(3.0),
                speaker_embedding: None,
            })
        }

        fn load_model(&mut self, d: &VoiceModelDescriptor) -> SynthResult<()> {
            let name = d.model_path.display().to_string();
            self.events.push(format!("load:{name}"));
            if name == "target" && self.fail_target_loads > 0 {
                self.fail_target_loads -= 1;
                return Err(SynthError::Http("500".into()));
            }
            Ok(())
        }

        fn synthesize_scratch(&mut self, _s: &BackendSession, text: &str, out: &Path) -> SynthResult<()> {
            self.events.push(format!("synth:{text}:{}", out.file_name().unwrap().to_string_lossy()));
            Ok(())
        }
    }

    fn target(version: f64) -> VoiceModelDescriptor {
        VoiceModelDescriptor {
            model_path: PathBuf::from("target"),
            model_type: Some("FastPitch1.1".into()),
            model_version: Some(version),
            speaker_embedding: None,
        }
    }

    #[test]
    fn skyrim_legacy_model_warms_up_with_malenord() {
        let dir = tempfile::tempdir().unwrap();
        let boot = LegacyModelBootstrap::new(Game::Skyrim, dir.path());
        let mut loader = Recorder::default();
        let mut session = BackendSession::new(BackendKind::LocalSynth);
        boot.load(&mut loader, &mut session, "sk_target", &target(1.0)).unwrap();
        assert_eq!(loader.events, vec!["load:malenord", "load:target"]);
        assert_eq!(session.loaded_model(), Some("sk_target"));
    }

    #[test]
    fn fallout_legacy_model_runs_full_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let boot = LegacyModelBootstrap::new(Game::Fallout4, dir.path());
        let mut loader = Recorder::default();
        let mut session = BackendSession::new(BackendKind::LocalSynth);
        boot.load(&mut loader, &mut session, "f4_target", &target(1.0)).unwrap();
        assert_eq!(
            loader.events,
            vec![
                "load:piper",
                "load:maleeventoned",
                "load:piper",
                "load:maleeventoned",
                "synth:test phrase:temp.wav",
                "load:target",
            ]
        );
        assert!(dir.path().join("FO4_data").is_dir());
    }

    #[test]
    fn modern_model_skips_warm_up() {
        let dir = tempfile::tempdir().unwrap();
        let boot = LegacyModelBootstrap::new(Game::Fallout4, dir.path());
        let mut loader = Recorder::default();
        let mut session = BackendSession::new(BackendKind::LocalSynth);
        boot.load(&mut loader, &mut session, "f4_target", &target(3.0)).unwrap();
        assert_eq!(loader.events, vec!["load:target"]);
    }

    #[test]
    fn failed_load_retries_once_after_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let boot = LegacyModelBootstrap::new(Game::Skyrim, dir.path());
        let mut loader = Recorder {
            fail_target_loads: 1,
            ..Default::default()
        };
        let mut session = BackendSession::new(BackendKind::LocalSynth);
        boot.load(&mut loader, &mut session, "sk_target", &target(2.0)).unwrap();
        assert_eq!(loader.events, vec!["load:target", "load:malenord", "load:target"]);
        assert_eq!(session.model_state(), &ModelState::Loaded("sk_target".into()));
    }

    #[test]
    fn second_failure_is_model_load_failed() {
        let dir = tempfile::tempdir().unwrap();
        let boot = LegacyModelBootstrap::new(Game::Fallout4, dir.path());
        let mut loader = Recorder {
            fail_target_loads: 2,
            ..Default::default()
        };
        let mut session = BackendSession::new(BackendKind::LocalSynth);
        let err = boot.load(&mut loader, &mut session, "f4_target", &target(2.0)).unwrap_err();
        assert!(matches!(err, SynthError::ModelLoadFailed(ref m) if m == "f4_target"));
        assert!(err.is_unrecoverable());
        assert_eq!(session.model_state(), &ModelState::NoneLoaded);
        assert_eq!(loader.events, vec!["load:target", "load:piper", "load:target"]);
    }
}
