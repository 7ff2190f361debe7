//! Remote speaker-identity backend (XTTS API server on port 8020).

use super::{classify_probe, endpoint, probe_client, HealthStatus, Readiness, TtsBackend};
use crate::audio::convert_bytes_to_16bit;
use crate::config::{BackendKind, RemoteBackendConfig, SynthConfig};
use crate::error::{SynthError, SynthResult};
use crate::session::BackendSession;
use crate::speakers::{CharacterVoices, SpeakerCatalog, SpeakersByLanguage};
use crate::voice::{sanitize_voice_name, KnownSpeakers, ResolvedVoice};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Model names shipped by the server itself, newest first.
pub const OFFICIAL_MODELS: [&str; 5] = ["main", "v2.0.3", "v2.0.2", "v2.0.1", "v2.0.0"];

pub fn is_official_model(name: &str) -> bool {
    OFFICIAL_MODELS.contains(&name)
}

/// First official model present in `available`.
pub fn first_official_model(available: &[String]) -> Option<&'static str> {
    OFFICIAL_MODELS
        .iter()
        .copied()
        .find(|m| available.iter().any(|a| a == m))
}

/// Model to switch to for `voice`, or `None` to keep the current one.
///
/// A voice that is itself a model is loaded directly. Otherwise a custom model is
/// swapped out for the first official one so the stock speakers are reachable.
pub fn plan_model_switch(voice: &str, available: &[String], loaded: Option<&str>) -> Option<String> {
    let wanted = sanitize_voice_name(voice);
    if loaded == Some(wanted.as_str()) {
        return None;
    }
    if available.iter().any(|m| *m == wanted) {
        return Some(wanted);
    }
    if loaded.map(is_official_model).unwrap_or(false) {
        return None;
    }
    first_official_model(available).map(sanitize_voice_name)
}

pub struct RemoteServerBackend {
    cfg: RemoteBackendConfig,
    language: String,
    settings: Value,
    readiness_polls: u32,
    poll_interval: Duration,
    report_dir: PathBuf,
    roster: CharacterVoices,
    available_models: Vec<String>,
    catalog: SpeakerCatalog,
    client: reqwest::blocking::Client,
    probe: reqwest::blocking::Client,
}

impl RemoteServerBackend {
    /// Fails with `SynthError::Json` when `tts_settings` is malformed.
    pub fn new(config: &SynthConfig, roster: CharacterVoices) -> SynthResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(SynthError::from_request)?;
        Ok(Self {
            settings: config.remote.settings_json()?,
            cfg: config.remote.clone(),
            language: config.language.clone(),
            readiness_polls: config.process.readiness_polls,
            poll_interval: Duration::from_millis(config.process.poll_interval_ms),
            report_dir: config.data_dir.clone(),
            roster,
            available_models: Vec::new(),
            catalog: SpeakerCatalog::default(),
            client,
            probe: probe_client(config.process.health_timeout())?,
        })
    }

    fn url(&self, path: &str) -> String {
        endpoint(&self.cfg.url, path)
    }

    pub fn available_models(&self) -> &[String] {
        &self.available_models
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> SynthResult<T> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .map_err(SynthError::from_request)?;
        if !resp.status().is_success() {
            return Err(SynthError::Http(format!("{} returned {}", path, resp.status())));
        }
        let text = resp.text().map_err(SynthError::from_request)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn fetch_models(&self) -> SynthResult<Vec<String>> {
        let models: Vec<String> = self.get_json("get_models_list")?;
        Ok(models.iter().map(|m| sanitize_voice_name(m)).collect())
    }

    fn fetch_speakers(&self) -> SynthResult<SpeakersByLanguage> {
        self.get_json("speakers_list")
    }

    fn switch_model(&self, model: &str) -> SynthResult<()> {
        let resp = self
            .client
            .post(self.url("switch_model"))
            .json(&json!({ "model_name": model }))
            .send()
            .map_err(SynthError::from_request)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(SynthError::Http(format!("switch_model returned {} for '{}'", resp.status(), model)))
        }
    }
}

impl TtsBackend for RemoteServerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RemoteServer
    }

    fn health_check(&self) -> HealthStatus {
        classify_probe(self.probe.post(self.url("set_tts_settings")).json(&self.settings).send())
    }

    fn launch(&mut self) -> SynthResult<()> {
        let exe = self.cfg.server_dir.join(&self.cfg.executable);
        let args = self.cfg.launch_args();
        info!("🚀 Starting XTTS server: {} {}", exe.display(), args.join(" "));
        let child = Command::new(&exe)
            .args(&args)
            .current_dir(&self.cfg.server_dir)
            .spawn()
            .map_err(|e| {
                SynthError::Process(format!(
                    "Could not run XTTS. Check that '{}' is correct: {}",
                    self.cfg.server_dir.display(),
                    e
                ))
            })?;
        debug!(pid = child.id(), "XTTS server spawned");
        Ok(())
    }

    fn readiness(&self) -> Readiness {
        Readiness::Poll {
            attempts: self.readiness_polls,
            interval: self.poll_interval,
        }
    }

    fn initialize(&mut self, session: &mut BackendSession) -> SynthResult<()> {
        self.available_models = self.fetch_models()?;
        let speakers = self.fetch_speakers()?;
        self.catalog = SpeakerCatalog::build(&speakers, &self.roster);
        if let Err(e) = self.catalog.write_reports(&speakers, &self.roster, &self.report_dir) {
            warn!(error = %e, "Could not write speaker availability reports");
        }
        if let Some(official) = first_official_model(&self.available_models) {
            session.mark_model_loaded(official);
        }
        info!(
            models = self.available_models.len(),
            languages = speakers.len(),
            "XTTS speaker catalog ready"
        );
        Ok(())
    }

    fn known_speakers(&self, language: &str) -> Option<KnownSpeakers> {
        Some(self.catalog.for_language(language))
    }

    fn switch_voice(
        &mut self,
        session: &mut BackendSession,
        voice: &ResolvedVoice,
        accent: Option<&str>,
    ) -> SynthResult<()> {
        if let Some(model) = plan_model_switch(&voice.identity, &self.available_models, session.loaded_model()) {
            session.begin_loading(&model);
            match self.switch_model(&model) {
                Ok(()) => session.mark_model_loaded(&model),
                Err(e) => {
                    session.mark_load_failed(&model);
                    return Err(e);
                }
            }
        }
        if self.cfg.accent_switching {
            if let Some(accent) = accent.map(str::trim).filter(|a| !a.is_empty()) {
                session.set_language_override(Some(accent.to_string()));
            }
        }
        info!(voice = %voice.identity, tier = %voice.tier, "Using XTTS speaker");
        Ok(())
    }

    fn synthesize_one(
        &mut self,
        session: &BackendSession,
        phrase: &str,
        out: &Path,
        _in_combat: bool,
    ) -> SynthResult<()> {
        let speaker = session
            .loaded_voice()
            .map(sanitize_voice_name)
            .ok_or_else(|| SynthError::NoVoiceAvailable("no speaker loaded".to_string()))?;
        let body = json!({
            "text": phrase,
            "speaker_wav": speaker,
            "language": session.effective_language(&self.language),
        });
        let started = Instant::now();
        let resp = self
            .client
            .post(self.url("tts_to_audio/"))
            .json(&body)
            .send()
            .map_err(SynthError::from_request)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SynthError::PhraseRejected {
                status: status.as_u16(),
                phrase: phrase.to_string(),
            });
        }
        let bytes = resp.bytes().map_err(SynthError::from_request)?;
        convert_bytes_to_16bit(&bytes, out)?;
        debug!(speaker = %speaker, elapsed_ms = started.elapsed().as_millis() as u64, "XTTS phrase synthesized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_official_follows_preference_order() {
        assert_eq!(first_official_model(&models(&["v2.0.0", "v2.0.2", "custom"])), Some("v2.0.2"));
        assert_eq!(first_official_model(&models(&["custom"])), None);
    }

    #[test]
    fn voice_that_is_a_model_is_loaded() {
        let available = models(&["main", "lydia"]);
        assert_eq!(plan_model_switch("Lydia", &available, Some("main")), Some("lydia".into()));
        assert_eq!(plan_model_switch("Lydia", &available, Some("lydia")), None);
    }

    #[test]
    fn custom_model_falls_back_to_official() {
        let available = models(&["v2.0.2", "lydia"]);
        assert_eq!(plan_model_switch("malenord", &available, Some("lydia")), Some("v2.0.2".into()));
        assert_eq!(plan_model_switch("malenord", &available, None), Some("v2.0.2".into()));
    }

    #[test]
    fn official_model_is_kept_for_plain_speakers() {
        let available = models(&["main", "v2.0.2"]);
        assert_eq!(plan_model_switch("malenord", &available, Some("v2.0.2")), None);
    }

    #[test]
    fn malformed_settings_fail_construction() {
        let mut cfg = SynthConfig::default();
        cfg.remote.tts_settings = "{oops".into();
        assert!(matches!(
            RemoteServerBackend::new(&cfg, CharacterVoices::default()),
            Err(SynthError::Json(_))
        ));
    }

    #[test]
    fn readiness_polls_from_config() {
        let cfg = SynthConfig::default();
        let b = RemoteServerBackend::new(&cfg, CharacterVoices::default()).unwrap();
        assert_eq!(
            b.readiness(),
            Readiness::Poll { attempts: 120, interval: Duration::from_millis(1000) }
        );
    }
}
