//! Local model-file backend (xVASynth HTTP API on port 8008).

use super::{classify_probe, endpoint, probe_client, HealthStatus, PhraseJob, Readiness, TtsBackend};
use crate::bootstrap::{LegacyModelBootstrap, ModelLoader};
use crate::config::{BackendKind, Game, LocalBackendConfig, SynthConfig};
use crate::error::{SynthError, SynthResult};
use crate::model::VoiceModelDescriptor;
use crate::session::BackendSession;
use crate::voice::ResolvedVoice;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};

/// Model type that the batch endpoint cannot handle.
const NO_BATCH_MODEL_TYPE: &str = "xVAPitch";

pub struct LocalSynthBackend {
    cfg: LocalBackendConfig,
    game: Game,
    language: String,
    models_dir: PathBuf,
    settle_delay: Duration,
    bootstrap: LegacyModelBootstrap,
    client: reqwest::blocking::Client,
    probe: reqwest::blocking::Client,
}

impl LocalSynthBackend {
    pub fn new(config: &SynthConfig) -> SynthResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(SynthError::from_request)?;
        Ok(Self {
            models_dir: config.local.models_dir(config.game),
            cfg: config.local.clone(),
            game: config.game,
            language: config.language.clone(),
            settle_delay: Duration::from_millis(config.process.settle_delay_ms),
            bootstrap: LegacyModelBootstrap::new(config.game, &config.data_dir),
            client,
            probe: probe_client(config.process.health_timeout())?,
        })
    }

    fn url(&self, path: &str) -> String {
        endpoint(&self.cfg.url, path)
    }

    /// `pluginsContext` as the server expects it: a JSON object encoded as a string.
    pub fn plugins_context(&self, in_combat: bool) -> String {
        if in_combat {
            let mut ctx = serde_json::Map::new();
            ctx.insert(self.cfg.combat_plugin_key.clone(), json!({ "emAngry": 0.6 }));
            Value::Object(ctx).to_string()
        } else {
            "{}".to_string()
        }
    }

    fn synthesize_body(&self, session: &BackendSession, phrase: &str, out: &Path, in_combat: bool) -> Value {
        json!({
            "pluginsContext": self.plugins_context(in_combat),
            "modelType": session.model_type(),
            "sequence": phrase,
            "pace": self.cfg.pace,
            "outfile": out.display().to_string(),
            "vocoder": "n/a",
            "base_lang": self.language,
            "base_emb": session.speaker_embedding(),
            "useSR": self.cfg.use_super_resolution,
            "useCleanup": self.cfg.use_cleanup,
        })
    }

    fn batch_body(&self, session: &BackendSession, jobs: &[PhraseJob]) -> Value {
        // [text, ?, ?, pace, output path, ?, ?, pitch amplitude]
        let lines: Vec<Value> = jobs
            .iter()
            .map(|j| json!([j.text, "", "", 1, j.path.display().to_string(), "", "", 1]))
            .collect();
        json!({
            "pluginsContext": "{}",
            "modelType": session.model_type(),
            "linesBatch": lines,
            "speaker_i": null,
            "vocoder": [],
            "outputJSON": null,
            "useSR": null,
            "useCleanup": null,
        })
    }

    fn load_model_body(&self, descriptor: &VoiceModelDescriptor) -> Value {
        json!({
            "outputs": null,
            "version": "3.0",
            "model": descriptor.model_path.display().to_string(),
            "modelType": descriptor.model_type,
            "base_lang": self.language,
            "pluginsContext": "{}",
        })
    }

    fn post(&self, path: &str, body: &Value, phrase: &str) -> SynthResult<()> {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .map_err(SynthError::from_request)?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SynthError::PhraseRejected {
                status: status.as_u16(),
                phrase: phrase.to_string(),
            })
        }
    }
}

impl ModelLoader for LocalSynthBackend {
    fn describe(&self, voice: &str) -> SynthResult<VoiceModelDescriptor> {
        VoiceModelDescriptor::load(&self.models_dir, self.game, voice)
    }

    fn load_model(&mut self, descriptor: &VoiceModelDescriptor) -> SynthResult<()> {
        let resp = self
            .client
            .post(self.url("loadModel"))
            .json(&self.load_model_body(descriptor))
            .send()
            .map_err(SynthError::from_request)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(SynthError::Http(format!(
                "loadModel returned {} for '{}'",
                resp.status(),
                descriptor.model_path.display()
            )))
        }
    }

    fn synthesize_scratch(&mut self, session: &BackendSession, text: &str, out: &Path) -> SynthResult<()> {
        self.post("synthesize", &self.synthesize_body(session, text, out, false), text)
    }
}

impl TtsBackend for LocalSynthBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LocalSynth
    }

    fn health_check(&self) -> HealthStatus {
        classify_probe(self.probe.get(self.url("")).send())
    }

    fn launch(&mut self) -> SynthResult<()> {
        let exe = self.cfg.server_executable();
        info!("🚀 Starting xVASynth server at {}", exe.display());
        let mut cmd = Command::new(&exe);
        cmd.current_dir(&self.cfg.install_dir);
        if !self.cfg.print_server_output {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        let child = cmd.spawn().map_err(|e| {
            SynthError::Process(format!(
                "Could not run xVASynth. Check that '{}' is correct: {}",
                self.cfg.install_dir.display(),
                e
            ))
        })?;
        debug!(pid = child.id(), "xVASynth server spawned");
        Ok(())
    }

    fn readiness(&self) -> Readiness {
        Readiness::SettleDelay(self.settle_delay)
    }

    fn switch_voice(
        &mut self,
        session: &mut BackendSession,
        voice: &ResolvedVoice,
        _accent: Option<&str>,
    ) -> SynthResult<()> {
        info!(voice = %voice.identity, tier = %voice.tier, "Loading voice model...");
        let descriptor = self.describe(&voice.identity)?;
        session.set_model_hints(descriptor.model_type.clone(), descriptor.speaker_embedding.clone());
        let name = descriptor
            .model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| voice.identity.clone());
        let bootstrap = self.bootstrap.clone();
        bootstrap.load(self, session, &name, &descriptor)
    }

    fn synthesize_one(
        &mut self,
        session: &BackendSession,
        phrase: &str,
        out: &Path,
        in_combat: bool,
    ) -> SynthResult<()> {
        debug!(phrase, out = %out.display(), "xVASynth synthesize");
        self.post("synthesize", &self.synthesize_body(session, phrase, out, in_combat), phrase)
    }

    fn supports_batch(&self, session: &BackendSession) -> bool {
        session.model_type() != Some(NO_BATCH_MODEL_TYPE)
    }

    fn synthesize_batch(
        &mut self,
        session: &BackendSession,
        jobs: &[PhraseJob],
        _in_combat: bool,
    ) -> SynthResult<()> {
        debug!(phrases = jobs.len(), "xVASynth synthesize_batch");
        let summary = jobs.iter().map(|j| j.text.as_str()).collect::<Vec<_>>().join(" | ");
        self.post("synthesize_batch", &self.batch_body(session, jobs), &summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> LocalSynthBackend {
        let mut cfg = SynthConfig::default();
        cfg.local.install_dir = PathBuf::from("/opt/xva");
        cfg.language = "de".into();
        LocalSynthBackend::new(&cfg).unwrap()
    }

    #[test]
    fn combat_adds_emotion_hint() {
        let b = backend();
        assert_eq!(b.plugins_context(false), "{}");
        let ctx: Value = serde_json::from_str(&b.plugins_context(true)).unwrap();
        assert_eq!(ctx["mantella_settings"]["emAngry"], json!(0.6));
    }

    #[test]
    fn synthesize_body_carries_model_hints() {
        let b = backend();
        let mut session = BackendSession::new(BackendKind::LocalSynth);
        session.set_model_hints(Some("FastPitch1.1".into()), Some("0.1, 0.2".into()));
        let body = b.synthesize_body(&session, "Hello there", Path::new("/v/out.wav"), false);
        assert_eq!(body["modelType"], "FastPitch1.1");
        assert_eq!(body["base_emb"], "0.1, 0.2");
        assert_eq!(body["base_lang"], "de");
        assert_eq!(body["sequence"], "Hello there");
        assert_eq!(body["outfile"], "/v/out.wav");
        assert_eq!(body["pluginsContext"], "{}");
    }

    #[test]
    fn batch_lines_have_eight_fields() {
        let b = backend();
        let session = BackendSession::new(BackendKind::LocalSynth);
        let jobs = vec![
            PhraseJob { text: "one".into(), path: PathBuf::from("/v/out_part0.wav") },
            PhraseJob { text: "two".into(), path: PathBuf::from("/v/out_part1.wav") },
        ];
        let body = b.batch_body(&session, &jobs);
        let lines = body["linesBatch"].as_array().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], json!(["two", "", "", 1, "/v/out_part1.wav", "", "", 1]));
        assert!(body["speaker_i"].is_null());
    }

    #[test]
    fn batch_depends_on_model_type() {
        let b = backend();
        let mut session = BackendSession::new(BackendKind::LocalSynth);
        assert!(b.supports_batch(&session));
        session.set_model_hints(Some("xVAPitch".into()), None);
        assert!(!b.supports_batch(&session));
    }

    #[test]
    fn load_model_body_uses_path_without_extension() {
        let b = backend();
        let d = VoiceModelDescriptor {
            model_path: PathBuf::from("/opt/xva/resources/app/models/Skyrim/sk_lydia"),
            model_type: Some("xVAPitch".into()),
            model_version: Some(3.0),
            speaker_embedding: None,
        };
        let body = b.load_model_body(&d);
        assert_eq!(body["version"], "3.0");
        assert_eq!(body["model"], "/opt/xva/resources/app/models/Skyrim/sk_lydia");
        assert_eq!(body["modelType"], "xVAPitch");
        assert!(body["outputs"].is_null());
    }
}
