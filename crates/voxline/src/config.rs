//! Synthesizer configuration loaded from TOML and environment.
//!
//! Precedence: env `VOXLINE_*` (separator `__`) > file at `VOXLINE_CONFIG`
//! (default `config/voxline.toml`) > built-in defaults.

use crate::error::{SynthError, SynthResult};
use crate::segmenter::DEFAULT_MAX_PHRASE_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which TTS backend drives synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// xVASynth-style local server: file-backed voice models, writes WAVs itself.
    #[serde(rename = "xvasynth", alias = "local")]
    LocalSynth,
    /// XTTS-style API server: speaker identities within a loaded model, returns audio bytes.
    #[serde(rename = "xtts", alias = "remote")]
    RemoteServer,
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::LocalSynth
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalSynth => write!(f, "xVASynth"),
            Self::RemoteServer => write!(f, "XTTS"),
        }
    }
}

/// Target game. VR editions share voice models with their flat counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Game {
    #[serde(alias = "SkyrimVR", alias = "skyrim", alias = "skyrimvr")]
    Skyrim,
    #[serde(alias = "Fallout4VR", alias = "fallout4", alias = "fallout4vr")]
    Fallout4,
}

impl Default for Game {
    fn default() -> Self {
        Self::Skyrim
    }
}

impl Game {
    /// Directory name under the local backend's `models/` folder, and the
    /// game identifier passed to the lip-sync tool.
    pub fn folder_name(&self) -> &'static str {
        match self {
            Self::Skyrim => "Skyrim",
            Self::Fallout4 => "Fallout4",
        }
    }

    /// Voice model file prefix (`sk_lydia.json`, `f4_piper.json`).
    pub fn model_prefix(&self) -> &'static str {
        match self {
            Self::Skyrim => "sk_",
            Self::Fallout4 => "f4_",
        }
    }

    /// Where players download missing voice models.
    pub fn model_download_hint(&self) -> &'static str {
        match self {
            Self::Skyrim => "https://www.nexusmods.com/skyrimspecialedition/mods/44184?tab=files",
            Self::Fallout4 => "https://www.nexusmods.com/fallout4/mods/49340?tab=files",
        }
    }
}

fn default_local_url() -> String {
    "http://127.0.0.1:8008".to_string()
}

fn default_remote_url() -> String {
    "http://127.0.0.1:8020".to_string()
}

fn default_tts_settings() -> String {
    r#"{"stream_chunk_size": 100, "temperature": 0.75, "speed": 1, "length_penalty": 1.0, "repetition_penalty": 5, "top_p": 0.85, "top_k": 50, "enable_text_splitting": true}"#
        .to_string()
}

/// Local (xVASynth-style) backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalBackendConfig {
    /// Install folder containing `resources/app`.
    pub install_dir: PathBuf,
    pub url: String,
    /// `cpu` or `gpu`; selects the bundled `cpython_<device>` server build.
    pub process_device: String,
    /// Show the server's console output instead of discarding it.
    pub print_server_output: bool,
    pub pace: f32,
    pub use_super_resolution: bool,
    pub use_cleanup: bool,
    /// Plugin namespace that receives the in-combat emotion hint.
    pub combat_plugin_key: String,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from("xVASynth"),
            url: default_local_url(),
            process_device: "cpu".to_string(),
            print_server_output: false,
            pace: 1.0,
            use_super_resolution: false,
            use_cleanup: false,
            combat_plugin_key: "mantella_settings".to_string(),
        }
    }
}

impl LocalBackendConfig {
    pub fn models_dir(&self, game: Game) -> PathBuf {
        self.install_dir
            .join("resources")
            .join("app")
            .join("models")
            .join(game.folder_name())
    }

    pub fn server_executable(&self) -> PathBuf {
        self.install_dir
            .join("resources")
            .join("app")
            .join(format!("cpython_{}", self.process_device))
            .join("server.exe")
    }

    pub fn lip_plugin_dir(&self) -> PathBuf {
        self.install_dir
            .join("resources")
            .join("app")
            .join("plugins")
            .join("lip_fuz")
    }
}

/// Remote (XTTS API server) backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteBackendConfig {
    pub url: String,
    /// Folder holding the server executable; also the working directory on launch.
    pub server_dir: PathBuf,
    pub executable: String,
    /// Model version passed as `--version` on launch; empty to let the server decide.
    pub default_model: String,
    pub deepspeed: bool,
    pub low_vram: bool,
    /// `cpu`, `cuda`, or empty for the server default.
    pub device: String,
    /// Let a request's accent override the synthesis language.
    pub accent_switching: bool,
    /// JSON object posted to `/set_tts_settings`; doubles as the health probe.
    pub tts_settings: String,
}

impl Default for RemoteBackendConfig {
    fn default() -> Self {
        Self {
            url: default_remote_url(),
            server_dir: PathBuf::from("xtts-api-server"),
            executable: "xtts-api-server.exe".to_string(),
            default_model: "v2.0.2".to_string(),
            deepspeed: false,
            low_vram: false,
            device: "cuda".to_string(),
            accent_switching: false,
            tts_settings: default_tts_settings(),
        }
    }
}

impl RemoteBackendConfig {
    /// Parse `tts_settings`; malformed JSON is a configuration mistake and is not retried.
    pub fn settings_json(&self) -> SynthResult<serde_json::Value> {
        let cleaned = self.tts_settings.replace('\n', "");
        Ok(serde_json::from_str(&cleaned)?)
    }

    /// Command-line flags for the server executable.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !self.default_model.trim().is_empty() {
            args.push("--version".to_string());
            args.push(self.default_model.trim().to_string());
        }
        if self.deepspeed {
            args.push("--deepspeed".to_string());
        }
        match self.device.trim() {
            "cpu" => args.extend(["--device".to_string(), "cpu".to_string()]),
            "cuda" => args.extend(["--device".to_string(), "cuda".to_string()]),
            _ => {}
        }
        if self.low_vram {
            args.push("--lowvram".to_string());
        }
        args
    }

    pub fn lip_plugin_dir(&self) -> PathBuf {
        self.server_dir.join("plugins").join("lip_fuz")
    }
}

/// Lip-sync tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncConfig {
    /// Folder with `FaceFXWrapper.exe` and `FonixData.cdf`. Defaults to the active backend's `lip_fuz` plugin.
    pub tool_dir: Option<PathBuf>,
    pub language_tag: String,
}

impl Default for LipSyncConfig {
    fn default() -> Self {
        Self {
            tool_dir: None,
            language_tag: "USEnglish".to_string(),
        }
    }
}

/// Backend process timing. Millisecond fields so they survive env overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub health_timeout_ms: u64,
    pub max_health_checks: u32,
    pub poll_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub readiness_polls: u32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            health_timeout_ms: 2_000,
            max_health_checks: 10,
            poll_interval_ms: 1_000,
            settle_delay_ms: 1_000,
            readiness_polls: 120,
        }
    }
}

impl ProcessConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

/// Retry-with-restart settings for synthesis calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 0,
            jitter_ms: 250,
        }
    }
}

/// Top-level synthesizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub service: BackendKind,
    pub game: Game,
    /// Synthesis language code (`en`, `de`, ...).
    pub language: String,
    /// Output root; voice lines land in `<data_dir>/voicelines`.
    pub data_dir: PathBuf,
    pub max_phrase_length: usize,
    /// Play the final line locally (requires the `playback` feature).
    pub debug_playback: bool,
    pub local: LocalBackendConfig,
    pub remote: RemoteBackendConfig,
    pub lipsync: LipSyncConfig,
    pub process: ProcessConfig,
    pub retry: RetryConfig,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            service: BackendKind::default(),
            game: Game::default(),
            language: "en".to_string(),
            data_dir: PathBuf::from("data"),
            max_phrase_length: DEFAULT_MAX_PHRASE_LENGTH,
            debug_playback: false,
            local: LocalBackendConfig::default(),
            remote: RemoteBackendConfig::default(),
            lipsync: LipSyncConfig::default(),
            process: ProcessConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl SynthConfig {
    /// Load from `VOXLINE_CONFIG` (or `config/voxline.toml`) plus `VOXLINE_*` env overrides.
    pub fn load() -> SynthResult<Self> {
        let path = std::env::var("VOXLINE_CONFIG").unwrap_or_else(|_| "config/voxline.toml".to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load from an explicit file (skipped if absent) plus env overrides.
    pub fn load_from(path: &Path) -> SynthResult<Self> {
        let builder = config::Config::builder();
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };
        let built = builder
            .add_source(config::Environment::with_prefix("VOXLINE").separator("__"))
            .build()?;
        let cfg: SynthConfig = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> SynthResult<()> {
        if self.max_phrase_length == 0 {
            return Err(SynthError::Config("max_phrase_length must be greater than zero".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SynthError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn voicelines_dir(&self) -> PathBuf {
        self.data_dir.join("voicelines")
    }

    /// Lip-sync tool folder: explicit override, else the active backend's plugin folder.
    pub fn lip_tool_dir(&self) -> PathBuf {
        match &self.lipsync.tool_dir {
            Some(dir) => dir.clone(),
            None => match self.service {
                BackendKind::LocalSynth => self.local.lip_plugin_dir(),
                BackendKind::RemoteServer => self.remote.lip_plugin_dir(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let cfg = SynthConfig::default();
        assert_eq!(cfg.service, BackendKind::LocalSynth);
        assert_eq!(cfg.max_phrase_length, 150);
        assert_eq!(cfg.process.max_health_checks, 10);
        assert_eq!(cfg.process.readiness_polls, 120);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert!(cfg.remote.settings_json().unwrap().is_object());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn loads_toml_with_game_alias() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
service = "xtts"
game = "Fallout4VR"
language = "de"
max_phrase_length = 90

[remote]
url = "http://localhost:9000"
accent_switching = true
"#
        )
        .unwrap();
        let cfg = SynthConfig::load_from(file.path()).unwrap();
        assert_eq!(cfg.service, BackendKind::RemoteServer);
        assert_eq!(cfg.game, Game::Fallout4);
        assert_eq!(cfg.language, "de");
        assert_eq!(cfg.max_phrase_length, 90);
        assert_eq!(cfg.remote.url, "http://localhost:9000");
        assert!(cfg.remote.accent_switching);
        // untouched sections keep defaults
        assert_eq!(cfg.local.url, "http://127.0.0.1:8008");
    }

    #[test]
    fn malformed_settings_json_is_an_error() {
        let mut remote = RemoteBackendConfig::default();
        remote.tts_settings = "{not json".to_string();
        assert!(matches!(remote.settings_json(), Err(SynthError::Json(_))));
    }

    #[test]
    fn launch_args_follow_flags() {
        let mut remote = RemoteBackendConfig::default();
        remote.deepspeed = true;
        remote.low_vram = true;
        remote.device = "cpu".to_string();
        assert_eq!(
            remote.launch_args(),
            vec!["--version", "v2.0.2", "--deepspeed", "--device", "cpu", "--lowvram"]
        );
        remote.default_model.clear();
        remote.device = "auto".to_string();
        remote.deepspeed = false;
        remote.low_vram = false;
        assert!(remote.launch_args().is_empty());
    }

    #[test]
    fn local_paths_follow_install_layout() {
        let local = LocalBackendConfig {
            install_dir: PathBuf::from("/opt/xva"),
            process_device: "gpu".to_string(),
            ..Default::default()
        };
        assert_eq!(
            local.server_executable(),
            PathBuf::from("/opt/xva/resources/app/cpython_gpu/server.exe")
        );
        assert_eq!(
            local.models_dir(Game::Fallout4),
            PathBuf::from("/opt/xva/resources/app/models/Fallout4")
        );
    }

    #[test]
    fn zero_phrase_length_is_rejected() {
        let cfg = SynthConfig {
            max_phrase_length: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
