//! Local voice model descriptors (`<models>/<prefix><voice>.json`).

use crate::config::Game;
use crate::error::{SynthError, SynthResult};
use crate::voice::sanitize_voice_name;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

#[derive(Debug, Clone, Deserialize, Default)]
struct GameEntry {
    #[serde(default)]
    base_speaker_emb: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDescriptor {
    #[serde(rename = "modelType", default)]
    model_type: Option<String>,
    #[serde(rename = "modelVersion", default)]
    model_version: Option<serde_json::Value>,
    #[serde(default)]
    games: Vec<GameEntry>,
}

/// What the load call needs from a model's JSON descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceModelDescriptor {
    /// Model path without the `.json` extension, as the server expects it.
    pub model_path: PathBuf,
    pub model_type: Option<String>,
    pub model_version: Option<f64>,
    /// Embedding flattened to `"0.1, 0.2, ..."`.
    pub speaker_embedding: Option<String>,
}

impl VoiceModelDescriptor {
    /// `<models_dir>/<prefix><sanitized voice>` (no extension).
    pub fn model_path(models_dir: &Path, game: Game, voice: &str) -> PathBuf {
        models_dir.join(format!("{}{}", game.model_prefix(), sanitize_voice_name(voice)))
    }

    /// Load the descriptor for `voice`; a missing file is `VoiceModelNotFound`.
    pub fn load(models_dir: &Path, game: Game, voice: &str) -> SynthResult<Self> {
        let model_path = Self::model_path(models_dir, game, voice);
        // voice names may contain dots, so append rather than `with_extension`
        let mut json_path = model_path.clone().into_os_string();
        json_path.push(".json");
        let json_path = PathBuf::from(json_path);
        if !json_path.exists() {
            error!(
                "Voice model does not exist at '{}'. Check the backend install folder and download the model from {} (search for '{}{}').",
                model_path.display(),
                game.model_download_hint(),
                game.model_prefix(),
                sanitize_voice_name(voice)
            );
            return Err(SynthError::VoiceModelNotFound(json_path));
        }
        let text = std::fs::read_to_string(&json_path)?;
        Self::parse(model_path, &text)
    }

    pub fn parse(model_path: PathBuf, json: &str) -> SynthResult<Self> {
        let raw: RawDescriptor = serde_json::from_str(json)?;
        let speaker_embedding = raw
            .games
            .first()
            .and_then(|g| g.base_speaker_emb.as_ref())
            .filter(|v| !v.is_null())
            .map(flatten_embedding);
        let model_version = raw.model_version.as_ref().and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        Ok(Self {
            model_path,
            model_type: raw.model_type,
            model_version,
            speaker_embedding,
        })
    }
}

/// `[0.1, [0.2, 0.3]]` → `"0.1, 0.2, 0.3"`; strings pass through with brackets removed.
fn flatten_embedding(value: &serde_json::Value) -> String {
    fn collect(value: &serde_json::Value, out: &mut Vec<String>) {
        match value {
            serde_json::Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
            serde_json::Value::String(s) => out.push(s.replace(['[', ']'], "")),
            other => out.push(other.to_string()),
        }
    }
    let mut parts = Vec::new();
    collect(value, &mut parts);
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_uses_game_prefix_and_sanitized_name() {
        let p = VoiceModelDescriptor::model_path(Path::new("/m"), Game::Skyrim, "Male Nord");
        assert_eq!(p, PathBuf::from("/m/sk_malenord"));
        let p = VoiceModelDescriptor::model_path(Path::new("/m"), Game::Fallout4, "Piper");
        assert_eq!(p, PathBuf::from("/m/f4_piper"));
    }

    #[test]
    fn parses_descriptor_fields() {
        let json = r#"{"modelType": "FastPitch1.1", "modelVersion": 1.0,
                       "games": [{"base_speaker_emb": [0.5, -1.25, 3]}]}"#;
        let d = VoiceModelDescriptor::parse(PathBuf::from("/m/sk_lydia"), json).unwrap();
        assert_eq!(d.model_type.as_deref(), Some("FastPitch1.1"));
        assert_eq!(d.model_version, Some(1.0));
        assert_eq!(d.speaker_embedding.as_deref(), Some("0.5, -1.25, 3"));
    }

    #[test]
    fn missing_embedding_is_none() {
        let json = r#"{"modelType": "xVAPitch", "modelVersion": "3.0", "games": []}"#;
        let d = VoiceModelDescriptor::parse(PathBuf::from("x"), json).unwrap();
        assert_eq!(d.model_version, Some(3.0));
        assert!(d.speaker_embedding.is_none());
    }

    #[test]
    fn missing_file_is_model_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = VoiceModelDescriptor::load(dir.path(), Game::Skyrim, "Nobody").unwrap_err();
        assert!(matches!(err, SynthError::VoiceModelNotFound(p) if p.ends_with("sk_nobody.json")));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sk_lydia.json"), r#"{"modelType": "xVAPitch"}"#).unwrap();
        let d = VoiceModelDescriptor::load(dir.path(), Game::Skyrim, "Lydia").unwrap();
        assert_eq!(d.model_path, dir.path().join("sk_lydia"));
        assert_eq!(d.model_type.as_deref(), Some("xVAPitch"));
        assert!(d.model_version.is_none());
    }
}
