//! **Voice Resolver** - pick the voice identity for a request.
//!
//! The remote backend only knows the speakers it was given, so candidates are
//! tried in priority order (advanced → regular → in-game) against the filtered
//! speaker sets. The local backend loads a model file named after the voice, so
//! the requested voice is used as-is.

use crate::config::BackendKind;
use crate::error::{SynthError, SynthResult};
use std::collections::HashSet;

/// Lowercase and drop spaces: `"Male Nord"` → `"malenord"`.
pub fn sanitize_voice_name(name: &str) -> String {
    name.replace(' ', "").to_lowercase()
}

/// One synthesis request. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceRequest {
    pub text: String,
    pub preferred_voice: Option<String>,
    pub advanced_voice: Option<String>,
    pub fallback_in_game_voice: Option<String>,
    pub accent: Option<String>,
    pub in_combat: bool,
}

impl VoiceRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.preferred_voice = Some(voice.into());
        self
    }

    pub fn with_advanced_voice(mut self, voice: impl Into<String>) -> Self {
        self.advanced_voice = Some(voice.into());
        self
    }

    pub fn with_in_game_voice(mut self, voice: impl Into<String>) -> Self {
        self.fallback_in_game_voice = Some(voice.into());
        self
    }

    pub fn with_accent(mut self, accent: impl Into<String>) -> Self {
        self.accent = Some(accent.into());
        self
    }

    pub fn in_combat(mut self, in_combat: bool) -> Self {
        self.in_combat = in_combat;
        self
    }
}

/// Which candidate satisfied resolution. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTier {
    Advanced,
    Regular,
    InGameFallback,
}

impl std::fmt::Display for SourceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Advanced => write!(f, "advanced_voice_model"),
            Self::Regular => write!(f, "voice_model"),
            Self::InGameFallback => write!(f, "game_voice_folder"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVoice {
    pub identity: String,
    pub backend: BackendKind,
    pub tier: SourceTier,
}

/// Sanitized speaker names the remote backend can voice in the current language.
#[derive(Debug, Clone, Default)]
pub struct KnownSpeakers {
    pub advanced: HashSet<String>,
    pub regular: HashSet<String>,
}

impl KnownSpeakers {
    pub fn new<A, R, S1, S2>(advanced: A, regular: R) -> Self
    where
        A: IntoIterator<Item = S1>,
        R: IntoIterator<Item = S2>,
        S1: AsRef<str>,
        S2: AsRef<str>,
    {
        Self {
            advanced: advanced.into_iter().map(|s| sanitize_voice_name(s.as_ref())).collect(),
            regular: regular.into_iter().map(|s| sanitize_voice_name(s.as_ref())).collect(),
        }
    }

    fn has_advanced(&self, name: &str) -> bool {
        self.advanced.contains(&sanitize_voice_name(name))
    }

    fn has_regular(&self, name: &str) -> bool {
        self.regular.contains(&sanitize_voice_name(name))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Resolve the voice for `request` on `backend`.
///
/// `known` is consulted only for the remote backend; passing `None` there means
/// no speakers are known and resolution fails.
///
/// The local backend has no speaker list: the preferred voice is the model name,
/// and when none is given the in-game voice stands in for it.
pub fn resolve(
    request: &VoiceRequest,
    backend: BackendKind,
    known: Option<&KnownSpeakers>,
) -> SynthResult<ResolvedVoice> {
    let resolved = |identity: &str, tier| ResolvedVoice {
        identity: identity.to_string(),
        backend,
        tier,
    };

    match backend {
        BackendKind::LocalSynth => {
            if let Some(voice) = non_empty(&request.preferred_voice) {
                return Ok(resolved(voice, SourceTier::Regular));
            }
            if let Some(voice) = non_empty(&request.fallback_in_game_voice) {
                return Ok(resolved(voice, SourceTier::InGameFallback));
            }
            Err(SynthError::NoVoiceAvailable("no voice supplied".to_string()))
        }
        BackendKind::RemoteServer => {
            let empty = KnownSpeakers::default();
            let known = known.unwrap_or(&empty);
            if let Some(voice) = non_empty(&request.advanced_voice) {
                if known.has_advanced(voice) {
                    return Ok(resolved(voice, SourceTier::Advanced));
                }
            }
            if let Some(voice) = non_empty(&request.preferred_voice) {
                if known.has_regular(voice) {
                    return Ok(resolved(voice, SourceTier::Regular));
                }
            }
            if let Some(voice) = non_empty(&request.fallback_in_game_voice) {
                if known.has_regular(voice) {
                    return Ok(resolved(voice, SourceTier::InGameFallback));
                }
            }
            let tried: Vec<&str> = [
                non_empty(&request.advanced_voice),
                non_empty(&request.preferred_voice),
                non_empty(&request.fallback_in_game_voice),
            ]
            .into_iter()
            .flatten()
            .collect();
            Err(SynthError::NoVoiceAvailable(tried.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speakers() -> KnownSpeakers {
        KnownSpeakers::new(["Serana Advanced"], ["MaleNord", "Female Even Toned"])
    }

    #[test]
    fn sanitize_strips_spaces_and_case() {
        assert_eq!(sanitize_voice_name("Female Even Toned"), "femaleeventoned");
    }

    #[test]
    fn falls_back_to_in_game_voice() {
        let req = VoiceRequest::new("Hello").with_voice("Lydia").with_in_game_voice("MaleNord");
        let v = resolve(&req, BackendKind::RemoteServer, Some(&speakers())).unwrap();
        assert_eq!(v.identity, "MaleNord");
        assert_eq!(v.tier, SourceTier::InGameFallback);
    }

    #[test]
    fn advanced_voice_wins_when_known() {
        let req = VoiceRequest::new("Hello")
            .with_advanced_voice("serana advanced")
            .with_voice("Female Even Toned");
        let v = resolve(&req, BackendKind::RemoteServer, Some(&speakers())).unwrap();
        assert_eq!(v.tier, SourceTier::Advanced);
    }

    #[test]
    fn advanced_voice_is_not_matched_against_regular_list() {
        let req = VoiceRequest::new("Hello")
            .with_advanced_voice("MaleNord")
            .with_voice("FemaleEvenToned");
        let v = resolve(&req, BackendKind::RemoteServer, Some(&speakers())).unwrap();
        assert_eq!(v.identity, "FemaleEvenToned");
        assert_eq!(v.tier, SourceTier::Regular);
    }

    #[test]
    fn remote_without_match_fails() {
        let req = VoiceRequest::new("Hello").with_voice("Lydia").with_in_game_voice("FemaleNord");
        let err = resolve(&req, BackendKind::RemoteServer, Some(&speakers())).unwrap_err();
        match err {
            SynthError::NoVoiceAvailable(tried) => assert_eq!(tried, "Lydia, FemaleNord"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn local_uses_voice_directly() {
        let req = VoiceRequest::new("Hello").with_voice("Lydia");
        let v = resolve(&req, BackendKind::LocalSynth, None).unwrap();
        assert_eq!(v.identity, "Lydia");
        assert_eq!(v.backend, BackendKind::LocalSynth);
        assert_eq!(v.tier, SourceTier::Regular);
    }

    #[test]
    fn local_falls_back_to_in_game_voice() {
        let req = VoiceRequest::new("Hello").with_in_game_voice("MaleNord");
        let v = resolve(&req, BackendKind::LocalSynth, None).unwrap();
        assert_eq!(v.identity, "MaleNord");
        assert_eq!(v.tier, SourceTier::InGameFallback);
    }

    #[test]
    fn local_without_any_voice_fails() {
        let req = VoiceRequest::new("Hello").with_voice("  ");
        assert!(matches!(
            resolve(&req, BackendKind::LocalSynth, None),
            Err(SynthError::NoVoiceAvailable(_))
        ));
    }
}
