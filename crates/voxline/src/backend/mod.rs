//! **TTS backends** - the seam between orchestration and a concrete server.
//!
//! Two implementations ship: [`local::LocalSynthBackend`] (file-backed voice
//! models, server writes WAVs itself) and [`remote::RemoteServerBackend`]
//! (speaker identities inside a loaded model, audio comes back in the response).
//! Tests drive the `Synthesizer` with scripted implementations of the same trait.

pub mod local;
pub mod remote;

use crate::config::BackendKind;
use crate::error::SynthResult;
use crate::session::BackendSession;
use crate::voice::{KnownSpeakers, ResolvedVoice};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use local::LocalSynthBackend;
pub use remote::RemoteServerBackend;

/// Result of one health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Alive,
    Down(String),
}

impl HealthStatus {
    pub fn is_alive(&self) -> bool {
        matches!(self, HealthStatus::Alive)
    }
}

/// How to wait for a freshly launched backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Sleep once and assume the server is coming up.
    SettleDelay(Duration),
    /// Probe health up to `attempts` times, `interval` apart.
    Poll { attempts: u32, interval: Duration },
}

/// One phrase and the file it should be written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseJob {
    pub text: String,
    pub path: PathBuf,
}

/// A text-to-speech server we can probe, launch, point at a voice, and synthesize with.
pub trait TtsBackend: Send {
    fn kind(&self) -> BackendKind;

    /// One probe with a short timeout. A connection that is accepted and then
    /// dropped without a response still means the server is up.
    fn health_check(&self) -> HealthStatus;

    /// Spawn the server process, detached.
    fn launch(&mut self) -> SynthResult<()>;

    fn readiness(&self) -> Readiness;

    /// Runs once after the backend is first reachable.
    fn initialize(&mut self, _session: &mut BackendSession) -> SynthResult<()> {
        Ok(())
    }

    /// Speakers usable in `language`; `None` when the backend has no speaker list.
    fn known_speakers(&self, _language: &str) -> Option<KnownSpeakers> {
        None
    }

    /// Load whatever model/voice `voice` needs and record it in `session`.
    fn switch_voice(
        &mut self,
        session: &mut BackendSession,
        voice: &ResolvedVoice,
        accent: Option<&str>,
    ) -> SynthResult<()>;

    /// Synthesize one phrase to `out` with the currently loaded voice.
    fn synthesize_one(
        &mut self,
        session: &BackendSession,
        phrase: &str,
        out: &Path,
        in_combat: bool,
    ) -> SynthResult<()>;

    fn supports_batch(&self, _session: &BackendSession) -> bool {
        false
    }

    /// Synthesize every job in one request. Defaults to one call per job.
    fn synthesize_batch(
        &mut self,
        session: &BackendSession,
        jobs: &[PhraseJob],
        in_combat: bool,
    ) -> SynthResult<()> {
        for job in jobs {
            self.synthesize_one(session, &job.text, &job.path, in_combat)?;
        }
        Ok(())
    }
}

const CLOSED_MESSAGES: [&str; 3] = [
    "connection closed before message completed",
    "connection reset",
    "connection aborted",
];

/// True when the error chain shows the peer accepted and then dropped the connection.
pub fn is_connection_dropped(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind::*;
            if matches!(io.kind(), ConnectionReset | ConnectionAborted | UnexpectedEof | BrokenPipe) {
                return true;
            }
        }
        let msg = e.to_string().to_lowercase();
        if CLOSED_MESSAGES.iter().any(|m| msg.contains(m)) {
            return true;
        }
        current = e.source();
    }
    false
}

/// Classify a health probe response.
pub fn classify_probe(
    result: Result<reqwest::blocking::Response, reqwest::Error>,
) -> HealthStatus {
    match result {
        Ok(resp) if resp.status().is_success() => HealthStatus::Alive,
        Ok(resp) => HealthStatus::Down(format!("unexpected status {}", resp.status())),
        Err(e) if is_connection_dropped(&e) => HealthStatus::Alive,
        Err(e) => HealthStatus::Down(e.to_string()),
    }
}

/// Client used for health probes.
pub(crate) fn probe_client(timeout: Duration) -> SynthResult<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(crate::error::SynthError::from_request)
}

pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
