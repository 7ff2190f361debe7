//! Backend Process Manager
//!
//! Makes sure the selected backend's server answers before any synthesis call:
//! probe, launch once if the probe fails, then keep probing up to a fixed budget.

use crate::backend::{HealthStatus, Readiness, TtsBackend};
use crate::config::ProcessConfig;
use crate::error::{SynthError, SynthResult};
use crate::session::{BackendSession, ProcessState};
use crate::voice::{ResolvedVoice, SourceTier};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct BackendProcessManager {
    max_health_checks: u32,
    poll_interval: Duration,
}

impl BackendProcessManager {
    pub fn new(cfg: &ProcessConfig) -> Self {
        Self {
            max_health_checks: cfg.max_health_checks.max(1),
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
        }
    }

    /// Probe until the backend answers, launching it once after the first failure.
    ///
    /// Fails with `BackendUnreachable` after `max_health_checks` failed probes.
    pub fn ensure_running(&self, backend: &mut dyn TtsBackend, session: &mut BackendSession) -> SynthResult<()> {
        session.set_process_state(ProcessState::HealthChecking);
        let mut launched = false;

        for check in 1..=self.max_health_checks {
            let reason = match backend.health_check() {
                HealthStatus::Alive => {
                    session.set_process_state(ProcessState::Ready);
                    info!(backend = %backend.kind(), checks = check, "✅ TTS backend reachable");
                    return Ok(());
                }
                HealthStatus::Down(reason) => reason,
            };

            if !launched {
                warn!(backend = %backend.kind(), reason = %reason, "🔍 TTS backend not detected; launching it");
                launched = true;
                session.set_process_state(ProcessState::Launching);
                session.reset_model();
                session.clear_loaded_voice();
                if let Err(e) = self.launch_and_wait(backend) {
                    session.set_process_state(ProcessState::Uninitialized);
                    return Err(e);
                }
                session.set_process_state(ProcessState::HealthChecking);
            } else if check < self.max_health_checks {
                std::thread::sleep(self.poll_interval);
            }
        }

        session.set_process_state(ProcessState::Uninitialized);
        error!(
            backend = %backend.kind(),
            checks = self.max_health_checks,
            "Could not connect to the TTS backend. Make sure it is installed and running, then restart."
        );
        Err(SynthError::BackendUnreachable(format!(
            "{} did not answer after {} health checks",
            backend.kind(),
            self.max_health_checks
        )))
    }

    /// Launch the backend again and wait for it. Used between retry attempts.
    ///
    /// The loaded model is forgotten so [`Self::reload_voice`] plans the switch afresh;
    /// the voice identity is kept for that reload.
    pub fn restart(&self, backend: &mut dyn TtsBackend, session: &mut BackendSession) -> SynthResult<()> {
        session.set_process_state(ProcessState::Launching);
        session.reset_model();
        match self.launch_and_wait(backend) {
            Ok(()) => {
                session.set_process_state(ProcessState::Ready);
                Ok(())
            }
            Err(e) => {
                session.set_process_state(ProcessState::Uninitialized);
                Err(e)
            }
        }
    }

    fn launch_and_wait(&self, backend: &mut dyn TtsBackend) -> SynthResult<()> {
        backend
            .launch()
            .map_err(|e| SynthError::BackendUnreachable(e.to_string()))?;
        match backend.readiness() {
            Readiness::SettleDelay(delay) => {
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                Ok(())
            }
            Readiness::Poll { attempts, interval } => {
                for _ in 0..attempts {
                    if backend.health_check().is_alive() {
                        return Ok(());
                    }
                    std::thread::sleep(interval);
                }
                error!(backend = %backend.kind(), attempts, "TTS server did not start within the expected time");
                Err(SynthError::BackendUnreachable(format!(
                    "{} did not become ready after {} polls",
                    backend.kind(),
                    attempts
                )))
            }
        }
    }

    /// Switch to `voice` unless it is already the loaded one. Returns whether a switch happened.
    pub fn ensure_voice(
        &self,
        backend: &mut dyn TtsBackend,
        session: &mut BackendSession,
        voice: &ResolvedVoice,
        accent: Option<&str>,
    ) -> SynthResult<bool> {
        if session.loaded_voice() == Some(voice.identity.as_str()) {
            return Ok(false);
        }
        // Whatever the server holds after a failed switch, it is not the old voice.
        session.clear_loaded_voice();
        backend.switch_voice(session, voice, accent)?;
        session.set_loaded_voice(&voice.identity);
        Ok(true)
    }

    /// Force the last active voice back in after a restart.
    pub fn reload_voice(&self, backend: &mut dyn TtsBackend, session: &mut BackendSession) -> SynthResult<()> {
        let Some(identity) = session.loaded_voice().map(str::to_string) else {
            return Ok(());
        };
        let voice = ResolvedVoice {
            identity,
            backend: backend.kind(),
            tier: SourceTier::Regular,
        };
        if let Err(e) = backend.switch_voice(session, &voice, None) {
            session.clear_loaded_voice();
            return Err(e);
        }
        Ok(())
    }
}
