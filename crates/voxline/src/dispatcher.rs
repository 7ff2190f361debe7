//! **Synthesis Dispatcher** - phrases in, one WAV out.
//!
//! A single phrase goes straight to the final path. Several phrases are written
//! to `out_part<N>.wav` files (one batch request when the backend supports it)
//! and merged in reading order. Every backend call runs under the retry policy;
//! a phrase that still fails is skipped and reported, never fatal, unless the
//! recovery itself hit an unrecoverable error.

use crate::audio::merge_clips;
use crate::backend::{PhraseJob, TtsBackend};
use crate::error::{SynthError, SynthResult};
use crate::process::BackendProcessManager;
use crate::retry::RetryPolicy;
use crate::session::BackendSession;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, warn};

/// What a dispatch produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    pub phrase_count: usize,
    /// Phrases with no audio in the final file.
    pub skipped_phrases: Vec<String>,
}

/// Temp file for phrase `index` next to `final_path`.
pub fn part_path(final_path: &Path, index: usize) -> PathBuf {
    let dir = final_path.parent().unwrap_or_else(|| Path::new("."));
    let stem = final_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    dir.join(format!("{}_part{}.wav", stem, index))
}

struct CallContext<'a> {
    backend: &'a mut dyn TtsBackend,
    session: &'a mut BackendSession,
}

pub struct SynthesisDispatcher {
    retry: RetryPolicy,
    manager: BackendProcessManager,
}

impl SynthesisDispatcher {
    pub fn new(retry: RetryPolicy, manager: BackendProcessManager) -> Self {
        Self { retry, manager }
    }

    /// Synthesize `phrases` into `final_path`.
    pub fn dispatch(
        &self,
        backend: &mut dyn TtsBackend,
        session: &mut BackendSession,
        phrases: &[String],
        final_path: &Path,
        in_combat: bool,
    ) -> SynthResult<DispatchOutcome> {
        let started = Instant::now();
        let mut outcome = DispatchOutcome {
            phrase_count: phrases.len(),
            skipped_phrases: Vec::new(),
        };

        match phrases {
            [] => {}
            [only] => {
                let job = PhraseJob {
                    text: only.clone(),
                    path: final_path.to_path_buf(),
                };
                if !self.run_single(backend, session, &job, in_combat)? {
                    outcome.skipped_phrases.push(only.clone());
                }
            }
            _ => {
                let jobs: Vec<PhraseJob> = phrases
                    .iter()
                    .enumerate()
                    .map(|(i, text)| PhraseJob {
                        text: text.clone(),
                        path: part_path(final_path, i),
                    })
                    .collect();
                for job in &jobs {
                    remove_if_present(&job.path);
                }

                if backend.supports_batch(session) {
                    self.run_batch(backend, session, &jobs, in_combat)?;
                } else {
                    for job in &jobs {
                        self.run_single(backend, session, job, in_combat)?;
                    }
                }

                let (written, missing): (Vec<&PhraseJob>, Vec<&PhraseJob>) =
                    jobs.iter().partition(|j| j.path.exists());
                outcome.skipped_phrases = missing.iter().map(|j| j.text.clone()).collect();
                let clips: Vec<&Path> = written.iter().map(|j| j.path.as_path()).collect();
                merge_clips(clips.as_slice(), final_path)?;
                for job in &jobs {
                    remove_if_present(&job.path);
                }
            }
        }

        if !outcome.skipped_phrases.is_empty() {
            warn!(skipped = outcome.skipped_phrases.len(), total = outcome.phrase_count, "Some phrases were skipped");
        }
        debug!(
            phrases = outcome.phrase_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dispatch finished"
        );
        Ok(outcome)
    }

    /// One phrase under the retry policy. `Ok(false)` means it was skipped.
    fn run_single(
        &self,
        backend: &mut dyn TtsBackend,
        session: &mut BackendSession,
        job: &PhraseJob,
        in_combat: bool,
    ) -> SynthResult<bool> {
        let mut ctx = CallContext { backend, session };
        let result = self.retry.run(
            "synthesis",
            &mut ctx,
            |c| c.backend.synthesize_one(c.session, &job.text, &job.path, in_combat),
            |c, _| self.recover(c),
        );
        settle(result, &job.text)
    }

    fn run_batch(
        &self,
        backend: &mut dyn TtsBackend,
        session: &mut BackendSession,
        jobs: &[PhraseJob],
        in_combat: bool,
    ) -> SynthResult<bool> {
        let mut ctx = CallContext { backend, session };
        let result = self.retry.run(
            "batch synthesis",
            &mut ctx,
            |c| c.backend.synthesize_batch(c.session, jobs, in_combat),
            |c, _| self.recover(c),
        );
        let label = format!("{} batched phrases", jobs.len());
        settle(result, &label)
    }

    fn recover(&self, ctx: &mut CallContext<'_>) -> SynthResult<()> {
        self.manager.restart(ctx.backend, ctx.session)?;
        self.manager.reload_voice(ctx.backend, ctx.session)
    }
}

/// Unrecoverable errors propagate; anything else is a logged skip.
fn settle(result: SynthResult<()>, what: &str) -> SynthResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_unrecoverable() => Err(e),
        Err(SynthError::PhraseRejected { status, phrase }) => {
            error!(status, "Backend rejected phrase; skipping: {}", phrase);
            Ok(false)
        }
        Err(e) => {
            error!(error = %e, "Failed to synthesize; skipping: {}", what);
            Ok(false)
        }
    }
}

fn remove_if_present(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Could not remove stale clip");
        }
    }
}
