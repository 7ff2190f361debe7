//! **Lip-Sync Invoker** - `.lip` generation through FaceFXWrapper.
//!
//! The wrapper is run through a small script written next to it. Every argument
//! is quoted for the script's shell, so dialogue text reaches the tool verbatim
//! and is never expanded or executed.

use crate::config::SynthConfig;
use crate::error::{SynthError, SynthResult};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error, info, warn};

pub const WRAPPER_EXECUTABLE: &str = "FaceFXWrapper.exe";
pub const PHONEME_DATA_FILE: &str = "FonixData.cdf";
const SCRIPT_STEM: &str = "run_voxline_command";

#[derive(Debug, Clone)]
pub struct LipSyncInvoker {
    tool_dir: PathBuf,
    game: String,
    language_tag: String,
}

/// Quote one argument for a POSIX `sh` script. Nothing inside single quotes expands.
fn sh_quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Quote one argument for a `.bat` script. `%` still expands inside double quotes.
fn bat_quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('%', "%%"))
}

fn script_quoted(value: &str) -> String {
    if cfg!(windows) {
        bat_quoted(value)
    } else {
        sh_quoted(value)
    }
}

/// `out.wav` → `out_r.wav`
fn resampled_path(wav: &Path) -> PathBuf {
    let stem = wav
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    wav.with_file_name(format!("{}_r.wav", stem))
}

impl LipSyncInvoker {
    pub fn new(tool_dir: impl Into<PathBuf>, game: impl Into<String>, language_tag: impl Into<String>) -> Self {
        Self {
            tool_dir: tool_dir.into(),
            game: game.into(),
            language_tag: language_tag.into(),
        }
    }

    pub fn from_config(config: &SynthConfig) -> Self {
        Self::new(
            config.lip_tool_dir(),
            config.game.folder_name(),
            config.lipsync.language_tag.clone(),
        )
    }

    pub fn tool_dir(&self) -> &Path {
        &self.tool_dir
    }

    /// Both the phoneme data and the wrapper must sit in the tool folder.
    pub fn check_prerequisites(&self) -> SynthResult<()> {
        let data = self.tool_dir.join(PHONEME_DATA_FILE);
        if !data.exists() {
            error!(
                "Could not find {} in '{}', required by FaceFXWrapper. Install the LipFuz plugin of your TTS backend.",
                PHONEME_DATA_FILE,
                self.tool_dir.display()
            );
            return Err(SynthError::LipSyncToolMissing(data));
        }
        let exe = self.tool_dir.join(WRAPPER_EXECUTABLE);
        if !exe.exists() {
            error!(
                "Could not find {} in '{}'. Download it from https://github.com/Nukem9/FaceFXWrapper/releases",
                WRAPPER_EXECUTABLE,
                self.tool_dir.display()
            );
            return Err(SynthError::LipSyncToolMissing(exe));
        }
        Ok(())
    }

    /// The eight positional arguments, unquoted. Double quotes in `text` become single quotes.
    pub fn command_args(&self, wav: &Path, text: &str) -> Vec<String> {
        let lip = wav.with_extension("lip");
        vec![
            self.executable_token(),
            self.game.clone(),
            self.language_tag.clone(),
            PHONEME_DATA_FILE.to_string(),
            wav.display().to_string(),
            resampled_path(wav).display().to_string(),
            lip.display().to_string(),
            text.replace('"', "'"),
        ]
    }

    /// The script line: executable followed by its quoted arguments.
    pub fn command_line(&self, wav: &Path, text: &str) -> String {
        let mut args = self.command_args(wav, text).into_iter();
        let mut line = args.next().unwrap_or_default();
        for arg in args {
            line.push(' ');
            line.push_str(&script_quoted(&arg));
        }
        line
    }

    fn executable_token(&self) -> String {
        if cfg!(windows) {
            WRAPPER_EXECUTABLE.to_string()
        } else {
            format!("./{}", WRAPPER_EXECUTABLE)
        }
    }

    fn script_path(&self) -> PathBuf {
        let ext = if cfg!(windows) { "bat" } else { "sh" };
        self.tool_dir.join(format!("{}.{}", SCRIPT_STEM, ext))
    }

    fn script_body(command: &str) -> String {
        if cfg!(windows) {
            format!("@echo off\n{} >nul 2>&1\n", command)
        } else {
            format!("#!/bin/sh\n{} >/dev/null 2>&1\n", command)
        }
    }

    /// Write the command script; returns its path.
    pub fn write_script(&self, wav: &Path, text: &str) -> SynthResult<PathBuf> {
        let command = self.command_line(wav, text);
        let script = self.script_path();
        std::fs::write(&script, Self::script_body(&command))?;
        debug!(script = %script.display(), "Lip-sync script written");
        Ok(script)
    }

    /// Produce `<wav stem>.lip` for `wav`.
    pub fn generate(&self, wav: &Path, text: &str) -> SynthResult<PathBuf> {
        self.check_prerequisites()?;
        let script = self.write_script(wav, text)?;

        let mut cmd = if cfg!(windows) {
            Command::new(&script)
        } else {
            let mut c = Command::new("sh");
            c.arg(&script);
            c
        };
        let status = cmd
            .current_dir(&self.tool_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| SynthError::Process(format!("lip-sync tool failed to start: {}", e)))?;

        let scratch = resampled_path(wav);
        if scratch.exists() {
            if let Err(e) = std::fs::remove_file(&scratch) {
                warn!(path = %scratch.display(), error = %e, "Could not remove lip-sync scratch file");
            }
        }

        let lip = wav.with_extension("lip");
        if lip.exists() {
            info!(lip = %lip.display(), "👄 Lip file generated");
            Ok(lip)
        } else {
            Err(SynthError::Process(format!(
                "lip-sync tool exited with {} and wrote no '{}'",
                status,
                lip.display()
            )))
        }
    }
}
