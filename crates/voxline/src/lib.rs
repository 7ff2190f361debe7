//! # voxline - Voice-Line Synthesis Orchestrator
//!
//! Turns generated dialogue plus a character's voice identity into a game-ready
//! `out.wav` and a matching `out.lip`, driving one of two local TTS servers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Synthesizer                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐    │
//! │  │ VoiceRequest │→ │    Voice     │→ │ BackendProcessManager │    │
//! │  │              │  │   Resolver   │  │ (health/launch/switch)│    │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘    │
//! │         ↓                                        ↓                │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐    │
//! │  │  Segmenter   │→ │  Dispatcher  │→ │ TtsBackend (local or  │    │
//! │  │  (phrases)   │  │ + RetryPolicy│  │ remote HTTP server)   │    │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘    │
//! │                           ↓                                       │
//! │  ┌──────────────┐  ┌──────────────┐                               │
//! │  │ Audio merge  │→ │   Lip-sync   │→  out.wav + out.lip           │
//! │  │  (16-bit)    │  │ (FaceFX tool)│                               │
//! │  └──────────────┘  └──────────────┘                               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `Synthesizer` takes `&mut self` per request; wrap it in a `Mutex` to share it.

pub mod audio;
pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lipsync;
pub mod model;
pub mod playback;
pub mod process;
pub mod retry;
pub mod segmenter;
pub mod session;
pub mod speakers;
pub mod synthesizer;
pub mod voice;

pub use audio::{convert_bytes_to_16bit, convert_to_16bit, merge_clips, Pcm16Clip};
pub use backend::{HealthStatus, LocalSynthBackend, PhraseJob, Readiness, RemoteServerBackend, TtsBackend};
pub use bootstrap::{LegacyModelBootstrap, ModelLoader};
pub use config::{BackendKind, Game, SynthConfig};
pub use dispatcher::{DispatchOutcome, SynthesisDispatcher};
pub use error::{SynthError, SynthResult};
pub use lipsync::LipSyncInvoker;
pub use model::VoiceModelDescriptor;
pub use process::BackendProcessManager;
pub use retry::RetryPolicy;
pub use segmenter::{group_phrases, segment, DEFAULT_MAX_PHRASE_LENGTH};
pub use session::{BackendSession, ModelState, ProcessState};
pub use speakers::{CharacterVoices, SpeakerCatalog};
pub use synthesizer::{SynthesisArtifact, Synthesizer};
pub use voice::{resolve, KnownSpeakers, ResolvedVoice, SourceTier, VoiceRequest};
