//! voxline CLI: synthesize one voice line and print where it landed.
//!
//! Usage:
//!   voxline --text "I'll get my sword, and potions ready" --voice "Female Even Toned"
//!           [--ingame-voice MaleNord] [--advanced-voice Lydia] [--accent fr] [--combat]
//!           [--roster characters.csv] [--config config/voxline.toml]
//!
//! Settings come from the TOML file plus `VOXLINE_*` environment overrides (`.env` is loaded).

use anyhow::Context;
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use voxline::{CharacterVoices, SynthConfig, SynthError, Synthesizer, VoiceRequest};

#[derive(Debug, Default)]
struct CliArgs {
    text: Option<String>,
    voice: Option<String>,
    in_game_voice: Option<String>,
    advanced_voice: Option<String>,
    accent: Option<String>,
    combat: bool,
    roster: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let mut cli = CliArgs::default();
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        match a.as_str() {
            "--text" => cli.text = args.next(),
            "--voice" => cli.voice = args.next(),
            "--ingame-voice" => cli.in_game_voice = args.next(),
            "--advanced-voice" => cli.advanced_voice = args.next(),
            "--accent" => cli.accent = args.next(),
            "--combat" => cli.combat = true,
            "--roster" => cli.roster = args.next().map(PathBuf::from),
            "--config" => cli.config = args.next().map(PathBuf::from),
            other => eprintln!("Ignoring unknown argument: {}", other),
        }
    }
    cli
}

fn print_usage() {
    eprintln!("voxline - voice-line synthesis");
    eprintln!("  --text \"...\"            Voice line to synthesize (required)");
    eprintln!("  --voice NAME            Character voice model");
    eprintln!("  --ingame-voice NAME     In-game voice folder used as fallback");
    eprintln!("  --advanced-voice NAME   Advanced voice model (XTTS only)");
    eprintln!("  --accent CODE           Accent / language override (XTTS, when enabled)");
    eprintln!("  --combat                Speak with the in-combat emotion hint");
    eprintln!("  --roster FILE           Character CSV (voice_model, advanced_voice_model)");
    eprintln!("  --config FILE           Config file (default: VOXLINE_CONFIG or config/voxline.toml)");
}

fn wait_for_acknowledgement() {
    eprintln!("\nPress Enter to exit...");
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
}

fn run(cli: CliArgs) -> anyhow::Result<()> {
    let Some(text) = cli.text else {
        print_usage();
        return Ok(());
    };

    let config = match &cli.config {
        Some(path) => SynthConfig::load_from(path),
        None => SynthConfig::load(),
    }
    .context("loading voxline configuration")?;
    info!(backend = %config.service, game = ?config.game, "voxline starting");

    let roster = match &cli.roster {
        Some(path) => CharacterVoices::from_csv(path)
            .with_context(|| format!("reading roster {}", path.display()))?,
        None => CharacterVoices {
            voice_models: cli.voice.iter().chain(cli.in_game_voice.iter()).cloned().collect(),
            advanced_voice_models: cli.advanced_voice.iter().cloned().collect(),
        },
    };

    let mut request = VoiceRequest::new(text).in_combat(cli.combat);
    if let Some(v) = cli.voice {
        request = request.with_voice(v);
    }
    if let Some(v) = cli.in_game_voice {
        request = request.with_in_game_voice(v);
    }
    if let Some(v) = cli.advanced_voice {
        request = request.with_advanced_voice(v);
    }
    if let Some(a) = cli.accent {
        request = request.with_accent(a);
    }

    let mut synthesizer = Synthesizer::from_config(config, roster)?;
    let artifact = synthesizer.synthesize(&request)?;

    println!("audio: {}", artifact.audio_path.display());
    match &artifact.lip_path {
        Some(lip) => println!("lip:   {}", lip.display()),
        None => println!("lip:   (not generated)"),
    }
    if !artifact.skipped_phrases.is_empty() {
        println!(
            "skipped {} of {} phrases",
            artifact.skipped_phrases.len(),
            artifact.phrase_count
        );
    }
    Ok(())
}

fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(parse_args()) {
        error!("{:#}", e);
        let fatal = e
            .downcast_ref::<SynthError>()
            .map(SynthError::is_unrecoverable)
            .unwrap_or(false);
        if fatal {
            wait_for_acknowledgement();
        }
        std::process::exit(1);
    }
}
