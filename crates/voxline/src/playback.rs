//! Debug playback of the finished voice line.

use crate::error::SynthResult;
use std::path::Path;

/// Play `path` to the default output device and block until it finishes.
#[cfg(feature = "playback")]
pub fn play_file(path: &Path) -> SynthResult<()> {
    use crate::error::SynthError;
    use rodio::{Decoder, OutputStream, Sink};
    use std::io::BufReader;

    let (_stream, handle) =
        OutputStream::try_default().map_err(|e| SynthError::Process(format!("audio output: {}", e)))?;
    let sink = Sink::try_new(&handle).map_err(|e| SynthError::Process(format!("audio sink: {}", e)))?;
    let file = std::fs::File::open(path)?;
    let source = Decoder::new(BufReader::new(file))
        .map_err(|e| SynthError::Process(format!("decode '{}': {}", path.display(), e)))?;
    sink.append(source);
    tracing::debug!(path = %path.display(), "🔊 Playing voice line");
    sink.sleep_until_end();
    Ok(())
}

#[cfg(not(feature = "playback"))]
pub fn play_file(path: &Path) -> SynthResult<()> {
    tracing::warn!(
        path = %path.display(),
        "debug_playback is set but voxline was built without the `playback` feature"
    );
    Ok(())
}
