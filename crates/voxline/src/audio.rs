//! **Audio post-processing** - 16-bit normalization and clip merging.
//!
//! The game only plays 16-bit PCM, so anything else the backend hands us is
//! converted before it is written to the voicelines folder.

use crate::error::SynthResult;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, error};

/// Signed 16-bit full scale used when converting float samples.
pub const I16_SCALE: f32 = i16::MAX as f32;

/// Float sample in [-1.0, 1.0] → i16, scaled by 32767 and saturated.
pub fn float_to_i16(sample: f32) -> i16 {
    (sample * I16_SCALE) as i16
}

/// Integer sample of any width → i16 without rescaling, saturated.
pub fn int_to_i16(sample: i32) -> i16 {
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Decoded clip normalized to 16-bit PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct Pcm16Clip {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl Pcm16Clip {
    pub fn spec(&self) -> WavSpec {
        pcm16_spec(self.sample_rate, self.channels)
    }

    pub fn write(&self, path: &Path) -> SynthResult<()> {
        write_pcm16(path, self.spec(), &self.samples)
    }
}

fn pcm16_spec(sample_rate: u32, channels: u16) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn decode<R: Read>(reader: WavReader<R>) -> SynthResult<Pcm16Clip> {
    let spec = reader.spec();
    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .into_samples::<f32>()
            .map(|s| s.map(float_to_i16))
            .collect::<Result<Vec<_>, _>>()?,
        (SampleFormat::Int, 16) => reader.into_samples::<i16>().collect::<Result<Vec<_>, _>>()?,
        (SampleFormat::Int, _) => reader
            .into_samples::<i32>()
            .map(|s| s.map(int_to_i16))
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(Pcm16Clip {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        samples,
    })
}

/// Read a WAV file as 16-bit PCM.
pub fn read_pcm16(path: &Path) -> SynthResult<Pcm16Clip> {
    decode(WavReader::open(path)?)
}

/// Read in-memory WAV bytes as 16-bit PCM.
pub fn decode_pcm16(bytes: &[u8]) -> SynthResult<Pcm16Clip> {
    decode(WavReader::new(Cursor::new(bytes))?)
}

pub fn write_pcm16(path: &Path, spec: WavSpec, samples: &[i16]) -> SynthResult<()> {
    let mut writer = WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Rewrite `input` as 16-bit PCM at `output` (or in place when `output` is `None`).
pub fn convert_to_16bit(input: &Path, output: Option<&Path>) -> SynthResult<()> {
    let clip = read_pcm16(input)?;
    clip.write(output.unwrap_or(input))
}

/// Decode backend audio bytes and write them as 16-bit PCM to `output`.
pub fn convert_bytes_to_16bit(bytes: &[u8], output: &Path) -> SynthResult<()> {
    decode_pcm16(bytes)?.write(output)
}

/// Concatenate clips in order into `output` at the first readable clip's format.
///
/// Unreadable clips are logged and left out. Returns the number of samples
/// written; nothing is written when no clip could be read.
pub fn merge_clips<P: AsRef<Path>>(clips: &[P], output: &Path) -> SynthResult<usize> {
    let mut spec: Option<WavSpec> = None;
    let mut merged: Vec<i16> = Vec::new();

    for clip_path in clips {
        let clip_path = clip_path.as_ref();
        match read_pcm16(clip_path) {
            Ok(clip) => {
                spec.get_or_insert_with(|| clip.spec());
                merged.extend_from_slice(&clip.samples);
            }
            Err(e) => error!(clip = %clip_path.display(), error = %e, "Could not read voiceline clip"),
        }
    }

    match spec {
        Some(spec) => {
            write_pcm16(output, spec, &merged)?;
            debug!(clips = clips.len(), samples = merged.len(), output = %output.display(), "Merged clips");
            Ok(merged.len())
        }
        None => {
            error!(output = %output.display(), "No readable clips to merge");
            Ok(0)
        }
    }
}
