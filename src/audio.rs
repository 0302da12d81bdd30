//! Audio output.
//!
//! `Waveform` is the pipeline's product: mono 16-bit PCM at the voice's
//! fixed rate. An `AudioSink` is where a voice delivers finished
//! utterances; the queue guarantees one `play` at a time per voice.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};

use crate::pipeline::{ProcessError, UtteranceProcessor};
use crate::utterance::Utterance;

/// Mono 16-bit PCM audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl Waveform {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Write a mono 16-bit PCM WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Cannot create WAV: {}", path.display()))?;
        for &s in &self.samples {
            writer.write_sample(s).context("WAV write error")?;
        }
        writer.finalize().context("WAV finalize error")?;
        Ok(())
    }
}

/// Destination for finished audio. A voice calls `play` from its single
/// consumer thread, one utterance at a time.
pub trait AudioSink: Send + Sync {
    fn play(&self, wave: &Waveform) -> Result<()>;
}

/// Writes every utterance to the same WAV path; each play overwrites the
/// previous file.
pub struct WavFileSink {
    path: PathBuf,
}

impl WavFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WavFileSink { path: path.into() }
    }
}

impl AudioSink for WavFileSink {
    fn play(&self, wave: &Waveform) -> Result<()> {
        wave.write_wav(&self.path)
    }
}

/// Collects waveforms in memory. Clones share the same store, so a handle
/// kept by the caller sees what the voice played.
#[derive(Clone, Default)]
pub struct MemorySink {
    store: Arc<Mutex<Vec<Waveform>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    /// Snapshot of everything played so far.
    pub fn waveforms(&self) -> Vec<Waveform> {
        self.store.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl AudioSink for MemorySink {
    fn play(&self, wave: &Waveform) -> Result<()> {
        let mut store = self.store.lock().map_err(|_| anyhow!("sink store poisoned"))?;
        store.push(wave.clone());
        Ok(())
    }
}

/// Discards everything. Useful for timing runs and tests.
pub struct NullSink;

impl AudioSink for NullSink {
    fn play(&self, _wave: &Waveform) -> Result<()> {
        Ok(())
    }
}

/// Final pipeline stage: hand the utterance's waveform to the sink.
pub struct AudioOutput {
    sink: Arc<dyn AudioSink>,
}

impl AudioOutput {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        AudioOutput { sink }
    }
}

impl UtteranceProcessor for AudioOutput {
    fn name(&self) -> &'static str {
        "audio_output"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let wave = utt.waveform.as_ref().ok_or(ProcessError::NoWaveform)?;
        self.sink
            .play(wave)
            .map_err(|e| ProcessError::Audio(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;

    fn ramp(n: usize) -> Waveform {
        Waveform {
            sample_rate: 8000,
            samples: (0..n).map(|i| i as i16 * 3).collect(),
        }
    }

    #[test]
    fn test_wav_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let wave = ramp(64);
        wave.write_wav(&path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, wave.samples);
    }

    #[test]
    fn test_duration() {
        assert!((ramp(4000).duration_secs() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        sink.play(&ramp(8)).unwrap();
        sink.play(&ramp(16)).unwrap();
        let waves = sink.waveforms();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[1].samples.len(), 16);
    }

    #[test]
    fn test_audio_output_plays_to_sink() {
        let sink = MemorySink::new();
        let stage = AudioOutput::new(Arc::new(sink.clone()));
        let mut utt = Utterance::new("", Arc::new(FeatureSet::new()));
        utt.waveform = Some(ramp(8));
        stage.process(&mut utt).unwrap();
        assert_eq!(sink.waveforms().len(), 1);
    }

    #[test]
    fn test_audio_output_without_waveform_fails() {
        let stage = AudioOutput::new(Arc::new(NullSink));
        let mut utt = Utterance::new("", Arc::new(FeatureSet::new()));
        let err = stage.process(&mut utt).unwrap_err();
        assert!(matches!(err, ProcessError::NoWaveform));
    }
}
