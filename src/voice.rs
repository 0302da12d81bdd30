//! Voice lifecycle: configuration, resource loading, and the serial
//! synthesis queue.
//!
//! A [`Voice`] owns one pipeline (built once from a [`VoiceConfig`]) and one
//! consumer thread. [`Voice::speak`] enqueues a speakable and returns a
//! handle immediately; the thread drains the queue in FIFO order, running
//! the full pipeline on one utterance at a time. Shared resources (unit
//! database, lexicon, trees) load once at allocation and are never mutated
//! afterwards, so the only synchronisation is the queue itself.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::audio::{AudioOutput, AudioSink, NullSink, WavFileSink};
use crate::concat::{ClusterUnitConcatenator, DiphoneUnitConcatenator};
use crate::duration::{Durator, PhoneDurations};
use crate::features::FeatureSet;
use crate::intonation::Intonation;
use crate::lexicon::{PauseGenerator, Segmenter};
use crate::mbrola::MbrolaCaller;
use crate::normalize::TokenToWords;
use crate::phrase::{PartOfSpeechTagger, Phraser};
use crate::pipeline::{run_pipeline, UtteranceProcessor};
use crate::postlex::PostLexicalAnalyzer;
use crate::select::{ClusterUnitSelector, DiphoneUnitSelector};
use crate::tokenizer::TokenizerStage;
use crate::units::{ClusterUnitDatabase, DiphoneUnitDatabase};
use crate::utterance::Utterance;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Back-end flavour: which pair of selection/concatenation stages (or which
/// external stage) closes the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceKind {
    /// Exact-lookup diphone inventory (binary dump database).
    Diphone,
    /// Clustered unit inventory (text catalog database).
    Cluster,
    /// External MBROLA-compatible synthesizer over pipes.
    Mbrola,
}

/// Deserialised voice descriptor. Every field except `kind` has a default,
/// so a JSON descriptor only names what it changes.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    pub kind: VoiceKind,

    /// Voice name, used for the worker thread and logs.
    #[serde(default = "default_name")]
    pub name: String,

    /// Baseline F0 in Hz.
    #[serde(default = "default_pitch")]
    pub pitch: f32,

    /// F0 excursion above the baseline in Hz.
    #[serde(default = "default_pitch_range")]
    pub pitch_range: f32,

    /// Global tempo multiplier; 2.0 speaks twice as slowly.
    #[serde(default = "default_duration_stretch")]
    pub duration_stretch: f32,

    /// Output rate for external synthesis. Unit databases carry their own
    /// rate and ignore this.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Binary diphone dump, required when `kind` is `diphone`.
    #[serde(default)]
    pub diphone_database: Option<PathBuf>,

    /// Text unit catalog, required when `kind` is `cluster`.
    #[serde(default)]
    pub cluster_database: Option<PathBuf>,

    /// External synthesizer binary, required when `kind` is `mbrola`.
    #[serde(default)]
    pub mbrola_program: Option<PathBuf>,

    /// Database argument passed to the external synthesizer.
    #[serde(default)]
    pub mbrola_database: Option<PathBuf>,

    /// Optional `phone mean stddev` file overriding the built-in phone
    /// duration statistics.
    #[serde(default)]
    pub duration_stats: Option<PathBuf>,

    /// WAV path for [`Voice::allocate`]; `None` discards the audio (use
    /// [`Voice::allocate_with_sink`] for anything else).
    #[serde(default)]
    pub output: Option<PathBuf>,
}

fn default_name() -> String {
    "unitvox".to_string()
}

fn default_pitch() -> f32 {
    100.0
}

fn default_pitch_range() -> f32 {
    11.0
}

fn default_duration_stretch() -> f32 {
    1.0
}

fn default_sample_rate() -> u32 {
    16_000
}

impl VoiceConfig {
    fn base(kind: VoiceKind) -> Self {
        VoiceConfig {
            kind,
            name: default_name(),
            pitch: default_pitch(),
            pitch_range: default_pitch_range(),
            duration_stretch: default_duration_stretch(),
            sample_rate: default_sample_rate(),
            diphone_database: None,
            cluster_database: None,
            mbrola_program: None,
            mbrola_database: None,
            duration_stats: None,
            output: None,
        }
    }

    /// A diphone voice reading its inventory from `database`.
    pub fn diphone(database: impl Into<PathBuf>) -> Self {
        let mut config = VoiceConfig::base(VoiceKind::Diphone);
        config.diphone_database = Some(database.into());
        config
    }

    /// A cluster-unit voice reading its catalog from `database`.
    pub fn cluster(database: impl Into<PathBuf>) -> Self {
        let mut config = VoiceConfig::base(VoiceKind::Cluster);
        config.cluster_database = Some(database.into());
        config
    }

    /// A voice that delegates synthesis to an external binary.
    pub fn mbrola(program: impl Into<PathBuf>, database: impl Into<PathBuf>) -> Self {
        let mut config = VoiceConfig::base(VoiceKind::Mbrola);
        config.mbrola_program = Some(program.into());
        config.mbrola_database = Some(database.into());
        config
    }

    /// Parse a JSON voice descriptor.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse voice descriptor")
    }

    /// Read and parse a JSON voice descriptor file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Cannot read voice descriptor: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse voice descriptor: {}", path.display()))
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_pitch(mut self, pitch: f32, range: f32) -> Self {
        self.pitch = pitch;
        self.pitch_range = range;
        self
    }

    pub fn with_duration_stretch(mut self, stretch: f32) -> Self {
        self.duration_stretch = stretch;
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Speakable handles
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal state of one speakable.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeakStatus {
    /// The full pipeline ran and the sink received the audio.
    Completed,
    /// Cancelled at a stage boundary; no audio was emitted.
    Cancelled,
    /// A stage failed; the queue keeps running.
    Failed(String),
}

#[derive(Default)]
struct SpeakState {
    status: Mutex<Option<SpeakStatus>>,
    done: Condvar,
}

impl SpeakState {
    fn finish(&self, status: SpeakStatus) {
        let mut slot = self.status.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(status);
        self.done.notify_all();
    }
}

/// Caller's view of one enqueued utterance.
pub struct SpeakableHandle {
    cancelled: Arc<AtomicBool>,
    state: Arc<SpeakState>,
}

impl SpeakableHandle {
    /// Request cancellation. Takes effect at the next stage boundary; a
    /// speakable still waiting in the queue never starts at all.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Block until the speakable reaches a terminal state.
    pub fn wait(&self) -> SpeakStatus {
        let mut slot = self.state.status.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(status) = slot.as_ref() {
                return status.clone();
            }
            slot = self.state.done.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Non-blocking peek; `None` while still queued or synthesising.
    pub fn status(&self) -> Option<SpeakStatus> {
        let slot = self.state.status.lock().unwrap_or_else(|e| e.into_inner());
        slot.clone()
    }
}

struct SpeakJob {
    text: String,
    cancelled: Arc<AtomicBool>,
    state: Arc<SpeakState>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Voice
// ─────────────────────────────────────────────────────────────────────────────

/// An allocated voice: loaded resources, a pipeline, and a worker thread
/// draining the speak queue in FIFO order.
#[derive(Debug)]
pub struct Voice {
    name: String,
    features: Arc<FeatureSet>,
    queue: Option<mpsc::Sender<SpeakJob>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Voice {
    /// Load the voice's resources and start its worker thread. Audio goes
    /// to `config.output` as a WAV file, or nowhere if unset.
    pub fn allocate(config: VoiceConfig) -> Result<Voice> {
        let sink: Arc<dyn AudioSink> = match &config.output {
            Some(path) => Arc::new(WavFileSink::new(path)),
            None => Arc::new(NullSink),
        };
        Voice::allocate_with_sink(config, sink)
    }

    /// As [`Voice::allocate`], delivering audio to the given sink.
    pub fn allocate_with_sink(config: VoiceConfig, sink: Arc<dyn AudioSink>) -> Result<Voice> {
        let stages = build_stages(&config, sink)?;

        let mut features = FeatureSet::new();
        features.set_string("name", &config.name);
        features.set_float("pitch", config.pitch);
        features.set_float("pitch_range", config.pitch_range);
        features.set_float("duration_stretch", config.duration_stretch);
        let features = Arc::new(features);

        let (tx, rx) = mpsc::channel();
        let thread_features = Arc::clone(&features);
        let worker = thread::Builder::new()
            .name(format!("voice-{}", config.name))
            .spawn(move || worker_loop(rx, stages, thread_features))
            .context("Cannot spawn voice worker thread")?;

        info!(voice = %config.name, kind = ?config.kind, "voice allocated");
        Ok(Voice {
            name: config.name,
            features,
            queue: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The read-only feature snapshot every utterance starts from.
    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Enqueue text for synthesis and return immediately. The handle
    /// resolves to [`SpeakStatus::Failed`] if the voice is deallocated.
    pub fn speak(&self, text: &str) -> SpeakableHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let state = Arc::new(SpeakState::default());
        let handle = SpeakableHandle {
            cancelled: Arc::clone(&cancelled),
            state: Arc::clone(&state),
        };
        let job = SpeakJob {
            text: text.to_string(),
            cancelled,
            state,
        };
        match &self.queue {
            Some(tx) => {
                if let Err(mpsc::SendError(job)) = tx.send(job) {
                    warn!(voice = %self.name, "speak on a closed queue");
                    job.state.finish(SpeakStatus::Failed("voice queue is closed".to_string()));
                } else {
                    debug!(voice = %self.name, chars = text.len(), "speakable enqueued");
                }
            }
            None => {
                warn!(voice = %self.name, "speak on a deallocated voice");
                job.state
                    .finish(SpeakStatus::Failed("voice is deallocated".to_string()));
            }
        }
        handle
    }

    /// Stop accepting speakables, drain the queue, and join the worker.
    /// Called automatically on drop; safe to call more than once.
    pub fn deallocate(&mut self) {
        drop(self.queue.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(voice = %self.name, "voice worker panicked");
            }
            info!(voice = %self.name, "voice deallocated");
        }
    }
}

impl Drop for Voice {
    fn drop(&mut self) {
        self.deallocate();
    }
}

fn worker_loop(
    rx: mpsc::Receiver<SpeakJob>,
    stages: Vec<Box<dyn UtteranceProcessor>>,
    features: Arc<FeatureSet>,
) {
    while let Ok(job) = rx.recv() {
        let mut utt = Utterance::new(&job.text, Arc::clone(&features));
        let status = match run_pipeline(&stages, &mut utt, &job.cancelled) {
            Ok(true) => SpeakStatus::Completed,
            Ok(false) => {
                debug!("speakable cancelled");
                SpeakStatus::Cancelled
            }
            Err(e) => {
                warn!(error = %e, "utterance failed");
                SpeakStatus::Failed(e.to_string())
            }
        };
        job.state.finish(status);
    }
    debug!("voice queue drained");
}

/// The full stage list for a configuration: the shared text front end, the
/// configured back end, and the sink.
fn build_stages(
    config: &VoiceConfig,
    sink: Arc<dyn AudioSink>,
) -> Result<Vec<Box<dyn UtteranceProcessor>>> {
    let durator = match &config.duration_stats {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Cannot read duration stats: {}", path.display()))?;
            let stats = PhoneDurations::parse(&text)
                .with_context(|| format!("Bad duration stats: {}", path.display()))?;
            Durator::with_stats(Arc::new(stats))
        }
        None => Durator::default(),
    };

    let mut stages: Vec<Box<dyn UtteranceProcessor>> = vec![
        Box::new(TokenizerStage::default()),
        Box::new(TokenToWords::default()),
        Box::new(PartOfSpeechTagger::default()),
        Box::new(Phraser::default()),
        Box::new(Segmenter::default()),
        Box::new(PauseGenerator),
        Box::new(PostLexicalAnalyzer::default()),
        Box::new(durator),
        Box::new(Intonation::default()),
    ];

    match config.kind {
        VoiceKind::Diphone => {
            let path = config
                .diphone_database
                .as_deref()
                .context("diphone voice requires `diphone_database`")?;
            let db = Arc::new(DiphoneUnitDatabase::load(path)?);
            stages.push(Box::new(DiphoneUnitSelector::new(Arc::clone(&db))));
            stages.push(Box::new(DiphoneUnitConcatenator::new(db)));
        }
        VoiceKind::Cluster => {
            let path = config
                .cluster_database
                .as_deref()
                .context("cluster voice requires `cluster_database`")?;
            let db = Arc::new(ClusterUnitDatabase::load(path)?);
            stages.push(Box::new(ClusterUnitSelector::new(Arc::clone(&db))));
            stages.push(Box::new(ClusterUnitConcatenator::new(db)));
        }
        VoiceKind::Mbrola => {
            let program = config
                .mbrola_program
                .as_deref()
                .context("mbrola voice requires `mbrola_program`")?;
            let database = config
                .mbrola_database
                .as_deref()
                .context("mbrola voice requires `mbrola_database`")?;
            stages.push(Box::new(MbrolaCaller::new(
                program,
                database,
                config.sample_rate,
            )));
        }
    }

    stages.push(Box::new(AudioOutput::new(sink)));
    Ok(stages)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{MemorySink, Waveform};
    use crate::units::testutil::make_diphone_db;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;
    use tempfile::NamedTempFile;

    fn diphone_db_file() -> NamedTempFile {
        let db = make_diphone_db(&["pau-pau", "pau-w", "w-ah", "ah-n", "n-pau"]);
        let mut file = NamedTempFile::new().unwrap();
        db.write_to(file.as_file_mut()).unwrap();
        file
    }

    /// Blocks every `play` until the test sends a release.
    struct GateSink {
        gate: Mutex<mpsc::Receiver<()>>,
        played: AtomicUsize,
    }

    impl GateSink {
        fn new(gate: mpsc::Receiver<()>) -> Self {
            GateSink {
                gate: Mutex::new(gate),
                played: AtomicUsize::new(0),
            }
        }
    }

    impl AudioSink for GateSink {
        fn play(&self, _wave: &Waveform) -> Result<()> {
            self.gate.lock().unwrap().recv().ok();
            self.played.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails the first `play`, succeeds afterwards.
    struct FlakySink {
        calls: AtomicUsize,
        inner: MemorySink,
    }

    impl AudioSink for FlakySink {
        fn play(&self, wave: &Waveform) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(anyhow!("disk full"));
            }
            self.inner.play(wave)
        }
    }

    #[test]
    fn test_speak_completes_and_plays() {
        let db = diphone_db_file();
        let sink = MemorySink::new();
        let voice = Voice::allocate_with_sink(
            VoiceConfig::diphone(db.path()),
            Arc::new(sink.clone()),
        )
        .unwrap();

        let status = voice.speak("one").wait();
        assert_eq!(status, SpeakStatus::Completed);

        let waves = sink.waveforms();
        assert_eq!(waves.len(), 1);
        assert!(!waves[0].samples.is_empty());
        assert_eq!(waves[0].sample_rate, 16000);
    }

    #[test]
    fn test_cancel_while_queued() {
        let db = diphone_db_file();
        let (release, gate) = mpsc::channel();
        let sink = Arc::new(GateSink::new(gate));
        let voice =
            Voice::allocate_with_sink(VoiceConfig::diphone(db.path()), sink.clone()).unwrap();

        // First speakable blocks in the sink, so the second is still queued
        // when we cancel it.
        let first = voice.speak("one");
        let second = voice.speak("one");
        second.cancel();
        assert_eq!(second.status(), None);

        release.send(()).unwrap();
        assert_eq!(first.wait(), SpeakStatus::Completed);
        assert_eq!(second.wait(), SpeakStatus::Cancelled);
        assert_eq!(sink.played.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_does_not_kill_queue() {
        let db = diphone_db_file();
        let inner = MemorySink::new();
        let sink = Arc::new(FlakySink {
            calls: AtomicUsize::new(0),
            inner: inner.clone(),
        });
        let voice = Voice::allocate_with_sink(VoiceConfig::diphone(db.path()), sink).unwrap();

        let first = voice.speak("one");
        let second = voice.speak("one");
        match first.wait() {
            SpeakStatus::Failed(msg) => assert!(msg.contains("disk full")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(second.wait(), SpeakStatus::Completed);
        assert_eq!(inner.waveforms().len(), 1);
    }

    #[test]
    fn test_deallocate_drains_queue() {
        let db = diphone_db_file();
        let sink = MemorySink::new();
        let mut voice = Voice::allocate_with_sink(
            VoiceConfig::diphone(db.path()),
            Arc::new(sink.clone()),
        )
        .unwrap();

        let handles: Vec<_> = (0..3).map(|_| voice.speak("one")).collect();
        voice.deallocate();

        for handle in &handles {
            assert_eq!(handle.wait(), SpeakStatus::Completed);
        }
        assert_eq!(sink.waveforms().len(), 3);

        // Late speak fails without blocking.
        let late = voice.speak("one");
        assert!(matches!(late.wait(), SpeakStatus::Failed(_)));
    }

    #[test]
    fn test_voice_features_snapshot() {
        let db = diphone_db_file();
        let config = VoiceConfig::diphone(db.path())
            .with_name("kal16")
            .with_pitch(200.0, 30.0)
            .with_duration_stretch(1.5);
        let voice = Voice::allocate_with_sink(config, Arc::new(NullSink)).unwrap();

        assert_eq!(voice.name(), "kal16");
        assert_eq!(voice.features().float("pitch"), Some(200.0));
        assert_eq!(voice.features().float("pitch_range"), Some(30.0));
        assert_eq!(voice.features().float("duration_stretch"), Some(1.5));
    }

    #[test]
    fn test_config_from_json_applies_defaults() {
        let config = VoiceConfig::from_json(
            r#"{ "kind": "diphone", "diphone_database": "kal16.db", "pitch": 149.0 }"#,
        )
        .unwrap();
        assert_eq!(config.kind, VoiceKind::Diphone);
        assert_eq!(config.diphone_database.as_deref(), Some(Path::new("kal16.db")));
        assert_eq!(config.pitch, 149.0);
        assert_eq!(config.pitch_range, 11.0);
        assert_eq!(config.duration_stretch, 1.0);
        assert_eq!(config.name, "unitvox");
        assert!(config.output.is_none());
    }

    #[test]
    fn test_allocate_rejects_missing_database() {
        let mut config = VoiceConfig::base(VoiceKind::Diphone);
        let err = Voice::allocate(config.clone()).unwrap_err();
        assert!(err.to_string().contains("diphone_database"));

        config.diphone_database = Some(PathBuf::from("/no/such/file.db"));
        assert!(Voice::allocate(config).is_err());
    }

    #[test]
    fn test_custom_duration_stats() {
        let db = diphone_db_file();
        let mut stats = NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut stats, b"pau 0.2 0.1\nah 0.3 0.05\n").unwrap();

        let mut config = VoiceConfig::diphone(db.path());
        config.duration_stats = Some(stats.path().to_path_buf());
        let sink = MemorySink::new();
        let voice = Voice::allocate_with_sink(config, Arc::new(sink.clone())).unwrap();
        assert_eq!(voice.speak("one").wait(), SpeakStatus::Completed);
        assert!(!sink.waveforms()[0].samples.is_empty());
    }
}
