//! # unitvox
//!
//! A concatenative text-to-speech engine: CART-driven prosody, diphone or
//! cluster unit selection, and pitch-synchronous overlap-add concatenation,
//! with no model downloads and no GPU — voices are plain data files.
//!
//! ## Quick start
//!
//! ```no_run
//! use unitvox::{Voice, VoiceConfig};
//!
//! // A diphone voice reads its unit inventory from a binary dump.
//! let config = VoiceConfig::diphone("kal16.db")
//!     .with_pitch(120.0, 18.0)
//!     .with_output("hello.wav");
//! let voice = Voice::allocate(config).unwrap();
//!
//! // speak() enqueues and returns immediately; wait() blocks for the result.
//! let status = voice.speak("Hello from a diphone voice.").wait();
//! assert_eq!(status, unitvox::SpeakStatus::Completed);
//! ```
//!
//! Audio can also be captured in memory instead of written to disk:
//!
//! ```no_run
//! use std::sync::Arc;
//! use unitvox::{MemorySink, Voice, VoiceConfig};
//!
//! let sink = MemorySink::new();
//! let voice = Voice::allocate_with_sink(
//!     VoiceConfig::diphone("kal16.db"),
//!     Arc::new(sink.clone()),
//! ).unwrap();
//! voice.speak("one two three").wait();
//! let wave = &sink.waveforms()[0];
//! println!("{} samples at {} Hz", wave.samples.len(), wave.sample_rate);
//! ```
//!
//! The talking-clock phrase composer is exposed for clock applications:
//!
//! ```
//! assert_eq!(
//!     unitvox::time::time_phrase(18, 20),
//!     "The time is now, exactly twenty past six, in the evening.",
//! );
//! ```
//!
//! ## Pipeline
//! 1. **Tokenizer** — raw text split on whitespace with pre/post punctuation
//!    peeled off; `/element …/` command annotations become token features.
//! 2. **TokenToWords** — numbers, ordinals, years, Roman numerals, fractions
//!    and friends expanded to spoken words.
//! 3. **PartOfSpeechTagger + Phraser** — closed-class word tags, then a CART
//!    decides the phrase breaks.
//! 4. **Segmenter** — lexicon lookup plus sonority syllabification builds the
//!    Syllable / Segment / SylStructure relations.
//! 5. **PauseGenerator** — silence segments at phrase edges.
//! 6. **PostLexical** — contextual phone rewrites (possessive "'s", ah → aa).
//! 7. **Durator** — CART z-scores against per-phone statistics give each
//!    segment its duration.
//! 8. **Intonation** — accent CART plus a declining baseline lay down F0
//!    targets.
//! 9. **UnitSelector** — diphone exact lookup, or cluster candidate scoring
//!    by duration mismatch and join cost.
//! 10. **UnitConcatenator** — nearest source frames placed at pitch-period
//!     intervals, cross-faded at unit boundaries.
//! 11. **AudioOutput** — the finished waveform goes to the voice's sink.
//!
//! For MBROLA-style voices an external-synthesizer stage replaces steps
//! 9–10, talking to the binary over a one-line-per-segment pipe protocol.

pub mod audio;
pub mod cart;
pub mod concat;
pub mod duration;
pub mod features;
pub mod intonation;
pub mod lexicon;
pub mod mbrola;
pub mod normalize;
pub mod path;
pub mod phoneset;
pub mod phrase;
pub mod pipeline;
pub mod postlex;
pub mod select;
pub mod time;
pub mod tokenizer;
pub mod units;
pub mod utterance;
pub mod voice;

// ─── Re-exports for convenience ─────────────────────────────────────────────

/// The synthesis entry point — allocate one per configured voice.
pub use voice::{SpeakStatus, SpeakableHandle, Voice, VoiceConfig, VoiceKind};

pub use audio::{AudioSink, MemorySink, NullSink, WavFileSink, Waveform};
pub use cart::Cart;
pub use features::{FeatureSet, Value};
pub use path::FeaturePath;
pub use pipeline::{run_pipeline, ProcessError, UtteranceProcessor};
pub use utterance::Utterance;
