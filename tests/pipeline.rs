//! End-to-end scenarios: text in, spoken words and audio out.

use std::sync::Arc;

use tempfile::NamedTempFile;

use unitvox::features::FeatureSet;
use unitvox::normalize::TokenToWords;
use unitvox::time;
use unitvox::tokenizer::TokenizerStage;
use unitvox::units::{Diphone, DiphoneUnitDatabase};
use unitvox::utterance::WORD;
use unitvox::{
    MemorySink, SpeakStatus, Utterance, UtteranceProcessor, Voice, VoiceConfig,
};

/// Run just the text front end and collect the Word relation.
fn words_of(text: &str) -> Vec<String> {
    let mut utt = Utterance::new(text, Arc::new(FeatureSet::new()));
    TokenizerStage::default().process(&mut utt).unwrap();
    TokenToWords::default().process(&mut utt).unwrap();
    utt.item_names(utt.relation(WORD).unwrap())
}

fn ramp_diphone(name: &str) -> Diphone {
    let seed = name.bytes().map(i16::from).sum::<i16>() % 64;
    let frames = (0..4)
        .map(|f| (0..8).map(|s| seed + (f * 8 + s) as i16).collect())
        .collect();
    Diphone {
        name: name.to_string(),
        midpoint: 2,
        frames,
    }
}

/// A synthetic inventory covering every diphone over the full phone set,
/// written out in the binary dump format.
fn diphone_db_file() -> NamedTempFile {
    const PHONES: &[&str] = &[
        "pau", "aa", "ae", "ah", "ao", "aw", "ax", "ay", "b", "ch", "d", "dh", "eh", "er",
        "ey", "f", "g", "hh", "ih", "iy", "jh", "k", "l", "m", "n", "ng", "ow", "oy", "p",
        "r", "s", "sh", "t", "th", "uh", "uw", "v", "w", "y", "z", "zh",
    ];
    let mut diphones = Vec::new();
    for left in PHONES {
        for right in PHONES {
            diphones.push(ramp_diphone(&format!("{}-{}", left, right)));
        }
    }
    let db = DiphoneUnitDatabase::from_units(16000, diphones, Vec::new()).unwrap();
    let mut file = NamedTempFile::new().unwrap();
    db.write_to(file.as_file_mut()).unwrap();
    file
}

#[test]
fn test_cardinal_expands_to_words() {
    assert_eq!(words_of("123"), vec!["one", "hundred", "twenty", "three"]);
}

#[test]
fn test_clock_sentence_words() {
    let phrase = time::time_phrase(18, 20);
    assert_eq!(
        phrase,
        "The time is now, exactly twenty past six, in the evening."
    );
    assert_eq!(
        words_of(&phrase),
        vec![
            "the", "time", "is", "now", "exactly", "twenty", "past", "six", "in", "the",
            "evening"
        ]
    );
}

#[test]
fn test_midnight_boundary_sentence() {
    let phrase = time::time_phrase(23, 59);
    assert_eq!(phrase, "The time is now, almost midnight.");
    assert_eq!(
        words_of(&phrase),
        vec!["the", "time", "is", "now", "almost", "midnight"]
    );
}

#[test]
fn test_diphone_voice_produces_audio() {
    let db = diphone_db_file();
    let sink = MemorySink::new();
    let voice =
        Voice::allocate_with_sink(VoiceConfig::diphone(db.path()), Arc::new(sink.clone()))
            .unwrap();

    let status = voice.speak("one two three").wait();
    assert_eq!(status, SpeakStatus::Completed);

    let waves = sink.waveforms();
    assert_eq!(waves.len(), 1);
    assert_eq!(waves[0].sample_rate, 16000);
    assert!(
        waves[0].duration_secs() > 0.1,
        "expected audible output, got {} s",
        waves[0].duration_secs()
    );
}

#[test]
fn test_clock_sentence_synthesizes() {
    let db = diphone_db_file();
    let sink = MemorySink::new();
    let voice = Voice::allocate_with_sink(
        VoiceConfig::diphone(db.path()).with_name("clock"),
        Arc::new(sink.clone()),
    )
    .unwrap();

    let evening = voice.speak(&time::time_phrase(18, 20)).wait();
    let midnight = voice.speak(&time::time_phrase(23, 59)).wait();
    assert_eq!(evening, SpeakStatus::Completed);
    assert_eq!(midnight, SpeakStatus::Completed);

    let waves = sink.waveforms();
    assert_eq!(waves.len(), 2);
    // The full evening sentence speaks more phones than "almost midnight".
    assert!(waves[0].samples.len() > waves[1].samples.len());
}

#[test]
fn test_voice_writes_wav_file() {
    let db = diphone_db_file();
    let out = NamedTempFile::new().unwrap();
    let config = VoiceConfig::diphone(db.path()).with_output(out.path());
    let voice = Voice::allocate(config).unwrap();

    assert_eq!(voice.speak("hello world").wait(), SpeakStatus::Completed);
    drop(voice);

    let bytes = std::fs::metadata(out.path()).unwrap().len();
    assert!(bytes > 44, "WAV should have a header and samples, got {} bytes", bytes);
}

#[test]
fn test_speak_queue_is_fifo() {
    let db = diphone_db_file();
    let sink = MemorySink::new();
    let voice =
        Voice::allocate_with_sink(VoiceConfig::diphone(db.path()), Arc::new(sink.clone()))
            .unwrap();

    let short = voice.speak("one");
    let long = voice.speak("one hundred twenty three thousand");
    assert_eq!(short.wait(), SpeakStatus::Completed);
    assert_eq!(long.wait(), SpeakStatus::Completed);

    let waves = sink.waveforms();
    assert_eq!(waves.len(), 2);
    assert!(waves[0].samples.len() < waves[1].samples.len());
}
