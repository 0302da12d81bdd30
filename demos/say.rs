//! Speak a sentence through a configured voice.
//!
//! Usage:
//!   cargo run --example say -- --db kal16.db --text "Hello world."
//!   cargo run --example say -- --voice voice.json --text "123" --output out.wav
//!
//! A voice descriptor JSON names the databases and prosody settings; `--db`
//! is a shortcut for a descriptor containing only a diphone database.

use std::path::Path;

use unitvox::{Voice, VoiceConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Parse simple CLI arguments ───────────────────────────────────────────
    let mut args = std::env::args().skip(1);

    let mut descriptor: Option<String> = None;
    let mut db: Option<String> = None;
    let mut text = "The quick brown fox.".to_string();
    let mut output = "say.wav".to_string();
    let mut pitch: Option<f32> = None;
    let mut stretch: Option<f32> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--voice" => {
                if let Some(v) = args.next() {
                    descriptor = Some(v);
                }
            }
            "--db" => {
                if let Some(v) = args.next() {
                    db = Some(v);
                }
            }
            "--text" => {
                if let Some(v) = args.next() {
                    text = v;
                }
            }
            "--output" => {
                if let Some(v) = args.next() {
                    output = v;
                }
            }
            "--pitch" => {
                if let Some(v) = args.next() {
                    pitch = v.parse().ok();
                }
            }
            "--stretch" => {
                if let Some(v) = args.next() {
                    stretch = v.parse().ok();
                }
            }
            "--help" => {
                println!(
                    "Usage: say [--voice DESCRIPTOR.json | --db DIPHONE.db] \
                     [--text TEXT] [--output FILE] [--pitch HZ] [--stretch FLOAT]"
                );
                return Ok(());
            }
            _ => {}
        }
    }

    // ── Build the voice configuration ────────────────────────────────────────
    let mut config = match (&descriptor, &db) {
        (Some(path), _) => VoiceConfig::from_json_file(Path::new(path))?,
        (None, Some(path)) => VoiceConfig::diphone(path.as_str()),
        (None, None) => anyhow::bail!("need --voice DESCRIPTOR.json or --db DIPHONE.db"),
    };
    if let Some(hz) = pitch {
        config.pitch = hz;
    }
    if let Some(s) = stretch {
        config.duration_stretch = s;
    }
    let config = config.with_output(output.as_str());

    println!("Voice  : {}", config.name);
    println!("Text   : {:?}", text);
    println!("Output : {}", output);
    println!();

    // ── Synthesise ───────────────────────────────────────────────────────────
    let voice = Voice::allocate(config)?;
    println!("Synthesising speech…");
    let status = voice.speak(&text).wait();
    println!("Status : {:?}", status);

    Ok(())
}
