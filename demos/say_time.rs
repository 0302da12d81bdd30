//! A talking clock: compose the phrase for a wall-clock reading and speak it.
//!
//! Usage:
//!   cargo run --example say_time -- --db kal16.db
//!   cargo run --example say_time -- --time 18:20 --db kal16.db
//!
//! Without `--time` the current UTC reading is used; without `--db` the
//! phrase is printed but not synthesised.

use unitvox::time::{parse_hhmm, time_phrase};
use unitvox::{Voice, VoiceConfig};

fn utc_now() -> (u32, u32) {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    (((secs / 3600) % 24) as u32, ((secs / 60) % 60) as u32)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Parse simple CLI arguments ───────────────────────────────────────────
    let mut args = std::env::args().skip(1);

    let mut reading: Option<String> = None;
    let mut db: Option<String> = None;
    let mut output = "time.wav".to_string();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--time" => {
                if let Some(v) = args.next() {
                    reading = Some(v);
                }
            }
            "--db" => {
                if let Some(v) = args.next() {
                    db = Some(v);
                }
            }
            "--output" => {
                if let Some(v) = args.next() {
                    output = v;
                }
            }
            "--help" => {
                println!("Usage: say_time [--time HH:MM] [--db DIPHONE.db] [--output FILE]");
                return Ok(());
            }
            _ => {}
        }
    }

    let (hour, min) = match reading {
        Some(text) => parse_hhmm(&text)?,
        None => utc_now(),
    };
    let phrase = time_phrase(hour, min);

    println!("Time   : {:02}:{:02}", hour, min);
    println!("Phrase : {}", phrase);

    // ── Synthesise ───────────────────────────────────────────────────────────
    match db {
        Some(path) => {
            let config = VoiceConfig::diphone(path.as_str())
                .with_name("clock")
                .with_output(output.as_str());
            let voice = Voice::allocate(config)?;
            let status = voice.speak(&phrase).wait();
            println!("Status : {:?}", status);
            println!("Output : {}", output);
        }
        None => println!("(no --db given; phrase not synthesised)"),
    }

    Ok(())
}
