//! Talking-clock phrase composition.
//!
//! Turns a wall-clock reading into the sentence a time voice speaks,
//! e.g. 18:20 becomes "The time is now, exactly twenty past six, in the
//! evening." The five-minute granularity, the minute-33 hour rollover and
//! the time-of-day thresholds are tuned values; change them and the voice
//! starts lying politely.

use anyhow::{bail, Context, Result};

/// How close the reading is to the nearest five minutes.
pub fn approx_phrase(min: u32) -> &'static str {
    match min % 5 {
        0 => "exactly",
        1 => "just after",
        2 => "a little after",
        _ => "almost",
    }
}

/// The nearest five-minute phrase, empty on the hour (or next to it).
pub fn minute_phrase(min: u32) -> &'static str {
    match ((min + 2) / 5) * 5 {
        5 => "five past",
        10 => "ten past",
        15 => "quarter past",
        20 => "twenty past",
        25 => "twenty-five past",
        30 => "half past",
        35 => "twenty-five to",
        40 => "twenty to",
        45 => "quarter to",
        50 => "ten to",
        55 => "five to",
        _ => "",
    }
}

/// The hour word, rolling to the next hour past minute 32 ("twenty to
/// seven" names the coming hour).
pub fn hour_phrase(hour: u32, min: u32) -> &'static str {
    let mut h = hour;
    if min > 32 {
        h += 1;
    }
    if h == 24 {
        h = 0;
    }
    if h > 12 {
        h -= 12;
    }
    match h {
        0 => "midnight",
        1 => "one",
        2 => "two",
        3 => "three",
        4 => "four",
        5 => "five",
        6 => "six",
        7 => "seven",
        8 => "eight",
        9 => "nine",
        10 => "ten",
        11 => "eleven",
        _ => "twelve",
    }
}

/// Morning/afternoon/evening, empty around midnight.
pub fn time_of_day_phrase(hour: u32, min: u32) -> &'static str {
    let mut h = hour;
    if min > 58 {
        h += 1;
    }
    if h == 24 {
        ""
    } else if h > 17 {
        "in the evening"
    } else if h > 11 {
        "in the afternoon"
    } else if h == 0 && min < 33 {
        ""
    } else {
        "in the morning"
    }
}

/// The full sentence for a reading.
pub fn time_phrase(hour: u32, min: u32) -> String {
    let mut middle = String::new();
    for part in [approx_phrase(min), minute_phrase(min), hour_phrase(hour, min)] {
        if part.is_empty() {
            continue;
        }
        if !middle.is_empty() {
            middle.push(' ');
        }
        middle.push_str(part);
    }
    let tod = time_of_day_phrase(hour, min);
    if tod.is_empty() {
        format!("The time is now, {}.", middle)
    } else {
        format!("The time is now, {}, {}.", middle, tod)
    }
}

/// Parse `"HH:MM"` (24-hour).
pub fn parse_hhmm(text: &str) -> Result<(u32, u32)> {
    let (h, m) = text
        .split_once(':')
        .with_context(|| format!("expected HH:MM, got '{}'", text))?;
    let hour: u32 = h
        .trim()
        .parse()
        .with_context(|| format!("bad hour in '{}'", text))?;
    let min: u32 = m
        .trim()
        .parse()
        .with_context(|| format!("bad minute in '{}'", text))?;
    if hour > 23 || min > 59 {
        bail!("time '{}' out of range", text);
    }
    Ok((hour, min))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
