//! Waveform assembly.
//!
//! Each selected unit is rendered as two halves around its midpoint,
//! time-scaled to the target span by repeating or skipping source periods:
//! output periods are laid down at pitch-period intervals (period taken
//! from the F0 target track at that instant) and each copies the nearest
//! source frame. Consecutive units are joined with a short cross-fade, and
//! a unit with no audio contributes silence for its span.

use std::sync::Arc;

use crate::audio::Waveform;
use crate::intonation::TargetTrack;
use crate::pipeline::{ProcessError, UtteranceProcessor};
use crate::units::{ClusterUnitDatabase, DiphoneUnitDatabase};
use crate::utterance::{ItemId, Utterance, UNIT};

/// Samples blended across a unit boundary.
const CROSS_FADE: usize = 16;
/// Floor for the target track, keeps pitch periods bounded.
const MIN_F0: f32 = 30.0;

/// One unit ready for rendering: source pitch periods and where in the
/// output, in samples, the unit must end.
struct ScheduledUnit<'a> {
    periods: Vec<&'a [i16]>,
    midpoint: usize,
    target_end: usize,
}

fn concatenate(units: &[ScheduledUnit], rate: u32, track: &TargetTrack) -> Vec<i16> {
    let mut out: Vec<i16> = Vec::new();
    for unit in units {
        let fade = if out.is_empty() { 0 } else { CROSS_FADE.min(out.len()) };
        // Render `fade` extra samples so the blended result still lands
        // exactly on target_end.
        let span = (unit.target_end + fade).saturating_sub(out.len());
        if span == 0 {
            continue;
        }
        let rendered = render_unit(unit, out.len() - fade, span, rate, track);
        overlap_add(&mut out, &rendered, fade);
    }
    out
}

fn render_unit(
    unit: &ScheduledUnit,
    start: usize,
    span: usize,
    rate: u32,
    track: &TargetTrack,
) -> Vec<i16> {
    let mut buf = Vec::with_capacity(span);
    if unit.periods.is_empty() {
        buf.resize(span, 0);
        return buf;
    }
    let mid = unit.midpoint.min(unit.periods.len());
    let left_target = span / 2;
    render_half(&unit.periods[..mid], start, left_target, rate, track, &mut buf);
    render_half(
        &unit.periods[mid..],
        start + left_target,
        span - left_target,
        rate,
        track,
        &mut buf,
    );
    buf
}

/// Fill `target` output samples from one half's source periods. Each output
/// period copies the source frame nearest to its relative position; a frame
/// shorter than the period is zero-padded, a longer one is cut.
fn render_half(
    periods: &[&[i16]],
    start: usize,
    target: usize,
    rate: u32,
    track: &TargetTrack,
    out: &mut Vec<i16>,
) {
    if target == 0 {
        return;
    }
    if periods.is_empty() {
        out.extend(std::iter::repeat(0).take(target));
        return;
    }
    let mut written = 0usize;
    while written < target {
        let t = (start + written) as f32 / rate as f32;
        let f0 = track.at(t).max(MIN_F0);
        let period = ((rate as f32 / f0).round() as usize)
            .max(1)
            .min(target - written);
        let progress = written as f32 / target as f32;
        let index = ((progress * periods.len() as f32) as usize).min(periods.len() - 1);
        let frame = periods[index];
        for k in 0..period {
            out.push(frame.get(k).copied().unwrap_or(0));
        }
        written += period;
    }
}

/// Blend the head of `next` into the tail of `out`, ramping linearly, then
/// append the rest.
fn overlap_add(out: &mut Vec<i16>, next: &[i16], fade: usize) {
    let fade = fade.min(out.len()).min(next.len());
    let base = out.len() - fade;
    for k in 0..fade {
        let alpha = (k + 1) as f32 / (fade + 1) as f32;
        let mixed = f32::from(out[base + k]) * (1.0 - alpha) + f32::from(next[k]) * alpha;
        out[base + k] = mixed.round() as i16;
    }
    out.extend_from_slice(&next[fade..]);
}

fn target_end_samples(utt: &Utterance, item: ItemId) -> usize {
    utt.item_features(item)
        .float("target_end")
        .unwrap_or(0.0)
        .max(0.0)
        .round() as usize
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline stages
// ─────────────────────────────────────────────────────────────────────────────

/// Tenth pipeline stage, diphone flavour: look each Unit item up by name
/// and write the assembled waveform onto the utterance.
pub struct DiphoneUnitConcatenator {
    db: Arc<DiphoneUnitDatabase>,
}

impl DiphoneUnitConcatenator {
    pub fn new(db: Arc<DiphoneUnitDatabase>) -> Self {
        DiphoneUnitConcatenator { db }
    }
}

impl UtteranceProcessor for DiphoneUnitConcatenator {
    fn name(&self) -> &'static str {
        "diphone_unit_concatenator"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let rel = utt.require_relation(UNIT)?;
        let track = TargetTrack::from_utterance(utt);
        let rate = self.db.sample_rate();

        let mut schedule = Vec::new();
        for item in utt.items(rel) {
            let target_end = target_end_samples(utt, item);
            let unit = utt.name(item).and_then(|n| self.db.unit(n));
            schedule.push(match unit {
                Some(d) => ScheduledUnit {
                    periods: d.frames.iter().map(|f| f.as_slice()).collect(),
                    midpoint: d.midpoint,
                    target_end,
                },
                None => ScheduledUnit {
                    periods: Vec::new(),
                    midpoint: 0,
                    target_end,
                },
            });
        }

        let samples = concatenate(&schedule, rate, &track);
        utt.waveform = Some(Waveform {
            sample_rate: rate,
            samples,
        });
        Ok(())
    }
}

/// Tenth pipeline stage, cluster flavour: pull each Unit item's take by
/// `unit_index` and render its residual periods.
pub struct ClusterUnitConcatenator {
    db: Arc<ClusterUnitDatabase>,
}

impl ClusterUnitConcatenator {
    pub fn new(db: Arc<ClusterUnitDatabase>) -> Self {
        ClusterUnitConcatenator { db }
    }
}

impl UtteranceProcessor for ClusterUnitConcatenator {
    fn name(&self) -> &'static str {
        "cluster_unit_concatenator"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let rel = utt.require_relation(UNIT)?;
        let track = TargetTrack::from_utterance(utt);
        let rate = self.db.sample_info().sample_rate;

        let mut schedule = Vec::new();
        for item in utt.items(rel) {
            let target_end = target_end_samples(utt, item);
            let index = utt
                .item_features(item)
                .float("unit_index")
                .map(|i| i as usize)
                .filter(|&i| i < self.db.unit_count());
            schedule.push(match index {
                Some(i) => {
                    let frames = self.db.unit_frames(i);
                    ScheduledUnit {
                        periods: frames.iter().map(|f| f.residual.as_slice()).collect(),
                        midpoint: frames.len() / 2,
                        target_end,
                    }
                }
                None => ScheduledUnit {
                    periods: Vec::new(),
                    midpoint: 0,
                    target_end,
                },
            });
        }

        let samples = concatenate(&schedule, rate, &track);
        utt.waveform = Some(Waveform {
            sample_rate: rate,
            samples,
        });
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
