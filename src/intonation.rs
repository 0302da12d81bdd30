//! Accent assignment and F0 target generation.
//!
//! A small decision tree marks syllables as accented, then each phrase gets
//! a declining pitch baseline with a bump at every accented syllable's vowel
//! midpoint. The resulting `Target` relation is a sparse list of
//! `(pos seconds, f0 Hz)` points; `TargetTrack` interpolates between them
//! for the concatenation stage.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::cart::Cart;
use crate::duration::segment_spans;
use crate::phoneset::PhoneSet;
use crate::pipeline::{ProcessError, UtteranceProcessor};
use crate::utterance::{
    ItemId, Utterance, PHRASE, SEGMENT, SYLLABLE, SYLLABLE_STRUCTURE, TARGET,
};

const DEFAULT_PITCH: f32 = 100.0;
const DEFAULT_PITCH_RANGE: f32 = 11.0;

const ACCENT_TREE: &str = "\
TOTAL 3
NODE stress = 1 2
LEAF Accented
LEAF NONE
";

static DEFAULT_ACCENT_TREE: Lazy<Cart> = Lazy::new(|| Cart::parse(ACCENT_TREE).unwrap());

/// Eighth pipeline stage: mark accents, then lay down F0 targets.
///
/// Within each phrase the baseline falls linearly from `pitch + pitch_range`
/// to `pitch` (voice features, Hz). An accented syllable contributes an extra
/// target half a range above the baseline at its vowel's midpoint. Positions
/// never decrease.
pub struct Intonation {
    accent_cart: Cart,
}

impl Intonation {
    pub fn new(accent_cart: Cart) -> Self {
        Intonation { accent_cart }
    }
}

impl Default for Intonation {
    fn default() -> Self {
        Intonation::new(DEFAULT_ACCENT_TREE.clone())
    }
}

impl UtteranceProcessor for Intonation {
    fn name(&self) -> &'static str {
        "intonation"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let syl_rel = utt.require_relation(SYLLABLE)?;
        let syllables: Vec<ItemId> = utt.items(syl_rel).collect();
        for syl in syllables {
            if self.accent_cart.interpret_string(utt, syl) == Some("Accented") {
                utt.item_features_mut(syl).set_string("accent", "Accented");
            }
        }

        let spans: HashMap<ItemId, (f32, f32)> = segment_spans(utt)?
            .into_iter()
            .map(|(seg, start, end)| (seg, (start, end)))
            .collect();
        let phrase_rel = utt.require_relation(PHRASE)?;
        let phones = PhoneSet::us_english();
        let pitch = utt.feature_float("pitch").unwrap_or(DEFAULT_PITCH);
        let range = utt.feature_float("pitch_range").unwrap_or(DEFAULT_PITCH_RANGE);

        let mut points: Vec<(f32, f32)> = Vec::new();
        let phrases: Vec<ItemId> = utt.items(phrase_rel).collect();
        for phrase in phrases {
            // First walk finds the phrase's time span.
            let mut span: Option<(f32, f32)> = None;
            for word in utt.daughters(phrase) {
                let Some(ss_word) = utt.item_in(word, SYLLABLE_STRUCTURE) else {
                    continue;
                };
                for syl in utt.daughters(ss_word) {
                    for seg in utt.daughters(syl) {
                        let Some(seg_flat) = utt.item_in(seg, SEGMENT) else {
                            continue;
                        };
                        let Some(&(start, end)) = spans.get(&seg_flat) else {
                            continue;
                        };
                        span = Some(match span {
                            None => (start, end),
                            Some((s, _)) => (s, end),
                        });
                    }
                }
            }
            let Some((pstart, pend)) = span else { continue };
            let denom = (pend - pstart).max(1e-6);
            let baseline = |t: f32| pitch + range * (pend - t) / denom;

            points.push((pstart, pitch + range));
            // Second walk places a bump at the first vowel of each accented
            // syllable, now that the baseline is known.
            for word in utt.daughters(phrase) {
                let Some(ss_word) = utt.item_in(word, SYLLABLE_STRUCTURE) else {
                    continue;
                };
                for syl in utt.daughters(ss_word) {
                    if utt.item_features(syl).string("accent") != Some("Accented") {
                        continue;
                    }
                    for seg in utt.daughters(syl) {
                        let phone = utt.name(seg).unwrap_or_default().to_string();
                        if !phones.is_vowel(&phone) {
                            continue;
                        }
                        let Some(seg_flat) = utt.item_in(seg, SEGMENT) else {
                            continue;
                        };
                        if let Some(&(start, end)) = spans.get(&seg_flat) {
                            let mid = (start + end) / 2.0;
                            points.push((mid, baseline(mid) + range / 2.0));
                        }
                        break;
                    }
                }
            }
            points.push((pend, pitch));
        }

        let target_rel = utt.create_relation(TARGET)?;
        let mut last_pos = 0.0f32;
        for (pos, f0) in points {
            let pos = pos.max(last_pos);
            last_pos = pos;
            let item = utt.append(target_rel);
            let f = utt.item_features_mut(item);
            f.set_float("pos", pos);
            f.set_float("f0", f0);
        }
        Ok(())
    }
}

/// Piecewise-linear view of the F0 targets, for pitch-synchronous placement.
pub struct TargetTrack {
    points: Vec<(f32, f32)>,
}

impl TargetTrack {
    pub fn new(points: Vec<(f32, f32)>) -> Self {
        TargetTrack { points }
    }

    /// Read the Target relation back out of an utterance.
    pub fn from_utterance(utt: &Utterance) -> Self {
        let mut points = Vec::new();
        if let Some(rel) = utt.relation(TARGET) {
            for item in utt.items(rel) {
                let f = utt.item_features(item);
                if let (Some(pos), Some(f0)) = (f.float("pos"), f.float("f0")) {
                    points.push((pos, f0));
                }
            }
        }
        TargetTrack { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// F0 in Hz at time `t`, clamped to the first/last target outside the
    /// span. An empty track sits at 100 Hz.
    pub fn at(&self, t: f32) -> f32 {
        let Some(&(first_pos, first_f0)) = self.points.first() else {
            return DEFAULT_PITCH;
        };
        if t <= first_pos {
            return first_f0;
        }
        let &(last_pos, last_f0) = self.points.last().unwrap_or(&(first_pos, first_f0));
        if t >= last_pos {
            return last_f0;
        }
        for pair in self.points.windows(2) {
            let (p1, f1) = pair[0];
            let (p2, f2) = pair[1];
            if t >= p1 && t <= p2 {
                let dx = p2 - p1;
                if dx <= 0.0 {
                    return f2;
                }
                return f1 + (f2 - f1) * (t - p1) / dx;
            }
        }
        last_f0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
