//! Segment durations.
//!
//! `PhoneDurations` holds per-phone mean/stddev statistics parsed from a
//! whitespace-triple text format. `Durator` asks a decision tree for a
//! z-score per segment, turns it into seconds via the statistics, applies
//! the voice duration stretch and accumulates the running `end` time on
//! each segment.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;

use crate::cart::Cart;
use crate::pipeline::{ProcessError, UtteranceProcessor};
use crate::utterance::{ItemId, Utterance, SEGMENT};

/// Fallback statistics for phones missing from the table.
const DEFAULT_MEAN: f32 = 0.08;
const DEFAULT_STDDEV: f32 = 0.025;

const KAL_DUR_STATS: &str = "\
*** segment duration statistics, mean and stddev in seconds
pau 0.200000 0.100000
aa 0.148401 0.084875
ae 0.128809 0.074604
ah 0.087840 0.050641
ao 0.170622 0.088514
aw 0.178085 0.080765
ax 0.050714 0.034384
ay 0.157566 0.073374
b 0.063457 0.026786
ch 0.093038 0.032610
d 0.052932 0.030785
dh 0.035072 0.023351
eh 0.093425 0.056183
er 0.117901 0.068612
ey 0.165883 0.075700
f 0.094865 0.035920
g 0.059751 0.025944
hh 0.061260 0.028982
ih 0.058563 0.045219
iy 0.126027 0.076839
jh 0.083748 0.028794
k 0.089048 0.034431
l 0.066480 0.040890
m 0.069848 0.034504
n 0.059367 0.034947
ng 0.064616 0.029539
ow 0.146084 0.078135
oy 0.195563 0.083619
p 0.079301 0.032116
r 0.052082 0.033853
s 0.100934 0.040747
sh 0.106442 0.036438
t 0.074513 0.037684
th 0.080592 0.035600
uh 0.067111 0.057054
uw 0.125360 0.065234
v 0.051638 0.022486
w 0.053808 0.025121
y 0.056909 0.029748
z 0.088234 0.043441
zh 0.096442 0.027981
";

/// Per-phone duration statistics.
pub struct PhoneDurations {
    stats: HashMap<String, (f32, f32)>,
}

static KAL: Lazy<PhoneDurations> = Lazy::new(|| PhoneDurations::parse(KAL_DUR_STATS).unwrap());

impl PhoneDurations {
    /// Parse `phone mean stddev` lines. Blank lines and `***` comments are
    /// skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut stats = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("***") {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 3 {
                bail!("line {}: expected `phone mean stddev`, got `{}`", lineno + 1, line);
            }
            let mean: f32 = fields[1]
                .parse()
                .with_context(|| format!("line {}: bad mean `{}`", lineno + 1, fields[1]))?;
            let stddev: f32 = fields[2]
                .parse()
                .with_context(|| format!("line {}: bad stddev `{}`", lineno + 1, fields[2]))?;
            stats.insert(fields[0].to_string(), (mean, stddev));
        }
        Ok(PhoneDurations { stats })
    }

    /// The compiled-in statistics.
    pub fn kal() -> &'static PhoneDurations {
        &KAL
    }

    /// `(mean, stddev)` for the phone, or the flat default.
    pub fn stat(&self, phone: &str) -> (f32, f32) {
        self.stats
            .get(phone)
            .copied()
            .unwrap_or((DEFAULT_MEAN, DEFAULT_STDDEV))
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

// Silence takes its mean; stressed syllables run half a deviation long.
const DURATION_TREE: &str = "\
TOTAL 5
NODE name = pau 2
LEAF 0.0
NODE R:SylStructure.parent.stress = 1 4
LEAF 0.5
LEAF 0.0
";

static DEFAULT_DURATION_TREE: Lazy<Cart> = Lazy::new(|| Cart::parse(DURATION_TREE).unwrap());

/// Seventh pipeline stage: predict a duration for every segment.
///
/// The tree verdict is a z-score; the segment duration is
/// `stretch * (mean + z * stddev)` and each segment's `end` feature is the
/// cumulative time in seconds. The stretch comes from the utterance (or
/// voice) feature `duration_stretch`, default 1.
pub struct Durator {
    cart: Cart,
    durations: Arc<PhoneDurations>,
}

impl Durator {
    pub fn new(cart: Cart, durations: Arc<PhoneDurations>) -> Self {
        Durator { cart, durations }
    }

    /// The built-in tree with caller-supplied phone statistics.
    pub fn with_stats(durations: Arc<PhoneDurations>) -> Self {
        Durator::new(DEFAULT_DURATION_TREE.clone(), durations)
    }
}

impl Default for Durator {
    fn default() -> Self {
        Durator::new(
            DEFAULT_DURATION_TREE.clone(),
            Arc::new(PhoneDurations::parse(KAL_DUR_STATS).unwrap()),
        )
    }
}

/// `(segment, start, end)` for every item in the Segment relation, in
/// order, recovered from the cumulative `end` features.
pub fn segment_spans(utt: &Utterance) -> Result<Vec<(ItemId, f32, f32)>, ProcessError> {
    let rel = utt.require_relation(SEGMENT)?;
    let mut spans = Vec::new();
    let mut prev_end = 0.0f32;
    for seg in utt.items(rel) {
        let end = utt.item_features(seg).float("end").unwrap_or(prev_end);
        spans.push((seg, prev_end, end));
        prev_end = end;
    }
    Ok(spans)
}

impl UtteranceProcessor for Durator {
    fn name(&self) -> &'static str {
        "durator"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let rel = utt.require_relation(SEGMENT)?;
        let segments: Vec<ItemId> = utt.items(rel).collect();
        let stretch = utt.feature_float("duration_stretch").unwrap_or(1.0);

        let mut end = 0.0f32;
        for seg in segments {
            let z = self.cart.interpret_float(utt, seg).unwrap_or(0.0);
            let phone = utt.name(seg).unwrap_or_default().to_string();
            let (mean, stddev) = self.durations.stat(&phone);
            let dur = stretch * (mean + z * stddev);
            end += dur;
            utt.item_features_mut(seg).set_float("end", end);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;
    use crate::lexicon::Segmenter;
    use crate::utterance::WORD;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-5, "{} vs {}", a, b);
    }

    fn utterance_with_ends(words: &[&str], voice: FeatureSet) -> Utterance {
        let mut utt = Utterance::new("", Arc::new(voice));
        let rel = utt.create_relation(WORD).unwrap();
        for word in words {
            let w = utt.append(rel);
            utt.set_name(w, word);
        }
        Segmenter::default().process(&mut utt).unwrap();
        Durator::default().process(&mut utt).unwrap();
        utt
    }

    fn ends(utt: &Utterance) -> Vec<f32> {
        let rel = utt.relation(SEGMENT).unwrap();
        utt.items(rel)
            .map(|s| utt.item_features(s).float("end").unwrap())
            .collect()
    }

    #[test]
    fn test_parse_and_lookup() {
        let pd = PhoneDurations::parse("aa 0.1 0.02\n*** note\nb 0.05 0.01\n").unwrap();
        assert_eq!(pd.len(), 2);
        assert_eq!(pd.stat("aa"), (0.1, 0.02));
        assert_eq!(pd.stat("qq"), (DEFAULT_MEAN, DEFAULT_STDDEV));
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(PhoneDurations::parse("aa 0.1\n").is_err());
        assert!(PhoneDurations::parse("aa x y\n").is_err());
    }

    #[test]
    fn test_builtin_table() {
        let kal = PhoneDurations::kal();
        assert_eq!(kal.stat("ey"), (0.165883, 0.075700));
        assert_eq!(kal.stat("pau"), (0.2, 0.1));
    }

    #[test]
    fn test_ends_accumulate() {
        // "a" is the lone unstressed schwa, so its duration is the plain mean.
        let utt = utterance_with_ends(&["a", "a"], FeatureSet::new());
        let e = ends(&utt);
        assert_eq!(e.len(), 2);
        assert_close(e[0], 0.050714);
        assert_close(e[1], 2.0 * 0.050714);
    }

    #[test]
    fn test_stressed_vowel_runs_long() {
        // "two" is t uw1: the stressed syllable adds half a deviation to
        // both segments.
        let utt = utterance_with_ends(&["two"], FeatureSet::new());
        let e = ends(&utt);
        let t = 0.074513 + 0.5 * 0.037684;
        let uw = 0.125360 + 0.5 * 0.065234;
        assert_close(e[0], t);
        assert_close(e[1], t + uw);
    }

    #[test]
    fn test_duration_stretch_scales() {
        let mut voice = FeatureSet::new();
        voice.set_float("duration_stretch", 2.0);
        let utt = utterance_with_ends(&["a"], voice);
        assert_close(ends(&utt)[0], 2.0 * 0.050714);
    }
}
