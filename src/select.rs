//! Unit selection.
//!
//! Two selectors cover the two inventory styles. The diphone selector pairs
//! adjacent segments into `last-this` names and looks them up directly; a
//! miss substitutes the default unit instead of failing. The cluster
//! selector scores every corpus occurrence of a segment's unit type by
//! duration mismatch plus join cost and keeps the cheapest, ties going to
//! the earliest take.

use std::sync::Arc;

use tracing::warn;

use crate::duration::segment_spans;
use crate::phoneset::SILENCE;
use crate::pipeline::{ProcessError, UtteranceProcessor};
use crate::units::{ClusterUnitDatabase, DiphoneUnitDatabase};
use crate::utterance::{ItemId, Utterance, SYLLABLE_STRUCTURE, UNIT};

const DEFAULT_DIPHONE: &str = "pau-pau";
const DEFAULT_CLUSTER_TYPE: &str = "pau_pau";

// ─────────────────────────────────────────────────────────────────────────────
// Diphone selection
// ─────────────────────────────────────────────────────────────────────────────

/// Ninth pipeline stage, diphone flavour: one unit per adjacent segment
/// pair. Each Unit item carries the diphone name and `target_end`, the
/// sample index of the second phone's midpoint, where the next unit takes
/// over.
pub struct DiphoneUnitSelector {
    db: Arc<DiphoneUnitDatabase>,
}

impl DiphoneUnitSelector {
    pub fn new(db: Arc<DiphoneUnitDatabase>) -> Self {
        DiphoneUnitSelector { db }
    }
}

impl UtteranceProcessor for DiphoneUnitSelector {
    fn name(&self) -> &'static str {
        "diphone_unit_selector"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let spans = segment_spans(utt)?;
        let rate = self.db.sample_rate() as f32;
        let mut pairs = Vec::with_capacity(spans.len().saturating_sub(1));
        for pair in spans.windows(2) {
            let (left, _, end_left) = pair[0];
            let (right, _, end_right) = pair[1];
            let mut name = format!(
                "{}-{}",
                utt.name(left).unwrap_or_default(),
                utt.name(right).unwrap_or_default()
            );
            if self.db.unit(&name).is_none() {
                warn!(diphone = %name, substitute = DEFAULT_DIPHONE, "diphone not in database");
                name = DEFAULT_DIPHONE.to_string();
            }
            pairs.push((name, (end_left + end_right) / 2.0 * rate));
        }

        let rel = utt.create_relation(UNIT)?;
        for (name, target_end) in pairs {
            let item = utt.append(rel);
            utt.set_name(item, &name);
            utt.item_features_mut(item).set_float("target_end", target_end);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cluster selection
// ─────────────────────────────────────────────────────────────────────────────

/// Ninth pipeline stage, cluster flavour: one unit per segment, chosen from
/// the corpus takes of the segment's unit type. Unit items carry the chosen
/// take's name, its `unit_index` into the database and `target_end` in
/// samples; a type with no takes at all still yields an item (with no
/// index), which renders as silence downstream.
pub struct ClusterUnitSelector {
    db: Arc<ClusterUnitDatabase>,
}

impl ClusterUnitSelector {
    pub fn new(db: Arc<ClusterUnitDatabase>) -> Self {
        ClusterUnitSelector { db }
    }

    /// `pau_<previous phone>` for silence, `<phone>_<word>` otherwise.
    fn unit_type_for(&self, utt: &Utterance, seg: ItemId, prev: Option<ItemId>) -> String {
        let phone = utt.name(seg).unwrap_or_default();
        if phone == SILENCE {
            let prev_phone = prev.and_then(|p| utt.name(p)).unwrap_or(SILENCE);
            return format!("{}_{}", SILENCE, prev_phone);
        }
        let word = utt
            .item_in(seg, SYLLABLE_STRUCTURE)
            .and_then(|s| utt.parent(s))
            .and_then(|syl| utt.parent(syl))
            .and_then(|w| utt.name(w))
            .unwrap_or_default();
        format!("{}_{}", phone, word)
    }

    /// Candidate takes in corpus order: the type CART's index list if it
    /// gives one, else every take of the type, else the default type.
    fn candidates(&self, utt: &Utterance, seg: ItemId, ty: &str) -> Vec<usize> {
        let of_type = self.db.units_of_type(ty);
        let picked: Vec<usize> = match self.db.cart(ty).and_then(|c| c.interpret_indices(utt, seg)) {
            Some(indices) => indices
                .iter()
                .filter_map(|&i| of_type.get(i as usize).copied())
                .collect(),
            None => of_type.to_vec(),
        };
        if !picked.is_empty() {
            return picked;
        }
        warn!(unit_type = %ty, substitute = DEFAULT_CLUSTER_TYPE, "no unit candidates");
        self.db.units_of_type(DEFAULT_CLUSTER_TYPE).to_vec()
    }

    fn unit_duration(&self, index: usize) -> f32 {
        let samples: usize = self.db.unit_frames(index).iter().map(|f| f.residual.len()).sum();
        samples as f32 / self.db.sample_info().sample_rate as f32
    }

    /// Zero for a fresh start or corpus-adjacent units, otherwise the
    /// weighted distance between the facing frames times the continuity
    /// weight.
    fn join_cost(&self, prev: Option<usize>, candidate: usize) -> f32 {
        let Some(prev) = prev else { return 0.0 };
        if self.db.adjacent_in_corpus(prev, candidate) {
            return 0.0;
        }
        let (Some(last), Some(first)) = (
            self.db.unit_frames(prev).last(),
            self.db.unit_frames(candidate).first(),
        ) else {
            return 0.0;
        };
        last.param_distance(first, self.db.join_weights()) * self.db.continuity_weight() as f32
    }

    fn pick(&self, candidates: &[usize], target_dur: f32, prev: Option<usize>) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for &c in candidates {
            let score = (self.unit_duration(c) - target_dur).abs() + self.join_cost(prev, c);
            match best {
                Some((_, low)) if score >= low => {}
                _ => best = Some((c, score)),
            }
        }
        best.map(|(c, _)| c)
    }
}

impl UtteranceProcessor for ClusterUnitSelector {
    fn name(&self) -> &'static str {
        "cluster_unit_selector"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let spans = segment_spans(utt)?;
        let rate = self.db.sample_info().sample_rate as f32;

        let mut selected: Vec<(Option<usize>, String, f32)> = Vec::with_capacity(spans.len());
        let mut prev: Option<usize> = None;
        for (i, &(seg, start, end)) in spans.iter().enumerate() {
            let prev_seg = i.checked_sub(1).map(|j| spans[j].0);
            let ty = self.unit_type_for(utt, seg, prev_seg);
            let candidates = self.candidates(utt, seg, &ty);
            let choice = self.pick(&candidates, end - start, prev);
            let name = match choice {
                Some(index) => self.db.unit(index).map(|u| u.name.clone()).unwrap_or(ty),
                None => ty,
            };
            selected.push((choice, name, end * rate));
            prev = choice;
        }

        let rel = utt.create_relation(UNIT)?;
        for (choice, name, target_end) in selected {
            let item = utt.append(rel);
            utt.set_name(item, &name);
            let f = utt.item_features_mut(item);
            f.set_float("target_end", target_end);
            if let Some(index) = choice {
                f.set_float("unit_index", index as f32);
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
