//! Post-lexical pronunciation fixes.
//!
//! Two adjustments run over the Segment relation after syllabification.
//! Every "ah" is renamed "aa" (the unit inventory carries only "aa").
//! Then the possessive/contracted "'s" is voiced or split to match its
//! left context: after a sibilant or affricate not made at the teeth,
//! lips or glottis a schwa is inserted ("horse's" gains a syllable
//! nucleus); after any other voiceless consonant the "z" devoices to
//! "s"; otherwise it stays "z".

use once_cell::sync::Lazy;

use crate::path::FeaturePath;
use crate::phoneset::PhoneSet;
use crate::pipeline::{ProcessError, UtteranceProcessor};
use crate::utterance::{ItemId, Utterance, SEGMENT, SYLLABLE_STRUCTURE};

static WORD_OF_SEGMENT: Lazy<FeaturePath> =
    Lazy::new(|| FeaturePath::compile("R:SylStructure.parent.parent.name").unwrap());

/// Sixth pipeline stage.
pub struct PostLexicalAnalyzer {
    phones: &'static PhoneSet,
}

impl PostLexicalAnalyzer {
    pub fn new(phones: &'static PhoneSet) -> Self {
        PostLexicalAnalyzer { phones }
    }

    fn fix_phoneme_ah(&self, utt: &mut Utterance, segments: &[ItemId]) {
        for &seg in segments {
            if utt.name(seg) == Some("ah") {
                utt.set_name(seg, "aa");
            }
        }
    }

    fn fix_apostrophe_s(&self, utt: &mut Utterance, segments: &[ItemId]) {
        for &seg in segments {
            if WORD_OF_SEGMENT.find_string(utt, seg).as_deref() != Some("'s") {
                continue;
            }
            let prev = match utt.prev(seg) {
                Some(p) => p,
                None => continue,
            };
            let pname = utt.name(prev).unwrap_or_default().to_string();
            let ctype = self.phones.feature(&pname, "ctype").unwrap_or("0");
            let cplace = self.phones.feature(&pname, "cplace").unwrap_or("0");
            if "fa".contains(ctype) && !"dbg".contains(cplace) {
                let schwa = utt.insert_before(seg);
                utt.set_name(schwa, "ax");
                if let Some(ss_seg) = utt.item_in(seg, SYLLABLE_STRUCTURE) {
                    utt.insert_before_shared(ss_seg, schwa);
                }
            } else if self.phones.feature(&pname, "cvox") == Some("-") {
                utt.set_name(seg, "s");
            }
        }
    }
}

impl Default for PostLexicalAnalyzer {
    fn default() -> Self {
        PostLexicalAnalyzer::new(PhoneSet::us_english())
    }
}

impl UtteranceProcessor for PostLexicalAnalyzer {
    fn name(&self) -> &'static str {
        "post_lexical"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let rel = utt.require_relation(SEGMENT)?;
        let segments: Vec<ItemId> = utt.items(rel).collect();
        self.fix_phoneme_ah(utt, &segments);
        self.fix_apostrophe_s(utt, &segments);
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
    use std::sync::Arc;

    fn segments_after_postlex(words: &[&str]) -> Utterance {
        let mut utt = Utterance::new("", Arc::new(FeatureSet::new()));
        let rel = utt.create_relation(WORD).unwrap();
        for word in words {
            let w = utt.append(rel);
            utt.set_name(w, word);
        }
        Segmenter::default().process(&mut utt).unwrap();
        PostLexicalAnalyzer::default().process(&mut utt).unwrap();
        utt
    }

    fn names(utt: &Utterance) -> Vec<String> {
        utt.item_names(utt.relation(SEGMENT).unwrap())
    }

    #[test]
    fn test_ah_becomes_aa() {
        let utt = segments_after_postlex(&["one"]);
        assert_eq!(names(&utt), vec!["w", "aa", "n"]);
    }

    #[test]
    fn test_voiceless_stop_devoices_the_clitic() {
        let utt = segments_after_postlex(&["cat", "'s"]);
        assert_eq!(names(&utt), vec!["k", "ae", "t", "s"]);
    }

    #[test]
    fn test_sibilant_gains_a_schwa() {
        let utt = segments_after_postlex(&["horse", "'s"]);
        assert_eq!(names(&utt), vec!["hh", "ao", "r", "s", "ax", "z"]);
    }

    #[test]
    fn test_affricate_gains_a_schwa() {
        // The ah rename lands first, then the schwa insertion.
        let utt = segments_after_postlex(&["judge", "'s"]);
        assert_eq!(names(&utt), vec!["jh", "aa", "jh", "ax", "z"]);
    }

    #[test]
    fn test_voiced_stop_keeps_z() {
        let utt = segments_after_postlex(&["dog", "'s"]);
        assert_eq!(names(&utt), vec!["d", "ao", "g", "z"]);
    }

    #[test]
    fn test_dental_fricative_devoices_not_splits() {
        // th is a fricative but dental, so no schwa; voiceless, so s.
        let utt = segments_after_postlex(&["smith", "'s"]);
        assert_eq!(names(&utt), vec!["s", "m", "ih", "th", "s"]);
    }

    #[test]
    fn test_labiodental_keeps_z() {
        let utt = segments_after_postlex(&["dave", "'s"]);
        assert_eq!(names(&utt), vec!["d", "ey", "v", "z"]);
    }

    #[test]
    fn test_schwa_lands_inside_the_clitic_syllable() {
        let utt = segments_after_postlex(&["fish", "'s"]);
        assert_eq!(names(&utt), vec!["f", "ih", "sh", "ax", "z"]);

        let structure = utt.relation(SYLLABLE_STRUCTURE).unwrap();
        let clitic = utt.tail(structure).unwrap();
        assert_eq!(utt.name(clitic), Some("'s"));
        let syl = utt.first_daughter(clitic).unwrap();
        let phones: Vec<String> = utt
            .daughters(syl)
            .map(|d| utt.name(d).unwrap().to_string())
            .collect();
        assert_eq!(phones, vec!["ax", "z"]);
    }
}
