//! Part-of-speech tagging and phrase-break prediction.
//!
//! `PartOfSpeechTagger` marks every word with a broad `gpos` class from a
//! small closed-class table (anything unlisted is "content"). `Phraser`
//! then groups words into Phrase items: a phrase opens on demand, collects
//! words as daughters, and closes after any word the phrasing tree marks
//! with a "BB" (big break) verdict.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::cart::Cart;
use crate::pipeline::{ProcessError, UtteranceProcessor};
use crate::utterance::{ItemId, Utterance, PHRASE, WORD};

// ─────────────────────────────────────────────────────────────────────────────
// Part of speech
// ─────────────────────────────────────────────────────────────────────────────

const GPOS_GROUPS: &[(&str, &[&str])] = &[
    (
        "in",
        &[
            "of", "for", "in", "on", "that", "with", "by", "at", "from", "as",
            "if", "against", "about", "before", "because", "under", "after",
            "over", "into", "while", "without", "through", "new", "between",
            "among", "until", "per", "up", "down",
        ],
    ),
    ("to", &["to"]),
    (
        "det",
        &[
            "the", "a", "an", "no", "some", "this", "each", "another", "those",
            "every", "all", "any", "these", "both", "neither", "many",
        ],
    ),
    (
        "md",
        &["will", "may", "would", "can", "could", "should", "must", "ought", "might"],
    ),
    ("cc", &["and", "but", "or", "plus", "yet", "nor"]),
    ("wp", &["who", "what", "where", "how", "when"]),
    ("pps", &["her", "his", "their", "its", "our", "mine"]),
    (
        "aux",
        &["is", "am", "are", "was", "were", "has", "have", "had", "be"],
    ),
    ("punc", &[".", ",", ":", ";", "\"", "'", "(", "?", ")", "!"]),
];

/// Word to broad-class lookup with a configurable fallback class.
pub struct PartOfSpeech {
    classes: HashMap<String, String>,
    default_class: String,
}

impl PartOfSpeech {
    /// An empty table; every word maps to `default_class` until
    /// [`define`](Self::define) adds entries.
    pub fn new(default_class: &str) -> Self {
        PartOfSpeech {
            classes: HashMap::new(),
            default_class: default_class.to_string(),
        }
    }

    /// The built-in US English closed-class table (default class "content").
    pub fn us_english() -> Self {
        let mut pos = PartOfSpeech::new("content");
        for (class, words) in GPOS_GROUPS {
            for word in *words {
                pos.define(word, class);
            }
        }
        pos
    }

    pub fn define(&mut self, word: &str, class: &str) {
        self.classes.insert(word.to_string(), class.to_string());
    }

    pub fn class_of(&self, word: &str) -> &str {
        self.classes
            .get(word)
            .map(String::as_str)
            .unwrap_or(&self.default_class)
    }
}

impl Default for PartOfSpeech {
    fn default() -> Self {
        PartOfSpeech::us_english()
    }
}

/// Third pipeline stage: set the `gpos` feature on every Word item.
pub struct PartOfSpeechTagger {
    pos: PartOfSpeech,
}

impl PartOfSpeechTagger {
    pub fn new(pos: PartOfSpeech) -> Self {
        PartOfSpeechTagger { pos }
    }
}

impl Default for PartOfSpeechTagger {
    fn default() -> Self {
        PartOfSpeechTagger::new(PartOfSpeech::us_english())
    }
}

impl UtteranceProcessor for PartOfSpeechTagger {
    fn name(&self) -> &'static str {
        "part_of_speech"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let words = utt.require_relation(WORD)?;
        let items: Vec<ItemId> = utt.items(words).collect();
        for word in items {
            let class = match utt.name(word) {
                Some(name) => self.pos.class_of(name).to_string(),
                None => self.pos.default_class.clone(),
            };
            utt.item_features_mut(word).set_string("gpos", &class);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Phraser
// ─────────────────────────────────────────────────────────────────────────────

// Break after words whose source token carried sentence punctuation, and
// always at the end of the utterance.
const PHRASING_TREE: &str = "\
TOTAL 5
NODE n.name MATCHES .+ 4
NODE R:Token.parent.punc MATCHES .*[.!?,:;].* 3
LEAF BB
LEAF NB
LEAF BB
";

static DEFAULT_PHRASING_TREE: Lazy<Cart> = Lazy::new(|| Cart::parse(PHRASING_TREE).unwrap());

/// Fourth pipeline stage: group Word items into Phrase items.
///
/// The tree is interpreted once per word; a "BB" verdict closes the current
/// phrase after that word. Every word lands in exactly one phrase, so a
/// tree that never answers "BB" yields a single phrase.
pub struct Phraser {
    cart: Cart,
}

impl Phraser {
    pub fn new(cart: Cart) -> Self {
        Phraser { cart }
    }
}

impl Default for Phraser {
    fn default() -> Self {
        Phraser::new(DEFAULT_PHRASING_TREE.clone())
    }
}

impl UtteranceProcessor for Phraser {
    fn name(&self) -> &'static str {
        "phraser"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let words = utt.require_relation(WORD)?;
        let phrases = utt.create_relation(PHRASE)?;
        let items: Vec<ItemId> = utt.items(words).collect();

        let mut phrase: Option<ItemId> = None;
        for word in items {
            let p = match phrase {
                Some(p) => p,
                None => {
                    let p = utt.append(phrases);
                    utt.set_name(p, "BB");
                    phrase = Some(p);
                    p
                }
            };
            utt.add_daughter(p, word);
            if self.cart.interpret_string(utt, word) == Some("BB") {
                phrase = None;
            }
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
    use crate::normalize::TokenToWords;
    use crate::tokenizer::TokenizerStage;
    use std::sync::Arc;

    fn utterance_through_words(text: &str) -> Utterance {
        let mut utt = Utterance::new(text, Arc::new(FeatureSet::new()));
        TokenizerStage::default().process(&mut utt).unwrap();
        TokenToWords::default().process(&mut utt).unwrap();
        utt
    }

    fn phrases_of(utt: &Utterance) -> Vec<Vec<String>> {
        let rel = utt.relation(PHRASE).unwrap();
        utt.items(rel)
            .map(|p| {
                utt.daughters(p)
                    .map(|d| utt.name(d).unwrap().to_string())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_us_gpos_classes() {
        let pos = PartOfSpeech::us_english();
        assert_eq!(pos.class_of("of"), "in");
        assert_eq!(pos.class_of("from"), "in");
        assert_eq!(pos.class_of("each"), "det");
        assert_eq!(pos.class_of("both"), "det");
        assert_eq!(pos.class_of("no"), "det");
        assert_eq!(pos.class_of("this"), "det");
        assert_eq!(pos.class_of("will"), "md");
        assert_eq!(pos.class_of("ought"), "md");
        assert_eq!(pos.class_of("and"), "cc");
        assert_eq!(pos.class_of("yet"), "cc");
        assert_eq!(pos.class_of("who"), "wp");
        assert_eq!(pos.class_of("when"), "wp");
        assert_eq!(pos.class_of("her"), "pps");
        assert_eq!(pos.class_of("mine"), "pps");
        assert_eq!(pos.class_of("is"), "aux");
        assert_eq!(pos.class_of("were"), "aux");
        assert_eq!(pos.class_of(","), "punc");
        assert_eq!(pos.class_of("?"), "punc");
    }

    #[test]
    fn test_unlisted_words_are_content() {
        let pos = PartOfSpeech::us_english();
        assert_eq!(pos.class_of("bear"), "content");
        assert_eq!(pos.class_of("cumquat"), "content");
        assert_eq!(pos.class_of("tryptich"), "content");
    }

    #[test]
    fn test_custom_default_class() {
        let mut pos = PartOfSpeech::new("x");
        pos.define("one", "num");
        assert_eq!(pos.class_of("one"), "num");
        assert_eq!(pos.class_of("two"), "x");
    }

    #[test]
    fn test_tagger_sets_gpos() {
        let mut utt = utterance_through_words("the cat was here");
        PartOfSpeechTagger::default().process(&mut utt).unwrap();

        let words = utt.relation(WORD).unwrap();
        let classes: Vec<String> = utt
            .items(words)
            .map(|w| utt.item_features(w).string("gpos").unwrap().to_string())
            .collect();
        assert_eq!(classes, vec!["det", "content", "aux", "content"]);
    }

    #[test]
    fn test_single_phrase_without_breaks() {
        let mut utt = utterance_through_words("how now brown cow");
        let no_breaks = Cart::parse("TOTAL 1\nLEAF NB\n").unwrap();
        Phraser::new(no_breaks).process(&mut utt).unwrap();

        let phrases = phrases_of(&utt);
        assert_eq!(phrases.len(), 1);
        assert_eq!(phrases[0], vec!["how", "now", "brown", "cow"]);
    }

    #[test]
    fn test_sentence_punctuation_splits_phrases() {
        let mut utt = utterance_through_words("hello, world.");
        Phraser::default().process(&mut utt).unwrap();

        let phrases = phrases_of(&utt);
        assert_eq!(phrases.len(), 2);
        assert_eq!(phrases[0], vec!["hello"]);
        assert_eq!(phrases[1], vec!["world"]);
    }

    #[test]
    fn test_every_word_in_exactly_one_phrase() {
        let mut utt = utterance_through_words("one, two three. four five");
        Phraser::default().process(&mut utt).unwrap();

        let words = utt.relation(WORD).unwrap();
        let all_words = utt.item_names(words);
        let phrased: Vec<String> = phrases_of(&utt).into_iter().flatten().collect();
        assert_eq!(phrased, all_words);
    }

    #[test]
    fn test_phrase_items_are_named_bb() {
        let mut utt = utterance_through_words("red. green. blue.");
        Phraser::default().process(&mut utt).unwrap();

        let rel = utt.relation(PHRASE).unwrap();
        assert_eq!(utt.item_names(rel), vec!["BB", "BB", "BB"]);
    }
}
