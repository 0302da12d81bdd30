//! Pronunciation lexicon, syllabification and the Segmenter stage.
//!
//! The lexicon maps lowercase words to stress-marked phone strings
//! ("january" to `jh ae1 n y uw0 eh2 r iy0`). Misses fall back to spelling
//! the word letter by letter. `Segmenter` turns the Word relation into
//! Syllable, Segment and SylStructure (word, syllable, segment tree),
//! splitting syllables by the sonority profile of each consonant cluster.
//! `PauseGenerator` then inserts silence segments at the utterance start
//! and after every phrase.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::phoneset::SILENCE;
use crate::pipeline::{ProcessError, UtteranceProcessor};
use crate::utterance::{
    ItemId, Utterance, PHRASE, SEGMENT, SYLLABLE, SYLLABLE_STRUCTURE, TOKEN, WORD,
};

// ─────────────────────────────────────────────────────────────────────────────
// Sonority classes
// ─────────────────────────────────────────────────────────────────────────────

// Phone classes are keyed on the first letter of the phone name.
const VOWELS: &str = "aeiou";
const GLIDES_LIQUIDS: &str = "wylr";
const NASALS: &str = "nm";
const VOICED_OBSTRUENTS: &str = "bdgjlmnnnrvwyz";

fn is_vowel(phone: &str) -> bool {
    phone.chars().next().map_or(false, |c| VOWELS.contains(c))
}

fn sonority(phone: &str) -> i32 {
    let first = match phone.chars().next() {
        Some(c) => c,
        None => return 1,
    };
    if is_vowel(phone) || phone == SILENCE {
        5
    } else if GLIDES_LIQUIDS.contains(first) {
        4
    } else if NASALS.contains(first) {
        3
    } else if VOICED_OBSTRUENTS.contains(first) {
        2
    } else {
        1
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Letter pronunciations
// ─────────────────────────────────────────────────────────────────────────────

// a through z.
const LETTER_PHONES: &[&str] = &[
    "ey1", "b iy1", "s iy1", "d iy1", "iy1", "eh1 f", "jh iy1", "ey1 ch",
    "ay1", "jh ey1", "k ey1", "eh1 l", "eh1 m", "eh1 n", "ow1", "p iy1",
    "k y uw1", "aa1 r", "eh1 s", "t iy1", "y uw1", "v iy1",
    "d ah1 b ax0 l y uw0", "eh1 k s", "w ay1", "z iy1",
];

fn letter_phones(c: char) -> Option<&'static str> {
    let c = c.to_ascii_lowercase();
    if c.is_ascii_lowercase() {
        Some(LETTER_PHONES[(c as u8 - b'a') as usize])
    } else {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Addenda
// ─────────────────────────────────────────────────────────────────────────────

const ADDENDA: &[(&str, &str)] = &[
    // articles, pronouns, function words
    ("a", "ax0"),
    ("_a", "ey1"),
    ("an", "ax0 n"),
    ("the", "dh ax0"),
    ("this", "dh ih1 s"),
    ("that", "dh ae1 t"),
    ("of", "ah1 v"),
    ("and", "ae1 n d"),
    ("or", "ao1 r"),
    ("is", "ih1 z"),
    ("was", "w ah1 z"),
    ("are", "aa1 r"),
    ("be", "b iy1"),
    ("to", "t uw1"),
    ("in", "ih0 n"),
    ("on", "aa1 n"),
    ("at", "ae1 t"),
    ("it", "ih1 t"),
    ("we", "w iy1"),
    ("he", "hh iy1"),
    ("she", "sh iy1"),
    ("they", "dh ey1"),
    ("you", "y uw1"),
    ("for", "f ao1 r"),
    ("with", "w ih1 dh"),
    ("as", "ae1 z"),
    ("by", "b ay1"),
    ("from", "f r ah1 m"),
    ("not", "n aa1 t"),
    ("but", "b ah1 t"),
    ("have", "hh ae1 v"),
    ("has", "hh ae1 z"),
    ("had", "hh ae1 d"),
    ("will", "w ih1 l"),
    ("can", "k ae1 n"),
    ("do", "d uw1"),
    ("does", "d ah1 z"),
    ("did", "d ih1 d"),
    ("what", "w ah1 t"),
    ("when", "w eh1 n"),
    ("where", "w eh1 r"),
    ("who", "hh uw1"),
    ("how", "hh aw1"),
    ("why", "w ay1"),
    ("yes", "y eh1 s"),
    ("no", "n ow1"),
    // cardinals
    ("zero", "z ih1 r ow0"),
    ("one", "w ah1 n"),
    ("two", "t uw1"),
    ("three", "th r iy1"),
    ("four", "f ao1 r"),
    ("five", "f ay1 v"),
    ("six", "s ih1 k s"),
    ("seven", "s eh1 v ax0 n"),
    ("eight", "ey1 t"),
    ("nine", "n ay1 n"),
    ("ten", "t eh1 n"),
    ("eleven", "ih0 l eh1 v ax0 n"),
    ("twelve", "t w eh1 l v"),
    ("thirteen", "th er0 t iy1 n"),
    ("fourteen", "f ao1 r t iy1 n"),
    ("fifteen", "f ih0 f t iy1 n"),
    ("sixteen", "s ih0 k s t iy1 n"),
    ("seventeen", "s eh1 v ax0 n t iy1 n"),
    ("eighteen", "ey0 t iy1 n"),
    ("nineteen", "n ay1 n t iy1 n"),
    ("twenty", "t w eh1 n t iy0"),
    ("thirty", "th er1 t iy0"),
    ("forty", "f ao1 r t iy0"),
    ("fifty", "f ih1 f t iy0"),
    ("sixty", "s ih1 k s t iy0"),
    ("seventy", "s eh1 v ax0 n t iy0"),
    ("eighty", "ey1 t iy0"),
    ("ninety", "n ay1 n t iy0"),
    ("hundred", "hh ah1 n d r ax0 d"),
    ("thousand", "th aw1 z ax0 n d"),
    ("million", "m ih1 l y ax0 n"),
    ("billion", "b ih1 l y ax0 n"),
    ("point", "p oy1 n t"),
    ("minus", "m ay1 n ax0 s"),
    ("plus", "p l ah1 s"),
    ("oh", "ow1"),
    ("umpty", "ah1 m p t iy0"),
    ("per", "p er1"),
    ("cent", "s eh1 n t"),
    ("slash", "s l ae1 sh"),
    // ordinals
    ("first", "f er1 s t"),
    ("second", "s eh1 k ax0 n d"),
    ("third", "th er1 d"),
    ("fourth", "f ao1 r th"),
    ("fifth", "f ih1 f th"),
    ("sixth", "s ih1 k s th"),
    ("seventh", "s eh1 v ax0 n th"),
    ("eighth", "ey1 t th"),
    ("ninth", "n ay1 n th"),
    ("tenth", "t eh1 n th"),
    ("eleventh", "ih0 l eh1 v ax0 n th"),
    ("twelfth", "t w eh1 l f th"),
    ("fifteenth", "f ih0 f t iy1 n th"),
    ("hundredth", "hh ah1 n d r ax0 d th"),
    ("thousandth", "th aw1 z ax0 n d th"),
    // talking clock vocabulary
    ("time", "t ay1 m"),
    ("now", "n aw1"),
    ("exactly", "ih0 g z ae1 k t l iy0"),
    ("just", "jh ah1 s t"),
    ("after", "ae1 f t er0"),
    ("little", "l ih1 t ax0 l"),
    ("almost", "ao1 l m ow2 s t"),
    ("quarter", "k w ao1 r t er0"),
    ("half", "hh ae1 f"),
    ("past", "p ae1 s t"),
    ("midnight", "m ih1 d n ay2 t"),
    ("noon", "n uw1 n"),
    ("morning", "m ao1 r n ih0 ng"),
    ("afternoon", "ae2 f t er0 n uw1 n"),
    ("evening", "iy1 v n ih0 ng"),
    ("oclock", "ax0 k l aa1 k"),
    // assorted
    ("hello", "hh ax0 l ow1"),
    ("world", "w er1 l d"),
    ("january", "jh ae1 n y uw0 eh2 r iy0"),
    ("brown", "b r aw1 n"),
    ("cow", "k aw1"),
    ("cowboy", "k aw1 b oy2"),
    ("cat", "k ae1 t"),
    ("dog", "d ao1 g"),
    ("horse", "hh ao1 r s"),
    ("fish", "f ih1 sh"),
    ("judge", "jh ah1 jh"),
    ("smith", "s m ih1 th"),
    ("dave", "d ey1 v"),
    ("crow", "k r ow1"),
    ("say", "s ey1"),
    ("test", "t eh1 s t"),
    ("king", "k ih1 ng"),
    ("queen", "k w iy1 n"),
    ("henry", "hh eh1 n r iy0"),
    ("chapter", "ch ae1 p t er0"),
    ("mister", "m ih1 s t er0"),
    ("missus", "m ih1 s ax0 z"),
    // clitics split off by token expansion
    ("'s", "z"),
    ("'ll", "l"),
    ("'ve", "v"),
    ("'d", "d"),
];

// ─────────────────────────────────────────────────────────────────────────────
// Lexicon
// ─────────────────────────────────────────────────────────────────────────────

/// Word to phone-string lookup with letter spell-out as the fallback.
pub struct Lexicon {
    entries: HashMap<String, String>,
}

impl Lexicon {
    /// An empty lexicon.
    pub fn new() -> Self {
        Lexicon {
            entries: HashMap::new(),
        }
    }

    /// The compiled-in lexicon: single letters plus the addenda vocabulary.
    pub fn cmu() -> Self {
        let mut lex = Lexicon::new();
        for (i, phones) in LETTER_PHONES.iter().enumerate() {
            let letter = (b'a' + i as u8) as char;
            lex.define(&letter.to_string(), phones);
        }
        for (word, phones) in ADDENDA {
            lex.define(word, phones);
        }
        lex
    }

    pub fn define(&mut self, word: &str, phones: &str) {
        self.entries.insert(word.to_string(), phones.to_string());
    }

    /// Direct entry lookup, stress markers included.
    pub fn lookup(&self, word: &str) -> Option<&str> {
        self.entries.get(word).map(String::as_str)
    }

    /// The phones for a word: a direct entry, or the letters of the word
    /// spelled out one by one. `None` when neither yields any phones.
    pub fn phones(&self, word: &str) -> Option<Vec<String>> {
        if let Some(entry) = self.lookup(word) {
            return Some(entry.split_whitespace().map(str::to_string).collect());
        }
        let mut spelled = Vec::new();
        for c in word.chars() {
            if let Some(p) = letter_phones(c) {
                spelled.extend(p.split_whitespace().map(str::to_string));
            }
        }
        if spelled.is_empty() {
            None
        } else {
            Some(spelled)
        }
    }

    /// Whether the word phone at `index` starts a new syllable, given the
    /// phones collected into the current syllable so far.
    ///
    /// Boundaries fall at the word end and at silences. A cluster with no
    /// vowel left to claim stays in the current syllable, as does anything
    /// before the current syllable has found its vowel. A vowel always opens
    /// a new syllable; a word-final consonant never does. Between those, the
    /// split happens where sonority stops falling: previous <= current <=
    /// following.
    pub fn is_syllable_boundary(
        &self,
        syllable: &[String],
        word_phones: &[String],
        index: usize,
    ) -> bool {
        if index >= word_phones.len() {
            true
        } else if word_phones[index] == SILENCE {
            true
        } else if !word_phones[index..].iter().any(|p| is_vowel(p)) {
            false
        } else if !syllable.iter().any(|p| is_vowel(p)) {
            false
        } else if is_vowel(&word_phones[index]) {
            true
        } else if index == word_phones.len() - 1 {
            false
        } else {
            let p = match syllable.last() {
                Some(last) => sonority(last),
                None => return false,
            };
            let n = sonority(&word_phones[index]);
            let nn = sonority(&word_phones[index + 1]);
            p <= n && n <= nn
        }
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Lexicon::cmu()
    }
}

fn strip_stress(phone: &str) -> (&str, bool) {
    match phone.as_bytes().last() {
        Some(b'1') => (&phone[..phone.len() - 1], true),
        Some(b'0') | Some(b'2') => (&phone[..phone.len() - 1], false),
        _ => (phone, false),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Segmenter
// ─────────────────────────────────────────────────────────────────────────────

/// Fifth pipeline stage: expand words into syllables and segments.
///
/// Builds three relations: Syllable (flat syllable list), Segment (flat
/// phone list) and SylStructure, where each word item carries its syllables
/// as daughters and each syllable its segments. Syllable items get a
/// `stress` feature ("1" when the syllable contained a primary-stressed
/// phone). A token-level `phones` feature overrides the lexicon.
pub struct Segmenter {
    lexicon: Arc<Lexicon>,
}

impl Segmenter {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Segmenter { lexicon }
    }

    fn word_phones(&self, utt: &Utterance, word: ItemId) -> Option<Vec<String>> {
        let from_token = utt
            .item_in(word, TOKEN)
            .and_then(|t| utt.parent(t))
            .and_then(|token| utt.item_features(token).string("phones").map(str::to_string));
        if let Some(marked) = from_token {
            return Some(marked.split_whitespace().map(str::to_string).collect());
        }
        self.lexicon.phones(utt.name(word)?)
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Segmenter::new(Arc::new(Lexicon::cmu()))
    }
}

impl UtteranceProcessor for Segmenter {
    fn name(&self) -> &'static str {
        "segmenter"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let words_rel = utt.require_relation(WORD)?;
        let syllables = utt.create_relation(SYLLABLE)?;
        let structure = utt.create_relation(SYLLABLE_STRUCTURE)?;
        let segments = utt.create_relation(SEGMENT)?;

        let words: Vec<ItemId> = utt.items(words_rel).collect();
        for word in words {
            let ss_word = utt.append_shared(structure, word);
            let marked = match self.word_phones(utt, word) {
                Some(marked) => marked,
                None => {
                    warn!(word = utt.name(word).unwrap_or("?"), "nothing to say for word");
                    continue;
                }
            };
            let mut phones = Vec::with_capacity(marked.len());
            let mut primaries = Vec::with_capacity(marked.len());
            for m in &marked {
                let (phone, primary) = strip_stress(m);
                phones.push(phone.to_string());
                primaries.push(primary);
            }

            let mut current: Option<ItemId> = None;
            let mut syllable: Vec<String> = Vec::new();
            let mut stressed = false;
            for j in 0..phones.len() {
                let ss_syl = match current {
                    Some(s) => s,
                    None => {
                        let flat = utt.append(syllables);
                        let s = utt.add_daughter(ss_word, flat);
                        current = Some(s);
                        syllable.clear();
                        stressed = false;
                        s
                    }
                };
                let seg = utt.append(segments);
                utt.set_name(seg, &phones[j]);
                utt.add_daughter(ss_syl, seg);
                if primaries[j] {
                    stressed = true;
                }
                syllable.push(phones[j].clone());
                if self.lexicon.is_syllable_boundary(&syllable, &phones, j + 1) {
                    let value = if stressed { "1" } else { "0" };
                    utt.item_features_mut(ss_syl).set_string("stress", value);
                    current = None;
                }
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pauses
// ─────────────────────────────────────────────────────────────────────────────

/// Inserts silence segments: one before the first segment and one after the
/// final segment of every phrase.
#[derive(Default)]
pub struct PauseGenerator;

impl UtteranceProcessor for PauseGenerator {
    fn name(&self) -> &'static str {
        "pause_generator"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let segments = utt.require_relation(SEGMENT)?;
        let phrases = utt.require_relation(PHRASE)?;

        let lead = match utt.head(segments) {
            Some(first) => utt.insert_before(first),
            None => utt.append(segments),
        };
        utt.set_name(lead, SILENCE);

        let phrase_items: Vec<ItemId> = utt.items(phrases).collect();
        for phrase in phrase_items {
            // The last word of the phrase that produced any segments.
            let mut word = utt.last_daughter(phrase);
            while let Some(w) = word {
                if let Some(seg) = last_segment_of(utt, w) {
                    let pau = utt.insert_after(seg);
                    utt.set_name(pau, SILENCE);
                    break;
                }
                word = utt.prev(w);
            }
        }
        Ok(())
    }
}

fn last_segment_of(utt: &Utterance, word: ItemId) -> Option<ItemId> {
    let ss_word = utt.item_in(word, SYLLABLE_STRUCTURE)?;
    let last_syl = utt.last_daughter(ss_word)?;
    let last_seg = utt.last_daughter(last_syl)?;
    utt.item_in(last_seg, SEGMENT)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
