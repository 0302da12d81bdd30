//! US English phone features.
//!
//! Per-phone articulatory features consulted by the post-lexical rules and
//! unit selection context: `vc` (vowel/consonant), `ctype` (s stop,
//! f fricative, a affricate, n nasal, l liquid, r approximant), `cplace`
//! (l labial, b labio-dental, d dental, a alveolar, p palatal, v velar,
//! g glottal) and `cvox` (consonant voicing). Vowels carry "0" for the
//! consonant features.

use std::collections::HashMap;

use once_cell::sync::Lazy;

// (phone, vc, ctype, cplace, cvox)
const US_PHONES: &[(&str, &str, &str, &str, &str)] = &[
    ("aa", "+", "0", "0", "0"),
    ("ae", "+", "0", "0", "0"),
    ("ah", "+", "0", "0", "0"),
    ("ao", "+", "0", "0", "0"),
    ("aw", "+", "0", "0", "0"),
    ("ax", "+", "0", "0", "0"),
    ("ay", "+", "0", "0", "0"),
    ("b", "-", "s", "l", "+"),
    ("ch", "-", "a", "p", "-"),
    ("d", "-", "s", "a", "+"),
    ("dh", "-", "f", "d", "+"),
    ("eh", "+", "0", "0", "0"),
    ("er", "+", "0", "0", "0"),
    ("ey", "+", "0", "0", "0"),
    ("f", "-", "f", "b", "-"),
    ("g", "-", "s", "v", "+"),
    ("hh", "-", "f", "g", "-"),
    ("ih", "+", "0", "0", "0"),
    ("iy", "+", "0", "0", "0"),
    ("jh", "-", "a", "p", "+"),
    ("k", "-", "s", "v", "-"),
    ("l", "-", "l", "a", "+"),
    ("m", "-", "n", "l", "+"),
    ("n", "-", "n", "a", "+"),
    ("ng", "-", "n", "v", "+"),
    ("ow", "+", "0", "0", "0"),
    ("oy", "+", "0", "0", "0"),
    ("p", "-", "s", "l", "-"),
    ("pau", "-", "0", "0", "-"),
    ("r", "-", "r", "a", "+"),
    ("s", "-", "f", "a", "-"),
    ("sh", "-", "f", "p", "-"),
    ("t", "-", "s", "a", "-"),
    ("th", "-", "f", "d", "-"),
    ("uh", "+", "0", "0", "0"),
    ("uw", "+", "0", "0", "0"),
    ("v", "-", "f", "b", "+"),
    ("w", "-", "r", "l", "+"),
    ("y", "-", "r", "p", "+"),
    ("z", "-", "f", "a", "+"),
    ("zh", "-", "f", "p", "+"),
];

/// The relation-independent silence phone.
pub const SILENCE: &str = "pau";

struct Entry {
    vc: &'static str,
    ctype: &'static str,
    cplace: &'static str,
    cvox: &'static str,
}

/// Phone name to feature lookup.
pub struct PhoneSet {
    phones: HashMap<&'static str, Entry>,
}

static US_ENGLISH: Lazy<PhoneSet> = Lazy::new(|| {
    let mut phones = HashMap::new();
    for &(phone, vc, ctype, cplace, cvox) in US_PHONES {
        phones.insert(
            phone,
            Entry {
                vc,
                ctype,
                cplace,
                cvox,
            },
        );
    }
    PhoneSet { phones }
});

impl PhoneSet {
    /// The built-in US English table.
    pub fn us_english() -> &'static PhoneSet {
        &US_ENGLISH
    }

    pub fn contains(&self, phone: &str) -> bool {
        self.phones.contains_key(phone)
    }

    /// One feature of one phone; `None` for unknown phones or feature names.
    pub fn feature(&self, phone: &str, name: &str) -> Option<&'static str> {
        let entry = self.phones.get(phone)?;
        match name {
            "vc" => Some(entry.vc),
            "ctype" => Some(entry.ctype),
            "cplace" => Some(entry.cplace),
            "cvox" => Some(entry.cvox),
            _ => None,
        }
    }

    pub fn is_vowel(&self, phone: &str) -> bool {
        self.feature(phone, "vc") == Some("+")
    }

    pub fn is_silence(&self, phone: &str) -> bool {
        phone == SILENCE
    }
}
