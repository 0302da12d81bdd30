//! Token-to-word expansion: numbers, ordinals, years, letter runs.
//!
//! Turns the Token relation into the Word relation. Each token is classified
//! (plain word, cardinal, ordinal, digit string, year/ID, real, clock time,
//! fraction, letter run, apostrophe form) and expanded into lowercase spoken
//! words. Every word is attached as a daughter of its source token and
//! appended to the Word relation sharing the same content node, so later
//! stages can walk back through `R:Token.parent` for punctuation context.

use fancy_regex::Regex;
use once_cell::sync::Lazy;

use crate::cart::Cart;
use crate::path::FeaturePath;
use crate::pipeline::{ProcessError, UtteranceProcessor};
use crate::utterance::{ItemId, Utterance, TOKEN, WORD};

// ─────────────────────────────────────────────────────────────────────────────
// Number word tables
// ─────────────────────────────────────────────────────────────────────────────

const DIGIT2NUM: &[&str] = &[
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];
const DIGIT2TEEN: &[&str] = &[
    "ten", "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen",
    "seventeen", "eighteen", "nineteen",
];
const DIGIT2ENTY: &[&str] = &[
    "zero", "ten", "twenty", "thirty", "forty", "fifty", "sixty", "seventy",
    "eighty", "ninety",
];
const ORD2NUM: &[&str] = &[
    "zeroth", "first", "second", "third", "fourth", "fifth", "sixth", "seventh",
    "eighth", "ninth",
];
const ORD2TEEN: &[&str] = &[
    "tenth", "eleventh", "twelfth", "thirteenth", "fourteenth", "fifteenth",
    "sixteenth", "seventeenth", "eighteenth", "nineteenth",
];
const ORD2ENTY: &[&str] = &[
    "zeroth", "tenth", "twentieth", "thirtieth", "fortieth", "fiftieth",
    "sixtieth", "seventieth", "eightieth", "ninetieth",
];

fn digit_word(table: &[&'static str], c: u8) -> &'static str {
    if c.is_ascii_digit() {
        table[(c - b'0') as usize]
    } else {
        "umpty"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Expansion functions
// ─────────────────────────────────────────────────────────────────────────────

/// Expand a digit string as a cardinal number ("123" -> one hundred twenty
/// three). Strings of thirteen digits or more are read digit by digit.
pub fn expand_number(number: &str, words: &mut Vec<String>) {
    match number.len() {
        0 => {}
        1 => expand_digits(number, words),
        2 => expand_2digit(number, words),
        3 => expand_3digit(number, words),
        4..=6 => expand_large(number, "thousand", 3, words),
        7..=9 => expand_large(number, "million", 6, words),
        10..=12 => expand_large(number, "billion", 9, words),
        _ => expand_digits(number, words),
    }
}

fn expand_2digit(number: &str, words: &mut Vec<String>) {
    let b = number.as_bytes();
    if b[0] == b'0' {
        if b[1] != b'0' {
            words.push(digit_word(DIGIT2NUM, b[1]).to_string());
        }
    } else if b[1] == b'0' {
        words.push(digit_word(DIGIT2ENTY, b[0]).to_string());
    } else if b[0] == b'1' {
        words.push(digit_word(DIGIT2TEEN, b[1]).to_string());
    } else {
        words.push(digit_word(DIGIT2ENTY, b[0]).to_string());
        expand_digits(&number[1..], words);
    }
}

fn expand_3digit(number: &str, words: &mut Vec<String>) {
    let b = number.as_bytes();
    if b[0] != b'0' {
        words.push(digit_word(DIGIT2NUM, b[0]).to_string());
        words.push("hundred".to_string());
    }
    expand_number(&number[1..], words);
}

fn expand_large(number: &str, order: &str, zeroes: usize, words: &mut Vec<String>) {
    let split = number.len() - zeroes;
    let before = words.len();
    expand_number(&number[..split], words);
    // A prefix of all zeroes expands to nothing; then the order word is
    // dropped too ("000123" is just one hundred twenty three).
    if words.len() > before {
        words.push(order.to_string());
    }
    expand_number(&number[split..], words);
}

/// Read a string digit by digit; non-digits come out as "umpty".
pub fn expand_digits(number: &str, words: &mut Vec<String>) {
    for c in number.bytes() {
        words.push(digit_word(DIGIT2NUM, c).to_string());
    }
}

/// Expand a digit string as an ordinal ("15" -> fifteenth). Commas are
/// stripped first; only the final word is ordinalised.
pub fn expand_ordinal(raw: &str, words: &mut Vec<String>) {
    let digits: String = raw.chars().filter(|&c| c != ',').collect();
    expand_number(&digits, words);
    let ordinal = match words.last().map(String::as_str) {
        Some("hundred") => Some("hundredth"),
        Some("thousand") => Some("thousandth"),
        Some("billion") => Some("billionth"),
        Some(last) => find_ordinal(last),
        None => None,
    };
    if let Some(ordinal) = ordinal {
        let n = words.len();
        words[n - 1] = ordinal.to_string();
    }
}

fn find_ordinal(cardinal: &str) -> Option<&'static str> {
    for (cardinals, ordinals) in [
        (DIGIT2NUM, ORD2NUM),
        (DIGIT2TEEN, ORD2TEEN),
        (DIGIT2ENTY, ORD2ENTY),
    ] {
        if let Some(i) = cardinals.iter().position(|&w| w == cardinal) {
            return Some(ordinals[i]);
        }
    }
    None
}

/// Expand a digit string in pairs, as years and IDs are spoken
/// ("1984" -> nineteen eighty four, "07" -> oh seven).
pub fn expand_id(number: &str, words: &mut Vec<String>) {
    let b = number.as_bytes();
    let n = b.len();
    if n == 2 && b[0] == b'0' {
        words.push("oh".to_string());
        expand_digits(&number[1..2], words);
    } else if (n == 4 && b[1] == b'0') || n < 3 {
        expand_number(number, words);
    } else if n % 2 == 1 {
        words.push(digit_word(DIGIT2NUM, b[0]).to_string());
        expand_id(&number[1..], words);
    } else {
        expand_number(&number[..2], words);
        expand_id(&number[2..], words);
    }
}

/// Expand a real-number string, including signs, exponents and the
/// decimal point ("-1.5" -> minus one point five).
pub fn expand_real(number: &str, words: &mut Vec<String>) {
    if let Some(rest) = number.strip_prefix('-') {
        words.push("minus".to_string());
        expand_real(rest, words);
    } else if let Some(rest) = number.strip_prefix('+') {
        words.push("plus".to_string());
        expand_real(rest, words);
    } else if let Some(pos) = number.find(|c| c == 'e' || c == 'E') {
        expand_real(&number[..pos], words);
        words.push("e".to_string());
        expand_real(&number[pos + 1..], words);
    } else if let Some(pos) = number.find('.') {
        expand_real(&number[..pos], words);
        words.push("point".to_string());
        expand_real(&number[pos + 1..], words);
    } else {
        expand_number(number, words);
    }
}

/// Spell a string letter by letter. Embedded digits become number words,
/// and a lone "a" becomes the "_a" pronunciation marker.
pub fn expand_letters(letters: &str, words: &mut Vec<String>) {
    let lower = letters.to_lowercase();
    for c in lower.chars() {
        if c.is_ascii_digit() {
            words.push(digit_word(DIGIT2NUM, c as u8).to_string());
        } else if lower == "a" {
            words.push("_a".to_string());
        } else {
            words.push(c.to_string());
        }
    }
}

/// Value of a Roman numeral built from I, V and X.
pub fn expand_roman(roman: &str) -> i32 {
    let b = roman.as_bytes();
    let mut value = 0;
    let mut p = 0;
    while p < b.len() {
        match b[p] {
            b'X' => value += 10,
            b'V' => value += 5,
            b'I' => match b.get(p + 1) {
                Some(b'V') => {
                    value += 4;
                    p += 1;
                }
                Some(b'X') => {
                    value += 9;
                    p += 1;
                }
                _ => value += 1,
            },
            _ => {}
        }
        p += 1;
    }
    value
}

// ─────────────────────────────────────────────────────────────────────────────
// Token shape patterns (always matched against the whole token)
// ─────────────────────────────────────────────────────────────────────────────

static RE_ALPHABET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]+$").unwrap());
static RE_COMMA_INT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9][0-9]?[0-9]?,([0-9][0-9][0-9],)*[0-9][0-9][0-9](\.[0-9]+)?$").unwrap()
});
static RE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").unwrap());
static RE_DOTTED_ABBREV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]\.)*[A-Za-z]$").unwrap());
static RE_DOUBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(([0-9]+\.[0-9]*)|([0-9]+)|(\.[0-9]+))([eE][+-]?[0-9]+)?$").unwrap()
});
static RE_ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9][0-9,]*(th|TH|st|ST|nd|ND|rd|RD)$").unwrap());
static RE_CLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^((0[0-2])|(1[0-9])):([0-5][0-9])$").unwrap());
static RE_NUMESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+s$").unwrap());
static RE_ROMAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(II?I?|IV|VI?I?I?|IX|X[VIX]*)$").unwrap());
static RE_DIGITS_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(-[0-9]+)(-[0-9]+)+$").unwrap());
static RE_DIGITS_SLASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+/[0-9]+$").unwrap());
static RE_HAS_VOWEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[aeiouyAEIOUY]").unwrap());

fn matches(re: &Regex, s: &str) -> bool {
    re.is_match(s).unwrap_or(false)
}

// Context lookups shared by the classifier.
static PATH_PREV_NAME: Lazy<FeaturePath> = Lazy::new(|| FeaturePath::compile("p.name").unwrap());
static PATH_PREV_PUNC: Lazy<FeaturePath> = Lazy::new(|| FeaturePath::compile("p.punc").unwrap());
static PATH_PREV_PREV_NAME: Lazy<FeaturePath> =
    Lazy::new(|| FeaturePath::compile("p.p.name").unwrap());
static PATH_NEXT_NAME: Lazy<FeaturePath> = Lazy::new(|| FeaturePath::compile("n.name").unwrap());
static PATH_NEXT_WHITESPACE: Lazy<FeaturePath> =
    Lazy::new(|| FeaturePath::compile("n.whitespace").unwrap());

// ─────────────────────────────────────────────────────────────────────────────
// Roman numeral context
// ─────────────────────────────────────────────────────────────────────────────

// A Roman numeral is only read as a number when the previous words say so:
// regnal names take ordinals, section headings take cardinals, anything
// else is spelled out.
const KING_NAMES: &[&str] = &[
    "louis", "henry", "charles", "philip", "george", "edward", "pius",
    "william", "richard", "ptolemy", "john", "paul", "peter", "nicholas",
    "frederick", "james", "alfonso", "ivan", "napoleon", "leo", "gregory",
    "catherine", "alexandria", "pierre", "elizabeth", "mary",
];
const KING_TITLES: &[&str] = &[
    "king", "queen", "pope", "duke", "tsar", "emperor", "shah", "caesar",
    "duchess", "tsarina", "empress", "baron", "baroness", "sultan", "count",
    "countess",
];
const SECTION_TYPES: &[&str] = &[
    "section", "chapter", "part", "phrase", "verse", "scene", "act", "book",
    "volume", "chap", "war", "apollo", "trek", "fortran",
];

fn king_like(utt: &Utterance, token: ItemId) -> bool {
    let prev = PATH_PREV_NAME
        .find_string(utt, token)
        .unwrap_or_default()
        .to_lowercase();
    if KING_NAMES.contains(&prev.as_str()) {
        return true;
    }
    let prev2 = PATH_PREV_PREV_NAME
        .find_string(utt, token)
        .unwrap_or_default()
        .to_lowercase();
    KING_TITLES.contains(&prev2.as_str())
}

fn section_like(utt: &Utterance, token: ItemId) -> bool {
    let prev = PATH_PREV_NAME
        .find_string(utt, token)
        .unwrap_or_default()
        .to_lowercase();
    SECTION_TYPES.contains(&prev.as_str())
}

// ─────────────────────────────────────────────────────────────────────────────
// TokenToWords stage
// ─────────────────────────────────────────────────────────────────────────────

const POSTROPHES: &[&str] = &["'s", "'ll", "'ve", "'d"];

// Decides how a plain digit token is read out: leading zeroes and very long
// strings digit by digit, century-shaped values as years, the rest as
// cardinals.
const NUMBER_TREE: &str = "\
TOTAL 7
NODE name MATCHES 0[0-9]+ 2
LEAF digits
NODE name MATCHES (1[0-9]|20)[0-9][0-9] 4
LEAF year
NODE name MATCHES [0-9][0-9][0-9][0-9][0-9]+ 6
LEAF digits
LEAF number
";

static DEFAULT_NUMBER_TREE: Lazy<Cart> = Lazy::new(|| Cart::parse(NUMBER_TREE).unwrap());

/// Second pipeline stage: expand each token into Word items.
pub struct TokenToWords {
    number_tree: Cart,
}

impl TokenToWords {
    /// Use a custom digit-classification tree (verdicts: `number`,
    /// `ordinal`, `digits`, `year`).
    pub fn new(number_tree: Cart) -> Self {
        TokenToWords { number_tree }
    }
}

impl Default for TokenToWords {
    fn default() -> Self {
        TokenToWords::new(DEFAULT_NUMBER_TREE.clone())
    }
}

impl UtteranceProcessor for TokenToWords {
    fn name(&self) -> &'static str {
        "token_to_words"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let tokens = utt.require_relation(TOKEN)?;
        let words_rel = utt.create_relation(WORD)?;

        let token_items: Vec<ItemId> = utt.items(tokens).collect();
        for token in token_items {
            if utt.item_features(token).string("token_type") == Some("command") {
                continue;
            }
            let token_val = utt.name(token).unwrap_or_default().to_string();
            let mut words = Vec::new();
            self.token_to_words(utt, token, &token_val, &mut words);
            for word in words {
                if word.is_empty() {
                    continue;
                }
                let daughter = utt.create_daughter(token);
                utt.set_name(daughter, &word);
                utt.append_shared(words_rel, daughter);
            }
        }
        Ok(())
    }
}

impl TokenToWords {
    fn token_to_words(
        &self,
        utt: &mut Utterance,
        token: ItemId,
        token_val: &str,
        words: &mut Vec<String>,
    ) {
        let item_name = utt.name(token).unwrap_or_default().to_string();
        let len = token_val.len();

        if utt.item_features(token).is_present("phones") {
            // Pre-phonemized token, passed through for the lexicon stage.
            words.push(token_val.to_string());
        } else if (token_val == "a" || token_val == "A") && token_val != item_name {
            // "a" as a sub-part of a token is the letter, not the article.
            words.push("_a".to_string());
        } else if matches(&RE_ALPHABET, token_val) {
            if matches(&RE_ROMAN, token_val) {
                self.roman_to_words(utt, token, token_val, words);
            } else if token_val == "Mr" {
                utt.item_features_mut(token).set_string("punc", "");
                words.push("mister".to_string());
            } else if token_val == "Mrs" {
                utt.item_features_mut(token).set_string("punc", "");
                words.push("missus".to_string());
            } else if len == 1 && is_upper_initial(token_val) && next_is_upper_initial(utt, token)
            {
                // A run of single capitals ("U S A") is spelled out.
                utt.item_features_mut(token).set_string("punc", "");
                let lower = token_val.to_lowercase();
                if lower == "a" {
                    words.push("_a".to_string());
                } else {
                    words.push(lower);
                }
            } else if len > 1 && !matches(&RE_HAS_VOWEL, token_val) {
                expand_letters(token_val, words);
            } else {
                words.push(token_val.to_lowercase());
            }
        } else if matches(&RE_DOTTED_ABBREV, token_val) {
            let stripped: String = token_val.chars().filter(|&c| c != '.').collect();
            expand_letters(&stripped, words);
        } else if matches(&RE_COMMA_INT, token_val) {
            let stripped: String = token_val.chars().filter(|&c| c != ',').collect();
            expand_real(&stripped, words);
        } else if matches(&RE_CLOCK, token_val) {
            if let Some((hour, minute)) = token_val.split_once(':') {
                expand_number(hour, words);
                if minute != "00" {
                    expand_id(minute, words);
                }
            }
        } else if matches(&RE_DIGITS_DASH, token_val) {
            for group in token_val.split('-') {
                expand_digits(group, words);
            }
        } else if matches(&RE_DIGITS, token_val) {
            self.digits_to_words(utt, token, token_val, words);
        } else if matches(&RE_DOUBLE, token_val) {
            expand_real(token_val, words);
        } else if matches(&RE_ORDINAL, token_val) {
            expand_ordinal(&token_val[..len - 2], words);
        } else if token_val.ends_with('%') {
            self.token_to_words(utt, token, &token_val[..len - 1], words);
            words.push("per".to_string());
            words.push("cent".to_string());
        } else if matches(&RE_NUMESS, token_val) {
            self.token_to_words(utt, token, &token_val[..len - 1], words);
            words.push("'s".to_string());
        } else if token_val.contains('\'') {
            self.postrophe_to_words(utt, token, token_val, words);
        } else if matches(&RE_DIGITS_SLASH, token_val) && token_val == item_name {
            self.fraction_to_words(utt, token, token_val, words);
        } else if token_val.contains('-') {
            self.dash_to_words(utt, token, token_val, words);
        } else if len > 1 && !matches(&RE_ALPHABET, token_val) {
            self.split_mixed(utt, token, token_val, words);
        } else {
            words.push(token_val.to_lowercase());
        }
    }

    fn digits_to_words(
        &self,
        utt: &mut Utterance,
        token: ItemId,
        token_val: &str,
        words: &mut Vec<String>,
    ) {
        if utt.item_features(token).string("nsw") == Some("nide") {
            expand_id(token_val, words);
            return;
        }
        // The tree reads the token's name feature, so sub-tokens are swapped
        // in for the duration of the lookup.
        let real_name = utt.name(token).unwrap_or_default().to_string();
        let verdict = if token_val == real_name {
            self.classify_digits(utt, token)
        } else {
            utt.set_name(token, token_val);
            let v = self.classify_digits(utt, token);
            utt.set_name(token, &real_name);
            v
        };
        match verdict.as_str() {
            "ordinal" => expand_ordinal(token_val, words),
            "digits" => expand_digits(token_val, words),
            "year" => expand_id(token_val, words),
            _ => expand_number(token_val, words),
        }
    }

    fn classify_digits(&self, utt: &Utterance, token: ItemId) -> String {
        self.number_tree
            .interpret_string(utt, token)
            .unwrap_or("number")
            .to_string()
    }

    fn roman_to_words(
        &self,
        utt: &Utterance,
        token: ItemId,
        token_val: &str,
        words: &mut Vec<String>,
    ) {
        // Only a numeral with an unpunctuated predecessor is read as a
        // number; at the start of text or after punctuation it is spelled.
        if PATH_PREV_PUNC.find_string(utt, token).as_deref() == Some("") {
            let value = expand_roman(token_val).to_string();
            if king_like(utt, token) {
                words.push("the".to_string());
                expand_ordinal(&value, words);
            } else if section_like(utt, token) {
                expand_number(&value, words);
            } else {
                expand_letters(token_val, words);
            }
        } else {
            expand_letters(token_val, words);
        }
    }

    fn postrophe_to_words(
        &self,
        utt: &mut Utterance,
        token: ItemId,
        token_val: &str,
        words: &mut Vec<String>,
    ) {
        let index = match token_val.find('\'') {
            Some(i) => i,
            None => return,
        };
        let suffix = token_val[index..].to_lowercase();
        if POSTROPHES.contains(&suffix.as_str()) {
            self.token_to_words(utt, token, &token_val[..index], words);
            words.push(suffix);
        } else if suffix == "'tve" {
            if let Some(stem) = token_val.get(..index.saturating_sub(2)) {
                let stem = stem.to_string();
                self.token_to_words(utt, token, &stem, words);
            }
            words.push("'ve".to_string());
        } else {
            // Internal single quote dropped ("o'clock" -> "oclock").
            let mut cleaned = token_val.to_string();
            cleaned.remove(index);
            self.token_to_words(utt, token, &cleaned, words);
        }
    }

    fn fraction_to_words(
        &self,
        utt: &mut Utterance,
        token: ItemId,
        token_val: &str,
        words: &mut Vec<String>,
    ) {
        let (num, den) = match token_val.split_once('/') {
            Some(parts) => parts,
            None => return,
        };
        let after_number = PATH_PREV_NAME
            .find_string(utt, token)
            .map_or(false, |p| matches(&RE_DIGITS, &p));
        if after_number {
            words.push("and".to_string());
        }
        if num == "1" && den == "2" {
            words.push("a".to_string());
            words.push("half".to_string());
            return;
        }
        let a: i64 = num.parse().unwrap_or(0);
        let b: i64 = den.parse().unwrap_or(0);
        if a < b {
            expand_number(num, words);
            expand_ordinal(den, words);
            if a > 1 {
                words.push("'s".to_string());
            }
        } else {
            expand_number(num, words);
            words.push("slash".to_string());
            expand_number(den, words);
        }
    }

    fn dash_to_words(
        &self,
        utt: &mut Utterance,
        token: ItemId,
        token_val: &str,
        words: &mut Vec<String>,
    ) {
        let (left, right) = match token_val.split_once('-') {
            Some(parts) => parts,
            None => return,
        };
        if matches(&RE_DIGITS, left) && matches(&RE_DIGITS, right) {
            // A numeric range ("5-10") reads as "five to ten"; the name is
            // swapped per side so the digit tree sees each half.
            let original = utt.name(token).unwrap_or_default().to_string();
            utt.set_name(token, left);
            self.token_to_words(utt, token, left, words);
            words.push("to".to_string());
            utt.set_name(token, right);
            self.token_to_words(utt, token, right, words);
            utt.set_name(token, &original);
        } else {
            self.token_to_words(utt, token, left, words);
            self.token_to_words(utt, token, right, words);
        }
    }

    fn split_mixed(
        &self,
        utt: &mut Utterance,
        token: ItemId,
        token_val: &str,
        words: &mut Vec<String>,
    ) {
        let chars: Vec<char> = token_val.chars().collect();
        if chars.len() < 2 {
            words.push(token_val.to_lowercase());
            return;
        }
        let mut index = 0;
        while index + 1 < chars.len() {
            if splittable(chars[index], chars[index + 1]) {
                break;
            }
            index += 1;
        }
        let split_at: usize = chars[..=index].iter().map(|c| c.len_utf8()).sum();
        let left = token_val[..split_at].to_string();
        let right = token_val[split_at..].to_string();
        // Digit runs carved out of mixed tokens are read as IDs.
        utt.item_features_mut(token).set_string("nsw", "nide");
        self.token_to_words(utt, token, &left, words);
        self.token_to_words(utt, token, &right, words);
    }
}

fn is_upper_initial(s: &str) -> bool {
    s.chars().next().map_or(false, |c| c.is_ascii_uppercase())
}

fn next_is_upper_initial(utt: &Utterance, token: ItemId) -> bool {
    PATH_NEXT_WHITESPACE.find_string(utt, token).as_deref() == Some(" ")
        && PATH_NEXT_NAME
            .find_string(utt, token)
            .map_or(false, |n| is_upper_initial(&n))
}

// The split point in a mixed token falls wherever the character class
// changes (letters/digits/other).
fn splittable(c0: char, c1: char) -> bool {
    !((c0.is_ascii_alphabetic() && c1.is_ascii_alphabetic())
        || (c0.is_ascii_digit() && c1.is_ascii_digit()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
