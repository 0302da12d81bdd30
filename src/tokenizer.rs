//! Symbol-set driven tokenizer.
//!
//! Splits raw text into tokens of four parts: leading whitespace, leading
//! punctuation, the word itself, and trailing punctuation. Which characters
//! count as whitespace/punctuation is configurable per locale; the defaults
//! are the US English sets. Markup front ends may embed out-of-band command
//! runs as `/element …/`; the tokenizer passes those through as single
//! command tokens so downstream stages can skip them.

use crate::pipeline::{ProcessError, UtteranceProcessor};
use crate::utterance::{self, Utterance};

/// US English defaults.
pub const WHITESPACE_SYMBOLS: &str = " \t\n\r";
pub const SINGLE_CHAR_SYMBOLS: &str = "";
pub const PREPUNCTUATION_SYMBOLS: &str = "\"'`({[";
pub const PUNCTUATION_SYMBOLS: &str = "\"'`.,:;!?(){}[]";

/// One token of input text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Whitespace that preceded the word.
    pub whitespace: String,
    /// Opening punctuation, e.g. `(` or a leading quote.
    pub prepunctuation: String,
    /// The word itself (or the full `/…/` run for commands).
    pub name: String,
    /// Trailing punctuation, e.g. `,` or `!`.
    pub postpunctuation: String,
    /// Character offset of the word start in the input.
    pub position: usize,
    /// Out-of-band command marker run.
    pub is_command: bool,
}

/// Configurable splitter. Construction is cheap; the tokenizer holds no
/// state between [`Tokenizer::tokenize`] calls.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    whitespace: String,
    single_chars: String,
    prepunctuation: String,
    postpunctuation: String,
    parse_commands: bool,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Tokenizer {
            whitespace: WHITESPACE_SYMBOLS.to_string(),
            single_chars: SINGLE_CHAR_SYMBOLS.to_string(),
            prepunctuation: PREPUNCTUATION_SYMBOLS.to_string(),
            postpunctuation: PUNCTUATION_SYMBOLS.to_string(),
            parse_commands: true,
        }
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn whitespace_symbols(mut self, symbols: &str) -> Self {
        self.whitespace = symbols.to_string();
        self
    }

    pub fn single_char_symbols(mut self, symbols: &str) -> Self {
        self.single_chars = symbols.to_string();
        self
    }

    pub fn prepunctuation_symbols(mut self, symbols: &str) -> Self {
        self.prepunctuation = symbols.to_string();
        self
    }

    pub fn postpunctuation_symbols(mut self, symbols: &str) -> Self {
        self.postpunctuation = symbols.to_string();
        self
    }

    pub fn parse_commands(mut self, enabled: bool) -> Self {
        self.parse_commands = enabled;
        self
    }

    /// Split `text` into tokens. Tokens with an empty word (e.g. trailing
    /// whitespace) are not returned.
    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        let chars: Vec<char> = text.chars().collect();
        let mut pos = 0usize;
        let mut tokens = Vec::new();

        while pos < chars.len() {
            let whitespace = self.take_class(&chars, &mut pos, &self.whitespace);
            let prepunctuation = self.take_class(&chars, &mut pos, &self.prepunctuation);
            let word_start = pos;

            let (name, is_command) = if pos >= chars.len() {
                (String::new(), false)
            } else if self.parse_commands && chars[pos] == '/' {
                match self.take_command(&chars, &mut pos) {
                    Some(cmd) => (cmd, true),
                    None => (self.take_word(&chars, &mut pos), false),
                }
            } else if self.single_chars.contains(chars[pos]) {
                let c = chars[pos];
                pos += 1;
                (c.to_string(), false)
            } else {
                (self.take_word(&chars, &mut pos), false)
            };

            let (name, postpunctuation) = if is_command {
                (name, String::new())
            } else {
                split_postpunctuation(name, &self.postpunctuation)
            };

            if name.is_empty() && !is_command {
                continue;
            }
            tokens.push(Token {
                whitespace,
                prepunctuation,
                name,
                postpunctuation,
                position: word_start,
                is_command,
            });
        }
        tokens
    }

    fn take_class(&self, chars: &[char], pos: &mut usize, class: &str) -> String {
        let start = *pos;
        while *pos < chars.len() && class.contains(chars[*pos]) {
            *pos += 1;
        }
        chars[start..*pos].iter().collect()
    }

    fn take_word(&self, chars: &[char], pos: &mut usize) -> String {
        let start = *pos;
        while *pos < chars.len()
            && !self.whitespace.contains(chars[*pos])
            && !self.single_chars.contains(chars[*pos])
        {
            *pos += 1;
        }
        chars[start..*pos].iter().collect()
    }

    /// Consume a `/…/` command run. The closing slash must appear before
    /// the next newline, otherwise this is not a command and the caller
    /// falls back to plain word handling.
    fn take_command(&self, chars: &[char], pos: &mut usize) -> Option<String> {
        let mut end = *pos + 1;
        while end < chars.len() {
            match chars[end] {
                '/' => {
                    let cmd: String = chars[*pos..=end].iter().collect();
                    *pos = end + 1;
                    return Some(cmd);
                }
                '\n' => return None,
                _ => end += 1,
            }
        }
        None
    }
}

/// Move trailing punctuation characters out of the word.
fn split_postpunctuation(word: String, class: &str) -> (String, String) {
    let chars: Vec<char> = word.chars().collect();
    let mut cut = chars.len();
    while cut > 0 && class.contains(chars[cut - 1]) {
        cut -= 1;
    }
    if cut == chars.len() {
        (word, String::new())
    } else {
        (
            chars[..cut].iter().collect(),
            chars[cut..].iter().collect(),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline stage
// ─────────────────────────────────────────────────────────────────────────────

/// First pipeline stage: populate the `Token` relation from the utterance
/// text. Token features: `name`, `whitespace`, `prepunctuation`, `punc`,
/// and `token_type=command` for command runs.
pub struct TokenizerStage {
    tokenizer: Tokenizer,
}

impl TokenizerStage {
    pub fn new(tokenizer: Tokenizer) -> Self {
        TokenizerStage { tokenizer }
    }
}

impl Default for TokenizerStage {
    fn default() -> Self {
        TokenizerStage::new(Tokenizer::default())
    }
}

impl UtteranceProcessor for TokenizerStage {
    fn name(&self) -> &'static str {
        "tokenizer"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let rel = utt.create_relation(utterance::TOKEN)?;
        let tokens = self.tokenizer.tokenize(utt.text());
        for token in tokens {
            let item = utt.append(rel);
            let features = utt.item_features_mut(item);
            features.set_string("name", &token.name);
            features.set_string("whitespace", &token.whitespace);
            features.set_string("prepunctuation", &token.prepunctuation);
            features.set_string("punc", &token.postpunctuation);
            if token.is_command {
                features.set_string("token_type", "command");
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
