//! Passage tokenization
//!
//! Splits scripture text into comparable words while keeping every byte of the
//! text between them, so the passage can be rendered back exactly.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// A word is a run of letters, apostrophes or underscores
static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}'’_]+").expect("word pattern is valid"));

/// Words of a text plus the separators around them
///
/// `separators.len() == words.len() + 1`: `separators[0]` precedes the first
/// word and `separators[n]` trails the last one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokenized {
    pub words: Vec<String>,
    pub separators: Vec<String>,
}

impl Tokenized {
    /// Reassemble the original text
    pub fn reconstruct(&self) -> String {
        let mut out = self.separators[0].clone();
        for (word, separator) in self.words.iter().zip(&self.separators[1..]) {
            out.push_str(word);
            out.push_str(separator);
        }
        out
    }
}

/// Split text into words and the separator text between them
pub fn tokenize(text: &str) -> Tokenized {
    let mut words = Vec::new();
    let mut separators = Vec::new();
    let mut last_end = 0;

    for m in WORD_PATTERN.find_iter(text) {
        separators.push(text[last_end..m.start()].to_string());
        words.push(m.as_str().to_string());
        last_end = m.end();
    }
    separators.push(text[last_end..].to_string());

    Tokenized { words, separators }
}

/// Lowercased comparison words of a text
pub fn normalize_words(text: &str) -> Vec<String> {
    WORD_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// One word of the target passage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetToken {
    /// Original-case text
    pub display: String,
    /// Lowercased text used for matching
    pub word: String,
    /// Text following this word up to the next one
    pub separator: String,
    pub verse_index: usize,
    /// Index of the word within its verse
    pub word_index: usize,
}

impl TargetToken {
    /// Whether a line or verse break follows this word
    pub fn ends_line(&self) -> bool {
        self.separator.contains('\n')
    }
}

/// The static target text of a session: one or more verses, flattened
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Text before the first word
    leading: String,
    tokens: Vec<TargetToken>,
    verse_count: usize,
}

impl Passage {
    /// Build a passage from a single block of text
    pub fn from_text(text: &str) -> Self {
        Self::from_verses(&[text])
    }

    /// Build a passage from verses; verses are joined by a line break
    pub fn from_verses<S: AsRef<str>>(verses: &[S]) -> Self {
        let mut leading = String::new();
        let mut tokens: Vec<TargetToken> = Vec::new();

        for (verse_index, verse) in verses.iter().enumerate() {
            let tokenized = tokenize(verse.as_ref());

            let mut prefix = if verse_index > 0 {
                "\n".to_string()
            } else {
                String::new()
            };
            prefix.push_str(&tokenized.separators[0]);
            match tokens.last_mut() {
                Some(previous) => previous.separator.push_str(&prefix),
                None => leading.push_str(&prefix),
            }

            for (word_index, display) in tokenized.words.iter().enumerate() {
                tokens.push(TargetToken {
                    word: display.to_lowercase(),
                    display: display.clone(),
                    separator: tokenized.separators[word_index + 1].clone(),
                    verse_index,
                    word_index,
                });
            }
        }

        Self {
            leading,
            tokens,
            verse_count: verses.len(),
        }
    }

    pub fn tokens(&self) -> &[TargetToken] {
        &self.tokens
    }

    pub fn leading(&self) -> &str {
        &self.leading
    }

    /// Lowercased target words, in order
    pub fn words(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.word.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn verse_count(&self) -> usize {
        self.verse_count
    }

    /// The full passage text, verses separated by line breaks
    pub fn text(&self) -> String {
        let mut out = self.leading.clone();
        for token in &self.tokens {
            out.push_str(&token.display);
            out.push_str(&token.separator);
        }
        out
    }
}
