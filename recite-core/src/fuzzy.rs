//! Fuzzy word matching
//!
//! Weighted edit distance over characters or word sequences, a length-relative
//! tolerance, and exact-match overrides from a homonym table and from the
//! recognizer's substitution hints.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RecitationConfig;
use crate::error::{Error, Result};
use crate::types::TokenState;

/// Cost of a substitution; insertions and deletions cost 1
pub const SUBSTITUTION_COST: f64 = 1.5;

/// Share of a word's length tolerated as edit distance
pub const FUZZ_RATIO: f64 = 0.30;

/// Minimum tolerance for any word
pub const FUZZ_FLOOR: f64 = 2.0;

/// Weighted edit distance between two sequences
///
/// Insertion and deletion cost 1, substitution costs `substitution_cost`.
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T], substitution_cost: f64) -> f64 {
    if a.is_empty() {
        return b.len() as f64;
    }
    if b.is_empty() {
        return a.len() as f64;
    }

    let mut prev: Vec<f64> = (0..=b.len()).map(|j| j as f64).collect();
    let mut curr = vec![0.0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i as f64;
        for j in 1..=b.len() {
            curr[j] = if a[i - 1] == b[j - 1] {
                prev[j - 1]
            } else {
                (prev[j] + 1.0) // deletion
                    .min(curr[j - 1] + 1.0) // insertion
                    .min(prev[j - 1] + substitution_cost) // substitution
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Edit distance between two sequences with the standard costs
pub fn distance<T: PartialEq>(a: &[T], b: &[T]) -> f64 {
    edit_distance(a, b, SUBSTITUTION_COST)
}

/// Character-level edit distance between two words
pub fn word_distance(a: &str, b: &str, substitution_cost: f64) -> f64 {
    if a == b {
        return 0.0;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    edit_distance(&a_chars, &b_chars, substitution_cost)
}

/// Maximum distance at which `word` still matches, with explicit tuning
pub fn threshold_for(word: &str, ratio: f64, floor: f64) -> f64 {
    let scaled = (word.chars().count() as f64 * ratio - 1e-9).ceil();
    scaled.max(floor)
}

/// Maximum distance at which `word` still matches: `max(2, ceil(len * 0.3))`
pub fn fuzzy_threshold(word: &str) -> f64 {
    threshold_for(word, FUZZ_RATIO, FUZZ_FLOOR)
}

/// Groups of interchangeable words, e.g. `["there", "their", "they're"]`
#[derive(Debug, Clone, Default)]
pub struct HomonymTable {
    groups: HashMap<String, usize>,
    group_count: usize,
}

impl HomonymTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from equivalence groups; a word listed twice keeps its last group
    pub fn from_groups<I, G, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for group in groups {
            let id = table.group_count;
            for word in group {
                table.groups.insert(word.as_ref().to_lowercase(), id);
            }
            table.group_count += 1;
        }
        table
    }

    /// Parse the JSON form: an array of arrays of words
    pub fn from_json(raw: &str) -> Result<Self> {
        let groups: Vec<Vec<String>> = serde_json::from_str(raw)
            .map_err(|e| Error::Homonyms(format!("Invalid homonym table: {e}")))?;
        Ok(Self::from_groups(groups))
    }

    /// Read the table from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Fetch the table from a URL
    pub async fn fetch(url: &str) -> Result<Self> {
        let raw = reqwest::get(url).await?.error_for_status()?.text().await?;
        Self::from_json(&raw)
    }

    /// Load from a file path or an http(s) URL
    pub async fn from_source(source: &str) -> Result<Self> {
        if source.starts_with("http://") || source.starts_with("https://") {
            Self::fetch(source).await
        } else {
            Self::from_file(Path::new(source))
        }
    }

    /// Whether the two words belong to the same group
    pub fn are_homonyms(&self, a: &str, b: &str) -> bool {
        match (self.groups.get(a), self.groups.get(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    pub fn group_count(&self) -> usize {
        self.group_count
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Homonym table shared between the matcher and a background loader
pub type SharedHomonyms = Arc<RwLock<HomonymTable>>;

/// Load a homonym table into a shared slot.
///
/// Failures are logged and leave the table empty; matching then relies on
/// edit distance alone. There is no retry.
pub async fn load_homonyms(shared: &SharedHomonyms, source: &str) -> bool {
    match HomonymTable::from_source(source).await {
        Ok(table) => {
            info!(
                "Loaded {} homonym groups from {}",
                table.group_count(),
                source
            );
            *shared.write() = table;
            true
        }
        Err(e) => {
            warn!("Failed to load homonym table from {}: {}", source, e);
            false
        }
    }
}

/// Word-level matcher combining distance, homonyms and substitution hints
#[derive(Debug, Clone)]
pub struct Matcher {
    ratio: f64,
    floor: f64,
    substitution_cost: f64,
    homonyms: SharedHomonyms,
    /// Target word -> alternatives the recognizer tends to produce for it
    hints: HashMap<String, Vec<String>>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(&RecitationConfig::default(), SharedHomonyms::default())
    }
}

impl Matcher {
    pub fn new(config: &RecitationConfig, homonyms: SharedHomonyms) -> Self {
        Self {
            ratio: config.fuzz_ratio,
            floor: config.fuzz_floor,
            substitution_cost: config.substitution_cost,
            homonyms,
            hints: HashMap::new(),
        }
    }

    pub fn homonyms(&self) -> &SharedHomonyms {
        &self.homonyms
    }

    pub fn substitution_cost(&self) -> f64 {
        self.substitution_cost
    }

    /// Replace the recognizer's substitution hints
    pub fn set_hints(&mut self, hints: HashMap<String, Vec<String>>) {
        debug!("Substitution hints updated: {} words", hints.len());
        self.hints = hints
            .into_iter()
            .map(|(word, alternatives)| {
                (
                    word.to_lowercase(),
                    alternatives
                        .into_iter()
                        .map(|a| {
                            a.split_whitespace()
                                .map(str::to_lowercase)
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .filter(|a| !a.is_empty())
                        .collect(),
                )
            })
            .collect();
    }

    pub fn hints(&self) -> &HashMap<String, Vec<String>> {
        &self.hints
    }

    /// Whether the recognizer flagged `word` as hard to recognize
    pub fn is_hard_word(&self, word: &str) -> bool {
        self.hints.contains_key(word)
    }

    pub fn threshold(&self, word: &str) -> f64 {
        threshold_for(word, self.ratio, self.floor)
    }

    pub fn are_homonyms(&self, a: &str, b: &str) -> bool {
        self.homonyms.read().are_homonyms(a, b)
    }

    /// Spoken `user` counts as target `target` by spelling or homonym
    pub fn is_match(&self, user: &str, target: &str) -> bool {
        word_distance(user, target, self.substitution_cost) <= self.threshold(target)
            || self.are_homonyms(user, target)
    }

    /// `user` is a substitute the recognizer reported for `target`
    pub fn is_hinted(&self, user: &str, target: &str) -> bool {
        self.hints
            .get(target)
            .is_some_and(|alternatives| alternatives.iter().any(|a| a == user))
    }

    /// Join spoken runs that spell a multi-word substitute into one word
    ///
    /// The joined word then classifies as `Matched` against its target.
    /// Longest substitute wins at each position.
    pub fn collapse_phrases(&self, words: &[String]) -> Vec<String> {
        let phrases: Vec<Vec<&str>> = self
            .hints
            .values()
            .flatten()
            .map(|a| a.split(' ').collect::<Vec<_>>())
            .filter(|p| p.len() > 1)
            .collect();
        if phrases.is_empty() {
            return words.to_vec();
        }

        let mut out = Vec::with_capacity(words.len());
        let mut i = 0;
        while i < words.len() {
            let rest = &words[i..];
            let longest = phrases
                .iter()
                .filter(|p| {
                    p.len() <= rest.len() && p.iter().zip(rest).all(|(a, b)| b.as_str() == *a)
                })
                .map(Vec::len)
                .max();
            match longest {
                Some(n) => {
                    out.push(rest[..n].join(" "));
                    i += n;
                }
                None => {
                    out.push(words[i].clone());
                    i += 1;
                }
            }
        }
        out
    }

    /// Outcome of hearing `user` where `target` was expected
    pub fn classify(&self, user: &str, target: &str) -> Option<TokenState> {
        if self.is_match(user, target) {
            Some(TokenState::Correct)
        } else if self.is_hinted(user, target) {
            Some(TokenState::Matched)
        } else {
            None
        }
    }

    /// Sequence distance between two word lists
    pub fn sequence_distance<T: PartialEq>(&self, a: &[T], b: &[T]) -> f64 {
        edit_distance(a, b, self.substitution_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher_with(groups: &[&[&str]]) -> Matcher {
        let table = HomonymTable::from_groups(groups.iter().map(|g| g.iter()));
        Matcher::new(
            &RecitationConfig::default(),
            Arc::new(RwLock::new(table)),
        )
    }

    #[test]
    fn test_word_distance_costs() {
        assert_eq!(word_distance("god", "god", SUBSTITUTION_COST), 0.0);
        // one deletion
        assert_eq!(word_distance("gods", "god", SUBSTITUTION_COST), 1.0);
        // one substitution
        assert_eq!(word_distance("cod", "god", SUBSTITUTION_COST), 1.5);
        assert_eq!(word_distance("", "abc", SUBSTITUTION_COST), 3.0);
        // substitution never costs more than delete + insert
        assert_eq!(word_distance("a", "b", 3.0), 2.0);
    }

    #[test]
    fn test_sequence_distance() {
        let a = ["in", "the", "beginning"];
        let b = ["in", "da", "beginning"];
        assert_eq!(distance(&a, &b), 1.5);
        assert_eq!(distance(&a[..2], &a), 1.0);
        assert_eq!(distance::<&str>(&[], &[]), 0.0);
    }

    #[test]
    fn test_threshold_floor_and_scaling() {
        assert_eq!(fuzzy_threshold("a"), 2.0);
        assert_eq!(fuzzy_threshold("the"), 2.0);
        assert_eq!(fuzzy_threshold("created"), 3.0);
        assert_eq!(fuzzy_threshold("beginning"), 3.0);
        assert_eq!(fuzzy_threshold("righteousness"), 4.0);
    }

    #[test]
    fn test_threshold_monotonic() {
        let mut previous = 0.0;
        for len in 0..40 {
            let word = "x".repeat(len);
            let threshold = fuzzy_threshold(&word);
            assert!(threshold >= 2.0);
            assert!(threshold >= previous, "threshold dropped at length {len}");
            previous = threshold;
        }
    }

    #[test]
    fn test_is_match_fuzzy() {
        let matcher = Matcher::default();
        assert!(matcher.is_match("beginnin", "beginning"));
        assert!(matcher.is_match("created", "created"));
        assert!(matcher.is_match("cod", "god"));
        assert!(!matcher.is_match("dog", "god"));
        assert!(!matcher.is_match("in", "the"));
    }

    #[test]
    fn test_homonym_override() {
        let matcher = matcher_with(&[&["there", "their", "they're"]]);
        assert!(matcher.are_homonyms("their", "they're"));
        assert!(matcher.is_match("their", "they're"));
        assert!(!matcher.are_homonyms("there", "here"));
    }

    #[test]
    fn test_homonym_table_json() {
        let table = HomonymTable::from_json(r#"[["Son", "sun"], ["know", "no"]]"#).unwrap();
        assert_eq!(table.group_count(), 2);
        assert!(table.are_homonyms("son", "sun"));
        assert!(!table.are_homonyms("son", "no"));

        let err = HomonymTable::from_json(r#"{"son": "sun"}"#).unwrap_err();
        assert!(matches!(err, Error::Homonyms(_)));
    }

    #[test]
    fn test_empty_table_fails_open() {
        let matcher = Matcher::default();
        assert!(!matcher.are_homonyms("son", "sun"));
        // distance still catches it
        assert!(matcher.is_match("son", "sun"));
    }

    #[test]
    fn test_classify_with_hints() {
        let mut matcher = Matcher::default();
        let mut hints = HashMap::new();
        hints.insert("Melchizedek".to_string(), vec!["Mel".to_string()]);
        matcher.set_hints(hints);

        assert!(matcher.is_hard_word("melchizedek"));
        assert_eq!(
            matcher.classify("melchizedek", "melchizedek"),
            Some(TokenState::Correct)
        );
        assert_eq!(
            matcher.classify("mel", "melchizedek"),
            Some(TokenState::Matched)
        );
        assert_eq!(matcher.classify("bread", "melchizedek"), None);
    }

    #[test]
    fn test_collapse_multi_word_substitutes() {
        let mut matcher = Matcher::default();
        let mut hints = HashMap::new();
        hints.insert(
            "melchizedek".to_string(),
            vec![
                "Mel  Kiss a Deck".to_string(),
                "mel kiss".to_string(),
                "melchior".to_string(),
            ],
        );
        matcher.set_hints(hints);

        let words: Vec<String> = ["and", "mel", "kiss", "a", "deck", "king", "mel", "kiss"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let collapsed = matcher.collapse_phrases(&words);

        assert_eq!(collapsed, vec!["and", "mel kiss a deck", "king", "mel kiss"]);
        assert_eq!(
            matcher.classify("mel kiss a deck", "melchizedek"),
            Some(TokenState::Matched)
        );
        // a partial run is left alone
        let partial: Vec<String> = vec!["mel".to_string(), "king".to_string()];
        assert_eq!(matcher.collapse_phrases(&partial), partial);
    }

    #[tokio::test]
    async fn test_load_homonyms_failure_leaves_table_empty() {
        let shared = SharedHomonyms::default();
        let loaded = load_homonyms(&shared, "/nonexistent/homonyms.json").await;
        assert!(!loaded);
        assert!(shared.read().is_empty());
    }

    #[tokio::test]
    async fn test_load_homonyms_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("homonyms.json");
        std::fs::write(&path, r#"[["seen", "scene"]]"#).unwrap();

        let shared = SharedHomonyms::default();
        assert!(load_homonyms(&shared, path.to_str().unwrap()).await);
        assert!(shared.read().are_homonyms("seen", "scene"));
    }
}
