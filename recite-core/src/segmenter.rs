//! Chunk segmentation of the recognized word stream
//!
//! The stream is cut wherever consecutive words stop landing near each other in
//! the target (a repeat, a skip, or a garbled run), then chunks too short to
//! anchor a window search on their own are folded into a neighbour.

use std::ops::Range;
use tracing::trace;

use crate::fuzzy::Matcher;
use crate::types::TokenState;

/// A contiguous run of recognized words aligned as a unit
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Offset of the first word within the recognized stream
    pub start: usize,
    pub words: Vec<String>,
    /// Target indices each word fuzzily matches
    pub candidates: Vec<Vec<usize>>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Target-length array marking every index some word of the chunk matched
    pub fn evidence(&self, target_len: usize) -> Vec<TokenState> {
        let mut evidence = vec![TokenState::Unset; target_len];
        for &index in self.candidates.iter().flatten() {
            if index < target_len {
                evidence[index] = TokenState::Matched;
            }
        }
        evidence
    }
}

/// For each user word, every target index it fuzzily matches
pub fn candidate_matches(
    matcher: &Matcher,
    user: &[String],
    target: &[String],
) -> Vec<Vec<usize>> {
    user.iter()
        .map(|word| {
            target
                .iter()
                .enumerate()
                .filter(|(_, t)| matcher.classify(word, t).is_some())
                .map(|(j, _)| j)
                .collect()
        })
        .collect()
}

/// Indices `i` such that the stream is cut before word `i`
///
/// A cut needs both word `i` and word `i - 1` to have candidates, and none of
/// word `i`'s candidates within `window` tokens after one of word `i - 1`'s.
pub fn split_points(candidates: &[Vec<usize>], window: usize) -> Vec<usize> {
    (1..candidates.len())
        .filter(|&i| {
            let previous = &candidates[i - 1];
            let current = &candidates[i];
            if previous.is_empty() || current.is_empty() {
                return false;
            }
            let continues = current
                .iter()
                .any(|&c| previous.iter().any(|&p| c > p && c - p <= window));
            !continues
        })
        .collect()
}

/// Fold ranges shorter than `min_len` into a neighbour
///
/// Short ranges join the preceding range; a short leading range absorbs the
/// next one. A stream shorter than `min_len` overall yields nothing.
pub fn merge_short(ranges: Vec<Range<usize>>, min_len: usize) -> Vec<Range<usize>> {
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());

    for range in ranges {
        if let Some(last) = merged.last_mut()
            && (range.len() < min_len || last.len() < min_len)
        {
            last.end = range.end;
            continue;
        }
        merged.push(range);
    }

    merged.retain(|r| r.len() >= min_len);
    merged
}

/// Segment the recognized stream into chunks for independent alignment
pub fn segment(
    matcher: &Matcher,
    user: &[String],
    target: &[String],
    window: usize,
    min_len: usize,
) -> Vec<Chunk> {
    if user.is_empty() || target.is_empty() {
        return Vec::new();
    }

    let candidates = candidate_matches(matcher, user, target);
    let splits = split_points(&candidates, window);

    let mut ranges = Vec::with_capacity(splits.len() + 1);
    let mut start = 0;
    for split in splits {
        ranges.push(start..split);
        start = split;
    }
    ranges.push(start..user.len());

    let ranges = merge_short(ranges, min_len);
    trace!(words = user.len(), chunks = ranges.len(), "segmented stream");

    ranges
        .into_iter()
        .map(|range| Chunk {
            start: range.start,
            words: user[range.clone()].to_vec(),
            candidates: candidates[range].to_vec(),
        })
        .collect()
}
