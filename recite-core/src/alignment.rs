//! Streaming alignment of recognized speech against the target passage
//!
//! Each chunk from the segmenter is anchored at the target window it is closest
//! to by weighted edit distance, walked word by word to mark what was heard,
//! clipped after the last proven word, and merged into the cumulative marks.
//!
//! Merge rules:
//! - `Overridden` marks are never touched.
//! - A partial pass never downgrades a `Correct` or `Matched` mark.
//! - A final pass may downgrade such a mark only while it is still `temp`
//!   (set by an earlier partial); confirmed marks stay.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RecitationConfig;
use crate::fuzzy::Matcher;
use crate::segmenter::{Chunk, segment};
use crate::types::{TokenMark, TokenState};

/// Where a chunk was placed and what it contributed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAlignment {
    /// Offset of the chunk within the recognized stream, after multi-word
    /// substitutes are joined
    pub chunk_start: usize,
    pub chunk_len: usize,
    /// Target index the chunk window starts at, if any window qualified
    pub anchor: Option<usize>,
    /// Distance of the chosen window (after the aligned-start bonus)
    pub distance: f64,
    /// Number of tokens the chunk proved (`Correct` or `Matched`)
    pub matched: usize,
}

/// Summary of one alignment pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub chunks: Vec<ChunkAlignment>,
    /// Target indices whose mark changed
    pub changed: Vec<usize>,
}

impl AlignmentReport {
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

/// One slot of a chunk's local window
#[derive(Debug, Clone, Copy, PartialEq)]
struct LocalMark {
    state: TokenState,
    order: bool,
}

/// Alignment engine bound to a matcher and tuning
pub struct Aligner<'a> {
    matcher: &'a Matcher,
    split_window: usize,
    min_chunk_len: usize,
}

impl<'a> Aligner<'a> {
    pub fn new(matcher: &'a Matcher, config: &RecitationConfig) -> Self {
        Self {
            matcher,
            split_window: config.split_window,
            min_chunk_len: config.min_chunk_len,
        }
    }

    /// Align `user` words against `target` and merge into `marks` in place
    ///
    /// `marks` must run parallel to `target`. Empty input is a no-op.
    pub fn align(
        &self,
        user: &[String],
        target: &[String],
        marks: &mut [TokenMark],
        partial: bool,
    ) -> AlignmentReport {
        let mut report = AlignmentReport::default();

        if user.is_empty() || target.is_empty() {
            return report;
        }
        if marks.len() != target.len() {
            warn!(
                marks = marks.len(),
                target = target.len(),
                "Mark array does not match target, skipping pass"
            );
            return report;
        }

        let user = self.matcher.collapse_phrases(user);
        let chunks = segment(
            self.matcher,
            &user,
            target,
            self.split_window,
            self.min_chunk_len,
        );

        for chunk in &chunks {
            let alignment =
                self.align_chunk(chunk, target, marks, partial, &mut report.changed);
            report.chunks.push(alignment);
        }

        report.changed.sort_unstable();
        report.changed.dedup();

        debug!(
            words = user.len(),
            chunks = report.chunks.len(),
            changed = report.changed.len(),
            partial,
            "alignment pass"
        );

        report
    }

    fn align_chunk(
        &self,
        chunk: &Chunk,
        target: &[String],
        marks: &mut [TokenMark],
        partial: bool,
        changed: &mut Vec<usize>,
    ) -> ChunkAlignment {
        let mut alignment = ChunkAlignment {
            chunk_start: chunk.start,
            chunk_len: chunk.len(),
            anchor: None,
            distance: f64::INFINITY,
            matched: 0,
        };

        let evidence = chunk.evidence(target.len());
        let Some((anchor, distance)) = self.find_anchor(&chunk.words, target, &evidence) else {
            return alignment;
        };
        alignment.anchor = Some(anchor);
        alignment.distance = distance;

        let local = self.walk(&chunk.words, target, anchor, distance);
        alignment.matched = local.iter().filter(|m| m.state.is_progress()).count();

        for (offset, mark) in local.into_iter().enumerate() {
            let index = anchor + offset;
            if merge_mark(&mut marks[index], mark, partial) {
                changed.push(index);
            }
        }

        alignment
    }

    /// Best window start among indices with candidate evidence
    ///
    /// Ties keep the first index. A window whose first word equals the chunk's
    /// first word gets one unit off its distance.
    fn find_anchor(
        &self,
        words: &[String],
        target: &[String],
        evidence: &[TokenState],
    ) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;

        for (j, state) in evidence.iter().enumerate() {
            if !state.is_set() {
                continue;
            }
            let mut distance = self.window_distance(words, target, j);
            if target[j] == words[0] {
                distance -= 1.0;
            }
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((j, distance));
            }
        }

        best
    }

    /// Distance between the chunk and the same-length target window at `start`
    ///
    /// A window running past the end gets one empty sentinel slot.
    fn window_distance(&self, words: &[String], target: &[String], start: usize) -> f64 {
        let end = start + words.len();
        let mut window: Vec<&str> = target[start..end.min(target.len())]
            .iter()
            .map(String::as_str)
            .collect();
        if end > target.len() {
            window.push("");
        }
        let chunk: Vec<&str> = words.iter().map(String::as_str).collect();
        self.matcher.sequence_distance(&chunk, &window)
    }

    /// Walk the chunk through its local window, clipped after the last hit
    fn walk(
        &self,
        words: &[String],
        target: &[String],
        anchor: usize,
        distance: f64,
    ) -> Vec<LocalMark> {
        let slack = distance.max(0.0).ceil() as usize;
        let len = (words.len() + slack + 1).min(target.len() - anchor);

        let mut local = vec![
            LocalMark {
                state: TokenState::Incorrect,
                order: false,
            };
            len
        ];

        let mut offset = 0;
        let mut last_hit: Option<(usize, usize)> = None;

        for (k, word) in words.iter().enumerate() {
            let hit = (offset..len).find_map(|p| {
                self.matcher
                    .classify(word, &target[anchor + p])
                    .map(|state| (p, state))
            });
            let Some((p, state)) = hit else {
                continue;
            };

            let in_sequence = match last_hit {
                None => k == 0 && p == 0,
                Some((prev_k, prev_p)) => prev_k + 1 == k && prev_p + 1 == p,
            };
            local[p] = LocalMark {
                state,
                order: in_sequence,
            };
            last_hit = Some((k, p));
            offset = p + 1;
        }

        match last_hit {
            Some((_, p)) => local.truncate(p + 1),
            None => local.clear(),
        }
        local
    }
}

/// Merge one local result into a cumulative mark; returns whether it changed
fn merge_mark(existing: &mut TokenMark, new: LocalMark, partial: bool) -> bool {
    let before = *existing;

    match (existing.state, new.state) {
        (TokenState::Overridden, _) => {}
        (TokenState::Correct, TokenState::Correct | TokenState::Matched)
        | (TokenState::Matched, TokenState::Matched) => {
            existing.temp = existing.temp && partial;
            existing.order = existing.order || new.order;
        }
        (TokenState::Correct | TokenState::Matched, TokenState::Incorrect) => {
            if !partial && existing.temp {
                *existing = TokenMark::new(TokenState::Incorrect, false, false);
            }
        }
        _ => {
            *existing = TokenMark::new(new.state, new.order, partial);
        }
    }

    *existing != before
}
