//! Cursor placement and at-risk vocabulary, derived from the token marks

use std::collections::BTreeSet;

use crate::fuzzy::Matcher;
use crate::tokenizer::Passage;
use crate::types::{Cursor, TokenMark, TokenState};

/// Last token reached by a dense enough run of recited tokens
///
/// Scans in document order, stopping after more than `max_gap` consecutive
/// unrecited tokens. A recited token only moves the cursor while at least
/// `min_ratio` of the tokens scanned so far are recited, so a lucky match
/// surrounded by misses cannot drag the cursor ahead.
pub fn compute_cursor(
    passage: &Passage,
    marks: &[TokenMark],
    min_ratio: f64,
    max_gap: usize,
) -> Option<Cursor> {
    let mut scanned = 0usize;
    let mut recited = 0usize;
    let mut gap = 0usize;
    let mut reached = None;

    for (index, mark) in marks.iter().enumerate() {
        scanned += 1;
        if mark.state.is_progress() {
            recited += 1;
            gap = 0;
            if recited as f64 + 1e-9 >= min_ratio * scanned as f64 {
                reached = Some(index);
            }
        } else {
            gap += 1;
            if gap > max_gap {
                break;
            }
        }
    }

    reached.and_then(|index| {
        passage.tokens().get(index).map(|token| Cursor {
            verse_index: token.verse_index,
            word_index: token.word_index,
            token_index: index,
        })
    })
}

/// Hard-to-recognize target words just past the last recited token
///
/// Every token within `lookahead` positions after the most recent recited one
/// is considered; those the recognizer flagged as hard are returned.
pub fn at_risk_vocabulary(
    target: &[String],
    marks: &[TokenMark],
    matcher: &Matcher,
    lookahead: usize,
) -> BTreeSet<String> {
    let mut at_risk = BTreeSet::new();
    let mut last: Option<usize> = None;

    for (index, (word, mark)) in target.iter().zip(marks).enumerate() {
        if mark.state.is_progress() {
            last = Some(index);
            continue;
        }
        let distance = match last {
            Some(l) => index - l,
            None => index + 1,
        };
        if distance <= lookahead && matcher.is_hard_word(word) {
            at_risk.insert(word.clone());
        }
    }

    at_risk
}

/// Token the "show next word" action reveals
pub fn next_reveal_index(cursor: Option<Cursor>, len: usize) -> Option<usize> {
    let next = cursor.map_or(0, |c| c.token_index + 1);
    (next < len).then_some(next)
}

/// Mark a token as revealed; returns false if out of range or already revealed
pub fn reveal(marks: &mut [TokenMark], index: usize) -> bool {
    match marks.get_mut(index) {
        Some(mark) if mark.state != TokenState::Overridden => {
            *mark = TokenMark::new(TokenState::Overridden, true, false);
            true
        }
        _ => false,
    }
}
