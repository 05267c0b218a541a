//! Read-only projections of a session for a renderer

use serde::Serialize;

use crate::tokenizer::Passage;
use crate::types::{Cursor, TokenMark, TokenState};

/// Marker shown before a token recited out of sequence
pub const OUT_OF_SEQUENCE_MARKER: &str = "..";

/// Everything a renderer needs for one target token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenView {
    pub display: String,
    pub separator: String,
    pub state: TokenState,
    pub order: bool,
    /// Still provisional from a partial transcript
    pub temp: bool,
    pub out_of_sequence: bool,
}

fn out_of_sequence(mark: &TokenMark) -> bool {
    matches!(mark.state, TokenState::Correct | TokenState::Matched) && !mark.order
}

/// Per-token views in passage order
pub fn token_views(passage: &Passage, marks: &[TokenMark]) -> Vec<TokenView> {
    passage
        .tokens()
        .iter()
        .zip(marks)
        .map(|(token, mark)| TokenView {
            display: token.display.clone(),
            separator: token.separator.clone(),
            state: mark.state,
            order: mark.order,
            temp: mark.temp,
            out_of_sequence: out_of_sequence(mark),
        })
        .collect()
}

/// Passage text from the start through the cursor token
///
/// Separators are kept as written, so verse breaks stay line breaks. The
/// cursor token keeps its trailing punctuation but not trailing whitespace.
pub fn results_text(passage: &Passage, marks: &[TokenMark], cursor: Option<Cursor>) -> String {
    let Some(cursor) = cursor else {
        return String::new();
    };

    let mut out = String::new();
    let tokens = passage.tokens();
    let end = cursor.token_index.min(tokens.len().saturating_sub(1));

    for (index, token) in tokens.iter().enumerate().take(end + 1) {
        if index == 0 {
            out.push_str(passage.leading().trim_start());
        }
        if marks.get(index).is_some_and(out_of_sequence) {
            out.push_str(OUT_OF_SEQUENCE_MARKER);
        }
        out.push_str(&token.display);
        if index == end {
            out.push_str(token.separator.trim_end());
        } else {
            out.push_str(&token.separator);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(token_index: usize) -> Option<Cursor> {
        Some(Cursor {
            verse_index: 0,
            word_index: token_index,
            token_index,
        })
    }

    fn correct(n: usize) -> Vec<TokenMark> {
        vec![TokenMark::new(TokenState::Correct, true, false); n]
    }

    #[test]
    fn test_results_text_through_cursor() {
        let passage = Passage::from_text("In the beginning, God created.");
        let marks = correct(5);

        assert_eq!(results_text(&passage, &marks, cursor(2)), "In the beginning,");
        assert_eq!(
            results_text(&passage, &marks, cursor(4)),
            "In the beginning, God created."
        );
        assert_eq!(results_text(&passage, &marks, None), "");
    }

    #[test]
    fn test_results_text_keeps_verse_breaks() {
        let passage = Passage::from_verses(&["Jesus wept.", "Rejoice always."]);
        let marks = correct(4);

        assert_eq!(
            results_text(&passage, &marks, cursor(3)),
            "Jesus wept.\nRejoice always."
        );
    }

    #[test]
    fn test_out_of_sequence_marker() {
        let passage = Passage::from_text("In the beginning God created.");
        let mut marks = correct(5);
        marks[3].order = false;
        // a revealed word is never flagged
        marks[4] = TokenMark::new(TokenState::Overridden, false, false);

        assert_eq!(
            results_text(&passage, &marks, cursor(4)),
            "In the beginning ..God created."
        );

        let views = token_views(&passage, &marks);
        assert!(views[3].out_of_sequence);
        assert!(!views[4].out_of_sequence);
    }

    #[test]
    fn test_token_views() {
        let passage = Passage::from_text("In the beginning.");
        let marks = vec![
            TokenMark::new(TokenState::Correct, true, true),
            TokenMark::new(TokenState::Incorrect, false, false),
            TokenMark::default(),
        ];

        let views = token_views(&passage, &marks);
        assert_eq!(views.len(), 3);
        assert_eq!(views[0].display, "In");
        assert!(views[0].temp);
        assert_eq!(views[1].state, TokenState::Incorrect);
        assert!(!views[1].out_of_sequence);
        assert_eq!(views[2].separator, ".");
    }
}
