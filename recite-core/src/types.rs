//! Core types shared by the alignment engine and its consumers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a recitation session
pub type SessionId = Uuid;

/// Recitation status of a single target token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// Not yet touched by any alignment pass
    #[default]
    Unset,
    /// Heard and matched by spelling or homonym
    Correct,
    /// Inside an aligned window but not heard
    Incorrect,
    /// Heard as one of the recognizer's known substitutes for this word
    Matched,
    /// Revealed by the user; never changed by alignment
    Overridden,
}

impl TokenState {
    /// Single-character representation (`-` for unset)
    pub fn as_char(&self) -> char {
        match self {
            Self::Unset => '-',
            Self::Correct => 'C',
            Self::Incorrect => 'I',
            Self::Matched => 'M',
            Self::Overridden => 'O',
        }
    }

    /// Parse from single character
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '-' => Some(Self::Unset),
            'C' => Some(Self::Correct),
            'I' => Some(Self::Incorrect),
            'M' => Some(Self::Matched),
            'O' => Some(Self::Overridden),
            _ => None,
        }
    }

    /// Whether the token counts as recited for cursor placement
    pub fn is_progress(&self) -> bool {
        matches!(self, Self::Correct | Self::Matched | Self::Overridden)
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }
}

/// Mutable per-token alignment status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMark {
    pub state: TokenState,
    /// Matched in sequence with the preceding matched token
    pub order: bool,
    /// Derived from a partial transcript and still open to revision
    pub temp: bool,
}

impl TokenMark {
    pub fn new(state: TokenState, order: bool, temp: bool) -> Self {
        Self { state, order, temp }
    }
}

/// Render a mark array as a compact string, e.g. `"CCI--"`
pub fn state_vector(marks: &[TokenMark]) -> String {
    marks.iter().map(|m| m.state.as_char()).collect()
}

/// Last position the speaker has reliably reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Verse containing the token
    pub verse_index: usize,
    /// Word index within that verse
    pub word_index: usize,
    /// Flat index into the passage token array
    pub token_index: usize,
}
