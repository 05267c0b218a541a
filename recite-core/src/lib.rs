//! Recite Core - live speech alignment for Scripture recitation
//!
//! Aligns a noisy, incrementally delivered speech transcript against a known
//! target passage. Each partial or final transcript is segmented into chunks,
//! every chunk is anchored to its best-fitting window of the passage, and the
//! per-token marks feed a cursor and a list of hard words to bias the
//! recognizer toward.

pub mod alignment;
pub mod audio;
pub mod config;
pub mod error;
pub mod fuzzy;
pub mod logging;
pub mod protocol;
pub mod recognizer;
pub mod render;
pub mod segmenter;
pub mod session;
pub mod tokenizer;
pub mod tracker;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Re-export the main engine components for convenience
pub use alignment::{Aligner, AlignmentReport, ChunkAlignment};
pub use audio::{AudioData, AudioInput};
pub use config::RecitationConfig;
pub use fuzzy::{HomonymTable, Matcher, SharedHomonyms, load_homonyms};
pub use protocol::{InboundMessage, OutboundMessage, parse_inbound};
pub use recognizer::{
    ChannelLink, Connection, LinkFrame, RecitationDriver, Recognizer, RecognizerLink,
};
pub use render::{TokenView, results_text, token_views};
pub use segmenter::{Chunk, segment};
pub use session::{AlignmentSession, SessionUpdate};
pub use tokenizer::{Passage, TargetToken, tokenize};
