//! Messages exchanged with the streaming recognizer
//!
//! Outbound: `init` once at connection open, `update_vocab` whenever the
//! at-risk set changes, and binary PCM frames (see `audio`).
//! Inbound: `unrecognized` hints near connection start, then `partial` and
//! `result` transcripts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::error::Result;
use crate::tokenizer::normalize_words;

/// JSON message sent to the recognizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Full lowercased target word list
    Init { words: Vec<String> },
    /// Words needing extra recognition bias
    UpdateVocab { words: Vec<String> },
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// JSON message received from the recognizer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Word -> alternatives map, either inline or as a JSON-encoded string
    Unrecognized {
        #[serde(rename = "subRecs")]
        sub_recs: Value,
    },
    /// Best guess for the utterance in progress; superseded by the next one
    Partial { data: String },
    /// Finalized utterance fragment
    Result { data: String },
}

/// A transcript ready for alignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub words: Vec<String>,
    pub partial: bool,
}

impl InboundMessage {
    /// Transcript carried by a `partial` or `result` message
    pub fn transcript(&self) -> Option<Transcript> {
        match self {
            Self::Partial { data } => Some(Transcript {
                words: normalize_words(data),
                partial: true,
            }),
            Self::Result { data } => Some(Transcript {
                words: normalize_words(data),
                partial: false,
            }),
            Self::Unrecognized { .. } => None,
        }
    }

    /// Substitution hints carried by an `unrecognized` message
    pub fn hints(&self) -> Option<HashMap<String, Vec<String>>> {
        match self {
            Self::Unrecognized { sub_recs } => Some(parse_sub_recs(sub_recs)),
            _ => None,
        }
    }
}

/// Parse an inbound message; anything malformed is dropped
pub fn parse_inbound(raw: &str) -> Option<InboundMessage> {
    match serde_json::from_str(raw) {
        Ok(message) => Some(message),
        Err(e) => {
            debug!("Dropping malformed recognizer message: {}", e);
            None
        }
    }
}

/// Normalize the `subRecs` payload into word -> alternatives
///
/// Alternatives may be a list or a single string; each alternative is
/// lowercased and stripped of punctuation. Entries of any other shape are skipped.
pub fn parse_sub_recs(value: &Value) -> HashMap<String, Vec<String>> {
    let decoded;
    let value = match value {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(inner) => {
                decoded = inner;
                &decoded
            }
            Err(_) => return HashMap::new(),
        },
        other => other,
    };

    let Value::Object(map) = value else {
        return HashMap::new();
    };

    map.iter()
        .filter_map(|(word, alternatives)| {
            let alternatives = match alternatives {
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(normalize_phrase)
                    .filter(|a| !a.is_empty())
                    .collect(),
                Value::String(s) => vec![normalize_phrase(s)],
                _ => return None,
            };
            Some((word.to_lowercase(), alternatives))
        })
        .collect()
}

fn normalize_phrase(phrase: &str) -> String {
    normalize_words(phrase).join(" ")
}
