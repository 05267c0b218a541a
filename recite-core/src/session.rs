//! Recitation session state
//!
//! One session per active quiz view. It owns the target passage, the per-token
//! marks, the stitching tail of the last final result, the derived cursor and
//! the at-risk vocabulary. Every mutation returns a `SessionUpdate` describing
//! what a renderer or the recognizer link needs to know.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};
use uuid::Uuid;

use crate::alignment::{Aligner, AlignmentReport};
use crate::config::RecitationConfig;
use crate::fuzzy::{Matcher, SharedHomonyms};
use crate::protocol::InboundMessage;
use crate::tokenizer::Passage;
use crate::tracker::{at_risk_vocabulary, compute_cursor, next_reveal_index, reveal};
use crate::types::{Cursor, SessionId, TokenMark};

/// Outcome of one session mutation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionUpdate {
    pub cursor: Option<Cursor>,
    /// Token indices whose mark changed
    pub changed: Vec<usize>,
    /// New at-risk vocabulary, present only when it differs from the last one
    pub vocabulary: Option<Vec<String>>,
    pub partial: bool,
}

/// Alignment state for one passage
#[derive(Debug)]
pub struct AlignmentSession {
    id: SessionId,
    config: RecitationConfig,
    matcher: Matcher,
    passage: Passage,
    target: Vec<String>,
    marks: Vec<TokenMark>,
    /// Tail of the last final result, prepended to the next pass
    carry: Vec<String>,
    cursor: Option<Cursor>,
    at_risk: BTreeSet<String>,
}

impl AlignmentSession {
    pub fn new(passage: Passage, config: RecitationConfig, homonyms: SharedHomonyms) -> Self {
        let matcher = Matcher::new(&config, homonyms);
        let target = passage.words();
        let marks = vec![TokenMark::default(); target.len()];
        let id = Uuid::new_v4();

        info!(session = %id, tokens = target.len(), "Session created");

        Self {
            id,
            config,
            matcher,
            passage,
            target,
            marks,
            carry: Vec::new(),
            cursor: None,
            at_risk: BTreeSet::new(),
        }
    }

    /// Session with default tuning and no homonym table
    pub fn with_defaults(passage: Passage) -> Self {
        Self::new(passage, RecitationConfig::default(), SharedHomonyms::default())
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &RecitationConfig {
        &self.config
    }

    pub fn passage(&self) -> &Passage {
        &self.passage
    }

    /// Lowercased target words
    pub fn target_words(&self) -> &[String] {
        &self.target
    }

    pub fn marks(&self) -> &[TokenMark] {
        &self.marks
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    pub fn at_risk(&self) -> &BTreeSet<String> {
        &self.at_risk
    }

    pub fn last_recognized_chunk(&self) -> &[String] {
        &self.carry
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Align a provisional transcript of the utterance in progress
    pub fn apply_partial(&mut self, words: &[String]) -> SessionUpdate {
        self.apply_transcript(words, true)
    }

    /// Align a finalized transcript fragment
    pub fn apply_final(&mut self, words: &[String]) -> SessionUpdate {
        self.apply_transcript(words, false)
    }

    /// Run one alignment pass over the stitching tail plus `words`
    pub fn apply_transcript(&mut self, words: &[String], partial: bool) -> SessionUpdate {
        if words.is_empty() || self.target.is_empty() {
            return SessionUpdate {
                cursor: self.cursor,
                partial,
                ..Default::default()
            };
        }

        let mut stream = self.carry.clone();
        stream.extend_from_slice(words);

        let report = Aligner::new(&self.matcher, &self.config).align(
            &stream,
            &self.target,
            &mut self.marks,
            partial,
        );

        if !partial {
            let keep = self.config.carry_words.min(stream.len());
            self.carry = stream.split_off(stream.len() - keep);
        }

        debug!(
            session = %self.id,
            words = words.len(),
            partial,
            changed = report.changed.len(),
            "transcript applied"
        );

        self.refresh(report, partial)
    }

    /// Apply an inbound recognizer message; hints update the at-risk table
    pub fn apply_message(&mut self, message: &InboundMessage) -> SessionUpdate {
        if let Some(transcript) = message.transcript() {
            return self.apply_transcript(&transcript.words, transcript.partial);
        }
        match message.hints() {
            Some(hints) => self.set_hints(hints),
            None => SessionUpdate {
                cursor: self.cursor,
                ..Default::default()
            },
        }
    }

    /// Replace the recognizer's substitution hints
    pub fn set_hints(&mut self, hints: HashMap<String, Vec<String>>) -> SessionUpdate {
        self.matcher.set_hints(hints);
        self.refresh(AlignmentReport::default(), false)
    }

    /// Reveal the token after the cursor
    pub fn reveal_next(&mut self) -> Option<SessionUpdate> {
        let index = next_reveal_index(self.cursor, self.marks.len())?;
        self.reveal(index)
    }

    /// Reveal one token; `None` if out of range or already revealed
    pub fn reveal(&mut self, index: usize) -> Option<SessionUpdate> {
        if !reveal(&mut self.marks, index) {
            return None;
        }
        debug!(session = %self.id, index, "token revealed");

        let report = AlignmentReport {
            chunks: Vec::new(),
            changed: vec![index],
        };
        Some(self.refresh(report, false))
    }

    /// Reset all progress; an open recognizer connection is left alone
    pub fn clear(&mut self) {
        self.marks.fill(TokenMark::default());
        self.carry.clear();
        self.cursor = None;
        self.at_risk.clear();
        info!(session = %self.id, "Session cleared");
    }

    /// Switch to a different passage, discarding all progress
    pub fn load_passage(&mut self, passage: Passage) {
        self.target = passage.words();
        self.marks = vec![TokenMark::default(); self.target.len()];
        self.passage = passage;
        self.clear();
    }

    /// Recompute derived state after the marks changed
    fn refresh(&mut self, report: AlignmentReport, partial: bool) -> SessionUpdate {
        self.cursor = compute_cursor(
            &self.passage,
            &self.marks,
            self.config.cursor_min_ratio,
            self.config.cursor_max_gap,
        );

        let at_risk = at_risk_vocabulary(
            &self.target,
            &self.marks,
            &self.matcher,
            self.config.at_risk_lookahead,
        );
        let vocabulary = if at_risk != self.at_risk {
            self.at_risk = at_risk;
            Some(self.at_risk.iter().cloned().collect())
        } else {
            None
        };

        SessionUpdate {
            cursor: self.cursor,
            changed: report.changed,
            vocabulary,
            partial,
        }
    }
}
