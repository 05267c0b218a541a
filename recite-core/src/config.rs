//! Tunable constants for the alignment engine and its transport
//!
//! Every field has a default, so a partial JSON file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Directory name under the platform config dir
const CONFIG_DIR_NAME: &str = "recite";

/// File name of the JSON configuration
const CONFIG_FILE_NAME: &str = "config.json";

/// Configuration for a recitation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecitationConfig {
    /// Share of the target word's length tolerated as edit distance
    pub fuzz_ratio: f64,
    /// Minimum edit distance tolerated for any word
    pub fuzz_floor: f64,
    /// Cost of a substitution; insertions and deletions cost 1
    pub substitution_cost: f64,
    /// Forward distance (in target tokens) still treated as continuous speech
    pub split_window: usize,
    /// Chunks shorter than this are merged into a neighbour
    pub min_chunk_len: usize,
    /// Share of recognized tokens required before the cursor may advance
    pub cursor_min_ratio: f64,
    /// Consecutive unrecognized tokens that end the cursor scan
    pub cursor_max_gap: usize,
    /// Tokens past the last recognized one that are flagged as at-risk
    pub at_risk_lookahead: usize,
    /// Words of the last final result prepended to the next pass
    pub carry_words: usize,
    /// Homonym table location: a file path or an http(s) URL
    pub homonyms_source: Option<String>,
    /// Capacity of the inbound recognizer event queue
    pub channel_capacity: usize,
    /// Fallback log filter when RUST_LOG is unset
    pub log_level: String,
}

impl Default for RecitationConfig {
    fn default() -> Self {
        Self {
            fuzz_ratio: 0.30,
            fuzz_floor: 2.0,
            substitution_cost: 1.5,
            split_window: 3,
            min_chunk_len: 2,
            cursor_min_ratio: 0.8,
            cursor_max_gap: 3,
            at_risk_lookahead: 2,
            carry_words: 3,
            homonyms_source: None,
            channel_capacity: 64,
            log_level: "info".to_string(),
        }
    }
}

impl RecitationConfig {
    /// Default config file location (`<config dir>/recite/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json(&raw)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a JSON config document
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fuzz_ratio) {
            return Err(Error::Config(format!(
                "fuzz_ratio must be within 0..=1, got {}",
                self.fuzz_ratio
            )));
        }
        if self.fuzz_floor < 0.0 || self.substitution_cost <= 0.0 {
            return Err(Error::Config(
                "fuzz_floor and substitution_cost must be positive".to_string(),
            ));
        }
        if self.min_chunk_len == 0 {
            return Err(Error::Config("min_chunk_len must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.cursor_min_ratio) {
            return Err(Error::Config(format!(
                "cursor_min_ratio must be within 0..=1, got {}",
                self.cursor_min_ratio
            )));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}
