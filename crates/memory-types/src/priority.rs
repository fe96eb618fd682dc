//! Priority scoring for short-term memory slots.
//!
//! Priority is computed once when a message enters the short-term bank and
//! decides which slot is replaced when the bank is full.
//!
//! ## Scoring Formula
//!
//! ```text
//! priority = clamp(base + length_boost + keyword_boost, 1, 10)
//!
//! where:
//!   length_boost  = medium_boost if chars > medium_length
//!                 + long_boost   if chars > long_length
//!   keyword_boost = keyword_boost per distinct importance keyword present
//! ```

use serde::{Deserialize, Serialize};

/// Lowest priority a slot can carry.
pub const MIN_PRIORITY: u8 = 1;

/// Highest priority a slot can carry.
pub const MAX_PRIORITY: u8 = 10;

/// Configuration for priority scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityConfig {
    /// Starting priority for every message
    #[serde(default = "default_base")]
    pub base: u8,

    /// Character count above which `medium_boost` applies
    #[serde(default = "default_medium_length")]
    pub medium_length: usize,

    #[serde(default = "default_medium_boost")]
    pub medium_boost: u8,

    /// Character count above which `long_boost` also applies
    #[serde(default = "default_long_length")]
    pub long_length: usize,

    #[serde(default = "default_long_boost")]
    pub long_boost: u8,

    /// Boost per importance keyword found
    #[serde(default = "default_keyword_boost")]
    pub keyword_boost: u8,

    /// Importance markers, matched case-insensitively
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

fn default_base() -> u8 {
    5
}

fn default_medium_length() -> usize {
    100
}

fn default_medium_boost() -> u8 {
    2
}

fn default_long_length() -> usize {
    500
}

fn default_long_boost() -> u8 {
    3
}

fn default_keyword_boost() -> u8 {
    1
}

fn default_keywords() -> Vec<String> {
    [
        "重要",
        "关键",
        "核心",
        "总结",
        "结论",
        "important",
        "critical",
        "key point",
        "summary",
        "conclusion",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            medium_length: default_medium_length(),
            medium_boost: default_medium_boost(),
            long_length: default_long_length(),
            long_boost: default_long_boost(),
            keyword_boost: default_keyword_boost(),
            keywords: default_keywords(),
        }
    }
}

impl PriorityConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.base) {
            return Err(format!(
                "base priority must be {MIN_PRIORITY}-{MAX_PRIORITY}, got {}",
                self.base
            ));
        }
        if self.long_length < self.medium_length {
            return Err(format!(
                "long_length ({}) must be >= medium_length ({})",
                self.long_length, self.medium_length
            ));
        }
        Ok(())
    }
}

/// Computes slot priorities from message content.
#[derive(Debug, Clone)]
pub struct PriorityScorer {
    config: PriorityConfig,
    lowered_keywords: Vec<String>,
}

impl PriorityScorer {
    pub fn new(config: PriorityConfig) -> Self {
        let lowered_keywords = config
            .keywords
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| k.to_lowercase())
            .collect();
        Self {
            config,
            lowered_keywords,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PriorityConfig::default())
    }

    /// Score `content`, always within [1, 10].
    pub fn score(&self, content: &str) -> u8 {
        let chars = content.chars().count();
        let mut priority = u32::from(self.config.base);

        if chars > self.config.medium_length {
            priority += u32::from(self.config.medium_boost);
        }
        if chars > self.config.long_length {
            priority += u32::from(self.config.long_boost);
        }

        let lower = content.to_lowercase();
        let hits = self
            .lowered_keywords
            .iter()
            .filter(|k| lower.contains(k.as_str()))
            .count() as u32;
        priority += hits * u32::from(self.config.keyword_boost);

        priority.clamp(u32::from(MIN_PRIORITY), u32::from(MAX_PRIORITY)) as u8
    }

    pub fn config(&self) -> &PriorityConfig {
        &self.config
    }
}

impl Default for PriorityScorer {
    fn default() -> Self {
        Self::with_defaults()
    }
}
