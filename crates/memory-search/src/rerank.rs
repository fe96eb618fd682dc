//! Personalised reranking.
//!
//! A candidate's rerank score is a weighted sum of five factors, each in
//! `[0, 1]`:
//!
//! | Factor            | Inputs                                                   |
//! |-------------------|----------------------------------------------------------|
//! | content relevance | category match, vector score, text score                 |
//! | user preference   | category preference, content type, time of day           |
//! | freshness         | `publish_time` metadata, exponential half-life decay     |
//! | quality           | length, structure, `authority`, `citations`              |
//! | popularity        | `clicks`, `shares`, `comments`, `bookmarks`              |
//!
//! Metadata signals are optional; each factor has a neutral default when
//! its signal is missing.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

use memory_types::{RerankWeights, SearchCandidate, SearchConfig, UserInterestProfile};

use crate::category::{best_match, infer_category};
use crate::error::RerankError;

const DEFAULT_FRESHNESS: f32 = 0.8;
const NEUTRAL: f32 = 0.5;
const CITATION_SATURATION: f32 = 5.0;

/// `(metadata key, saturation constant)` for popularity signals.
const POPULARITY_SIGNALS: &[(&str, f32)] = &[
    ("clicks", 100.0),
    ("shares", 10.0),
    ("comments", 10.0),
    ("bookmarks", 10.0),
];

const CONCLUSION_MARKERS: &[&str] = &[
    "总结",
    "结论",
    "因此",
    "总之",
    "综上所述",
    "in conclusion",
    "in summary",
    "therefore",
];

/// Individual factor scores of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RerankFactors {
    pub content_relevance: f32,
    pub user_preference: f32,
    pub freshness: f32,
    pub quality: f32,
    pub popularity: f32,
}

impl RerankFactors {
    pub fn combine(&self, weights: &RerankWeights) -> f32 {
        self.content_relevance * weights.content_relevance
            + self.user_preference * weights.user_preference
            + self.freshness * weights.freshness
            + self.quality * weights.quality
            + self.popularity * weights.popularity
    }
}

/// Content format, from `content_type` metadata or inferred from the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Article,
    Video,
    Image,
}

impl ContentType {
    fn detect(candidate: &SearchCandidate) -> Self {
        let declared = candidate
            .metadata
            .get("content_type")
            .and_then(Value::as_str)
            .map(str::to_lowercase);
        let source = declared.unwrap_or_else(|| candidate.content.to_lowercase());
        if source.contains("video") || source.contains("视频") {
            ContentType::Video
        } else if source.contains("image") || source.contains("图片") {
            ContentType::Image
        } else {
            ContentType::Article
        }
    }

    /// Base preference for the format. Stored memories are text first.
    fn preference(self) -> f32 {
        match self {
            ContentType::Article => 0.7,
            ContentType::Video => 0.6,
            ContentType::Image => 0.5,
        }
    }
}

/// Scores candidates against a user interest profile.
pub struct Reranker {
    weights: RwLock<RerankWeights>,
    half_life_days: f32,
}

impl Reranker {
    pub fn new(weights: RerankWeights, half_life_days: f32) -> Result<Self, RerankError> {
        weights.validate().map_err(RerankError::InvalidWeights)?;
        if !half_life_days.is_finite() || half_life_days <= 0.0 {
            return Err(RerankError::InvalidWeights(format!(
                "freshness half-life must be > 0, got {half_life_days}"
            )));
        }
        Ok(Self {
            weights: RwLock::new(weights),
            half_life_days,
        })
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self, RerankError> {
        Self::new(config.rerank_weights, config.freshness_half_life_days)
    }

    pub fn weights(&self) -> RerankWeights {
        *self.weights.read().expect("rerank weights lock poisoned")
    }

    /// Replace the factor weights. Rejected weights leave the current ones
    /// in place.
    pub fn set_weights(&self, weights: RerankWeights) -> Result<(), RerankError> {
        weights.validate().map_err(RerankError::InvalidWeights)?;
        *self.weights.write().expect("rerank weights lock poisoned") = weights;
        info!(?weights, "Rerank weights updated");
        Ok(())
    }

    /// Rerank score in `[0, 1]`.
    pub fn score(
        &self,
        candidate: &SearchCandidate,
        profile: &UserInterestProfile,
    ) -> Result<f32, RerankError> {
        let factors = self.factors_at(candidate, profile, Utc::now())?;
        let score = factors.combine(&self.weights()).clamp(0.0, 1.0);
        debug!(candidate_id = %candidate.id, ?factors, score, "Calculated rerank score");
        Ok(score)
    }

    /// Factor breakdown as of `now`.
    pub fn factors_at(
        &self,
        candidate: &SearchCandidate,
        profile: &UserInterestProfile,
        now: DateTime<Utc>,
    ) -> Result<RerankFactors, RerankError> {
        for (field, value) in [
            ("vector_score", candidate.vector_score),
            ("text_score", candidate.text_score),
        ] {
            if !value.is_finite() {
                return Err(RerankError::InvalidScore {
                    id: candidate.id.clone(),
                    field,
                    value,
                });
            }
        }

        let category = candidate
            .metadata
            .get("category")
            .and_then(Value::as_str)
            .map(str::to_lowercase)
            .unwrap_or_else(|| infer_category(&candidate.content).to_string());
        let publish_time = metadata_time(&candidate.metadata, "publish_time");

        Ok(RerankFactors {
            content_relevance: content_relevance(candidate, &category, profile),
            user_preference: user_preference(candidate, &category, profile, publish_time),
            freshness: freshness(publish_time, now, self.half_life_days),
            quality: quality(candidate),
            popularity: popularity(&candidate.metadata),
        })
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return NEUTRAL;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn content_relevance(candidate: &SearchCandidate, category: &str, profile: &UserInterestProfile) -> f32 {
    mean(&[
        best_match(category, &profile.categories),
        candidate.vector_score.clamp(0.0, 1.0),
        candidate.text_score.clamp(0.0, 1.0),
    ])
}

fn category_preference(category: &str, profile: &UserInterestProfile) -> f32 {
    let confidence = profile.confidence.clamp(0.0, 1.0);
    if profile.categories.iter().any(|c| c == category) {
        confidence
    } else {
        best_match(category, &profile.categories) * confidence
    }
}

/// Closeness of the publish hour to the hour of the user's last activity.
fn time_of_day_preference(
    publish_time: Option<DateTime<Utc>>,
    profile: &UserInterestProfile,
) -> f32 {
    let Some(published) = publish_time else {
        return NEUTRAL;
    };
    let a = published.hour() as i32;
    let b = profile.last_updated.hour() as i32;
    let diff = (a - b).abs();
    let distance = diff.min(24 - diff) as f32;
    1.0 - distance / 12.0
}

fn user_preference(
    candidate: &SearchCandidate,
    category: &str,
    profile: &UserInterestProfile,
    publish_time: Option<DateTime<Utc>>,
) -> f32 {
    mean(&[
        category_preference(category, profile),
        ContentType::detect(candidate).preference(),
        time_of_day_preference(publish_time, profile),
    ])
}

fn freshness(publish_time: Option<DateTime<Utc>>, now: DateTime<Utc>, half_life_days: f32) -> f32 {
    let Some(published) = publish_time else {
        return DEFAULT_FRESHNESS;
    };
    let age_ms = (now - published).num_milliseconds().max(0) as f64;
    let age_days = age_ms / 86_400_000.0;
    0.5f64.powf(age_days / half_life_days as f64) as f32
}

fn length_score(chars: usize) -> f32 {
    match chars {
        0..=49 => 0.3,
        50..=99 => 0.6,
        100..=499 => 0.9,
        500..=999 => 0.8,
        _ => 0.6,
    }
}

fn completeness(content: &str) -> f32 {
    let lower = content.to_lowercase();
    let mut score = 0.5;
    if content.contains('#') || content.contains("标题") {
        score += 0.1;
    }
    if content.matches('\n').count() > 2 {
        score += 0.1;
    }
    if CONCLUSION_MARKERS.iter().any(|m| lower.contains(m)) {
        score += 0.1;
    }
    if lower.contains("http") || content.contains("引用") {
        score += 0.1;
    }
    f32::min(score, 1.0)
}

fn quality(candidate: &SearchCandidate) -> f32 {
    let authority = metadata_number(&candidate.metadata, "authority")
        .map(|a| a.clamp(0.0, 1.0))
        .unwrap_or(NEUTRAL);
    let citations = metadata_number(&candidate.metadata, "citations")
        .map(|n| saturate(n, CITATION_SATURATION))
        .unwrap_or(NEUTRAL);
    mean(&[
        length_score(candidate.content.chars().count()),
        completeness(&candidate.content),
        authority,
        citations,
    ])
}

fn popularity(metadata: &HashMap<String, Value>) -> f32 {
    let signals: Vec<f32> = POPULARITY_SIGNALS
        .iter()
        .filter_map(|(key, k)| metadata_number(metadata, key).map(|n| saturate(n, *k)))
        .collect();
    mean(&signals)
}

/// `n / (n + k)`, 0 for non-positive counts.
fn saturate(n: f32, k: f32) -> f32 {
    if n <= 0.0 {
        0.0
    } else {
        n / (n + k)
    }
}

/// Non-negative finite number from a JSON number or numeric string.
fn metadata_number(metadata: &HashMap<String, Value>, key: &str) -> Option<f32> {
    let value = match metadata.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (value.is_finite() && value >= 0.0).then_some(value as f32)
}

/// Timestamp from an RFC 3339 string or epoch milliseconds.
fn metadata_time(metadata: &HashMap<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    match metadata.get(key)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc))
            .or_else(|| {
                s.trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            }),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}
