//! Behaviour events and the interest profiles derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::MemoryError;
use crate::message::new_id;

/// Bucket used for events without a category.
pub const DEFAULT_CATEGORY: &str = "general";

/// Kind of user interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorAction {
    Search,
    View,
    Like,
    Share,
    Bookmark,
    Comment,
}

impl std::fmt::Display for BehaviorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BehaviorAction::Search => write!(f, "search"),
            BehaviorAction::View => write!(f, "view"),
            BehaviorAction::Like => write!(f, "like"),
            BehaviorAction::Share => write!(f, "share"),
            BehaviorAction::Bookmark => write!(f, "bookmark"),
            BehaviorAction::Comment => write!(f, "comment"),
        }
    }
}

impl FromStr for BehaviorAction {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "search" => Ok(BehaviorAction::Search),
            "view" => Ok(BehaviorAction::View),
            "like" => Ok(BehaviorAction::Like),
            "share" => Ok(BehaviorAction::Share),
            "bookmark" => Ok(BehaviorAction::Bookmark),
            "comment" => Ok(BehaviorAction::Comment),
            other => Err(MemoryError::InvalidInput(format!(
                "unknown behavior action: {other}"
            ))),
        }
    }
}

/// An immutable record of one user interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBehaviorEvent {
    /// Unique identifier (ULID string)
    pub id: String,
    pub user_id: String,
    pub action: BehaviorAction,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Contribution of this event to its category centroid
    pub weight: f32,
}

impl UserBehaviorEvent {
    pub fn new(
        user_id: impl Into<String>,
        action: BehaviorAction,
        content: impl Into<String>,
        weight: f32,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.into(),
            action,
            content: content.into(),
            category: None,
            timestamp: Utc::now(),
            weight,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Lowercased category bucket for grouping; blank or missing maps to
    /// `"general"`.
    pub fn category_or_default(&self) -> String {
        match self.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c.to_lowercase(),
            _ => DEFAULT_CATEGORY.to_string(),
        }
    }
}

/// Compact interest representation of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInterestProfile {
    pub user_id: String,
    /// Weighted centroid of category centroids; empty when the user has no history
    pub interest_vector: Vec<f32>,
    /// At most three category names, most important first
    pub categories: Vec<String>,
    /// In [0, 1]
    pub confidence: f32,
    pub last_updated: DateTime<Utc>,
    pub version: u64,
}

impl UserInterestProfile {
    /// Profile for a user without any usable history.
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            interest_vector: Vec::new(),
            categories: Vec::new(),
            confidence: 0.0,
            last_updated: Utc::now(),
            version: 0,
        }
    }

    pub fn has_vector(&self) -> bool {
        !self.interest_vector.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_defaults_to_general() {
        let event = UserBehaviorEvent::new("u1", BehaviorAction::View, "rust async", 1.0);
        assert_eq!(event.category_or_default(), "general");

        let blank = event.clone().with_category("   ");
        assert_eq!(blank.category_or_default(), "general");

        let tech = event.clone().with_category("technology");
        assert_eq!(tech.category_or_default(), "technology");

        let mixed = event.with_category(" Technology ");
        assert_eq!(mixed.category_or_default(), "technology");
    }

    #[test]
    fn test_action_serialization() {
        let event = UserBehaviorEvent::new("u1", BehaviorAction::Bookmark, "x", 0.5);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "bookmark");
        assert_eq!("LIKE".parse::<BehaviorAction>().unwrap(), BehaviorAction::Like);
    }

    #[test]
    fn test_empty_profile() {
        let profile = UserInterestProfile::empty("u1");
        assert!(!profile.has_vector());
        assert_eq!(profile.confidence, 0.0);
    }
}
