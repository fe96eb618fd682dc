//! Behaviour history sources.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::debug;

use memory_types::UserBehaviorEvent;

use crate::error::InterestError;

/// Where interest calculation reads a user's events from.
#[async_trait]
pub trait BehaviorHistory: Send + Sync {
    /// Append an event.
    async fn record(&self, event: UserBehaviorEvent) -> Result<(), InterestError>;

    /// All retained events of a user, oldest first.
    async fn events_for(&self, user_id: &str) -> Result<Vec<UserBehaviorEvent>, InterestError>;
}

/// Process-local history keeping the latest `max_events_per_user` events.
pub struct InMemoryBehaviorHistory {
    events: DashMap<String, VecDeque<UserBehaviorEvent>>,
    max_events_per_user: usize,
}

impl InMemoryBehaviorHistory {
    pub fn new(max_events_per_user: usize) -> Self {
        Self {
            events: DashMap::new(),
            max_events_per_user,
        }
    }

    /// Number of users with at least one event.
    pub fn user_count(&self) -> usize {
        self.events.len()
    }
}

#[async_trait]
impl BehaviorHistory for InMemoryBehaviorHistory {
    async fn record(&self, event: UserBehaviorEvent) -> Result<(), InterestError> {
        if event.user_id.is_empty() {
            return Err(InterestError::InvalidInput("empty user_id".to_string()));
        }
        let mut events = self.events.entry(event.user_id.clone()).or_default();
        events.push_back(event);
        while events.len() > self.max_events_per_user {
            if let Some(dropped) = events.pop_front() {
                debug!(user_id = %dropped.user_id, event_id = %dropped.id, "Dropped oldest behaviour event");
            }
        }
        Ok(())
    }

    async fn events_for(&self, user_id: &str) -> Result<Vec<UserBehaviorEvent>, InterestError> {
        Ok(self
            .events
            .get(user_id)
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default())
    }
}
