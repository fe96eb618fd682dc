//! Hybrid search request and result types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::interest::UserInterestProfile;
use crate::message::StoredDocument;

/// Parameters of one hybrid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub user_interest: UserInterestProfile,
    /// Maximum number of results returned
    pub limit: usize,
    /// Maximum number of candidates entering the rerank stage
    pub rerank_limit: usize,
    pub vector_weight: f32,
    pub text_weight: f32,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, user_interest: UserInterestProfile) -> Self {
        Self {
            query: query.into(),
            user_interest,
            limit: 10,
            rerank_limit: 20,
            vector_weight: 0.4,
            text_weight: 0.3,
        }
    }

    pub fn with_limits(mut self, limit: usize, rerank_limit: usize) -> Self {
        self.limit = limit;
        self.rerank_limit = rerank_limit;
        self
    }

    pub fn with_weights(mut self, vector_weight: f32, text_weight: f32) -> Self {
        self.vector_weight = vector_weight;
        self.text_weight = text_weight;
        self
    }

    /// Weight given to the rerank score: `1 - vector_weight - text_weight`.
    pub fn rerank_weight(&self) -> f32 {
        1.0 - self.vector_weight - self.text_weight
    }
}

/// A document surviving the initial filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub id: String,
    pub content: String,
    /// Stored embedding, empty when the document was indexed text-only
    #[serde(default)]
    pub vector: Vec<f32>,
    pub vector_score: f32,
    pub text_score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SearchCandidate {
    /// Candidate produced by the vector branch.
    pub fn from_vector_hit(doc: StoredDocument) -> Self {
        Self::from_document(doc, true)
    }

    /// Candidate produced by the lexical branch.
    pub fn from_text_hit(doc: StoredDocument) -> Self {
        Self::from_document(doc, false)
    }

    fn from_document(doc: StoredDocument, vector_hit: bool) -> Self {
        let (vector_score, text_score) = if vector_hit {
            (doc.score, 0.0)
        } else {
            (0.0, doc.score)
        };
        let record = doc.record;
        Self {
            id: record.id,
            content: record.content,
            vector: record.embedding.unwrap_or_default(),
            vector_score,
            text_score,
            metadata: record.metadata,
        }
    }
}

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub vector_score: f32,
    pub text_score: f32,
    pub rerank_score: f32,
    pub final_score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}
