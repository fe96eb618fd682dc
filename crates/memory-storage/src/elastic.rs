//! Elasticsearch 8 backed long-term store.
//!
//! Documents are the serialized [`LongTermMemoryRecord`]; `embedding` is a
//! `dense_vector` with cosine similarity, so KNN scores come back as
//! `(1 + cosine) / 2`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use memory_types::{ElasticSettings, LongTermMemoryRecord, StoredDocument};

use crate::error::StorageError;
use crate::store::{KnnQuery, LongTermStore, MatchQuery, ResultOrder};

/// REST client for one Elasticsearch index.
pub struct ElasticStore {
    client: Client,
    base_url: String,
    index: String,
    username: Option<String>,
    password: Option<SecretString>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: LongTermMemoryRecord,
}

#[derive(Deserialize)]
struct DeleteByQueryResponse {
    #[serde(default)]
    deleted: u64,
}

impl ElasticStore {
    pub fn new(settings: &ElasticSettings) -> Result<Self, StorageError> {
        let timeout = Duration::from_millis(settings.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            index: settings.index.clone(),
            username: settings.username.clone(),
            password: settings.password.clone().map(SecretString::from),
            timeout,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}{}", self.base_url, self.index, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(
                user,
                self.password.as_ref().map(|p| p.expose_secret().to_string()),
            ),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, StorageError> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                StorageError::Timeout(self.timeout)
            } else {
                StorageError::Backend(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn search(&self, body: Value) -> Result<Vec<StoredDocument>, StorageError> {
        let response = self
            .send(self.client.post(self.url("/_search")).json(&body))
            .await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| StoredDocument {
                record: hit.source,
                score: hit.score.unwrap_or(0.0),
            })
            .collect())
    }

    /// Create the index with its mapping if it does not exist.
    /// Returns true when the index was created.
    pub async fn ensure_index(&self, dimension: usize) -> Result<bool, StorageError> {
        let head = self
            .authorize(self.client.head(self.url("")))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        match head.status() {
            s if s.is_success() => return Ok(false),
            s if s == StatusCode::NOT_FOUND => {}
            s => {
                return Err(StorageError::Api {
                    status: s.as_u16(),
                    body: String::new(),
                })
            }
        }

        let mapping = json!({
            "mappings": {
                "properties": {
                    "id": {"type": "keyword"},
                    "session_id": {"type": "keyword"},
                    "role": {"type": "keyword"},
                    "content": {"type": "text"},
                    "created_at": {"type": "date"},
                    "embedding": {
                        "type": "dense_vector",
                        "dims": dimension,
                        "index": true,
                        "similarity": "cosine"
                    },
                    "metadata": {"type": "object", "enabled": false}
                }
            }
        });
        self.send(self.client.put(self.url("")).json(&mapping)).await?;
        info!(index = %self.index, dimension, "Created long-term index");
        Ok(true)
    }
}

fn session_filter(session_id: Option<&str>) -> Vec<Value> {
    session_id
        .map(|s| vec![json!({"term": {"session_id": s}})])
        .unwrap_or_default()
}

/// Request body for a KNN query.
pub fn knn_body(query: &KnnQuery) -> Value {
    let mut knn = json!({
        "field": "embedding",
        "query_vector": query.vector,
        "k": query.k,
        "num_candidates": (query.k * 2).max(10),
    });
    if let Some(session) = &query.session_id {
        knn["filter"] = json!({"term": {"session_id": session}});
    }
    json!({"knn": knn, "size": query.k})
}

/// Request body for a lexical match query.
pub fn match_body(query: &MatchQuery) -> Value {
    let filter = session_filter(query.session_id.as_deref());
    match query.order {
        ResultOrder::Relevance => json!({
            "query": {
                "bool": {
                    "must": [{
                        "multi_match": {
                            "query": query.text,
                            "fields": ["content"],
                            "type": "best_fields"
                        }
                    }],
                    "filter": filter
                }
            },
            "size": query.size
        }),
        ResultOrder::Recency => {
            let should = if query.text.trim().is_empty() {
                Vec::new()
            } else {
                vec![json!({"match": {"content": query.text}})]
            };
            json!({
                "query": {"bool": {"filter": filter, "should": should}},
                "sort": [{"created_at": {"order": "desc"}}],
                "track_scores": true,
                "size": query.size
            })
        }
    }
}

#[async_trait]
impl LongTermStore for ElasticStore {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn index(&self, record: &LongTermMemoryRecord) -> Result<(), StorageError> {
        let url = self.url(&format!("/_doc/{}", record.id));
        self.send(self.client.put(url).json(record)).await?;
        debug!(id = %record.id, session_id = %record.session_id, "Indexed long-term record");
        Ok(())
    }

    async fn knn_query(&self, query: &KnnQuery) -> Result<Vec<StoredDocument>, StorageError> {
        if query.vector.is_empty() {
            return Err(StorageError::InvalidInput("empty query vector".to_string()));
        }
        self.search(knn_body(query)).await
    }

    async fn match_query(&self, query: &MatchQuery) -> Result<Vec<StoredDocument>, StorageError> {
        if query.order == ResultOrder::Relevance && query.text.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.search(match_body(query)).await
    }

    async fn delete_by(&self, session_id: &str) -> Result<u64, StorageError> {
        let body = json!({"query": {"term": {"session_id": session_id}}});
        let response = self
            .send(self.client.post(self.url("/_delete_by_query")).json(&body))
            .await?;
        let parsed: DeleteByQueryResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        debug!(session_id = %session_id, deleted = parsed.deleted, "Deleted long-term records");
        Ok(parsed.deleted)
    }
}
