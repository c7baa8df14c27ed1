//! Qdrant REST 客户端
//!
//! 检索：POST {url}/collections/{name}/points/search；健康检查：GET {url}/collections

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{HiveError, Result};
use crate::vector::{ScoredPoint, VectorSearch};

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<RawPoint>,
}

/// Qdrant 的点 ID 可能是整数或 UUID 字符串
#[derive(Debug, Deserialize)]
struct RawPoint {
    id: serde_json::Value,
    score: f32,
    #[serde(default)]
    payload: serde_json::Value,
}

impl From<RawPoint> for ScoredPoint {
    fn from(p: RawPoint) -> Self {
        let id = match p.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        ScoredPoint {
            id,
            score: p.score,
            payload: p.payload,
        }
    }
}

pub struct QdrantClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl QdrantClient {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl VectorSearch for QdrantClient {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let to_err = |e: reqwest::Error| HiveError::VectorSearch {
            collection: collection.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/collections/{}/points/search", self.url, collection))
            .timeout(self.timeout)
            .json(&SearchRequest {
                vector,
                limit,
                with_payload: true,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(to_err)?;

        let body: SearchResponse = response.json().await.map_err(to_err)?;
        Ok(body.result.into_iter().map(ScoredPoint::from).collect())
    }

    async fn health(&self) -> bool {
        match self
            .client
            .get(format!("{}/collections", self.url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                tracing::debug!("qdrant health check failed: {}", e);
                false
            }
        }
    }
}
