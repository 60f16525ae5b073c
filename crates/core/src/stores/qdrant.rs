use crate::traits::VectorIndex;
use crate::{ChunkMetadata, IndexEntry, IndexError, SearchHit};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

pub struct QdrantStore {
    endpoint: Url,
    collection: String,
    client: Client,
    vector_size: Mutex<Option<usize>>,
}

impl QdrantStore {
    /// Connects to the server and reads the collection's vector size if the
    /// collection already exists. The collection itself is created lazily on
    /// the first insert, once the embedding dimension is known.
    pub async fn open(endpoint: &str, collection: impl Into<String>) -> Result<Self, IndexError> {
        let mut endpoint = endpoint.to_string();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let store = Self {
            endpoint: Url::parse(&endpoint)?,
            collection: collection.into(),
            client: Client::new(),
            vector_size: Mutex::new(None),
        };

        let response = store
            .client
            .get(store.url("")?)
            .send()
            .await
            .map_err(|error| IndexError::CollectionUnavailable(format!("qdrant: {error}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                info!(collection = %store.collection, "qdrant collection will be created on first insert");
            }
            status if status.is_success() => {
                let parsed: Value = response.json().await?;
                let size = parsed
                    .pointer("/result/config/params/vectors/size")
                    .and_then(Value::as_u64)
                    .map(|size| size as usize);
                *store.vector_size.lock().await = size;
                info!(collection = %store.collection, vector_size = ?size, "reusing qdrant collection");
            }
            status => {
                return Err(IndexError::CollectionUnavailable(format!(
                    "qdrant returned {status} for collection {}",
                    store.collection
                )))
            }
        }

        Ok(store)
    }

    fn url(&self, suffix: &str) -> Result<Url, IndexError> {
        Ok(self
            .endpoint
            .join(&format!("collections/{}{suffix}", self.collection))?)
    }

    async fn ensure_collection(&self, vector_size: usize) -> Result<(), IndexError> {
        let mut known = self.vector_size.lock().await;
        match *known {
            Some(size) if size == vector_size => return Ok(()),
            Some(size) => {
                return Err(IndexError::Request(format!(
                    "collection vector size {size} does not match embedding size {vector_size}"
                )))
            }
            None => {}
        }

        let response = self
            .client
            .put(self.url("")?)
            .json(&json!({ "vectors": { "size": vector_size, "distance": "Cosine" } }))
            .send()
            .await?;
        check_status(response.status())?;

        *known = Some(vector_size);
        info!(collection = %self.collection, vector_size, "created qdrant collection");
        Ok(())
    }
}

fn check_status(status: StatusCode) -> Result<(), IndexError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(IndexError::BackendResponse {
            backend: "qdrant".to_string(),
            details: status.to_string(),
        })
    }
}

fn point_id(entry: &IndexEntry) -> Result<Uuid, IndexError> {
    let prefix = entry.id.get(..32).unwrap_or(&entry.id);
    u128::from_str_radix(prefix, 16)
        .map(Uuid::from_u128)
        .map_err(|error| IndexError::Request(format!("entry id {} is not hex: {error}", entry.id)))
}

const TIE_FETCH_MARGIN: usize = 8;

/// True when the lowest fetched score is below the k-th score, so no unseen
/// point can tie with the k-th hit.
fn cutoff_is_settled(sorted: &[(u64, SearchHit)], k: usize) -> bool {
    match (sorted.get(k - 1), sorted.last()) {
        (Some((_, kth)), Some((_, last))) => last.score < kth.score,
        _ => false,
    }
}

impl QdrantStore {
    /// Up to `limit` hits in server order, paired with their insertion position.
    async fn fetch_hits(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(u64, SearchHit)>, IndexError> {
        let response = self
            .client
            .post(self.url("/points/search")?)
            .json(&json!({
                "vector": query_vector,
                "limit": limit,
                "with_payload": true,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        check_status(response.status())?;

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut result = Vec::with_capacity(hits.len());
        for hit in hits {
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
            let position = hit
                .pointer("/payload/position")
                .and_then(Value::as_u64)
                .unwrap_or(u64::MAX);
            let text = hit
                .pointer("/payload/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let source = hit
                .pointer("/payload/source")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let page = hit
                .pointer("/payload/page")
                .and_then(Value::as_u64)
                .ok_or_else(|| IndexError::BackendResponse {
                    backend: "qdrant".to_string(),
                    details: "search hit without page payload".to_string(),
                })? as u32;

            result.push((
                position,
                SearchHit {
                    text,
                    metadata: ChunkMetadata { source, page },
                    score,
                },
            ));
        }
        Ok(result)
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    fn backend_name(&self) -> &'static str {
        "qdrant"
    }

    async fn insert(&self, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        let Some(first) = entries.first() else {
            return Ok(());
        };
        let vector_size = first.embedding.len();
        self.ensure_collection(vector_size).await?;

        let points = entries
            .iter()
            .map(|entry| {
                if entry.embedding.len() != vector_size {
                    return Err(IndexError::Request(format!(
                        "embedding dimension {} != {}",
                        entry.embedding.len(),
                        vector_size
                    )));
                }

                Ok(json!({
                    "id": point_id(entry)?.to_string(),
                    "vector": entry.embedding,
                    "payload": {
                        "entry_id": entry.id,
                        "text": entry.text,
                        "source": entry.metadata.source,
                        "page": entry.metadata.page,
                        "position": entry.position,
                        "indexed_at": entry.indexed_at.to_rfc3339(),
                    },
                }))
            })
            .collect::<Result<Vec<_>, IndexError>>()?;
        let count = points.len();

        let mut url = self.url("/points")?;
        url.set_query(Some("wait=true"));
        let response = self
            .client
            .put(url)
            .json(&json!({ "points": points }))
            .send()
            .await?;
        check_status(response.status())?;

        debug!(collection = %self.collection, points = count, "upserted qdrant points");
        Ok(())
    }

    async fn search_vector(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        // Qdrant orders equal scores itself, so keep widening the request
        // until every point tied with the k-th score has been seen.
        let mut limit = k + TIE_FETCH_MARGIN;
        loop {
            let mut hits = self.fetch_hits(query_vector, limit).await?;
            let exhausted = hits.len() < limit;
            hits.sort_by(|(left_pos, left), (right_pos, right)| {
                right
                    .score
                    .total_cmp(&left.score)
                    .then(left_pos.cmp(right_pos))
            });

            if exhausted || cutoff_is_settled(&hits, k) {
                hits.truncate(k);
                return Ok(hits.into_iter().map(|(_, hit)| hit).collect());
            }
            debug!(limit, k, "scores tied at the cutoff, widening qdrant search");
            limit *= 2;
        }
    }

    async fn clear(&self) -> Result<(), IndexError> {
        let mut known = self.vector_size.lock().await;
        let response = self.client.delete(self.url("")?).send().await?;
        if response.status() != StatusCode::NOT_FOUND {
            check_status(response.status())?;
        }
        *known = None;
        info!(collection = %self.collection, "dropped qdrant collection");
        Ok(())
    }

    async fn len(&self) -> Result<usize, IndexError> {
        let response = self
            .client
            .post(self.url("/points/count")?)
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        check_status(response.status())?;

        let parsed: Value = response.json().await?;
        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .ok_or_else(|| IndexError::BackendResponse {
                backend: "qdrant".to_string(),
                details: "count response without result.count".to_string(),
            })
    }

    async fn next_position(&self) -> Result<u64, IndexError> {
        // entries are only ever appended or dropped all at once
        Ok(self.len().await? as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(position: u64, page: u32) -> IndexEntry {
        IndexEntry {
            id: format!("{:064x}", position + 1),
            embedding: vec![0.5, 0.5],
            text: format!("page {page}"),
            metadata: ChunkMetadata {
                source: "doc.pdf".to_string(),
                page,
            },
            position,
            indexed_at: Utc::now(),
        }
    }

    async fn missing_collection() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/collection"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn first_insert_creates_collection_then_upserts() {
        let server = missing_collection().await;
        Mock::given(method("PUT"))
            .and(path("/collections/collection"))
            .and(body_partial_json(json!({"vectors": {"size": 2, "distance": "Cosine"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/collection/points"))
            .and(query_param("wait", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
            .expect(2)
            .mount(&server)
            .await;

        let store = QdrantStore::open(&server.uri(), "collection").await.unwrap();
        store.insert(vec![entry(0, 1)]).await.unwrap();
        store.insert(vec![entry(1, 2)]).await.unwrap();
    }

    #[tokio::test]
    async fn search_orders_ties_by_position() {
        let server = missing_collection().await;
        Mock::given(method("POST"))
            .and(path("/collections/collection/points/search"))
            .and(body_partial_json(json!({"limit": 10, "with_payload": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [
                    {"id": "b", "score": 0.9, "payload": {"text": "late", "source": "doc.pdf", "page": 3, "position": 7}},
                    {"id": "a", "score": 0.9, "payload": {"text": "early", "source": "doc.pdf", "page": 2, "position": 1}}
                ]
            })))
            .mount(&server)
            .await;

        let store = QdrantStore::open(&server.uri(), "collection").await.unwrap();
        let hits = store.search_vector(&[1.0, 0.0], 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "early");
        assert_eq!(hits[0].metadata.page, 2);
        assert_eq!(hits[1].metadata.page, 3);
    }

    fn scored(score: f64, position: u64) -> Value {
        json!({
            "id": position.to_string(),
            "score": score,
            "payload": {"text": format!("p{position}"), "source": "doc.pdf", "page": 1, "position": position}
        })
    }

    #[tokio::test]
    async fn ties_at_the_cutoff_widen_the_search() {
        let server = missing_collection().await;
        let first_page: Vec<Value> = (1..=9).rev().map(|pos| scored(0.9, pos)).collect();
        let mut second_page = first_page.clone();
        second_page.push(scored(0.9, 0));
        second_page.push(scored(0.2, 10));
        Mock::given(method("POST"))
            .and(path("/collections/collection/points/search"))
            .and(body_partial_json(json!({"limit": 9})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": first_page})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collections/collection/points/search"))
            .and(body_partial_json(json!({"limit": 18})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": second_page})))
            .expect(1)
            .mount(&server)
            .await;

        let store = QdrantStore::open(&server.uri(), "collection").await.unwrap();
        let hits = store.search_vector(&[1.0, 0.0], 1).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "p0");
    }

    #[tokio::test]
    async fn search_on_missing_collection_is_empty() {
        let server = missing_collection().await;
        Mock::given(method("POST"))
            .and(path("/collections/collection/points/search"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = QdrantStore::open(&server.uri(), "collection").await.unwrap();
        assert!(store.search_vector(&[1.0], 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn existing_collection_size_is_enforced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/collection"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"config": {"params": {"vectors": {"size": 3, "distance": "Cosine"}}}}
            })))
            .mount(&server)
            .await;

        let store = QdrantStore::open(&server.uri(), "collection").await.unwrap();
        let result = store.insert(vec![entry(0, 1)]).await;
        assert!(matches!(result, Err(IndexError::Request(_))));
    }

    #[tokio::test]
    async fn unreachable_server_is_collection_unavailable() {
        let result = QdrantStore::open("http://127.0.0.1:1", "collection").await;
        assert!(matches!(result, Err(IndexError::CollectionUnavailable(_))));
    }
}
