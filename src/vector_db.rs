use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        value::Kind, CreateCollectionBuilder, Distance, PointStruct, Query, QueryPointsBuilder,
        UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
    },
    Payload, Qdrant,
};
use serde_json::{json, Map, Number, Value};
use tokio::sync::OnceCell;
use tracing::info;
use uuid::Uuid;

use crate::{embeddings::Embedder, error::RetrievalError};

/// Provenance attached to a stored chunk (`source`, `table`, `row_key`, ...).
pub type Metadata = Map<String, Value>;

const CONTENT_FIELD: &str = "page_content";
const METADATA_FIELD: &str = "metadata";
const CHUNK_ID_FIELD: &str = "chunk_id";

/// Nearest chunks for a query, in the order the store ranked them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace chunks. The three vectors are parallel.
    async fn upsert(
        &self,
        ids: Vec<String>,
        documents: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<(), RetrievalError>;

    async fn query(&self, query_text: &str, n_results: usize)
        -> Result<QueryResult, RetrievalError>;
}

/// Checks the shape of an upsert batch: parallel lengths and unique ids.
pub fn validate_batch(
    ids: &[String],
    documents: &[String],
    metadatas: &[Metadata],
) -> Result<(), RetrievalError> {
    if ids.len() != documents.len() || ids.len() != metadatas.len() {
        return Err(RetrievalError::InvalidBatch(format!(
            "{} ids, {} documents, {} metadatas",
            ids.len(),
            documents.len(),
            metadatas.len()
        )));
    }
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(RetrievalError::InvalidBatch(format!("duplicate id {id}")));
        }
    }
    Ok(())
}

/// Qdrant point ids must be UUIDs or integers; chunk ids are mapped onto a
/// stable UUID and kept verbatim in the payload.
fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: u64,
    embedder: Arc<dyn Embedder>,
    ready: OnceCell<()>,
}

impl QdrantStore {
    pub fn new(
        url: &str,
        collection: &str,
        dimension: u64,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RetrievalError> {
        let client = Qdrant::from_url(url).build()?;
        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
            embedder,
            ready: OnceCell::new(),
        })
    }

    async fn ensure_collection(&self) -> Result<(), RetrievalError> {
        self.ready
            .get_or_try_init(|| async {
                if !self.client.collection_exists(&self.collection).await? {
                    info!(
                        "Collection '{}' does not exist. Creating...",
                        self.collection
                    );
                    self.client
                        .create_collection(
                            CreateCollectionBuilder::new(&self.collection).vectors_config(
                                VectorParamsBuilder::new(self.dimension, Distance::Cosine),
                            ),
                        )
                        .await?;
                    info!("Collection '{}' created.", self.collection);
                }
                Ok::<_, RetrievalError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(
        &self,
        ids: Vec<String>,
        documents: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<(), RetrievalError> {
        validate_batch(&ids, &documents, &metadatas)?;
        if ids.is_empty() {
            info!("No documents provided to add to the vector store.");
            return Ok(());
        }
        self.ensure_collection().await?;

        let vectors = self.embedder.embed(documents.clone()).await?;
        let mut points = Vec::with_capacity(ids.len());
        for ((id, (document, metadata)), vector) in ids
            .into_iter()
            .zip(documents.into_iter().zip(metadatas))
            .zip(vectors)
        {
            let payload = Payload::try_from(json!({
                CHUNK_ID_FIELD: id,
                CONTENT_FIELD: document,
                METADATA_FIELD: metadata,
            }))?;
            points.push(PointStruct::new(point_id(&id), vector, payload));
        }

        info!(
            "Upserting {} points into collection '{}'...",
            points.len(),
            self.collection
        );
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        query_text: &str,
        n_results: usize,
    ) -> Result<QueryResult, RetrievalError> {
        self.ensure_collection().await?;

        let vector = self
            .embedder
            .embed(vec![query_text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Embedding("no embedding for query".to_string()))?;

        let response = self
            .client
            .query(
                QueryPointsBuilder::new(&self.collection)
                    .query(Query::new_nearest(vector))
                    .limit(n_results as u64)
                    .with_payload(true),
            )
            .await?;

        let mut result = QueryResult::default();
        for point in response.result {
            let (document, metadata) = split_payload(point.payload);
            result.documents.push(document);
            result.metadatas.push(metadata);
        }
        Ok(result)
    }
}

fn split_payload(mut payload: HashMap<String, QdrantValue>) -> (String, Metadata) {
    let document = match payload.remove(CONTENT_FIELD).map(qdrant_to_json) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    let metadata = match payload.remove(METADATA_FIELD).map(qdrant_to_json) {
        Some(Value::Object(map)) => map,
        _ => Metadata::new(),
    };
    (document, metadata)
}

fn qdrant_to_json(value: QdrantValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => Number::from_f64(d).map_or(Value::Null, Value::Number),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(qdrant_to_json).collect())
        }
        Some(Kind::StructValue(st)) => Value::Object(
            st.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_to_json(v)))
                .collect(),
        ),
    }
}
