//! MongoDB Atlas Vector Search store.
//!
//! Queries run as a `$vectorSearch` aggregation; index management goes
//! through the `createSearchIndexes` command and the `$listSearchIndexes`
//! stage. Pipeline and document conversion are plain functions so they can be
//! tested without a cluster.

use std::time::Instant;

use async_trait::async_trait;
use cinevec_core::EmbeddingVector;
use futures::TryStreamExt;
use mongodb::bson::binary::Vector as BinaryVector;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{Binary, Bson, Document as BsonDocument, doc};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use tracing::{debug, info};

use crate::backend::{VectorQuery, VectorStore, check_limit};
use crate::document::{Document, DocumentId, FieldValue, MatchResult};
use crate::error::{Result, StoreError};
use crate::filter::QueryFilter;
use crate::index::{IndexState, IndexStatus, VectorIndexDefinition};

/// Default database holding the sample movie data.
pub const DEFAULT_DATABASE: &str = "sample_mflix";

/// Default collection with precomputed plot embeddings.
pub const DEFAULT_COLLECTION: &str = "embedded_movies";

/// Environment variable holding the connection string.
pub const URI_ENV: &str = "MONGODB_URI";

const APP_NAME: &str = "cinevec";

/// Projection key the search score is written to.
const SCORE_FIELD: &str = "_searchScore";

/// Server error code for an index that already exists.
const INDEX_ALREADY_EXISTS: i32 = 68;

/// Configuration for the Atlas store.
#[derive(Debug, Clone)]
pub struct AtlasConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

impl AtlasConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }

    /// Read the connection string from `MONGODB_URI`.
    pub fn from_env() -> Result<Self> {
        let uri = std::env::var(URI_ENV)
            .map_err(|_| StoreError::Config(format!("{} not set", URI_ENV)))?;
        Ok(Self::new(uri))
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }
}

/// Vector store backed by an Atlas cluster.
pub struct AtlasStore {
    client: Client,
    collection: Collection<BsonDocument>,
    config: AtlasConfig,
}

impl AtlasStore {
    /// Connect to the cluster. The driver connects lazily, so this only
    /// fails on a malformed connection string.
    pub async fn connect(config: AtlasConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.uri).await?;
        options.app_name = Some(APP_NAME.to_string());
        let client = Client::with_options(options)?;
        let collection = client
            .database(&config.database)
            .collection::<BsonDocument>(&config.collection);

        info!(
            database = %config.database,
            collection = %config.collection,
            "Atlas store configured"
        );

        Ok(Self {
            client,
            collection,
            config,
        })
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    async fn list_search_indexes(&self, name: &str) -> Result<Vec<BsonDocument>> {
        let cursor = self
            .collection
            .aggregate([doc! { "$listSearchIndexes": { "name": name } }])
            .await?;
        let indexes: Vec<BsonDocument> = cursor.try_collect().await?;
        Ok(indexes)
    }
}

#[async_trait]
impl VectorStore for AtlasStore {
    async fn index_status(&self, name: &str) -> Result<IndexStatus> {
        let indexes = self.list_search_indexes(name).await?;
        let status = indexes
            .iter()
            .find(|d| d.get_str("name").ok() == Some(name))
            .map(parse_index_status)
            .unwrap_or_else(IndexStatus::absent);

        debug!(index = %name, state = %status.state, "Index status");
        Ok(status)
    }

    async fn create_index(&self, definition: &VectorIndexDefinition) -> Result<bool> {
        if self.index_status(&definition.name).await?.state != IndexState::Absent {
            debug!(index = %definition.name, "Index already exists");
            return Ok(false);
        }

        let command = create_index_command(&self.config.collection, definition)?;
        match self
            .client
            .database(&self.config.database)
            .run_command(command)
            .await
        {
            Ok(_) => {
                info!(
                    index = %definition.name,
                    path = %definition.path,
                    dimensions = definition.dimensions,
                    similarity = %definition.similarity,
                    "Index build started"
                );
                Ok(true)
            }
            Err(e) if is_already_exists(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn vector_search(&self, query: &VectorQuery) -> Result<Vec<MatchResult>> {
        check_limit(query.limit)?;
        let pipeline = search_pipeline(query)?;

        let start = Instant::now();
        let cursor = self.collection.aggregate(pipeline).await?;
        let raw: Vec<BsonDocument> = cursor.try_collect().await?;

        debug!(
            index = %query.index,
            results = raw.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Vector search complete"
        );

        raw.into_iter().map(match_from_bson).collect()
    }

    async fn find_one(&self, filter: &QueryFilter) -> Result<Option<Document>> {
        let found = self.collection.find_one(filter_to_bson(filter)).await?;
        found.map(document_from_bson).transpose()
    }

    async fn update_embedding(
        &self,
        id: &DocumentId,
        field: &str,
        vector: &EmbeddingVector,
    ) -> Result<()> {
        let mut set = BsonDocument::new();
        set.insert(field, vector_to_bson(vector));

        let result = self
            .collection
            .update_one(doc! { "_id": id_to_bson(id) }, doc! { "$set": set })
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::InvalidData(format!("no document with id {}", id)));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "atlas"
    }
}

fn is_already_exists(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Command(c) => {
            c.code == INDEX_ALREADY_EXISTS || c.code_name == "IndexAlreadyExists"
        }
        _ => false,
    }
}

/// Build the `createSearchIndexes` command for one vector index.
pub fn create_index_command(
    collection: &str,
    definition: &VectorIndexDefinition,
) -> Result<BsonDocument> {
    let dimensions = i32::try_from(definition.dimensions).map_err(|_| {
        StoreError::InvalidQuery(format!("dimensions {} out of range", definition.dimensions))
    })?;

    let mut vector_field = doc! {
        "type": "vector",
        "path": definition.path.as_str(),
        "numDimensions": dimensions,
        "similarity": definition.similarity.as_str(),
    };
    if definition.quantization != cinevec_core::Quantization::None {
        vector_field.insert("quantization", definition.quantization.as_str());
    }

    let mut fields = vec![vector_field];
    fields.extend(
        definition
            .filter_fields
            .iter()
            .map(|path| doc! { "type": "filter", "path": path.as_str() }),
    );

    Ok(doc! {
        "createSearchIndexes": collection,
        "indexes": [{
            "name": definition.name.as_str(),
            "type": "vectorSearch",
            "definition": { "fields": fields },
        }],
    })
}

/// Map a `$listSearchIndexes` entry to an index status.
pub fn parse_index_status(entry: &BsonDocument) -> IndexStatus {
    let state = match entry.get_str("status").unwrap_or("PENDING") {
        "READY" | "STALE" => IndexState::Ready,
        "FAILED" => IndexState::Failed(
            entry
                .get_str("message")
                .unwrap_or("index build failed")
                .to_string(),
        ),
        "DELETING" | "DOES_NOT_EXIST" => IndexState::Absent,
        _ => IndexState::Building,
    };

    let dimensions = entry
        .get_document("latestDefinition")
        .ok()
        .and_then(|def| def.get_array("fields").ok())
        .and_then(|fields| {
            fields
                .iter()
                .filter_map(Bson::as_document)
                .find(|f| f.get_str("type").ok() == Some("vector"))
        })
        .and_then(|f| f.get("numDimensions"))
        .and_then(bson_to_usize);

    IndexStatus::new(state, dimensions)
}

fn bson_to_usize(value: &Bson) -> Option<usize> {
    match value {
        Bson::Int32(i) => usize::try_from(*i).ok(),
        Bson::Int64(i) => usize::try_from(*i).ok(),
        Bson::Double(d) if *d >= 0.0 && d.fract() == 0.0 => Some(*d as usize),
        _ => None,
    }
}

/// Build the aggregation pipeline for a similarity query.
pub fn search_pipeline(query: &VectorQuery) -> Result<Vec<BsonDocument>> {
    let limit = i64::try_from(query.limit)
        .map_err(|_| StoreError::InvalidQuery(format!("limit {} out of range", query.limit)))?;

    let mut stage = doc! {
        "index": query.index.as_str(),
        "path": query.path.as_str(),
        "queryVector": vector_to_bson(&query.vector),
    };
    if query.exact {
        stage.insert("exact", true);
    } else {
        stage.insert("numCandidates", query.candidates() as i64);
    }
    stage.insert("limit", limit);
    if let Some(filter) = &query.filter {
        stage.insert("filter", filter_to_bson(filter));
    }

    let mut pipeline = vec![doc! { "$vectorSearch": stage }];
    if query.include_score {
        pipeline.push(doc! { "$set": { SCORE_FIELD: { "$meta": "vectorSearchScore" } } });
    }
    if !query.include_vector {
        pipeline.push(doc! { "$unset": query.path.as_str() });
    }
    Ok(pipeline)
}

/// Translate a filter into MQL. `Not` becomes a single-clause `$nor`, which
/// works for compound predicates too.
pub fn filter_to_bson(filter: &QueryFilter) -> BsonDocument {
    fn op(field: &str, operator: &str, value: Bson) -> BsonDocument {
        let mut cond = BsonDocument::new();
        cond.insert(operator, value);
        let mut out = BsonDocument::new();
        out.insert(field, cond);
        out
    }

    fn list(values: &[FieldValue]) -> Bson {
        Bson::Array(values.iter().map(field_to_bson).collect())
    }

    fn clauses(filters: &[QueryFilter]) -> Bson {
        Bson::Array(
            filters
                .iter()
                .map(|f| Bson::Document(filter_to_bson(f)))
                .collect(),
        )
    }

    match filter {
        QueryFilter::Eq(f, v) => op(f, "$eq", field_to_bson(v)),
        QueryFilter::Ne(f, v) => op(f, "$ne", field_to_bson(v)),
        QueryFilter::Gt(f, v) => op(f, "$gt", field_to_bson(v)),
        QueryFilter::Gte(f, v) => op(f, "$gte", field_to_bson(v)),
        QueryFilter::Lt(f, v) => op(f, "$lt", field_to_bson(v)),
        QueryFilter::Lte(f, v) => op(f, "$lte", field_to_bson(v)),
        QueryFilter::In(f, vs) => op(f, "$in", list(vs)),
        QueryFilter::Nin(f, vs) => op(f, "$nin", list(vs)),
        QueryFilter::And(fs) => doc! { "$and": clauses(fs) },
        QueryFilter::Or(fs) => doc! { "$or": clauses(fs) },
        QueryFilter::Not(inner) => doc! { "$nor": [filter_to_bson(inner)] },
    }
}

fn field_to_bson(value: &FieldValue) -> Bson {
    match value {
        FieldValue::Null => Bson::Null,
        FieldValue::Bool(b) => Bson::Boolean(*b),
        FieldValue::Int(i) => Bson::Int64(*i),
        FieldValue::Float(f) => Bson::Double(*f),
        FieldValue::Text(s) => Bson::String(s.clone()),
        FieldValue::Vector(v) => vector_to_bson(v),
    }
}

fn vector_to_bson(vector: &EmbeddingVector) -> Bson {
    Bson::Array(
        vector
            .as_slice()
            .iter()
            .map(|x| Bson::Double(f64::from(*x)))
            .collect(),
    )
}

fn id_to_bson(id: &DocumentId) -> Bson {
    match ObjectId::parse_str(id.as_str()) {
        Ok(oid) => Bson::ObjectId(oid),
        Err(_) => Bson::String(id.to_string()),
    }
}

/// Convert a raw BSON value to a field value.
///
/// Numeric arrays and float32 binary vectors become vectors. Values with no
/// scalar counterpart (string arrays, subdocuments, dates) are kept as their
/// relaxed extended JSON text.
fn bson_to_field(value: Bson) -> Result<FieldValue> {
    let field = match value {
        Bson::Null | Bson::Undefined => FieldValue::Null,
        Bson::Boolean(b) => FieldValue::Bool(b),
        Bson::Int32(i) => FieldValue::Int(i64::from(i)),
        Bson::Int64(i) => FieldValue::Int(i),
        Bson::Double(d) => FieldValue::Float(d),
        Bson::String(s) => FieldValue::Text(s),
        Bson::ObjectId(oid) => FieldValue::Text(oid.to_hex()),
        Bson::Array(items) if !items.is_empty() && items.iter().all(is_number) => {
            FieldValue::Vector(EmbeddingVector::new(
                items
                    .iter()
                    .filter_map(|b| match b {
                        Bson::Double(d) => Some(*d as f32),
                        Bson::Int32(i) => Some(*i as f32),
                        Bson::Int64(i) => Some(*i as f32),
                        _ => None,
                    })
                    .collect(),
            ))
        }
        Bson::Binary(binary) if binary.subtype == BinarySubtype::Vector => {
            FieldValue::Vector(binary_to_vector(&binary)?)
        }
        other => FieldValue::Text(other.into_relaxed_extjson().to_string()),
    };
    Ok(field)
}

/// Decode a BSON binary vector. Only float32 vectors are usable as query
/// vectors; int8 and packed-bit vectors are rejected.
fn binary_to_vector(binary: &Binary) -> Result<EmbeddingVector> {
    match BinaryVector::try_from(binary) {
        Ok(BinaryVector::Float32(values)) => Ok(EmbeddingVector::new(values)),
        Ok(BinaryVector::Int8(_)) => Err(StoreError::InvalidData(
            "int8 binary vectors are not supported".to_string(),
        )),
        Ok(BinaryVector::PackedBit(_)) => Err(StoreError::InvalidData(
            "packed-bit binary vectors are not supported".to_string(),
        )),
        Err(e) => Err(StoreError::InvalidData(format!("malformed binary vector: {}", e))),
    }
}

fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_))
}

/// Convert a stored BSON document, taking `_id` as the document id.
pub fn document_from_bson(mut raw: BsonDocument) -> Result<Document> {
    let id = match raw.remove("_id") {
        Some(Bson::ObjectId(oid)) => DocumentId::new(oid.to_hex()),
        Some(Bson::String(s)) => DocumentId::new(s),
        // Other id kinds would not survive the trip back through `id_to_bson`.
        Some(other) => {
            return Err(StoreError::InvalidData(format!(
                "unsupported _id type {:?}",
                other.element_type()
            )));
        }
        None => return Err(StoreError::InvalidData("document without _id".to_string())),
    };

    let mut doc = Document::new(id);
    for (key, value) in raw {
        doc.set(key, bson_to_field(value)?);
    }
    Ok(doc)
}

/// Convert one search hit, lifting the projected score out of the fields.
pub fn match_from_bson(mut raw: BsonDocument) -> Result<MatchResult> {
    let score = match raw.remove(SCORE_FIELD) {
        Some(Bson::Double(d)) => Some(d),
        Some(Bson::Int32(i)) => Some(f64::from(i)),
        Some(Bson::Int64(i)) => Some(i as f64),
        Some(other) => {
            return Err(StoreError::InvalidData(format!(
                "non-numeric search score: {}",
                other
            )));
        }
        None => None,
    };
    Ok(MatchResult::new(document_from_bson(raw)?, score))
}
