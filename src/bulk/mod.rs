//! Batching engine for heterogeneous write operations.
//!
//! A `BulkWriteRequest` collects write models in caller order; `execute`
//! partitions them into server-sized batches, drives their sequential
//! submission through a `WriteSink`, and folds every per-batch outcome
//! into one `BulkWriteResult` (or suppresses the result entirely under an
//! unacknowledged write concern).
pub mod batch;
pub mod error;
pub mod results;

use bson::{self, Bson, oid};
use common::WriteConcern;
use std::collections::BTreeMap;
use Error::ArgumentError;
use Result;

use self::batch::{split_into_batches, WriteBatch};
use self::error::BulkWriteException;
use self::results::{BatchResult, BulkWriteResult};

/// Marker interface for writes that can be batched together.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne {
        document: bson::Document,
    },
    DeleteOne {
        filter: bson::Document,
        collation: Option<bson::Document>,
    },
    DeleteMany {
        filter: bson::Document,
        collation: Option<bson::Document>,
    },
    ReplaceOne {
        filter: bson::Document,
        replacement: bson::Document,
        upsert: Option<bool>,
        collation: Option<bson::Document>,
    },
    UpdateOne {
        filter: bson::Document,
        update: bson::Document,
        upsert: Option<bool>,
        collation: Option<bson::Document>,
    },
    UpdateMany {
        filter: bson::Document,
        update: bson::Document,
        upsert: Option<bool>,
        collation: Option<bson::Document>,
    },
}

impl WriteModel {
    /// Whether this model inserts a full document that carries its own id.
    pub fn is_insert(&self) -> bool {
        match *self {
            WriteModel::InsertOne { .. } => true,
            _ => false,
        }
    }

    /// Cumulative encoded size of the model's document payloads, in bytes.
    pub fn encoded_len(&self) -> Result<usize> {
        match *self {
            WriteModel::InsertOne { ref document } => doc_len(document),
            WriteModel::DeleteOne { ref filter, ref collation } |
            WriteModel::DeleteMany { ref filter, ref collation } => {
                Ok(doc_len(filter)? + opt_doc_len(collation)?)
            }
            WriteModel::ReplaceOne { ref filter, ref replacement, ref collation, .. } => {
                Ok(doc_len(filter)? + doc_len(replacement)? + opt_doc_len(collation)?)
            }
            WriteModel::UpdateOne { ref filter, ref update, ref collation, .. } |
            WriteModel::UpdateMany { ref filter, ref update, ref collation, .. } => {
                Ok(doc_len(filter)? + doc_len(update)? + opt_doc_len(collation)?)
            }
        }
    }
}

fn doc_len(doc: &bson::Document) -> Result<usize> {
    let mut buf = Vec::new();
    bson::encode_document(&mut buf, doc)?;
    Ok(buf.len())
}

fn opt_doc_len(doc: &Option<bson::Document>) -> Result<usize> {
    match *doc {
        Some(ref doc) => doc_len(doc),
        None => Ok(0),
    }
}

/// Produces unique document ids on demand.
pub trait IdSource {
    fn generate(&mut self) -> Result<Bson>;
}

/// The default id source, backed by freshly generated object ids.
#[derive(Debug, Default)]
pub struct ObjectIdSource;

impl IdSource for ObjectIdSource {
    fn generate(&mut self) -> Result<Bson> {
        Ok(Bson::ObjectId(oid::ObjectId::new()?))
    }
}

/// Write-batching limits advertised by the connected server. Treated as
/// immutable for the duration of one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerLimits {
    /// Maximum number of write operations in one submitted batch.
    pub max_write_batch_size: usize,
    /// Maximum cumulative encoded size of one submitted batch, in bytes.
    pub max_message_size_bytes: usize,
    /// Maximum encoded size of a single operation's payload, in bytes.
    pub max_bson_object_size: usize,
}

impl Default for ServerLimits {
    fn default() -> ServerLimits {
        ServerLimits {
            max_write_batch_size: 1000,
            max_message_size_bytes: 48_000_000,
            max_bson_object_size: 16_777_216,
        }
    }
}

/// An ordered sequence of write models, along with the failure semantics
/// and write concern they will be submitted under.
pub struct BulkWriteRequest {
    models: Vec<WriteModel>,
    ordered: bool,
    write_concern: WriteConcern,
    inserted_ids: BTreeMap<i64, Bson>,
    ids: Box<IdSource>,
}

impl BulkWriteRequest {
    /// Creates an empty request that draws generated object ids.
    pub fn new(ordered: bool, write_concern: WriteConcern) -> BulkWriteRequest {
        BulkWriteRequest::with_id_source(ordered, write_concern, Box::new(ObjectIdSource))
    }

    /// Creates an empty request that draws ids from the given source.
    pub fn with_id_source(
        ordered: bool,
        write_concern: WriteConcern,
        ids: Box<IdSource>,
    ) -> BulkWriteRequest {
        BulkWriteRequest {
            models: Vec::new(),
            ordered: ordered,
            write_concern: write_concern,
            inserted_ids: BTreeMap::new(),
            ids: ids,
        }
    }

    /// Appends a model to the request.
    ///
    /// An inserted document that lacks an `_id` is assigned one here, so
    /// the id is fixed before any submission happens and stays known to
    /// the caller even if the write itself is never attempted or its
    /// result is suppressed.
    pub fn push(&mut self, model: WriteModel) -> Result<()> {
        let index = self.models.len() as i64;

        let model = match model {
            WriteModel::InsertOne { mut document } => {
                let id = match document.get("_id") {
                    Some(id) => id.clone(),
                    None => {
                        let id = self.ids.generate()?;
                        document.insert("_id", id.clone());
                        id
                    }
                };
                self.inserted_ids.insert(index, id);
                WriteModel::InsertOne { document: document }
            }
            other => other,
        };

        self.models.push(model);
        Ok(())
    }

    pub fn models(&self) -> &[WriteModel] {
        &self.models
    }

    pub fn ordered(&self) -> bool {
        self.ordered
    }

    pub fn write_concern(&self) -> &WriteConcern {
        &self.write_concern
    }

    /// The id of every inserted document, keyed by its position in the
    /// request. Populated at `push` time, so it is complete whether or not
    /// the request has been executed.
    pub fn inserted_ids(&self) -> &BTreeMap<i64, Bson> {
        &self.inserted_ids
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// The server half of the bulk-write protocol.
///
/// Implementors encode one batch of models into a write command and block
/// on the server reply; under an unacknowledged concern they hand the
/// command to the transport and report an empty outcome.
pub trait WriteSink {
    fn submit(
        &mut self,
        batch: &WriteBatch,
        ordered: bool,
        write_concern: &WriteConcern,
    ) -> Result<BatchResult>;
}

/// Submits a bulk-write request through `sink` as one or more batches
/// bounded by `limits`, folding the per-batch outcomes into one result.
///
/// Item-level failures are collected into a `BulkWriteException` that
/// carries the partial result merged so far; transport and command-level
/// failures propagate as-is. Under an ordered request the first batch
/// containing an item failure halts submission of the remainder. Under an
/// unacknowledged write concern the batches are still submitted, but the
/// call yields `Ok(None)` in place of a result.
pub fn execute<S: WriteSink>(
    sink: &mut S,
    request: &BulkWriteRequest,
    limits: &ServerLimits,
) -> Result<Option<BulkWriteResult>> {
    if request.is_empty() {
        return Err(ArgumentError(
            String::from("Bulk write requires at least one operation."),
        ));
    }

    let batches = split_into_batches(request.models(), limits)?;

    let mut result = BulkWriteResult::new();
    let mut exception = BulkWriteException::new();
    let mut halted_at = None;

    for (index, batch) in batches.iter().enumerate() {
        let reply = sink.submit(batch, request.ordered(), request.write_concern())?;
        let clean = result.merge_batch(batch, &reply, request.inserted_ids(), &mut exception);

        if !clean && request.ordered() {
            halted_at = Some(index + 1);
            break;
        }
    }

    if let Some(next) = halted_at {
        for batch in &batches[next..] {
            exception.add_unprocessed_models(batch.models.to_vec());
        }
    }

    if !request.write_concern().is_acknowledged() {
        return Ok(None);
    }

    if exception.has_errors() {
        exception.result = result;
        Err(exception.into())
    } else {
        Ok(Some(result))
    }
}
