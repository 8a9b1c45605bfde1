//! Results for bulk write operations.
use bson::Bson;
use std::collections::{BTreeMap, BTreeSet};

use super::batch::WriteBatch;
use super::error::{BulkWriteError, BulkWriteException, WriteConcernError};

/// Outcome of submitting one batch, as reported by the server.
///
/// Indices in `upserted_ids` and `write_errors` are batch-local; the
/// merger re-keys them against the batch's starting offset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchResult {
    pub inserted_count: i32,
    pub matched_count: i32,
    pub modified_count: i32,
    pub deleted_count: i32,
    pub upserted_ids: BTreeMap<i64, Bson>,
    pub write_errors: Vec<BulkWriteError>,
    pub write_concern_error: Option<WriteConcernError>,
}

impl BatchResult {
    pub fn new() -> BatchResult {
        Default::default()
    }
}

/// Aggregate result of a bulk write operation.
///
/// Id maps are keyed by the position of the originating model in the full
/// request, not within any batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BulkWriteResult {
    pub inserted_count: i32,
    pub inserted_ids: BTreeMap<i64, Bson>,
    pub matched_count: i32,
    pub modified_count: i32,
    pub deleted_count: i32,
    pub upserted_count: i32,
    pub upserted_ids: BTreeMap<i64, Bson>,
}

impl BulkWriteResult {
    pub fn new() -> BulkWriteResult {
        Default::default()
    }

    /// Folds one batch outcome into this result, recording any errors it
    /// carried into `exception`.
    ///
    /// Counts are summed; batch-local indices are re-keyed by the batch's
    /// starting offset. Insert ids are taken from `request_ids` (fixed
    /// when the request was built) for every insert model in the batch
    /// that did not fail. Returns `false` if the batch carried an item or
    /// write-concern error.
    pub fn merge_batch(
        &mut self,
        batch: &WriteBatch,
        reply: &BatchResult,
        request_ids: &BTreeMap<i64, Bson>,
        exception: &mut BulkWriteException,
    ) -> bool {
        self.inserted_count += reply.inserted_count;
        self.matched_count += reply.matched_count;
        self.modified_count += reply.modified_count;
        self.deleted_count += reply.deleted_count;

        for (local, id) in &reply.upserted_ids {
            self.upserted_count += 1;
            self.upserted_ids.insert(batch.start_index + local, id.clone());
        }

        let failed: BTreeSet<i64> =
            reply.write_errors.iter().map(|error| error.index as i64).collect();

        for (local, model) in batch.models.iter().enumerate() {
            if !model.is_insert() || failed.contains(&(local as i64)) {
                continue;
            }
            let index = batch.start_index + local as i64;
            if let Some(id) = request_ids.get(&index) {
                self.inserted_ids.insert(index, id.clone());
            }
        }

        exception.merge_batch_errors(batch, reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Bson;
    use bulk::WriteModel;

    fn insert_batch(start_index: i64, count: i32) -> WriteBatch {
        WriteBatch {
            start_index: start_index,
            models: (0..count)
                .map(|x| WriteModel::InsertOne { document: doc! { "x": x } })
                .collect(),
        }
    }

    #[test]
    fn counts_are_summed_across_batches() {
        let mut result = BulkWriteResult::new();
        let mut exception = BulkWriteException::new();
        let ids = BTreeMap::new();

        let first = BatchResult { deleted_count: 2, ..BatchResult::new() };
        let second = BatchResult {
            matched_count: 3,
            modified_count: 1,
            ..BatchResult::new()
        };

        let batch = WriteBatch { start_index: 0, models: vec![] };
        assert!(result.merge_batch(&batch, &first, &ids, &mut exception));
        assert!(result.merge_batch(&batch, &second, &ids, &mut exception));

        assert_eq!(result.deleted_count, 2);
        assert_eq!(result.matched_count, 3);
        assert_eq!(result.modified_count, 1);
        assert!(!exception.has_errors());
    }

    #[test]
    fn failed_inserts_are_dropped_from_the_id_map() {
        let mut result = BulkWriteResult::new();
        let mut exception = BulkWriteException::new();

        let mut ids = BTreeMap::new();
        ids.insert(4, Bson::I32(10));
        ids.insert(5, Bson::I32(11));

        let reply = BatchResult {
            inserted_count: 1,
            write_errors: vec![BulkWriteError {
                index: 1,
                code: 11000,
                message: String::from("duplicate"),
                request: None,
            }],
            ..BatchResult::new()
        };

        let clean = result.merge_batch(&insert_batch(4, 2), &reply, &ids, &mut exception);

        assert!(!clean);
        assert_eq!(result.inserted_ids.len(), 1);
        assert_eq!(result.inserted_ids.get(&4), Some(&Bson::I32(10)));

        // The recorded error is re-keyed to the request position and
        // carries the failing model.
        assert_eq!(exception.write_errors.len(), 1);
        assert_eq!(exception.write_errors[0].index, 5);
        assert!(exception.write_errors[0].request.is_some());
    }
}
