//! Errors for bulk write operations.
use std::{error, fmt};

use super::batch::WriteBatch;
use super::results::{BatchResult, BulkWriteResult};
use super::WriteModel;

/// A single failed write within a bulk operation, keyed by the position
/// of its model in the original request.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkWriteError {
    pub index: i32,
    pub code: i32,
    pub message: String,
    pub request: Option<WriteModel>,
}

/// A write-concern failure reported alongside a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteConcernError {
    pub code: i32,
    pub message: String,
}

/// Aggregate failure of a bulk write: every item-level error encountered,
/// which requests were and were not submitted, and the partial result
/// merged from the items that succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkWriteException {
    pub processed_requests: Vec<WriteModel>,
    pub unprocessed_requests: Vec<WriteModel>,
    pub write_errors: Vec<BulkWriteError>,
    pub write_concern_error: Option<WriteConcernError>,
    pub result: BulkWriteResult,
    pub message: String,
}

impl BulkWriteException {
    pub fn new() -> BulkWriteException {
        BulkWriteException {
            processed_requests: vec![],
            unprocessed_requests: vec![],
            write_errors: vec![],
            write_concern_error: None,
            result: BulkWriteResult::new(),
            message: String::new(),
        }
    }

    /// Whether any item or write-concern error has been recorded.
    pub fn has_errors(&self) -> bool {
        !self.write_errors.is_empty() || self.write_concern_error.is_some()
    }

    /// Records the errors of one batch outcome, re-keying batch-local
    /// indices to positions in the original request and attaching the
    /// failing model to each error. The batch's models are bucketed as
    /// processed either way. Returns `true` if the batch was clean.
    pub fn merge_batch_errors(&mut self, batch: &WriteBatch, reply: &BatchResult) -> bool {
        for error in &reply.write_errors {
            let request = batch.models.get(error.index as usize).cloned();
            let error = BulkWriteError {
                index: (batch.start_index + error.index as i64) as i32,
                code: error.code,
                message: error.message.clone(),
                request: request,
            };
            self.message.push_str(&format!("{}\n", error));
            self.write_errors.push(error);
        }

        if let Some(ref wc_error) = reply.write_concern_error {
            self.message.push_str(&format!("{}\n", wc_error));
            self.write_concern_error = Some(wc_error.clone());
        }

        self.processed_requests.extend(batch.models.iter().cloned());

        reply.write_errors.is_empty() && reply.write_concern_error.is_none()
    }

    /// Adds a vector of models to the vector of unprocessed models.
    pub fn add_unprocessed_models(&mut self, models: Vec<WriteModel>) {
        self.unprocessed_requests.extend(models.into_iter());
    }
}

impl error::Error for BulkWriteException {
    fn description(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BulkWriteException {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str("BulkWriteException:\n")?;

        fmt.write_str("Processed Requests:\n")?;
        for v in &self.processed_requests {
            write!(fmt, "{:?}\n", v)?;
        }

        fmt.write_str("Unprocessed Requests:\n")?;
        for v in &self.unprocessed_requests {
            write!(fmt, "{:?}\n", v)?;
        }

        if let Some(ref error) = self.write_concern_error {
            write!(fmt, "{}\n", error)?;
        }

        for v in &self.write_errors {
            write!(fmt, "{}\n", v)?;
        }

        Ok(())
    }
}

impl fmt::Display for BulkWriteError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "BulkWriteError at index {} (code {}): {}",
            self.index,
            self.code,
            self.message
        )?;

        match self.request {
            Some(ref request) => write!(fmt, " Failed to execute request {:?}.", request),
            None => fmt.write_str(" No additional error information was received."),
        }
    }
}

impl fmt::Display for WriteConcernError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "WriteConcernError (code {}): {}",
            self.code,
            self.message
        )
    }
}
