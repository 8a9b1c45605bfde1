//! Partitioning of write models into server-sized batches.
use super::{ServerLimits, WriteModel};
use Error::ArgumentError;
use Result;

/// A contiguous run of write models submitted to the server as one
/// command. `start_index` is the position of the batch's first model in
/// the original request.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    pub start_index: i64,
    pub models: Vec<WriteModel>,
}

impl WriteBatch {
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Splits models into contiguous batches, each within the server's item
/// count and cumulative size limits.
///
/// A batch boundary never splits a model. A model whose payload alone
/// exceeds the single-document limit fails the whole request with
/// `ArgumentError` before anything is submitted.
pub fn split_into_batches(
    models: &[WriteModel],
    limits: &ServerLimits,
) -> Result<Vec<WriteBatch>> {
    let mut sizes = Vec::with_capacity(models.len());
    for model in models {
        let len = model.encoded_len()?;
        if len > limits.max_bson_object_size {
            return Err(ArgumentError(format!(
                "Write operation of {} bytes exceeds the maximum document size of {} bytes.",
                len,
                limits.max_bson_object_size
            )));
        }
        sizes.push(len);
    }

    let mut batches = Vec::new();
    let mut current = WriteBatch { start_index: 0, models: Vec::new() };
    let mut current_bytes = 0;

    for (index, model) in models.iter().enumerate() {
        let full = !current.models.is_empty() &&
            (current.models.len() >= limits.max_write_batch_size ||
             current_bytes + sizes[index] > limits.max_message_size_bytes);

        if full {
            let start_index = index as i64;
            batches.push(current);
            current = WriteBatch { start_index: start_index, models: Vec::new() };
            current_bytes = 0;
        }

        current_bytes += sizes[index];
        current.models.push(model.clone());
    }

    if !current.models.is_empty() {
        batches.push(current);
    }

    Ok(batches)
}
