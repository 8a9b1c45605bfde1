use bson::{self, Bson};

/// Describes the level of write acknowledgment requested from the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WriteConcern {
    pub w: i32,          // Write replication
    pub w_timeout: i32,  // Used in conjunction with 'w'. Propagation timeout in ms.
    pub j: bool,         // If true, will block until write operations have been committed to journal.
    pub fsync: bool,     // If true and server is not journaling, blocks until server has synced all data files to disk.
}

impl WriteConcern {
    pub fn new() -> WriteConcern {
        WriteConcern {
            w: 1,
            w_timeout: 0,
            j: false,
            fsync: false,
        }
    }

    /// A fire-and-forget concern: the server sends no reply for the write.
    pub fn unacknowledged() -> WriteConcern {
        WriteConcern { w: 0, ..WriteConcern::new() }
    }

    /// Whether the caller will receive a populated result for writes issued
    /// under this concern. Writes with `w: 0` and no journaling or sync
    /// requirement are unacknowledged, and their results are suppressed.
    pub fn is_acknowledged(&self) -> bool {
        self.w != 0 || self.j || self.fsync
    }

    pub fn to_bson(&self) -> bson::Document {
        let mut bson = bson::Document::new();
        bson.insert("w".to_owned(), Bson::I32(self.w));
        bson.insert("wtimeout".to_owned(), Bson::I32(self.w_timeout));
        bson.insert("j".to_owned(), Bson::Boolean(self.j));
        bson
    }
}

impl Default for WriteConcern {
    fn default() -> WriteConcern {
        WriteConcern::new()
    }
}

#[cfg(test)]
mod tests {
    use super::WriteConcern;

    #[test]
    fn default_concern_is_acknowledged() {
        assert!(WriteConcern::new().is_acknowledged());
    }

    #[test]
    fn w_zero_is_unacknowledged() {
        assert!(!WriteConcern::unacknowledged().is_acknowledged());
    }

    #[test]
    fn journaled_w_zero_is_acknowledged() {
        let wc = WriteConcern { j: true, ..WriteConcern::unacknowledged() };
        assert!(wc.is_acknowledged());

        let wc = WriteConcern { fsync: true, ..WriteConcern::unacknowledged() };
        assert!(wc.is_acknowledged());
    }
}
