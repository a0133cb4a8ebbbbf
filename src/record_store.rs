use crate::market_records::TransactionRecord;

/// Ordered, append-only persistence target for accepted records.
pub trait RecordStore {
    /// All persisted records, oldest first.
    fn read_all(&self) -> Result<Vec<TransactionRecord>, String>;

    /// Writes `records` as one block after the last existing row and returns
    /// the number of rows written.
    fn append(&mut self, records: &[TransactionRecord]) -> Result<usize, String>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    rows: Vec<TransactionRecord>,
    append_calls: usize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[TransactionRecord] {
        &self.rows
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls
    }
}

impl RecordStore for MemoryRecordStore {
    fn read_all(&self) -> Result<Vec<TransactionRecord>, String> {
        Ok(self.rows.clone())
    }

    fn append(&mut self, records: &[TransactionRecord]) -> Result<usize, String> {
        self.append_calls += 1;
        self.rows.extend_from_slice(records);
        Ok(records.len())
    }
}

impl<S: RecordStore + ?Sized> RecordStore for Box<S> {
    fn read_all(&self) -> Result<Vec<TransactionRecord>, String> {
        (**self).read_all()
    }

    fn append(&mut self, records: &[TransactionRecord]) -> Result<usize, String> {
        (**self).append(records)
    }
}
