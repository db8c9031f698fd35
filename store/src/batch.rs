//! Heterogeneous write/read batches (§4.3): a `write(batch)` applies every
//! put and delete atomically in one LMDB transaction; a `read(batch)`
//! resolves every requested key against a single reused snapshot.

#[derive(Debug, Clone)]
pub enum WriteOp {
    Put {
        column: &'static str,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        column: &'static str,
        key: Vec<u8>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub(crate) ops: Vec<WriteOp>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: &'static str, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Put {
            column,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, column: &'static str, key: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Delete {
            column,
            key: key.into(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Rough byte estimate used to drive the auto-resize heuristic; not
    /// meant to be exact (LMDB's own page overhead isn't modeled).
    #[must_use]
    pub(crate) fn estimated_bytes(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                WriteOp::Put { key, value, .. } => key.len() + value.len(),
                WriteOp::Delete { key, .. } => key.len(),
            })
            .sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadBatch {
    pub(crate) keys: Vec<(&'static str, Vec<u8>)>,
}

impl ReadBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, column: &'static str, key: impl Into<Vec<u8>>) {
        self.keys.push((column, key.into()));
    }
}

/// Result of a `read(batch)` call: `None` for keys with no entry.
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    pub(crate) values: Vec<Option<Vec<u8>>>,
}

impl ReadResult {
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.values.get(index).and_then(|v| v.as_deref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
