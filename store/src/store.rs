use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use parking_lot::{Mutex, RwLock};

use crate::batch::{ReadBatch, ReadResult, WriteBatch, WriteOp};
use crate::config::StoreConfig;
use crate::error::Result;

/// Embedded key/value store (§4.3): one LMDB environment, named columns
/// created on demand, atomic write batches, snapshot-reused read
/// batches, and an auto-resizing memory map.
pub struct Store {
    env: Env,
    columns: RwLock<HashMap<&'static str, Database<Bytes, Bytes>>>,
    config: StoreConfig,
    map_size: AtomicUsize,
    approx_used: AtomicUsize,
    dirty_ops: AtomicU64,
    // Serializes writers: LMDB permits exactly one write transaction at a
    // time anyway, and resizing the map requires no write txn in flight.
    writer_lock: Mutex<()>,
}

impl Store {
    pub fn open(config: StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        // SAFETY: the data directory is exclusively owned by this process
        // for the lifetime of the `Env`; no other LMDB environment is
        // opened against the same path concurrently.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(config.initial_map_size)
                .max_dbs(config.max_named_databases)
                .open(&config.data_dir)?
        };

        tracing::info!(path = %config.data_dir.display(), map_size = config.initial_map_size, "opened store");

        Ok(Self {
            env,
            columns: RwLock::new(HashMap::new()),
            map_size: AtomicUsize::new(config.initial_map_size),
            approx_used: AtomicUsize::new(0),
            dirty_ops: AtomicU64::new(0),
            writer_lock: Mutex::new(()),
            config,
        })
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    fn open_or_create_column(
        &self,
        wtxn: &mut heed::RwTxn<'_>,
        name: &'static str,
    ) -> Result<Database<Bytes, Bytes>> {
        if let Some(db) = self.columns.read().get(name) {
            return Ok(*db);
        }
        let mut columns = self.columns.write();
        if let Some(db) = columns.get(name) {
            return Ok(*db);
        }
        let db: Database<Bytes, Bytes> = self.env.create_database(wtxn, Some(name))?;
        columns.insert(name, db);
        Ok(db)
    }

    /// Applies every put/delete in `batch` atomically. On any failure the
    /// transaction is dropped without committing, leaving the database
    /// byte-identical to its pre-write state.
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let _guard = self.writer_lock.lock();
        self.maybe_resize(batch.estimated_bytes())?;

        let mut wtxn = self.env.write_txn()?;
        for op in &batch.ops {
            match op {
                WriteOp::Put { column, key, value } => {
                    let db = self.open_or_create_column(&mut wtxn, column)?;
                    db.put(&mut wtxn, key, value)?;
                }
                WriteOp::Delete { column, key } => {
                    let db = self.open_or_create_column(&mut wtxn, column)?;
                    db.delete(&mut wtxn, key)?;
                }
            }
        }
        wtxn.commit()?;

        self.approx_used
            .fetch_add(batch.estimated_bytes(), Ordering::Relaxed);
        let dirty = self.dirty_ops.fetch_add(1, Ordering::Relaxed) + 1;
        if dirty % self.config.sync_every == 0 {
            self.sync()?;
        }
        Ok(())
    }

    /// Resolves every key in `batch` against one reused read snapshot.
    pub fn read(&self, batch: ReadBatch) -> Result<ReadResult> {
        let rtxn = self.env.read_txn()?;
        let mut values = Vec::with_capacity(batch.keys.len());
        for (column, key) in &batch.keys {
            let db: Option<Database<Bytes, Bytes>> = self.env.open_database(&rtxn, Some(column))?;
            let value = match db {
                Some(db) => db.get(&rtxn, key)?.map(<[u8]>::to_vec),
                None => None,
            };
            values.push(value);
        }
        Ok(ReadResult { values })
    }

    fn maybe_resize(&self, incoming_bytes: usize) -> Result<()> {
        let map_size = self.map_size.load(Ordering::Relaxed);
        let used = self.approx_used.load(Ordering::Relaxed);
        let free = map_size.saturating_sub(used);
        if free >= self.config.resize_threshold + incoming_bytes {
            return Ok(());
        }

        let new_size = map_size + self.config.growth_step;
        tracing::warn!(old = map_size, new = new_size, "growing store memory map");
        // SAFETY: called while holding `writer_lock`, so no write
        // transaction is in flight; LMDB requires exactly this.
        unsafe {
            self.env.resize(new_size)?;
        }
        self.map_size.store(new_size, Ordering::Relaxed);
        Ok(())
    }

    /// Forces a synchronous flush to disk, irrespective of `sync_every`.
    pub fn sync(&self) -> Result<()> {
        self.env.force_sync()?;
        Ok(())
    }

    /// Flushes synchronously and drops the environment handle. Safe to
    /// call multiple times.
    pub fn shutdown(&self) -> Result<()> {
        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path());
        (Store::open(config).unwrap(), dir)
    }

    #[test]
    fn write_then_read_round_trips() {
        let (store, _dir) = open_temp();
        let mut batch = WriteBatch::new();
        batch.put("blocks", b"key1".to_vec(), b"value1".to_vec());
        store.write(batch).unwrap();

        let mut read = ReadBatch::new();
        read.get("blocks", b"key1".to_vec());
        let result = store.read(read).unwrap();
        assert_eq!(result.get(0), Some(b"value1".as_slice()));
    }

    #[test]
    fn delete_removes_key() {
        let (store, _dir) = open_temp();
        let mut batch = WriteBatch::new();
        batch.put("blocks", b"k".to_vec(), b"v".to_vec());
        store.write(batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.delete("blocks", b"k".to_vec());
        store.write(batch).unwrap();

        let mut read = ReadBatch::new();
        read.get("blocks", b"k".to_vec());
        let result = store.read(read).unwrap();
        assert_eq!(result.get(0), None);
    }

    #[test]
    fn missing_column_reads_as_absent() {
        let (store, _dir) = open_temp();
        let mut read = ReadBatch::new();
        read.get("never-written", b"k".to_vec());
        let result = store.read(read).unwrap();
        assert_eq!(result.get(0), None);
    }

    #[test]
    fn empty_write_batch_is_a_no_op() {
        let (store, _dir) = open_temp();
        store.write(WriteBatch::new()).unwrap();
    }
}
