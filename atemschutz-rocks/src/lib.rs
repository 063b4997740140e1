//! RocksDB-backed store for Atemschutz.

use std::path::Path;

use atemschutz_core::{BatchOp, Store};
use rocksdb::{DB, Direction, IteratorMode, Options, WriteBatch};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RocksError {
    #[error("RocksDB error: {0}")]
    Db(#[from] rocksdb::Error),
    #[error("non UTF-8 key in store: {0:?}")]
    InvalidKey(Vec<u8>),
}

/// A persistent store backed by RocksDB.
///
/// Batches are written through a single `WriteBatch`, so a mutation touching
/// several record keys lands all at once or not at all.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Opens a RocksDB store at the given path.
    ///
    /// Creates the database if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RocksError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }
}

impl Store for RocksStore {
    type Error = RocksError;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.db.get(key.as_bytes())?)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        self.db.put(key.as_bytes(), value)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), Self::Error> {
        self.db.delete(key.as_bytes())?;
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool, Self::Error> {
        Ok(self.db.get_pinned(key.as_bytes())?.is_some())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, Self::Error> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8(key.into_vec())
                .map_err(|e| RocksError::InvalidKey(e.into_bytes()))?;
            out.push((key, value.into_vec()));
        }
        Ok(out)
    }

    fn apply(&self, batch: Vec<BatchOp>) -> Result<(), Self::Error> {
        let mut write = WriteBatch::default();
        for (key, value) in batch {
            match value {
                Some(value) => write.put(key.as_bytes(), value),
                None => write.delete(key.as_bytes()),
            }
        }
        self.db.write(write)?;
        Ok(())
    }
}
