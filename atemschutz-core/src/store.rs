use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::RwLock;

/// One write inside a batch: `Some` stores bytes, `None` deletes the key.
pub type BatchOp = (String, Option<Vec<u8>>);

/// A simple key-value store for record bytes.
///
/// Stores operate on raw bytes: encoding is handled by the token store.
/// Keys are UTF-8 paths such as `assignments/Vehicle-3`.
///
/// All methods take `&self` to support stores with internal locking (e.g., RocksDB).
pub trait Store {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Retrieves the bytes associated with a key, or None if not present.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Stores bytes at the given key.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), Self::Error>;

    /// Removes a key. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), Self::Error>;

    /// Checks whether a key exists in the store.
    fn has(&self, key: &str) -> Result<bool, Self::Error> {
        Ok(self.get(key)?.is_some())
    }

    /// Returns every entry whose key starts with `prefix`, ordered by key.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, Self::Error>;

    /// Applies all operations or none of them.
    fn apply(&self, batch: Vec<BatchOp>) -> Result<(), Self::Error>;
}

impl<S: Store + ?Sized> Store for &S {
    type Error = S::Error;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), Self::Error> {
        (**self).delete(key)
    }

    fn has(&self, key: &str) -> Result<bool, Self::Error> {
        (**self).has(key)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, Self::Error> {
        (**self).scan_prefix(prefix)
    }

    fn apply(&self, batch: Vec<BatchOp>) -> Result<(), Self::Error> {
        (**self).apply(batch)
    }
}

/// An in-memory store backed by a BTreeMap.
///
/// Useful for testing and as a reference implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    type Error = Infallible;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.data.read().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        self.data
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), Self::Error> {
        self.data.write().unwrap().remove(key);
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool, Self::Error> {
        Ok(self.data.read().unwrap().contains_key(key))
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, Self::Error> {
        let data = self.data.read().unwrap();
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply(&self, batch: Vec<BatchOp>) -> Result<(), Self::Error> {
        let mut data = self.data.write().unwrap();
        for (key, value) in batch {
            match value {
                Some(value) => {
                    data.insert(key, value);
                }
                None => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}
