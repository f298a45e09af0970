//! RocksDB storage layer

use crate::config::StorageConfig;
use crate::errors::{LotteryResult, StorageError};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct LotteryStorage {
    db: Arc<DB>,
}

impl LotteryStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> LotteryResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(16 * 1024 * 1024);
        opts.set_max_write_buffer_number(2);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path.as_ref()).map_err(|e| {
            StorageError::DatabaseOpenFailed(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open an existing database for inspection. Every write through this handle fails.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> LotteryResult<Self> {
        let opts = Options::default();
        let db = DB::open_for_read_only(&opts, path.as_ref(), false).map_err(|e| {
            StorageError::DatabaseOpenFailed(format!("{} (read-only): {}", path.as_ref().display(), e))
        })?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open the configured directory, wiping it first when `clear_on_start` is set
    pub fn new_with_config(config: &StorageConfig) -> LotteryResult<Self> {
        if config.clear_on_start {
            warn!(path = %config.data_directory, "Testing mode: clearing lottery database");
            let _ = std::fs::remove_dir_all(&config.data_directory);
        } else {
            info!(path = %config.data_directory, "Preserving existing lottery data");
        }
        Self::new(&config.data_directory)
    }

    pub fn get(&self, key: &[u8]) -> LotteryResult<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()).into())
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> LotteryResult<()> {
        Ok(self.db.put(key, value)?)
    }

    pub fn delete(&self, key: &[u8]) -> LotteryResult<()> {
        Ok(self.db.delete(key)?)
    }

    /// Apply every operation in `batch` atomically
    pub fn write(&self, batch: StorageBatch) -> LotteryResult<()> {
        Ok(self.db.write(batch.batch)?)
    }

    #[cfg(test)]
    pub fn batch_write<K, V>(&self, items: &[(K, V)]) -> LotteryResult<()>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut batch = WriteBatch::default();
        for (key, value) in items {
            batch.put(key, value);
        }
        Ok(self.db.write(batch)?)
    }

    /// All entries whose key starts with `prefix`, in key order
    pub fn scan_prefix(&self, prefix: &[u8]) -> LotteryResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut rows = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }
}

/// Write batch that also knows how to drop a whole key prefix
#[derive(Default)]
pub struct StorageBatch {
    batch: WriteBatch,
}

impl StorageBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.batch.put(key, value);
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.batch.delete(key);
    }

    /// Delete every key in `[prefix, prefix + 0xff..)`
    pub fn delete_prefix(&mut self, prefix: &[u8]) {
        let mut end = prefix.to_vec();
        end.push(0xff);
        self.batch.delete_range(prefix, end.as_slice());
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let storage = LotteryStorage::new(dir.path()).unwrap();

        storage.put(b"k1", b"v1").unwrap();
        assert_eq!(storage.get(b"k1").unwrap(), Some(b"v1".to_vec()));

        storage.delete(b"k1").unwrap();
        assert_eq!(storage.get(b"k1").unwrap(), None);
    }

    #[test]
    fn test_scan_prefix_stops_at_boundary() {
        let dir = TempDir::new().unwrap();
        let storage = LotteryStorage::new(dir.path()).unwrap();

        storage
            .batch_write(&[
                (b"a:1".to_vec(), b"x".to_vec()),
                (b"b:1".to_vec(), b"y".to_vec()),
                (b"b:2".to_vec(), b"z".to_vec()),
                (b"c:1".to_vec(), b"w".to_vec()),
            ])
            .unwrap();

        let rows = storage.scan_prefix(b"b:").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, b"b:1".to_vec());
        assert_eq!(rows[1].1, b"z".to_vec());
    }

    #[test]
    fn test_batch_delete_prefix() {
        let dir = TempDir::new().unwrap();
        let storage = LotteryStorage::new(dir.path()).unwrap();
        storage
            .batch_write(&[(b"t:1".to_vec(), b"1".to_vec()), (b"t:2".to_vec(), b"2".to_vec())])
            .unwrap();

        let mut batch = StorageBatch::new();
        batch.delete_prefix(b"t:");
        batch.put(b"t:3", b"3");
        storage.write(batch).unwrap();

        let rows = storage.scan_prefix(b"t:").unwrap();
        assert_eq!(rows, vec![(b"t:3".to_vec(), b"3".to_vec())]);
    }

    #[test]
    fn test_read_only_handle_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let storage = LotteryStorage::new(dir.path()).unwrap();
        storage.put(b"k1", b"v1").unwrap();
        storage.db.flush().unwrap();

        let reader = LotteryStorage::open_read_only(dir.path()).unwrap();
        assert_eq!(reader.get(b"k1").unwrap(), Some(b"v1".to_vec()));

        let mut batch = StorageBatch::new();
        batch.put(b"k2", b"v2");
        assert!(reader.write(batch).is_err());
        assert!(reader.put(b"k3", b"v3").is_err());
        assert_eq!(storage.get(b"k2").unwrap(), None);
    }

    #[test]
    fn test_clear_on_start() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            enabled: true,
            data_directory: dir.path().join("db").to_string_lossy().to_string(),
            clear_on_start: false,
        };

        {
            let storage = LotteryStorage::new_with_config(&config).unwrap();
            storage.put(b"keep", b"1").unwrap();
        }
        {
            let storage = LotteryStorage::new_with_config(&config).unwrap();
            assert!(storage.get(b"keep").unwrap().is_some());
        }

        let wiping = StorageConfig {
            clear_on_start: true,
            ..config
        };
        let storage = LotteryStorage::new_with_config(&wiping).unwrap();
        assert!(storage.get(b"keep").unwrap().is_none());
    }
}
