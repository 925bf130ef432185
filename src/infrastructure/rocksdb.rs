use super::record_store::RecordStore;
use super::records::{KvBackend, RowWrite, Table};
use crate::error::{PlatformError, Result};
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;

/// A persistent row store implementation using RocksDB.
///
/// Every [`Table`] lives in its own Column Family. A unit of work is
/// committed through a single `WriteBatch`, so a procedure's rows land
/// atomically or not at all.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbBackend {
    db: Arc<DB>,
}

impl RocksDbBackend {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that one column family exists per table.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = Table::ALL
            .iter()
            .map(|table| ColumnFamilyDescriptor::new(table.name(), Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, table: Table) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(table.name()).ok_or_else(|| {
            PlatformError::InternalError(Box::new(std::io::Error::other(format!(
                "Column family {} not found",
                table.name()
            ))))
        })
    }
}

impl KvBackend for RocksDbBackend {
    fn read(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(table)?;
        Ok(self.db.get_cf(cf, key.as_bytes())?)
    }

    fn scan(&self, table: Table) -> Result<Vec<(String, Vec<u8>)>> {
        let cf = self.cf(table)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let key = String::from_utf8(key.to_vec()).map_err(|e| {
                PlatformError::InternalError(Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Non UTF-8 key in {}: {}", table.name(), e),
                )))
            })?;
            rows.push((key, value.to_vec()));
        }
        Ok(rows)
    }

    fn commit(&self, writes: Vec<RowWrite>) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for write in &writes {
            batch.put_cf(self.cf(write.table)?, write.key.as_bytes(), &write.value);
        }
        self.db.write(batch)?;
        Ok(())
    }
}

/// The platform database persisted on disk.
pub type RocksDbDatabase = RecordStore<RocksDbBackend>;

impl RocksDbDatabase {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::with_backend(RocksDbBackend::open(path)?))
    }
}
