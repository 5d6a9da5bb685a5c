//! Whole-collection persistence.
//!
//! A [`SnapshotStore`] always loads and saves the complete collection. Callers
//! own the locking; the stores in this module only know how to turn a file into
//! rows and rows back into a file.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::io::{read_io_file, write_io_file};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait SnapshotStore<T>: Send + Sync {
    /// Loads every row. A backing file that does not exist yet is an empty collection.
    async fn load(&self) -> Result<Vec<T>, StoreError>;

    /// Replaces the persisted collection with `rows`.
    async fn save(&self, rows: &[T]) -> Result<(), StoreError>;
}

/// Rows as a CSV sheet with a header line.
#[derive(Debug, Clone)]
pub struct CsvTable {
    path: PathBuf,
}

impl CsvTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl<T> SnapshotStore<T> for CsvTable
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self) -> Result<Vec<T>, StoreError> {
        let bytes = match read_io_file(&self.path).await? {
            Some(bytes) => bytes,
            None => return Ok(Vec::new()),
        };
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let rows = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
        Ok(rows)
    }

    async fn save(&self, rows: &[T]) -> Result<(), StoreError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in rows {
            writer.serialize(row)?;
        }
        let bytes = writer.into_inner().map_err(|err| err.into_error())?;
        write_io_file(&self.path, &bytes).await?;
        Ok(())
    }
}

/// Rows as a pretty printed JSON array.
#[derive(Debug, Clone)]
pub struct JsonArray {
    path: PathBuf,
}

impl JsonArray {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl<T> SnapshotStore<T> for JsonArray
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self) -> Result<Vec<T>, StoreError> {
        match read_io_file(&self.path).await? {
            Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
                Ok(serde_json::from_slice(&bytes)?)
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn save(&self, rows: &[T]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(rows)?;
        write_io_file(&self.path, &bytes).await?;
        Ok(())
    }
}
