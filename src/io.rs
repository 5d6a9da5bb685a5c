use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{create_dir_all, metadata, rename, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

pub async fn prepare_io(dirs: &[&Path]) -> anyhow::Result<()> {
    for dir in dirs {
        create_dir_all(dir).await?;
        log::debug!("Prepared directory {}", dir.display());
    }
    Ok(())
}

/// Reads a whole file. A missing file is `None`, every other failure is an error.
pub async fn read_io_file(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let mut bytes = Vec::new();
    BufReader::new(file).read_to_end(&mut bytes).await?;
    Ok(Some(bytes))
}

/// Replaces the file at `path` with `bytes`. The content lands in a sibling
/// temp file first and is renamed over the target, so readers never observe a
/// half written snapshot.
pub async fn write_io_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }
    let staging = staging_path(path);
    let mut file = File::create(&staging).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    rename(&staging, path).await
}

pub async fn file_exists(path: &Path) -> bool {
    metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let read = read_io_file(&dir.path().join("absent.csv")).await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn write_replaces_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("table.csv");
        write_io_file(&path, b"first").await.unwrap();
        write_io_file(&path, b"second").await.unwrap();

        assert_eq!(read_io_file(&path).await.unwrap().unwrap(), b"second");
        assert!(!file_exists(&staging_path(&path)).await);
        assert!(file_exists(&path).await);
    }
}
