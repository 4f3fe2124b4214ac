//! Durable storage for raw/derived files and pipeline status documents.
//!
//! Layout: `<root>/<index>/<document_id>/<file-name>`, with the pipeline's
//! status document stored alongside as `__pipeline_status.json`. Every write
//! goes through a temp-file-then-rename so a crash mid-write never leaves a
//! half-written file visible to a reader.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use memcore::DataPipeline;
use uuid::Uuid;

use crate::error::{DbError, Result};

const STATUS_FILE_NAME: &str = "__pipeline_status.json";

#[async_trait]
pub trait ContentStore: Send + Sync {
  async fn write_pipeline_status(&self, pipeline: &DataPipeline) -> Result<()>;
  async fn read_pipeline_status(&self, index: &str, document_id: &str) -> Result<Option<DataPipeline>>;
  async fn write_file(&self, index: &str, document_id: &str, name: &str, content: &[u8]) -> Result<()>;
  async fn read_file(&self, index: &str, document_id: &str, name: &str) -> Result<Vec<u8>>;
  async fn delete_document(&self, index: &str, document_id: &str) -> Result<()>;
  async fn delete_index(&self, index: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FsContentStore {
  root: PathBuf,
}

impl FsContentStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn document_dir(&self, index: &str, document_id: &str) -> PathBuf {
    self.root.join(index).join(document_id)
  }

  fn index_dir(&self, index: &str) -> PathBuf {
    self.root.join(index)
  }

  /// Write `content` to `path` via a sibling temp file, then an atomic
  /// rename, so partial writes never become visible.
  async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().expect("path always has a parent under root");
    tokio::fs::create_dir_all(dir)
      .await
      .map_err(|source| DbError::Io { path: dir.to_path_buf(), source })?;

    let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
    tokio::fs::write(&tmp_path, content)
      .await
      .map_err(|source| DbError::Io { path: tmp_path.clone(), source })?;
    tokio::fs::rename(&tmp_path, path)
      .await
      .map_err(|source| DbError::Io { path: path.to_path_buf(), source })?;
    Ok(())
  }
}

#[async_trait]
impl ContentStore for FsContentStore {
  async fn write_pipeline_status(&self, pipeline: &DataPipeline) -> Result<()> {
    let path = self.document_dir(&pipeline.index, &pipeline.document_id).join(STATUS_FILE_NAME);
    let body = serde_json::to_vec_pretty(pipeline)?;
    Self::write_atomic(&path, &body).await
  }

  async fn read_pipeline_status(&self, index: &str, document_id: &str) -> Result<Option<DataPipeline>> {
    let path = self.document_dir(index, document_id).join(STATUS_FILE_NAME);
    match tokio::fs::read(&path).await {
      Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(source) => Err(DbError::Io { path, source }),
    }
  }

  async fn write_file(&self, index: &str, document_id: &str, name: &str, content: &[u8]) -> Result<()> {
    let path = self.document_dir(index, document_id).join(name);
    Self::write_atomic(&path, content).await
  }

  async fn read_file(&self, index: &str, document_id: &str, name: &str) -> Result<Vec<u8>> {
    let path = self.document_dir(index, document_id).join(name);
    tokio::fs::read(&path)
      .await
      .map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => DbError::NotFound { item_type: "file", id: name.to_string() },
        _ => DbError::Io { path, source },
      })
  }

  async fn delete_document(&self, index: &str, document_id: &str) -> Result<()> {
    let dir = self.document_dir(index, document_id);
    match tokio::fs::remove_dir_all(&dir).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(DbError::Io { path: dir, source }),
    }
  }

  async fn delete_index(&self, index: &str) -> Result<()> {
    let dir = self.index_dir(index);
    match tokio::fs::remove_dir_all(&dir).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(DbError::Io { path: dir, source }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use memcore::Tags;

  fn store() -> (tempfile::TempDir, FsContentStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FsContentStore::new(dir.path());
    (dir, store)
  }

  #[tokio::test]
  async fn round_trips_pipeline_status() {
    let (_dir, store) = store();
    let pipeline = DataPipeline::new("idx".into(), "doc1".into(), vec!["extract".into()], Tags::new(), vec![]).unwrap();
    store.write_pipeline_status(&pipeline).await.unwrap();

    let read = store.read_pipeline_status("idx", "doc1").await.unwrap().unwrap();
    assert_eq!(read.document_id, "doc1");
    assert_eq!(read.execution_id, pipeline.execution_id);
  }

  #[tokio::test]
  async fn missing_status_is_none() {
    let (_dir, store) = store();
    assert!(store.read_pipeline_status("idx", "missing").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn writes_and_reads_files() {
    let (_dir, store) = store();
    store.write_file("idx", "doc1", "note.txt", b"hello").await.unwrap();
    let content = store.read_file("idx", "doc1", "note.txt").await.unwrap();
    assert_eq!(content, b"hello");
  }

  #[tokio::test]
  async fn delete_document_removes_its_directory_only() {
    let (_dir, store) = store();
    store.write_file("idx", "doc1", "a.txt", b"a").await.unwrap();
    store.write_file("idx", "doc2", "b.txt", b"b").await.unwrap();

    store.delete_document("idx", "doc1").await.unwrap();

    assert!(store.read_file("idx", "doc1", "a.txt").await.is_err());
    assert_eq!(store.read_file("idx", "doc2", "b.txt").await.unwrap(), b"b");
  }

  #[tokio::test]
  async fn delete_index_removes_every_document() {
    let (_dir, store) = store();
    store.write_file("idx", "doc1", "a.txt", b"a").await.unwrap();
    store.delete_index("idx").await.unwrap();
    assert!(store.read_file("idx", "doc1", "a.txt").await.is_err());
  }
}
