//! LanceDB-backed storage for `MemoryRecord`s: one table per index, cosine
//! similarity search, and tag filtering applied in-memory since tags are a
//! schemaless multi-map rather than fixed SQL columns.

use std::sync::Arc;

use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
  DistanceType,
  query::{ExecutableQuery, QueryBase},
};
use memcore::{MemoryRecord, Tags};
use tracing::{debug, trace};

use crate::error::{DbError, Result};

fn records_schema(dimensions: usize) -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new(
      "vector",
      DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimensions as i32),
      false,
    ),
    Field::new("tags_json", DataType::Utf8, false),
    Field::new("payload_json", DataType::Utf8, false),
  ]))
}

fn record_to_batch(record: &MemoryRecord, dimensions: usize) -> Result<RecordBatch> {
  let id = StringArray::from(vec![record.id.clone()]);
  let mut vector = record.vector.clone();
  vector.resize(dimensions, 0.0);
  let values = Float32Array::from(vector);
  let field = Arc::new(Field::new("item", DataType::Float32, true));
  let vector_list = FixedSizeListArray::try_new(field, dimensions as i32, Arc::new(values), None)?;
  let tags_json = StringArray::from(vec![serde_json::to_string(&record.tags)?]);
  let payload_json = StringArray::from(vec![serde_json::to_string(&record.payload)?]);

  Ok(RecordBatch::try_new(
    records_schema(dimensions),
    vec![Arc::new(id), Arc::new(vector_list), Arc::new(tags_json), Arc::new(payload_json)],
  )?)
}

fn batch_to_record(batch: &RecordBatch, row: usize, dimensions: usize) -> Result<MemoryRecord> {
  let id = batch
    .column_by_name("id")
    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
    .map(|a| a.value(row).to_string())
    .ok_or_else(|| DbError::NotFound { item_type: "column", id: "id".to_string() })?;

  let tags_json = batch
    .column_by_name("tags_json")
    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
    .map(|a| a.value(row).to_string())
    .unwrap_or_else(|| "{}".to_string());
  let tags: Tags = serde_json::from_str(&tags_json)?;

  let payload_json = batch
    .column_by_name("payload_json")
    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
    .map(|a| a.value(row).to_string())
    .unwrap_or_else(|| "{}".to_string());
  let payload = serde_json::from_str(&payload_json)?;

  let vector = batch
    .column_by_name("vector")
    .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
    .map(|arr| {
      let values = arr.value(row);
      let floats = values.as_any().downcast_ref::<Float32Array>().expect("vector column is Float32");
      (0..dimensions).map(|i| floats.value(i)).collect()
    })
    .unwrap_or_default();

  Ok(MemoryRecord { id, vector, tags, payload })
}

/// A scored hit from `VectorStore::search`.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
  pub record: MemoryRecord,
  pub relevance: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
  async fn ensure_index(&self, index: &str) -> Result<()>;
  async fn list_indexes(&self) -> Result<Vec<String>>;
  async fn delete_index(&self, index: &str) -> Result<()>;
  async fn upsert(&self, index: &str, records: &[MemoryRecord]) -> Result<()>;
  async fn delete_by_document(&self, index: &str, document_id: &str) -> Result<()>;
  async fn search(
    &self,
    index: &str,
    query_vector: &[f32],
    limit: usize,
    filters: &[(String, String)],
    min_relevance: f32,
  ) -> Result<Vec<ScoredRecord>>;
}

pub struct LanceVectorStore {
  connection: lancedb::Connection,
  dimensions: usize,
}

impl LanceVectorStore {
  pub async fn open(path: impl AsRef<std::path::Path>, dimensions: usize) -> Result<Self> {
    let connection = lancedb::connect(&path.as_ref().to_string_lossy()).execute().await?;
    Ok(Self { connection, dimensions })
  }

  async fn table(&self, index: &str) -> Result<lancedb::Table> {
    match self.connection.open_table(index).execute().await {
      Ok(table) => Ok(table),
      Err(lancedb::Error::TableNotFound { .. }) => self.create_table(index).await,
      Err(e) => Err(e.into()),
    }
  }

  async fn create_table(&self, index: &str) -> Result<lancedb::Table> {
    debug!(index, "creating lancedb table for index");
    let schema = records_schema(self.dimensions);
    let empty = RecordBatchIterator::new(Vec::<std::result::Result<RecordBatch, arrow_schema::ArrowError>>::new(), schema.clone());
    Ok(self.connection.create_table(index, Box::new(empty)).execute().await?)
  }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
  async fn ensure_index(&self, index: &str) -> Result<()> {
    self.table(index).await.map(|_| ())
  }

  async fn list_indexes(&self) -> Result<Vec<String>> {
    Ok(self.connection.table_names().execute().await?)
  }

  async fn delete_index(&self, index: &str) -> Result<()> {
    match self.connection.drop_table(index).await {
      Ok(()) => Ok(()),
      Err(lancedb::Error::TableNotFound { .. }) => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  async fn upsert(&self, index: &str, records: &[MemoryRecord]) -> Result<()> {
    if records.is_empty() {
      return Ok(());
    }
    trace!(index, count = records.len(), "upserting memory records");
    let table = self.table(index).await?;

    let ids = records.iter().map(|r| format!("'{}'", r.id.replace('\'', "''"))).collect::<Vec<_>>().join(", ");
    let _ = table.delete(&format!("id IN ({ids})")).await;

    let batches = records
      .iter()
      .map(|r| record_to_batch(r, self.dimensions))
      .collect::<Result<Vec<_>>>()?;
    let iter = RecordBatchIterator::new(batches.into_iter().map(Ok), records_schema(self.dimensions));
    table.add(Box::new(iter)).execute().await?;
    Ok(())
  }

  async fn delete_by_document(&self, index: &str, document_id: &str) -> Result<()> {
    let table = self.table(index).await?;
    let prefix = format!("d={}//", document_id.replace('\'', "''"));
    table.delete(&format!("id LIKE '{prefix}%'")).await?;
    Ok(())
  }

  async fn search(
    &self,
    index: &str,
    query_vector: &[f32],
    limit: usize,
    filters: &[(String, String)],
    min_relevance: f32,
  ) -> Result<Vec<ScoredRecord>> {
    let table = self.table(index).await?;

    // Over-fetch, since tag filtering happens in-memory after the ANN search.
    let fetch_limit = (limit * 4).max(limit).max(16);
    let results: Vec<RecordBatch> = table
      .vector_search(query_vector.to_vec())?
      .distance_type(DistanceType::Cosine)
      .limit(fetch_limit)
      .execute()
      .await?
      .try_collect()
      .await?;

    let mut hits = Vec::new();
    for batch in &results {
      let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
      for row in 0..batch.num_rows() {
        let record = batch_to_record(batch, row, self.dimensions)?;
        if !record.tags.matches_filters(filters) {
          continue;
        }
        let distance = distances.map(|d| d.value(row)).unwrap_or(0.0);
        let relevance = (1.0 - distance).clamp(0.0, 1.0);
        if relevance < min_relevance {
          continue;
        }
        hits.push(ScoredRecord { record, relevance });
      }
    }

    hits.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);
    Ok(hits)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use memcore::Tags;

  async fn store(dimensions: usize) -> (tempfile::TempDir, LanceVectorStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = LanceVectorStore::open(dir.path().join("db.lance"), dimensions).await.unwrap();
    (dir, store)
  }

  fn record(id: &str, vector: Vec<f32>) -> MemoryRecord {
    MemoryRecord { id: id.to_string(), vector, tags: Tags::new(), payload: serde_json::Map::new() }
  }

  #[tokio::test]
  async fn round_trips_through_search() {
    let (_dir, store) = store(4).await;
    store.ensure_index("idx").await.unwrap();
    store
      .upsert("idx", &[record("d=doc1//p=0", vec![1.0, 0.0, 0.0, 0.0])])
      .await
      .unwrap();

    let hits = store.search("idx", &[1.0, 0.0, 0.0, 0.0], 5, &[], 0.0).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, "d=doc1//p=0");
    assert!(hits[0].relevance > 0.9);
  }

  #[tokio::test]
  async fn delete_by_document_removes_only_its_partitions() {
    let (_dir, store) = store(4).await;
    store.ensure_index("idx").await.unwrap();
    store
      .upsert(
        "idx",
        &[record("d=doc1//p=0", vec![1.0, 0.0, 0.0, 0.0]), record("d=doc2//p=0", vec![0.0, 1.0, 0.0, 0.0])],
      )
      .await
      .unwrap();

    store.delete_by_document("idx", "doc1").await.unwrap();

    let hits = store.search("idx", &[0.0, 1.0, 0.0, 0.0], 5, &[], 0.0).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, "d=doc2//p=0");
  }

  #[tokio::test]
  async fn list_and_delete_index() {
    let (_dir, store) = store(4).await;
    store.ensure_index("idx-a").await.unwrap();
    store.ensure_index("idx-b").await.unwrap();

    let mut indexes = store.list_indexes().await.unwrap();
    indexes.sort();
    assert_eq!(indexes, vec!["idx-a".to_string(), "idx-b".to_string()]);

    store.delete_index("idx-a").await.unwrap();
    let indexes = store.list_indexes().await.unwrap();
    assert_eq!(indexes, vec!["idx-b".to_string()]);
  }
}
