use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    database::{label, Row, TableAccessor},
    vector_db::{validate_batch, Metadata, VectorStore},
};

const HANDBOOK_ID_PREFIX: &str = "employee_handbook";

/// One line of a pre-split chunk file.
#[derive(Debug, Deserialize)]
struct ChunkLine {
    text: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

/// Documents ready to be written to the vector store.
#[derive(Debug, Default)]
struct Batch {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<Metadata>,
}

impl Batch {
    fn push(&mut self, id: String, document: String, metadata: Metadata) {
        self.ids.push(id);
        self.documents.push(document);
        self.metadatas.push(metadata);
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

pub struct Ingestor {
    store: Arc<dyn VectorStore>,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(store: Arc<dyn VectorStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Summarises every row of the table into one document per row.
    pub async fn ingest_rows(
        &self,
        table: &dyn TableAccessor,
        key_column: &str,
        summary_columns: &[String],
    ) -> Result<usize> {
        let mut columns = vec![key_column.to_string()];
        columns.extend(summary_columns.iter().filter(|c| *c != key_column).cloned());
        let data = table
            .fetch_columns(&columns)
            .await
            .context("failed to read table rows")?;
        info!(
            "Read {} rows from {} for ingestion",
            data.rows.len(),
            table.table_name()
        );

        let mut batch = Batch::default();
        for row in &data.rows {
            let Some(key) = row.get(key_column).filter(|v| !v.is_null()) else {
                warn!("Skipping row without {key_column}");
                continue;
            };
            let mut metadata = Metadata::new();
            metadata.insert("source".to_string(), json!("postgresql"));
            metadata.insert("table".to_string(), json!(table.table_name()));
            metadata.insert("row_key".to_string(), key.clone());
            batch.push(
                format!("{}_{}", table.table_name(), label(key)),
                row_summary(key, row, summary_columns),
                metadata,
            );
        }
        self.write(batch).await
    }

    /// Loads pre-split chunks from a JSON Lines file.
    pub async fn ingest_chunks(&self, path: &Path) -> Result<usize> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let batch = parse_chunks(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        info!("Read {} chunks from {}", batch.len(), path.display());
        self.write(batch).await
    }

    async fn write(&self, batch: Batch) -> Result<usize> {
        validate_batch(&batch.ids, &batch.documents, &batch.metadatas)?;
        let total = batch.len();

        let mut ids = batch.ids.into_iter();
        let mut documents = batch.documents.into_iter();
        let mut metadatas = batch.metadatas.into_iter();
        let mut written = 0;
        while written < total {
            let n = self.batch_size.min(total - written);
            self.store
                .upsert(
                    ids.by_ref().take(n).collect(),
                    documents.by_ref().take(n).collect(),
                    metadatas.by_ref().take(n).collect(),
                )
                .await
                .with_context(|| format!("failed to upsert documents {written}..{}", written + n))?;
            written += n;
            info!("Upserted {written}/{total} documents");
        }
        Ok(total)
    }
}

fn row_summary(key: &Value, row: &Row, columns: &[String]) -> String {
    let fields: Vec<String> = columns
        .iter()
        .filter_map(|c| row.get(c).map(|v| format!("{c}: {}", label(v))))
        .collect();
    format!("Employee {}: {}", label(key), fields.join(", "))
}

fn parse_chunks(text: &str) -> Result<Batch> {
    let mut batch = Batch::default();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let chunk: ChunkLine = serde_json::from_str(line)
            .with_context(|| format!("line {}: invalid chunk", line_no + 1))?;
        let n = batch.len();
        let id = chunk.id.unwrap_or_else(|| format!("{HANDBOOK_ID_PREFIX}_{n}"));
        let mut metadata = chunk.metadata;
        metadata.entry("source").or_insert_with(|| json!("pdf"));
        batch.push(id, chunk.text, metadata);
    }
    Ok(batch)
}
