//! In-memory collaborators for unit tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    answer::Composer,
    assistant::Assistant,
    database::{Row, Table, TableAccessor},
    error::{CompletionError, DataError, RetrievalError},
    llm::CompletionService,
    retrieval::RetrievalAssembler,
    router::QueryRouter,
    vector_db::{validate_batch, Metadata, QueryResult, VectorStore},
};

pub fn meta(source: &str) -> Metadata {
    let mut m = Metadata::new();
    m.insert("source".to_string(), json!(source));
    m
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

/// Replies with queued answers, then with `fallback`.
#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| (*r).to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn always(reply: &str) -> Self {
        Self {
            fallback: Some(reply.to_string()),
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.replies.lock().unwrap().pop_front();
        next.or_else(|| self.fallback.clone())
            .ok_or(CompletionError::Empty)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    chunks: Mutex<Vec<(String, String, Metadata)>>,
}

impl MemoryStore {
    pub fn with_chunks(chunks: Vec<(&str, Metadata)>) -> Self {
        let chunks = chunks
            .into_iter()
            .enumerate()
            .map(|(i, (text, m))| (format!("chunk_{i}"), text.to_string(), m))
            .collect();
        Self {
            chunks: Mutex::new(chunks),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.chunks
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _, _)| id.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<(String, Metadata)> {
        self.chunks
            .lock()
            .unwrap()
            .iter()
            .find(|(i, _, _)| i == id)
            .map(|(_, doc, m)| (doc.clone(), m.clone()))
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(
        &self,
        ids: Vec<String>,
        documents: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<(), RetrievalError> {
        validate_batch(&ids, &documents, &metadatas)?;
        let mut chunks = self.chunks.lock().unwrap();
        for ((id, doc), m) in ids.into_iter().zip(documents).zip(metadatas) {
            chunks.retain(|(existing, _, _)| *existing != id);
            chunks.push((id, doc, m));
        }
        Ok(())
    }

    async fn query(
        &self,
        _query_text: &str,
        n_results: usize,
    ) -> Result<QueryResult, RetrievalError> {
        let chunks = self.chunks.lock().unwrap();
        let mut result = QueryResult::default();
        for (_, doc, m) in chunks.iter().take(n_results) {
            result.documents.push(doc.clone());
            result.metadatas.push(m.clone());
        }
        Ok(result)
    }
}

pub struct FailingStore;

#[async_trait]
impl VectorStore for FailingStore {
    async fn upsert(
        &self,
        _ids: Vec<String>,
        _documents: Vec<String>,
        _metadatas: Vec<Metadata>,
    ) -> Result<(), RetrievalError> {
        Err(RetrievalError::Store("connection refused".to_string()))
    }

    async fn query(
        &self,
        _query_text: &str,
        _n_results: usize,
    ) -> Result<QueryResult, RetrievalError> {
        Err(RetrievalError::Store("connection refused".to_string()))
    }
}

/// Analytics table held in memory. `execute_select` records the statement and
/// answers with `select_rows`, or with `select_error` as a server-side refusal.
pub struct MemoryTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub select_rows: Vec<Row>,
    pub select_error: Option<String>,
    pub statements: Mutex<Vec<String>>,
    pub fail: bool,
}

impl MemoryTable {
    pub fn new(columns: &[&str], rows: Vec<Row>) -> Self {
        Self {
            name: "employee_attrition".to_string(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
            select_rows: Vec::new(),
            select_error: None,
            statements: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    /// A small slice of the attrition data set.
    pub fn employees() -> Self {
        let rows = vec![
            row(&[
                ("employeenumber", json!(1)),
                ("department", json!("Sales")),
                ("gender", json!("Female")),
                ("jobrole", json!("Sales Executive")),
                ("monthlyincome", json!(5993)),
            ]),
            row(&[
                ("employeenumber", json!(2)),
                ("department", json!("Research & Development")),
                ("gender", json!("Male")),
                ("jobrole", json!("Research Scientist")),
                ("monthlyincome", json!(5130)),
            ]),
            row(&[
                ("employeenumber", json!(4)),
                ("department", json!("Research & Development")),
                ("gender", json!("Male")),
                ("jobrole", json!("Laboratory Technician")),
                ("monthlyincome", json!(2090)),
            ]),
            row(&[
                ("employeenumber", json!(5)),
                ("department", json!("Sales")),
                ("gender", json!("Female")),
                ("jobrole", json!("Sales Executive")),
                ("monthlyincome", json!(2909)),
            ]),
        ];
        Self::new(
            &["employeenumber", "department", "gender", "jobrole", "monthlyincome"],
            rows,
        )
    }
}

#[async_trait]
impl TableAccessor for MemoryTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn fetch_columns(&self, columns: &[String]) -> Result<Table, DataError> {
        if self.fail {
            return Err(DataError::Backend("connection refused".to_string()));
        }
        let rows = self
            .rows
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .filter_map(|c| r.get(c).map(|v| (c.clone(), v.clone())))
                    .collect()
            })
            .collect();
        Ok(Table {
            columns: columns.to_vec(),
            rows,
        })
    }

    async fn execute_select(
        &self,
        statement: &str,
        max_rows: usize,
    ) -> Result<Vec<Row>, DataError> {
        self.statements.lock().unwrap().push(statement.to_string());
        if self.fail {
            return Err(DataError::Backend("connection refused".to_string()));
        }
        if let Some(message) = &self.select_error {
            return Err(DataError::Query(message.clone()));
        }
        Ok(self.select_rows.iter().take(max_rows).cloned().collect())
    }
}

/// An assistant over the sample employees table.
pub fn assistant(completion: ScriptedCompletion, store: impl VectorStore + 'static) -> Assistant {
    let router = Arc::new(QueryRouter::default());
    let composer = Composer::new(
        Arc::new(completion),
        Arc::new(MemoryTable::employees()),
        RetrievalAssembler::new(Arc::new(store)),
        router.clone(),
        5,
        100,
    );
    Assistant::new(router, composer)
}
