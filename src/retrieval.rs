use std::{collections::BTreeSet, sync::Arc};

use tracing::{debug, info};

use crate::{
    error::RetrievalError,
    vector_db::{Metadata, VectorStore},
};

pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found in enterprise data.";

const PDF_LABEL: &str = "Employee Handbook (PDF)";
const POSTGRES_LABEL: &str = "Employee Attrition Database (PostgreSQL)";

/// Chunks retrieved for one query, ready to be placed in a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    /// Chunk texts in the order the store ranked them.
    pub chunks: Vec<String>,
    pub sources: BTreeSet<String>,
}

impl RetrievedContext {
    /// Newline-joined chunks followed by the `Sources:` footer.
    pub fn render(&self) -> String {
        let mut text = self.chunks.join("\n");
        if !self.sources.is_empty() {
            text.push_str("\n\nSources:");
            for label in &self.sources {
                text.push_str("\n- ");
                text.push_str(label);
            }
        }
        text
    }
}

/// Human readable labels for the `source` tags of the given chunks.
///
/// Unknown tags are ignored.
pub fn source_labels<'a>(metadatas: impl IntoIterator<Item = &'a Metadata>) -> BTreeSet<String> {
    metadatas
        .into_iter()
        .filter_map(|m| m.get("source").and_then(|s| s.as_str()))
        .filter_map(|tag| match tag {
            "pdf" => Some(PDF_LABEL),
            "postgresql" => Some(POSTGRES_LABEL),
            _ => None,
        })
        .map(str::to_string)
        .collect()
}

pub struct RetrievalAssembler {
    store: Arc<dyn VectorStore>,
}

impl RetrievalAssembler {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// `Ok(None)` when the store has nothing for the query.
    pub async fn assemble(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Option<RetrievedContext>, RetrievalError> {
        let result = self.store.query(query, k).await?;
        if result.documents.is_empty() {
            info!("No chunks found for query");
            return Ok(None);
        }
        let sources = source_labels(&result.metadatas);
        debug!(chunks = result.documents.len(), ?sources, "assembled context");
        Ok(Some(RetrievedContext {
            chunks: result.documents,
            sources,
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{meta, FailingStore, MemoryStore};

    #[tokio::test]
    async fn empty_store_yields_none() {
        let assembler = RetrievalAssembler::new(Arc::new(MemoryStore::default()));
        assert!(assembler.assemble("leave policy", 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunks_keep_store_order_and_cite_each_source_once() {
        let store = MemoryStore::with_chunks(vec![
            ("Annual leave is 25 days.", meta("pdf")),
            ("Employee 12 works in Sales.", meta("postgresql")),
            ("Sick leave needs a note.", meta("pdf")),
        ]);
        let assembler = RetrievalAssembler::new(Arc::new(store));

        let context = assembler.assemble("leave", 5).await.unwrap().unwrap();
        assert_eq!(
            context.chunks,
            vec![
                "Annual leave is 25 days.",
                "Employee 12 works in Sales.",
                "Sick leave needs a note."
            ]
        );
        assert_eq!(
            context.render(),
            "Annual leave is 25 days.\nEmployee 12 works in Sales.\nSick leave needs a note.\n\n\
             Sources:\n- Employee Attrition Database (PostgreSQL)\n- Employee Handbook (PDF)"
        );
    }

    #[tokio::test]
    async fn k_limits_the_chunks() {
        let store = MemoryStore::with_chunks(vec![("a", meta("pdf")), ("b", meta("pdf"))]);
        let assembler = RetrievalAssembler::new(Arc::new(store));
        let context = assembler.assemble("q", 1).await.unwrap().unwrap();
        assert_eq!(context.chunks, vec!["a"]);
    }

    #[tokio::test]
    async fn store_failure_is_not_no_information() {
        let assembler = RetrievalAssembler::new(Arc::new(FailingStore));
        let err = assembler.assemble("leave", 5).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Store(_)));
    }

    #[test]
    fn labels_ignore_unknown_tags_and_order() {
        let mut untagged = Metadata::new();
        untagged.insert("table".to_string(), json!("employee_attrition"));
        let forward = vec![meta("pdf"), meta("wiki"), meta("postgresql"), untagged];
        let mut backward = forward.clone();
        backward.reverse();

        let labels = source_labels(&forward);
        assert_eq!(labels.len(), 2);
        assert!(labels.contains(PDF_LABEL));
        assert!(labels.contains(POSTGRES_LABEL));
        assert_eq!(labels, source_labels(&backward));

        let doubled: Vec<Metadata> = forward.iter().chain(forward.iter()).cloned().collect();
        assert_eq!(labels, source_labels(&doubled));
    }

    #[test]
    fn render_without_sources_has_no_footer() {
        let context = RetrievedContext {
            chunks: vec!["only text".to_string()],
            sources: BTreeSet::new(),
        };
        assert_eq!(context.render(), "only text");
    }
}
