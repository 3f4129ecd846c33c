mod analytics;
mod plot;
mod rag;
mod sql;

use std::{collections::BTreeSet, path::PathBuf, sync::Arc};

use tracing::info;

use crate::{
    chart::ChartFigure,
    database::TableAccessor,
    error::ComposeError,
    llm::CompletionService,
    retrieval::RetrievalAssembler,
    router::{QueryRouter, Route},
};

/// What the assistant hands back to the chat surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Text(String),
    /// Text answered from retrieved chunks, with the labels of their sources.
    Grounded {
        text: String,
        sources: BTreeSet<String>,
    },
    Chart(ChartFigure),
    Image(PathBuf),
}

impl Answer {
    pub fn kind(&self) -> &'static str {
        match self {
            Answer::Text(_) => "text",
            Answer::Grounded { .. } => "grounded",
            Answer::Chart(_) => "chart",
            Answer::Image(_) => "image",
        }
    }

    /// Plain text form kept in the conversation log.
    pub fn transcript_text(&self) -> String {
        match self {
            Answer::Text(text) | Answer::Grounded { text, .. } => text.clone(),
            Answer::Chart(figure) => format!("[chart: {}]", figure.layout.title),
            Answer::Image(path) => format!("[image: {}]", path.display()),
        }
    }
}

/// Builds the answer for an already routed question.
pub struct Composer {
    completion: Arc<dyn CompletionService>,
    table: Arc<dyn TableAccessor>,
    retrieval: RetrievalAssembler,
    router: Arc<QueryRouter>,
    top_k: usize,
    max_sql_rows: usize,
}

impl Composer {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        table: Arc<dyn TableAccessor>,
        retrieval: RetrievalAssembler,
        router: Arc<QueryRouter>,
        top_k: usize,
        max_sql_rows: usize,
    ) -> Self {
        Self {
            completion,
            table,
            retrieval,
            router,
            top_k,
            max_sql_rows,
        }
    }

    pub async fn compose(&self, route: Route, query: &str) -> Result<Answer, ComposeError> {
        info!("Composing {} answer", route.as_str());
        match route {
            Route::Plot => self.plot(query).await,
            Route::Analytics => self.analytics(query).await,
            Route::Sql => self.sql(query).await,
            Route::Retrieval => self.retrieval(query).await,
        }
    }

    /// Vocabulary columns the question mentions that the table actually serves.
    fn served_columns(&self, query: &str) -> Vec<String> {
        let served = self.table.columns();
        self.router
            .mentioned_columns(query)
            .into_iter()
            .filter(|c| served.contains(c))
            .collect()
    }
}
