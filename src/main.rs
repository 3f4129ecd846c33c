mod answer;
mod assistant;
mod chart;
mod conversation;
mod database;
mod embeddings;
mod error;
mod graphql;
mod ingest;
mod llm;
mod retrieval;
mod router;
mod settings;
#[cfg(test)]
mod testing;
mod vector_db;
mod web;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    answer::Composer,
    assistant::Assistant,
    database::PgAccessor,
    embeddings::OllamaEmbedder,
    ingest::Ingestor,
    retrieval::RetrievalAssembler,
    router::{QueryRouter, Vocabulary},
    settings::{Args, Command, Settings},
    vector_db::QdrantStore,
    web::Tls,
};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("failed to load settings")?;

    let vocabulary = match &settings.router.vocabulary {
        Some(path) => Vocabulary::from_file(path)?,
        None => Vocabulary::default(),
    };
    let router = Arc::new(QueryRouter::new(vocabulary));

    let table = Arc::new(PgAccessor::connect_lazy(
        &settings.database,
        router.vocabulary().columns.clone(),
    )?);
    let embedder = Arc::new(OllamaEmbedder::new(
        &settings.llm.ollama_host,
        settings.llm.ollama_port,
        &settings.vector.embed_model,
    ));
    let store = Arc::new(QdrantStore::new(
        &settings.vector.qdrant_url,
        &settings.vector.collection,
        settings.vector.dimension,
        embedder,
    )?);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let completion = llm::from_settings(&settings.llm)?;
            let composer = Composer::new(
                completion,
                table,
                RetrievalAssembler::new(store),
                router.clone(),
                settings.vector.top_k,
                settings.database.max_sql_rows,
            );
            let assistant = Arc::new(Mutex::new(Assistant::new(router, composer)));

            let tls = match (args.cert, args.key) {
                (Some(cert), Some(key)) => Some(Tls { cert, key }),
                _ => None,
            };
            web::serve(graphql::schema(assistant), settings.web.address, tls).await;
        }
        Command::Ingest { rows, chunks } => {
            if !rows && chunks.is_none() {
                bail!("nothing to ingest: pass --rows and/or --chunks <CHUNKS_PATH>");
            }
            let ingestor = Ingestor::new(store, settings.ingest.batch_size);
            if rows {
                let n = ingestor
                    .ingest_rows(
                        table.as_ref(),
                        &settings.ingest.key_column,
                        &settings.ingest.summary_columns,
                    )
                    .await?;
                info!("Ingested {n} row summaries");
            }
            if let Some(path) = chunks {
                let n = ingestor.ingest_chunks(&path).await?;
                info!("Ingested {n} document chunks");
            }
        }
    }
    Ok(())
}
