// src/settings.rs

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use config::{builder::DefaultState, ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};

const DEFAULT_ADDR: &str = "127.0.0.1:8000";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Path to the certificate file.
    #[arg(long, value_name = "CERT_PATH", requires = "key")]
    pub cert: Option<PathBuf>,

    /// Path to the key file.
    #[arg(long, value_name = "KEY_PATH", requires = "cert")]
    pub key: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the chat API (default).
    Serve,
    /// Load documents into the vector store.
    Ingest {
        /// Summarise every row of the analytics table.
        #[arg(long)]
        rows: bool,

        /// JSON Lines file of pre-split handbook chunks.
        #[arg(long, value_name = "CHUNKS_PATH")]
        chunks: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Web {
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub address: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub table: String,
    pub max_connections: u32,
    /// Connections older than this are recycled.
    pub max_lifetime_secs: u64,
    /// Row cap for generated statements.
    pub max_sql_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmMode {
    Local,
    Hosted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub mode: LlmMode,
    pub local_model: String,
    pub ollama_host: String,
    pub ollama_port: u16,
    pub hosted_model: String,
    pub hosted_base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            mode: LlmMode::Local,
            local_model: "mistral".to_string(),
            ollama_host: "http://127.0.0.1".to_string(),
            ollama_port: 11434,
            hosted_model: "gpt-4o-mini".to_string(),
            hosted_base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSettings {
    pub qdrant_url: String,
    pub collection: String,
    pub embed_model: String,
    pub dimension: u64,
    pub top_k: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterSettings {
    /// TOML file overriding the built-in keyword and column vocabulary.
    #[serde(default)]
    pub vocabulary: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    pub key_column: String,
    pub summary_columns: Vec<String>,
    pub batch_size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Settings {
    pub web: Web,
    pub database: DatabaseSettings,
    pub llm: LlmSettings,
    pub vector: VectorSettings,
    #[serde(default)]
    pub router: RouterSettings,
    pub ingest: IngestSettings,
}

impl Settings {
    /// Load settings from the given TOML file (if any), with sane defaults,
    /// then apply the `PG_*`, `USE_LOCAL_LLM` and `OPENAI_API_KEY` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let llm = LlmSettings::default();
        let mut builder = ConfigBuilder::<DefaultState>::default()
            .set_default("web.address", DEFAULT_ADDR)?
            .set_default("database.host", "localhost")?
            .set_default("database.port", 5432_i64)?
            .set_default("database.name", "postgres")?
            .set_default("database.user", "postgres")?
            .set_default("database.password", "")?
            .set_default("database.table", "employee_attrition")?
            .set_default("database.max_connections", 5_i64)?
            .set_default("database.max_lifetime_secs", 300_i64)?
            .set_default("database.max_sql_rows", 200_i64)?
            .set_default("llm.mode", "local")?
            .set_default("llm.local_model", llm.local_model)?
            .set_default("llm.ollama_host", llm.ollama_host)?
            .set_default("llm.ollama_port", i64::from(llm.ollama_port))?
            .set_default("llm.hosted_model", llm.hosted_model)?
            .set_default("llm.hosted_base_url", llm.hosted_base_url)?
            .set_default("llm.temperature", f64::from(llm.temperature))?
            .set_default("vector.qdrant_url", "http://localhost:6334")?
            .set_default("vector.collection", "employee_data")?
            .set_default("vector.embed_model", "nomic-embed-text")?
            .set_default("vector.dimension", 768_i64)?
            .set_default("vector.top_k", 5_i64)?
            .set_default("ingest.key_column", "employeenumber")?
            .set_default(
                "ingest.summary_columns",
                vec!["department", "educationfield", "gender", "jobrole", "performancerating"],
            )?
            .set_default("ingest.batch_size", 64_i64)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let mode = env("USE_LOCAL_LLM").map(|flag| {
            if flag.trim().eq_ignore_ascii_case("false") {
                "hosted".to_string()
            } else {
                "local".to_string()
            }
        });

        let cfg = builder
            .set_override_option("database.host", env("PG_HOST"))?
            .set_override_option("database.name", env("PG_DB"))?
            .set_override_option("database.user", env("PG_USER"))?
            .set_override_option("database.password", env("PG_PASSWORD"))?
            .set_override_option("database.port", env("PG_PORT"))?
            .set_override_option("llm.mode", mode)?
            .set_override_option("llm.api_key", env("OPENAI_API_KEY"))?
            .build()?;

        cfg.try_deserialize()
    }
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}
