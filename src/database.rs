use std::{sync::LazyLock, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    types::Json,
    PgPool,
};
use tracing::{debug, info};

use crate::{error::DataError, settings::DatabaseSettings};

pub type Row = Map<String, Value>;

/// Rows read from the analytics table, each as a column → value object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    /// Values of one column, skipping rows that lack it.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows.iter().filter_map(move |row| row.get(column))
    }
}

/// Numeric reading of a cell; numeric text is accepted as well.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Display form of a cell used for grouping and labels.
pub fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(null)".to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
pub trait TableAccessor: Send + Sync {
    fn table_name(&self) -> &str;

    /// Columns read by [`TableAccessor::fetch_table`].
    fn columns(&self) -> &[String];

    /// Reads the named columns of every row of the analytics table.
    async fn fetch_columns(&self, columns: &[String]) -> Result<Table, DataError>;

    /// Runs an already validated read-only statement and returns at most
    /// `max_rows` rows.
    async fn execute_select(&self, statement: &str, max_rows: usize)
        -> Result<Vec<Row>, DataError>;

    /// The fixed read: every configured column of every row.
    async fn fetch_table(&self) -> Result<Table, DataError> {
        let columns = self.columns().to_vec();
        self.fetch_columns(&columns).await
    }
}

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Only plain identifiers are interpolated into statements.
pub fn quote_identifier(ident: &str) -> Result<String, DataError> {
    if IDENTIFIER_RE.is_match(ident) {
        Ok(format!("\"{ident}\""))
    } else {
        Err(DataError::InvalidIdentifier(ident.to_string()))
    }
}

fn projection_sql(table: &str, columns: &[String]) -> Result<String, DataError> {
    let table = quote_identifier(table)?;
    let projection = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");
    Ok(format!(
        "SELECT row_to_json(t) FROM (SELECT {projection} FROM {table}) t"
    ))
}

/// The statement sits on its own lines so a trailing `--` comment cannot
/// swallow the closing parenthesis.
fn bounded_select_sql(statement: &str) -> String {
    format!("SELECT row_to_json(q) FROM (\n{statement}\n) q LIMIT $1")
}

/// PostgreSQL access to the single analytics table.
pub struct PgAccessor {
    pool: PgPool,
    table: String,
    columns: Vec<String>,
}

impl PgAccessor {
    /// Builds a lazily connecting pool; nothing is dialled until the first query.
    pub fn connect_lazy(
        settings: &DatabaseSettings,
        columns: Vec<String>,
    ) -> Result<Self, DataError> {
        quote_identifier(&settings.table)?;
        for column in &columns {
            quote_identifier(column)?;
        }

        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.name);

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .max_lifetime(Duration::from_secs(settings.max_lifetime_secs))
            .test_before_acquire(true)
            .connect_lazy_with(options);

        info!(
            "Prepared PostgreSQL pool for {}:{}/{} (table {})",
            settings.host, settings.port, settings.name, settings.table
        );
        Ok(Self {
            pool,
            table: settings.table.clone(),
            columns,
        })
    }
}

#[async_trait]
impl TableAccessor for PgAccessor {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn fetch_columns(&self, columns: &[String]) -> Result<Table, DataError> {
        let sql = projection_sql(&self.table, columns)?;
        debug!(%sql, "reading analytics table");
        let rows: Vec<Json<Row>> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(Table {
            columns: columns.to_vec(),
            rows: rows.into_iter().map(|Json(row)| row).collect(),
        })
    }

    async fn execute_select(
        &self,
        statement: &str,
        max_rows: usize,
    ) -> Result<Vec<Row>, DataError> {
        let sql = bounded_select_sql(statement);
        debug!(%sql, "executing generated statement");
        let limit = i64::try_from(max_rows).unwrap_or(i64::MAX);

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;
        let rows: Vec<Json<Row>> = sqlx::query_scalar(&sql)
            .bind(limit)
            .fetch_all(&mut *tx)
            .await?;
        tx.rollback().await?;
        Ok(rows.into_iter().map(|Json(row)| row).collect())
    }
}
