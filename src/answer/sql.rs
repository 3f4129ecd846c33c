use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use super::{Answer, Composer};
use crate::error::ComposeError;

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").unwrap());

impl Composer {
    pub(super) async fn sql(&self, query: &str) -> Result<Answer, ComposeError> {
        let draft = self
            .completion
            .complete(&draft_prompt(
                self.table.table_name(),
                self.table.columns(),
                query,
            ))
            .await?;

        let statement = validate_select(&strip_code_fences(&draft)).inspect_err(|e| {
            warn!("Generated statement rejected: {e}");
        })?;
        info!(%statement, "executing generated SQL");
        let rows = self
            .table
            .execute_select(&statement, self.max_sql_rows)
            .await?;
        info!("Statement returned {} rows", rows.len());

        let rows = Value::Array(rows.into_iter().map(Value::Object).collect()).to_string();
        let reply = self
            .completion
            .complete(&answer_prompt(&statement, &rows, query))
            .await?;
        Ok(Answer::Text(reply.trim().to_string()))
    }
}

/// The contents of the first fenced block, or the whole text when unfenced.
fn strip_code_fences(text: &str) -> String {
    CODE_FENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str())
        .trim()
        .to_string()
}

/// Accepts a single read-only statement.
///
/// The text must start with `SELECT` (any case, after trimming). Trailing
/// semicolons are dropped; any other semicolon means stacked statements.
fn validate_select(sql: &str) -> Result<String, ComposeError> {
    let trimmed = sql.trim();
    let starts_with_select = trimmed
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"));
    if !starts_with_select {
        return Err(ComposeError::UnsafeSql(trimmed.to_string()));
    }

    let statement = trimmed.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if statement.contains(';') {
        return Err(ComposeError::UnsafeSql(trimmed.to_string()));
    }
    Ok(statement.to_string())
}

fn draft_prompt(table: &str, columns: &[String], question: &str) -> String {
    format!(
        "You write PostgreSQL queries against the table \"{table}\" with columns: {}.\n\
         Write exactly one read-only SELECT statement that answers the question. \
         Reply with the SQL only, without explanation.\n\n\
         Question:\n{question}\n\
         SQL:",
        columns.join(", ")
    )
}

fn answer_prompt(statement: &str, rows: &str, question: &str) -> String {
    format!(
        "You are an enterprise data assistant.\n\
         Answer the question using ONLY the query result below. \
         Do NOT use outside knowledge or assumptions. \
         Do not mention SQL or databases in your answer.\n\n\
         Query:\n{statement}\n\n\
         Result (JSON rows):\n{rows}\n\n\
         Question:\n{question}\n\
         Answer:"
    )
}
