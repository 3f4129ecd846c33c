use std::{
    fmt::Write,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use super::{Answer, Composer};
use crate::{
    chart::{build_figure, ChartSpec},
    database::{label, numeric, Table},
    error::ComposeError,
};

const MAX_CATEGORIES: usize = 20;
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp"];

impl Composer {
    pub(super) async fn analytics(&self, query: &str) -> Result<Answer, ComposeError> {
        let table = self.table.fetch_table().await?;
        let mut columns = self.served_columns(query);
        if columns.is_empty() {
            columns = table.columns.clone();
        }
        let summary = summarize(&table, &columns);
        debug!(%summary, "analytics summary");

        let prompt = analytics_prompt(&summary, &table.columns, query);
        let reply = self.completion.complete(&prompt).await?;
        Ok(interpret_reply(reply, &table))
    }
}

fn analytics_prompt(summary: &str, columns: &[String], question: &str) -> String {
    format!(
        "You are an enterprise data analyst.\n\
         Answer the question strictly from the data summary below. \
         Do NOT use outside knowledge or assumptions. \
         If the summary does not contain the answer, say so clearly.\n\
         If a chart answers the question better than text, reply with only a JSON object \
         {{\"chart\": \"bar|pie|line|histogram\", \"x\": <column>, \"y\": <column or null>, \
         \"aggregate\": \"count|mean|sum\"}} using these columns: {}.\n\n\
         Data summary:\n{summary}\n\n\
         Question:\n{question}\n\
         Answer:",
        columns.join(", ")
    )
}

/// Row count plus one line per column: value counts for categorical columns,
/// count/mean/min/max for numeric ones.
fn summarize(table: &Table, columns: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Rows: {}", table.rows.len());
    for column in columns {
        let values: Vec<_> = table.column_values(column).filter(|v| !v.is_null()).collect();
        let numbers: Vec<f64> = values.iter().filter_map(|v| numeric(v)).collect();

        if !values.is_empty() && numbers.len() == values.len() {
            let count = numbers.len();
            let mean = numbers.iter().sum::<f64>() / count as f64;
            let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
            let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let _ = writeln!(
                out,
                "Column {column} (numeric): count={count}, mean={mean:.2}, min={min}, max={max}"
            );
            continue;
        }

        let mut counts: Vec<(String, usize)> = Vec::new();
        for value in values {
            let key = label(value);
            match counts.iter_mut().find(|(k, _)| *k == key) {
                Some((_, n)) => *n += 1,
                None => counts.push((key, 1)),
            }
        }
        counts.sort_by(|(ka, na), (kb, nb)| nb.cmp(na).then_with(|| ka.cmp(kb)));
        let shown: Vec<String> = counts
            .iter()
            .take(MAX_CATEGORIES)
            .map(|(k, n)| format!("{k}={n}"))
            .collect();
        let more = counts.len().saturating_sub(MAX_CATEGORIES);
        let _ = write!(out, "Column {column} (categorical): {}", shown.join(", "));
        if more > 0 {
            let _ = write!(out, " (+{more} more)");
        }
        out.push('\n');
    }
    out
}

/// A reply may carry a chart spec or point at a rendered image instead of text.
fn interpret_reply(reply: String, table: &Table) -> Answer {
    if let Some(spec) = ChartSpec::from_reply(&reply) {
        match spec
            .check_columns(&table.columns)
            .and_then(|()| build_figure(&spec, table))
        {
            Ok(figure) => return Answer::Chart(figure),
            Err(e) => warn!("Ignoring chart spec in analytics reply: {e}"),
        }
    }
    if let Some(path) = image_path(&reply) {
        return Answer::Image(path);
    }
    Answer::Text(reply.trim().to_string())
}

fn image_path(reply: &str) -> Option<PathBuf> {
    let candidate = reply.trim().trim_matches(|c| c == '`' || c == '"' || c == '\'');
    if candidate.is_empty() || candidate.contains('\n') {
        return None;
    }
    let path = Path::new(candidate);
    let ext = path.extension()?.to_str()?.to_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) && path.is_file() {
        Some(path.to_path_buf())
    } else {
        None
    }
}
