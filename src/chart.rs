use std::{cmp::Ordering, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    database::{label, numeric, Table},
    error::ComposeError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Pie,
    Line,
    Histogram,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    #[default]
    Count,
    Mean,
    Sum,
}

impl Aggregate {
    fn as_str(self) -> &'static str {
        match self {
            Aggregate::Count => "count",
            Aggregate::Mean => "mean",
            Aggregate::Sum => "sum",
        }
    }
}

/// What to draw: `{"chart": "bar", "x": "department", "y": null, "aggregate": "count"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart: ChartKind,
    pub x: String,
    #[serde(default)]
    pub y: Option<String>,
    #[serde(default)]
    pub aggregate: Aggregate,
}

static JSON_OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

impl ChartSpec {
    /// Finds a chart spec in a model reply, tolerating prose or code fences
    /// around the JSON object.
    pub fn from_reply(reply: &str) -> Option<Self> {
        let object = JSON_OBJECT_RE.find(reply)?;
        let mut value: Value = serde_json::from_str(object.as_str()).ok()?;
        for key in ["chart", "aggregate"] {
            if let Some(Value::String(s)) = value.get_mut(key) {
                *s = s.trim().to_lowercase();
            }
        }
        let mut spec: ChartSpec = serde_json::from_value(value).ok()?;
        spec.x = spec.x.trim().to_lowercase();
        spec.y = spec
            .y
            .map(|y| y.trim().to_lowercase())
            .filter(|y| !y.is_empty());
        Some(spec)
    }

    /// Spec guessed from the wording of the question.
    pub fn infer(query: &str, mentioned: &[String]) -> Option<Self> {
        let q = query.to_lowercase();
        let chart = if q.contains("pie") {
            ChartKind::Pie
        } else if q.contains("histogram") {
            ChartKind::Histogram
        } else if q.contains("line") || q.contains("trend") {
            ChartKind::Line
        } else {
            ChartKind::Bar
        };
        Some(Self {
            chart,
            x: mentioned.first()?.clone(),
            y: None,
            aggregate: Aggregate::Count,
        })
    }

    /// Every referenced column must be one of `known`.
    pub fn check_columns(&self, known: &[String]) -> Result<(), ComposeError> {
        for column in std::iter::once(&self.x).chain(self.y.as_ref()) {
            if !known.iter().any(|k| k == column) {
                return Err(ComposeError::ChartSpec(format!("unknown column {column}")));
            }
        }
        let needs_y = self.aggregate != Aggregate::Count && self.chart != ChartKind::Histogram;
        if needs_y && self.y.is_none() {
            return Err(ComposeError::ChartSpec(format!(
                "{} needs a y column",
                self.aggregate.as_str()
            )));
        }
        Ok(())
    }

    /// Columns to read for this chart.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec![self.x.clone()];
        if let Some(y) = &self.y {
            if *y != self.x {
                columns.push(y.clone());
            }
        }
        columns
    }

    fn title(&self) -> String {
        match (&self.y, self.aggregate) {
            (Some(y), Aggregate::Mean | Aggregate::Sum) => {
                format!("{} of {y} by {}", self.aggregate.as_str(), self.x)
            }
            _ if self.chart == ChartKind::Histogram => format!("distribution of {}", self.x),
            _ => format!("count by {}", self.x),
        }
    }
}

/// A plotly figure (`data` + `layout`) the chat UI renders as is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartFigure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
}

impl Trace {
    fn empty(kind: &'static str) -> Self {
        Self {
            kind,
            x: None,
            y: None,
            labels: None,
            values: None,
            mode: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis: Option<Axis>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub title: String,
}

fn axis(title: &str) -> Option<Axis> {
    Some(Axis {
        title: title.to_string(),
    })
}

/// Builds the figure for `spec` from the table rows.
pub fn build_figure(spec: &ChartSpec, table: &Table) -> Result<ChartFigure, ComposeError> {
    let title = spec.title();

    if spec.chart == ChartKind::Histogram {
        let values: Vec<Value> = table
            .column_values(&spec.x)
            .filter(|v| !v.is_null())
            .cloned()
            .collect();
        if values.is_empty() {
            return Err(ComposeError::ChartSpec(format!("no values for {}", spec.x)));
        }
        return Ok(ChartFigure {
            data: vec![Trace {
                x: Some(values),
                ..Trace::empty("histogram")
            }],
            layout: Layout {
                title,
                xaxis: axis(&spec.x),
                yaxis: axis("count"),
            },
        });
    }

    let groups = aggregate(spec, table)?;
    let (keys, totals): (Vec<Value>, Vec<f64>) = groups.into_iter().unzip();
    let y_title = match (&spec.y, spec.aggregate) {
        (Some(y), Aggregate::Mean | Aggregate::Sum) => {
            format!("{} of {y}", spec.aggregate.as_str())
        }
        _ => "count".to_string(),
    };

    let figure = match spec.chart {
        ChartKind::Pie => ChartFigure {
            data: vec![Trace {
                labels: Some(keys.iter().map(label).collect()),
                values: Some(totals),
                ..Trace::empty("pie")
            }],
            layout: Layout {
                title,
                xaxis: None,
                yaxis: None,
            },
        },
        ChartKind::Line => ChartFigure {
            data: vec![Trace {
                x: Some(keys),
                y: Some(totals),
                mode: Some("lines+markers"),
                ..Trace::empty("scatter")
            }],
            layout: Layout {
                title,
                xaxis: axis(&spec.x),
                yaxis: axis(&y_title),
            },
        },
        _ => ChartFigure {
            data: vec![Trace {
                x: Some(keys),
                y: Some(totals),
                ..Trace::empty("bar")
            }],
            layout: Layout {
                title,
                xaxis: axis(&spec.x),
                yaxis: axis(&y_title),
            },
        },
    };
    Ok(figure)
}

/// Groups rows by the x column and reduces each group, ordered by key.
fn aggregate(spec: &ChartSpec, table: &Table) -> Result<Vec<(Value, f64)>, ComposeError> {
    let mut groups: Vec<(Value, f64, usize)> = Vec::new();
    for row in &table.rows {
        let Some(key) = row.get(&spec.x) else {
            continue;
        };
        let amount = match (spec.aggregate, &spec.y) {
            (Aggregate::Count, _) => 1.0,
            (_, Some(y)) => match row.get(y).and_then(numeric) {
                Some(v) => v,
                None => continue,
            },
            (_, None) => {
                return Err(ComposeError::ChartSpec(format!(
                    "{} needs a y column",
                    spec.aggregate.as_str()
                )))
            }
        };
        match groups.iter_mut().find(|(k, _, _)| k == key) {
            Some((_, total, n)) => {
                *total += amount;
                *n += 1;
            }
            None => groups.push((key.clone(), amount, 1)),
        }
    }
    if groups.is_empty() {
        return Err(ComposeError::ChartSpec(format!("no values for {}", spec.x)));
    }

    groups.sort_by(|(a, _, _), (b, _, _)| compare_keys(a, b));
    Ok(groups
        .into_iter()
        .map(|(key, total, n)| {
            let value = if spec.aggregate == Aggregate::Mean {
                total / n as f64
            } else {
                total
            };
            (key, value)
        })
        .collect())
}

fn compare_keys(a: &Value, b: &Value) -> Ordering {
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => label(a).cmp(&label(b)),
    }
}
