//! Keyword routing of user questions.
//!
//! Classification is a pure function of the lower-cased question and an
//! immutable [`Vocabulary`]. Checks run in a fixed order and the first hit wins,
//! so a question can never match two routes.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Render a chart from the analytics table.
    Plot,
    /// Answer from a summary of the analytics table.
    Analytics,
    /// Draft, validate and run a read-only SQL statement.
    Sql,
    /// Look the answer up in the policy/document vector store.
    Retrieval,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Plot => "plot",
            Route::Analytics => "analytics",
            Route::Sql => "sql",
            Route::Retrieval => "retrieval",
        }
    }
}

const COLUMNS: &[&str] = &[
    "age",
    "attrition",
    "businesstravel",
    "dailyrate",
    "department",
    "distancefromhome",
    "education",
    "educationfield",
    "employeecount",
    "employeenumber",
    "environmentsatisfaction",
    "gender",
    "hourlyrate",
    "jobinvolvement",
    "joblevel",
    "jobrole",
    "jobsatisfaction",
    "maritalstatus",
    "monthlyincome",
    "monthlyrate",
    "numcompaniesworked",
    "over18",
    "overtime",
    "percentsalaryhike",
    "performancerating",
    "relationshipsatisfaction",
    "standardhours",
    "stockoptionlevel",
    "totalworkingyears",
    "trainingtimeslastyear",
    "worklifebalance",
    "yearsatcompany",
    "yearsincurrentrole",
    "yearssincelastpromotion",
    "yearswithcurrmanager",
];

const SYNONYMS: &[(&str, &str)] = &[
    ("departments", "department"),
    ("dept", "department"),
    ("salary", "monthlyincome"),
    ("income", "monthlyincome"),
    ("role", "jobrole"),
    ("gender", "gender"),
    ("age", "age"),
    ("experience", "totalworkingyears"),
    ("years of experience", "totalworkingyears"),
    ("attrition rate", "attrition"),
];

const PLOT_KEYWORDS: &[&str] = &[
    "plot",
    "graph",
    "chart",
    "visualize",
    "visualisation",
    "visualization",
    "draw",
    "show trend",
    "line chart",
    "bar chart",
    "pie chart",
];

const AGGREGATION_KEYWORDS: &[&str] = &[
    "count",
    "average",
    "mean",
    "total",
    "distribution",
    "list",
    "unique",
    "how many",
    "percentage",
    "breakdown",
];

/// The fixed word lists the router matches against.
///
/// All entries are expected in lower case; [`Vocabulary::from_file`] normalises
/// whatever it reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub plot_keywords: Vec<String>,
    /// Known columns of the analytics table, in projection order.
    pub columns: Vec<String>,
    /// Synonym → column.
    pub synonyms: BTreeMap<String, String>,
    pub aggregation_keywords: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| (*w).to_string()).collect();
        Self {
            plot_keywords: owned(PLOT_KEYWORDS),
            columns: owned(COLUMNS),
            synonyms: SYNONYMS
                .iter()
                .map(|(syn, col)| ((*syn).to_string(), (*col).to_string()))
                .collect(),
            aggregation_keywords: owned(AGGREGATION_KEYWORDS),
        }
    }
}

impl Vocabulary {
    /// Load a vocabulary from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read vocabulary file {}", path.display()))?;
        let vocabulary: Vocabulary = toml::from_str(&text)
            .with_context(|| format!("failed to parse vocabulary file {}", path.display()))?;
        Ok(vocabulary.normalized())
    }

    /// Lower-cases every entry and drops blank ones.
    fn normalized(self) -> Self {
        let lower = |words: Vec<String>| -> Vec<String> {
            words
                .into_iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };
        Self {
            plot_keywords: lower(self.plot_keywords),
            columns: lower(self.columns),
            synonyms: self
                .synonyms
                .into_iter()
                .map(|(syn, col)| (syn.trim().to_lowercase(), col.trim().to_lowercase()))
                .filter(|(syn, col)| !syn.is_empty() && !col.is_empty())
                .collect(),
            aggregation_keywords: lower(self.aggregation_keywords),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryRouter {
    vocabulary: Vocabulary,
}

impl QueryRouter {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self {
            vocabulary: vocabulary.normalized(),
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn classify(&self, query: &str) -> Route {
        let q = query.to_lowercase();
        let vocab = &self.vocabulary;

        if contains_any(&q, &vocab.plot_keywords) {
            return Route::Plot;
        }
        let names_column = contains_any(&q, &vocab.columns)
            || vocab.synonyms.keys().any(|syn| q.contains(syn.as_str()));
        if names_column {
            return Route::Analytics;
        }
        if contains_any(&q, &vocab.aggregation_keywords) {
            return Route::Sql;
        }
        Route::Retrieval
    }

    /// Columns the query refers to, directly or through a synonym.
    ///
    /// Returned in vocabulary column order without duplicates. Unlike
    /// [`QueryRouter::classify`], only whole words count, so "average" does not
    /// mention `age`.
    pub fn mentioned_columns(&self, query: &str) -> Vec<String> {
        let words = word_text(query);
        let vocab = &self.vocabulary;
        vocab
            .columns
            .iter()
            .filter(|col| {
                has_phrase(&words, col)
                    || vocab
                        .synonyms
                        .iter()
                        .any(|(syn, target)| target == *col && has_phrase(&words, syn))
            })
            .cloned()
            .collect()
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}

/// Lower-cased alphanumeric words of `text`, space separated and padded with a
/// space on both ends.
fn word_text(text: &str) -> String {
    let mut out = String::from(" ");
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        out.push_str(&word.to_lowercase());
        out.push(' ');
    }
    out
}

fn has_phrase(words: &str, phrase: &str) -> bool {
    let phrase = word_text(phrase);
    phrase.len() > 1 && words.contains(&phrase)
}
