use tracing::{info, warn};

use super::{Answer, Composer};
use crate::{
    chart::{build_figure, ChartSpec},
    error::ComposeError,
};

impl Composer {
    pub(super) async fn plot(&self, query: &str) -> Result<Answer, ComposeError> {
        let known = self.table.columns().to_vec();
        let reply = self.completion.complete(&plot_prompt(&known, query)).await?;

        let spec = match ChartSpec::from_reply(&reply) {
            Some(spec) if spec.check_columns(&known).is_ok() => spec,
            parsed => {
                if parsed.is_some() {
                    warn!("Chart spec from model names unknown columns; inferring from question");
                } else {
                    warn!("No chart spec in model reply; inferring from question");
                }
                ChartSpec::infer(query, &self.served_columns(query)).ok_or_else(|| {
                    ComposeError::ChartSpec("question names no known column".to_string())
                })?
            }
        };
        spec.check_columns(&known)?;
        info!(chart = ?spec.chart, x = %spec.x, "building chart");

        let table = self.table.fetch_columns(&spec.columns()).await?;
        Ok(Answer::Chart(build_figure(&spec, &table)?))
    }
}

fn plot_prompt(columns: &[String], question: &str) -> String {
    format!(
        "You turn questions about enterprise data into chart specifications.\n\
         Reply with only a JSON object of the form \
         {{\"chart\": \"bar|pie|line|histogram\", \"x\": <column>, \"y\": <column or null>, \
         \"aggregate\": \"count|mean|sum\"}}.\n\
         Use only these columns: {}.\n\n\
         Question:\n{question}\n\
         JSON:",
        columns.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        answer::tests::composer,
        router::Route,
        testing::{MemoryTable, ScriptedCompletion},
    };

    #[tokio::test]
    async fn department_distribution_is_a_chart() {
        let completion = Arc::new(ScriptedCompletion::always("I cannot draw."));
        let composer = composer(completion, MemoryTable::employees());
        let answer = composer
            .compose(Route::Plot, "plot department distribution")
            .await
            .unwrap();
        let Answer::Chart(figure) = answer else {
            panic!("expected a chart");
        };
        assert_eq!(figure.data[0].kind, "bar");
        assert_eq!(
            figure.data[0].x.as_ref().unwrap(),
            &vec![json!("Research & Development"), json!("Sales")]
        );
    }

    #[tokio::test]
    async fn model_spec_is_used_when_valid() {
        let completion = Arc::new(ScriptedCompletion::always(
            r#"```json
{"chart": "bar", "x": "department", "y": "monthlyincome", "aggregate": "sum"}
```"#,
        ));
        let composer = composer(completion.clone(), MemoryTable::employees());
        let answer = composer
            .compose(Route::Plot, "plot total salary per department")
            .await
            .unwrap();
        let Answer::Chart(figure) = answer else {
            panic!("expected a chart");
        };
        assert_eq!(figure.data[0].y.as_ref().unwrap(), &vec![7220.0, 8902.0]);
        assert!(completion.prompts()[0].contains("employeenumber, department"));
    }

    #[tokio::test]
    async fn unknown_model_columns_fall_back_to_inference() {
        let completion = Arc::new(ScriptedCompletion::always(
            r#"{"chart": "pie", "x": "region"}"#,
        ));
        let composer = composer(completion, MemoryTable::employees());
        let answer = composer
            .compose(Route::Plot, "pie chart of gender")
            .await
            .unwrap();
        let Answer::Chart(figure) = answer else {
            panic!("expected a chart");
        };
        assert_eq!(figure.data[0].kind, "pie");
        assert_eq!(
            figure.data[0].labels.as_ref().unwrap(),
            &vec!["Female".to_string(), "Male".to_string()]
        );
    }

    #[tokio::test]
    async fn question_without_columns_is_unsupported() {
        let completion = Arc::new(ScriptedCompletion::always("no idea"));
        let composer = composer(completion, MemoryTable::employees());
        let err = composer
            .compose(Route::Plot, "draw the org chart")
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::ChartSpec(_)));
    }
}
