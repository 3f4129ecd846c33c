use std::sync::Arc;

use async_graphql::{Context, Json, Object, Result, SimpleObject};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    answer::Answer,
    assistant::{Assistant, Reply},
};

/// The assistant's reply to one question.
#[derive(SimpleObject)]
pub(crate) struct AskResponse {
    pub query: String,
    /// `plot`, `analytics`, `sql` or `retrieval`.
    pub route: String,
    /// `text`, `grounded`, `chart`, `image` or `failure`.
    pub kind: String,
    pub text: Option<String>,
    /// A plotly figure.
    pub chart: Option<Json<Value>>,
    pub image_path: Option<String>,
    pub sources: Vec<String>,
    /// `backend_unavailable`, `rejected` or `unsupported`.
    pub failure: Option<String>,
    pub timestamp: String,
}

#[derive(SimpleObject)]
pub(crate) struct TurnRecord {
    pub user: String,
    pub agent: String,
    pub timestamp: String,
}

#[derive(Default)]
pub(crate) struct AskMutation;

#[Object]
impl AskMutation {
    async fn ask(&self, ctx: &Context<'_>, query: String) -> Result<AskResponse> {
        let assistant = ctx.data::<Arc<Mutex<Assistant>>>()?;
        let reply = assistant.lock().await.ask(&query).await;
        to_response(reply)
    }
}

#[derive(Default)]
pub(crate) struct ConversationQuery;

#[Object]
impl ConversationQuery {
    async fn conversation(&self, ctx: &Context<'_>) -> Result<Vec<TurnRecord>> {
        let assistant = ctx.data::<Arc<Mutex<Assistant>>>()?;
        let guard = assistant.lock().await;
        Ok(guard
            .conversation()
            .turns()
            .iter()
            .map(|turn| TurnRecord {
                user: turn.user.clone(),
                agent: turn.agent.clone(),
                timestamp: turn.at.to_rfc3339(),
            })
            .collect())
    }
}

fn to_response(reply: Reply) -> Result<AskResponse> {
    let mut response = AskResponse {
        query: reply.query,
        route: reply.route.as_str().to_string(),
        kind: "failure".to_string(),
        text: None,
        chart: None,
        image_path: None,
        sources: Vec::new(),
        failure: None,
        timestamp: reply.at.to_rfc3339(),
    };

    match reply.answer {
        Ok(answer) => {
            response.kind = answer.kind().to_string();
            match answer {
                Answer::Text(text) => response.text = Some(text),
                Answer::Grounded { text, sources } => {
                    response.text = Some(text);
                    response.sources = sources.into_iter().collect();
                }
                Answer::Chart(figure) => {
                    response.text = Some(figure.layout.title.clone());
                    response.chart = Some(Json(serde_json::to_value(&figure)?));
                }
                Answer::Image(path) => response.image_path = Some(path.display().to_string()),
            }
        }
        Err(e) => {
            response.text = Some(e.user_message(reply.route).to_string());
            response.failure = Some(e.kind().as_str().to_string());
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use crate::{
        graphql::TestSchema,
        testing::{assistant, meta, FailingStore, MemoryStore, ScriptedCompletion},
    };

    #[tokio::test]
    async fn leave_policy_on_empty_store() {
        let schema = TestSchema::new(assistant(
            ScriptedCompletion::default(),
            MemoryStore::default(),
        ));
        let query = r#"
        mutation {
            ask(query: "What is the company's leave policy?") {
                route
                kind
                text
                sources
                failure
            }
        }"#;
        let res = schema.execute(query).await;
        assert_eq!(
            res.data.to_string(),
            "{ask: {route: \"retrieval\", kind: \"text\", text: \"No relevant information found in enterprise data.\", sources: [], failure: null}}"
        );
    }

    #[tokio::test]
    async fn grounded_answer_lists_sources() {
        let store = MemoryStore::with_chunks(vec![
            ("Leave is 25 days.", meta("pdf")),
            ("Employee 9 took 3 days.", meta("postgresql")),
        ]);
        let schema = TestSchema::new(assistant(ScriptedCompletion::always("25 days."), store));
        let query = r#"
        mutation {
            ask(query: "leave policy") {
                kind
                text
                sources
            }
        }"#;
        let res = schema.execute(query).await;
        assert_eq!(
            res.data.to_string(),
            "{ask: {kind: \"grounded\", text: \"25 days.\", sources: [\"Employee Attrition Database (PostgreSQL)\", \"Employee Handbook (PDF)\"]}}"
        );
    }

    #[tokio::test]
    async fn plot_returns_figure_json() {
        let schema = TestSchema::new(assistant(
            ScriptedCompletion::always("?"),
            MemoryStore::default(),
        ));
        let query = r#"
        mutation {
            ask(query: "plot department distribution") {
                route
                kind
                chart
            }
        }"#;
        let res = schema.execute(query).await;
        assert!(res.errors.is_empty(), "{:?}", res.errors);
        let data = res.data.into_json().unwrap();
        assert_eq!(data["ask"]["route"], "plot");
        assert_eq!(data["ask"]["kind"], "chart");
        assert_eq!(data["ask"]["chart"]["data"][0]["type"], "bar");
        assert_eq!(data["ask"]["chart"]["layout"]["title"], "count by department");
    }

    #[tokio::test]
    async fn backend_failure_is_categorised() {
        let schema = TestSchema::new(assistant(ScriptedCompletion::default(), FailingStore));
        let query = r#"
        mutation {
            ask(query: "leave policy") {
                kind
                text
                failure
            }
        }"#;
        let res = schema.execute(query).await;
        assert_eq!(
            res.data.to_string(),
            "{ask: {kind: \"failure\", text: \"Unable to search enterprise documents right now.\", failure: \"backend_unavailable\"}}"
        );
    }

    #[tokio::test]
    async fn conversation_lists_turns() {
        let schema = TestSchema::new(assistant(
            ScriptedCompletion::always("ok"),
            MemoryStore::default(),
        ));
        schema
            .execute(r#"mutation { ask(query: "salary per dept") { kind } }"#)
            .await;
        schema
            .execute(r#"mutation { ask(query: "plot department distribution") { kind } }"#)
            .await;

        let res = schema.execute("{ conversation { user agent } }").await;
        assert_eq!(
            res.data.to_string(),
            "{conversation: [{user: \"salary per dept\", agent: \"ok\"}, {user: \"plot department distribution\", agent: \"[chart: count by department]\"}]}"
        );
    }
}
