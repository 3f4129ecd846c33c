use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::{
    answer::{Answer, Composer},
    conversation::Conversation,
    error::ComposeError,
    router::{QueryRouter, Route},
};

/// Outcome of one question.
#[derive(Debug)]
pub struct Reply {
    pub query: String,
    pub route: Route,
    pub answer: Result<Answer, ComposeError>,
    pub at: DateTime<Utc>,
}

/// Routes a question, composes the answer and logs the exchange.
pub struct Assistant {
    router: Arc<QueryRouter>,
    composer: Composer,
    conversation: Conversation,
}

impl Assistant {
    pub fn new(router: Arc<QueryRouter>, composer: Composer) -> Self {
        Self {
            router,
            composer,
            conversation: Conversation::default(),
        }
    }

    pub async fn ask(&mut self, query: &str) -> Reply {
        let route = self.router.classify(query);
        info!("Routing query to {}", route.as_str());

        let answer = self.composer.compose(route, query).await;
        let agent = match &answer {
            Ok(answer) => answer.transcript_text(),
            Err(e) => {
                error!(route = route.as_str(), kind = e.kind().as_str(), "Failed to answer: {e}");
                e.user_message(route).to_string()
            }
        };
        let at = self.conversation.record(query, agent).at;

        Reply {
            query: query.to_string(),
            route,
            answer,
            at,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }
}
