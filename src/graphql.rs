mod chat;

use std::sync::Arc;

use async_graphql::{EmptySubscription, MergedObject};
use tokio::sync::Mutex;

use crate::assistant::Assistant;

/// A set of queries defined in the schema.
///
/// This is exposed only for [`Schema`], and not used directly.
#[derive(Default, MergedObject)]
pub(crate) struct Query(chat::ConversationQuery);

/// A set of mutations defined in the schema.
#[derive(Default, MergedObject)]
pub(crate) struct Mutation(chat::AskMutation);

pub(crate) type Schema = async_graphql::Schema<Query, Mutation, EmptySubscription>;

/// Questions are answered one at a time behind the assistant's lock.
pub(crate) fn schema(assistant: Arc<Mutex<Assistant>>) -> Schema {
    Schema::build(Query::default(), Mutation::default(), EmptySubscription)
        .data(assistant)
        .finish()
}

#[cfg(test)]
struct TestSchema {
    schema: Schema,
}

#[cfg(test)]
impl TestSchema {
    fn new(assistant: Assistant) -> Self {
        Self {
            schema: schema(Arc::new(Mutex::new(assistant))),
        }
    }

    async fn execute(&self, query: &str) -> async_graphql::Response {
        let request: async_graphql::Request = query.into();
        self.schema.execute(request).await
    }
}
