use std::{convert::Infallible, net::SocketAddr, path::PathBuf};

use async_graphql::http::GraphiQLSource;
use async_graphql_warp::{GraphQLBadRequest, GraphQLResponse};
use tracing::info;
use warp::{
    http::{Response as HttpResponse, StatusCode},
    Filter, Rejection, Reply,
};

use crate::graphql::Schema;

/// Certificate and key for serving over HTTPS.
pub(crate) struct Tls {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Runs the chat API: `POST /graphql` and GraphiQL at `/`.
pub(crate) async fn serve(schema: Schema, addr: SocketAddr, tls: Option<Tls>) {
    let routes = routes(schema);
    match tls {
        Some(Tls { cert, key }) => {
            info!("Listening on https://{addr}");
            warp::serve(routes)
                .tls()
                .cert_path(cert)
                .key_path(key)
                .run(addr)
                .await;
        }
        None => {
            info!("Listening on http://{addr}");
            warp::serve(routes).run(addr).await;
        }
    }
}

fn routes(schema: Schema) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let graphql_post = warp::path!("graphql")
        .and(async_graphql_warp::graphql(schema))
        .and_then(
            |(schema, request): (Schema, async_graphql::Request)| async move {
                Ok::<_, Infallible>(GraphQLResponse::from(schema.execute(request).await))
            },
        );

    let graphiql = warp::path::end().and(warp::get()).map(|| {
        HttpResponse::builder()
            .header("content-type", "text/html")
            .body(GraphiQLSource::build().endpoint("/graphql").finish())
    });

    graphiql
        .or(graphql_post)
        .recover(|err: Rejection| async move {
            if let Some(GraphQLBadRequest(err)) = err.find() {
                return Ok::<_, Infallible>(warp::reply::with_status(
                    err.to_string(),
                    StatusCode::BAD_REQUEST,
                ));
            }
            if err.is_not_found() {
                return Ok(warp::reply::with_status(
                    "NOT_FOUND".to_string(),
                    StatusCode::NOT_FOUND,
                ));
            }
            Ok(warp::reply::with_status(
                "INTERNAL_SERVER_ERROR".to_string(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::Mutex;

    use super::*;
    use crate::{
        graphql::schema,
        testing::{assistant, MemoryStore, ScriptedCompletion},
    };

    fn test_routes() -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
        let assistant = assistant(ScriptedCompletion::default(), MemoryStore::default());
        routes(schema(Arc::new(Mutex::new(assistant))))
    }

    #[tokio::test]
    async fn graphql_endpoint_answers() {
        let res = warp::test::request()
            .method("POST")
            .path("/graphql")
            .json(&json!({ "query": "mutation { ask(query: \"leave policy\") { route text } }" }))
            .reply(&test_routes())
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["data"]["ask"]["route"], "retrieval");
        assert_eq!(
            body["data"]["ask"]["text"],
            "No relevant information found in enterprise data."
        );
    }

    #[tokio::test]
    async fn graphiql_is_served_at_root() {
        let res = warp::test::request()
            .method("GET")
            .path("/")
            .reply(&test_routes())
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(String::from_utf8_lossy(res.body()).contains("/graphql"));
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let res = warp::test::request()
            .method("GET")
            .path("/nope")
            .reply(&test_routes())
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
