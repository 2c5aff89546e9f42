//! Remote sub-schemas: a schema graph whose delegated operations are shipped
//! over the wire instead of executed in-process.

use async_trait::async_trait;
use serde_json::Value as Json;
use std::sync::Arc;

use crate::error::StitchError;
use crate::graph::SchemaGraph;
use crate::GraphQLRequest;

/// Executes a printed GraphQL request against a remote service and returns
/// the standard response envelope.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute_request(&self, request: GraphQLRequest) -> Result<Json, StitchError>;
}

/// POSTs requests as JSON, the way every GraphQL-over-HTTP service expects.
pub struct HttpRemoteExecutor {
    client: reqwest::Client,
    url: String,
}

impl HttpRemoteExecutor {
    pub fn new(url: impl Into<String>) -> Self {
        HttpRemoteExecutor {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl RemoteExecutor for HttpRemoteExecutor {
    async fn execute_request(&self, request: GraphQLRequest) -> Result<Json, StitchError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| StitchError::Remote(format!("failed to send to {}: {}", self.url, e)))?;

        response.json::<Json>().await.map_err(|e| {
            StitchError::Remote(format!("failed to parse response from {}: {}", self.url, e))
        })
    }
}

/// Builds a schema graph for a remote service from its SDL. Delegated
/// documents addressed at the result are printed and sent through the
/// executor rather than resolved locally.
pub fn make_remote_schema(
    sdl: &str,
    executor: Arc<dyn RemoteExecutor>,
) -> Result<Arc<SchemaGraph>, StitchError> {
    let (mut graph, extensions) = SchemaGraph::from_sdl(sdl)?;
    if !extensions.is_empty() {
        return Err(StitchError::InvalidSource(
            "remote schema SDL cannot contain type extensions".into(),
        ));
    }
    graph.executor = Some(executor);
    Ok(Arc::new(graph))
}
