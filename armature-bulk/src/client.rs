//! OpenSearch client implementation.

use crate::{
    config::OpenSearchConfig,
    error::{BulkError, Result, TransportError},
    transport::{Refresh, SearchRequest, Transport, WriteParams},
};
use async_trait::async_trait;
use opensearch::{
    BulkParts, ClearScrollParts, OpenSearch, ScrollParts, SearchParts,
    http::{
        StatusCode,
        request::JsonBody,
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

/// OpenSearch client backing the bulk and scroll helpers.
#[derive(Clone)]
pub struct OpenSearchClient {
    client: Arc<OpenSearch>,
    config: Arc<OpenSearchConfig>,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client.
    pub fn new(config: OpenSearchConfig) -> Result<Self> {
        info!("Initializing OpenSearch client for: {:?}", config.urls);

        let url = config
            .urls
            .first()
            .ok_or_else(|| BulkError::Validation("No URLs provided".to_string()))?;

        let url = opensearch::http::Url::parse(url)
            .map_err(|e| BulkError::Validation(format!("Invalid URL: {}", e)))?;

        let conn_pool = SingleNodeConnectionPool::new(url);
        let mut builder = TransportBuilder::new(conn_pool)
            .timeout(config.request_timeout)
            .disable_proxy();

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.auth(opensearch::auth::Credentials::Basic(
                user.clone(),
                pass.clone(),
            ));
        }

        let transport = builder
            .build()
            .map_err(|e| BulkError::from(TransportError::connection(e.to_string())))?;

        debug!("OpenSearch client initialized");

        Ok(Self {
            client: Arc::new(OpenSearch::new(transport)),
            config: Arc::new(config),
        })
    }

    /// Create a client from `OPENSEARCH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenSearchConfig::from_env())
    }

    /// Get the underlying OpenSearch client.
    pub fn inner(&self) -> &OpenSearch {
        &self.client
    }

    /// Get the configuration.
    pub fn config(&self) -> &OpenSearchConfig {
        &self.config
    }
}

fn refresh_param(refresh: Refresh) -> opensearch::params::Refresh {
    match refresh {
        Refresh::True => opensearch::params::Refresh::True,
        Refresh::False => opensearch::params::Refresh::False,
        Refresh::WaitFor => opensearch::params::Refresh::WaitFor,
    }
}

fn client_error(e: opensearch::Error) -> TransportError {
    TransportError {
        status: e.status_code().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

fn error_reason(body: &Value, status: StatusCode) -> String {
    body.get("error")
        .and_then(|e| e.get("reason").and_then(|r| r.as_str()).or_else(|| e.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        })
}

/// Read a response body, turning a non-2xx status into an error.
async fn read_json(response: Response) -> std::result::Result<Value, TransportError> {
    let status = response.status_code();
    let body: Value = response.json().await.map_err(client_error)?;

    if !status.is_success() {
        return Err(TransportError::new(status.as_u16(), error_reason(&body, status)));
    }
    Ok(body)
}

#[async_trait]
impl Transport for OpenSearchClient {
    async fn bulk(
        &self,
        body: Vec<Value>,
        params: &WriteParams,
    ) -> std::result::Result<Value, TransportError> {
        let parts = match params.index.as_deref() {
            Some(index) => BulkParts::Index(index),
            None => BulkParts::None,
        };
        let body: Vec<JsonBody<Value>> = body.into_iter().map(JsonBody::from).collect();

        let mut request = self.client.bulk(parts).body(body);
        if let Some(refresh) = params.refresh {
            request = request.refresh(refresh_param(refresh));
        }
        if let Some(routing) = params.routing.as_deref() {
            request = request.routing(routing);
        }
        if let Some(pipeline) = params.pipeline.as_deref() {
            request = request.pipeline(pipeline);
        }
        if let Some(timeout) = params.timeout.as_deref() {
            request = request.timeout(timeout);
        }
        if let Some(shards) = params.wait_for_active_shards.as_deref() {
            request = request.wait_for_active_shards(shards);
        }
        if let Some(require_alias) = params.require_alias {
            request = request.require_alias(require_alias);
        }

        let response = request.send().await.map_err(client_error)?;
        read_json(response).await
    }

    async fn search(&self, request: &SearchRequest) -> std::result::Result<Value, TransportError> {
        let index: Vec<&str> = request.index.iter().map(String::as_str).collect();
        let routing: Vec<&str> = request.routing.iter().map(String::as_str).collect();
        let parts = if index.is_empty() {
            SearchParts::None
        } else {
            SearchParts::Index(&index)
        };

        debug!("Opening scroll over {:?}", request.index);

        let mut search = self
            .client
            .search(parts)
            .body(request.body.clone())
            .scroll(&request.scroll)
            .size(request.size);
        if !routing.is_empty() {
            search = search.routing(&routing);
        }
        if let Some(timeout) = request.request_timeout {
            search = search.request_timeout(timeout);
        }

        let response = search.send().await.map_err(client_error)?;
        read_json(response).await
    }

    async fn scroll(&self, scroll_id: &str, ttl: &str) -> std::result::Result<Value, TransportError> {
        let response = self
            .client
            .scroll(ScrollParts::None)
            .body(json!({ "scroll": ttl, "scroll_id": scroll_id }))
            .send()
            .await
            .map_err(client_error)?;
        read_json(response).await
    }

    async fn clear_scroll(&self, scroll_id: &str) -> std::result::Result<(), TransportError> {
        let response = self
            .client
            .clear_scroll(ClearScrollParts::None)
            .body(json!({ "scroll_id": [scroll_id] }))
            .send()
            .await
            .map_err(client_error)?;

        // already expired
        if response.status_code() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        read_json(response).await.map(|_| ())
    }
}

impl std::fmt::Debug for OpenSearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSearchClient")
            .field("urls", &self.config.urls)
            .finish()
    }
}
