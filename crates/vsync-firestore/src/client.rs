//! Firestore REST client.
//!
//! Covers the document calls the record store makes: create, masked update
//! under a precondition, delete and structured queries. Every call goes
//! through one authorized request path that maps HTTP failures to
//! [`FirestoreError`] and records metrics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_request;
use crate::retry::RetryConfig;
use crate::token_cache::TokenCache;
use crate::types::{Document, Precondition, RunQueryRequest, RunQueryResponse, StructuredQuery, Value};

const PRODUCTION_ORIGIN: &str = "https://firestore.googleapis.com";
const DEFAULT_DATABASE: &str = "(default)";

/// Where and how to reach Firestore.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database_id: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
    /// `host:port` of a Firestore emulator; skips service account auth
    pub emulator_host: Option<String>,
}

impl FirestoreConfig {
    /// The project comes from `GCP_PROJECT_ID`, else `FIREBASE_PROJECT_ID`.
    /// Database, connect timeout, retry and emulator settings are optional.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = non_empty_env("GCP_PROJECT_ID")
            .or_else(|| non_empty_env("FIREBASE_PROJECT_ID"))
            .ok_or_else(|| {
                FirestoreError::AuthError(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to reach Firestore".to_string(),
                )
            })?;

        let connect_timeout = non_empty_env("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        Ok(Self {
            project_id,
            database_id: non_empty_env("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            timeout: Duration::from_secs(30),
            connect_timeout,
            retry: RetryConfig::from_env(),
            emulator_host: non_empty_env("FIRESTORE_EMULATOR_HOST"),
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn service_account() -> FirestoreResult<Arc<dyn TokenProvider>> {
    match CustomServiceAccount::from_env() {
        Ok(Some(account)) => Ok(Arc::new(account)),
        Ok(None) => Err(FirestoreError::AuthError(
            "GOOGLE_APPLICATION_CREDENTIALS must point at a service account key file".to_string(),
        )),
        Err(e) => Err(FirestoreError::AuthError(format!(
            "Failed to load service account: {}",
            e
        ))),
    }
}

/// The API answers an expired bearer token with 401 and one of these markers.
fn is_token_expired(body: &str) -> bool {
    body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
}

/// Client bound to one Firestore database.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    documents_url: String,
    retry: RetryConfig,
    tokens: Arc<TokenCache>,
}

impl FirestoreClient {
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let (origin, tokens) = match config.emulator_host.as_deref() {
            Some(host) => (
                format!("http://{}", host.trim_end_matches('/')),
                TokenCache::emulator(),
            ),
            None => (
                PRODUCTION_ORIGIN.to_string(),
                TokenCache::service_account(service_account()?),
            ),
        };

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(10)
            .user_agent(concat!("vsync-firestore/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            documents_url: format!(
                "{}/v1/projects/{}/databases/{}/documents",
                origin, config.project_id, config.database_id
            ),
            retry: config.retry,
            tokens: Arc::new(tokens),
        })
    }

    pub async fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    /// Run `op` under this client's retry policy.
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = FirestoreResult<T>>,
    {
        crate::retry::with_retry(&self.retry, operation, op).await
    }

    /// Create `collection/doc_id`. Fails with `AlreadyExists` if the ID is taken.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!(
            "{}/{}?documentId={}",
            self.documents_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let response = self
            .call("create_document", Method::POST, &url, Some(&Document::new(fields)))
            .await?;
        Ok(response.json().await?)
    }

    /// Overwrite the masked fields of `collection/doc_id`.
    ///
    /// With a precondition, a missing or changed document yields `NotFound` or
    /// `PreconditionFailed` and nothing is written.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: &[&str],
        precondition: Option<&Precondition>,
    ) -> FirestoreResult<Document> {
        let mut params: Vec<String> = update_mask
            .iter()
            .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
            .collect();
        params.extend(precondition.map(Precondition::query_params).unwrap_or_default());

        let mut url = format!("{}/{}/{}", self.documents_url, collection, doc_id);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }

        let response = self
            .call("update_document", Method::PATCH, &url, Some(&Document::new(fields)))
            .await?;
        Ok(response.json().await?)
    }

    /// Delete `collection/doc_id`. Deleting a missing document succeeds.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<()> {
        let url = format!("{}/{}/{}", self.documents_url, collection, doc_id);
        match self.call::<()>("delete_document", Method::DELETE, &url, None).await {
            Ok(_) => Ok(()),
            Err(FirestoreError::NotFound(_)) => {
                debug!(collection, doc_id, "Document already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Run a structured query against a top-level collection.
    pub async fn run_query(&self, query: StructuredQuery) -> FirestoreResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.documents_url);
        let request = RunQueryRequest {
            structured_query: query,
        };
        let response = self.call("run_query", Method::POST, &url, Some(&request)).await?;

        // One entry per match; entries without a document only carry a readTime
        let results: Vec<RunQueryResponse> = response
            .json()
            .await
            .map_err(|e| FirestoreError::InvalidResponse(format!("runQuery: {}", e)))?;
        Ok(results.into_iter().filter_map(|r| r.document).collect())
    }

    /// Send one request, traced and counted. Non-2xx answers become errors.
    async fn call<B: Serialize>(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> FirestoreResult<Response> {
        let span = info_span!("firestore_request", operation = %operation);
        let start = Instant::now();
        let result = self.send_authorized(method, url, body).instrument(span).await;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, start.elapsed());
        result
    }

    /// A token that expires mid-flight is refreshed and the request sent once more.
    async fn send_authorized<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> FirestoreResult<Response> {
        let mut refreshed = false;
        loop {
            let token = self.tokens.get_token().await?;
            let mut request = self.http.request(method.clone(), url).bearer_auth(&token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let text = response.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED && !refreshed && is_token_expired(&text) {
                debug!("Firestore token expired, refreshing");
                self.tokens.invalidate().await;
                refreshed = true;
                continue;
            }

            return Err(FirestoreError::from_http_status(
                status.as_u16(),
                format!("{} {}: {}", method, url, text),
            ));
        }
    }
}
