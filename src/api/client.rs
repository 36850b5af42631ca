//! Rate-limited client for the document registration API.

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::document::{CreateDocumentRequest, Document};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::ratelimit::{GatedInvoker, RateLimiter};

/// Client that submits documents, at most as fast as its rate limiter allows.
///
/// Clones share the HTTP connection pool, the limiter and the cancellation
/// token.
#[derive(Clone)]
pub struct DocumentClient {
    http: reqwest::Client,
    endpoint: String,
    invoker: GatedInvoker,
}

impl DocumentClient {
    /// Create a new client gated by `limiter`.
    pub fn new(config: &ApiConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            invoker: GatedInvoker::new(limiter),
        })
    }

    /// Abandon submissions still waiting for a grant when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.invoker = self.invoker.with_cancellation(token);
        self
    }

    /// Get the rate limiter gating this client.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.invoker.admission()
    }

    /// Submit a document for registration and return the API's response body.
    ///
    /// The body is encoded before waiting for a grant, so an encoding failure
    /// costs nothing. Every submission that reaches the network uses one
    /// grant, whatever the outcome.
    #[instrument(skip(self, document, signature), fields(doc_id = %document.doc_id))]
    pub async fn create_document(&self, document: &Document, signature: &str) -> Result<String> {
        let body = serde_json::to_vec(&CreateDocumentRequest {
            description: document,
            signature,
        })?;

        let outcome = self.invoker.invoke(|| self.submit(body)).await;

        match outcome {
            Ok(response) => {
                info!(response = %response, "Document created successfully");
                Ok(response)
            }
            Err(err) => {
                let err = Error::from(err);
                match &err {
                    Error::Cancelled(_) => {}
                    Error::Rejected { status, .. } => {
                        warn!(status = *status, "Document API rejected the document");
                    }
                    other => warn!(error = %other, "Document submission failed"),
                }
                Err(err)
            }
        }
    }

    async fn submit(&self, body: Vec<u8>) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::OK {
            Ok(text)
        } else {
            Err(Error::Rejected {
                status: status.as_u16(),
                body: text,
            })
        }
    }
}
