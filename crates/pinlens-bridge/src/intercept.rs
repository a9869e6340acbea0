//! Transparent interception of the page's HTTP traffic.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use pinlens::{classify, PinRecord};

use crate::types::{BridgeError, BridgeResult};

/// A request as the page would issue it.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }
}

/// A completed response. `body` holds the full text, so inspecting it never
/// consumes anything the caller still needs.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub url: String,
    pub body: String,
}

/// The page-side network primitive.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
}

/// Concrete transport over reqwest.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> BridgeResult<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| BridgeError::Transport(format!("bad method {}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response.text().await?;

        Ok(HttpResponse { status, url, body })
    }
}

/// Sink receiving records mined off intercepted traffic.
pub type RecordSink = mpsc::UnboundedSender<(String, PinRecord)>;

/// Decorator that mines relevant responses without altering what the caller
/// observes. Wraps any [`HttpTransport`] and preserves its contract: same
/// response, same errors, no new failure modes.
pub struct InterceptingTransport<T> {
    inner: T,
    sink: RecordSink,
}

impl<T: HttpTransport> InterceptingTransport<T> {
    pub fn wrap(inner: T, sink: RecordSink) -> Self {
        Self { inner, sink }
    }

    fn tap(&self, url: &str, body: &str) {
        if !classify::is_relevant(url) {
            return;
        }

        // Plenty of relevant-looking URLs serve non-JSON bodies; those are
        // expected and must not surface as errors.
        let parsed: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(_) => return,
        };

        let records = classify::mine_payload(&parsed);
        if records.is_empty() {
            return;
        }
        tracing::debug!(url, count = records.len(), "mined intercepted response");

        for entry in records {
            // A closed sink means the consumer side is gone; the page's own
            // request must still succeed.
            if self.sink.send(entry).is_err() {
                break;
            }
        }
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for InterceptingTransport<T> {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let response = self.inner.execute(request).await?;
        self.tap(&response.url, &response.body);
        Ok(response)
    }
}
