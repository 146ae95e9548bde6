//! Pooled HTTP(S) client held by network-facing tools.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::header::{CONTENT_TYPE, USER_AGENT};
use hyper::{Body, Client, Request, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use toolplan_primitives::CallContext;
use tracing::debug;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::descriptor::CleanupHook;
use crate::error::{ToolError, ToolResult};

type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Response of a finished request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: StatusCode,
    /// `Content-Type` header, when the server sent a readable one.
    pub content_type: Option<String>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
}

impl HttpResponse {
    /// Whether the server labelled the body as HTML.
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|value| value.to_ascii_lowercase().contains("html"))
    }
}

/// HTTP client whose connection pool is dropped on cleanup.
pub struct HttpSession {
    client: Mutex<Option<HyperClient>>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpSession {
    /// Creates a session trusting the bundled web PKI roots.
    #[must_use]
    pub fn new(timeout: Duration) -> Arc<Self> {
        let mut roots = RootCertStore::empty();
        roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
            OwnedTrustAnchor::from_subject_spki_name_constraints(
                anchor.subject,
                anchor.spki,
                anchor.name_constraints,
            )
        }));
        let tls = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();

        let mut tcp = HttpConnector::new();
        tcp.enforce_http(false);
        let client = Client::builder().build::<_, Body>(HttpsConnector::from((tcp, Arc::new(tls))));

        Arc::new(Self {
            client: Mutex::new(Some(client)),
            timeout,
        })
    }

    fn client(&self) -> ToolResult<HyperClient> {
        self.client
            .lock()
            .map_err(|_| ToolError::execution("http session lock poisoned"))?
            .clone()
            .ok_or_else(|| ToolError::execution("http session already released"))
    }

    /// Issues a GET request, racing it against `ctx` and the session timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Cancelled`] when `ctx` fires and
    /// [`ToolError::Execution`] on transport failures or timeouts.
    pub async fn get(&self, ctx: &CallContext, tool: &str, url: &str) -> ToolResult<HttpResponse> {
        // Query strings may carry API keys; keep them out of logs and errors.
        let shown = url.split_once('?').map_or(url, |(base, _)| base);
        let uri = url
            .parse::<Uri>()
            .map_err(|err| ToolError::execution(format!("invalid URL `{shown}`: {err}")))?;
        let request = Request::get(uri)
            .header(USER_AGENT, concat!("toolplan/", env!("CARGO_PKG_VERSION")))
            .body(Body::empty())
            .map_err(|err| ToolError::execution(format!("failed to build request: {err}")))?;

        let client = self.client()?;
        let exchange = async {
            let response = client
                .request(request)
                .await
                .map_err(|err| ToolError::execution(format!("GET {shown} failed: {err}")))?;
            let status = response.status();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            let bytes = to_bytes(response.into_body())
                .await
                .map_err(|err| ToolError::execution(format!("failed to read body: {err}")))?;
            Ok::<_, ToolError>(HttpResponse {
                status,
                content_type,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            })
        };

        debug!(tool, url = shown, "http request");
        tokio::select! {
            cause = ctx.done() => Err(ToolError::cancelled(tool, cause)),
            result = tokio::time::timeout(self.timeout, exchange) => {
                result.map_err(|_| ToolError::execution(format!("GET {shown} timed out")))?
            }
        }
    }
}

#[async_trait]
impl CleanupHook for HttpSession {
    async fn release(&self) -> ToolResult<()> {
        let released = self
            .client
            .lock()
            .map_err(|_| ToolError::execution("http session lock poisoned"))?
            .take();
        if released.is_some() {
            debug!("http session released");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn released_session_refuses_requests() {
        let session = HttpSession::new(Duration::from_secs(1));
        session.release().await.unwrap();
        session.release().await.unwrap();

        let err = session
            .get(&CallContext::new(), "internetdb", "http://127.0.0.1:9/")
            .await
            .expect_err("released");
        assert!(matches!(err, ToolError::Execution { ref reason } if reason.contains("released")));
    }

    #[tokio::test]
    async fn errors_leave_out_the_query_string() {
        let session = HttpSession::new(Duration::from_secs(1));
        let err = session
            .get(&CallContext::new(), "shodan", "http://127.0.0.1:9/search?key=hunter2")
            .await
            .expect_err("nothing listens on port 9");
        let ToolError::Execution { reason } = err else {
            panic!("unexpected error: {err:?}");
        };
        assert!(reason.contains("127.0.0.1:9/search"), "{reason}");
        assert!(!reason.contains("hunter2"), "{reason}");
    }

    #[tokio::test]
    async fn reports_status_and_content_type() {
        let server = crate::test_server::TestServer::start(418, "text/html; charset=utf-8", "<p>teapot</p>").await;
        let session = HttpSession::new(Duration::from_secs(5));
        let response = session
            .get(&CallContext::new(), "web_reader", &server.base_url)
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
        assert!(response.is_html());
        assert_eq!(response.body, "<p>teapot</p>");
        session.release().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_url_is_execution_error() {
        let session = HttpSession::new(Duration::from_secs(1));
        let err = session
            .get(&CallContext::new(), "internetdb", "not a url")
            .await
            .expect_err("invalid");
        assert!(matches!(err, ToolError::Execution { .. }));
    }
}
