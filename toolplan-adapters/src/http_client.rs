//! JSON-over-HTTP plumbing shared by the provider adapters.

use std::sync::Arc;
use std::time::Duration;

use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use hyper::{Body, Client, Request, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tracing::debug;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::traits::{AdapterError, AdapterResult};

type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

/// A provider endpoint accepting JSON `POST` requests.
pub(crate) struct JsonEndpoint {
    provider: &'static str,
    uri: Uri,
    timeout: Duration,
    client: HyperClient,
}

impl JsonEndpoint {
    /// Joins `path` onto an already normalized `base_url`.
    pub(crate) fn new(
        provider: &'static str,
        base_url: &str,
        path: &str,
        timeout: Duration,
    ) -> AdapterResult<Self> {
        let uri = format!("{base_url}{path}").parse::<Uri>().map_err(|err| {
            AdapterError::configuration(format!("invalid {provider} endpoint: {err}"))
        })?;
        Ok(Self {
            provider,
            uri,
            timeout,
            client: https_client(),
        })
    }

    pub(crate) fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Posts `payload` and decodes a successful response body.
    ///
    /// A 429 becomes [`AdapterError::RateLimited`] carrying `Retry-After`;
    /// any other non-2xx status becomes [`AdapterError::Response`].
    pub(crate) async fn post<Req, Resp>(&self, bearer: Option<&str>, payload: &Req) -> AdapterResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let provider = self.provider;
        let body = serde_json::to_vec(payload).map_err(|err| {
            AdapterError::invalid_request(format!("failed to encode {provider} request: {err}"))
        })?;

        let mut request = Request::post(self.uri.clone()).header(CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = request.body(Body::from(body)).map_err(|err| {
            AdapterError::transport(format!("failed to build {provider} request: {err}"))
        })?;

        debug!(provider, uri = %self.uri, "posting inference request");
        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| AdapterError::transport(format!("{provider} request timed out")))?
            .map_err(|err| AdapterError::transport(format!("{provider} request failed: {err}")))?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let bytes = to_bytes(response.into_body()).await.map_err(|err| {
            AdapterError::transport(format!("failed to read {provider} response: {err}"))
        })?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(AdapterError::response(format!(
                "{provider} returned {status}: {}",
                String::from_utf8_lossy(&bytes)
            )));
        }

        serde_json::from_slice(&bytes)
            .map_err(|err| AdapterError::response(format!("failed to decode {provider} response: {err}")))
    }
}

/// Requires an `http(s)://` scheme and a trailing slash so paths can be
/// appended directly.
pub(crate) fn normalize_base_url(provider: &str, input: &str) -> AdapterResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(AdapterError::configuration(format!(
            "{provider} base URL must start with http:// or https://"
        )));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>().map_err(|err| {
        AdapterError::configuration(format!("invalid {provider} base URL: {err}"))
    })?;
    Ok(base)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// Plain HTTP stays enabled for local daemons such as Ollama.
fn https_client() -> HyperClient {
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
    Client::builder().build::<_, Body>(HttpsConnector::from((tcp, Arc::new(tls))))
}
