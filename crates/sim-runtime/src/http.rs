use std::sync::Arc;
use std::time::Duration;

use reqwest::{Certificate, Client};
use tracing::info;

use crate::error::{RuntimeError, RuntimeResult};

/// Default timeout for store and sink requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared HTTP client bound to one base URL. Clone is a cheap Arc refcount
/// bump, so the store and the sink can share a connection pool.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    base_url: String,
}

impl HttpClient {
    /// `root_ca` is a PEM bundle trusted on top of the system roots.
    pub fn new(base_url: &str, root_ca: Option<&[u8]>) -> RuntimeResult<Self> {
        let mut builder = Client::builder().timeout(DEFAULT_TIMEOUT);
        if let Some(pem) = root_ca {
            let cert = Certificate::from_pem(pem)
                .map_err(|e| RuntimeError::Config(format!("parse CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| RuntimeError::Config(format!("http client: {e}")))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        info!(base_url = %base_url, "http client initialized");

        Ok(Self {
            inner: Arc::new(Inner { client, base_url }),
        })
    }

    /// Build a request for `path` under the base URL. An empty `token` sends
    /// no `Authorization` header.
    pub fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        token: &str,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.inner.base_url);
        let req = self.inner.client.request(method, url);
        if token.is_empty() {
            req
        } else {
            req.bearer_auth(token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_client_builds() {
        assert!(HttpClient::new("https://127.0.0.1:6443/", None).is_ok());
    }

    #[test]
    fn malformed_ca_is_rejected() {
        let pem = b"-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
        let err = HttpClient::new("https://127.0.0.1:6443", Some(pem.as_slice())).err().unwrap();
        assert!(matches!(err, RuntimeError::Config(_)), "got: {err}");
    }
}
