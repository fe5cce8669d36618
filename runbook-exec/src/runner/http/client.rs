use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct HttpRequestParts {
    pub method: String,
    pub url: url::Url,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequestParts {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpResponseParts {
    pub status: u16,
    /// Lowercased names; repeated headers keep every value in order.
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: Vec<u8>,
}

impl HttpResponseParts {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    #[error("timeout")]
    Timeout,
    #[error("connect/dns/tls error: {0}")]
    Network(String),
    #[error("invalid method: {0}")]
    InvalidMethod(String),
    #[error("http error: {0}")]
    Other(String),
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, req: HttpRequestParts) -> Result<HttpResponseParts, HttpError>;
}

/// Transport settings for [`ReqwestHttpClient`]. TLS material is PEM bytes.
#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    pub timeout: Option<Duration>,
    pub follow_redirects: bool,
    pub cacert: Option<Vec<u8>>,
    pub cert: Option<Vec<u8>>,
    pub key: Option<Vec<u8>>,
    pub skip_verify: bool,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            follow_redirects: true,
            cacert: None,
            cert: None,
            key: None,
            skip_verify: false,
        }
    }
}

pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build a client. Errors describe bad TLS material or a certificate
    /// given without its key (or the reverse).
    pub fn new(opts: &HttpClientOptions) -> Result<Self, String> {
        let redirect = if opts.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };
        let mut builder = reqwest::Client::builder()
            .redirect(redirect)
            .user_agent(concat!("runbook/", env!("CARGO_PKG_VERSION")));

        if let Some(timeout) = opts.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(pem) = &opts.cacert {
            let cert = reqwest::Certificate::from_pem(pem).map_err(|e| format!("invalid cacert: {e}"))?;
            builder = builder.add_root_certificate(cert);
        }
        match (&opts.cert, &opts.key) {
            (Some(cert), Some(key)) => {
                let mut pem = cert.clone();
                pem.push(b'\n');
                pem.extend_from_slice(key);
                let identity =
                    reqwest::Identity::from_pem(&pem).map_err(|e| format!("invalid client certificate: {e}"))?;
                builder = builder.identity(identity);
            }
            (Some(_), None) => return Err("cert is set but key is missing".to_string()),
            (None, Some(_)) => return Err("key is set but cert is missing".to_string()),
            (None, None) => {}
        }
        if opts.skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| e.to_string())?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, req: HttpRequestParts) -> Result<HttpResponseParts, HttpError> {
        let method = reqwest::Method::from_bytes(req.method.as_bytes())
            .map_err(|_| HttpError::InvalidMethod(req.method.clone()))?;
        let mut rb = self.client.request(method, req.url);
        for (k, v) in req.headers {
            rb = rb.header(k, v);
        }
        if !req.body.is_empty() {
            rb = rb.body(req.body);
        }

        let resp = rb.send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();

        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in resp.headers().iter() {
            if let Ok(s) = v.to_str() {
                headers.entry(k.to_string()).or_default().push(s.to_string());
            }
        }

        let body = resp.bytes().await.map_err(map_reqwest_error)?.to_vec();
        Ok(HttpResponseParts { status, headers, body })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        return HttpError::Timeout;
    }
    if e.is_connect() || e.is_request() {
        return HttpError::Network(e.to_string());
    }
    HttpError::Other(e.to_string())
}
