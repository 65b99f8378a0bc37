use anyhow::Result;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

use super::error::TransportError;

/// Maximum number of redirects followed for a single request.
pub const MAX_REDIRECTS: usize = 10;

/// Blocking HTTP GET, returning the response body as a stream.
pub trait HttpTransport {
    fn get(&self, url: &str) -> Result<Box<dyn Read>, TransportError>;
}

/// [`HttpTransport`] backed by a blocking `reqwest` client.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client with a bounded timeout and a redirect limit.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<Box<dyn Read>, TransportError> {
        debug!(url, "GET");
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| TransportError::Request {
                url: url.to_string(),
                source: Box::new(e),
            })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Box::new(resp))
    }
}
