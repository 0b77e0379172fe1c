//! reqwest-backed transport.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};

use crate::error::TransportError;
use crate::settings::Settings;
use crate::transport::{Method, Request, Response, Transport};

/// Blocking HTTP session with a persistent connection pool and cookie jar.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a session using the user agent from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidRequest`] if the client cannot be built.
    pub fn new(settings: &Settings) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,*/*"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8,en-US;q=0.6"),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout())
            .build()
            .map_err(|e| TransportError::InvalidRequest {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let target = &request.target;
        let mut builder = match target.method {
            Method::Get => self.client.get(&target.url),
            Method::Post => self.client.post(&target.url),
        };
        builder = builder.timeout(request.timeout);
        if !target.query.is_empty() {
            builder = builder.query(&target.query);
        }
        if !target.form.is_empty() {
            builder = builder.form(&target.form);
        }
        for (key, value) in &target.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout {
                    url: target.url.clone(),
                    timeout_ms: request.timeout_ms(),
                }
            } else if e.is_builder() {
                TransportError::InvalidRequest {
                    message: e.to_string(),
                }
            } else {
                TransportError::Connection {
                    url: target.url.clone(),
                    message: e.to_string(),
                }
            }
        };

        let response = builder.send().map_err(classify)?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response.bytes().map_err(classify)?.to_vec();
        Ok(Response { url, status, body })
    }
}
