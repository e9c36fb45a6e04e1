//! `reqwest`-backed implementation of [`Transport`].

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;
use shelf_core::{ApiRequest, ApiResponse, Method, Transport, TransportError};

use crate::config::ClientConfig;

#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::Network {
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Patch => self.client.patch(url),
            Method::Delete => self.client.delete(url),
        };
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| TransportError::Network {
            reason: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| TransportError::Network {
            reason: e.to_string(),
        })?;

        Ok(ApiResponse::new(status, decode_body(&request.path, status, &bytes)?))
    }
}

/// Empty bodies decode to `null`. Error responses that are not JSON are kept
/// as a string so the status error can still carry them.
fn decode_body(path: &str, status: u16, bytes: &[u8]) -> Result<Value, TransportError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => Ok(value),
        Err(_) if !(200..300).contains(&status) => {
            Ok(Value::String(String::from_utf8_lossy(bytes).into_owned()))
        }
        Err(e) => Err(TransportError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        }),
    }
}
