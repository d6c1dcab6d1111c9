//! `reqwest` implementation of [`Transport`].

use crate::config::{AccountConfig, Credentials};
use crate::error::{Error, Result};
use crate::transport::{classify_response, method_name, Transport};
use crate::wsse;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Per-request timeout; report polling happens above this layer.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Signs and POSTs each call to the REST endpoint.
pub struct HttpTransport {
    endpoint: String,
    credentials: Credentials,
    client: Client,
}

impl HttpTransport {
    pub fn new(endpoint: &str, credentials: Credentials) -> Result<HttpTransport> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(HttpTransport {
            endpoint: endpoint.to_string(),
            credentials,
            client,
        })
    }

    pub fn from_config(config: &AccountConfig) -> Result<HttpTransport> {
        HttpTransport::new(&config.endpoint, config.credentials.clone())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, api: &str, method: &str, body: &Value) -> Result<Value> {
        let name = method_name(api, method);
        info!("Request: {}  Parameters: {}", name, body);
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("method", name.as_str())])
            .header(
                wsse::HEADER,
                wsse::token(&self.credentials.username, &self.credentials.secret),
            )
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(body)?)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        debug!("Response for {} ({}): {}", name, status, text);

        // error documents arrive with 4xx statuses, so parse before checking
        match serde_json::from_str::<Value>(&text) {
            Ok(decoded) => classify_response(decoded),
            Err(_) if !status.is_success() => Err(Error::UnexpectedResponse(format!(
                "{} returned HTTP {}: {}",
                name, status, text
            ))),
            Err(e) => Err(Error::Json(e)),
        }
    }
}
