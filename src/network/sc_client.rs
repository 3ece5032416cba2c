//! HTTP client for the SimpleCoin (SC) pool server.
//!
//! RPC endpoints live under `/rpc/` and exchange timed, signed tokens in
//! both directions. The public REST API is read with plain unsigned GETs.

use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::core::config::ScRpcClientConfig;
use crate::core::errors::PayoutError;
use crate::security::redaction::{redact_body, redact_url};
use crate::security::signing::TimedSerializer;

pub struct ScClient {
    base_url: Url,
    serializer: TimedSerializer,
    max_age: u64,
    client: Client,
}

impl ScClient {
    pub fn new(config: &ScRpcClientConfig) -> Result<Self, PayoutError> {
        let base_url = Url::parse(&config.rpc_url)
            .map_err(|e| PayoutError::Config(format!("invalid rpc_url: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PayoutError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            serializer: TimedSerializer::new(&config.rpc_signature),
            max_age: config.max_age,
            client,
        })
    }

    /// POST a signed `data` payload to `/rpc/<endpoint>` and verify the signed reply.
    pub async fn post(&self, endpoint: &str, data: &Value) -> Result<Value, PayoutError> {
        let url = self.url(&format!("/rpc/{}", endpoint))?;
        let token = self.serializer.dumps(data)?;
        let body = self.remote(self.client.post(url.clone()).body(token), &url).await?;

        self.serializer.loads(&body, self.max_age).map_err(|e| {
            error!(url = %redact_url(url.as_str()), error = %e, "invalid data returned from remote");
            PayoutError::from(e)
        })
    }

    /// Unsigned GET relative to the server root, returning the JSON body.
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, PayoutError> {
        let mut url = self.url(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        let body = self.remote(self.client.get(url.clone()), &url).await?;
        serde_json::from_str(&body)
            .map_err(|e| PayoutError::Remote(format!("non-JSON body from {}: {}", url.path(), e)))
    }

    pub fn url(&self, path: &str) -> Result<Url, PayoutError> {
        self.base_url
            .join(path)
            .map_err(|e| PayoutError::Config(format!("cannot join {} onto rpc_url: {}", path, e)))
    }

    async fn remote(&self, request: RequestBuilder, url: &Url) -> Result<String, PayoutError> {
        debug!(url = %redact_url(url.as_str()), "making request to SC");
        let response = request.send().await.map_err(|e| {
            PayoutError::Network(format!("unable to reach {}: {}", redact_url(url.as_str()), e))
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PayoutError::Network(format!("failed reading response: {}", e)))?;
        if status != reqwest::StatusCode::OK {
            return Err(PayoutError::Remote(format!(
                "non 200 from remote ({}): {}",
                status,
                redact_body(&text)
            )));
        }
        debug!(body = %redact_body(&text), "got response from SC");
        Ok(text)
    }
}
