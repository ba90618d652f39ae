//! reqwest-backed [`Transport`].

use async_trait::async_trait;
use mms_core::{AuthConfig, ClientConfig, ConfigError, MmsResult, Transport, TransportError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// REST transport talking JSON to the backend.
#[derive(Clone)]
pub struct RestTransport {
    client: reqwest::Client,
    auth_header: HeaderMap,
}

impl RestTransport {
    pub fn new(config: &ClientConfig) -> MmsResult<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: e.to_string(),
            })?;

        let auth_header = build_auth_headers(&config.auth)?;
        Ok(Self {
            client,
            auth_header,
        })
    }

    async fn parse_response(response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();
        if status.is_success() {
            response
                .json::<Value>()
                .await
                .map_err(|e| TransportError::unreachable(e.to_string()))
        } else {
            let text = response
                .text()
                .await
                .map_err(|e| TransportError::unreachable(e.to_string()))?;
            let data = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
            Err(TransportError::new(status.as_u16(), data))
        }
    }
}

#[async_trait]
impl Transport for RestTransport {
    async fn get(&self, url: &str) -> Result<Value, TransportError> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .headers(self.auth_header.clone())
            .send()
            .await
            .map_err(|e| TransportError::unreachable(e.to_string()))?;
        Self::parse_response(response).await
    }

    async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value, TransportError> {
        debug!(url, "POST");
        let mut request = self.client.post(url).headers(self.auth_header.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::unreachable(e.to_string()))?;
        Self::parse_response(response).await
    }
}

fn build_auth_headers(auth: &AuthConfig) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    if let Some(api_key) = &auth.api_key {
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(api_key).map_err(|e| ConfigError::InvalidValue {
                field: "auth.api_key",
                reason: e.to_string(),
            })?,
        );
    }
    if let Some(jwt) = &auth.jwt {
        let value = format!("Bearer {}", jwt);
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(|e| ConfigError::InvalidValue {
                field: "auth.jwt",
                reason: e.to_string(),
            })?,
        );
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_headers_from_config() {
        let auth = AuthConfig {
            api_key: Some("key".to_string()),
            jwt: Some("token".to_string()),
        };
        let headers = build_auth_headers(&auth).unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "key");
        assert_eq!(headers.get("authorization").unwrap(), "Bearer token");
    }

    #[test]
    fn test_no_auth_headers_by_default() {
        let headers = build_auth_headers(&AuthConfig::default()).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_invalid_header_value_is_config_error() {
        let auth = AuthConfig {
            api_key: Some("bad\nkey".to_string()),
            jwt: None,
        };
        assert!(matches!(
            build_auth_headers(&auth),
            Err(ConfigError::InvalidValue { field: "auth.api_key", .. })
        ));
    }

    #[test]
    fn test_transport_builds_from_config() {
        let config = ClientConfig::with_base_url("http://localhost/alfresco/service");
        assert!(RestTransport::new(&config).is_ok());
    }
}
