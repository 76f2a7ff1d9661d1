//! reqwest-backed [`Transport`] implementation.

use crate::error::{ClientError, TransportError};
use crate::Transport;
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde_json::Value as JsonValue;
use url::Url;

/// Cap on error-body text carried into log lines.
const MAX_ERROR_DETAIL: usize = 512;

/// REST client for a single FHIR server.
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl RestClient {
    /// Create a client for the given server base URL.
    ///
    /// The URL must be absolute with an http or https scheme. When a bearer
    /// token is supplied it is attached as an `Authorization` header on
    /// every call.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidBaseUrl(format!(
                "{base_url}: unsupported scheme '{}'",
                base_url.scheme()
            )));
        }

        // Url::join treats a path without a trailing slash as a file and
        // would drop its last segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("fhirlift/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    fn resource_url(&self, resource_type: &str, id: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(&format!("{resource_type}/{id}"))
            .map_err(|e| {
                TransportError::InvalidRequest(format!(
                    "resource path {resource_type}/{id}: {e}"
                ))
            })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder
            .header("Accept", "application/fhir+json")
            .header("Content-Type", "application/fhir+json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl Transport for RestClient {
    async fn upsert(
        &self,
        resource_type: &str,
        id: &str,
        resource: &JsonValue,
    ) -> Result<JsonValue, TransportError> {
        let url = self.resource_url(resource_type, id)?;
        tracing::debug!(%url, "PUT resource");
        let response = self.request(self.http.put(url)).json(resource).send().await?;
        read_resource(response).await
    }

    async fn submit_transaction(&self, bundle: &JsonValue) -> Result<JsonValue, TransportError> {
        let url = self.base_url.clone();
        tracing::debug!(%url, "POST transaction bundle");
        let response = self.request(self.http.post(url)).json(bundle).send().await?;
        read_resource(response).await
    }
}

async fn read_resource(response: Response) -> Result<JsonValue, TransportError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(TransportError::Throttled);
    }
    if !status.is_success() {
        let mut detail = response.text().await.unwrap_or_default();
        if detail.len() > MAX_ERROR_DETAIL {
            detail.truncate(
                (0..=MAX_ERROR_DETAIL)
                    .rev()
                    .find(|i| detail.is_char_boundary(*i))
                    .unwrap_or(0),
            );
        }
        return Err(TransportError::Status {
            status: status.as_u16(),
            detail,
        });
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_and_non_http_urls() {
        assert!(matches!(
            RestClient::new("fhir/base", None),
            Err(ClientError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            RestClient::new("ftp://example.org/fhir", None),
            Err(ClientError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn joins_resource_path_onto_base_without_trailing_slash() {
        let client = RestClient::new("https://example.org/fhir", None).unwrap();
        let url = client.resource_url("Patient", "p1").unwrap();
        assert_eq!(url.as_str(), "https://example.org/fhir/Patient/p1");
    }

    #[test]
    fn joins_resource_path_onto_base_with_trailing_slash() {
        let client = RestClient::new("https://example.org/fhir/", None).unwrap();
        let url = client.resource_url("Observation", "o-2").unwrap();
        assert_eq!(url.as_str(), "https://example.org/fhir/Observation/o-2");
    }

    #[test]
    fn throttled_is_distinguishable() {
        assert!(TransportError::Throttled.is_throttled());
        assert!(!TransportError::Status {
            status: 500,
            detail: String::new()
        }
        .is_throttled());
    }
}
