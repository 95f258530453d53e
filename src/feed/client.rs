//! Registry feed client — authenticated SOAP-over-HTTP access to the
//! bulletin service.
//!
//! The feed exposes exactly two operations the agent needs: list new bulletin
//! ids in a time window, and fetch one bulletin's content by id. Everything
//! else about the registry is behind this seam, so tests substitute a stub
//! `RegistryFeed`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::parser::parse_tree;

/// Boundary trait for the registry feed.
#[async_trait]
pub trait RegistryFeed: Send + Sync {
    /// Ids of bulletins published in `(from, to]`.
    async fn list_ids(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<String>, FeedError>;

    /// Raw XML content of one bulletin.
    async fn fetch_content(&self, external_id: &str) -> Result<String, FeedError>;
}

const SOAP_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// SOAP client for the production feed endpoint.
pub struct SoapFeedClient {
    http: reqwest::Client,
    config: FeedConfig,
}

impl SoapFeedClient {
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FeedError::Request(e.to_string()))?;
        Ok(Self { http, config })
    }

    async fn call(&self, action: &str, body: String) -> Result<String, FeedError> {
        let envelope = format!(
            r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="{SOAP_NS}"><soap:Body>{body}</soap:Body></soap:Envelope>"#
        );

        let response = self
            .http
            .post(&self.config.base_url)
            .basic_auth(
                &self.config.login,
                Some(self.config.password.expose_secret()),
            )
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", action)
            .body(envelope)
            .send()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(FeedError::AuthRejected);
        }
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                body: text.chars().take(200).collect(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl RegistryFeed for SoapFeedClient {
    async fn list_ids(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<String>, FeedError> {
        let body = format!(
            "<GetMessageIds><begin>{}</begin><end>{}</end></GetMessageIds>",
            from.format("%Y-%m-%dT%H:%M:%S"),
            to.format("%Y-%m-%dT%H:%M:%S"),
        );
        let response = self.call("GetMessageIds", body).await?;

        let root = parse_tree(&response)
            .map_err(|e| FeedError::MalformedResponse(e.to_string()))?
            .ok_or_else(|| FeedError::MalformedResponse("empty response body".to_string()))?;

        let result = root
            .descendant("GetMessageIdsResult")
            .ok_or_else(|| {
                FeedError::MalformedResponse("no GetMessageIdsResult element".to_string())
            })?;

        let ids: Vec<String> = result
            .children
            .iter()
            .map(|child| child.inner_text().trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        debug!(count = ids.len(), "Feed returned bulletin ids");
        Ok(ids)
    }

    async fn fetch_content(&self, external_id: &str) -> Result<String, FeedError> {
        let body = format!("<GetMessageContent><id>{external_id}</id></GetMessageContent>");
        let response = self.call("GetMessageContent", body).await?;

        let root = parse_tree(&response)
            .map_err(|e| FeedError::MalformedResponse(e.to_string()))?
            .ok_or_else(|| FeedError::MalformedResponse("empty response body".to_string()))?;

        let content = root
            .descendant("GetMessageContentResult")
            .map(|node| node.inner_text())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(FeedError::EmptyPayload);
        }
        Ok(content)
    }
}
