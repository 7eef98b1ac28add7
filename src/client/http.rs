//! reqwest-backed collaborator

use super::types::{HistoryResponse, SimilarityResponse};
use super::{ClientError, Collaborator, CreateSessionRequest, FragmentStream, MessageRequest, SessionInfo};
use crate::config::ClientConfig;
use crate::turn::{SimilarityScores, Turn};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Talks to the retrieval backend over HTTP
#[derive(Debug, Clone)]
pub struct HttpCollaborator {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpCollaborator {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ClientError::invalid_request(format!("Invalid backend URL {}: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::invalid_request(format!(
                "Backend URL cannot take a path: {base_url}"
            )));
        }

        // No whole-request timeout here: streamed replies are bounded by the
        // controller's idle and overall deadlines instead
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            request_timeout: config.request_timeout,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await.map_err(|e| ClientError::from_reqwest(&e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::from_status(status.as_u16(), &body))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::network(format!("Failed to read response: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| ClientError::invalid_response(format!("Failed to parse response: {e} - body: {body}")))
    }
}

#[async_trait]
impl Collaborator for HttpCollaborator {
    async fn open_session(
        &self,
        name: &str,
        system_instructions: Option<&str>,
    ) -> Result<SessionInfo, ClientError> {
        let body = CreateSessionRequest {
            name,
            system_instructions,
        };
        let request = self
            .client
            .post(self.url(&["sessions"]))
            .timeout(self.request_timeout)
            .json(&body);
        let response = Self::send(request).await?;
        Self::read_json(response).await
    }

    async fn fetch_history(&self, name: &str) -> Result<Vec<Turn>, ClientError> {
        let request = self
            .client
            .get(self.url(&["sessions", name, "history"]))
            .timeout(self.request_timeout);
        let response = Self::send(request).await?;
        let history: HistoryResponse = Self::read_json(response).await?;
        Ok(history.into_turns())
    }

    async fn stream_message(&self, request: &MessageRequest) -> Result<FragmentStream, ClientError> {
        let builder = self
            .client
            .post(self.url(&["messages", "stream"]))
            .header("Accept", "text/event-stream")
            .json(request);
        let response = Self::send(builder).await?;

        let fragments = response.bytes_stream().map(|item| {
            item.map(|bytes| bytes.to_vec())
                .map_err(|e| ClientError::network(format!("Stream interrupted: {e}")))
        });
        Ok(fragments.boxed())
    }

    async fn last_similarities(&self, name: &str) -> Result<SimilarityScores, ClientError> {
        let request = self
            .client
            .get(self.url(&["sessions", name, "lastSimilarities"]))
            .timeout(self.request_timeout);
        let response = Self::send(request).await?;
        let scores: SimilarityResponse = Self::read_json(response).await?;
        Ok(scores.similarity_scores)
    }
}
