use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::{Error, TransportError};
use crate::gmail_api::auth::Credential;
use crate::record::HEADER_ALLOW_LIST;
use crate::types::{MessageDetail, MessageSummary, MessagesResponse};

/// Read-only view of a mailbox as the export workflow consumes it.
///
/// Failures are absorbed here: a failed listing reads as an empty mailbox
/// and a failed fetch as an absent message.
#[async_trait]
pub trait MailSource: Send + Sync {
    async fn list_messages(&self, max_results: u32, filter: Option<&str>) -> Vec<MessageSummary>;
    async fn fetch_detail(&self, id: &str) -> Option<MessageDetail>;
}

/// Unauthenticated client settings; becomes a [`GmailClient`] once a
/// credential is available.
pub struct GmailClientBuilder {
    http: reqwest::Client,
    api_base: String,
    user_id: String,
}

impl GmailClientBuilder {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            user_id: config.user_id.clone(),
        }
    }

    pub fn authenticate(self, credential: &Credential) -> GmailClient {
        GmailClient {
            http: self.http,
            api_base: self.api_base,
            user_id: self.user_id,
            token: credential.token.clone(),
        }
    }
}

/// Authenticated handle for the messages endpoints.
pub struct GmailClient {
    http: reqwest::Client,
    api_base: String,
    user_id: String,
    token: String,
}

impl GmailClient {
    /// Lists the first page of messages; later pages are never requested.
    pub async fn try_list_messages(
        &self,
        max_results: u32,
        filter: Option<&str>,
    ) -> Result<Vec<MessageSummary>, Error> {
        let url = format!("{}/{}/messages", self.api_base, self.user_id);
        let mut request = self
            .http
            .get(&url)
            .query(&[("maxResults", max_results.to_string())]);
        if let Some(q) = filter.filter(|q| !q.trim().is_empty()) {
            request = request.query(&[("q", q)]);
        }

        let response: MessagesResponse =
            self.send_json(request)
                .await
                .map_err(|source| Error::Transport {
                    operation: "list messages",
                    id: None,
                    source,
                })?;
        debug!(
            "Listing returned estimate of {} messages",
            response.result_size_estimate.unwrap_or(0)
        );
        Ok(response.messages.unwrap_or_default())
    }

    /// Fetches the allow-listed headers of one message in metadata format.
    pub async fn try_fetch_detail(&self, id: &str) -> Result<MessageDetail, Error> {
        let url = format!("{}/{}/messages/{}", self.api_base, self.user_id, id);
        let mut params = vec![("format", "metadata")];
        params.extend(HEADER_ALLOW_LIST.iter().map(|h| ("metadataHeaders", *h)));

        self.send_json(self.http.get(&url).query(&params))
            .await
            .map_err(|source| Error::Transport {
                operation: "get message",
                id: Some(id.to_string()),
                source,
            })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status { status, body });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl MailSource for GmailClient {
    async fn list_messages(&self, max_results: u32, filter: Option<&str>) -> Vec<MessageSummary> {
        match self.try_list_messages(max_results, filter).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("{}; treating mailbox as empty", e);
                Vec::new()
            }
        }
    }

    async fn fetch_detail(&self, id: &str) -> Option<MessageDetail> {
        match self.try_fetch_detail(id).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                warn!("{}; skipping message", e);
                None
            }
        }
    }
}
