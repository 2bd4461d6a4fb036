use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub messages: Option<Vec<MessageSummary>>,
    #[serde(rename = "resultSizeEstimate")]
    pub result_size_estimate: Option<u32>,
}

/// One entry of a message listing.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MessageSummary {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: String,
    #[serde(rename = "labelIds", default)]
    pub label_ids: Vec<String>,
}

/// A message fetched in metadata format: identifiers plus the requested headers.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MessageDetail {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
    #[serde(rename = "labelIds")]
    pub label_ids: Option<Vec<String>>,
    pub payload: Option<MessagePart>,
}

impl MessageDetail {
    /// Headers in the order the provider returned them.
    pub fn headers(&self) -> &[Header] {
        self.payload
            .as_ref()
            .and_then(|p| p.headers.as_deref())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct MessagePart {
    pub headers: Option<Vec<Header>>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Header {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}
