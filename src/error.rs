use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single remote call against the Gmail or token endpoints.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Failures reading or writing the persisted credential.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    /// The client secret needed for first-time consent is absent or unreadable.
    #[error("client secret unavailable at {}: {source}", .path.display())]
    ConfigMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("authentication failed: {0}")]
    Auth(String),
    /// A remote call that must succeed failed. Listing and detail failures are
    /// absorbed by `MailSource`, so `run` does not currently return this.
    #[error("{operation} failed{}: {source}", .id.as_deref().map(|id| format!(" for {id}")).unwrap_or_default())]
    Transport {
        operation: &'static str,
        id: Option<String>,
        #[source]
        source: TransportError,
    },
    #[error("cannot write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Process exit code for each fatal class; 0 is reserved for success.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::ConfigMissing { .. } => 2,
            Error::Auth(_) => 3,
            Error::Transport { .. } => 4,
            Error::Io { .. } => 5,
        }
    }
}
