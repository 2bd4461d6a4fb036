//! Gmail API module split into logical submodules
//!
//! - auth: credential lifecycle (stored, refreshed, consented)
//! - store: where the credential lives between runs
//! - messages: listing and metadata fetches

pub mod auth;
pub mod messages;
pub mod store;

pub use auth::{
    load_client_secret, ConsentFlow, Credential, CredentialManager, HttpRefresher,
    InstalledFlow, TokenRefresher,
};
pub use messages::{GmailClient, GmailClientBuilder, MailSource};
pub use store::{CredentialStore, FileStore, KeyringEntry, KeyringStore, StoreBackend};
