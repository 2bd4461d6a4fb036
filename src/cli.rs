use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, CredentialStoreKind, DEFAULT_API_BASE, READONLY_SCOPE};
use crate::error::StoreError;
use crate::gmail_api::{CredentialStore, StoreBackend};

/// Export Gmail message metadata (id, thread, labels, subject, from, to, date) to CSV.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// OAuth client secret downloaded from the developer console.
    #[clap(long, default_value = "credentials.json")]
    pub client_secret: PathBuf,

    /// File holding the stored credential between runs.
    #[clap(long, default_value = "token.json", conflicts_with = "keyring")]
    pub token_file: PathBuf,

    /// Keep the credential in the system keyring instead of a file.
    #[clap(long)]
    pub keyring: bool,

    /// Destination CSV file; overwritten on every run.
    #[clap(short, long, default_value = "emails.csv")]
    pub output: PathBuf,

    /// Number of messages to list (first page only).
    #[clap(short = 'n', long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..=500))]
    pub max_results: u32,

    /// Gmail search expression, e.g. `subject:interview -from:noreply`.
    #[clap(short, long)]
    pub query: Option<String>,

    /// Value written for headers a message does not carry.
    #[clap(long, default_value = "")]
    pub missing: String,

    /// Fail instead of opening the browser when no usable credential is stored.
    #[clap(long)]
    pub no_browser: bool,

    /// Fixed loopback port for the consent redirect (default: any free port).
    #[clap(long)]
    pub redirect_port: Option<u16>,

    /// OAuth scope to request; repeat for several.
    #[clap(long = "scope", default_value = READONLY_SCOPE)]
    pub scopes: Vec<String>,

    /// Mailbox to read; `me` is the authenticated user.
    #[clap(long, default_value = "me")]
    pub user_id: String,

    #[clap(long, default_value = DEFAULT_API_BASE, hide = true)]
    pub api_base: String,

    /// Delete the stored credential and exit.
    #[clap(long)]
    pub clear_credentials: bool,
}

impl Cli {
    pub fn into_config(self) -> Config {
        let credential_store = if self.keyring {
            CredentialStoreKind::Keyring
        } else {
            CredentialStoreKind::File(self.token_file)
        };

        Config {
            client_secret_path: self.client_secret,
            credential_store,
            output_path: self.output,
            scopes: self.scopes,
            user_id: self.user_id,
            api_base: self.api_base,
            max_results: self.max_results,
            filter: self.query.filter(|q| !q.trim().is_empty()),
            missing_header: self.missing,
            interactive: !self.no_browser,
            redirect_port: self.redirect_port,
        }
    }
}

pub async fn handle_credentials_clear(store: &StoreBackend) -> Result<(), StoreError> {
    store.clear().await?;
    println!("Credentials removed from {}. Exiting.", store.describe());
    Ok(())
}
