use std::path::PathBuf;

pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users";
pub const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

pub const KEYRING_SERVICE_NAME: &str = "gmail-export";
pub const KEYRING_USERNAME: &str = "default_user";

/// Where the credential lives between runs.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialStoreKind {
    File(PathBuf),
    Keyring,
}

/// Settings for one export run, handed to each component at construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub client_secret_path: PathBuf,
    pub credential_store: CredentialStoreKind,
    pub output_path: PathBuf,
    pub scopes: Vec<String>,
    pub user_id: String,
    pub api_base: String,
    pub max_results: u32,
    /// Provider search expression, passed through as `q` without local evaluation.
    pub filter: Option<String>,
    /// Value written for a header the message does not carry.
    pub missing_header: String,
    /// Whether the browser consent flow may run when no usable credential exists.
    pub interactive: bool,
    /// Fixed loopback port for the consent redirect; `None` binds an ephemeral one.
    pub redirect_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_secret_path: PathBuf::from("credentials.json"),
            credential_store: CredentialStoreKind::File(PathBuf::from("token.json")),
            output_path: PathBuf::from("emails.csv"),
            scopes: vec![READONLY_SCOPE.to_string()],
            user_id: "me".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            max_results: 100,
            filter: None,
            missing_header: String::new(),
            interactive: true,
            redirect_port: None,
        }
    }
}
