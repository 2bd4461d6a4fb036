use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use yup_oauth2::storage::{TokenInfo, TokenStorage};
use yup_oauth2::{ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod};

use crate::config::Config;
use crate::error::{Error, TransportError};
use crate::gmail_api::store::CredentialStore;
use crate::types::TokenResponse;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// A token this close to expiry is treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Delegated access for one account, in the provider's "authorized user" JSON shape.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl Credential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }

    /// An empty stored scope list is accepted as covering anything.
    pub fn covers(&self, scopes: &[String]) -> bool {
        self.scopes.is_empty() || scopes.iter().all(|s| self.scopes.contains(s))
    }

    pub fn is_valid(&self, scopes: &[String], now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && !self.is_expired(now) && self.covers(scopes)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Exchanges a refresh token for a new access token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, credential: &Credential) -> Result<Credential, TransportError>;
}

/// Refresh grant against the credential's own token endpoint.
pub struct HttpRefresher {
    http: reqwest::Client,
}

impl HttpRefresher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self, credential: &Credential) -> Result<Credential, TransportError> {
        let refresh_token = credential.refresh_token.clone().unwrap_or_default();
        let params = [
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&credential.token_uri)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status { status, body });
        }
        let token: TokenResponse = serde_json::from_str(&body)?;

        let expiry = match token.expires_in {
            Some(secs) => Some(
                Duration::try_seconds(secs)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        TransportError::InvalidResponse(format!("expires_in out of range: {}", secs))
                    })?,
            ),
            None => None,
        };

        let mut refreshed = credential.clone();
        refreshed.token = token.access_token;
        refreshed.expiry = expiry;
        if let Some(rotated) = token.refresh_token {
            refreshed.refresh_token = Some(rotated);
        }
        if let Some(scope) = token.scope {
            refreshed.scopes = scope.split_whitespace().map(str::to_string).collect();
        }
        Ok(refreshed)
    }
}

/// Interactive user consent producing a brand new credential.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    async fn authorize(
        &self,
        secret: ApplicationSecret,
        scopes: &[String],
    ) -> Result<Credential, Error>;
}

/// Installed-application flow: opens the consent page and receives the
/// authorization code on a loopback redirect.
pub struct InstalledFlow {
    redirect_port: Option<u16>,
}

impl InstalledFlow {
    pub fn new(redirect_port: Option<u16>) -> Self {
        Self { redirect_port }
    }
}

/// Token storage that keeps whatever the flow issues so the refresh token
/// can be persisted in our own format.
#[derive(Clone, Default)]
struct CapturedToken(Arc<Mutex<Option<TokenInfo>>>);

impl CapturedToken {
    fn take(&self) -> Option<TokenInfo> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[async_trait]
impl TokenStorage for CapturedToken {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> anyhow::Result<()> {
        let mut slot = self
            .0
            .lock()
            .map_err(|_| anyhow::anyhow!("token capture poisoned"))?;
        *slot = Some(token);
        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        None
    }
}

fn to_chrono(at: time::OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(at.unix_timestamp(), at.nanosecond())
}

#[async_trait]
impl ConsentFlow for InstalledFlow {
    async fn authorize(
        &self,
        secret: ApplicationSecret,
        scopes: &[String],
    ) -> Result<Credential, Error> {
        let return_method = match self.redirect_port {
            Some(port) => InstalledFlowReturnMethod::HTTPPortRedirect(port),
            None => InstalledFlowReturnMethod::HTTPRedirect,
        };
        let captured = CapturedToken::default();

        let auth = InstalledFlowAuthenticator::builder(secret.clone(), return_method)
            .with_storage(Box::new(captured.clone()))
            .build()
            .await
            .map_err(|e| Error::Auth(format!("cannot start consent flow: {}", e)))?;

        let scope_refs: Vec<&str> = scopes.iter().map(|s| s.as_str()).collect();
        let access = auth
            .token(&scope_refs)
            .await
            .map_err(|e| Error::Auth(format!("consent flow failed: {}", e)))?;

        let (token, refresh_token, expiry) = match captured.take() {
            Some(info) => (
                info.access_token.unwrap_or_default(),
                info.refresh_token,
                info.expires_at.and_then(to_chrono),
            ),
            None => (
                access.token().unwrap_or("").to_string(),
                None,
                access.expiration_time().and_then(to_chrono),
            ),
        };

        if token.is_empty() {
            return Err(Error::Auth("consent flow issued no access token".into()));
        }
        if refresh_token.is_none() {
            warn!(
                "Consent flow issued no refresh token; revoke the app's access and re-run to get one"
            );
        }

        Ok(Credential {
            token,
            refresh_token,
            token_uri: secret.token_uri,
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            scopes: scopes.to_vec(),
            expiry,
        })
    }
}

// Helper function to load the client secret
pub async fn load_client_secret(path: &Path) -> Result<ApplicationSecret, Error> {
    yup_oauth2::read_application_secret(path)
        .await
        .map_err(|source| Error::ConfigMissing {
            path: path.to_path_buf(),
            source,
        })
}

/// Obtains a usable credential: stored, refreshed, or newly consented.
pub struct CredentialManager<S, R, F> {
    store: S,
    refresher: R,
    consent: F,
    client_secret_path: PathBuf,
    scopes: Vec<String>,
    interactive: bool,
}

impl<S, R, F> CredentialManager<S, R, F>
where
    S: CredentialStore,
    R: TokenRefresher,
    F: ConsentFlow,
{
    pub fn new(config: &Config, store: S, refresher: R, consent: F) -> Self {
        Self {
            store,
            refresher,
            consent,
            client_secret_path: config.client_secret_path.clone(),
            scopes: config.scopes.clone(),
            interactive: config.interactive,
        }
    }

    pub async fn obtain(&self) -> Result<Credential, Error> {
        let stored = match self.store.load().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Ignoring unreadable stored credential: {}", e);
                None
            }
        };

        if let Some(credential) = stored {
            if credential.is_valid(&self.scopes, Utc::now()) {
                debug!("Using stored credential for {}", credential.client_id);
                return Ok(credential);
            }

            if credential.covers(&self.scopes) && credential.can_refresh() {
                info!("Stored access token expired, refreshing");
                match self.refresher.refresh(&credential).await {
                    Ok(refreshed) => {
                        self.persist(&refreshed).await;
                        return Ok(refreshed);
                    }
                    Err(e) => warn!("Token refresh failed, falling back to consent: {}", e),
                }
            } else {
                info!("Stored credential is not usable, re-authenticating");
            }
        }

        let secret = load_client_secret(&self.client_secret_path).await?;
        if !self.interactive {
            return Err(Error::Auth(
                "no usable stored credential and interactive consent is disabled".into(),
            ));
        }

        info!("Starting browser consent flow");
        let credential = self.consent.authorize(secret, &self.scopes).await?;
        self.persist(&credential).await;
        Ok(credential)
    }

    async fn persist(&self, credential: &Credential) {
        if let Err(e) = self.store.save(credential).await {
            warn!("Failed to save credential: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::gmail_api::store::MockCredentialStore;
    use std::io::Write;

    const SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

    fn credential(expiry: DateTime<Utc>, refresh: Option<&str>) -> Credential {
        Credential {
            token: "access-old".to_string(),
            refresh_token: refresh.map(str::to_string),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            client_id: "client-1".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec![SCOPE.to_string()],
            expiry: Some(expiry),
        }
    }

    fn config(secret_path: PathBuf) -> Config {
        Config {
            client_secret_path: secret_path,
            ..Config::default()
        }
    }

    fn write_secret(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("credentials.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"installed": {{"client_id": "client-1", "client_secret": "secret",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "redirect_uris": ["http://localhost"]}}}}"#
        )
        .unwrap();
        path
    }

    fn no_refresh() -> MockTokenRefresher {
        let mut refresher = MockTokenRefresher::new();
        refresher.expect_refresh().times(0);
        refresher
    }

    fn no_consent() -> MockConsentFlow {
        let mut consent = MockConsentFlow::new();
        consent.expect_authorize().times(0);
        consent
    }

    #[tokio::test]
    async fn test_valid_stored_credential_is_returned_unchanged() {
        let stored = credential(Utc::now() + Duration::hours(1), Some("refresh"));
        let returned = stored.clone();

        let mut store = MockCredentialStore::new();
        store
            .expect_load()
            .times(1)
            .returning(move || Ok(Some(returned.clone())));
        store.expect_save().times(0);

        let manager = CredentialManager::new(
            &config(PathBuf::from("/nonexistent/credentials.json")),
            store,
            no_refresh(),
            no_consent(),
        );
        assert_eq!(manager.obtain().await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_expired_credential_is_refreshed_and_saved() {
        let old_expiry = Utc::now() - Duration::minutes(5);
        let stored = credential(old_expiry, Some("refresh"));

        let mut store = MockCredentialStore::new();
        let loaded = stored.clone();
        store
            .expect_load()
            .returning(move || Ok(Some(loaded.clone())));
        store
            .expect_save()
            .withf(|c| c.token == "access-new")
            .times(1)
            .returning(|_| Ok(()));

        let mut refresher = MockTokenRefresher::new();
        refresher.expect_refresh().times(1).returning(|c| {
            let mut refreshed = c.clone();
            refreshed.token = "access-new".to_string();
            refreshed.expiry = Some(Utc::now() + Duration::hours(1));
            Ok(refreshed)
        });

        let manager = CredentialManager::new(
            &config(PathBuf::from("/nonexistent/credentials.json")),
            store,
            refresher,
            no_consent(),
        );
        let refreshed = manager.obtain().await.unwrap();
        assert_eq!(refreshed.client_id, stored.client_id);
        assert_eq!(refreshed.refresh_token, stored.refresh_token);
        assert!(refreshed.expiry.unwrap() > old_expiry);
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_consent() {
        let dir = tempfile::tempdir().unwrap();
        let secret_path = write_secret(&dir);

        let mut store = MockCredentialStore::new();
        store.expect_load().returning(|| {
            Ok(Some(credential(
                Utc::now() - Duration::minutes(5),
                Some("revoked"),
            )))
        });
        store.expect_save().times(1).returning(|_| Ok(()));

        let mut refresher = MockTokenRefresher::new();
        refresher.expect_refresh().times(1).returning(|_| {
            Err(TransportError::Status {
                status: reqwest::StatusCode::BAD_REQUEST,
                body: r#"{"error": "invalid_grant"}"#.to_string(),
            })
        });

        let mut consent = MockConsentFlow::new();
        consent
            .expect_authorize()
            .withf(|secret, scopes| {
                secret.client_id == "client-1" && scopes.len() == 1 && scopes[0] == SCOPE
            })
            .times(1)
            .returning(|_, _| {
                let mut fresh = credential(Utc::now() + Duration::hours(1), Some("new-refresh"));
                fresh.token = "access-consented".to_string();
                Ok(fresh)
            });

        let manager = CredentialManager::new(&config(secret_path), store, refresher, consent);
        assert_eq!(manager.obtain().await.unwrap().token, "access-consented");
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_runs_consent() {
        let dir = tempfile::tempdir().unwrap();
        let secret_path = write_secret(&dir);

        let mut store = MockCredentialStore::new();
        store
            .expect_load()
            .returning(|| Ok(Some(credential(Utc::now() - Duration::minutes(5), None))));
        store.expect_save().times(1).returning(|_| Ok(()));

        let mut consent = MockConsentFlow::new();
        consent
            .expect_authorize()
            .times(1)
            .returning(|_, _| Ok(credential(Utc::now() + Duration::hours(1), Some("r"))));

        let manager = CredentialManager::new(&config(secret_path), store, no_refresh(), consent);
        assert!(manager.obtain().await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_secret_without_credential_is_config_missing() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = MockCredentialStore::new();
        store.expect_load().returning(|| Ok(None));
        store.expect_save().times(0);

        let manager = CredentialManager::new(
            &config(dir.path().join("credentials.json")),
            store,
            no_refresh(),
            no_consent(),
        );
        assert!(matches!(
            manager.obtain().await,
            Err(Error::ConfigMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_interactive_without_credential_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let secret_path = write_secret(&dir);

        let mut store = MockCredentialStore::new();
        store.expect_load().returning(|| Ok(None));

        let config = Config {
            interactive: false,
            ..config(secret_path)
        };
        let manager = CredentialManager::new(&config, store, no_refresh(), no_consent());
        assert!(matches!(manager.obtain().await, Err(Error::Auth(_))));
    }

    #[tokio::test]
    async fn test_credential_missing_scope_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let secret_path = write_secret(&dir);

        let mut store = MockCredentialStore::new();
        store.expect_load().returning(|| {
            let mut narrow = credential(Utc::now() + Duration::hours(1), Some("refresh"));
            narrow.scopes = vec!["https://www.googleapis.com/auth/gmail.labels".to_string()];
            Ok(Some(narrow))
        });
        store.expect_save().times(1).returning(|_| Ok(()));

        let mut consent = MockConsentFlow::new();
        consent
            .expect_authorize()
            .times(1)
            .returning(|_, _| Ok(credential(Utc::now() + Duration::hours(1), Some("r"))));

        let manager = CredentialManager::new(&config(secret_path), store, no_refresh(), consent);
        assert_eq!(manager.obtain().await.unwrap().scopes, vec![SCOPE.to_string()]);
    }

    #[tokio::test]
    async fn test_unreadable_stored_credential_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let secret_path = write_secret(&dir);

        let mut store = MockCredentialStore::new();
        store.expect_load().times(1).returning(|| {
            Err(StoreError::Json(
                serde_json::from_str::<Credential>("not json").unwrap_err(),
            ))
        });
        store.expect_save().times(1).returning(|_| Ok(()));

        let mut consent = MockConsentFlow::new();
        consent
            .expect_authorize()
            .times(1)
            .returning(|_, _| Ok(credential(Utc::now() + Duration::hours(1), Some("r"))));

        let manager = CredentialManager::new(&config(secret_path), store, no_refresh(), consent);
        assert!(manager.obtain().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreadable_credential_without_secret_is_config_missing() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = MockCredentialStore::new();
        store.expect_load().returning(|| {
            Err(StoreError::Io(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            )))
        });
        store.expect_save().times(0);

        let manager = CredentialManager::new(
            &config(dir.path().join("credentials.json")),
            store,
            no_refresh(),
            no_consent(),
        );
        assert!(matches!(
            manager.obtain().await,
            Err(Error::ConfigMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_failure_still_returns_refreshed_credential() {
        let mut store = MockCredentialStore::new();
        store.expect_load().returning(|| {
            Ok(Some(credential(
                Utc::now() - Duration::minutes(5),
                Some("refresh"),
            )))
        });
        store.expect_save().times(1).returning(|_| {
            Err(StoreError::Io(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            )))
        });

        let mut refresher = MockTokenRefresher::new();
        refresher.expect_refresh().times(1).returning(|c| {
            let mut refreshed = c.clone();
            refreshed.token = "access-new".to_string();
            refreshed.expiry = Some(Utc::now() + Duration::hours(1));
            Ok(refreshed)
        });

        let manager = CredentialManager::new(
            &config(PathBuf::from("/nonexistent/credentials.json")),
            store,
            refresher,
            no_consent(),
        );
        assert_eq!(manager.obtain().await.unwrap().token, "access-new");
    }

    #[test]
    fn test_expiry_inside_skew_counts_as_expired() {
        let now = Utc::now();
        assert!(credential(now + Duration::seconds(30), None).is_expired(now));
        assert!(!credential(now + Duration::minutes(10), None).is_expired(now));

        let mut open_ended = credential(now, None);
        open_ended.expiry = None;
        assert!(open_ended.is_valid(&[SCOPE.to_string()], now));
    }
}
