use std::path::{Path, PathBuf};

use async_trait::async_trait;
use keyring::Entry;
use log::debug;
use tokio::io::AsyncWriteExt;

use crate::config::{CredentialStoreKind, KEYRING_SERVICE_NAME, KEYRING_USERNAME};
use crate::error::StoreError;
use crate::gmail_api::auth::Credential;

/// Persistence for the credential between runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns `None` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<Credential>, StoreError>;
    async fn save(&self, credential: &Credential) -> Result<(), StoreError>;
    /// Removes the stored credential; clearing an empty store succeeds.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Credential kept as an "authorized user" JSON file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn load(&self) -> Result<Option<Credential>, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No credential file at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(credential)?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&self.path).await?;

        // mode() only applies on creation; tighten a file left by an older run
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600)).await?;
        }

        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// Define a trait for Keyring operations to allow mocking
#[cfg_attr(test, mockall::automock)]
pub trait KeyringEntry: Send + Sync {
    fn get_password(&self) -> Result<String, keyring::Error>;
    fn set_password(&self, password: &str) -> Result<(), keyring::Error>;
    fn delete_password(&self) -> Result<(), keyring::Error>;
}

// Implement the trait for the real keyring::Entry
impl KeyringEntry for Entry {
    fn get_password(&self) -> Result<String, keyring::Error> {
        self.get_password()
    }
    fn set_password(&self, password: &str) -> Result<(), keyring::Error> {
        self.set_password(password)
    }
    fn delete_password(&self) -> Result<(), keyring::Error> {
        self.delete_password()
    }
}

/// Credential kept as a JSON blob in the OS keyring.
pub struct KeyringStore<K: KeyringEntry = Entry> {
    entry: K,
}

impl KeyringStore<Entry> {
    pub fn open() -> Result<Self, StoreError> {
        Ok(Self {
            entry: Entry::new(KEYRING_SERVICE_NAME, KEYRING_USERNAME)?,
        })
    }
}

impl<K: KeyringEntry> KeyringStore<K> {
    pub fn with_entry(entry: K) -> Self {
        Self { entry }
    }
}

#[async_trait]
impl<K: KeyringEntry> CredentialStore for KeyringStore<K> {
    async fn load(&self) -> Result<Option<Credential>, StoreError> {
        match self.entry.get_password() {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let json = serde_json::to_string(credential)?;
        self.entry.set_password(&json)?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match self.entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The store selected by configuration.
pub enum StoreBackend {
    File(FileStore),
    Keyring(KeyringStore),
}

impl StoreBackend {
    pub fn from_kind(kind: &CredentialStoreKind) -> Result<Self, StoreError> {
        Ok(match kind {
            CredentialStoreKind::File(path) => StoreBackend::File(FileStore::new(path)),
            CredentialStoreKind::Keyring => StoreBackend::Keyring(KeyringStore::open()?),
        })
    }

    pub fn describe(&self) -> String {
        match self {
            StoreBackend::File(store) => store.path().display().to_string(),
            StoreBackend::Keyring(_) => format!("keyring entry {}", KEYRING_SERVICE_NAME),
        }
    }
}

#[async_trait]
impl CredentialStore for StoreBackend {
    async fn load(&self) -> Result<Option<Credential>, StoreError> {
        match self {
            StoreBackend::File(store) => store.load().await,
            StoreBackend::Keyring(store) => store.load().await,
        }
    }

    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        match self {
            StoreBackend::File(store) => store.save(credential).await,
            StoreBackend::Keyring(store) => store.save(credential).await,
        }
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match self {
            StoreBackend::File(store) => store.clear().await,
            StoreBackend::Keyring(store) => store.clear().await,
        }
    }
}
