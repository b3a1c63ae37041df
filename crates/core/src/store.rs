use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{info, warn};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::ConnConfig;

pub const STORE_VERSION: u32 = 1;
pub const STORE_FILE_NAME: &str = "connections.enc";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedConnection {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
    /// Seconds; zero keeps the driver default.
    #[serde(default)]
    pub timeout_secs: u64,
}

impl SavedConnection {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        driver: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: new_connection_id(),
            name: name.into(),
            driver: driver.into(),
            host: host.into(),
            port,
            username: String::new(),
            password: String::new(),
            database: String::new(),
            timeout_secs: 0,
        }
    }

    #[must_use]
    pub fn conn_config(&self) -> ConnConfig {
        ConnConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[must_use]
pub fn new_connection_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreDocument {
    pub version: u32,
    #[serde(default)]
    pub connections: Vec<SavedConnection>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            connections: Vec::new(),
        }
    }
}

/// Argon2id cost parameters, kept in the envelope so a file stays readable
/// if the defaults change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19_456,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    salt: String,
    nonce: String,
    kdf: KdfParams,
    data: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read connection store at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse connection store at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize connection store: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to create config directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write connection store at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to derive encryption key: {0}")]
    KeyDerivation(String),
    #[error("failed to decrypt {path} (wrong password or corrupt file)")]
    Decrypt { path: PathBuf },
    #[error("failed to encrypt connection store")]
    Encrypt,
    #[error("connection store has not been loaded")]
    NotLoaded,
    #[error("connection not found: {0}")]
    NotFound(String),
    #[error("unsupported connection store version {0}")]
    UnsupportedVersion(u32),
}

/// Persistence for saved connections. Mutations are written through
/// immediately.
pub trait ConnectionStore: Send {
    fn load(&mut self) -> Result<&StoreDocument, StoreError>;

    fn save(&mut self) -> Result<(), StoreError>;

    fn add(&mut self, connection: SavedConnection) -> Result<(), StoreError>;

    fn update(&mut self, connection: SavedConnection) -> Result<(), StoreError>;

    fn delete(&mut self, id: &str) -> Result<(), StoreError>;

    fn list(&self) -> &[SavedConnection];

    /// Re-encrypts the store under a new master password.
    fn change_password(&mut self, password: &str) -> Result<(), StoreError>;
}

#[derive(Clone)]
struct DerivedKey {
    salt: [u8; SALT_LEN],
    key: [u8; KEY_LEN],
}

/// Connection store encrypted with a key derived from the master password.
pub struct EncryptedFileStore {
    path: PathBuf,
    password: String,
    kdf: KdfParams,
    derived: Option<DerivedKey>,
    document: Option<StoreDocument>,
}

impl std::fmt::Debug for EncryptedFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStore")
            .field("path", &self.path)
            .field("kdf", &self.kdf)
            .field("loaded", &self.document.is_some())
            .finish_non_exhaustive()
    }
}

impl EncryptedFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            password: password.into(),
            kdf: KdfParams::default(),
            derived: None,
            document: None,
        }
    }

    /// Cost parameters used when a new key is derived. Existing files keep
    /// the parameters recorded in their envelope.
    #[must_use]
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Applies `change` to the loaded document and writes it out. The
    /// previous document is put back if either step fails, so memory never
    /// runs ahead of the file.
    fn commit(
        &mut self,
        change: impl FnOnce(&mut StoreDocument) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let Some(document) = self.document.as_mut() else {
            return Err(StoreError::NotLoaded);
        };
        let snapshot = document.clone();
        let mut result = change(document);
        if result.is_ok() {
            result = self.save();
        }
        if let Err(err) = &result {
            warn!("rolled back store change for {}: {err}", self.path.display());
            self.document = Some(snapshot);
        }
        result
    }

    fn decrypt_file(&self, raw: &str) -> Result<(StoreDocument, KdfParams, DerivedKey), StoreError> {
        let envelope: Envelope =
            serde_json::from_str(raw).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;
        if envelope.version != STORE_VERSION {
            return Err(StoreError::UnsupportedVersion(envelope.version));
        }

        let corrupt = || StoreError::Decrypt {
            path: self.path.clone(),
        };
        let salt: [u8; SALT_LEN] = STANDARD
            .decode(&envelope.salt)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(corrupt)?;
        let nonce: [u8; NONCE_LEN] = STANDARD
            .decode(&envelope.nonce)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(corrupt)?;
        let data = STANDARD.decode(&envelope.data).map_err(|_| corrupt())?;

        let key = derive_key(&self.password, &salt, envelope.kdf)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| corrupt())?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), data.as_ref())
            .map_err(|_| corrupt())?;

        let document: StoreDocument =
            serde_json::from_slice(&plaintext).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;
        if document.version != STORE_VERSION {
            return Err(StoreError::UnsupportedVersion(document.version));
        }

        Ok((document, envelope.kdf, DerivedKey { salt, key }))
    }

    fn fresh_key(&self) -> Result<DerivedKey, StoreError> {
        let mut salt = [0_u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let key = derive_key(&self.password, &salt, self.kdf)?;
        Ok(DerivedKey { salt, key })
    }

    fn write_envelope(&self, envelope: &Envelope) -> Result<(), StoreError> {
        if let Some(parent_dir) = self.path.parent() {
            fs::create_dir_all(parent_dir).map_err(|source| StoreError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let rendered = serde_json::to_string_pretty(envelope)
            .map_err(|source| StoreError::Serialize { source })?;
        fs::write(&self.path, rendered).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        restrict_permissions(&self.path);
        Ok(())
    }
}

impl ConnectionStore for EncryptedFileStore {
    fn load(&mut self) -> Result<&StoreDocument, StoreError> {
        if !self.path.exists() {
            self.derived = None;
            return Ok(self.document.insert(StoreDocument::default()));
        }

        let raw = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        let (document, kdf, derived) = self.decrypt_file(&raw).inspect_err(|err| {
            warn!("could not unlock {}: {err}", self.path.display());
        })?;
        info!(
            "loaded {} saved connection(s) from {}",
            document.connections.len(),
            self.path.display()
        );

        self.kdf = kdf;
        self.derived = Some(derived);
        Ok(self.document.insert(document))
    }

    fn save(&mut self) -> Result<(), StoreError> {
        let document = self.document.as_mut().ok_or(StoreError::NotLoaded)?;
        document.version = STORE_VERSION;
        let plaintext =
            serde_json::to_vec(document).map_err(|source| StoreError::Serialize { source })?;

        if self.derived.is_none() {
            self.derived = Some(self.fresh_key()?);
        }
        let derived = self.derived.clone().ok_or(StoreError::Encrypt)?;

        let mut nonce = [0_u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let cipher = Aes256Gcm::new_from_slice(&derived.key).map_err(|_| StoreError::Encrypt)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
            .map_err(|_| StoreError::Encrypt)?;

        self.write_envelope(&Envelope {
            version: STORE_VERSION,
            salt: STANDARD.encode(derived.salt),
            nonce: STANDARD.encode(nonce),
            kdf: self.kdf,
            data: STANDARD.encode(ciphertext),
        })
    }

    fn add(&mut self, connection: SavedConnection) -> Result<(), StoreError> {
        self.commit(|document| {
            document.connections.push(connection);
            Ok(())
        })
    }

    fn update(&mut self, connection: SavedConnection) -> Result<(), StoreError> {
        self.commit(|document| {
            let existing = document
                .connections
                .iter_mut()
                .find(|existing| existing.id == connection.id)
                .ok_or_else(|| StoreError::NotFound(connection.id.clone()))?;
            *existing = connection;
            Ok(())
        })
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.commit(|document| {
            let original_len = document.connections.len();
            document.connections.retain(|connection| connection.id != id);
            if document.connections.len() == original_len {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }

    fn list(&self) -> &[SavedConnection] {
        self.document
            .as_ref()
            .map_or(&[], |document| document.connections.as_slice())
    }

    fn change_password(&mut self, password: &str) -> Result<(), StoreError> {
        if self.document.is_none() {
            return Err(StoreError::NotLoaded);
        }
        let previous_password = std::mem::replace(&mut self.password, password.to_string());
        let previous_key = self.derived.take();
        let rekeyed = self.fresh_key().and_then(|derived| {
            self.derived = Some(derived);
            self.save()
        });
        if let Err(err) = rekeyed {
            self.password = previous_password;
            self.derived = previous_key;
            return Err(err);
        }
        info!("re-encrypted {} under a new master password", self.path.display());
        Ok(())
    }
}

fn derive_key(
    password: &str,
    salt: &[u8],
    kdf: KdfParams,
) -> Result<[u8; KEY_LEN], StoreError> {
    let params = Params::new(kdf.m_cost, kdf.t_cost, kdf.p_cost, Some(KEY_LEN))
        .map_err(|err| StoreError::KeyDerivation(err.to_string()))?;
    let mut key = [0_u8; KEY_LEN];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|err| StoreError::KeyDerivation(err.to_string()))?;
    Ok(key)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!("could not restrict permissions on {}: {err}", path.display());
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
