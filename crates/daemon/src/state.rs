//! On-disk node state: the `.peerdrive` directory inside the sync root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use iroh::SecretKey;
use serde::{Deserialize, Serialize};

use common::paths::{DATASTORE_DIR, PRIVATE_KEY_NAME};
use common::peer::{generate_secret_key, PeerAddr};
use common::sync::{ConfigError, SyncConfig};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const LOG_DIR_NAME: &str = "logs";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("sync root {0} does not exist or is not a directory")]
    MissingRoot(PathBuf),
    #[error("peerdrive is already initialized at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("peerdrive is not initialized at {0}, run `peerdrive init` first")]
    NotInitialized(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
    #[error("invalid sync config: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("discovery interval must be greater than zero")]
    ZeroDiscoveryInterval,
    #[error("invalid key file: {0}")]
    InvalidKey(String),
}

/// Contents of `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// UDP port for the peer endpoint, ephemeral when unset
    pub peer_port: Option<u16>,
    /// Peers to dial, `<hex id>` or `<hex id>@<ip:port>`
    pub peers: Vec<PeerAddr>,
    #[serde(with = "humantime_serde")]
    pub discovery_interval: Duration,
    pub sync: SyncConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            peer_port: None,
            peers: Vec::new(),
            discovery_interval: Duration::from_secs(30),
            sync: SyncConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Directory being synced
    pub root: PathBuf,
    /// `<root>/.peerdrive`
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub key_path: PathBuf,
    pub log_dir: PathBuf,
    pub config: AppConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), StateError> {
        if self.discovery_interval.is_zero() {
            return Err(StateError::ZeroDiscoveryInterval);
        }
        self.sync.validate()?;
        Ok(())
    }
}

impl AppState {
    /// State directory for a sync root
    pub fn state_dir(root: &Path) -> PathBuf {
        root.join(DATASTORE_DIR)
    }

    fn paths(root: &Path) -> (PathBuf, PathBuf, PathBuf, PathBuf) {
        let state_dir = Self::state_dir(root);
        let config_path = state_dir.join(CONFIG_FILE_NAME);
        let key_path = state_dir.join(PRIVATE_KEY_NAME);
        let log_dir = state_dir.join(LOG_DIR_NAME);
        (state_dir, config_path, key_path, log_dir)
    }

    /// Create the state directory, config and a fresh key under `root`
    pub fn init(root: PathBuf, config: Option<AppConfig>) -> Result<Self, StateError> {
        if !root.is_dir() {
            return Err(StateError::MissingRoot(root));
        }
        let (state_dir, config_path, key_path, log_dir) = Self::paths(&root);
        if config_path.exists() {
            return Err(StateError::AlreadyInitialized(state_dir));
        }

        let config = config.unwrap_or_default();
        config.validate()?;

        fs::create_dir_all(&log_dir)?;
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;
        let key = generate_secret_key();
        fs::write(&key_path, hex::encode(key.to_bytes()))?;
        restrict_permissions(&key_path)?;

        tracing::info!("Initialized peerdrive at {}", state_dir.display());
        Ok(Self {
            root,
            state_dir,
            config_path,
            key_path,
            log_dir,
            config,
        })
    }

    /// Load existing state for `root`
    pub fn load(root: PathBuf) -> Result<Self, StateError> {
        if !root.is_dir() {
            return Err(StateError::MissingRoot(root));
        }
        let (state_dir, config_path, key_path, log_dir) = Self::paths(&root);
        if !config_path.exists() {
            return Err(StateError::NotInitialized(root));
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;
        config.validate()?;
        fs::create_dir_all(&log_dir)?;

        Ok(Self {
            root,
            state_dir,
            config_path,
            key_path,
            log_dir,
            config,
        })
    }

    pub fn load_key(&self) -> Result<SecretKey, StateError> {
        let contents = fs::read_to_string(&self.key_path)?;
        let bytes = hex::decode(contents.trim()).map_err(|e| StateError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| StateError::InvalidKey(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(SecretKey::from_bytes(&bytes))
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
