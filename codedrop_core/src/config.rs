use crate::transfer::constants::{DEFAULT_TRANSFER_TTL_SECS, MAX_UPLOAD_SIZE};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "codedrop";
const APP_NAME: &str = "codedrop";
const CONFIG_FILE: &str = "config.json";
const METADATA_FILE: &str = "metadata.json";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Expired transfers are swept hourly unless configured otherwise
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Root for message/upload blobs and the metadata file
    pub data_dir: PathBuf,
    /// Web UI served for every non-API path, if set
    pub static_dir: Option<PathBuf>,
    pub max_upload_bytes: u64,
    pub transfer_ttl_secs: u64,
    /// 0 disables the background sweeper
    pub sweep_interval_secs: u64,
    /// Allow any origin to call the API
    pub permissive_cors: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            data_dir: get_data_dir(),
            static_dir: None,
            max_upload_bytes: MAX_UPLOAD_SIZE,
            transfer_ttl_secs: DEFAULT_TRANSFER_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            permissive_cors: false,
        }
    }
}

impl AppConfig {
    /// Get the config file path
    fn get_config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("CODEDROP_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join(CONFIG_FILE));
        }

        get_config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Load config from disk, then apply `CODEDROP_*` environment overrides
    pub fn load() -> Self {
        let mut config = match Self::get_config_path() {
            Some(path) => Self::from_file(&path),
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Read a config file, falling back to defaults if it is missing or malformed
    pub fn from_file(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "CODEDROP_BIND", &mut self.bind_addr);
        override_parsed(&lookup, "CODEDROP_DATA_DIR", &mut self.data_dir);
        override_parsed(&lookup, "CODEDROP_MAX_UPLOAD_BYTES", &mut self.max_upload_bytes);
        override_parsed(&lookup, "CODEDROP_TTL_SECS", &mut self.transfer_ttl_secs);
        override_parsed(&lookup, "CODEDROP_SWEEP_SECS", &mut self.sweep_interval_secs);

        if let Some(dir) = lookup("CODEDROP_STATIC_DIR") {
            self.static_dir = (!dir.trim().is_empty()).then(|| PathBuf::from(dir));
        }

        if let Some(value) = lookup("CODEDROP_CORS") {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.permissive_cors = true,
                "0" | "false" | "no" | "off" => self.permissive_cors = false,
                _ => tracing::warn!("Ignoring CODEDROP_CORS={:?}", value),
            }
        }
    }

    pub fn transfer_ttl(&self) -> Duration {
        Duration::from_secs(self.transfer_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// Location of the transfer metadata file
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join("data").join(METADATA_FILE)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!("Ignoring unparsable {}={:?}", key, raw),
    }
}

/// Get the config directory path for this app
pub fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default data directory: the platform data dir, or `./data`
pub fn get_data_dir() -> PathBuf {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}
