//! Node configuration loading and identity persistence.

use peerhttp_wire::{HostConfig, InvalidPeerId, Keypair};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Errors from reading or writing node state on disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("key file {path}: {source}")]
    InvalidKey {
        path: PathBuf,
        #[source]
        source: InvalidPeerId,
    },
}

/// Settings for a peerhttp node, read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address the peer host binds to.
    pub listen_addr: SocketAddr,
    /// Where the identity seed lives. Defaults to `identity.key` in
    /// [`default_config_dir`], wherever the config file itself was loaded from.
    pub key_file: Option<PathBuf>,
    /// Pre-shared key required from every peer.
    pub network_key: Option<String>,
    pub handshake_timeout_secs: u64,
    pub accept_backlog: usize,
    /// Deadline for a single request issued from the command line.
    pub request_timeout_secs: u64,
    /// Path prefix for outbound requests.
    pub path: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 4710)),
            key_file: None,
            network_key: None,
            handshake_timeout_secs: 10,
            accept_backlog: 64,
            request_timeout_secs: 30,
            path: "/".to_string(),
        }
    }
}

impl NodeConfig {
    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            listen_addr: self.listen_addr,
            network_key: self.network_key.clone(),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            accept_backlog: self.accept_backlog,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolved path of the identity seed file.
    pub fn key_path(&self) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| default_config_dir().join("identity.key"))
    }
}

/// `~/.peerhttp`, or a directory under the temp dir when there is no home.
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".peerhttp")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from `path`, or the default location.
///
/// A missing, unreadable or invalid file falls back to defaults with a log
/// line; loading never fails.
pub fn load_config(path: Option<&Path>) -> NodeConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return NodeConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(contents) => match toml::from_str::<NodeConfig>(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
                NodeConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            NodeConfig::default()
        }
    }
}

/// Read the identity seed at `path`, generating and saving a new one if the
/// file does not exist.
pub fn load_or_create_keypair(path: &Path) -> Result<Keypair, ConfigError> {
    if path.exists() {
        let seed = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        return Keypair::from_seed_hex(&seed).map_err(|source| ConfigError::InvalidKey {
            path: path.to_path_buf(),
            source,
        });
    }

    let keypair = Keypair::generate();
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, keypair.to_seed_hex()).map_err(write_err)?;
    info!(path = %path.display(), peer_id = %keypair.peer_id(), "Generated new identity");
    Ok(keypair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_missing_file() {
        let config = load_config(Some(Path::new("/nonexistent/config.toml")));
        assert_eq!(config, NodeConfig::default());
    }

    #[test]
    fn test_load_config_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            listen_addr = "0.0.0.0:9000"
            network_key = "secret"
            path = "/api"
            "#
        )
        .unwrap();

        let config = load_config(Some(file.path()));
        assert_eq!(config.listen_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.network_key.as_deref(), Some("secret"));
        assert_eq!(config.path, "/api");
        assert_eq!(config.accept_backlog, 64);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_config_invalid_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_addr = 42").unwrap();
        assert_eq!(load_config(Some(file.path())), NodeConfig::default());
    }

    #[test]
    fn test_config_round_trip() {
        let config = NodeConfig {
            key_file: Some(PathBuf::from("/tmp/id.key")),
            handshake_timeout_secs: 3,
            ..Default::default()
        };
        let text = toml::to_string(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.key_path(), PathBuf::from("/tmp/id.key"));
    }

    #[test]
    fn test_host_config_conversion() {
        let config = NodeConfig {
            network_key: Some("k".to_string()),
            accept_backlog: 8,
            ..Default::default()
        };
        let host = config.host_config();
        assert_eq!(host.listen_addr, config.listen_addr);
        assert_eq!(host.network_key.as_deref(), Some("k"));
        assert_eq!(host.handshake_timeout, Duration::from_secs(10));
        assert_eq!(host.accept_backlog, 8);
    }

    #[test]
    fn test_key_path_defaults_to_config_dir() {
        let config = NodeConfig::default();
        assert_eq!(config.key_path(), default_config_dir().join("identity.key"));

        // Loading from an explicit path does not move the key.
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "handshake_timeout_secs = 4").unwrap();
        let loaded = load_config(Some(file.path()));
        assert_eq!(loaded.key_path(), default_config_dir().join("identity.key"));

        let explicit = NodeConfig {
            key_file: Some(PathBuf::from("/srv/peer/id.key")),
            ..Default::default()
        };
        assert_eq!(explicit.key_path(), PathBuf::from("/srv/peer/id.key"));
    }

    #[test]
    fn test_keypair_created_then_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("identity.key");

        let first = load_or_create_keypair(&path).unwrap();
        assert!(path.exists());
        let second = load_or_create_keypair(&path).unwrap();
        assert_eq!(first.peer_id(), second.peer_id());
    }

    #[test]
    fn test_keypair_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.key");
        std::fs::write(&path, "not hex").unwrap();
        assert!(matches!(
            load_or_create_keypair(&path),
            Err(ConfigError::InvalidKey { .. })
        ));
    }
}
