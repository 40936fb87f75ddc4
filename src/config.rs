//! Server configuration from environment variables

use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5001";
const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Frontend build served for unmatched paths
    pub static_dir: PathBuf,
    /// JSON snapshot persisted on every write (None = in-memory only)
    pub data_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5001)),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            data_file: None,
        }
    }
}

impl ServerConfig {
    /// Load from BIND_ADDR, STATIC_DIR and DATA_FILE
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = match std::env::var("BIND_ADDR") {
            Ok(value) => value.trim().parse().unwrap_or_else(|e| {
                tracing::warn!(
                    "Invalid BIND_ADDR {:?} ({}), using {}",
                    value,
                    e,
                    DEFAULT_BIND_ADDR
                );
                defaults.bind_addr
            }),
            Err(_) => defaults.bind_addr,
        };

        let static_dir = non_empty_var("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);

        let data_file = non_empty_var("DATA_FILE").map(PathBuf::from);
        if data_file.is_none() {
            tracing::warn!("DATA_FILE not set, votes will be lost on restart");
        }

        Self {
            bind_addr,
            static_dir,
            data_file,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
