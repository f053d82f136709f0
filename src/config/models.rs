use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transform: TransformConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Largest accepted upload request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

fn default_max_upload_bytes() -> ByteSize {
    ByteSize(10 * 1024 * 1024) // 10 MB
}

/// Worker pool sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolSettings {
    /// Maximum concurrent transforms
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Jobs that may wait for a worker before uploads are refused with 503
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_pool_size() -> usize {
    5
}

fn default_queue_capacity() -> usize {
    64
}

/// Notification hub configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HubConfig {
    /// Maximum buffered messages per subscriber
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

fn default_queue_depth() -> usize {
    16
}

fn default_write_timeout_secs() -> u64 {
    5
}

/// Artifact storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Artifact lifetime
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Periodic sweep interval, in addition to the sweep after each save
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            ttl_seconds: default_ttl_seconds(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_ttl_seconds() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Transform targets
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformConfig {
    /// Target used when an upload names no dimensions
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Largest target an upload may request
    #[serde(default = "default_max_side")]
    pub max_width: u32,
    #[serde(default = "default_max_side")]
    pub max_height: u32,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            max_width: default_max_side(),
            max_height: default_max_side(),
        }
    }
}

fn default_width() -> u32 {
    300
}

fn default_height() -> u32 {
    200
}

fn default_max_side() -> u32 {
    4096
}
