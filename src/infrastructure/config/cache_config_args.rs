//! `clap`-derived CLI configuration, converted into a
//! `domain::engine::CacheConfig`.

use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::domain::engine::CacheConfig;

/// Log verbosity, mirrored onto a `tracing::Level`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to a `tracing::Level`.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// CLI/env configuration for the `cache-probe` demo binary.
#[derive(Debug, Parser)]
#[command(
    name = "cache-probe",
    version,
    about = "Exercises the pixelcache engine against real URLs",
    long_about = None
)]
pub struct CacheConfigArgs {
    /// Soft RAM budget in bytes (compressed + decoded).
    #[arg(long, env = "PIXELCACHE_RAM_BUDGET", default_value_t = 256 * 1024 * 1024)]
    pub ram_bytes_budget: u64,

    /// Soft video-memory budget in bytes (decoded, across all sizes).
    #[arg(long, env = "PIXELCACHE_VIDEO_BUDGET", default_value_t = 256 * 1024 * 1024)]
    pub video_bytes_budget: u64,

    /// Maximum concurrent Loaders.
    #[arg(long, env = "PIXELCACHE_LOADERS_MAX", default_value_t = 16)]
    pub loaders_max: usize,

    /// Per-fetch timeout in seconds.
    #[arg(long, env = "PIXELCACHE_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Log verbosity level.
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Source URLs to request against a demo bucket.
    #[arg(required = true)]
    pub urls: Vec<String>,
}

impl CacheConfigArgs {
    /// Converts the parsed CLI arguments into the engine's `CacheConfig`.
    #[must_use]
    pub fn into_config(self) -> CacheConfig {
        CacheConfig {
            ram_bytes_budget: self.ram_bytes_budget,
            video_bytes_budget: self.video_bytes_budget,
            loaders_max: self.loaders_max,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}
