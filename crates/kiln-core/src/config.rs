//! Project configuration (kiln.toml).

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Configuration file structure (kiln.toml).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct KilnConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub styles: StylesConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Source root holding pages, scss, fonts, images and js
    #[serde(default = "default_source")]
    pub source: PathBuf,
    /// Distributable output root
    #[serde(default = "default_dist")]
    pub dist: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StylesConfig {
    /// Browserslist query used for vendor prefixing
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
    /// Emit `-ms-` grid prefixes
    #[serde(default = "default_true")]
    pub grid: bool,
    #[serde(default = "default_true")]
    pub minify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_avif_quality")]
    pub avif_quality: u8,
    #[serde(default = "default_lossy_quality")]
    pub webp_quality: u8,
    #[serde(default = "default_lossy_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_png_level")]
    pub png_level: u8,
    #[serde(default)]
    pub cache: CacheMode,
}

/// How the image task decides a destination is still fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Destination recorded against the source's content hash
    #[default]
    Hash,
    /// Destination modified no earlier than the source
    Mtime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptsConfig {
    #[serde(default = "default_true")]
    pub mangle: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub open: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_source() -> PathBuf {
    PathBuf::from("app")
}
fn default_dist() -> PathBuf {
    PathBuf::from("dist")
}
fn default_browsers() -> Vec<String> {
    vec!["last 10 versions".to_string()]
}
fn default_true() -> bool {
    true
}
fn default_avif_quality() -> u8 {
    50
}
fn default_lossy_quality() -> u8 {
    75
}
fn default_png_level() -> u8 {
    5
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_debounce_ms() -> u64 {
    150
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            dist: default_dist(),
        }
    }
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            browsers: default_browsers(),
            grid: true,
            minify: true,
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            avif_quality: default_avif_quality(),
            webp_quality: default_lossy_quality(),
            jpeg_quality: default_lossy_quality(),
            png_level: default_png_level(),
            cache: CacheMode::default(),
        }
    }
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self { mangle: true }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open: true,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl KilnConfig {
    /// Load configuration from `path` if it exists.
    /// Returns an error if the config file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }
}
