// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Accelerated (NVENC) workers
    #[serde(default = "default_gpu_workers")]
    pub gpu_workers: u32,

    /// Software (libx264) workers
    #[serde(default)]
    pub cpu_workers: u32,

    /// Decoder threads for software encodes
    #[serde(default = "default_cpu_threads")]
    pub cpu_threads: u32,

    /// Filter threads for accelerated encodes when the budget is bypassed
    #[serde(default = "default_gpu_filter_threads")]
    pub gpu_filter_threads: u32,

    /// Total CPU threads shared by accelerated workers for decode/scale
    #[serde(default = "default_cpu_budget_for_gpu")]
    pub cpu_budget_for_gpu: u32,

    /// Try NVDEC + scale_cuda
    #[serde(default)]
    pub gpu_decode: bool,

    /// Status refresh interval in seconds (clamped to 0.2..=2.0)
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: f64,

    /// Directory for per-attempt logs and the tool's own log
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Build 720p from the finished 1080p version
    #[serde(default = "default_true_config")]
    pub cascade: bool,

    /// Re-encode even when an optimized version exists
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Print plain frames instead of the full-screen board
    #[serde(default)]
    pub plain: bool,
}

fn default_gpu_workers() -> u32 {
    2
}

fn default_cpu_threads() -> u32 {
    5
}

fn default_gpu_filter_threads() -> u32 {
    1
}

fn default_cpu_budget_for_gpu() -> u32 {
    10
}

fn default_refresh_secs() -> f64 {
    1.0
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("encode-logs")
}

fn default_true_config() -> bool {
    true
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            gpu_workers: default_gpu_workers(),
            cpu_workers: 0,
            cpu_threads: default_cpu_threads(),
            gpu_filter_threads: default_gpu_filter_threads(),
            cpu_budget_for_gpu: default_cpu_budget_for_gpu(),
            gpu_decode: false,
            refresh_secs: default_refresh_secs(),
            log_dir: default_log_dir(),
            cascade: true,
            overwrite: false,
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("plexopt")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("plexopt")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from the default location, creating it with defaults if missing
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_or_create(&path)
    }

    /// Load config from `path`, or write defaults there if it doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            let config = Config::default();

            // A read-only config dir should not stop a run
            if let Err(e) = config.save_to(path) {
                tracing::warn!(
                    path = %path.display(),
                    error = %format!("{:#}", e),
                    "could not create default config"
                );
            }

            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}
