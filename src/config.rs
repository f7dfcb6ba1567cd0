use std::path::PathBuf;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub statistics: StatisticsConfig,
    pub refresh: RefreshConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub file_name: String,
}

impl StorageConfig {
    /// Full path of the state document.
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_name: "state.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatisticsConfig {
    pub default_range_days: u32,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            default_range_days: 7,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    /// How often `watch` re-reads the state, like the home screen widget.
    pub watch_interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            watch_interval_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vape-tracker")
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vape-tracker");

        let builder = Config::builder()
            // 1. Load default values
            // Storage
            .set_default(
                "storage.data_dir",
                default_data_dir().to_string_lossy().to_string(),
            )?
            .set_default("storage.file_name", "state.json")?
            // Statistics
            .set_default("statistics.default_range_days", 7)?
            // Refresh
            .set_default("refresh.watch_interval_secs", 60)?
            // Export
            .set_default("export.output_dir", ".")?

            // 2. ./config.toml next to the binary's working directory
            .add_source(File::from(PathBuf::from("config.toml")).required(false))

            // 3. <config dir>/vape-tracker/config.toml
            .add_source(File::from(config_dir.join("config.toml")).required(false))

            // 4. Load from Environment variables (VAPE__STORAGE__DATA_DIR=...)
            .add_source(Environment::with_prefix("VAPE").separator("__"));

        let s = builder.build()?;
        Ok(s.try_deserialize()?)
    }
}
