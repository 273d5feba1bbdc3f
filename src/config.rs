use directories::ProjectDirs;
use std::path::PathBuf;
use std::fs;
use anyhow::{Result, Context};
use serde::{Serialize, Deserialize};

use crate::utils::Proxy;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    pub active_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Proxy>,

    /// Overrides the `versions` directory under the data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,
}

pub struct DepotDirs {
    pub config_dir: PathBuf,
    pub versions_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub index_file: PathBuf,
}

impl DepotDirs {
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }
}

pub fn get_dirs() -> Result<DepotDirs> {
    let project_dirs = ProjectDirs::from("com", "node-depot", "node-depot")
        .context("Failed to determine project directories")?;

    let config_dir = project_dirs.config_dir().to_path_buf();
    let data_dir = project_dirs.data_dir().to_path_buf();

    let dirs = DepotDirs {
        versions_dir: data_dir.join("versions"),
        bin_dir: data_dir.join("bin"),
        index_file: data_dir.join("versions.json"),
        config_dir,
    };

    fs::create_dir_all(&dirs.config_dir)
        .with_context(|| format!("Failed to create {}", dirs.config_dir.display()))?;
    fs::create_dir_all(&dirs.bin_dir)
        .with_context(|| format!("Failed to create {}", dirs.bin_dir.display()))?;

    Ok(dirs)
}

/// Where versions are installed: `install_dir` from the config, or the
/// `versions` directory.
pub fn install_root(dirs: &DepotDirs, config: &Config) -> PathBuf {
    config
        .install_dir
        .clone()
        .unwrap_or_else(|| dirs.versions_dir.clone())
}

pub fn load_config() -> Result<Config> {
    let dirs = get_dirs()?;
    let config_path = dirs.config_file();

    if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;
        Ok(config)
    } else {
        let config = Config::default();
        save_config(&config)?;
        Ok(config)
    }
}

pub fn save_config(config: &Config) -> Result<()> {
    let dirs = get_dirs()?;
    let config_path = dirs.config_file();

    let content = serde_json::to_string_pretty(config)?;
    fs::write(&config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    Ok(())
}
