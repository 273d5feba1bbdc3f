use anyhow::{Result, Context, anyhow};
use colored::Colorize;
use tokio::fs;
use crate::config;
use crate::utils::installed::is_installed;
use crate::utils::{parse_version, Platform};

pub async fn execute(version: &str) -> Result<()> {
    let dirs = config::get_dirs()?;
    let config = config::load_config()?;

    let actual_version = parse_version(version)?.to_string();
    let install_root = config::install_root(&dirs, &config);

    if !is_installed(&install_root, &actual_version, &Platform::current()).await {
        return Err(anyhow!("Node.js {} is not installed", actual_version));
    }

    if config.active_version.as_deref() == Some(actual_version.as_str()) {
        return Err(anyhow!(
            "Cannot remove the active Node.js version. Switch to another version first."
        ));
    }

    let version_dir = install_root.join(&actual_version);
    fs::remove_dir_all(&version_dir)
        .await
        .with_context(|| format!("Failed to remove {}", version_dir.display()))?;

    println!("Successfully removed Node.js {}", actual_version.green());

    Ok(())
}
