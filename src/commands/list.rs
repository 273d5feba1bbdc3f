use anyhow::{Result, Context};
use colored::Colorize;
use crate::config::{self, Config};
use crate::utils::index::ReleaseRecord;

const REMOTE_LIMIT: usize = 30;

pub async fn execute(remote: bool, refresh: bool) -> Result<()> {
    let dirs = config::get_dirs()?;
    let config = config::load_config()?;
    let cache = super::version_cache(&dirs, &config, None)?;

    let mut installed = cache
        .installed(true)
        .await
        .context("Failed to read installed versions")?;
    crate::utils::installed::sort_newest_first(&mut installed);

    if remote {
        println!("Fetching available Node.js versions...");
        let index = cache
            .list(refresh)
            .await
            .context("Failed to fetch available Node.js versions")?;

        if index.is_empty() {
            println!("No available versions found");
            return Ok(());
        }

        println!("\nAvailable Node.js versions:");
        for record in index.records().iter().take(REMOTE_LIMIT) {
            println!("{}", remote_line(record, &installed, &config));
        }
        if index.len() > REMOTE_LIMIT {
            println!("  ... and {} more", index.len() - REMOTE_LIMIT);
        }
    } else {
        println!("Installed Node.js versions:");

        if installed.is_empty() {
            println!("  No versions installed");
            return Ok(());
        }

        for version in &installed {
            if config.active_version.as_deref() == Some(version.as_str()) {
                println!("* {} (current)", version.green());
            } else {
                println!("  {}", version);
            }
        }
    }

    Ok(())
}

fn remote_line(record: &ReleaseRecord, installed: &[String], config: &Config) -> String {
    let version = record.bare_version();
    let lts = record
        .lts
        .codename()
        .map(|name| format!(" LTS {}", name).bright_blue().to_string())
        .unwrap_or_default();
    let is_installed = installed.iter().any(|v| v == version);
    let is_current = config.active_version.as_deref() == Some(version);

    match (is_installed, is_current) {
        (true, true) => format!("* {}{} (installed, current)", version.green(), lts),
        (true, false) => format!("* {}{} (installed)", version.yellow(), lts),
        _ => format!("  {}{}", version, lts),
    }
}
