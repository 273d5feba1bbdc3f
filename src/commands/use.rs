use anyhow::{Result, Context, anyhow};
use colored::Colorize;
use std::fs;
use std::path::Path;
use crate::config;
use crate::utils::{parse_version, Platform};

pub fn execute(version: &str) -> Result<()> {
    let dirs = config::get_dirs()?;
    let mut config = config::load_config()?;

    let actual_version = parse_version(version)?.to_string();
    let install_root = config::install_root(&dirs, &config);
    let version_dir = install_root.join(&actual_version);

    let installed = version_dir.join(Platform::current().node_executable()).is_file();
    if !installed {
        return Err(anyhow!("Node.js {} is not installed. Use 'node-depot install {}' first.",
                            actual_version, actual_version));
    }

    config.active_version = Some(actual_version.clone());
    config::save_config(&config)?;

    create_node_symlinks(&version_dir, &dirs.bin_dir)?;

    println!("Now using Node.js {}", actual_version.green());

    Ok(())
}

/// Points `node`, `npm` and `npx` in `bin_dir` at the given install.
pub fn create_node_symlinks(version_dir: &Path, bin_dir: &Path) -> Result<()> {
    let links: &[&str] = if cfg!(windows) {
        &["node.exe"]
    } else {
        &["node", "npm", "npx"]
    };
    let source_dir = if cfg!(windows) {
        version_dir.to_path_buf()
    } else {
        version_dir.join("bin")
    };

    fs::create_dir_all(bin_dir)?;

    for name in links {
        let source = source_dir.join(name);
        let link = bin_dir.join(name);

        if link.symlink_metadata().is_ok() {
            fs::remove_file(&link)
                .with_context(|| format!("Failed to remove {}", link.display()))?;
        }

        if !source.exists() {
            continue;
        }

        #[cfg(unix)]
        std::os::unix::fs::symlink(&source, &link)
            .with_context(|| format!("Failed to link {}", link.display()))?;

        #[cfg(windows)]
        std::os::windows::fs::symlink_file(&source, &link)
            .with_context(|| format!("Failed to link {}", link.display()))?;
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn links_replace_previous_version() {
        let temp = TempDir::new().unwrap();
        let bin_dir = temp.path().join("bin");
        for version in ["18.19.0", "20.11.0"] {
            let dir = temp.path().join(version).join("bin");
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("node"), version).unwrap();
        }

        create_node_symlinks(&temp.path().join("18.19.0"), &bin_dir).unwrap();
        create_node_symlinks(&temp.path().join("20.11.0"), &bin_dir).unwrap();

        assert_eq!(fs::read_to_string(bin_dir.join("node")).unwrap(), "20.11.0");
        assert!(bin_dir.join("npm").symlink_metadata().is_err());
    }
}
