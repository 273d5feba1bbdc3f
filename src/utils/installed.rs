use std::cmp::Ordering;
use std::io;
use std::path::Path;

use tokio::fs;

use super::platform::Platform;

/// Versions under `install_root` that have a runnable executable.
///
/// Directory listing order is kept; a missing root means nothing is
/// installed.
pub async fn scan(install_root: &Path, platform: &Platform) -> io::Result<Vec<String>> {
    let mut entries = match fs::read_dir(install_root).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut versions = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };

        if is_installed(install_root, &name, platform).await {
            versions.push(name);
        }
    }

    Ok(versions)
}

pub async fn is_installed(install_root: &Path, version: &str, platform: &Platform) -> bool {
    let node = install_root
        .join(version)
        .join(platform.node_executable());
    fs::metadata(&node)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Newest first by semver; names that are not versions go last.
pub fn sort_newest_first(versions: &mut [String]) {
    versions.sort_by(|a, b| {
        match (semver::Version::parse(a), semver::Version::parse(b)) {
            (Ok(a_ver), Ok(b_ver)) => a_ver.cmp(&b_ver).reverse(),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => a.cmp(b).reverse(),
        }
    });
}
