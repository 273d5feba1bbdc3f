pub mod install;
pub mod list;
pub mod remove;
pub mod r#use;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{self, Config, DepotDirs};
use crate::utils::{FetchOptions, HttpTransport, Platform, Timeouts, Transport, VersionCache};

/// Builds a transport for the mirror picked by, in order, `--mirror`, the
/// config file and the environment.
pub(crate) fn transport(
    mirror: Option<&str>,
    config: &Config,
    timeouts: Timeouts,
) -> Result<Arc<dyn Transport>> {
    let options = FetchOptions {
        mirror: mirror.map(str::to_string).or_else(|| config.mirror.clone()),
        proxy: config.proxy.clone(),
        timeouts,
    };

    let transport = HttpTransport::new(options).context("Failed to set up the HTTP client")?;
    Ok(Arc::new(transport))
}

pub(crate) fn version_cache(
    dirs: &DepotDirs,
    config: &Config,
    mirror: Option<&str>,
) -> Result<VersionCache> {
    Ok(VersionCache::new(
        transport(mirror, config, Timeouts::index())?,
        &dirs.index_file,
        config::install_root(dirs, config),
        Platform::current(),
    ))
}
