use anyhow::{Result, Context, anyhow};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use semver::Version;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config;
use crate::utils::extract::Target;
use crate::utils::progress::Progress;
use crate::utils::{Arch, InstallRequest, Installer, Platform, Timeouts, VersionRequest};

pub struct InstallArgs {
    pub version: String,
    pub mirror: Option<String>,
    pub arch: Option<String>,
    pub refresh: bool,
}

pub async fn execute(args: InstallArgs) -> Result<()> {
    let dirs = config::get_dirs()?;
    let mut config = config::load_config()?;

    let arch = match args.arch.as_deref() {
        Some(name) => Arch::parse(name)?,
        None => Arch::current()?,
    };

    let version = match VersionRequest::parse(&args.version)? {
        VersionRequest::Exact(version) => version,
        request => {
            println!("Fetching {} Node.js version...", args.version);
            resolve(&request, &args, &dirs, &config).await?
        }
    };

    println!("Installing Node.js {}", version.to_string().green());

    let request = InstallRequest {
        target: Target {
            version,
            platform: Platform::current(),
            arch,
        },
        install_root: config::install_root(&dirs, &config),
        temp_root: None,
    };
    let session = format!("install-{}", request.target.version);

    let transport = super::transport(args.mirror.as_deref(), &config, Timeouts::artifact())?;
    let installer = Installer::new(transport);

    let interrupt = {
        let installer = installer.clone();
        let session = session.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupted, aborting {}", session);
                installer.abort(&session);
            }
        })
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let bar = tokio::spawn(show_progress(rx));

    let result = installer.download(&session, &request, Some(tx)).await;
    interrupt.abort();
    if let Ok(Some(bar)) = bar.await {
        settle(&bar, result.is_ok());
    }

    let installed = result?;
    println!(
        "Successfully installed Node.js {} to {}",
        installed.version.green(),
        installed.path.display()
    );

    if config.active_version.is_none() {
        println!("Setting Node.js {} as the default version", installed.version);
        config.active_version = Some(installed.version.clone());
        config::save_config(&config)?;

        super::r#use::create_node_symlinks(&installed.path, &dirs.bin_dir)?;
    }

    Ok(())
}

async fn resolve(
    request: &VersionRequest,
    args: &InstallArgs,
    dirs: &config::DepotDirs,
    config: &config::Config,
) -> Result<Version> {
    let cache = super::version_cache(dirs, config, args.mirror.as_deref())?;
    let index = cache
        .list(args.refresh)
        .await
        .context("Failed to fetch available Node.js versions")?;

    let record = index
        .resolve(request)
        .ok_or_else(|| anyhow!("No Node.js release matches {}", args.version))?;

    record
        .semver()
        .ok_or_else(|| anyhow!("Invalid version in release index: {}", record.version))
}

/// Follows the progress channel until the download drops its sender. The
/// bar is handed back unfinished so the caller can settle it by outcome.
async fn show_progress(mut rx: mpsc::UnboundedReceiver<Progress>) -> Option<ProgressBar> {
    show_progress_on(&mut rx, ProgressBar::new).await
}

async fn show_progress_on(
    rx: &mut mpsc::UnboundedReceiver<Progress>,
    create: impl Fn(u64) -> ProgressBar,
) -> Option<ProgressBar> {
    let mut bar: Option<ProgressBar> = None;

    while let Some(progress) = rx.recv().await {
        let bar = bar.get_or_insert_with(|| styled(create(progress.total)));
        bar.set_position(progress.transferred);
    }

    bar
}

fn settle(bar: &ProgressBar, succeeded: bool) {
    if succeeded {
        bar.finish_and_clear();
    } else {
        bar.abandon();
    }
}

fn styled(bar: ProgressBar) -> ProgressBar {
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}
