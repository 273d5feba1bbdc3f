//! Installs a single Node.js release into the install root.
//!
//! A directory named `<version>` under the install root is either a complete
//! install or absent. Everything is downloaded and unpacked into a fresh
//! temporary directory first and only moved into place once it is whole.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::fs;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::download::Transport;
use super::error::{FetchError, InstallError};
use super::extract::{download_runtime, select_strategy, Target, UnpackError};
use super::installed::is_installed;
use super::platform::Platform;
use super::progress::Progress;
use super::version::check_version;

#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub target: Target,
    pub install_root: PathBuf,
    /// Where the temporary download directory is created; the system
    /// temporary directory when unset.
    pub temp_root: Option<PathBuf>,
}

impl InstallRequest {
    pub fn version_path(&self) -> PathBuf {
        self.install_root.join(self.target.version_dir())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    pub version: String,
    pub path: PathBuf,
}

/// Downloads, verifies and installs `request.target`, returning where it
/// landed. Returns right away when the version is already installed.
pub async fn download(
    transport: Arc<dyn Transport>,
    request: &InstallRequest,
    cancel: &CancellationToken,
    progress: Option<UnboundedSender<Progress>>,
) -> Result<Installed, InstallError> {
    let target = &request.target;
    check_version(&target.version)?;

    let version = target.version_dir();
    let node_path = request.version_path();

    if is_installed(&request.install_root, &version, &target.platform).await {
        debug!("Node.js {} is already installed at {}", version, node_path.display());
        return Ok(Installed {
            version,
            path: node_path,
        });
    }

    // Dropping this future part way must still stop the transfer, or the
    // blocking unpacker waits on the body forever.
    let cancel = cancel.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let strategy = select_strategy(&target.platform, &target.version)?;
    let temp = allocate_temp_dir(request)?;
    debug!("Downloading Node.js {} into {}", version, temp.path().display());

    let result = async {
        let pending = download_runtime(
            strategy.as_ref(),
            Arc::clone(&transport),
            target,
            temp.path(),
            &cancel,
            progress,
        )
        .await
        .map_err(|err| classify(err, transport.mirror(), target))?;

        // Integrity problems only surface once everything else worked, so a
        // connectivity or platform error is never hidden behind them.
        if let Some(message) = pending.outcome().await {
            return Err(InstallError::Integrity(message));
        }

        promote(&temp.path().join(&version), &node_path, &request.install_root, &target.platform).await
    }
    .await;

    let temp_path = temp.path().to_path_buf();
    if let Err(err) = temp.close() {
        warn!("Failed to remove {}: {}", temp_path.display(), err);
    }

    result?;
    info!("Installed Node.js {} to {}", version, node_path.display());

    Ok(Installed {
        version,
        path: node_path,
    })
}

fn allocate_temp_dir(request: &InstallRequest) -> Result<TempDir, InstallError> {
    let prefix = format!(
        "node-depot-{}-{}-",
        request.target.version,
        request.target.arch_name()
    );
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix);

    match &request.temp_root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
    .map_err(|err| InstallError::io("Failed to create a temporary directory", err))
}

fn classify(err: UnpackError, mirror: &str, target: &Target) -> InstallError {
    let version = target.version_dir();

    match err {
        UnpackError::Fetch(FetchError::Connect { .. }) => InstallError::Connect {
            mirror: mirror.to_string(),
        },
        UnpackError::Fetch(FetchError::NotFound { .. }) => InstallError::NotFound {
            version,
            platform: target.platform.to_string(),
            arch: target.arch_name().to_string(),
        },
        UnpackError::Fetch(FetchError::Cancelled) => InstallError::Cancelled(version),
        UnpackError::Fetch(other) => InstallError::Download {
            version,
            reason: other.to_string(),
        },
        UnpackError::Io(err) => InstallError::Download {
            version,
            reason: err.to_string(),
        },
    }
}

/// Moves a finished install from the temporary directory into place.
///
/// Renames when possible. Across filesystems the tree is copied into a
/// staging directory next to the install root and renamed from there, so
/// `dest` still appears in one step.
async fn promote(
    source: &Path,
    dest: &Path,
    install_root: &Path,
    platform: &Platform,
) -> Result<(), InstallError> {
    fs::create_dir_all(install_root)
        .await
        .map_err(|err| InstallError::io_at("create", install_root, err))?;

    match fs::rename(source, dest).await {
        Ok(()) => return Ok(()),
        Err(err) if installed_by_someone_else(dest, platform).await => {
            debug!("{} appeared while downloading: {}", dest.display(), err);
            return Ok(());
        }
        Err(err) => debug!("Rename into {} failed, copying instead: {}", dest.display(), err),
    }

    let staging_root = install_root.parent().unwrap_or(install_root);
    promote_by_copy(source, dest, staging_root, platform).await
}

async fn promote_by_copy(
    source: &Path,
    dest: &Path,
    staging_root: &Path,
    platform: &Platform,
) -> Result<(), InstallError> {
    let staging = tempfile::Builder::new()
        .prefix(".node-depot-staging-")
        .tempdir_in(staging_root)
        .map_err(|err| InstallError::io_at("stage into", staging_root, err))?;

    let staged = staging.path().join("install");
    let copy_from = source.to_path_buf();
    let copy_to = staged.clone();
    tokio::task::spawn_blocking(move || copy_dir(&copy_from, &copy_to))
        .await
        .map_err(|err| InstallError::io("Failed to copy the install", io::Error::new(io::ErrorKind::Other, err)))?
        .map_err(|err| InstallError::io_at("copy into", dest, err))?;

    if let Err(err) = fs::rename(&staged, dest).await {
        if !installed_by_someone_else(dest, platform).await {
            return Err(InstallError::io_at("move into", dest, err));
        }
    }

    if let Err(err) = staging.close() {
        warn!("Failed to remove staging directory: {}", err);
    }

    Ok(())
}

async fn installed_by_someone_else(dest: &Path, platform: &Platform) -> bool {
    fs::metadata(dest.join(platform.node_executable()))
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::create_dir_all(to)?;

    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = to.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            copy_symlink(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(std::fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::copy(from, to).map(|_| ())
}

/// In-flight downloads keyed by a caller-chosen id.
#[derive(Debug, Clone, Default)]
pub struct Sessions {
    active: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, id: &str) -> Result<CancellationToken, InstallError> {
        let mut active = self.lock();
        if active.contains_key(id) {
            return Err(InstallError::Validation(format!(
                "A download with id {} is already running",
                id
            )));
        }

        let token = CancellationToken::new();
        active.insert(id.to_string(), token.clone());
        Ok(token)
    }

    /// Cancels the session; `false` if no such session is running.
    pub fn abort(&self, id: &str) -> bool {
        match self.lock().get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn finish(&self, id: &str) {
        self.lock().remove(id);
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Ends a session however its download ends, including by being dropped.
struct SessionGuard<'a> {
    sessions: &'a Sessions,
    id: &'a str,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.sessions.finish(self.id);
    }
}

/// Runs downloads as named sessions that can be aborted from elsewhere.
#[derive(Clone)]
pub struct Installer {
    transport: Arc<dyn Transport>,
    sessions: Sessions,
}

impl Installer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            sessions: Sessions::new(),
        }
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub async fn download(
        &self,
        id: &str,
        request: &InstallRequest,
        progress: Option<UnboundedSender<Progress>>,
    ) -> Result<Installed, InstallError> {
        let cancel = self.sessions.begin(id)?;
        let _session = SessionGuard {
            sessions: &self.sessions,
            id,
        };

        download(Arc::clone(&self.transport), request, &cancel, progress).await
    }

    pub fn abort(&self, id: &str) -> bool {
        self.sessions.abort(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::platform::Arch;
    use crate::utils::testing::{shasums, tarball, zip_archive, MemoryTransport, Route};
    use semver::Version;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const ARTIFACT: &str = "v20.11.0/node-v20.11.0-linux-x64.tar.gz";
    const MANIFEST: &str = "v20.11.0/SHASUMS256.txt";

    struct Fixture {
        _root: TempDir,
        install_root: PathBuf,
        temp_root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            let install_root = root.path().join("versions");
            let temp_root = root.path().join("tmp");
            std::fs::create_dir_all(&temp_root).unwrap();
            Self {
                _root: root,
                install_root,
                temp_root,
            }
        }

        fn request(&self, version: &str, platform: Platform) -> InstallRequest {
            InstallRequest {
                target: Target {
                    version: Version::parse(version).unwrap(),
                    platform,
                    arch: Arch::X64,
                },
                install_root: self.install_root.clone(),
                temp_root: Some(self.temp_root.clone()),
            }
        }

        fn temp_is_empty(&self) -> bool {
            std::fs::read_dir(&self.temp_root).unwrap().next().is_none()
        }
    }

    fn healthy_mirror() -> Arc<MemoryTransport> {
        let archive = tarball("node-v20.11.0-linux-x64");
        Arc::new(
            MemoryTransport::new()
                .route(ARTIFACT, Route::Body(archive.clone()))
                .route(
                    MANIFEST,
                    Route::Body(shasums(&[("node-v20.11.0-linux-x64.tar.gz", archive.as_slice())])),
                ),
        )
    }

    #[tokio::test]
    async fn installs_and_is_idempotent() {
        let fixture = Fixture::new();
        let transport = healthy_mirror();
        let request = fixture.request("20.11.0", Platform::Linux);
        let cancel = CancellationToken::new();

        let first = download(transport.clone(), &request, &cancel, None)
            .await
            .unwrap();
        assert_eq!(first.path, fixture.install_root.join("20.11.0"));
        assert!(first.path.join("bin/node").is_file());
        assert!(fixture.temp_is_empty());
        let requests = transport.request_count();

        let second = download(transport.clone(), &request, &cancel, None)
            .await
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(transport.request_count(), requests);
    }

    #[tokio::test]
    async fn checksum_mismatch_is_not_promoted() {
        let fixture = Fixture::new();
        let archive = tarball("node-v20.11.0-linux-x64");
        let mut tampered = archive.clone();
        tampered.extend_from_slice(b"trailing junk");
        let transport = Arc::new(
            MemoryTransport::new()
                .route(ARTIFACT, Route::Body(tampered))
                .route(
                    MANIFEST,
                    Route::Body(shasums(&[("node-v20.11.0-linux-x64.tar.gz", archive.as_slice())])),
                ),
        );

        let err = download(
            transport,
            &fixture.request("20.11.0", Platform::Linux),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, InstallError::Integrity(_)));
        assert_eq!(
            err.to_string(),
            "Could not download Node.js 20.11.0: checksum did not match"
        );
        assert!(!fixture.install_root.join("20.11.0").exists());
        assert!(fixture.temp_is_empty());
    }

    #[tokio::test]
    async fn corrupt_archive_leaves_nothing_behind() {
        let fixture = Fixture::new();
        let garbage = b"this is not a tarball".to_vec();
        let transport = Arc::new(
            MemoryTransport::new()
                .route(ARTIFACT, Route::Body(garbage.clone()))
                .route(
                    MANIFEST,
                    Route::Body(shasums(&[("node-v20.11.0-linux-x64.tar.gz", garbage.as_slice())])),
                ),
        );

        let err = download(
            transport,
            &fixture.request("20.11.0", Platform::Linux),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, InstallError::Download { .. }));
        assert!(!fixture.install_root.join("20.11.0").exists());
        assert!(fixture.temp_is_empty());
    }

    #[tokio::test]
    async fn version_floor_makes_no_requests() {
        let fixture = Fixture::new();
        let transport = Arc::new(MemoryTransport::new());

        let err = download(
            transport.clone(),
            &fixture.request("0.8.5", Platform::Linux),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, InstallError::UnsupportedVersion { .. }));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn not_found_and_connect_errors_are_classified() {
        let fixture = Fixture::new();

        let err = download(
            Arc::new(MemoryTransport::new()),
            &fixture.request("20.11.0", Platform::Darwin),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "No Node.js binaries available for 20.11.0 on darwin x64"
        );

        let unreachable = Arc::new(MemoryTransport::new().route(ARTIFACT, Route::Connect));
        let err = download(
            unreachable,
            &fixture.request("20.11.0", Platform::Linux),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Could not connect to https://mirror.test/node");
        assert!(fixture.temp_is_empty());
    }

    #[tokio::test]
    async fn windows_zip_install() {
        let fixture = Fixture::new();
        let archive = zip_archive("node-v20.11.0-win-x64");
        let transport = Arc::new(
            MemoryTransport::new()
                .route("v20.11.0/node-v20.11.0-win-x64.zip", Route::Body(archive.clone()))
                .route(
                    MANIFEST,
                    Route::Body(shasums(&[("node-v20.11.0-win-x64.zip", archive.as_slice())])),
                ),
        );

        let installed = download(
            transport.clone(),
            &fixture.request("20.11.0", Platform::Windows),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        assert!(installed.path.join("node.exe").is_file());
        assert!(transport
            .requests()
            .contains(&"v20.11.0/node-v20.11.0-win-x64.zip".to_string()));
    }

    #[tokio::test]
    async fn windows_raw_install_for_old_releases() {
        let fixture = Fixture::new();
        let exe = b"MZ node 5".to_vec();
        let transport = Arc::new(
            MemoryTransport::new()
                .route("v5.12.0/win-x64/node.exe", Route::Body(exe.clone()))
                .route(
                    "v5.12.0/SHASUMS256.txt",
                    Route::Body(shasums(&[("win-x64/node.exe", exe.as_slice())])),
                ),
        );

        let installed = download(
            transport,
            &fixture.request("5.12.0", Platform::Windows),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(installed.path.join("node.exe")).unwrap(), exe);
    }

    #[tokio::test]
    async fn aborting_a_session_fails_promptly() {
        let fixture = Fixture::new();
        let archive = tarball("node-v20.11.0-linux-x64");
        let transport = Arc::new(
            MemoryTransport::new().route(ARTIFACT, Route::Stall(archive[..archive.len() / 2].to_vec())),
        );
        let installer = Installer::new(transport);
        let request = fixture.request("20.11.0", Platform::Linux);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let aborter = installer.clone();
        tokio::spawn(async move {
            // Wait until bytes are flowing before pulling the plug.
            let _ = rx.recv().await;
            assert!(aborter.abort("install-20"));
        });

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            installer.download("install-20", &request, Some(tx)),
        )
        .await
        .expect("aborted download must not hang");

        assert!(matches!(result, Err(InstallError::Cancelled(_))));
        assert!(!installer.sessions().is_active("install-20"));
        assert!(!fixture.install_root.join("20.11.0").exists());
        assert!(fixture.temp_is_empty());
    }

    #[test]
    fn sessions_reject_duplicate_ids() {
        let sessions = Sessions::new();
        let token = sessions.begin("a").unwrap();
        assert!(sessions.begin("a").is_err());
        assert!(sessions.abort("a"));
        assert!(token.is_cancelled());
        sessions.finish("a");
        assert!(!sessions.abort("a"));
    }

    #[test]
    fn copies_trees_with_links() {
        let temp = TempDir::new().unwrap();
        let from = temp.path().join("from");
        std::fs::create_dir_all(from.join("bin")).unwrap();
        std::fs::write(from.join("bin/node"), b"node").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("node", from.join("bin/nodejs")).unwrap();

        let to = temp.path().join("to");
        copy_dir(&from, &to).unwrap();

        assert_eq!(std::fs::read(to.join("bin/node")).unwrap(), b"node");
        #[cfg(unix)]
        assert_eq!(
            std::fs::read_link(to.join("bin/nodejs")).unwrap(),
            PathBuf::from("node")
        );
    }

    fn leftover_staging(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains("staging"))
            .collect()
    }

    #[tokio::test]
    async fn dropping_a_download_ends_its_session() {
        let fixture = Fixture::new();
        let archive = tarball("node-v20.11.0-linux-x64");
        let transport = Arc::new(
            MemoryTransport::new().route(ARTIFACT, Route::Stall(archive[..archive.len() / 2].to_vec())),
        );
        let installer = Installer::new(transport.clone());
        let request = fixture.request("20.11.0", Platform::Linux);

        let dropped = tokio::time::timeout(
            Duration::from_millis(200),
            installer.download("node-20", &request, None),
        )
        .await;
        assert!(dropped.is_err());
        assert!(!installer.sessions().is_active("node-20"));

        // The same id can be reused right away.
        transport.set(ARTIFACT, Route::Body(archive.clone()));
        transport.set(
            MANIFEST,
            Route::Body(shasums(&[("node-v20.11.0-linux-x64.tar.gz", archive.as_slice())])),
        );
        let installed = installer.download("node-20", &request, None).await.unwrap();
        assert!(installed.path.join("bin/node").is_file());
    }

    #[tokio::test]
    async fn existing_install_wins_over_a_late_rename() {
        let fixture = Fixture::new();
        let dest = fixture.install_root.join("20.11.0");
        std::fs::create_dir_all(dest.join("bin")).unwrap();
        std::fs::write(dest.join("bin/node"), b"first").unwrap();

        let source = fixture.temp_root.join("20.11.0");
        std::fs::create_dir_all(source.join("bin")).unwrap();
        std::fs::write(source.join("bin/node"), b"second").unwrap();

        promote(&source, &dest, &fixture.install_root, &Platform::Linux)
            .await
            .unwrap();

        assert_eq!(std::fs::read(dest.join("bin/node")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn copy_fallback_moves_the_whole_tree() {
        let fixture = Fixture::new();
        let source = fixture.temp_root.join("20.11.0");
        std::fs::create_dir_all(source.join("bin")).unwrap();
        std::fs::create_dir_all(source.join("lib/node_modules/npm")).unwrap();
        std::fs::write(source.join("bin/node"), b"node").unwrap();
        std::fs::write(source.join("lib/node_modules/npm/package.json"), b"{}").unwrap();
        std::fs::create_dir_all(&fixture.install_root).unwrap();
        let dest = fixture.install_root.join("20.11.0");
        let staging_root = fixture.install_root.parent().unwrap();

        promote_by_copy(&source, &dest, staging_root, &Platform::Linux)
            .await
            .unwrap();

        assert_eq!(std::fs::read(dest.join("bin/node")).unwrap(), b"node");
        assert!(dest.join("lib/node_modules/npm/package.json").is_file());
        assert!(leftover_staging(staging_root).is_empty());
    }

    #[tokio::test]
    async fn failed_promotion_leaves_nothing() {
        let fixture = Fixture::new();
        let source = fixture.temp_root.join("missing/20.11.0");
        let dest = fixture.install_root.join("20.11.0");

        let err = promote(&source, &dest, &fixture.install_root, &Platform::Linux)
            .await
            .unwrap_err();

        assert!(matches!(err, InstallError::Io { .. }));
        assert!(!dest.exists());
        assert!(leftover_staging(&fixture.install_root).is_empty());
        assert!(leftover_staging(fixture.install_root.parent().unwrap()).is_empty());
    }

    #[tokio::test]
    async fn concurrent_installs_of_one_version_both_succeed() {
        let fixture = Fixture::new();
        let transport = healthy_mirror();
        let request = fixture.request("20.11.0", Platform::Linux);
        let cancel = CancellationToken::new();

        let (a, b) = tokio::join!(
            download(transport.clone(), &request, &cancel, None),
            download(transport.clone(), &request, &cancel, None),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert!(fixture.install_root.join("20.11.0/bin/node").is_file());
        assert_eq!(
            std::fs::read_dir(&fixture.install_root).unwrap().count(),
            1
        );
        assert!(fixture.temp_is_empty());
    }
}
