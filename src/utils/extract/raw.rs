use std::io;
use std::path::Path;

use async_trait::async_trait;
use semver::Version;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::{ArchiveKind, ArchiveStrategy, ArtifactReader, Target};

/// `node.exe` moved under `win-{arch}/` with this release.
pub const NEW_URL_VERSION: Version = Version::new(4, 0, 0);

/// Bare `node.exe` downloads for Windows releases that predate zip archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct Raw;

#[async_trait]
impl ArchiveStrategy for Raw {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Raw
    }

    fn artifact(&self, target: &Target) -> String {
        let arch = target.arch_name();

        if target.version >= NEW_URL_VERSION {
            format!("win-{}/node.exe", arch)
        } else if arch == "x64" {
            "x64/node.exe".to_string()
        } else {
            "node.exe".to_string()
        }
    }

    async fn unpack(
        &self,
        mut source: ArtifactReader,
        target: &Target,
        dest: &Path,
    ) -> io::Result<()> {
        let out_dir = dest.join(target.version_dir());
        fs::create_dir_all(&out_dir).await?;

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o755);

        let mut file = options.open(out_dir.join("node.exe")).await?;
        tokio::io::copy(&mut source, &mut file).await?;
        file.flush().await?;
        file.sync_all().await
    }
}
