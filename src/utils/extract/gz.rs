use std::io::{self, Read};
use std::path::Path;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use tokio::fs;
use tokio_util::io::SyncIoBridge;

use super::{join_error, ArchiveKind, ArchiveStrategy, ArtifactReader, Target};

/// `.tar.gz` releases for Unix-like platforms, untarred while they download.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipTar;

impl GzipTar {
    fn basename(target: &Target) -> String {
        format!(
            "node-v{}-{}-{}",
            target.version,
            target.platform.name(),
            target.arch_name()
        )
    }
}

#[async_trait]
impl ArchiveStrategy for GzipTar {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::GzipTar
    }

    fn artifact(&self, target: &Target) -> String {
        format!("{}.tar.gz", Self::basename(target))
    }

    async fn unpack(&self, source: ArtifactReader, target: &Target, dest: &Path) -> io::Result<()> {
        let reader = SyncIoBridge::new(source);
        let untar_dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || untar(reader, &untar_dest))
            .await
            .map_err(join_error)??;

        fs::rename(
            dest.join(Self::basename(target)),
            dest.join(target.version_dir()),
        )
        .await
    }
}

fn untar<R: Read>(reader: R, dest: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.set_preserve_permissions(true);
    archive.unpack(dest)?;

    // Read to the end so the checksum sees every byte of the artifact,
    // including tar padding and the gzip trailer.
    let mut decoder = archive.into_inner();
    io::copy(&mut decoder, &mut io::sink())?;
    io::copy(&mut decoder.into_inner(), &mut io::sink())?;

    Ok(())
}
