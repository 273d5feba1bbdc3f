use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::Path;

use ::zip::result::ZipError;
use ::zip::ZipArchive;
use async_trait::async_trait;
use semver::{Version, VersionReq};
use tokio::io::AsyncReadExt;

use super::{join_error, ArchiveKind, ArchiveStrategy, ArtifactReader, Target};

/// Windows `.zip` releases exist from 4.5.0 on the 4.x line and from 6.2.1.
pub fn has_zip_archive(version: &Version) -> bool {
    ["^4.5.0", ">=6.2.1"]
        .iter()
        .filter_map(|req| VersionReq::parse(req).ok())
        .any(|req| req.matches(version))
}

/// Windows `.zip` releases. Only `node.exe` is taken out of the archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zip;

impl Zip {
    fn basename(target: &Target) -> String {
        format!("node-v{}-win-{}", target.version, target.arch_name())
    }
}

#[async_trait]
impl ArchiveStrategy for Zip {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Zip
    }

    fn artifact(&self, target: &Target) -> String {
        format!("{}.zip", Self::basename(target))
    }

    async fn unpack(
        &self,
        mut source: ArtifactReader,
        target: &Target,
        dest: &Path,
    ) -> io::Result<()> {
        // The central directory sits at the end of the file, so the whole
        // archive has to be in memory before anything can be extracted.
        let mut content = Vec::new();
        source.read_to_end(&mut content).await?;

        let entry = format!("{}/node.exe", Self::basename(target));
        let out_dir = dest.join(target.version_dir());

        tokio::task::spawn_blocking(move || extract_node(content, &entry, &out_dir))
            .await
            .map_err(join_error)?
    }
}

fn extract_node(content: Vec<u8>, entry: &str, out_dir: &Path) -> io::Result<()> {
    let mut archive = ZipArchive::new(Cursor::new(content)).map_err(zip_error)?;
    let mut node = archive.by_name(entry).map_err(zip_error)?;

    fs::create_dir_all(out_dir)?;
    let mut file = File::create(out_dir.join("node.exe"))?;
    io::copy(&mut node, &mut file)?;
    file.sync_all()
}

fn zip_error(err: ZipError) -> io::Error {
    match err {
        ZipError::Io(err) => err,
        ZipError::FileNotFound => {
            io::Error::new(io::ErrorKind::NotFound, "node.exe is missing from the archive")
        }
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}
