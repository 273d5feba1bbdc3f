use semver::{Version, VersionReq};

use super::error::InstallError;

/// Releases older than this only shipped sources for Unix, and building from
/// source is not supported.
pub const MINIMUM_VERSION: Version = Version::new(0, 8, 6);

/// Parses `20.11.1` or `v20.11.1`.
pub fn parse_version(version: &str) -> Result<Version, InstallError> {
    let trimmed = version.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);

    Version::parse(bare)
        .map_err(|_| InstallError::Validation(format!("Invalid version format: {}", version)))
}

pub fn check_version(version: &Version) -> Result<(), InstallError> {
    if *version < MINIMUM_VERSION {
        return Err(InstallError::UnsupportedVersion {
            version: version.to_string(),
            minimum: MINIMUM_VERSION.to_string(),
        });
    }

    Ok(())
}

/// What a user may ask to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequest {
    Latest,
    Lts,
    Exact(Version),
    Range(VersionReq),
}

impl VersionRequest {
    pub fn parse(request: &str) -> Result<Self, InstallError> {
        let trimmed = request.trim();

        match trimmed.to_ascii_lowercase().as_str() {
            "latest" | "current" | "node" => return Ok(VersionRequest::Latest),
            "lts" => return Ok(VersionRequest::Lts),
            _ => {}
        }

        if let Ok(version) = parse_version(trimmed) {
            return Ok(VersionRequest::Exact(version));
        }

        let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
        VersionReq::parse(bare)
            .map(VersionRequest::Range)
            .map_err(|_| InstallError::Validation(format!("Invalid version format: {}", request)))
    }

    pub fn needs_index(&self) -> bool {
        !matches!(self, VersionRequest::Exact(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_leading_v() {
        assert_eq!(parse_version("v18.19.0").unwrap(), Version::new(18, 19, 0));
        assert_eq!(parse_version("18.19.0").unwrap(), Version::new(18, 19, 0));
        assert!(parse_version("eighteen").is_err());
    }

    #[test]
    fn floor_is_inclusive() {
        assert!(check_version(&Version::new(0, 8, 6)).is_ok());
        assert!(check_version(&Version::new(22, 0, 0)).is_ok());
    }

    #[test]
    fn rejects_versions_below_floor() {
        for version in ["0.8.5", "0.6.21", "0.1.14"] {
            let err = check_version(&parse_version(version).unwrap()).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("Unsupported Node.js version: {}. Must be >= 0.8.6.", version)
            );
        }
    }

    #[test]
    fn request_kinds() {
        assert_eq!(VersionRequest::parse("latest").unwrap(), VersionRequest::Latest);
        assert_eq!(VersionRequest::parse("LTS").unwrap(), VersionRequest::Lts);
        assert_eq!(
            VersionRequest::parse("v16.20.2").unwrap(),
            VersionRequest::Exact(Version::new(16, 20, 2))
        );
        assert!(matches!(
            VersionRequest::parse("18").unwrap(),
            VersionRequest::Range(_)
        ));
        assert!(VersionRequest::parse("not-a-version!").is_err());
    }
}
