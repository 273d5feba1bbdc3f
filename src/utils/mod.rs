pub mod checksum;
pub mod download;
pub mod error;
pub mod extract;
pub mod index;
pub mod installed;
pub mod installer;
pub mod mirror;
pub mod platform;
pub mod progress;
pub mod version;

#[cfg(test)]
mod testing;

pub use self::download::{FetchOptions, HttpTransport, Proxy, Timeouts, Transport};
pub use self::index::VersionCache;
pub use self::installer::{InstallRequest, Installer};
pub use self::platform::{Arch, Platform};
pub use self::version::{parse_version, VersionRequest};
