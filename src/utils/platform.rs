use std::env::consts;
use std::fmt;

use super::error::InstallError;

/// Operating system as named in Node.js release artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    Darwin,
    Aix,
    SunOs,
    Windows,
    Other(String),
}

impl Platform {
    pub fn current() -> Self {
        match consts::OS {
            "macos" => Platform::Darwin,
            "solaris" | "illumos" => Platform::SunOs,
            os => Platform::from_name(os),
        }
    }

    /// Accepts the names Node.js itself reports (`process.platform`).
    pub fn from_name(name: &str) -> Self {
        match name {
            "linux" => Platform::Linux,
            "darwin" => Platform::Darwin,
            "aix" => Platform::Aix,
            "sunos" => Platform::SunOs,
            "win32" | "windows" => Platform::Windows,
            other => Platform::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Platform::Linux => "linux",
            Platform::Darwin => "darwin",
            Platform::Aix => "aix",
            Platform::SunOs => "sunos",
            Platform::Windows => "win32",
            Platform::Other(name) => name,
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows)
    }

    /// Location of the executable inside an installed version directory.
    ///
    /// Unix installs keep the `bin/` layout other tools expect; Windows
    /// installs are flat.
    pub fn node_executable(&self) -> &'static str {
        if self.is_windows() {
            "node.exe"
        } else {
            "bin/node"
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// CPU architecture, using Node.js `process.arch` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Arm,
    Arm64,
    Ia32,
    Ppc,
    Ppc64,
    S390,
    S390x,
    X32,
    X64,
}

const ARCH_NAMES: [(&str, Arch); 9] = [
    ("arm", Arch::Arm),
    ("arm64", Arch::Arm64),
    ("ia32", Arch::Ia32),
    ("ppc", Arch::Ppc),
    ("ppc64", Arch::Ppc64),
    ("s390", Arch::S390),
    ("s390x", Arch::S390x),
    ("x32", Arch::X32),
    ("x64", Arch::X64),
];

impl Arch {
    pub fn parse(name: &str) -> Result<Self, InstallError> {
        ARCH_NAMES
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, arch)| *arch)
            .ok_or_else(|| {
                let available: Vec<&str> = ARCH_NAMES.iter().map(|(n, _)| *n).collect();
                InstallError::Validation(format!(
                    "Option \"arch\" must not be {} but one of: {}",
                    name,
                    available.join(", ")
                ))
            })
    }

    pub fn current() -> Result<Self, InstallError> {
        match consts::ARCH {
            "x86_64" => Ok(Arch::X64),
            "x86" => Ok(Arch::Ia32),
            "aarch64" => Ok(Arch::Arm64),
            "arm" => Ok(Arch::Arm),
            "powerpc" => Ok(Arch::Ppc),
            "powerpc64" => Ok(Arch::Ppc64),
            "s390x" => Ok(Arch::S390x),
            other => Arch::parse(other),
        }
    }

    pub fn name(&self) -> &'static str {
        ARCH_NAMES
            .iter()
            .find(|(_, arch)| arch == self)
            .map(|(name, _)| *name)
            .unwrap_or("x64")
    }

    /// Architecture component of artifact filenames.
    pub fn artifact_name(&self, platform: &Platform) -> &'static str {
        if *platform == Platform::Aix {
            return "ppc64";
        }

        match self {
            Arch::Arm => "armv7l",
            Arch::Arm64 => "arm64",
            Arch::X32 => "x86",
            Arch::Ppc | Arch::Ppc64 => "ppc64le",
            Arch::S390 | Arch::S390x => "s390x",
            Arch::Ia32 | Arch::X64 => "x64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
