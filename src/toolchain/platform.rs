use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
}

/// Operating-system family plus pointer width of the machine the
/// toolchain runs on. Renders as a bundle classifier such as `linux-64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    os: OsFamily,
    wide: bool,
}

impl Platform {
    /// Map an `(os, arch)` pair, as reported by `std::env::consts`, to a platform.
    ///
    /// Unknown Unix-like systems are treated as Linux. Any architecture whose
    /// name contains `64` is 64-bit.
    pub fn classify(os: &str, arch: &str) -> Self {
        let os = match os.to_ascii_lowercase().as_str() {
            "windows" => OsFamily::Windows,
            "macos" | "darwin" | "mac os x" => OsFamily::MacOs,
            _ => OsFamily::Linux,
        };
        Self {
            os,
            wide: arch.contains("64"),
        }
    }

    pub fn current() -> Self {
        Self::classify(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn os(&self) -> OsFamily {
        self.os
    }

    pub fn classifier(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let os = match self.os {
            OsFamily::Windows => "win32",
            OsFamily::MacOs => "macos",
            OsFamily::Linux => "linux",
        };
        let bits = if self.wide { "64" } else { "32" };
        write!(f, "{}-{}", os, bits)
    }
}
