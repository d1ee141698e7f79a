//! Operating systems and CPU architectures a command can target.

use std::fmt;
use std::str::FromStr;

use crate::error::ArgsError;

/// Known macOS releases, oldest first so that the derived ordering follows
/// release order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MacosVersion {
    ElCapitan,
    Sierra,
    HighSierra,
    Mojave,
    Catalina,
    BigSur,
    Monterey,
    Ventura,
    Sonoma,
}

impl MacosVersion {
    /// Newest first.
    pub const ALL: [MacosVersion; 9] = [
        Self::Sonoma,
        Self::Ventura,
        Self::Monterey,
        Self::BigSur,
        Self::Catalina,
        Self::Mojave,
        Self::HighSierra,
        Self::Sierra,
        Self::ElCapitan,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Sonoma => "sonoma",
            Self::Ventura => "ventura",
            Self::Monterey => "monterey",
            Self::BigSur => "big_sur",
            Self::Catalina => "catalina",
            Self::Mojave => "mojave",
            Self::HighSierra => "high_sierra",
            Self::Sierra => "sierra",
            Self::ElCapitan => "el_capitan",
        }
    }

    pub fn version(self) -> &'static str {
        match self {
            Self::Sonoma => "14",
            Self::Ventura => "13",
            Self::Monterey => "12",
            Self::BigSur => "11",
            Self::Catalina => "10.15",
            Self::Mojave => "10.14",
            Self::HighSierra => "10.13",
            Self::Sierra => "10.12",
            Self::ElCapitan => "10.11",
        }
    }

    /// Apple Silicon builds exist from Big Sur onwards.
    pub fn supports_arm(self) -> bool {
        self >= Self::BigSur
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Macos(MacosVersion),
    Linux,
}

impl Os {
    /// Every macOS release followed by Linux.
    pub fn all() -> Vec<Os> {
        MacosVersion::ALL
            .iter()
            .copied()
            .map(Os::Macos)
            .chain(std::iter::once(Os::Linux))
            .collect()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Macos(version) => version.symbol(),
            Self::Linux => "linux",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Os {
    type Err = ArgsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "linux" {
            return Ok(Self::Linux);
        }
        MacosVersion::ALL
            .iter()
            .find(|v| v.symbol() == s)
            .map(|v| Self::Macos(*v))
            .ok_or_else(|| ArgsError::UnknownSystem(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Intel,
    Arm,
}

impl Arch {
    pub const ALL: [Arch; 2] = [Arch::Intel, Arch::Arm];

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Intel => "intel",
            Self::Arm => "arm",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Arch {
    type Err = ArgsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intel" => Ok(Self::Intel),
            "arm" => Ok(Self::Arm),
            other => Err(ArgsError::UnknownSystem(other.to_string())),
        }
    }
}

/// Whether binaries can exist for `os` on `arch`.
pub fn valid_combination(os: Os, arch: Arch) -> bool {
    match (os, arch) {
        (_, Arch::Intel) => true,
        (Os::Linux, Arch::Arm) => false,
        (Os::Macos(version), Arch::Arm) => version.supports_arm(),
    }
}

/// The system the parser treats as "current".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemInfo {
    pub os: Os,
    pub arch: Arch,
}

impl SystemInfo {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The host system. macOS hosts report the newest known release.
    pub fn current() -> Self {
        let os = if cfg!(target_os = "linux") {
            Os::Linux
        } else {
            Os::Macos(MacosVersion::Sonoma)
        };
        Self::new(os, Self::current_arch())
    }

    /// The host architecture on the newest macOS release.
    pub fn simulated_macos() -> Self {
        Self::new(Os::Macos(MacosVersion::Sonoma), Self::current_arch())
    }

    fn current_arch() -> Arch {
        if cfg!(target_arch = "aarch64") {
            Arch::Arm
        } else {
            Arch::Intel
        }
    }

    pub fn is_linux(&self) -> bool {
        self.os == Os::Linux
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_is_invalid_on_linux_and_old_macos() {
        assert!(!valid_combination(Os::Linux, Arch::Arm));
        assert!(!valid_combination(Os::Macos(MacosVersion::Catalina), Arch::Arm));
        assert!(valid_combination(Os::Macos(MacosVersion::BigSur), Arch::Arm));
        assert!(valid_combination(Os::Linux, Arch::Intel));
        assert!(valid_combination(Os::Macos(MacosVersion::ElCapitan), Arch::Intel));
    }

    #[test]
    fn os_parses_release_symbols() {
        assert_eq!("big_sur".parse::<Os>().unwrap(), Os::Macos(MacosVersion::BigSur));
        assert_eq!("linux".parse::<Os>().unwrap(), Os::Linux);
        assert!(matches!(
            "windows".parse::<Os>(),
            Err(ArgsError::UnknownSystem(s)) if s == "windows"
        ));
        assert_eq!(Os::all().len(), 10);
        assert_eq!(Os::all().last(), Some(&Os::Linux));
    }
}
