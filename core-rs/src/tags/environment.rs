//! Runtime environment descriptor used for tag generation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Interpreter family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFamily {
    CPython,
    PyPy,
    GraalPy,
    IronPython,
    Jython,
    Other(String),
}

impl RuntimeFamily {
    /// Parse a family name (case-insensitive)
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "cpython" | "cp" => RuntimeFamily::CPython,
            "pypy" | "pp" => RuntimeFamily::PyPy,
            "graalpy" | "gp" => RuntimeFamily::GraalPy,
            "ironpython" | "ip" => RuntimeFamily::IronPython,
            "jython" | "jy" => RuntimeFamily::Jython,
            other => RuntimeFamily::Other(other.to_string()),
        }
    }

    /// Two-letter interpreter prefix
    pub fn prefix(&self) -> &str {
        match self {
            RuntimeFamily::CPython => "cp",
            RuntimeFamily::PyPy => "pp",
            RuntimeFamily::GraalPy => "gp",
            RuntimeFamily::IronPython => "ip",
            RuntimeFamily::Jython => "jy",
            RuntimeFamily::Other(_) => "py",
        }
    }
}

impl fmt::Display for RuntimeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeFamily::CPython => write!(f, "cpython"),
            RuntimeFamily::PyPy => write!(f, "pypy"),
            RuntimeFamily::GraalPy => write!(f, "graalpy"),
            RuntimeFamily::IronPython => write!(f, "ironpython"),
            RuntimeFamily::Jython => write!(f, "jython"),
            RuntimeFamily::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Operating system family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    MacOs,
    Windows,
    Other(String),
}

impl OsFamily {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "linux" => OsFamily::Linux,
            "macos" | "darwin" | "macosx" => OsFamily::MacOs,
            "windows" | "win32" | "win" => OsFamily::Windows,
            other => OsFamily::Other(other.to_string()),
        }
    }
}

/// Normalize an architecture name to its wheel platform spelling
pub fn normalize_arch(arch: &str) -> String {
    match arch.to_lowercase().as_str() {
        "x86_64" | "amd64" | "x64" => "x86_64".to_string(),
        "x86" | "i386" | "i686" => "i686".to_string(),
        "aarch64" | "arm64" => "aarch64".to_string(),
        "arm" | "armv7l" => "armv7l".to_string(),
        other => other.to_string(),
    }
}

/// Client environment descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub family: RuntimeFamily,
    pub major: u32,
    /// Without a minor version the interpreter tag is not version-specific
    pub minor: Option<u32>,
    /// Appended to the CPython ABI tag, e.g. "t" for free-threaded builds
    #[serde(default)]
    pub abi_flavor: String,
    pub arch: String,
    pub os: OsFamily,
    /// glibc (major, minor) for manylinux tags
    #[serde(default)]
    pub libc: Option<(u32, u32)>,
    /// OS release (major, minor), used for macOS tags
    #[serde(default)]
    pub os_version: Option<(u32, u32)>,
}

impl Environment {
    pub fn new(family: RuntimeFamily, major: u32, minor: Option<u32>, arch: &str, os: OsFamily) -> Self {
        Self {
            family,
            major,
            minor,
            abi_flavor: String::new(),
            arch: normalize_arch(arch),
            os,
            libc: None,
            os_version: None,
        }
    }

    pub fn with_libc(mut self, major: u32, minor: u32) -> Self {
        self.libc = Some((major, minor));
        self
    }

    pub fn with_os_version(mut self, major: u32, minor: u32) -> Self {
        self.os_version = Some((major, minor));
        self
    }

    pub fn with_abi_flavor(mut self, flavor: &str) -> Self {
        self.abi_flavor = flavor.to_string();
        self
    }

    /// Describe the host for a CPython 3.x runtime.
    ///
    /// Architecture and OS come from the compile target. Linux hosts assume a
    /// glibc 2.17 baseline and macOS hosts assume release 11.
    pub fn detect(major: u32, minor: Option<u32>) -> Self {
        let os = OsFamily::parse(std::env::consts::OS);
        let env = Environment::new(RuntimeFamily::CPython, major, minor, std::env::consts::ARCH, os.clone());
        match os {
            OsFamily::Linux => env.with_libc(2, 17),
            OsFamily::MacOs => env.with_os_version(11, 0),
            _ => env,
        }
    }
}
