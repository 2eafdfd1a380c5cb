//! Client tag generation
//!
//! Builds the ordered tag list a client sends with every request. Order is
//! preference: exact interpreter+ABI+platform first, generic fallbacks last.

use super::environment::{Environment, OsFamily, RuntimeFamily};
use super::tag::{CompatibilityTag, TagSet, ANY_PLATFORM, NO_ABI, STABLE_ABI};

/// Oldest glibc minor covered by `manylinux_2_<minor>` tags before legacy aliases
const MANYLINUX_2014_MINOR: u32 = 17;

/// Oldest macOS 10.x minor release emitted for Intel hosts
const OLDEST_MACOS_10_MINOR: u32 = 9;

/// Interpreter component, e.g. `cp39`. Returns (token, version_specific).
pub fn interpreter_tag(env: &Environment) -> (String, bool) {
    match env.minor {
        Some(minor) => (format!("{}{}{}", env.family.prefix(), env.major, minor), true),
        None => (format!("{}{}", env.family.prefix(), env.major), false),
    }
}

/// ABI component for the environment's family
pub fn abi_tag(env: &Environment) -> String {
    let minor = env.minor.map(|m| m.to_string()).unwrap_or_default();
    match env.family {
        RuntimeFamily::CPython => {
            let (interpreter, _) = interpreter_tag(env);
            format!("{}{}", interpreter, env.abi_flavor)
        }
        RuntimeFamily::PyPy => format!("pypy{}{}_pp73", env.major, minor),
        RuntimeFamily::GraalPy => format!("graalpy{}{}_native", env.major, minor),
        _ => NO_ABI.to_string(),
    }
}

/// Platform components, most specific first, always ending in `any`
pub fn platform_tags(env: &Environment) -> Vec<String> {
    let mut platforms = match env.os {
        OsFamily::Linux => linux_platforms(&env.arch, env.libc),
        OsFamily::MacOs => macos_platforms(&env.arch, env.os_version),
        OsFamily::Windows => vec![windows_platform(&env.arch)],
        OsFamily::Other(_) => Vec::new(),
    };
    platforms.push(ANY_PLATFORM.to_string());
    platforms
}

fn linux_platforms(arch: &str, libc: Option<(u32, u32)>) -> Vec<String> {
    let mut platforms = Vec::new();

    if let Some((2, glibc_minor)) = libc {
        for minor in (MANYLINUX_2014_MINOR..=glibc_minor).rev() {
            platforms.push(format!("manylinux_2_{}_{}", minor, arch));
            if minor == MANYLINUX_2014_MINOR {
                platforms.push(format!("manylinux2014_{}", arch));
            }
        }

        // manylinux2010 and manylinux1 were only published for Intel
        if arch == "x86_64" || arch == "i686" {
            if glibc_minor >= 12 {
                platforms.push(format!("manylinux_2_12_{}", arch));
                platforms.push(format!("manylinux2010_{}", arch));
            }
            if glibc_minor >= 5 {
                platforms.push(format!("manylinux_2_5_{}", arch));
                platforms.push(format!("manylinux1_{}", arch));
            }
        }
    }

    platforms.push(format!("linux_{}", arch));
    platforms
}

fn macos_platforms(arch: &str, os_version: Option<(u32, u32)>) -> Vec<String> {
    let arch = if arch == "aarch64" { "arm64" } else { arch };
    let (major, minor) = os_version.unwrap_or((11, 0));
    let mut platforms = Vec::new();

    if major >= 11 {
        for version in (11..=major).rev() {
            platforms.push(format!("macosx_{}_0_{}", version, arch));
            platforms.push(format!("macosx_{}_0_universal2", version));
        }
    }

    if arch == "x86_64" {
        let newest_10 = if major >= 11 { 15 } else { minor };
        for minor in (OLDEST_MACOS_10_MINOR..=newest_10).rev() {
            platforms.push(format!("macosx_10_{}_x86_64", minor));
        }
    }

    platforms
}

fn windows_platform(arch: &str) -> String {
    match arch {
        "x86_64" => "win_amd64".to_string(),
        "i686" => "win32".to_string(),
        "aarch64" => "win_arm64".to_string(),
        other => format!("win_{}", other),
    }
}

/// Compute the ordered, duplicate-free tag set for a client environment.
///
/// The universal fallback `(py<major>, none, any)` is always the last tag.
pub fn compute_client_tags(env: &Environment) -> TagSet {
    let (interpreter, version_specific) = interpreter_tag(env);
    let abi = abi_tag(env);
    let universal = format!("py{}", env.major);
    let platforms = platform_tags(env);
    let fallback = CompatibilityTag::new(universal.as_str(), NO_ABI, ANY_PLATFORM);

    let mut tags = TagSet::new();

    for platform in &platforms {
        tags.push(CompatibilityTag::new(interpreter.as_str(), abi.as_str(), platform.as_str()));
        if version_specific {
            tags.push(CompatibilityTag::new(interpreter.as_str(), STABLE_ABI, platform.as_str()));
        }
        let generic = CompatibilityTag::new(universal.as_str(), NO_ABI, platform.as_str());
        if generic != fallback {
            tags.push(generic);
        }
    }

    if version_specific {
        for platform in &platforms {
            tags.push(CompatibilityTag::new(interpreter.as_str(), STABLE_ABI, platform.as_str()));
            tags.push(CompatibilityTag::new(interpreter.as_str(), NO_ABI, platform.as_str()));
        }
    }

    // (interp, none, any) may coincide with the fallback when the family is
    // unknown and unversioned
    tags.remove(&fallback);
    tags.push(fallback);
    tags
}
