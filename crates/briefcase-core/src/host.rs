//! Host platform detection

use std::path::PathBuf;

/// Environment variable that relocates the briefcase data directory
pub const BRIEFCASE_HOME: &str = "BRIEFCASE_HOME";

/// Name of the host operating system, as used in tool support tables
pub fn host_os() -> &'static str {
    os_name(std::env::consts::OS)
}

fn os_name(os: &'static str) -> &'static str {
    match os {
        "macos" => "Darwin",
        "linux" => "Linux",
        "windows" => "Windows",
        other => other,
    }
}

/// Machine architecture of the host, using the naming of the host OS
pub fn host_arch() -> String {
    arch_name(host_os(), std::env::consts::ARCH)
}

fn arch_name(host_os: &str, arch: &str) -> String {
    match (host_os, arch) {
        ("Darwin", "aarch64") => "arm64".to_string(),
        ("Windows", "x86_64") => "AMD64".to_string(),
        ("Windows", "aarch64") => "ARM64".to_string(),
        (_, arch) => arch.to_string(),
    }
}

/// Directory holding tools, templates, support packages and logs
pub fn data_path() -> Option<PathBuf> {
    if let Some(home) = std::env::var_os(BRIEFCASE_HOME) {
        return Some(PathBuf::from(home));
    }
    dirs::data_dir().map(|dir| dir.join("briefcase"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_names() {
        assert_eq!(os_name("macos"), "Darwin");
        assert_eq!(os_name("linux"), "Linux");
        assert_eq!(os_name("windows"), "Windows");
        assert_eq!(os_name("freebsd"), "freebsd");
    }

    #[test]
    fn test_arch_names() {
        assert_eq!(arch_name("Darwin", "aarch64"), "arm64");
        assert_eq!(arch_name("Linux", "aarch64"), "aarch64");
        assert_eq!(arch_name("Windows", "x86_64"), "AMD64");
        assert_eq!(arch_name("Linux", "x86_64"), "x86_64");
    }
}
