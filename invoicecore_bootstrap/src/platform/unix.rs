// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Unix Platform Implementation
//!
//! POSIX implementation backing the `Platform` trait on Linux and macOS.
//!
//! ## Unix APIs Used
//!
//! - `sysconf(_SC_PAGESIZE)` / `sysconf(_SC_NPROCESSORS_ONLN)` via `libc`
//! - `/proc/meminfo` for total/available memory (Linux only, falls back
//!   gracefully on other Unix variants)
//! - `geteuid()` for privilege checking
//! - `std::os::unix::fs::PermissionsExt` for permission bits

use super::{Platform, PlatformError};
use async_trait::async_trait;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// POSIX platform implementation for Linux and macOS.
pub struct UnixPlatform;

impl UnixPlatform {
    /// Create a new Unix platform instance
    pub fn new() -> Self {
        Self
    }

    fn read_meminfo() -> Result<(u64, u64), PlatformError> {
        let contents = fs::read_to_string("/proc/meminfo")
            .map_err(|e| PlatformError::NotSupported(format!("/proc/meminfo unavailable: {e}")))?;

        let mut total_kb: Option<u64> = None;
        let mut available_kb: Option<u64> = None;

        for line in contents.lines() {
            if let Some(rest) = line.strip_prefix("MemTotal:") {
                total_kb = Self::parse_kb_value(rest);
            } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
                available_kb = Self::parse_kb_value(rest);
            }
        }

        match (total_kb, available_kb) {
            (Some(total), Some(available)) => Ok((total * 1024, available * 1024)),
            _ => Err(PlatformError::Other(
                "could not parse MemTotal/MemAvailable from /proc/meminfo".to_string(),
            )),
        }
    }

    fn parse_kb_value(rest: &str) -> Option<u64> {
        rest.split_whitespace().next()?.parse::<u64>().ok()
    }
}

impl Default for UnixPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for UnixPlatform {
    fn page_size(&self) -> usize {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            4096
        }
    }

    fn cpu_count(&self) -> usize {
        let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if count > 0 {
            count as usize
        } else {
            1
        }
    }

    fn total_memory(&self) -> Result<u64, PlatformError> {
        Self::read_meminfo().map(|(total, _)| total)
    }

    fn available_memory(&self) -> Result<u64, PlatformError> {
        Self::read_meminfo().map(|(_, available)| available)
    }

    fn line_separator(&self) -> &'static str {
        "\n"
    }

    fn path_separator(&self) -> char {
        ':'
    }

    fn platform_name(&self) -> &'static str {
        if cfg!(target_os = "macos") {
            "macos"
        } else {
            "linux"
        }
    }

    fn temp_dir(&self) -> PathBuf {
        std::env::temp_dir()
    }

    fn is_elevated(&self) -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> Result<(), PlatformError> {
        let permissions = fs::Permissions::from_mode(mode);
        fs::set_permissions(path, permissions).map_err(PlatformError::Io)
    }

    fn is_executable(&self, path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(metadata) => metadata.permissions().mode() & 0o111 != 0,
            Err(_) => false,
        }
    }

    async fn sync_file(&self, file: &tokio::fs::File) -> Result<(), PlatformError> {
        file.sync_all().await.map_err(PlatformError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_platform_basics() {
        let platform = UnixPlatform::new();

        assert!(platform.cpu_count() >= 1);

        let page_size = platform.page_size();
        assert!(page_size >= 512);
        assert!(page_size <= 65536);

        assert_eq!(platform.line_separator(), "\n");
        assert_eq!(platform.path_separator(), ':');
    }

    #[test]
    fn test_temp_dir_exists() {
        let platform = UnixPlatform::new();
        assert!(platform.temp_dir().exists());
    }

    #[test]
    fn test_is_executable_for_missing_path() {
        let platform = UnixPlatform::new();
        assert!(!platform.is_executable(Path::new("/no/such/path/ever")));
    }
}
