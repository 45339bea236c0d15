//! # Host Environment
//!
//! All the process-wide state the pipeline depends on, read exactly once at startup.
//! Components never call `std::env::var` themselves; they receive a `HostEnvironment`
//! so tests can point them at temporary directories.

use std::path::{Path, PathBuf};

/// Name of the per-user install directory under `%LOCALAPPDATA%\Programs`.
pub const APP_NAME: &str = "Komiq";

/// Environment-derived roots.
#[derive(Debug, Clone, Default)]
pub struct HostEnvironment {
    /// `%LOCALAPPDATA%`. Holds the default Qt install and the deployment target.
    pub local_app_data: Option<PathBuf>,
    /// `%ProgramFiles(x86)%`. Where the Visual Studio installer lives on 64-bit hosts.
    pub program_files_x86: Option<PathBuf>,
    /// `%ProgramFiles%`. Fallback when the x86 variable is missing (32-bit hosts).
    pub program_files: Option<PathBuf>,
}

impl HostEnvironment {
    /// Snapshot the current process environment.
    ///
    /// `LOCALAPPDATA` falls back to the platform's local data directory, which is the
    /// same folder on Windows but keeps the tool usable from shells that scrub it.
    pub fn from_env() -> Self {
        let local_app_data = env_path("LOCALAPPDATA").or_else(|| {
            directories::BaseDirs::new().map(|dirs| dirs.data_local_dir().to_path_buf())
        });

        Self {
            local_app_data,
            program_files_x86: env_path("ProgramFiles(x86)"),
            program_files: env_path("ProgramFiles"),
        }
    }

    /// `%LOCALAPPDATA%\Programs`
    pub fn programs_dir(&self) -> Option<PathBuf> {
        self.local_app_data.as_deref().map(|p| p.join("Programs"))
    }

    /// Default deployment target: `%LOCALAPPDATA%\Programs\Komiq`.
    pub fn default_target(&self) -> Option<PathBuf> {
        self.programs_dir().map(|p| p.join(APP_NAME))
    }

    /// Program Files directory to search for `vswhere.exe`, preferring the x86 one.
    pub fn installer_root(&self) -> Option<&Path> {
        self.program_files_x86
            .as_deref()
            .or(self.program_files.as_deref())
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
