//! # Toolchain Discovery
//!
//! Finds the three things the build script needs to activate and invoke:
//!
//! 1.  **Qt SDK root** (e.g. `...\Qt\5.15.2\msvc2019_64`): default under
//!     `%LOCALAPPDATA%\Programs\Qt`.
//! 2.  **MSVC root**: asked from the Visual Studio installer's `vswhere.exe`.
//! 3.  **Build accelerator**: jom as shipped with Qt Creator, or anything nmake-compatible.
//!
//! Each one can be overridden from the command line, in which case no discovery happens for it.

use std::path::{Path, PathBuf};
use log::{debug, info};
use crate::config::HostEnvironment;
use crate::error::DeployError;
use crate::system::SystemOps;

/// Qt version/kit the project is developed against.
pub const QT_KIT: &[&str] = &["Qt", "5.15.2", "msvc2019_64"];

/// jom as installed by the Qt online installer.
pub const JOM: &[&str] = &["Qt", "Tools", "QtCreator", "bin", "jom", "jom.exe"];

/// vswhere, relative to Program Files.
pub const VSWHERE: &[&str] = &["Microsoft Visual Studio", "Installer", "vswhere.exe"];

/// Latest install, prereleases included, any product (Build Tools count).
pub const VSWHERE_ARGS: &[&str] = &[
    "-latest",
    "-prerelease",
    "-products",
    "*",
    "-property",
    "installationPath",
];

/// Resolved toolchain locations. Immutable once located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainPaths {
    pub qt_root: PathBuf,
    pub msvc_root: PathBuf,
    pub accelerator: PathBuf,
}

impl ToolchainPaths {
    /// `<qt>\bin\qtenv2.bat`
    pub fn qt_env_script(&self) -> PathBuf {
        self.qt_root.join("bin").join("qtenv2.bat")
    }

    /// `<msvc>\VC\Auxiliary\Build\vcvars64.bat`
    pub fn msvc_env_script(&self) -> PathBuf {
        self.msvc_root
            .join("VC")
            .join("Auxiliary")
            .join("Build")
            .join("vcvars64.bat")
    }

    /// `<qt>\bin\windeployqt.exe`
    pub fn windeployqt(&self) -> PathBuf {
        windeployqt_in(&self.qt_root)
    }
}

/// `windeployqt.exe` of the Qt SDK at `qt_root`.
pub fn windeployqt_in(qt_root: &Path) -> PathBuf {
    qt_root.join("bin").join("windeployqt.exe")
}

/// Explicit paths that replace discovery.
#[derive(Debug, Clone, Default)]
pub struct ToolchainOverrides {
    pub qt_root: Option<PathBuf>,
    pub msvc_root: Option<PathBuf>,
    pub accelerator: Option<PathBuf>,
}

/// Resolves all three toolchain paths. Fails on the first one that cannot be found.
pub fn locate(
    env: &HostEnvironment,
    overrides: &ToolchainOverrides,
    system: &impl SystemOps,
) -> Result<ToolchainPaths, DeployError> {
    let qt_root = locate_qt(env, overrides)?;

    let msvc_root = match &overrides.msvc_root {
        Some(p) => p.clone(),
        None => query_msvc_root(env, system)?,
    };
    require(&msvc_root, "MSVC", Path::is_dir)?;

    let accelerator = match &overrides.accelerator {
        Some(p) => p.clone(),
        None => default_under_programs(env, "build accelerator", JOM)?,
    };
    require(&accelerator, "build accelerator", Path::is_file)?;

    let paths = ToolchainPaths {
        qt_root,
        msvc_root,
        accelerator,
    };
    info!("Qt: {:?}", paths.qt_root);
    info!("MSVC: {:?}", paths.msvc_root);
    info!("Accelerator: {:?}", paths.accelerator);
    Ok(paths)
}

/// Resolves only the Qt SDK root. Deploying a prebuilt executable needs nothing else.
pub fn locate_qt(
    env: &HostEnvironment,
    overrides: &ToolchainOverrides,
) -> Result<PathBuf, DeployError> {
    let qt_root = match &overrides.qt_root {
        Some(p) => p.clone(),
        None => default_under_programs(env, "Qt SDK", QT_KIT)?,
    };
    require(&qt_root, "Qt SDK", Path::is_dir)?;
    Ok(qt_root)
}

/// Asks `vswhere.exe` for the newest Visual Studio / Build Tools installation.
fn query_msvc_root(
    env: &HostEnvironment,
    system: &impl SystemOps,
) -> Result<PathBuf, DeployError> {
    let not_found = |reason: String| DeployError::ToolchainNotFound {
        component: "MSVC",
        reason,
    };

    let root = env
        .installer_root()
        .ok_or_else(|| not_found("neither ProgramFiles(x86) nor ProgramFiles is set".to_string()))?;
    let vswhere = join_all(root, VSWHERE);
    if !vswhere.is_file() {
        return Err(not_found(format!("{} does not exist", vswhere.display())));
    }

    debug!("Querying {:?}", vswhere);
    let out = system
        .capture_stdout(&vswhere, VSWHERE_ARGS)
        .map_err(|e| not_found(format!("{:#}", e)))?;

    // Only the first line; vswhere prints one path per install and -latest yields one.
    let path = out.lines().next().map(str::trim).unwrap_or_default();
    if path.is_empty() {
        return Err(not_found("vswhere found no installation".to_string()));
    }
    Ok(PathBuf::from(path))
}

fn default_under_programs(
    env: &HostEnvironment,
    component: &'static str,
    parts: &[&str],
) -> Result<PathBuf, DeployError> {
    env.programs_dir()
        .map(|p| join_all(&p, parts))
        .ok_or_else(|| DeployError::ToolchainNotFound {
            component,
            reason: "LOCALAPPDATA is not set; pass the path explicitly".to_string(),
        })
}

fn require(
    path: &Path,
    component: &'static str,
    check: fn(&Path) -> bool,
) -> Result<(), DeployError> {
    if check(path) {
        Ok(())
    } else {
        Err(DeployError::ToolchainNotFound {
            component,
            reason: format!("{} does not exist", path.display()),
        })
    }
}

fn join_all(base: &Path, parts: &[&str]) -> PathBuf {
    parts.iter().fold(base.to_path_buf(), |acc, p| acc.join(p))
}
