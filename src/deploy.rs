//! # Deployment
//!
//! Stages a built executable into the install directory and lets `windeployqt` copy the
//! Qt DLLs, plugins and translations next to it.

use std::ffi::OsString;
use std::fs::{self, FileTimes, OpenOptions};
use std::path::{Path, PathBuf};
use log::{debug, info};
use crate::error::DeployError;
use crate::invariant_ppt::{assert_invariant, ARTIFACT_PRESENT};
use crate::system::SystemOps;

/// Copies `artifact` into `target` and bundles its Qt runtime.
///
/// Returns the path of the deployed executable.
pub fn stage(
    artifact: &Path,
    target: &Path,
    windeployqt: &Path,
    system: &impl SystemOps,
) -> Result<PathBuf, DeployError> {
    if !artifact.is_file() {
        return Err(DeployError::BuildArtifactMissing {
            path: artifact.to_path_buf(),
        });
    }

    let file_name = artifact
        .file_name()
        .ok_or_else(|| DeployError::BuildArtifactMissing {
            path: artifact.to_path_buf(),
        })?;

    fs::create_dir_all(target).map_err(DeployError::io("deploy", "failed to create", target))?;

    let deployed = target.join(file_name);
    copy_preserving_times(artifact, &deployed)?;
    info!("Copied {:?} -> {:?}", artifact, deployed);

    assert_invariant(deployed.is_file(), ARTIFACT_PRESENT, Some("Deploy"));
    bundle(&deployed, windeployqt, system)?;

    Ok(deployed)
}

/// Like `shutil.copy2`: contents, permissions and modified/accessed times.
fn copy_preserving_times(from: &Path, to: &Path) -> Result<(), DeployError> {
    let meta = fs::metadata(from).map_err(DeployError::io("deploy", "failed to stat", from))?;
    fs::copy(from, to).map_err(DeployError::io("deploy", "failed to copy to", to))?;

    let mut times = FileTimes::new();
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }

    OpenOptions::new()
        .write(true)
        .open(to)
        .and_then(|f| f.set_times(times))
        .map_err(DeployError::io("deploy", "failed to set timestamps on", to))
}

/// Runs `windeployqt <exe>` with its chatter discarded.
fn bundle(exe: &Path, windeployqt: &Path, system: &impl SystemOps) -> Result<(), DeployError> {
    debug!("Running {:?} on {:?}", windeployqt, exe);
    let args: Vec<OsString> = vec![exe.as_os_str().to_os_string()];

    let exit = system
        .run_quiet(windeployqt, &args)
        .map_err(|e| DeployError::Io {
            stage: "deploy",
            action: "failed to run",
            path: windeployqt.to_path_buf(),
            source: std::io::Error::other(format!("{:#}", e)),
        })?;

    if !exit.success() {
        return Err(DeployError::BundlingFailed { code: exit.code });
    }
    Ok(())
}
