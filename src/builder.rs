//! # Build Logic
//!
//! Turns a build directory and a located toolchain into a `Komiq.exe`:
//! 1. Wipe and recreate the build directory (every build is a clean build).
//! 2. Write a throwaway `.bat` that activates Qt and MSVC, runs CMake, then jom/nmake.
//! 3. Run it through `cmd /C` and wait.
//! 4. Delete the script whatever happened.
//!
//! The activation scripts only change the environment of the `cmd` session that calls
//! them, which is why everything goes through one script instead of separate processes.

use std::io::Write;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use crate::error::DeployError;
use crate::invariant_ppt::{assert_invariant, CLEAN_BUILD_DIR};
use crate::system::SystemOps;
use crate::toolchain::ToolchainPaths;

/// File name of the executable CMake produces at the root of the build directory.
pub const DEFAULT_ARTIFACT: &str = "Komiq.exe";

/// Suppresses jom's startup banner.
const JOM_NO_BANNER: &str = "/nologo";

/// Everything one build needs.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    /// Directory holding `CMakeLists.txt`.
    pub project_root: &'a Path,
    /// Owned by this build; destroyed and recreated.
    pub build_dir: &'a Path,
    pub toolchain: &'a ToolchainPaths,
    /// Explicit accelerator arguments. `None` means "infer from the accelerator's name".
    pub accelerator_args: Option<&'a [String]>,
    pub artifact_name: &'a str,
}

impl BuildRequest<'_> {
    /// Where the artifact will be if the build succeeds.
    pub fn artifact_path(&self) -> PathBuf {
        self.build_dir.join(self.artifact_name)
    }
}

/// Arguments passed to the build accelerator.
///
/// Explicit arguments always win. Without them, jom gets `/nologo` and anything else
/// (nmake, ninja...) gets nothing.
pub fn accelerator_flags(accelerator: &Path, explicit: Option<&[String]>) -> Vec<String> {
    if let Some(args) = explicit {
        return args.to_vec();
    }
    let is_jom = accelerator
        .file_stem()
        .is_some_and(|s| s.to_string_lossy().eq_ignore_ascii_case("jom"));
    if is_jom {
        vec![JOM_NO_BANNER.to_string()]
    } else {
        Vec::new()
    }
}

/// Renders the batch script for `req`. Lines are CRLF-terminated for cmd.exe.
pub fn synthesize_script(req: &BuildRequest) -> String {
    let tc = req.toolchain;
    let make_program = format!("\"-DCMAKE_MAKE_PROGRAM={}\"", tc.accelerator.display());

    let mut invoke = quote_path(&tc.accelerator);
    for flag in accelerator_flags(&tc.accelerator, req.accelerator_args) {
        invoke.push(' ');
        invoke.push_str(&quote_arg(&flag));
    }

    let lines = [
        "@echo off".to_string(),
        format!("call {} || exit /b 1", quote_path(&tc.qt_env_script())),
        format!("call {} || exit /b 1", quote_path(&tc.msvc_env_script())),
        format!("cd /d {} || exit /b 1", quote_path(req.build_dir)),
        format!(
            "cmake -G \"NMake Makefiles\" -DCMAKE_BUILD_TYPE=Release {} {} || exit /b 1",
            make_program,
            quote_path(req.project_root)
        ),
        format!("{} || exit /b 1", invoke),
    ];

    let mut script = lines.join("\r\n");
    script.push_str("\r\n");
    script
}

/// Paths are always quoted: `&`, `(`, `^` and friends are legal in Windows paths
/// but split the line in cmd.exe. A path can never contain `"`.
fn quote_path(p: &Path) -> String {
    format!("\"{}\"", p.display())
}

/// Accelerator arguments are quoted only when cmd.exe would otherwise split or expand them.
fn quote_arg(s: &str) -> String {
    let special = |c: char| c.is_whitespace() || "\"&|<>()^%".contains(c);
    if s.is_empty() || s.contains(special) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Removes `dir` (if present) and creates it again, empty.
pub fn recreate_build_dir(dir: &Path) -> Result<(), DeployError> {
    if dir.exists() {
        debug!("Removing previous build directory {:?}", dir);
        std::fs::remove_dir_all(dir).map_err(DeployError::io("build", "failed to remove", dir))?;
    }
    std::fs::create_dir_all(dir).map_err(DeployError::io("build", "failed to create", dir))?;

    let empty = std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    assert_invariant(empty, CLEAN_BUILD_DIR, Some("Builder"));
    Ok(())
}

/// Runs a clean build and returns where the artifact should be.
///
/// The returned path is not checked; the deploy step validates it.
pub fn build(req: &BuildRequest, system: &impl SystemOps) -> Result<PathBuf, DeployError> {
    recreate_build_dir(req.build_dir)?;

    let script_text = synthesize_script(req);
    let script = write_script(&script_text)?;
    debug!("Build script {:?}:\n{}", &*script, script_text);

    info!("Building in {:?}...", req.build_dir);
    let result = system.run_script(&script, req.build_dir);

    // TempPath deletes on drop too; closing explicitly surfaces the error in the log.
    if let Err(e) = script.close() {
        warn!("Failed to remove build script: {}", e);
    }

    let exit = result.map_err(|e| DeployError::Io {
        stage: "build",
        action: "failed to run build script in",
        path: req.build_dir.to_path_buf(),
        source: std::io::Error::other(format!("{:#}", e)),
    })?;
    if !exit.success() {
        return Err(DeployError::BuildFailed { code: exit.code });
    }

    Ok(req.artifact_path())
}

/// Writes the script to `%TEMP%\komiq-build-XXXX.bat`. The file goes away when the guard drops.
fn write_script(text: &str) -> Result<tempfile::TempPath, DeployError> {
    let tmp = std::env::temp_dir();
    let mut file = tempfile::Builder::new()
        .prefix("komiq-build-")
        .suffix(".bat")
        .tempfile()
        .map_err(DeployError::io("build", "failed to create script in", &tmp))?;
    file.write_all(text.as_bytes())
        .and_then(|_| file.flush())
        .map_err(DeployError::io("build", "failed to write", file.path()))?;

    // Drop the handle so cmd.exe can open the file; the path guard still owns cleanup.
    Ok(file.into_temp_path())
}
