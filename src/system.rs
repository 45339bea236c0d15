use std::ffi::OsString;
use std::path::Path;
#[cfg(test)]
use std::path::PathBuf;
use std::process::{Command, Stdio};
use anyhow::{Result, bail, Context};

/// How an external process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self { code: status.code() }
    }
}

/// Abstraction over every external process the pipeline launches.
/// This lets the build and deploy stages run in tests without MSVC, Qt or cmd.exe.
///
/// All calls block until the child exits. There is no timeout.
pub trait SystemOps {
    /// Run `program args...` and return its trimmed standard output.
    /// Fails if it cannot be spawned or exits non-zero.
    fn capture_stdout(&self, program: &Path, args: &[&str]) -> Result<String>;

    /// Execute a batch script with `cwd` as its working directory.
    fn run_script(&self, script: &Path, cwd: &Path) -> Result<ProcessExit>;

    /// Run `program args...` with standard output discarded. Standard error is inherited.
    fn run_quiet(&self, program: &Path, args: &[OsString]) -> Result<ProcessExit>;
}

/// The real host (Production).
pub struct HostSystem;

impl SystemOps for HostSystem {
    fn capture_stdout(&self, program: &Path, args: &[&str]) -> Result<String> {
        let output = Command::new(program)
            .args(args)
            .stderr(Stdio::inherit())
            .output()
            .with_context(|| format!("failed to execute {}", program.display()))?;

        if !output.status.success() {
            bail!("{} exited with {:?}", program.display(), output.status.code());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_script(&self, script: &Path, cwd: &Path) -> Result<ProcessExit> {
        let status = batch_command(script)?
            .current_dir(cwd)
            .status()
            .with_context(|| format!("failed to execute {}", script.display()))?;
        Ok(status.into())
    }

    fn run_quiet(&self, program: &Path, args: &[OsString]) -> Result<ProcessExit> {
        let status = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .status()
            .with_context(|| format!("failed to execute {}", program.display()))?;
        Ok(status.into())
    }
}

/// `cmd /C` keeps every `call`ed environment script in one session.
#[cfg(windows)]
fn batch_command(script: &Path) -> Result<Command> {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(script);
    Ok(cmd)
}

#[cfg(not(windows))]
fn batch_command(script: &Path) -> Result<Command> {
    bail!("cannot run batch script {} without cmd.exe", script.display())
}

/// A Mock System for Testing.
///
/// `run_script` simulates a build: it records the script text and how many entries the
/// working directory held, then writes `build_outputs` into that directory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockSystem {
    /// What `capture_stdout` returns, keyed by program. Missing keys fail like a spawn error.
    pub stdout: std::sync::Mutex<std::collections::HashMap<PathBuf, String>>,
    /// Exit code for `run_script`.
    pub script_exit: i32,
    /// Make `run_script` fail as if the shell could not be started.
    pub script_error: bool,
    /// Exit code for `run_quiet`.
    pub quiet_exit: i32,
    /// Files (relative to the script's cwd) the simulated build produces.
    pub build_outputs: Vec<(PathBuf, Vec<u8>)>,
    pub scripts: std::sync::Mutex<Vec<String>>,
    pub script_paths: std::sync::Mutex<Vec<PathBuf>>,
    pub entries_before_build: std::sync::Mutex<Vec<usize>>,
    pub quiet_calls: std::sync::Mutex<Vec<(PathBuf, Vec<OsString>)>>,
}

#[cfg(test)]
impl MockSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stdout(program: &Path, out: &str) -> Self {
        let mut map = std::collections::HashMap::new();
        map.insert(program.to_path_buf(), out.to_string());
        Self {
            stdout: std::sync::Mutex::new(map),
            ..Default::default()
        }
    }

    pub fn script_count(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }

    pub fn quiet_count(&self) -> usize {
        self.quiet_calls.lock().unwrap().len()
    }
}

#[cfg(test)]
impl SystemOps for MockSystem {
    fn capture_stdout(&self, program: &Path, _args: &[&str]) -> Result<String> {
        let map = self.stdout.lock().unwrap();
        map.get(program)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("{} not found in mock system", program.display()))
    }

    fn run_script(&self, script: &Path, cwd: &Path) -> Result<ProcessExit> {
        let text = std::fs::read_to_string(script)?;
        self.scripts.lock().unwrap().push(text);
        self.script_paths.lock().unwrap().push(script.to_path_buf());
        if self.script_error {
            bail!("mock shell failed to start");
        }
        self.entries_before_build
            .lock()
            .unwrap()
            .push(std::fs::read_dir(cwd)?.count());

        if self.script_exit == 0 {
            for (rel, bytes) in &self.build_outputs {
                std::fs::write(cwd.join(rel), bytes)?;
            }
        }
        Ok(ProcessExit { code: Some(self.script_exit) })
    }

    fn run_quiet(&self, program: &Path, args: &[OsString]) -> Result<ProcessExit> {
        self.quiet_calls
            .lock()
            .unwrap()
            .push((program.to_path_buf(), args.to_vec()));
        Ok(ProcessExit { code: Some(self.quiet_exit) })
    }
}
