//! # Error Taxonomy
//!
//! Every stage of the pipeline fails with one of these. None of them are retried:
//! given the same inputs, a build or a lookup fails the same way every time.
//! `main` wraps them in `anyhow` and exits non-zero.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Only supported on Windows.")]
    UnsupportedPlatform,

    #[error("configuration: no '{profile}' build profile in {}: {reason}", settings.display())]
    ConfigurationNotFound {
        settings: PathBuf,
        profile: String,
        reason: String,
    },

    #[error("toolchain: {component} not found: {reason}")]
    ToolchainNotFound {
        component: &'static str,
        reason: String,
    },

    #[error("build: script exited with {}", describe_exit(*code))]
    BuildFailed { code: Option<i32> },

    #[error("build: reported success but no artifact at {}", path.display())]
    BuildArtifactMissing { path: PathBuf },

    #[error("deploy: no deployment target (LOCALAPPDATA is not set); pass --target")]
    TargetUnresolved,

    #[error("deploy: windeployqt exited with {}", describe_exit(*code))]
    BundlingFailed { code: Option<i32> },

    #[error("{stage}: {action} {}", path.display())]
    Io {
        stage: &'static str,
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DeployError {
    /// Shorthand for wrapping a filesystem error with the stage that hit it.
    pub fn io(
        stage: &'static str,
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| DeployError::Io {
            stage,
            action,
            path,
            source,
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
