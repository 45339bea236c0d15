//! # Pipeline
//!
//! Resolve settings and toolchain, build, deploy. Strictly one stage after the other;
//! the first error aborts the run.
//!
//! With a prebuilt executable only the Qt SDK and the target are resolved, and the
//! executable goes straight to the deployment stage.

use std::path::{Path, PathBuf};
use log::info;
use crate::builder::{self, BuildRequest};
use crate::config::HostEnvironment;
use crate::deploy;
use crate::error::DeployError;
use crate::settings;
use crate::system::SystemOps;
use crate::toolchain::{self, ToolchainOverrides};

/// Caller-supplied knobs for one run.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub project_root: PathBuf,
    /// Display name of the build profile to use.
    pub profile: String,
    pub toolchain: ToolchainOverrides,
    /// Explicit build-accelerator arguments.
    pub accelerator_args: Option<Vec<String>>,
    pub target: Option<PathBuf>,
    pub artifact_name: String,
    /// Deploy this executable as is. No settings file is read and nothing is built.
    pub prebuilt: Option<PathBuf>,
    /// Print the build script instead of running anything.
    pub dry_run: bool,
}

impl DeployOptions {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            profile: settings::RELEASE.to_string(),
            toolchain: ToolchainOverrides::default(),
            accelerator_args: None,
            target: None,
            artifact_name: builder::DEFAULT_ARTIFACT.to_string(),
            prebuilt: None,
            dry_run: false,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The executable now lives at this path.
    Deployed(PathBuf),
    /// Dry run: the script that would have been executed.
    Planned { build_dir: PathBuf, script: String },
}

/// Runs the whole pipeline.
pub fn run(
    opts: &DeployOptions,
    env: &HostEnvironment,
    system: &impl SystemOps,
) -> Result<Outcome, DeployError> {
    if let Some(exe) = &opts.prebuilt {
        return deploy_prebuilt(exe, opts, env, system);
    }

    let build_dir = settings::resolve_build_directory(&opts.project_root, &opts.profile)?;
    info!("Build directory: {:?}", build_dir);

    let toolchain = toolchain::locate(env, &opts.toolchain, system)?;

    // Resolve the target before building so a missing LOCALAPPDATA fails fast.
    let target = resolve_target(opts, env)?;

    let request = BuildRequest {
        project_root: &opts.project_root,
        build_dir: &build_dir,
        toolchain: &toolchain,
        accelerator_args: opts.accelerator_args.as_deref(),
        artifact_name: &opts.artifact_name,
    };

    if opts.dry_run {
        return Ok(Outcome::Planned {
            script: builder::synthesize_script(&request),
            build_dir,
        });
    }

    let artifact = builder::build(&request, system)?;
    let deployed = deploy::stage(&artifact, &target, &toolchain.windeployqt(), system)?;
    Ok(Outcome::Deployed(deployed))
}

fn deploy_prebuilt(
    exe: &Path,
    opts: &DeployOptions,
    env: &HostEnvironment,
    system: &impl SystemOps,
) -> Result<Outcome, DeployError> {
    info!("Deploying prebuilt {:?}", exe);
    let qt_root = toolchain::locate_qt(env, &opts.toolchain)?;
    let target = resolve_target(opts, env)?;
    let deployed = deploy::stage(exe, &target, &toolchain::windeployqt_in(&qt_root), system)?;
    Ok(Outcome::Deployed(deployed))
}

fn resolve_target(opts: &DeployOptions, env: &HostEnvironment) -> Result<PathBuf, DeployError> {
    match &opts.target {
        Some(t) => Ok(t.clone()),
        None => env.default_target().ok_or(DeployError::TargetUnresolved),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::MockSystem;
    use crate::toolchain::{JOM, QT_KIT, VSWHERE};

    /// A project, a Qt Creator settings file pointing at `<tmp>/build`, and a fake toolchain.
    struct Fixture {
        tmp: tempfile::TempDir,
        env: HostEnvironment,
        opts: DeployOptions,
        vswhere: PathBuf,
        msvc: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let root = tmp.path();
            let project = root.join("komiq");
            let build = root.join("build");
            std::fs::create_dir_all(&project).unwrap();
            std::fs::write(project.join("CMakeLists.txt"), "project(Komiq)\n").unwrap();
            std::fs::write(
                project.join(settings::SETTINGS_FILE),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?>
<qtcreator>
 <data>
  <valuemap type="QVariantMap">
   <valuemap type="QVariantMap" key="ProjectExplorer.Target.BuildConfiguration.0">
    <value type="QString" key="ProjectExplorer.BuildConfiguration.BuildDirectory">{}</value>
    <value type="QString" key="ProjectExplorer.ProjectConfiguration.DisplayName">Release</value>
    <value type="QString" key="ProjectExplorer.ProjectConfiguration.Id">CMakeProjectManager.CMakeBuildConfiguration</value>
   </valuemap>
  </valuemap>
 </data>
</qtcreator>
"#,
                    build.display()
                ),
            )
            .unwrap();

            let app_data = root.join("AppData");
            let programs = app_data.join("Programs");
            let qt = QT_KIT.iter().fold(programs.clone(), |p, c| p.join(c));
            std::fs::create_dir_all(&qt).unwrap();
            let jom = JOM.iter().fold(programs.clone(), |p, c| p.join(c));
            std::fs::create_dir_all(jom.parent().unwrap()).unwrap();
            std::fs::write(&jom, b"").unwrap();

            let pf = root.join("ProgramFiles");
            let vswhere = VSWHERE.iter().fold(pf.clone(), |p, c| p.join(c));
            std::fs::create_dir_all(vswhere.parent().unwrap()).unwrap();
            std::fs::write(&vswhere, b"").unwrap();
            let msvc = pf.join("VS");
            std::fs::create_dir_all(&msvc).unwrap();

            let mut opts = DeployOptions::new(&project);
            opts.artifact_name = "app.exe".to_string();
            opts.target = Some(root.join("deploy"));

            Self {
                env: HostEnvironment {
                    local_app_data: Some(app_data),
                    program_files_x86: Some(pf),
                    program_files: None,
                },
                opts,
                vswhere,
                msvc,
                tmp,
            }
        }

        fn system(&self, script_exit: i32, outputs: &[(&str, &str)]) -> MockSystem {
            let mut system = MockSystem::with_stdout(&self.vswhere, &self.msvc.to_string_lossy());
            system.script_exit = script_exit;
            system.build_outputs = outputs
                .iter()
                .map(|(name, bytes)| (PathBuf::from(name), bytes.as_bytes().to_vec()))
                .collect();
            system
        }

        fn build_dir(&self) -> PathBuf {
            self.tmp.path().join("build")
        }
    }

    #[test]
    fn test_end_to_end() {
        let fx = Fixture::new();
        let system = fx.system(0, &[("app.exe", "MZ komiq")]);

        let outcome = run(&fx.opts, &fx.env, &system).unwrap();

        let expected = fx.tmp.path().join("deploy").join("app.exe");
        assert_eq!(outcome, Outcome::Deployed(expected.clone()));
        assert_eq!(std::fs::read(&expected).unwrap(), b"MZ komiq");
        assert_eq!(
            std::fs::read(&expected).unwrap(),
            std::fs::read(fx.build_dir().join("app.exe")).unwrap()
        );

        let calls = system.quiet_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.ends_with("bin/windeployqt.exe"));
    }

    #[test]
    fn test_rerun_starts_from_empty_build_dir() {
        let fx = Fixture::new();
        let system = fx.system(0, &[("app.exe", "1"), ("main.obj", "obj")]);

        run(&fx.opts, &fx.env, &system).unwrap();
        std::fs::write(fx.build_dir().join("leftover.txt"), b"stale").unwrap();
        run(&fx.opts, &fx.env, &system).unwrap();

        assert_eq!(*system.entries_before_build.lock().unwrap(), vec![0, 0]);
        assert!(!fx.build_dir().join("leftover.txt").exists());
        assert_eq!(system.quiet_count(), 2);
    }

    #[test]
    fn test_build_failure_stops_before_deploy() {
        let fx = Fixture::new();
        let system = fx.system(1, &[("app.exe", "x")]);

        let err = run(&fx.opts, &fx.env, &system).unwrap_err();

        assert!(matches!(err, DeployError::BuildFailed { code: Some(1) }), "{err:?}");
        assert_eq!(system.quiet_count(), 0);
        assert!(!fx.tmp.path().join("deploy").exists());
    }

    #[test]
    fn test_missing_artifact_never_bundles() {
        let fx = Fixture::new();
        let system = fx.system(0, &[("other.exe", "x")]);

        let err = run(&fx.opts, &fx.env, &system).unwrap_err();

        assert!(matches!(err, DeployError::BuildArtifactMissing { .. }), "{err:?}");
        assert_eq!(system.quiet_count(), 0);
    }

    #[test]
    fn test_missing_profile_aborts_before_toolchain() {
        let fx = Fixture::new();
        let mut opts = fx.opts.clone();
        opts.profile = "Profile".to_string();
        let system = MockSystem::new();

        let err = run(&opts, &fx.env, &system).unwrap_err();
        assert!(matches!(err, DeployError::ConfigurationNotFound { .. }));
        assert_eq!(system.script_count(), 0);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let fx = Fixture::new();
        let mut opts = fx.opts.clone();
        opts.dry_run = true;
        opts.accelerator_args = Some(vec!["/J".to_string(), "4".to_string()]);
        let system = fx.system(0, &[("app.exe", "x")]);

        let outcome = run(&opts, &fx.env, &system).unwrap();

        match outcome {
            Outcome::Planned { build_dir, script } => {
                assert_eq!(build_dir, fx.build_dir());
                assert!(script.contains("jom.exe\" /J 4 || exit /b 1"), "{script}");
            }
            other => panic!("expected a plan, got {other:?}"),
        }
        assert_eq!(system.script_count(), 0);
        assert!(!fx.build_dir().exists());
    }

    #[test]
    fn test_default_target_under_local_app_data() {
        let fx = Fixture::new();
        let mut opts = fx.opts.clone();
        opts.target = None;
        let system = fx.system(0, &[("app.exe", "x")]);

        let outcome = run(&opts, &fx.env, &system).unwrap();
        let Outcome::Deployed(path) = outcome else {
            panic!("expected deploy");
        };
        assert_eq!(
            path,
            Path::new(fx.env.local_app_data.as_ref().unwrap())
                .join("Programs")
                .join("Komiq")
                .join("app.exe")
        );
    }

    #[test]
    fn test_prebuilt_skips_settings_and_build() {
        let fx = Fixture::new();
        std::fs::remove_file(fx.opts.project_root.join(settings::SETTINGS_FILE)).unwrap();
        let exe = fx.tmp.path().join("dist").join("Komiq.exe");
        std::fs::create_dir_all(exe.parent().unwrap()).unwrap();
        std::fs::write(&exe, b"MZ prebuilt").unwrap();
        let mut opts = fx.opts.clone();
        opts.prebuilt = Some(exe);
        // No vswhere output registered: MSVC must not be looked up.
        let system = MockSystem::new();

        let outcome = run(&opts, &fx.env, &system).unwrap();

        let expected = fx.tmp.path().join("deploy").join("Komiq.exe");
        assert_eq!(outcome, Outcome::Deployed(expected.clone()));
        assert_eq!(std::fs::read(&expected).unwrap(), b"MZ prebuilt");
        assert_eq!(system.script_count(), 0);
        assert!(!fx.build_dir().exists());

        let calls = system.quiet_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.ends_with("msvc2019_64/bin/windeployqt.exe"));
    }

    #[test]
    fn test_prebuilt_missing_exe() {
        let fx = Fixture::new();
        let mut opts = fx.opts.clone();
        opts.prebuilt = Some(fx.tmp.path().join("nowhere").join("Komiq.exe"));
        let system = MockSystem::new();

        let err = run(&opts, &fx.env, &system).unwrap_err();

        assert!(matches!(err, DeployError::BuildArtifactMissing { .. }), "{err:?}");
        assert_eq!(system.quiet_count(), 0);
        assert!(!fx.tmp.path().join("deploy").exists());
    }

    #[test]
    fn test_prebuilt_needs_qt() {
        let fx = Fixture::new();
        let exe = fx.tmp.path().join("Komiq.exe");
        std::fs::write(&exe, b"MZ").unwrap();
        let mut opts = fx.opts.clone();
        opts.prebuilt = Some(exe);
        opts.toolchain.qt_root = Some(fx.tmp.path().join("no-qt"));

        let err = run(&opts, &fx.env, &MockSystem::new()).unwrap_err();
        assert!(matches!(err, DeployError::ToolchainNotFound { component: "Qt SDK", .. }));
    }
}
