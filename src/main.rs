//! # komiq-deploy: The Main Entry Point
//!
//! Parses the command line, initializes logging, and runs the build-and-deploy pipeline:
//! read the Release build directory from Qt Creator's settings, find Qt/MSVC/jom, build
//! from scratch, then install the executable and its Qt runtime under
//! `%LOCALAPPDATA%\Programs\Komiq`.
//!
//! Windows only. On any other host it exits with status 1 before even parsing arguments.

use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, LevelFilter};
use simplelog::{Config, SimpleLogger};

mod builder;
mod config;
mod deploy;
mod error;
mod invariant_ppt;
mod pipeline;
mod settings;
mod system;
mod toolchain;

use config::HostEnvironment;
use error::DeployError;
use pipeline::{DeployOptions, Outcome};
use system::HostSystem;
use toolchain::ToolchainOverrides;

/// The Command Line Interface (CLI) configuration. There are no sub-commands.
#[derive(Parser)]
#[command(name = "komiq-deploy")]
#[command(
    about = "Build Komiq in Release mode and deploy it for the current user",
    long_about = None
)]
struct Cli {
    /// Project root containing CMakeLists.txt and CMakeLists.txt.user (default: current directory).
    #[arg(long, value_name = "DIR")]
    project: Option<PathBuf>,

    /// Qt SDK root, e.g. C:\Qt\5.15.2\msvc2019_64.
    #[arg(long, value_name = "DIR")]
    qt: Option<PathBuf>,

    /// Visual Studio / Build Tools installation root (skips vswhere).
    #[arg(long, value_name = "DIR")]
    msvc: Option<PathBuf>,

    /// Build accelerator executable (jom.exe or nmake.exe).
    #[arg(long, value_name = "FILE")]
    jom: Option<PathBuf>,

    /// Argument for the build accelerator. Repeatable. Replaces the default flags.
    ///
    /// Without this, jom gets `/nologo` and other accelerators get nothing.
    #[arg(long = "jom-arg", value_name = "ARG", allow_hyphen_values = true)]
    jom_args: Vec<String>,

    /// Deployment directory (default: %LOCALAPPDATA%\Programs\Komiq).
    #[arg(long, value_name = "DIR")]
    target: Option<PathBuf>,

    /// Display name of the Qt Creator build configuration to use.
    #[arg(long, default_value = settings::RELEASE)]
    profile: String,

    /// File name of the built executable inside the build directory.
    #[arg(long, default_value = builder::DEFAULT_ARTIFACT)]
    artifact: String,

    /// Deploy this already built executable instead of building the project.
    #[arg(long, value_name = "FILE", conflicts_with = "dry_run")]
    exe: Option<PathBuf>,

    /// Print the build script that would run, without building or deploying.
    #[arg(long)]
    dry_run: bool,

    /// Turn on verbose logging.
    ///
    /// - `-v`: Debug
    /// - `-vv`: Trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    if !cfg!(windows) {
        println!("{}", DeployError::UnsupportedPlatform);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // We ignore the result here as logging failure shouldn't crash the startup
    let _ = SimpleLogger::init(log_level, Config::default());

    match run(cli) {
        Ok(Outcome::Deployed(path)) => {
            println!("Deployed to {}", path.display());
        }
        Ok(Outcome::Planned { build_dir, script }) => {
            println!("--- DRY RUN: would wipe {} and run ---", build_dir.display());
            print!("{}", script.replace("\r\n", "\n"));
        }
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<Outcome> {
    let project_root = match cli.project {
        Some(p) => p,
        None => std::env::current_dir().context("cannot determine the current directory")?,
    };

    let env = HostEnvironment::from_env();
    debug!("Host environment: {:?}", env);

    let mut opts = DeployOptions::new(project_root);
    opts.profile = cli.profile;
    opts.toolchain = ToolchainOverrides {
        qt_root: cli.qt,
        msvc_root: cli.msvc,
        accelerator: cli.jom,
    };
    opts.accelerator_args = (!cli.jom_args.is_empty()).then_some(cli.jom_args);
    opts.target = cli.target;
    opts.artifact_name = cli.artifact;
    opts.prebuilt = cli.exe;
    opts.dry_run = cli.dry_run;

    info!("Deploying {:?} ({} profile)", opts.project_root, opts.profile);
    let outcome = pipeline::run(&opts, &env, &HostSystem)
        .with_context(|| format!("failed to deploy {}", opts.project_root.display()))?;
    Ok(outcome)
}
