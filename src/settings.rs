//! # Project Settings
//!
//! Reads the Qt Creator per-project settings file (`CMakeLists.txt.user`) to find out
//! where the user configured the Release build to live.
//!
//! The file is an XML tree of `<valuemap>` / `<value key="...">` nodes. Every build
//! configuration is a `valuemap` whose direct `value` children include an id, a display
//! name, and a build directory:
//!
//! ```xml
//! <valuemap type="QVariantMap" key="ProjectExplorer.Target.BuildConfiguration.1">
//!   <value type="QString" key="ProjectExplorer.BuildConfiguration.BuildDirectory">C:/src/build-Release</value>
//!   <value type="QString" key="ProjectExplorer.ProjectConfiguration.DisplayName">Release</value>
//!   <value type="QString" key="ProjectExplorer.ProjectConfiguration.Id">CMakeProjectManager.CMakeBuildConfiguration</value>
//! </valuemap>
//! ```
//!
//! We never write this file.

use std::path::{Path, PathBuf};
use log::debug;
use roxmltree::{Document, Node};
use crate::error::DeployError;

/// File name of the settings document, relative to the project root.
pub const SETTINGS_FILE: &str = "CMakeLists.txt.user";

/// Kind id Qt Creator gives to CMake build configurations.
pub const CMAKE_BUILD_CONFIGURATION: &str = "CMakeProjectManager.CMakeBuildConfiguration";

/// Display name of the profile we build by default.
pub const RELEASE: &str = "Release";

const KEY_ID: &str = "ProjectExplorer.ProjectConfiguration.Id";
const KEY_DISPLAY_NAME: &str = "ProjectExplorer.ProjectConfiguration.DisplayName";
const KEY_DEFAULT_DISPLAY_NAME: &str = "ProjectExplorer.ProjectConfiguration.DefaultDisplayName";
const KEY_BUILD_DIRECTORY: &str = "ProjectExplorer.BuildConfiguration.BuildDirectory";

/// One build configuration entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildProfile {
    pub kind: String,
    pub display_name: String,
    pub build_directory: PathBuf,
}

/// All build profiles in the settings document, in document order.
#[derive(Debug, Clone, Default)]
pub struct ProjectConfiguration {
    pub profiles: Vec<BuildProfile>,
}

impl ProjectConfiguration {
    /// Parses a settings document.
    pub fn parse(xml: &str) -> Result<Self, roxmltree::Error> {
        let doc = Document::parse(xml)?;
        let profiles = doc
            .descendants()
            .filter(|n| n.has_tag_name("valuemap"))
            .filter_map(profile_from_node)
            .collect();
        Ok(Self { profiles })
    }

    /// The first profile (document order) matching both `kind` and `display_name`.
    pub fn select(&self, kind: &str, display_name: &str) -> Option<&BuildProfile> {
        self.profiles
            .iter()
            .find(|p| p.kind == kind && p.display_name == display_name)
    }
}

/// Builds a profile from a `valuemap` if it carries all three keys.
fn profile_from_node(node: Node) -> Option<BuildProfile> {
    let kind = child_value(node, KEY_ID)?;
    let build_directory = child_value(node, KEY_BUILD_DIRECTORY)?;

    // Qt Creator leaves DisplayName empty until the user renames the configuration.
    let display_name = child_value(node, KEY_DISPLAY_NAME)
        .filter(|s| !s.is_empty())
        .or_else(|| child_value(node, KEY_DEFAULT_DISPLAY_NAME))?;

    Some(BuildProfile {
        kind,
        display_name,
        build_directory: PathBuf::from(build_directory),
    })
}

/// Text of the direct `<value key="...">` child of `node`. An empty element yields "".
fn child_value(node: Node, key: &str) -> Option<String> {
    node.children()
        .filter(|c| c.has_tag_name("value"))
        .find(|c| c.attribute("key") == Some(key))
        .map(|c| c.text().unwrap_or_default().trim().to_string())
}

/// Finds the build directory of the `profile` CMake configuration of the project at
/// `project_root`.
///
/// Fails with `ConfigurationNotFound` if the settings file is missing, malformed, or
/// has no such profile. Duplicate matches resolve to the first one in the file.
pub fn resolve_build_directory(
    project_root: &Path,
    profile: &str,
) -> Result<PathBuf, DeployError> {
    let settings = project_root.join(SETTINGS_FILE);
    let not_found = |reason: String| DeployError::ConfigurationNotFound {
        settings: settings.clone(),
        profile: profile.to_string(),
        reason,
    };

    let xml = std::fs::read_to_string(&settings)
        .map_err(|e| not_found(format!("cannot read settings: {}", e)))?;
    let config = ProjectConfiguration::parse(&xml)
        .map_err(|e| not_found(format!("malformed settings: {}", e)))?;

    debug!("{} build profiles in {:?}", config.profiles.len(), settings);

    let selected = config
        .select(CMAKE_BUILD_CONFIGURATION, profile)
        .ok_or_else(|| {
            not_found(format!(
                "{} profiles present, none is a CMake build configuration named '{}' \
                 (configure the project in Qt Creator first)",
                config.profiles.len(),
                profile
            ))
        })?;

    if selected.build_directory.as_os_str().is_empty() {
        return Err(not_found("profile has an empty build directory".to_string()));
    }

    debug!("Selected profile '{}' -> {:?}", selected.display_name, selected.build_directory);
    Ok(selected.build_directory.clone())
}
