//! Adapter configuration.
//!
//! Handles loading, validating, and merging `adapter.toml`. The file lives in
//! the project directory next to `next.config.js`; every key is optional and
//! overrides the stock defaults.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [paths]
//! builder_output = ".serverless_nextjs"   # Where the serverless builder writes
//! build_dir = "build"                     # proxy-config.json and bundles
//! launcher = "cicd-tool/launcher.ts"      # Bundle entry point source
//! bridge = "cicd-tool/bridge.ts"          # Lambda event <-> HTTP bridge source
//!
//! [upstream]
//! command = []                            # Manifest-producing build, empty = skip
//!
//! [bundler]
//! command = ["npx", "ncc", "build", "{entry}", "-o", "{out_dir}"]
//!
//! [archive]
//! compression_level = 5                   # Deflate level (0-9)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse — override just the values you want:
//!
//! ```toml
//! [upstream]
//! command = ["node", "scripts/build-serverless.js"]
//! ```
//!
//! Unknown keys are rejected to catch typos early. `build_dir` is deleted on
//! every build and must be a project subdirectory that holds no inputs.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Config file name, looked up in the project directory.
pub const CONFIG_FILE: &str = "adapter.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Adapter configuration loaded from `adapter.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    /// Input and output locations, relative to the project directory.
    pub paths: PathsConfig,
    /// The build that produces the manifests.
    pub upstream: UpstreamConfig,
    /// The bundler that compiles each bundle's entry point.
    pub bundler: BundlerConfig,
    /// Bundle archive settings.
    pub archive: ArchiveConfig,
}

impl AdapterConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("paths.builder_output", &self.paths.builder_output),
            ("paths.build_dir", &self.paths.build_dir),
            ("paths.launcher", &self.paths.launcher),
            ("paths.bridge", &self.paths.bridge),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        self.paths.validate_build_dir()?;
        if self.bundler.command.is_empty() {
            return Err(ConfigError::Validation(
                "bundler.command must not be empty".into(),
            ));
        }
        if !self
            .bundler
            .command
            .iter()
            .any(|arg| arg.contains(ENTRY_PLACEHOLDER))
        {
            return Err(ConfigError::Validation(format!(
                "bundler.command must reference {ENTRY_PLACEHOLDER}"
            )));
        }
        if self.archive.compression_level > 9 {
            return Err(ConfigError::Validation(
                "archive.compression_level must be 0-9".into(),
            ));
        }
        Ok(())
    }
}

/// Replaced with the bundle's entry point source in `bundler.command`.
pub const ENTRY_PLACEHOLDER: &str = "{entry}";
/// Replaced with the bundle directory in `bundler.command`.
pub const OUT_DIR_PLACEHOLDER: &str = "{out_dir}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory the serverless builder writes its lambdas to.
    pub builder_output: String,
    /// Output directory for `proxy-config.json`, bundles and archives.
    /// Removed and recreated on every build.
    pub build_dir: String,
    /// Entry point source copied into every bundle.
    pub launcher: String,
    /// Bridge source copied into every bundle next to the entry point.
    pub bridge: String,
}

impl PathsConfig {
    /// `build_dir` is deleted on every build, so it must be a subdirectory of
    /// the project that holds none of the inputs.
    fn validate_build_dir(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| -> Result<(), ConfigError> {
            Err(ConfigError::Validation(format!(
                "paths.build_dir \"{}\" {reason}",
                self.build_dir
            )))
        };
        let mut build_dir = PathBuf::new();
        for component in Path::new(&self.build_dir).components() {
            match component {
                Component::Normal(part) => build_dir.push(part),
                Component::CurDir => {}
                Component::ParentDir => return invalid("must not contain ..".into()),
                Component::RootDir | Component::Prefix(_) => {
                    return invalid("must be relative to the project".into());
                }
            }
        }
        if build_dir.as_os_str().is_empty() {
            return invalid("must not be the project directory".into());
        }

        let builder_output = relative_components(&self.builder_output);
        if builder_output.starts_with(&build_dir) || build_dir.starts_with(&builder_output) {
            return invalid(format!("overlaps paths.builder_output \"{}\"", self.builder_output));
        }
        for (key, source) in [("paths.launcher", &self.launcher), ("paths.bridge", &self.bridge)] {
            if relative_components(source).starts_with(&build_dir) {
                return invalid(format!("contains {key} \"{source}\""));
            }
        }
        Ok(())
    }
}

/// `path` without `.` components.
fn relative_components(path: &str) -> PathBuf {
    Path::new(path)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            builder_output: ".serverless_nextjs".to_string(),
            build_dir: "build".to_string(),
            launcher: "cicd-tool/launcher.ts".to_string(),
            bridge: "cicd-tool/bridge.ts".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Program and arguments. Empty when the manifests are produced
    /// out of band.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundlerConfig {
    /// Program and arguments; `{entry}` and `{out_dir}` are substituted.
    pub command: Vec<String>,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            command: ["npx", "ncc", "build", ENTRY_PLACEHOLDER, "-o", OUT_DIR_PLACEHOLDER]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Deflate compression level (0 = store speed, 9 = smallest).
    pub compression_level: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression_level: 5,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(AdapterConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `adapter.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge user values on top of stock defaults, reject unknown keys, and
/// validate the result.
pub fn load_config(project: &Path) -> Result<AdapterConfig, ConfigError> {
    let merged = match load_raw_config(project)? {
        Some(overlay) => merge_toml(stock_defaults_value()?, overlay),
        None => stock_defaults_value()?,
    };
    let config: AdapterConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `adapter.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# next-lambda-adapter configuration
# =================================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Paths are relative to the project
# directory. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Paths
# ---------------------------------------------------------------------------
[paths]
# Where the serverless builder writes api-lambda/ and default-lambda/.
builder_output = ".serverless_nextjs"

# Output directory for proxy-config.json, bundles and zip archives.
# Deleted and recreated on every build.
build_dir = "build"

# Entry point and bridge sources copied into every bundle before compiling.
launcher = "cicd-tool/launcher.ts"
bridge = "cicd-tool/bridge.ts"

# ---------------------------------------------------------------------------
# Upstream build
# ---------------------------------------------------------------------------
[upstream]
# Command that runs `next build` and writes the builder manifests.
# Leave empty when the manifests are produced by a separate step.
command = []

# ---------------------------------------------------------------------------
# Bundler
# ---------------------------------------------------------------------------
[bundler]
# Compiles the entry point into a single file inside the bundle.
# {entry} is the launcher inside the bundle, {out_dir} the bundle directory.
command = ["npx", "ncc", "build", "{entry}", "-o", "{out_dir}"]

# ---------------------------------------------------------------------------
# Archives
# ---------------------------------------------------------------------------
[archive]
# Deflate compression level, 0-9.
compression_level = 5
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_paths() {
        let config = AdapterConfig::default();
        assert_eq!(config.paths.builder_output, ".serverless_nextjs");
        assert_eq!(config.paths.build_dir, "build");
        assert_eq!(config.paths.launcher, "cicd-tool/launcher.ts");
    }

    #[test]
    fn default_bundler_command() {
        let config = AdapterConfig::default();
        assert_eq!(
            config.bundler.command,
            vec!["npx", "ncc", "build", "{entry}", "-o", "{out_dir}"]
        );
        assert!(config.upstream.command.is_empty());
        assert_eq!(config.archive.compression_level, 5);
    }

    #[test]
    fn default_config_is_valid() {
        AdapterConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[paths]
build_dir = "out"
"#;
        let config: AdapterConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.paths.build_dir, "out");
        assert_eq!(config.paths.builder_output, ".serverless_nextjs");
        assert_eq!(config.archive.compression_level, 5);
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config, AdapterConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
[upstream]
command = ["node", "build.js"]

[archive]
compression_level = 9
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.upstream.command, vec!["node", "build.js"]);
        assert_eq!(config.archive.compression_level, 9);
        // Unspecified values should be defaults
        assert_eq!(config.paths.bridge, "cicd-tool/bridge.ts");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "this is not valid toml [[[").unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn unknown_key_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            "[paths]\nbuild_directory = \"x\"\n",
        )
        .unwrap();

        assert!(load_config(tmp.path()).is_err());
    }

    #[test]
    fn compression_level_out_of_range() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            "[archive]\ncompression_level = 12\n",
        )
        .unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // build_dir tests
    // =========================================================================

    fn with_build_dir(build_dir: &str) -> Result<(), ConfigError> {
        let mut config = AdapterConfig::default();
        config.paths.build_dir = build_dir.to_string();
        config.validate()
    }

    #[test]
    fn build_dir_nested_is_valid() {
        with_build_dir("out/lambda").unwrap();
        with_build_dir("./dist").unwrap();
    }

    #[test]
    fn build_dir_project_root_rejected() {
        for dir in [".", "./", "./."] {
            let err = with_build_dir(dir).unwrap_err();
            assert!(err.to_string().contains("project directory"), "{dir}: {err}");
        }
    }

    #[test]
    fn build_dir_outside_project_rejected() {
        assert!(with_build_dir("..").unwrap_err().to_string().contains(".."));
        assert!(with_build_dir("out/../..").is_err());
        let err = with_build_dir("/tmp/build").unwrap_err();
        assert!(err.to_string().contains("relative"));
    }

    #[test]
    fn build_dir_overlapping_builder_output_rejected() {
        for dir in [".serverless_nextjs", "./.serverless_nextjs/", ".serverless_nextjs/out"] {
            let err = with_build_dir(dir).unwrap_err();
            assert!(err.to_string().contains("paths.builder_output"), "{dir}: {err}");
        }
    }

    #[test]
    fn build_dir_containing_sources_rejected() {
        let err = with_build_dir("cicd-tool").unwrap_err();
        assert!(err.to_string().contains("paths.launcher"));

        let mut config = AdapterConfig::default();
        config.paths.bridge = "out/bridge.ts".into();
        config.paths.build_dir = "out".into();
        assert!(config.validate().unwrap_err().to_string().contains("paths.bridge"));
    }

    #[test]
    fn build_dir_sibling_prefix_is_not_overlap() {
        // `cicd` is a string prefix of `cicd-tool`, not a path prefix
        with_build_dir("cicd").unwrap();
    }

    #[test]
    fn bundler_command_must_reference_entry() {
        let mut config = AdapterConfig::default();
        config.bundler.command = vec!["ncc".into(), "build".into()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("{entry}"));
    }

    #[test]
    fn empty_bundler_command_rejected() {
        let mut config = AdapterConfig::default();
        config.bundler.command.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn empty_path_rejected() {
        let mut config = AdapterConfig::default();
        config.paths.build_dir = " ".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("paths.build_dir"));
    }

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("a = 1\nb = 2").unwrap();
        let overlay: toml::Value = toml::from_str("b = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"].as_integer(), Some(1));
        assert_eq!(merged["b"].as_integer(), Some(3));
    }

    #[test]
    fn merge_toml_arrays_replace() {
        let base: toml::Value = toml::from_str("[bundler]\ncommand = [\"a\", \"b\"]").unwrap();
        let overlay: toml::Value = toml::from_str("[bundler]\ncommand = [\"c\"]").unwrap();
        let merged = merge_toml(base, overlay);
        let cmd = merged["bundler"]["command"].as_array().unwrap();
        assert_eq!(cmd.len(), 1);
        assert_eq!(cmd[0].as_str(), Some("c"));
    }

    #[test]
    fn stock_config_toml_is_valid() {
        let config: AdapterConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, AdapterConfig::default());
    }
}
