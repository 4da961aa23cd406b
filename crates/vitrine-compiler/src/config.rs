//! Project build configuration.
//!
//! The project describes resolve and module rules for the bundler in a TOML
//! file. A file with `[mode.<name>]` tables is treated as a function of the
//! build mode; one without is a static value.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

/// Build mode passed to parameterized configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    #[default]
    Development,
    Production,
}

impl BuildMode {
    /// Mode name as used in `[mode.<name>]` tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Development => "development",
            BuildMode::Production => "production",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Module resolution rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolveRules {
    /// Import specifier aliases: "@components" -> "./src/components"
    pub alias: BTreeMap<String, String>,

    /// Extensions tried when resolving extensionless imports
    pub extensions: Vec<String>,
}

/// Module handling rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleRules {
    /// Loader per file extension: ".svg" -> "dataurl"
    pub loaders: BTreeMap<String, String>,

    /// Specifiers left unbundled
    pub externals: Vec<String>,

    /// Compile-time constant replacements
    pub define: BTreeMap<String, String>,
}

/// Resolved bundler configuration for one build mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub resolve: ResolveRules,
    pub module: ModuleRules,
}

impl BuildConfig {
    /// Layer `other` on top of this configuration.
    pub fn merge(mut self, other: BuildConfig) -> Self {
        self.resolve.alias.extend(other.resolve.alias);
        extend_unique(&mut self.resolve.extensions, other.resolve.extensions);
        self.module.loaders.extend(other.module.loaders);
        extend_unique(&mut self.module.externals, other.module.externals);
        self.module.define.extend(other.module.define);
        self
    }
}

fn extend_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// On-disk shape of the build configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BuildConfigFile {
    resolve: ResolveRules,
    module: ModuleRules,
    mode: BTreeMap<String, BuildConfig>,
}

type ConfigFn = dyn Fn(BuildMode) -> BuildConfig + Send + Sync;

/// Strategy producing the build configuration at startup.
#[derive(Clone)]
pub enum BuildConfigSource {
    /// A fixed configuration, identical for every mode
    Static(BuildConfig),

    /// A configuration computed from the build mode
    Parameterized(Arc<ConfigFn>),
}

impl fmt::Debug for BuildConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildConfigSource::Static(config) => f.debug_tuple("Static").field(config).finish(),
            BuildConfigSource::Parameterized(_) => f.write_str("Parameterized(..)"),
        }
    }
}

impl Default for BuildConfigSource {
    fn default() -> Self {
        BuildConfigSource::Static(BuildConfig::default())
    }
}

impl BuildConfigSource {
    /// Wrap a function of the build mode.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(BuildMode) -> BuildConfig + Send + Sync + 'static,
    {
        BuildConfigSource::Parameterized(Arc::new(f))
    }

    /// Load a project build configuration file.
    pub fn from_file(path: &Path) -> Result<Self, BuildConfigError> {
        let content = fs::read_to_string(path).map_err(|e| BuildConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|message| BuildConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Load from an optional path; no path means an empty static config.
    pub fn load(path: Option<&Path>) -> Result<Self, BuildConfigError> {
        match path {
            Some(path) => {
                let source = Self::from_file(path)?;
                tracing::info!("Loaded build config from {}", path.display());
                Ok(source)
            }
            None => Ok(Self::default()),
        }
    }

    fn from_toml(content: &str) -> Result<Self, String> {
        let file: BuildConfigFile = toml::from_str(content).map_err(|e| e.to_string())?;

        let base = BuildConfig {
            resolve: file.resolve,
            module: file.module,
        };

        if file.mode.is_empty() {
            return Ok(BuildConfigSource::Static(base));
        }

        for name in file.mode.keys() {
            if name != "development" && name != "production" {
                return Err(format!("unknown build mode [mode.{}]", name));
            }
        }

        let modes = file.mode;
        Ok(BuildConfigSource::function(move |mode| {
            let overrides = modes.get(mode.as_str()).cloned().unwrap_or_default();
            base.clone().merge(overrides)
        }))
    }

    /// Produce the configuration for `mode`.
    pub fn resolve(&self, mode: BuildMode) -> BuildConfig {
        match self {
            BuildConfigSource::Static(config) => config.clone(),
            BuildConfigSource::Parameterized(f) => f(mode),
        }
    }
}

/// Errors loading the project build configuration.
#[derive(Debug, thiserror::Error)]
pub enum BuildConfigError {
    #[error("Failed to read build config {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("Malformed build config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn static_config_ignores_mode() {
        let source = BuildConfigSource::from_toml(
            r#"
[resolve]
alias = { "@components" = "./src/components" }

[module]
externals = ["react"]
"#,
        )
        .unwrap();

        assert!(matches!(source, BuildConfigSource::Static(_)));
        assert_eq!(
            source.resolve(BuildMode::Development),
            source.resolve(BuildMode::Production)
        );
        assert_eq!(
            source.resolve(BuildMode::Production).module.externals,
            vec!["react"]
        );
    }

    #[test]
    fn mode_tables_make_a_function() {
        let source = BuildConfigSource::from_toml(
            r#"
[module]
define = { "DEBUG" = "false" }

[mode.development.module]
define = { "DEBUG" = "true" }
externals = ["react"]
"#,
        )
        .unwrap();

        let dev = source.resolve(BuildMode::Development);
        let prod = source.resolve(BuildMode::Production);

        assert_eq!(dev.module.define["DEBUG"], "true");
        assert_eq!(dev.module.externals, vec!["react"]);
        assert_eq!(prod.module.define["DEBUG"], "false");
        assert!(prod.module.externals.is_empty());
    }

    #[test]
    fn function_source_is_called_with_mode() {
        let source = BuildConfigSource::function(|mode| {
            let mut config = BuildConfig::default();
            config
                .module
                .define
                .insert("MODE".to_string(), format!("\"{}\"", mode));
            config
        });

        assert_eq!(
            source.resolve(BuildMode::Production).module.define["MODE"],
            "\"production\""
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = BuildConfigSource::from_toml("[resolve]\naliases = {}\n");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let result = BuildConfigSource::from_toml("[mode.staging.module]\nexternals = []\n");
        assert!(result.is_err());
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let temp = tempdir().unwrap();
        let result = BuildConfigSource::from_file(&temp.path().join("missing.toml"));

        assert!(matches!(result, Err(BuildConfigError::Read { .. })));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("vitrine.build.toml");
        fs::write(&path, "[resolve\n").unwrap();

        let result = BuildConfigSource::from_file(&path);

        assert!(matches!(result, Err(BuildConfigError::Parse { .. })));
    }
}
