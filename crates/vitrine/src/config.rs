//! Configuration file structure (vitrine.toml).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use vitrine_scan::{MarkerConfig, DEFAULT_DECORATOR_PATTERN, DEFAULT_STORY_PATTERN};

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub bundle: BundleSettings,
    #[serde(default)]
    pub preview: PreviewSettings,
    #[serde(default)]
    pub bundler: BundlerSettings,
}

#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Execution root
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_story_path")]
    pub story_path: String,
    #[serde(default = "default_decorator_path")]
    pub decorator_path: String,
    /// Project build configuration file
    pub build_config: Option<PathBuf>,
    /// Comment marker that selects component exports
    pub marker: Option<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            story_path: default_story_path(),
            decorator_path: default_decorator_path(),
            build_config: None,
            marker: None,
        }
    }
}

impl ProjectConfig {
    pub fn marker_config(&self) -> MarkerConfig {
        MarkerConfig {
            marker: self.marker.clone(),
        }
    }

    /// Build config path, resolved against the root when relative.
    pub fn build_config_path(&self, path: Option<PathBuf>) -> Option<PathBuf> {
        path.or_else(|| self.build_config.clone())
            .map(|p| if p.is_absolute() { p } else { self.root.join(p) })
    }
}

#[derive(Debug, Deserialize)]
pub struct BundleSettings {
    #[serde(default = "default_output")]
    pub output: PathBuf,
    pub namespace: Option<String>,
    #[serde(default = "default_public_path")]
    pub public_path: String,
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            output: default_output(),
            namespace: None,
            public_path: default_public_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PreviewSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL of emitted files; defaults to the server address
    pub public_path: Option<String>,
    #[serde(default = "default_open")]
    pub open: bool,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_path: None,
            open: default_open(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BundlerSettings {
    /// esbuild executable
    #[serde(default = "default_program")]
    pub program: PathBuf,
}

impl Default for BundlerSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_story_path() -> String {
    DEFAULT_STORY_PATTERN.to_string()
}
fn default_decorator_path() -> String {
    DEFAULT_DECORATOR_PATTERN.to_string()
}
fn default_output() -> PathBuf {
    PathBuf::from("vitrine-out")
}
fn default_public_path() -> String {
    "/".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_open() -> bool {
    true
}
fn default_program() -> PathBuf {
    PathBuf::from("esbuild")
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_uses_defaults() {
        let temp = tempdir().unwrap();

        let config = load_config(&temp.path().join("vitrine.toml")).unwrap();

        assert_eq!(config.project.story_path, DEFAULT_STORY_PATTERN);
        assert_eq!(config.preview.port, 5000);
        assert_eq!(config.bundle.output, PathBuf::from("vitrine-out"));
        assert_eq!(config.bundler.program, PathBuf::from("esbuild"));
    }

    #[test]
    fn partial_file_keeps_field_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("vitrine.toml");
        fs::write(
            &path,
            "[project]\nmarker = \"@component\"\n\n[preview]\nport = 6006\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();

        assert_eq!(config.project.marker.as_deref(), Some("@component"));
        assert_eq!(config.project.story_path, DEFAULT_STORY_PATTERN);
        assert_eq!(config.preview.port, 6006);
        assert_eq!(config.preview.host, "127.0.0.1");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("vitrine.toml");
        fs::write(&path, "[preview]\nport = \"not a number\"\n").unwrap();

        assert!(load_config(&path).is_err());
    }

    #[test]
    fn build_config_resolves_against_root() {
        let project = ProjectConfig {
            root: PathBuf::from("/work/app"),
            build_config: Some(PathBuf::from("vitrine.build.toml")),
            ..Default::default()
        };

        assert_eq!(
            project.build_config_path(None),
            Some(PathBuf::from("/work/app/vitrine.build.toml"))
        );
        assert_eq!(
            project.build_config_path(Some(PathBuf::from("/etc/b.toml"))),
            Some(PathBuf::from("/etc/b.toml"))
        );
    }
}
