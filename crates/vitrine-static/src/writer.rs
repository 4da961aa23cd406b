//! Whitelisted JSON artifact writer.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

/// Persisted story fields, in output order.
pub const STORY_FIELDS: &[&str] = &[
    "fileName",
    "filePath",
    "gitPath",
    "name",
    "namespace",
    "storyItems",
    "outputFilePath",
    "title",
    "dependencies",
];

/// Persisted file fields, in output order.
pub const FILE_FIELDS: &[&str] = &["name", "namespace", "outputFilePath"];

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Artifact kinds the writer knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Manifest,
    Files,
    Stories,
}

impl ArtifactKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Manifest => "manifest.json",
            ArtifactKind::Files => "files.json",
            ArtifactKind::Stories => "stories.json",
        }
    }

    /// Field whitelist applied to each record; the manifest is unfiltered.
    pub fn whitelist(&self) -> Option<&'static [&'static str]> {
        match self {
            ArtifactKind::Manifest => None,
            ArtifactKind::Files => Some(FILE_FIELDS),
            ArtifactKind::Stories => Some(STORY_FIELDS),
        }
    }

    fn is_namespaced(&self) -> bool {
        !matches!(self, ArtifactKind::Manifest)
    }
}

/// Errors that can occur while writing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Failed to write {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Failed to serialize {kind}: {message}")]
    Serialize { kind: &'static str, message: String },

    #[error("Refusing to write outside the output root: {0}")]
    InvalidName(String),

    #[error("Output root {output_root} contains the project root {root}")]
    UnsafeOutputRoot { output_root: PathBuf, root: PathBuf },
}

/// Keep only `fields` of every object in `value`, in `fields` order.
///
/// Arrays are filtered element-wise; other values pass through.
pub fn filter_fields(value: Value, fields: &[&str]) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| filter_fields(item, fields))
                .collect(),
        ),
        Value::Object(mut object) => {
            let mut filtered = Map::new();
            for field in fields {
                if let Some(v) = object.remove(*field) {
                    filtered.insert((*field).to_string(), v);
                }
            }
            Value::Object(filtered)
        }
        other => other,
    }
}

/// Writes artifacts below a single output root.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Fail when the output root is `root` itself or one of its ancestors.
    pub fn check_outside(&self, root: &Path) -> Result<(), WriteError> {
        let root = resolve(root).map_err(|e| self.io_error(root, e))?;
        let output_root = resolve(&self.output_root).map_err(|e| self.io_error(&self.output_root, e))?;
        if root.starts_with(&output_root) {
            return Err(WriteError::UnsafeOutputRoot { output_root, root });
        }
        Ok(())
    }

    /// Empty the output root, creating it when missing.
    pub fn clean(&self) -> Result<(), WriteError> {
        if self.output_root.exists() {
            fs::remove_dir_all(&self.output_root).map_err(|e| self.io_error(&self.output_root, e))?;
        }
        fs::create_dir_all(&self.output_root).map_err(|e| self.io_error(&self.output_root, e))
    }

    /// Location of an artifact.
    pub fn path_for(&self, kind: ArtifactKind, namespace: Option<&str>) -> PathBuf {
        if kind.is_namespaced() {
            self.output_root
                .join(namespace.unwrap_or(DEFAULT_NAMESPACE))
                .join(kind.file_name())
        } else {
            self.output_root.join(kind.file_name())
        }
    }

    /// Serialize `records`, filter them through the kind's whitelist and
    /// write pretty JSON with a trailing newline.
    pub fn write<T: Serialize + ?Sized>(
        &self,
        kind: ArtifactKind,
        records: &T,
        namespace: Option<&str>,
    ) -> Result<PathBuf, WriteError> {
        if let Some(ns) = namespace {
            check_relative(ns)?;
        }

        let serialize_error = |e: serde_json::Error| WriteError::Serialize {
            kind: kind.file_name(),
            message: e.to_string(),
        };

        let mut value = serde_json::to_value(records).map_err(serialize_error)?;
        if let Some(fields) = kind.whitelist() {
            value = filter_fields(value, fields);
        }

        let mut json = serde_json::to_string_pretty(&value).map_err(serialize_error)?;
        json.push('\n');

        let path = self.path_for(kind, namespace);
        self.write_bytes(&path, json.as_bytes())?;
        tracing::debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Write a compiled bundle file under the namespace directory.
    pub fn write_bundle(
        &self,
        namespace: Option<&str>,
        name: &str,
        content: &[u8],
    ) -> Result<PathBuf, WriteError> {
        let namespace = namespace.unwrap_or(DEFAULT_NAMESPACE);
        check_relative(namespace)?;
        check_relative(name)?;

        let path = self.output_root.join(namespace).join(name);
        self.write_bytes(&path, content)?;
        Ok(path)
    }

    fn write_bytes(&self, path: &Path, content: &[u8]) -> Result<(), WriteError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }
        fs::write(path, content).map_err(|e| self.io_error(path, e))
    }

    fn io_error(&self, path: &Path, e: std::io::Error) -> WriteError {
        WriteError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    }
}

/// Canonicalize the longest existing prefix of `path` and append the rest.
fn resolve(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

fn check_relative(name: &str) -> Result<(), WriteError> {
    let path = Path::new(name);
    let escapes = name.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(WriteError::InvalidName(name.to_string()));
    }
    Ok(())
}
