//! Rows persisted to `stories.json` and `files.json`.
//!
//! Records carry working fields that never reach disk; the writer's
//! whitelist decides what is persisted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use vitrine_compiler::CompiledAssets;
use vitrine_scan::{to_slash, Entrypoint};

use crate::analyze::StoryCollectionMetadata;

/// Location data of one story file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRecord {
    /// Entrypoint key
    pub file_name: String,

    /// Path relative to the execution root
    pub file_path: String,

    /// Path relative to the enclosing git work tree
    pub git_path: String,

    /// Story file name without directories
    pub name: String,

    /// Bundle location relative to the output root
    pub output_file_path: String,

    pub absolute_path: PathBuf,
    pub modules: Vec<PathBuf>,
    pub imports: Vec<String>,
}

impl StoryRecord {
    pub fn from_entrypoint(entry: &Entrypoint, namespace: &str) -> Self {
        let source = &entry.source;
        let file_path = source.relative_slash();
        let name = source
            .relative_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.clone());

        Self {
            file_name: entry.key.clone(),
            git_path: git_path(&source.path).unwrap_or_else(|| file_path.clone()),
            file_path,
            name,
            output_file_path: output_file_path(namespace, &entry.output_file_name()),
            absolute_path: source.path.clone(),
            modules: entry.modules.clone(),
            imports: source.imports.clone(),
        }
    }
}

/// One emitted bundle file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub name: String,
    pub namespace: String,
    pub output_file_path: String,
    pub url: String,
    pub size: usize,
}

/// Records for every file emitted by a compile, in asset key order.
pub fn file_records(assets: &CompiledAssets, namespace: &str) -> Vec<FileRecord> {
    let mut seen = std::collections::BTreeSet::new();
    let mut records = Vec::new();

    for asset in assets.iter() {
        for file in &asset.files {
            if !seen.insert(file.name.clone()) {
                continue;
            }
            records.push(FileRecord {
                name: file.name.clone(),
                namespace: namespace.to_string(),
                output_file_path: output_file_path(namespace, &file.name),
                url: file.url.clone(),
                size: assets.content(&file.name).map_or(0, <[u8]>::len),
            });
        }
    }

    records
}

/// Story rows: analyzed metadata overlaid with the location record.
///
/// Location fields win on key collisions.
pub fn story_rows(
    entrypoints: &[Entrypoint],
    metadata: &BTreeMap<String, StoryCollectionMetadata>,
    namespace: &str,
) -> Result<Vec<Value>, serde_json::Error> {
    let mut rows = Vec::with_capacity(entrypoints.len());

    for entry in entrypoints {
        let mut row = match metadata.get(&entry.key) {
            Some(meta) => serde_json::to_value(meta)?,
            None => Value::Object(Default::default()),
        };
        let record = serde_json::to_value(StoryRecord::from_entrypoint(entry, namespace))?;

        if let (Value::Object(target), Value::Object(fields)) = (&mut row, record) {
            target.extend(fields);
        }
        rows.push(row);
    }

    Ok(rows)
}

/// `<namespace>/<name>` with `/` separators.
pub fn output_file_path(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace.trim_end_matches('/'), name)
}

/// Path of `file` relative to the nearest ancestor holding a `.git` entry.
pub fn git_path(file: &Path) -> Option<String> {
    let root = file
        .ancestors()
        .skip(1)
        .find(|dir| dir.join(".git").exists())?;
    file.strip_prefix(root).ok().map(to_slash)
}
