//! In-memory output store and the compiled asset map read back from it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

/// Virtual output target written by the bundler.
///
/// A store belongs to exactly one compile cycle and is consumed when the
/// cycle's assets are materialized.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: BTreeMap<String, Arc<[u8]>>,
    entries: BTreeMap<String, Vec<String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a file emitted for `entry`.
    pub fn write(&mut self, entry: &str, name: &str, content: impl Into<Arc<[u8]>>) {
        self.files.insert(name.to_string(), content.into());
        let names = self.entries.entry(entry.to_string()).or_default();
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    /// Write a file shared by several entries.
    pub fn write_shared(&mut self, entries: &[&str], name: &str, content: impl Into<Arc<[u8]>>) {
        let content = content.into();
        for entry in entries {
            self.write(entry, name, Arc::clone(&content));
        }
    }

    /// Read a file back.
    pub fn read(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(|c| &c[..])
    }

    /// Files emitted for an entry, in emission order.
    pub fn entry_files(&self, entry: &str) -> &[String] {
        self.entries.get(entry).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entry keys with at least one emitted file.
    pub fn entry_keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Materialize the asset map for exactly `keys`.
    ///
    /// Keys without output get an empty file list. Output for a key outside
    /// `keys` is an orphan and fails the cycle.
    pub fn into_assets<'a>(
        self,
        keys: impl IntoIterator<Item = &'a str>,
        public_path: &str,
    ) -> Result<CompiledAssets, OrphanOutput> {
        let keys: BTreeSet<&str> = keys.into_iter().collect();

        if let Some(orphan) = self.entries.keys().find(|k| !keys.contains(k.as_str())) {
            return Err(OrphanOutput(orphan.clone()));
        }

        let entries = keys
            .into_iter()
            .map(|key| {
                let files = self
                    .entries
                    .get(key)
                    .map(|names| {
                        names
                            .iter()
                            .map(|name| EmittedFile::new(name, public_path))
                            .collect()
                    })
                    .unwrap_or_default();
                (
                    key.to_string(),
                    CompiledAsset {
                        key: key.to_string(),
                        files,
                    },
                )
            })
            .collect();

        Ok(CompiledAssets {
            entries,
            contents: self.files,
        })
    }
}

/// Store output that belongs to no known entrypoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Bundler emitted output for unknown entrypoint {0}")]
pub struct OrphanOutput(pub String);

/// A file emitted by the bundler with its public URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmittedFile {
    pub name: String,
    pub url: String,
}

impl EmittedFile {
    /// Resolve `name` against `public_path`.
    pub fn new(name: &str, public_path: &str) -> Self {
        Self {
            name: name.to_string(),
            url: join_url(public_path, name),
        }
    }
}

/// Join a base URL and a file name with exactly one `/`.
pub fn join_url(base: &str, name: &str) -> String {
    if base.is_empty() {
        return name.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        name.trim_start_matches('/')
    )
}

/// Compiled output of one entrypoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledAsset {
    pub key: String,
    pub files: Vec<EmittedFile>,
}

impl CompiledAsset {
    /// Emitted file names in emission order.
    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.clone()).collect()
    }
}

/// Compiled assets of one cycle, replaced wholesale on recompilation.
#[derive(Debug, Clone, Default)]
pub struct CompiledAssets {
    entries: BTreeMap<String, CompiledAsset>,
    contents: BTreeMap<String, Arc<[u8]>>,
}

impl CompiledAssets {
    /// Asset for an entry key.
    pub fn get(&self, key: &str) -> Option<&CompiledAsset> {
        self.entries.get(key)
    }

    /// Entry keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// All assets in key order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledAsset> {
        self.entries.values()
    }

    /// Raw content of an emitted file.
    pub fn content(&self, name: &str) -> Option<&[u8]> {
        self.contents.get(name).map(|c| &c[..])
    }

    /// Every emitted file name, each listed once.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.contents.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A compile diagnostic, attached to an entry when it came from one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub entry: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn for_entry(entry: &str, message: impl Into<String>) -> Self {
        Self {
            entry: Some(entry.to_string()),
            message: message.into(),
        }
    }

    pub fn global(message: impl Into<String>) -> Self {
        Self {
            entry: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.entry {
            Some(entry) => write!(f, "{}: {}", entry, self.message),
            None => f.write_str(&self.message),
        }
    }
}
