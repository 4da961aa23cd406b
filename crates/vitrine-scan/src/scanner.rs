//! Source tree scanning.
//!
//! Walks the execution root, matches story files against the configured
//! pattern and statically collects their exports.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::{DirEntry, WalkDir};

use crate::entrypoint::{build_entrypoints, Entrypoint};
use crate::exports::{analyze_module, ExportError, ExportSymbol};
use crate::pattern::{to_slash, PatternError, StoryPattern};

/// Default story file pattern, relative to the execution root.
pub const DEFAULT_STORY_PATTERN: &str = "src/**/*.vitrine.@(tsx|ts|jsx|js)";

/// Default decorator module pattern, relative to the execution root.
pub const DEFAULT_DECORATOR_PATTERN: &str = ".vitrine/decorator.@(tsx|ts|jsx|js)";

/// How component exports are marked inside story files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerConfig {
    /// Comment text that must precede an export for it to count.
    /// `None` counts every export.
    pub marker: Option<String>,
}

/// A matched story source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// Absolute path
    pub path: PathBuf,

    /// Path relative to the scan root
    pub relative_path: PathBuf,

    /// Component exports in declaration order
    pub exports: Vec<ExportSymbol>,

    /// Static import specifiers
    pub imports: Vec<String>,
}

impl SourceFile {
    /// Relative path with `/` separators.
    pub fn relative_slash(&self) -> String {
        to_slash(&self.relative_path)
    }
}

/// Errors that can occur while scanning.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("No components found for pattern {pattern}. Have you marked them correctly?")]
    NoComponentsFound { pattern: String },

    #[error("Scan root not found: {0}")]
    RootNotFound(String),

    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Duplicate entrypoint key {key} for {first} and {second}")]
    DuplicateEntrypoint {
        key: String,
        first: String,
        second: String,
    },

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Story scanner bound to a root directory and its patterns.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    pattern: StoryPattern,
    marker: MarkerConfig,
    decorator: Option<StoryPattern>,
}

impl Scanner {
    /// Create a scanner for `root` matching `pattern`.
    pub fn new(root: impl Into<PathBuf>, pattern: &str, marker: MarkerConfig) -> Result<Self, ScanError> {
        Ok(Self {
            root: root.into(),
            pattern: StoryPattern::new(pattern)?,
            marker,
            decorator: None,
        })
    }

    /// Inject the first module matching `pattern` into every entrypoint.
    pub fn with_decorator(mut self, pattern: &str) -> Result<Self, ScanError> {
        self.decorator = Some(StoryPattern::new(pattern)?);
        Ok(self)
    }

    /// Scan root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the tree for story files.
    pub fn scan(&self) -> Result<Vec<SourceFile>, ScanError> {
        scan(&self.root, &self.pattern, &self.marker)
    }

    /// Scan the tree and derive one entrypoint per story file.
    pub fn entrypoints(&self) -> Result<Vec<Entrypoint>, ScanError> {
        let files = self.scan()?;
        let decorator = match &self.decorator {
            Some(pattern) => resolve_decorator(&self.root, pattern),
            None => None,
        };
        build_entrypoints(files, decorator.as_deref())
    }
}

/// Scan `root` for files matching `pattern`, sorted by relative path.
pub fn scan(
    root: &Path,
    pattern: &StoryPattern,
    marker: &MarkerConfig,
) -> Result<Vec<SourceFile>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::RootNotFound(root.display().to_string()));
    }

    let candidates: Vec<(PathBuf, PathBuf)> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let relative = e.path().strip_prefix(root).ok()?.to_path_buf();
            pattern
                .matches(&relative)
                .then(|| (e.path().to_path_buf(), relative))
        })
        .collect();

    let marker = marker.marker.as_deref();
    let results: Vec<Result<Option<SourceFile>, ScanError>> = candidates
        .into_par_iter()
        .map(|(path, relative_path)| read_source_file(path, relative_path, marker))
        .collect();

    let mut files = Vec::new();
    for result in results {
        if let Some(file) = result? {
            files.push(file);
        }
    }

    if files.is_empty() {
        return Err(ScanError::NoComponentsFound {
            pattern: pattern.as_str().to_string(),
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    tracing::debug!(
        "Matched {} story files under {}",
        files.len(),
        root.display()
    );

    Ok(files)
}

/// Read and analyze one candidate. `None` when the marker excludes it.
fn read_source_file(
    path: PathBuf,
    relative_path: PathBuf,
    marker: Option<&str>,
) -> Result<Option<SourceFile>, ScanError> {
    let source = fs::read_to_string(&path).map_err(|e| ScanError::ReadError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let (exports, imports) = match analyze_module(&source, &path, marker) {
        Ok(summary) => (summary.exports, summary.imports),
        // The bundler reports syntax errors with better positions; keep the
        // file so its diagnostic surfaces from the compile step.
        Err(ExportError::Parse { path, message }) => {
            tracing::warn!("Could not analyze exports of {}: {}", path, message);
            if marker.is_some() {
                return Ok(None);
            }
            (Vec::new(), Vec::new())
        }
    };

    if marker.is_some() && exports.is_empty() {
        return Ok(None);
    }

    Ok(Some(SourceFile {
        path,
        relative_path,
        exports,
        imports,
    }))
}

/// Directories never searched for stories.
fn is_ignored_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_str().unwrap_or("");
    name == "node_modules" || name == "target" || name.starts_with('.')
}

/// First module matching the decorator pattern under `root`.
pub fn resolve_decorator(root: &Path, pattern: &StoryPattern) -> Option<PathBuf> {
    let mut matches: Vec<PathBuf> = pattern
        .expanded()
        .filter_map(|p| glob::glob(&root.join(p).to_string_lossy()).ok())
        .flat_map(|paths| paths.filter_map(|p| p.ok()))
        .filter(|p| p.is_file())
        .collect();
    matches.sort();

    let decorator = matches.into_iter().next();
    if let Some(path) = &decorator {
        tracing::debug!("Using decorator {}", path.display());
    }
    decorator
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn scans_matching_story_files() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "src/Button.vitrine.tsx",
            "export default function Button() { return null; }",
        );
        write(
            temp.path(),
            "src/forms/Input.vitrine.jsx",
            "export default function Input() { return null; }\nexport const Variant = () => null;",
        );
        write(temp.path(), "src/Button.tsx", "export const Button = 1;");

        let scanner =
            Scanner::new(temp.path(), DEFAULT_STORY_PATTERN, MarkerConfig::default()).unwrap();
        let files = scanner.scan().unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].relative_slash(), "src/Button.vitrine.tsx");
        assert_eq!(files[1].relative_slash(), "src/forms/Input.vitrine.jsx");
        assert_eq!(files[1].exports.len(), 2);
    }

    #[test]
    fn empty_tree_finds_no_components() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();

        let scanner =
            Scanner::new(temp.path(), DEFAULT_STORY_PATTERN, MarkerConfig::default()).unwrap();
        let result = scanner.scan();

        assert!(matches!(result, Err(ScanError::NoComponentsFound { .. })));
    }

    #[test]
    fn skips_node_modules() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "src/node_modules/lib/Thing.vitrine.tsx",
            "export default 1;",
        );
        write(temp.path(), "src/Real.vitrine.tsx", "export default 1;");

        let scanner =
            Scanner::new(temp.path(), DEFAULT_STORY_PATTERN, MarkerConfig::default()).unwrap();
        let files = scanner.scan().unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_slash(), "src/Real.vitrine.tsx");
    }

    #[test]
    fn marker_excludes_unmarked_files() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "src/Marked.vitrine.tsx",
            "// @component\nexport default function Marked() { return null; }",
        );
        write(
            temp.path(),
            "src/Plain.vitrine.tsx",
            "export default function Plain() { return null; }",
        );

        let marker = MarkerConfig {
            marker: Some("@component".to_string()),
        };
        let scanner = Scanner::new(temp.path(), DEFAULT_STORY_PATTERN, marker).unwrap();
        let files = scanner.scan().unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_slash(), "src/Marked.vitrine.tsx");
    }

    #[test]
    fn unparsable_file_still_matches() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/Broken.vitrine.tsx", "export const = ;");

        let scanner =
            Scanner::new(temp.path(), DEFAULT_STORY_PATTERN, MarkerConfig::default()).unwrap();
        let files = scanner.scan().unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].exports.is_empty());
    }

    #[test]
    fn resolves_decorator_in_hidden_directory() {
        let temp = tempdir().unwrap();
        write(temp.path(), ".vitrine/decorator.tsx", "import './global.css';");
        write(temp.path(), "src/A.vitrine.tsx", "export default 1;");

        let scanner = Scanner::new(temp.path(), DEFAULT_STORY_PATTERN, MarkerConfig::default())
            .unwrap()
            .with_decorator(DEFAULT_DECORATOR_PATTERN)
            .unwrap();
        let entrypoints = scanner.entrypoints().unwrap();

        assert_eq!(entrypoints.len(), 1);
        assert_eq!(entrypoints[0].modules.len(), 2);
        assert!(entrypoints[0].modules[1].ends_with(".vitrine/decorator.tsx"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let temp = tempdir().unwrap();
        let scanner = Scanner::new(
            temp.path().join("missing"),
            DEFAULT_STORY_PATTERN,
            MarkerConfig::default(),
        )
        .unwrap();

        assert!(matches!(scanner.scan(), Err(ScanError::RootNotFound(_))));
    }
}
