//! Compilable entrypoints derived from story files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::pattern::to_slash;
use crate::scanner::{ScanError, SourceFile};

/// One compilable unit per story file.
#[derive(Debug, Clone, PartialEq)]
pub struct Entrypoint {
    /// Lookup key shared by every pipeline stage
    pub key: String,

    /// Modules bundled into this entry, story module first
    pub modules: Vec<PathBuf>,

    /// Scanner data for the story file
    pub source: SourceFile,
}

impl Entrypoint {
    /// Name of the primary bundle emitted for this entry.
    pub fn output_file_name(&self) -> String {
        format!("{}.js", self.key)
    }

    /// Number of component exports.
    pub fn component_count(&self) -> usize {
        self.source.exports.len()
    }
}

/// Derive the entrypoint key for a relative story path.
///
/// `src/forms/Input.vitrine.tsx` becomes `src/forms/Input.vitrine`.
pub fn entrypoint_key(relative_path: &Path) -> String {
    to_slash(&relative_path.with_extension(""))
}

/// Build entrypoints for scanned files, rejecting key collisions.
pub fn build_entrypoints(
    files: Vec<SourceFile>,
    decorator: Option<&Path>,
) -> Result<Vec<Entrypoint>, ScanError> {
    let mut by_key: BTreeMap<String, Entrypoint> = BTreeMap::new();

    for source in files {
        let key = entrypoint_key(&source.relative_path);

        if let Some(existing) = by_key.get(&key) {
            return Err(ScanError::DuplicateEntrypoint {
                key,
                first: existing.source.relative_slash(),
                second: source.relative_slash(),
            });
        }

        let mut modules = vec![source.path.clone()];
        modules.extend(decorator.map(Path::to_path_buf));

        by_key.insert(
            key.clone(),
            Entrypoint {
                key,
                modules,
                source,
            },
        );
    }

    Ok(by_key.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(relative: &str) -> SourceFile {
        SourceFile {
            path: PathBuf::from("/project").join(relative),
            relative_path: PathBuf::from(relative),
            exports: Vec::new(),
            imports: Vec::new(),
        }
    }

    #[test]
    fn strips_only_final_extension() {
        assert_eq!(
            entrypoint_key(Path::new("src/forms/Input.vitrine.tsx")),
            "src/forms/Input.vitrine"
        );
    }

    #[test]
    fn one_entrypoint_per_file() {
        let entrypoints = build_entrypoints(
            vec![source("src/A.vitrine.tsx"), source("src/B.vitrine.tsx")],
            None,
        )
        .unwrap();

        assert_eq!(entrypoints.len(), 2);
        assert_eq!(entrypoints[0].key, "src/A.vitrine");
        assert_eq!(entrypoints[0].output_file_name(), "src/A.vitrine.js");
        assert_eq!(entrypoints[0].modules.len(), 1);
    }

    #[test]
    fn decorator_is_appended_to_every_entry() {
        let decorator = PathBuf::from("/project/.vitrine/decorator.tsx");
        let entrypoints = build_entrypoints(
            vec![source("src/A.vitrine.tsx"), source("src/B.vitrine.tsx")],
            Some(&decorator),
        )
        .unwrap();

        for entry in &entrypoints {
            assert_eq!(entry.modules[1], decorator);
        }
    }

    #[test]
    fn colliding_keys_are_rejected() {
        let result = build_entrypoints(
            vec![source("src/A.vitrine.tsx"), source("src/A.vitrine.jsx")],
            None,
        );

        assert!(matches!(
            result,
            Err(ScanError::DuplicateEntrypoint { ref key, .. }) if key == "src/A.vitrine"
        ));
    }
}
