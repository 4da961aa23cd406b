//! Story metadata analysis.
//!
//! Joins the scanner's export data with the compiled asset map by
//! entrypoint key. The result is always derived from scratch.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;

use vitrine_compiler::CompiledAssets;
use vitrine_scan::Entrypoint;

/// A single story within a story file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryItem {
    pub symbol: String,
    pub is_default_export: bool,
}

/// Per-entrypoint story metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryCollectionMetadata {
    /// Entrypoint key
    pub file_name: String,

    /// Output namespace
    pub namespace: String,

    /// Human readable title
    pub title: String,

    /// Stories in declaration order
    pub story_items: Vec<StoryItem>,

    /// Emitted files the stories need at runtime
    pub dependencies: Vec<String>,
}

/// Scanner and compiler disagree about the entrypoint set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzeError {
    #[error("No compiled asset for entrypoint {0}")]
    MissingAsset(String),

    #[error("Compiled asset {0} has no entrypoint")]
    OrphanAsset(String),
}

/// Build metadata for every entrypoint.
pub fn analyze(
    entrypoints: &[Entrypoint],
    assets: &CompiledAssets,
    namespace: &str,
) -> Result<BTreeMap<String, StoryCollectionMetadata>, AnalyzeError> {
    let known: BTreeSet<&str> = entrypoints.iter().map(|e| e.key.as_str()).collect();
    if let Some(orphan) = assets.keys().find(|k| !known.contains(k)) {
        return Err(AnalyzeError::OrphanAsset(orphan.to_string()));
    }

    let mut metadata = BTreeMap::new();

    for entry in entrypoints {
        let asset = assets
            .get(&entry.key)
            .ok_or_else(|| AnalyzeError::MissingAsset(entry.key.clone()))?;

        let mut exports = entry.source.exports.clone();
        exports.sort_by_key(|e| e.position);

        let story_items = exports
            .into_iter()
            .map(|e| StoryItem {
                symbol: e.symbol,
                is_default_export: e.is_default_export,
            })
            .collect();

        metadata.insert(
            entry.key.clone(),
            StoryCollectionMetadata {
                file_name: entry.key.clone(),
                namespace: namespace.to_string(),
                title: story_title(&entry.source.relative_path),
                story_items,
                dependencies: asset.file_names(),
            },
        );
    }

    Ok(metadata)
}

/// Title of a story file: its name up to the first `.`.
///
/// `src/forms/Input.vitrine.tsx` becomes `Input`.
pub fn story_title(relative: &Path) -> String {
    relative
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .filter(|n| !n.is_empty())
        .unwrap_or("Untitled")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use vitrine_compiler::MemoryStore;
    use vitrine_scan::{ExportSymbol, SourceFile};

    fn export(symbol: &str, is_default: bool, position: u32) -> ExportSymbol {
        ExportSymbol {
            symbol: symbol.to_string(),
            is_default_export: is_default,
            position,
        }
    }

    fn entry(key: &str, exports: Vec<ExportSymbol>) -> Entrypoint {
        let relative = PathBuf::from(format!("{}.tsx", key));
        Entrypoint {
            key: key.to_string(),
            modules: vec![PathBuf::from("/p").join(&relative)],
            source: SourceFile {
                path: PathBuf::from("/p").join(&relative),
                relative_path: relative,
                exports,
                imports: Vec::new(),
            },
        }
    }

    fn assets(keys: &[&str]) -> CompiledAssets {
        let mut store = MemoryStore::new();
        for key in keys {
            store.write(key, &format!("{}.js", key), b"export {}".to_vec());
        }
        store.write_shared(keys, "runtime.js", b"".to_vec());
        store.into_assets(keys.iter().copied(), "/").unwrap()
    }

    #[test]
    fn builds_metadata_per_entrypoint() {
        let entrypoints = vec![
            entry("src/Button.vitrine", vec![export("Button", true, 10)]),
            entry(
                "src/Card.vitrine",
                vec![export("Card", true, 5), export("Variant", false, 40)],
            ),
        ];

        let metadata = analyze(
            &entrypoints,
            &assets(&["src/Button.vitrine", "src/Card.vitrine"]),
            "default",
        )
        .unwrap();

        assert_eq!(metadata["src/Button.vitrine"].story_items.len(), 1);
        assert_eq!(metadata["src/Card.vitrine"].story_items.len(), 2);
        assert_eq!(metadata["src/Card.vitrine"].title, "Card");
        assert_eq!(
            metadata["src/Card.vitrine"].dependencies,
            vec!["src/Card.vitrine.js", "runtime.js"]
        );
    }

    #[test]
    fn orders_items_by_declaration() {
        let entrypoints = vec![entry(
            "a",
            vec![export("Late", false, 90), export("Early", true, 3)],
        )];

        let metadata = analyze(&entrypoints, &assets(&["a"]), "ns").unwrap();

        let symbols: Vec<_> = metadata["a"]
            .story_items
            .iter()
            .map(|s| s.symbol.as_str())
            .collect();
        assert_eq!(symbols, vec!["Early", "Late"]);
        assert_eq!(metadata["a"].namespace, "ns");
    }

    #[test]
    fn missing_asset_is_fatal() {
        let entrypoints = vec![entry("a", Vec::new()), entry("b", Vec::new())];

        let result = analyze(&entrypoints, &assets(&["a"]), "default");

        assert_eq!(result, Err(AnalyzeError::MissingAsset("b".to_string())));
    }

    #[test]
    fn orphan_asset_is_fatal() {
        let entrypoints = vec![entry("a", Vec::new())];

        let result = analyze(&entrypoints, &assets(&["a", "z"]), "default");

        assert_eq!(result, Err(AnalyzeError::OrphanAsset("z".to_string())));
    }

    #[test]
    fn title_is_name_before_first_dot() {
        assert_eq!(story_title(Path::new("src/forms/Input.vitrine.tsx")), "Input");
        assert_eq!(story_title(Path::new(".hidden.tsx")), "Untitled");
    }
}
