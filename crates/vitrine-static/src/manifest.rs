//! Dependency manifest built from scanner import data.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use vitrine_scan::SourceFile;

/// Import graph of the scanned story files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    /// Relative story path to its import specifiers, in source order
    pub files: BTreeMap<String, Vec<String>>,

    /// Package names imported anywhere, sorted
    pub packages: Vec<String>,
}

/// Restructure scanner import data for persistence.
pub fn build_manifest<'a>(sources: impl IntoIterator<Item = &'a SourceFile>) -> Manifest {
    let mut files = BTreeMap::new();
    let mut packages = BTreeSet::new();

    for source in sources {
        for specifier in &source.imports {
            if let Some(package) = package_name(specifier) {
                packages.insert(package.to_string());
            }
        }
        files.insert(source.relative_slash(), source.imports.clone());
    }

    Manifest {
        files,
        packages: packages.into_iter().collect(),
    }
}

/// Package a bare import specifier refers to.
///
/// Relative and absolute specifiers have none.
fn package_name(specifier: &str) -> Option<&str> {
    if specifier.is_empty()
        || specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.contains(':')
    {
        return None;
    }

    let mut slashes = specifier.match_indices('/').map(|(i, _)| i);
    let end = if specifier.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };

    Some(match end {
        Some(i) => &specifier[..i],
        None => specifier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn source(relative: &str, imports: &[&str]) -> SourceFile {
        SourceFile {
            path: PathBuf::from("/p").join(relative),
            relative_path: PathBuf::from(relative),
            exports: Vec::new(),
            imports: imports.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn package_names_from_specifiers() {
        assert_eq!(package_name("react"), Some("react"));
        assert_eq!(package_name("react-dom/client"), Some("react-dom"));
        assert_eq!(package_name("@emotion/styled/base"), Some("@emotion/styled"));
        assert_eq!(package_name("./Button"), None);
        assert_eq!(package_name("/abs/path"), None);
        assert_eq!(package_name("node:fs"), None);
    }

    #[test]
    fn builds_files_and_packages() {
        let sources = vec![
            source("src/Button.vitrine.tsx", &["react", "./Button"]),
            source("src/Card.vitrine.tsx", &["react-dom/client", "@acme/ui/theme"]),
        ];

        let manifest = build_manifest(&sources);

        assert_eq!(manifest.files.len(), 2);
        assert_eq!(
            manifest.files["src/Button.vitrine.tsx"],
            vec!["react".to_string(), "./Button".to_string()]
        );
        assert_eq!(manifest.packages, vec!["@acme/ui", "react", "react-dom"]);
    }
}
