//! Build plans: the project rules merged with the generated entry map.

use std::collections::BTreeMap;
use std::path::PathBuf;

use vitrine_scan::Entrypoint;

use crate::config::BuildConfig;

/// Everything the bundler needs for one compile cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildPlan {
    /// Entry key -> modules, story module first
    pub entries: BTreeMap<String, Vec<PathBuf>>,

    /// Project resolve and module rules
    pub config: BuildConfig,

    /// Public path emitted assets are served from
    pub public_path: String,

    /// Directory relative imports and aliases resolve against
    pub working_dir: PathBuf,
}

impl BuildPlan {
    /// Compose a plan from entrypoints and the project configuration.
    pub fn compose(
        entrypoints: &[Entrypoint],
        config: BuildConfig,
        public_path: &str,
        working_dir: PathBuf,
    ) -> Self {
        let entries = entrypoints
            .iter()
            .map(|e| (e.key.clone(), e.modules.clone()))
            .collect();

        Self {
            entries,
            config,
            public_path: public_path.to_string(),
            working_dir,
        }
    }

    /// Entry keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
