//! One-shot bundle command.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use vitrine_compiler::{BuildMode, Diagnostic, EsbuildBundler};
use vitrine_static::{BundleConfig, BundlePipeline};

use crate::config::ConfigFile;

/// Command-line values taking precedence over vitrine.toml.
#[derive(Debug, Default)]
pub struct Overrides {
    pub story_path: Option<String>,
    pub build_config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub namespace: Option<String>,
    pub clean: bool,
}

/// Merge file configuration and overrides into a pipeline configuration.
pub fn bundle_config(file_config: ConfigFile, overrides: Overrides) -> BundleConfig {
    let project = &file_config.project;

    BundleConfig {
        root: project.root.clone(),
        story_pattern: overrides
            .story_path
            .unwrap_or_else(|| project.story_path.clone()),
        marker: project.marker_config(),
        decorator_pattern: Some(project.decorator_path.clone()),
        build_config: project.build_config_path(overrides.build_config),
        output_root: overrides.output.unwrap_or(file_config.bundle.output),
        namespace: overrides.namespace.or(file_config.bundle.namespace),
        public_path: file_config.bundle.public_path,
        mode: BuildMode::Production,
        clean: overrides.clean,
    }
}

/// Run the bundle command.
pub async fn run(file_config: ConfigFile, overrides: Overrides) -> Result<()> {
    tracing::info!("Bundling stories...");

    let bundler = EsbuildBundler::new(&file_config.bundler.program, BuildMode::Production);
    let config = bundle_config(file_config, overrides);

    let result = BundlePipeline::new(config, Arc::new(bundler)).run().await?;

    tracing::info!(
        "Bundled {} story files with {} components in {}ms",
        result.entrypoints,
        result.components,
        result.duration_ms
    );
    tracing::info!("Output: {}", result.output_root.display());

    if !result.diagnostics.is_empty() {
        bail!("{}", failure_summary(&result.diagnostics));
    }

    Ok(())
}

/// Count failed story files by distinct entry; global errors are counted apart.
pub fn failure_summary(diagnostics: &[Diagnostic]) -> String {
    let entries: BTreeSet<&str> = diagnostics
        .iter()
        .filter_map(|d| d.entry.as_deref())
        .collect();
    let global = diagnostics.iter().filter(|d| d.entry.is_none()).count();

    match (entries.len(), global) {
        (files, 0) => format!("{} story files failed to compile", files),
        (0, global) => format!("Bundling reported {} errors", global),
        (files, global) => format!(
            "{} story files failed to compile, plus {} other errors",
            files, global
        ),
    }
}
