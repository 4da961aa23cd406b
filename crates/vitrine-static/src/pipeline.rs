//! One-shot bundle pipeline: scan, compile, analyze, cleanup, write.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use vitrine_compiler::{
    BuildConfigError, BuildConfigSource, BuildMode, Bundler, CompileError, Compiler,
    CompilerOptions, Diagnostic,
};
use vitrine_scan::{MarkerConfig, ScanError, Scanner, DEFAULT_STORY_PATTERN};

use crate::analyze::{analyze, AnalyzeError};
use crate::manifest::build_manifest;
use crate::records::{file_records, story_rows};
use crate::writer::{ArtifactKind, ArtifactWriter, WriteError, DEFAULT_NAMESPACE};

/// Configuration for a bundle run.
#[derive(Debug, Clone)]
pub struct BundleConfig {
    /// Execution root; patterns and imports resolve against it
    pub root: PathBuf,

    /// Story file pattern
    pub story_pattern: String,

    /// Component marker
    pub marker: MarkerConfig,

    /// Decorator module pattern
    pub decorator_pattern: Option<String>,

    /// Project build configuration file
    pub build_config: Option<PathBuf>,

    /// Output directory
    pub output_root: PathBuf,

    /// Output namespace
    pub namespace: Option<String>,

    /// Public path the bundles are loaded from
    pub public_path: String,

    pub mode: BuildMode,

    /// Empty the output directory before writing
    pub clean: bool,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            story_pattern: DEFAULT_STORY_PATTERN.to_string(),
            marker: MarkerConfig::default(),
            decorator_pattern: None,
            build_config: None,
            output_root: PathBuf::from("vitrine-out"),
            namespace: None,
            public_path: "/".to_string(),
            mode: BuildMode::Production,
            clean: true,
        }
    }
}

/// Result of a bundle run.
#[derive(Debug)]
pub struct BundleResult {
    /// Story files bundled
    pub entrypoints: usize,

    /// Component exports across all story files
    pub components: usize,

    /// Bundle files written
    pub files: usize,

    /// Per-entry compile diagnostics
    pub diagnostics: Vec<Diagnostic>,

    /// Total run time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_root: PathBuf,
}

/// Errors that stop a bundle run.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error(transparent)]
    Config(#[from] BuildConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Consistency error: {0}")]
    Analyze(#[from] AnalyzeError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Runs the one-shot pipeline with a given bundling engine.
pub struct BundlePipeline {
    config: BundleConfig,
    bundler: Arc<dyn Bundler>,
}

impl BundlePipeline {
    pub fn new(config: BundleConfig, bundler: Arc<dyn Bundler>) -> Self {
        Self { config, bundler }
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    /// Run every stage in order, stopping at the first fatal error.
    pub async fn run(&self) -> Result<BundleResult, BundleError> {
        let start = Instant::now();
        let config = &self.config;
        let namespace = config.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);

        let build_config = BuildConfigSource::load(config.build_config.as_deref())?;
        let writer = ArtifactWriter::new(&config.output_root);
        writer.check_outside(&config.root)?;
        self.bundler.check().await.map_err(CompileError::from)?;

        let mut scanner = Scanner::new(&config.root, &config.story_pattern, config.marker.clone())?;
        if let Some(pattern) = &config.decorator_pattern {
            scanner = scanner.with_decorator(pattern)?;
        }
        let entrypoints = scanner.entrypoints()?;
        let components: usize = entrypoints.iter().map(|e| e.component_count()).sum();
        tracing::info!(
            "Found {} components in {} files",
            components,
            entrypoints.len()
        );

        let compiler = Compiler::new(
            Arc::clone(&self.bundler),
            &build_config,
            CompilerOptions {
                working_dir: config.root.clone(),
                public_path: config.public_path.clone(),
                mode: config.mode,
            },
        );
        let output = compiler.compile(&entrypoints).await?;
        for diagnostic in &output.diagnostics {
            tracing::warn!("{}", diagnostic);
        }
        tracing::info!(
            "{} components compiled, {} errors",
            components,
            output.diagnostics.len()
        );

        let metadata = analyze(&entrypoints, &output.assets, namespace)?;

        // The previous artifact set survives every fatal error above.
        if config.clean {
            writer.clean()?;
        }

        let mut files = 0;
        for name in output.assets.file_names() {
            if let Some(content) = output.assets.content(name) {
                writer.write_bundle(Some(namespace), name, content)?;
                files += 1;
            }
        }

        let stories = story_rows(&entrypoints, &metadata, namespace).map_err(|e| {
            WriteError::Serialize {
                kind: ArtifactKind::Stories.file_name(),
                message: e.to_string(),
            }
        })?;
        writer.write(ArtifactKind::Stories, &stories, Some(namespace))?;
        writer.write(
            ArtifactKind::Files,
            &file_records(&output.assets, namespace),
            Some(namespace),
        )?;
        writer.write(
            ArtifactKind::Manifest,
            &build_manifest(entrypoints.iter().map(|e| &e.source)),
            None,
        )?;

        let duration = start.elapsed();
        tracing::info!(
            "Wrote {} files to {} in {}ms",
            files,
            writer.output_root().display(),
            duration.as_millis()
        );

        Ok(BundleResult {
            entrypoints: entrypoints.len(),
            components,
            files,
            diagnostics: output.diagnostics,
            duration_ms: duration.as_millis() as u64,
            output_root: config.output_root.clone(),
        })
    }
}
