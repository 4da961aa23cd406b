//! One-shot compilation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use vitrine_scan::Entrypoint;

use crate::bundler::{Bundler, BundlerUnavailable};
use crate::config::{BuildConfig, BuildConfigError, BuildConfigSource, BuildMode};
use crate::plan::BuildPlan;
use crate::store::{CompiledAssets, Diagnostic, MemoryStore, OrphanOutput};

/// Result of one compile cycle.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// Entrypoints this cycle compiled
    pub entrypoints: Vec<Entrypoint>,

    /// Assets keyed exactly by the entrypoint keys
    pub assets: CompiledAssets,

    /// Per-entry and global diagnostics
    pub diagnostics: Vec<Diagnostic>,

    /// Wall time of the cycle in milliseconds
    pub duration_ms: u64,
}

impl CompileOutput {
    /// Whether any diagnostic was reported.
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Errors that stop a compile.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Config(#[from] BuildConfigError),

    #[error(transparent)]
    Unavailable(#[from] BundlerUnavailable),

    #[error(transparent)]
    Orphan(#[from] OrphanOutput),

    #[error("File watch error: {0}")]
    Watch(String),
}

/// Compiler settings shared by one-shot and watch mode.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Directory imports resolve against (the execution root)
    pub working_dir: PathBuf,

    /// Public path assets are served from
    pub public_path: String,

    /// Build mode handed to the project configuration
    pub mode: BuildMode,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            public_path: "/".to_string(),
            mode: BuildMode::Development,
        }
    }
}

/// Compiler adapter around a bundling engine.
#[derive(Clone)]
pub struct Compiler {
    bundler: Arc<dyn Bundler>,
    config: BuildConfig,
    options: CompilerOptions,
}

impl Compiler {
    /// Create a compiler, resolving the project configuration once.
    pub fn new(
        bundler: Arc<dyn Bundler>,
        config: &BuildConfigSource,
        options: CompilerOptions,
    ) -> Self {
        let config = config.resolve(options.mode);
        Self {
            bundler,
            config,
            options,
        }
    }

    /// The engine behind this compiler.
    pub fn bundler(&self) -> &Arc<dyn Bundler> {
        &self.bundler
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compose the build plan for `entrypoints`.
    pub fn plan(&self, entrypoints: &[Entrypoint]) -> BuildPlan {
        BuildPlan::compose(
            entrypoints,
            self.config.clone(),
            &self.options.public_path,
            self.options.working_dir.clone(),
        )
    }

    /// Compile `entrypoints` into a fresh output store.
    pub async fn compile(&self, entrypoints: &[Entrypoint]) -> Result<CompileOutput, CompileError> {
        self.compile_into(entrypoints, MemoryStore::new()).await
    }

    /// Compile into a caller-provided store.
    pub async fn compile_into(
        &self,
        entrypoints: &[Entrypoint],
        mut store: MemoryStore,
    ) -> Result<CompileOutput, CompileError> {
        let start = Instant::now();
        let plan = self.plan(entrypoints);

        tracing::debug!(
            "Bundling {} entrypoints with {}",
            plan.entries.len(),
            self.bundler.name()
        );

        let diagnostics = self.bundler.bundle(&plan, &mut store).await;
        let assets = store.into_assets(plan.keys(), &plan.public_path)?;

        Ok(CompileOutput {
            entrypoints: entrypoints.to_vec(),
            assets,
            diagnostics,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vitrine_scan::SourceFile;

    /// Bundler writing a stub module per entry and failing entries whose key
    /// contains "broken".
    #[derive(Default)]
    pub(crate) struct FakeBundler {
        pub calls: AtomicUsize,
        pub orphan: bool,
        pub delay: std::time::Duration,
    }

    #[async_trait]
    impl Bundler for FakeBundler {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn check(&self) -> Result<(), BundlerUnavailable> {
            Ok(())
        }

        async fn bundle(&self, plan: &BuildPlan, store: &mut MemoryStore) -> Vec<Diagnostic> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut diagnostics = Vec::new();
            for key in plan.keys() {
                if key.contains("broken") {
                    diagnostics.push(Diagnostic::for_entry(key, "Unexpected token"));
                    continue;
                }
                store.write(key, &format!("{}.js", key), b"export default 1;".to_vec());
            }
            if self.orphan {
                store.write("ghost", "ghost.js", b"".to_vec());
            }
            diagnostics
        }
    }

    pub(crate) fn entry(key: &str) -> Entrypoint {
        Entrypoint {
            key: key.to_string(),
            modules: vec![PathBuf::from(format!("/p/{}.tsx", key))],
            source: SourceFile {
                path: PathBuf::from(format!("/p/{}.tsx", key)),
                relative_path: PathBuf::from(format!("{}.tsx", key)),
                exports: Vec::new(),
                imports: Vec::new(),
            },
        }
    }

    fn compiler(bundler: FakeBundler) -> Compiler {
        Compiler::new(
            Arc::new(bundler),
            &BuildConfigSource::default(),
            CompilerOptions {
                public_path: "http://localhost:5000/".to_string(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn asset_keys_match_entrypoint_keys() {
        let compiler = compiler(FakeBundler::default());
        let entrypoints = vec![entry("a"), entry("b"), entry("broken")];

        let output = compiler.compile(&entrypoints).await.unwrap();

        let keys: Vec<_> = output.assets.keys().collect();
        assert_eq!(keys, vec!["a", "b", "broken"]);
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.assets.get("broken").unwrap().files.is_empty());
        assert_eq!(
            output.assets.get("a").unwrap().files[0].url,
            "http://localhost:5000/a.js"
        );
    }

    #[tokio::test]
    async fn orphan_output_is_a_consistency_error() {
        let compiler = compiler(FakeBundler {
            orphan: true,
            ..Default::default()
        });

        let result = compiler.compile(&[entry("a")]).await;

        assert!(matches!(result, Err(CompileError::Orphan(_))));
    }
}
