//! Trait definitions for bundling engines.

use async_trait::async_trait;

use crate::plan::BuildPlan;
use crate::store::{Diagnostic, MemoryStore};

/// The bundler cannot run at all (missing executable, broken install).
#[derive(Debug, Clone, thiserror::Error)]
#[error("Bundler {bundler} is unavailable: {message}")]
pub struct BundlerUnavailable {
    pub bundler: &'static str,
    pub message: String,
}

/// An external engine that turns a build plan into browser bundles.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Engine identifier (e.g., "esbuild")
    fn name(&self) -> &'static str;

    /// Verify the engine can be invoked.
    async fn check(&self) -> Result<(), BundlerUnavailable>;

    /// Bundle every entry of `plan` into `store`.
    ///
    /// Compile failures are returned as diagnostics; an entry that failed
    /// simply has no output in the store.
    async fn bundle(&self, plan: &BuildPlan, store: &mut MemoryStore) -> Vec<Diagnostic>;
}
