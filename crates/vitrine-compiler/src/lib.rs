//! Bundler orchestration for vitrine.
//!
//! Composes build plans from scanned entrypoints and the project build
//! configuration, drives an external bundling engine into an in-memory
//! output store, and runs watch-mode compile cycles that publish
//! begin/done events.

pub mod bundler;
pub mod compile;
pub mod config;
pub mod esbuild;
pub mod plan;
pub mod store;
pub mod watch;
pub mod watcher;

pub use bundler::{Bundler, BundlerUnavailable};
pub use compile::{CompileError, CompileOutput, Compiler, CompilerOptions};
pub use config::{
    BuildConfig, BuildConfigError, BuildConfigSource, BuildMode, ModuleRules, ResolveRules,
};
pub use esbuild::EsbuildBundler;
pub use plan::BuildPlan;
pub use store::{
    join_url, CompiledAsset, CompiledAssets, Diagnostic, EmittedFile, MemoryStore, OrphanOutput,
};
pub use watch::{CompileEvent, EntrypointSource, WatchHandle};
pub use watcher::{FileWatcher, WatchEvent};
