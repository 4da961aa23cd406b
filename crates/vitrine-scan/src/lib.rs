//! Story file discovery for vitrine.
//!
//! Walks a project tree, matches story modules against a path pattern and
//! statically collects the components each one exports.

pub mod entrypoint;
pub mod exports;
pub mod pattern;
pub mod scanner;

pub use entrypoint::{build_entrypoints, entrypoint_key, Entrypoint};
pub use exports::{analyze_module, ExportError, ExportSymbol, ModuleSummary};
pub use pattern::{to_slash, PatternError, StoryPattern};
pub use scanner::{
    resolve_decorator, scan, MarkerConfig, ScanError, Scanner, SourceFile,
    DEFAULT_DECORATOR_PATTERN, DEFAULT_STORY_PATTERN,
};
