//! Story metadata and persisted artifacts for vitrine.
//!
//! Correlates scanned story exports with compiled bundles, and writes the
//! whitelisted `stories.json`, `files.json` and `manifest.json` artifacts
//! alongside the bundle files.

pub mod analyze;
pub mod manifest;
pub mod pipeline;
pub mod records;
pub mod writer;

pub use analyze::{analyze, story_title, AnalyzeError, StoryCollectionMetadata, StoryItem};
pub use manifest::{build_manifest, Manifest};
pub use pipeline::{BundleConfig, BundleError, BundlePipeline, BundleResult};
pub use records::{file_records, git_path, output_file_path, story_rows, FileRecord, StoryRecord};
pub use writer::{
    filter_fields, ArtifactKind, ArtifactWriter, WriteError, DEFAULT_NAMESPACE, FILE_FIELDS,
    STORY_FIELDS,
};
