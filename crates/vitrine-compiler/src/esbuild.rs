//! esbuild engine.
//!
//! All entries of a plan are bundled by one `esbuild` run with code
//! splitting into a scratch directory. The metafile tells which outputs
//! belong to which entry; chunks imported by several entries are stored as
//! shared files. Extra modules of an entry (the decorator) are injected
//! with `--inject`, so they land in the shared chunk.
//!
//! esbuild stops the whole build on the first error. When the joint run
//! fails, every entry is rebuilt on its own so each failure is reported
//! against its entry and the other entries still produce output.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::task::JoinSet;

use crate::bundler::{Bundler, BundlerUnavailable};
use crate::config::BuildMode;
use crate::plan::BuildPlan;
use crate::store::{Diagnostic, MemoryStore};

const OUT_DIR: &str = "out";
const METAFILE: &str = "meta.json";

/// Bundler driving the `esbuild` executable.
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    program: PathBuf,
    mode: BuildMode,
}

impl Default for EsbuildBundler {
    fn default() -> Self {
        Self::new("esbuild", BuildMode::Development)
    }
}

impl EsbuildBundler {
    /// Create a bundler running `program` in `mode`.
    pub fn new(program: impl Into<PathBuf>, mode: BuildMode) -> Self {
        Self {
            program: program.into(),
            mode,
        }
    }

    /// Command line arguments bundling `keys` of `plan` into `scratch`.
    pub fn build_args(&self, plan: &BuildPlan, keys: &[&str], scratch: &Path) -> Vec<String> {
        let mut args = Vec::new();
        let mut injected = BTreeSet::new();

        for key in keys {
            let Some(modules) = plan.entries.get(*key) else {
                continue;
            };
            if let Some(story) = modules.first() {
                args.push(format!("{}={}", key, story.display()));
            }
            injected.extend(modules.iter().skip(1));
        }

        args.extend(
            [
                "--bundle",
                "--splitting",
                "--format=esm",
                "--platform=browser",
                "--charset=utf8",
                "--log-level=error",
                "--chunk-names=chunks/[name]-[hash]",
                "--asset-names=assets/[name]-[hash]",
            ]
            .map(String::from),
        );
        args.push(format!("--outdir={}", scratch.join(OUT_DIR).display()));
        args.push(format!("--metafile={}", scratch.join(METAFILE).display()));

        match self.mode {
            BuildMode::Development => args.push("--sourcemap=inline".to_string()),
            BuildMode::Production => args.push("--minify".to_string()),
        }

        if !plan.public_path.is_empty() {
            args.push(format!("--public-path={}", plan.public_path));
        }

        for module in injected {
            args.push(format!("--inject:{}", module.display()));
        }

        let resolve = &plan.config.resolve;
        for (from, to) in &resolve.alias {
            args.push(format!("--alias:{}={}", from, to));
        }
        if !resolve.extensions.is_empty() {
            args.push(format!(
                "--resolve-extensions={}",
                resolve.extensions.join(",")
            ));
        }

        let module = &plan.config.module;
        for (extension, loader) in &module.loaders {
            args.push(format!("--loader:{}={}", extension, loader));
        }
        for external in &module.externals {
            args.push(format!("--external:{}", external));
        }
        for (name, value) in &module.define {
            args.push(format!("--define:{}={}", name, value));
        }

        args
    }

    /// Run one esbuild process over `keys` and read its outputs back.
    async fn run(&self, plan: &BuildPlan, keys: &[&str]) -> Result<BuildOutput, RunError> {
        let scratch = tempfile::Builder::new()
            .prefix("vitrine-")
            .tempdir()
            .map_err(|e| RunError::Setup(format!("failed to create scratch directory: {}", e)))?;
        let scratch_path = scratch
            .path()
            .canonicalize()
            .map_err(|e| RunError::Setup(e.to_string()))?;
        let working_dir = plan
            .working_dir
            .canonicalize()
            .map_err(|e| RunError::Setup(format!("{}: {}", plan.working_dir.display(), e)))?;

        let output = Command::new(&self.program)
            .args(self.build_args(plan, keys, &scratch_path))
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RunError::Spawn(spawn_message(&self.program, &e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RunError::Failed(stderr.trim().to_string()));
        }

        let metafile = tokio::fs::read(scratch_path.join(METAFILE))
            .await
            .map_err(|e| RunError::Setup(format!("failed to read metafile: {}", e)))?;
        let metafile: Metafile = serde_json::from_slice(&metafile)
            .map_err(|e| RunError::Setup(format!("invalid metafile: {}", e)))?;

        let outdir = scratch_path.join(OUT_DIR);
        let owners = entry_outputs(&metafile, &working_dir, &outdir, keys);

        let mut contents = BTreeMap::new();
        for names in owners.values() {
            for name in names {
                if contents.contains_key(name) {
                    continue;
                }
                let content = tokio::fs::read(outdir.join(name))
                    .await
                    .map_err(|e| RunError::Setup(format!("failed to read {}: {}", name, e)))?;
                contents.insert(name.clone(), Arc::<[u8]>::from(content));
            }
        }

        Ok(BuildOutput { owners, contents })
    }

    /// Rebuild each entry alone, collecting output and per-entry failures.
    async fn run_isolated(
        &self,
        plan: &BuildPlan,
        store: &mut MemoryStore,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        let mut tasks = JoinSet::new();
        for key in plan.keys() {
            let bundler = self.clone();
            let plan = plan.clone();
            let key = key.to_string();
            tasks.spawn(async move {
                let result = bundler.run(&plan, &[key.as_str()]).await;
                (key, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(output))) => output.load_into(store),
                Ok((key, Err(e))) => diagnostics.push(Diagnostic::for_entry(&key, e.message())),
                Err(e) => {
                    diagnostics.push(Diagnostic::global(format!("bundler task failed: {}", e)))
                }
            }
        }
    }
}

#[async_trait]
impl Bundler for EsbuildBundler {
    fn name(&self) -> &'static str {
        "esbuild"
    }

    async fn check(&self) -> Result<(), BundlerUnavailable> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| BundlerUnavailable {
                bundler: self.name(),
                message: spawn_message(&self.program, &e),
            })?;

        if !output.status.success() {
            return Err(BundlerUnavailable {
                bundler: self.name(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::debug!(
            "Using esbuild {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    async fn bundle(&self, plan: &BuildPlan, store: &mut MemoryStore) -> Vec<Diagnostic> {
        let keys: Vec<&str> = plan.keys().collect();
        if keys.is_empty() {
            return Vec::new();
        }

        let mut diagnostics = Vec::new();
        match self.run(plan, &keys).await {
            Ok(output) => output.load_into(store),
            Err(RunError::Failed(message)) if keys.len() > 1 => {
                tracing::debug!("Joint build failed, rebuilding entries one by one: {}", message);
                self.run_isolated(plan, store, &mut diagnostics).await;
            }
            Err(e) => {
                let message = e.message();
                diagnostics.extend(keys.iter().map(|key| Diagnostic::for_entry(key, message)));
            }
        }

        diagnostics.sort_by(|a, b| a.entry.cmp(&b.entry));
        diagnostics
    }
}

#[derive(Debug)]
enum RunError {
    /// The executable could not be started
    Spawn(String),

    /// esbuild reported compile errors
    Failed(String),

    /// Scratch directory or metafile trouble
    Setup(String),
}

impl RunError {
    fn message(&self) -> &str {
        match self {
            RunError::Spawn(m) | RunError::Failed(m) | RunError::Setup(m) => m,
        }
    }
}

/// Subset of the esbuild metafile the engine reads.
#[derive(Debug, Default, Deserialize)]
struct Metafile {
    #[serde(default)]
    outputs: BTreeMap<String, MetaOutput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaOutput {
    #[serde(default)]
    imports: Vec<MetaImport>,
    #[serde(default)]
    entry_point: Option<String>,
    #[serde(default)]
    css_bundle: Option<String>,
    #[serde(default)]
    inputs: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MetaImport {
    path: String,
    kind: String,
    #[serde(default)]
    external: bool,
}

/// Outputs of one run: the files each entry needs, plus their contents.
#[derive(Debug, Default)]
struct BuildOutput {
    owners: BTreeMap<String, Vec<String>>,
    contents: BTreeMap<String, Arc<[u8]>>,
}

impl BuildOutput {
    /// Store entry-owned files first, then files shared by several entries.
    fn load_into(self, store: &mut MemoryStore) {
        let mut users: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (key, names) in &self.owners {
            for name in names {
                users.entry(name.as_str()).or_default().push(key.as_str());
            }
        }

        for (key, names) in &self.owners {
            for name in names {
                if users.get(name.as_str()).map_or(0, Vec::len) != 1 {
                    continue;
                }
                if let Some(content) = self.contents.get(name) {
                    store.write(key, name, Arc::clone(content));
                }
            }
        }

        for (name, keys) in users.iter().filter(|(_, keys)| keys.len() > 1) {
            if let Some(content) = self.contents.get(*name) {
                store.write_shared(keys, name, Arc::clone(content));
            }
        }
    }
}

/// Files each entry of `keys` loads, entry module first.
///
/// Metafile paths are relative to `working_dir`; returned names are
/// relative to `outdir`. Outputs no import reaches (file loader assets) go
/// to every entry bundling one of their inputs.
fn entry_outputs(
    metafile: &Metafile,
    working_dir: &Path,
    outdir: &Path,
    keys: &[&str],
) -> BTreeMap<String, Vec<String>> {
    let name_of = |path: &str| output_name(working_dir, outdir, path);

    let outputs: BTreeMap<String, &MetaOutput> = metafile
        .outputs
        .iter()
        .filter_map(|(path, output)| name_of(path).map(|name| (name, output)))
        .filter(|(name, _)| !name.ends_with(".map"))
        .collect();

    let mut owners = BTreeMap::new();
    for (name, output) in &outputs {
        if output.entry_point.is_none() {
            continue;
        }
        let Some(key) = name.strip_suffix(".js").filter(|k| keys.contains(k)) else {
            continue;
        };

        let mut files = vec![name.clone()];
        if let Some(css) = output.css_bundle.as_deref().and_then(name_of) {
            files.push(css);
        }

        let mut i = 0;
        while i < files.len() {
            if let Some(current) = outputs.get(&files[i]) {
                for import in &current.imports {
                    if import.external || import.kind == "dynamic-import" {
                        continue;
                    }
                    if let Some(imported) = name_of(&import.path) {
                        if outputs.contains_key(&imported) && !files.contains(&imported) {
                            files.push(imported);
                        }
                    }
                }
            }
            i += 1;
        }

        owners.insert(key.to_string(), files);
    }

    let reached: BTreeSet<String> = owners.values().flatten().cloned().collect();
    for (name, output) in outputs.iter().filter(|(name, _)| !reached.contains(*name)) {
        for files in owners.values_mut() {
            let bundles_input = files.iter().any(|file| {
                outputs.get(file).is_some_and(|o| {
                    output.inputs.keys().any(|input| o.inputs.contains_key(input))
                })
            });
            if bundles_input {
                files.push(name.clone());
            }
        }
    }

    owners
}

/// Name of a metafile output path below `outdir`, with `/` separators.
fn output_name(working_dir: &Path, outdir: &Path, path: &str) -> Option<String> {
    let mut absolute = PathBuf::new();
    for component in working_dir.join(path).components() {
        match component {
            Component::ParentDir => {
                absolute.pop();
            }
            Component::CurDir => {}
            other => absolute.push(other),
        }
    }

    let relative = absolute.strip_prefix(outdir).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn spawn_message(program: &Path, error: &std::io::Error) -> String {
    if error.kind() == ErrorKind::NotFound {
        format!(
            "{} not found; install esbuild or set bundler.program",
            program.display()
        )
    } else {
        format!("failed to run {}: {}", program.display(), error)
    }
}
