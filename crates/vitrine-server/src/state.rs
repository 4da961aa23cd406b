//! Preview compilation state machine.
//!
//! Compile events are the only input. Every mutation of the served state
//! goes through [`PreviewMachine::on_event`], [`PreviewMachine::begin_session`]
//! or [`PreviewMachine::setup_failed`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use vitrine_compiler::{CompileEvent, CompileOutput, CompiledAssets, Diagnostic, EmittedFile};
use vitrine_static::{analyze, StoryCollectionMetadata};

/// Compilation state of a preview session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    /// Nothing started yet
    Idle,

    /// A cycle is running; the last good snapshot is still served
    Compiling,

    /// The latest cycle finished
    Ready,

    /// The session could not start; terminal
    SetupFailed(String),
}

/// Immutable result of one finished cycle.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub cycle: u64,
    pub assets: CompiledAssets,
    pub stories: BTreeMap<String, StoryCollectionMetadata>,
}

impl Snapshot {
    /// Entry key to emitted files.
    pub fn asset_map(&self) -> BTreeMap<String, Vec<EmittedFile>> {
        self.assets
            .iter()
            .map(|asset| (asset.key.clone(), asset.files.clone()))
            .collect()
    }

    /// Every emitted file once, in key order.
    pub fn files(&self) -> Vec<EmittedFile> {
        let mut files: Vec<EmittedFile> = Vec::new();
        for asset in self.assets.iter() {
            for file in &asset.files {
                if !files.iter().any(|f| f.name == file.name) {
                    files.push(file.clone());
                }
            }
        }
        files
    }
}

/// Status reported by `/api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewStatus {
    pub ready: bool,
    pub established: bool,
    pub setup_error: Option<String>,
    pub errors: Vec<Diagnostic>,
}

/// The transition was not allowed from the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot {action} while {state:?}")]
pub struct InvalidTransition {
    pub action: &'static str,
    pub state: ServerState,
}

#[derive(Debug)]
pub struct PreviewMachine {
    state: ServerState,
    namespace: String,
    latest_cycle: u64,
    established: bool,
    errors: Vec<Diagnostic>,
    snapshot: Option<Arc<Snapshot>>,
}

impl PreviewMachine {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            state: ServerState::Idle,
            namespace: namespace.into(),
            latest_cycle: 0,
            established: false,
            errors: Vec::new(),
            snapshot: None,
        }
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Last published snapshot.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.clone()
    }

    pub fn status(&self) -> PreviewStatus {
        PreviewStatus {
            ready: self.state == ServerState::Ready,
            established: self.established,
            setup_error: match &self.state {
                ServerState::SetupFailed(message) => Some(message.clone()),
                _ => None,
            },
            errors: self.errors.clone(),
        }
    }

    /// Idle to Compiling once sources and metadata are available.
    pub fn begin_session(&mut self) -> Result<(), InvalidTransition> {
        if self.state != ServerState::Idle {
            return Err(InvalidTransition {
                action: "begin session",
                state: self.state.clone(),
            });
        }
        self.state = ServerState::Compiling;
        Ok(())
    }

    /// Enter the terminal failure state.
    pub fn setup_failed(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("Preview setup failed: {}", message);
        self.state = ServerState::SetupFailed(message);
    }

    /// Apply a compile event.
    ///
    /// Returns the new snapshot when the event published one.
    pub fn on_event(&mut self, event: &CompileEvent) -> Option<Arc<Snapshot>> {
        if matches!(self.state, ServerState::Idle | ServerState::SetupFailed(_)) {
            tracing::debug!("Ignoring compile event in state {:?}", self.state);
            return None;
        }

        match event {
            CompileEvent::CycleBegan { cycle } => {
                if *cycle <= self.latest_cycle {
                    return None;
                }
                self.latest_cycle = *cycle;
                self.errors.clear();
                self.state = ServerState::Compiling;
                tracing::debug!("Cycle {} began", cycle);
                None
            }
            CompileEvent::CycleDone { cycle, output } => {
                if *cycle != self.latest_cycle || self.state != ServerState::Compiling {
                    tracing::debug!(
                        "Discarding stale cycle {} (latest {})",
                        cycle,
                        self.latest_cycle
                    );
                    return None;
                }
                let snapshot = Arc::new(self.build_snapshot(*cycle, output));
                self.established = true;
                self.state = ServerState::Ready;
                self.snapshot = Some(Arc::clone(&snapshot));

                tracing::info!(
                    "{} components compiled, {} errors",
                    output.entrypoints.iter().map(|e| e.component_count()).sum::<usize>(),
                    self.errors.len()
                );
                Some(snapshot)
            }
        }
    }

    fn build_snapshot(&mut self, cycle: u64, output: &CompileOutput) -> Snapshot {
        self.errors = output.diagnostics.clone();

        let stories = match analyze(&output.entrypoints, &output.assets, &self.namespace) {
            Ok(stories) => stories,
            Err(e) => {
                tracing::warn!("Story analysis failed: {}", e);
                self.errors.push(Diagnostic::global(e.to_string()));
                BTreeMap::new()
            }
        };

        Snapshot {
            cycle,
            assets: output.assets.clone(),
            stories,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use vitrine_compiler::MemoryStore;
    use vitrine_scan::{Entrypoint, ExportSymbol, SourceFile};

    fn entry(key: &str) -> Entrypoint {
        Entrypoint {
            key: key.to_string(),
            modules: vec![PathBuf::from(format!("/p/{}.tsx", key))],
            source: SourceFile {
                path: PathBuf::from(format!("/p/{}.tsx", key)),
                relative_path: PathBuf::from(format!("{}.tsx", key)),
                exports: vec![ExportSymbol {
                    symbol: "Story".to_string(),
                    is_default_export: true,
                    position: 0,
                }],
                imports: Vec::new(),
            },
        }
    }

    fn done(cycle: u64, keys: &[&str], diagnostics: Vec<Diagnostic>) -> CompileEvent {
        let mut store = MemoryStore::new();
        for key in keys {
            store.write(key, &format!("{}.js", key), b"export default 1;".to_vec());
        }
        CompileEvent::CycleDone {
            cycle,
            output: Arc::new(CompileOutput {
                entrypoints: keys.iter().map(|k| entry(k)).collect(),
                assets: store.into_assets(keys.iter().copied(), "http://localhost:5000/").unwrap(),
                diagnostics,
                duration_ms: 1,
            }),
        }
    }

    fn started() -> PreviewMachine {
        let mut machine = PreviewMachine::new("default");
        machine.begin_session().unwrap();
        machine
    }

    #[test]
    fn first_cycle_reaches_ready() {
        let mut machine = started();

        machine.on_event(&CompileEvent::CycleBegan { cycle: 1 });
        assert_eq!(machine.state(), &ServerState::Compiling);
        assert!(!machine.status().established);

        let published = machine.on_event(&done(1, &["a"], Vec::new()));

        assert!(published.is_some());
        assert_eq!(machine.state(), &ServerState::Ready);
        let status = machine.status();
        assert!(status.ready);
        assert!(status.established);
        assert_eq!(status.setup_error, None);

        let snapshot = machine.snapshot().unwrap();
        assert_eq!(snapshot.stories["a"].story_items.len(), 1);
        assert_eq!(
            snapshot.asset_map()["a"][0].url,
            "http://localhost:5000/a.js"
        );
    }

    #[test]
    fn stale_done_never_overrides_newer_cycle() {
        let mut machine = started();
        machine.on_event(&CompileEvent::CycleBegan { cycle: 1 });
        machine.on_event(&CompileEvent::CycleBegan { cycle: 2 });

        let stale = machine.on_event(&done(1, &["old"], Vec::new()));

        assert!(stale.is_none());
        assert_eq!(machine.state(), &ServerState::Compiling);
        assert!(machine.snapshot().is_none());

        machine.on_event(&done(2, &["new"], Vec::new()));
        assert_eq!(machine.snapshot().unwrap().cycle, 2);
    }

    #[test]
    fn keeps_serving_old_snapshot_while_compiling() {
        let mut machine = started();
        machine.on_event(&CompileEvent::CycleBegan { cycle: 1 });
        machine.on_event(&done(1, &["a"], vec![Diagnostic::for_entry("a", "warn")]));

        machine.on_event(&CompileEvent::CycleBegan { cycle: 2 });

        let status = machine.status();
        assert!(!status.ready);
        assert!(status.established);
        assert!(status.errors.is_empty());
        assert_eq!(machine.snapshot().unwrap().cycle, 1);

        machine.on_event(&done(2, &["a", "b"], Vec::new()));
        let snapshot = machine.snapshot().unwrap();
        assert_eq!(snapshot.cycle, 2);
        assert_eq!(snapshot.files().len(), 2);
    }

    #[test]
    fn done_captures_diagnostics() {
        let mut machine = started();
        machine.on_event(&CompileEvent::CycleBegan { cycle: 1 });

        machine.on_event(&done(1, &["a"], vec![Diagnostic::for_entry("a", "Unexpected token")]));

        assert_eq!(machine.status().errors.len(), 1);
        assert!(machine.status().ready);
    }

    #[test]
    fn setup_failure_is_terminal() {
        let mut machine = started();
        machine.setup_failed("address in use");

        machine.on_event(&CompileEvent::CycleBegan { cycle: 1 });
        machine.on_event(&done(1, &["a"], Vec::new()));

        assert_eq!(
            machine.state(),
            &ServerState::SetupFailed("address in use".to_string())
        );
        assert_eq!(
            machine.status().setup_error.as_deref(),
            Some("address in use")
        );
        assert!(machine.snapshot().is_none());
    }

    #[test]
    fn session_begins_only_from_idle() {
        let mut machine = started();

        let err = machine.begin_session().unwrap_err();

        assert_eq!(err.state, ServerState::Compiling);
    }

    #[test]
    fn events_before_session_are_ignored() {
        let mut machine = PreviewMachine::new("default");

        machine.on_event(&CompileEvent::CycleBegan { cycle: 1 });

        assert_eq!(machine.state(), &ServerState::Idle);
    }
}
