//! Watch-mode compilation.
//!
//! A single task runs compile cycles one after another. Source changes only
//! raise a trigger; triggers raised while a cycle runs collapse into one
//! follow-up cycle. Progress is published as [`CompileEvent`]s.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use vitrine_scan::{Entrypoint, ScanError, Scanner};

use crate::compile::{CompileError, CompileOutput, Compiler};
use crate::store::Diagnostic;
use crate::watcher::FileWatcher;

/// Lifecycle events of watch-mode compile cycles.
#[derive(Debug, Clone)]
pub enum CompileEvent {
    /// A cycle started
    CycleBegan { cycle: u64 },

    /// A cycle finished
    CycleDone {
        cycle: u64,
        output: Arc<CompileOutput>,
    },
}

impl CompileEvent {
    pub fn cycle(&self) -> u64 {
        match self {
            CompileEvent::CycleBegan { cycle } | CompileEvent::CycleDone { cycle, .. } => *cycle,
        }
    }
}

/// Supplies the entrypoint set at the start of every cycle.
pub trait EntrypointSource: Send + Sync {
    fn entrypoints(&self) -> Result<Vec<Entrypoint>, ScanError>;
}

impl EntrypointSource for Scanner {
    fn entrypoints(&self) -> Result<Vec<Entrypoint>, ScanError> {
        Scanner::entrypoints(self)
    }
}

impl EntrypointSource for Vec<Entrypoint> {
    fn entrypoints(&self) -> Result<Vec<Entrypoint>, ScanError> {
        Ok(self.clone())
    }
}

/// Handle to a running watch session.
///
/// Dropping the handle stops the session.
pub struct WatchHandle {
    trigger: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    watcher: Option<FileWatcher>,
    forwarder: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Request a compile cycle.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Whether the session has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop watching and publishing events.
    ///
    /// A cycle already running finishes in the background; its result is
    /// not published.
    pub fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.watcher.take();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        // Wake an idle cycle loop so it can observe the flag and exit.
        self.trigger.notify_one();
        tracing::debug!("Watch session stopped");
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Compiler {
    /// Start a watch session over `watch_paths`.
    ///
    /// The first cycle starts immediately. Without watch paths cycles only
    /// run when [`WatchHandle::trigger`] is called.
    pub fn watch(
        &self,
        source: Arc<dyn EntrypointSource>,
        watch_paths: &[PathBuf],
    ) -> Result<(WatchHandle, mpsc::Receiver<CompileEvent>), CompileError> {
        let (events_tx, events_rx) = mpsc::channel(16);
        let trigger = Arc::new(Notify::new());
        let stopped = Arc::new(AtomicBool::new(false));

        let (watcher, forwarder) = if watch_paths.is_empty() {
            (None, None)
        } else {
            let (watcher, mut changes) =
                FileWatcher::new(watch_paths).map_err(|e| CompileError::Watch(e.to_string()))?;
            let trigger = Arc::clone(&trigger);
            let forwarder = tokio::spawn(async move {
                while let Some(change) = changes.recv().await {
                    tracing::debug!("Source changed: {}", change.path().display());
                    trigger.notify_one();
                }
            });
            (Some(watcher), Some(forwarder))
        };

        tokio::spawn(run_cycles(
            self.clone(),
            source,
            Arc::clone(&trigger),
            Arc::clone(&stopped),
            events_tx,
        ));

        trigger.notify_one();

        Ok((
            WatchHandle {
                trigger,
                stopped,
                watcher,
                forwarder,
            },
            events_rx,
        ))
    }
}

async fn run_cycles(
    compiler: Compiler,
    source: Arc<dyn EntrypointSource>,
    trigger: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    events: mpsc::Sender<CompileEvent>,
) {
    let mut cycle = 0u64;
    let mut entrypoints: Vec<Entrypoint> = Vec::new();

    loop {
        trigger.notified().await;
        if stopped.load(Ordering::SeqCst) {
            break;
        }

        cycle += 1;
        if events.send(CompileEvent::CycleBegan { cycle }).await.is_err() {
            break;
        }

        let mut diagnostics = Vec::new();
        let scan_source = Arc::clone(&source);
        match tokio::task::spawn_blocking(move || scan_source.entrypoints()).await {
            Ok(Ok(found)) => entrypoints = found,
            Ok(Err(e)) => {
                tracing::warn!("Rescan failed, keeping previous entrypoints: {}", e);
                diagnostics.push(Diagnostic::global(e.to_string()));
            }
            Err(e) => diagnostics.push(Diagnostic::global(format!("scan task failed: {}", e))),
        }

        let mut output = match compiler.compile(&entrypoints).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("Compile cycle {} failed: {}", cycle, e);
                CompileOutput {
                    diagnostics: vec![Diagnostic::global(e.to_string())],
                    ..Default::default()
                }
            }
        };
        diagnostics.append(&mut output.diagnostics);
        output.diagnostics = diagnostics;

        if stopped.load(Ordering::SeqCst) {
            tracing::debug!("Discarding cycle {} after stop", cycle);
            break;
        }

        tracing::debug!(
            "Cycle {} compiled {} entrypoints in {}ms",
            cycle,
            output.assets.len(),
            output.duration_ms
        );

        let done = CompileEvent::CycleDone {
            cycle,
            output: Arc::new(output),
        };
        if events.send(done).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::tests::{entry, FakeBundler};
    use crate::compile::CompilerOptions;
    use crate::config::BuildConfigSource;
    use std::time::Duration;

    fn compiler() -> Compiler {
        Compiler::new(
            Arc::new(FakeBundler::default()),
            &BuildConfigSource::default(),
            CompilerOptions::default(),
        )
    }

    async fn next(rx: &mut mpsc::Receiver<CompileEvent>) -> CompileEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for compile event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn first_cycle_starts_immediately() {
        let source: Arc<dyn EntrypointSource> = Arc::new(vec![entry("a"), entry("b")]);
        let (_handle, mut rx) = compiler().watch(source, &[]).unwrap();

        assert!(matches!(next(&mut rx).await, CompileEvent::CycleBegan { cycle: 1 }));
        match next(&mut rx).await {
            CompileEvent::CycleDone { cycle, output } => {
                assert_eq!(cycle, 1);
                assert_eq!(output.assets.keys().collect::<Vec<_>>(), vec!["a", "b"]);
            }
            other => panic!("expected CycleDone, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn triggers_during_a_cycle_coalesce() {
        let source: Arc<dyn EntrypointSource> = Arc::new(vec![entry("a")]);
        let (handle, mut rx) = compiler().watch(source, &[]).unwrap();

        assert!(matches!(next(&mut rx).await, CompileEvent::CycleBegan { cycle: 1 }));
        handle.trigger();
        handle.trigger();
        handle.trigger();

        assert!(matches!(next(&mut rx).await, CompileEvent::CycleDone { cycle: 1, .. }));
        assert!(matches!(next(&mut rx).await, CompileEvent::CycleBegan { cycle: 2 }));
        assert!(matches!(next(&mut rx).await, CompileEvent::CycleDone { cycle: 2, .. }));

        let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(extra.is_err(), "no third cycle expected");
    }

    #[tokio::test]
    async fn stop_ends_the_event_stream() {
        let source: Arc<dyn EntrypointSource> = Arc::new(vec![entry("a")]);
        let (mut handle, mut rx) = compiler().watch(source, &[]).unwrap();

        assert!(matches!(next(&mut rx).await, CompileEvent::CycleBegan { .. }));
        assert!(matches!(next(&mut rx).await, CompileEvent::CycleDone { .. }));

        handle.stop();
        handle.trigger();

        let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for channel close");
        assert!(closed.is_none());
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn stop_discards_the_running_cycle() {
        let bundler = Arc::new(FakeBundler {
            delay: Duration::from_millis(300),
            ..Default::default()
        });
        let compiler = Compiler::new(
            Arc::clone(&bundler) as Arc<dyn crate::Bundler>,
            &BuildConfigSource::default(),
            CompilerOptions::default(),
        );
        let source: Arc<dyn EntrypointSource> = Arc::new(vec![entry("a")]);
        let (mut handle, mut rx) = compiler.watch(source, &[]).unwrap();

        assert!(matches!(next(&mut rx).await, CompileEvent::CycleBegan { cycle: 1 }));
        handle.stop();

        let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for channel close");
        assert!(closed.is_none(), "no CycleDone after stop");
        assert_eq!(bundler.calls.load(Ordering::SeqCst), 1);
    }

    struct FailingSource;

    impl EntrypointSource for FailingSource {
        fn entrypoints(&self) -> Result<Vec<Entrypoint>, ScanError> {
            Err(ScanError::NoComponentsFound {
                pattern: "src/**/*.vitrine.tsx".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn rescan_failure_becomes_a_diagnostic() {
        let (_handle, mut rx) = compiler().watch(Arc::new(FailingSource), &[]).unwrap();

        next(&mut rx).await;
        match next(&mut rx).await {
            CompileEvent::CycleDone { output, .. } => {
                assert!(output.assets.is_empty());
                assert_eq!(output.diagnostics.len(), 1);
                assert!(output.diagnostics[0].message.contains("No components found"));
            }
            other => panic!("expected CycleDone, got {:?}", other),
        }
    }
}
