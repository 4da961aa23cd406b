//! Preview server lifecycle.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;

use vitrine_compiler::{
    BuildConfigError, BuildConfigSource, BuildMode, Bundler, CompileEvent, Compiler,
    CompilerOptions, EntrypointSource, WatchHandle,
};
use vitrine_scan::{MarkerConfig, ScanError, Scanner, DEFAULT_STORY_PATTERN};
use vitrine_static::DEFAULT_NAMESPACE;

use crate::api::{build_router, ApiState};
use crate::state::{PreviewMachine, PreviewStatus, ServerState, Snapshot};
use crate::viewer::Viewer;

/// Configuration for the preview server.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Execution root, watched for changes
    pub root: PathBuf,

    /// Story file pattern
    pub story_pattern: String,

    pub marker: MarkerConfig,

    /// Decorator module pattern
    pub decorator_pattern: Option<String>,

    /// Project build configuration file
    pub build_config: Option<PathBuf>,

    pub namespace: Option<String>,

    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Base URL of emitted files; defaults to the server address
    pub public_path: Option<String>,

    /// Open the browser once listening
    pub open: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            story_pattern: DEFAULT_STORY_PATTERN.to_string(),
            marker: MarkerConfig::default(),
            decorator_pattern: None,
            build_config: None,
            namespace: None,
            host: "127.0.0.1".to_string(),
            port: 5000,
            public_path: None,
            open: true,
        }
    }
}

/// Errors that can occur starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listen address {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Config(#[from] BuildConfigError),

    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("Preview setup failed: {0}")]
    Setup(String),
}

/// A setup failure together with the terminal status it left behind.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct SetupFailure {
    /// Status in `SetupFailed`, with `setup_error` set
    pub status: PreviewStatus,
    pub error: ServerError,
}

/// A running preview session.
///
/// Dropping the server releases the listener and stops watching.
pub struct PreviewServer {
    addr: SocketAddr,
    api: ApiState,
    watch: Option<WatchHandle>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    serve_task: Option<JoinHandle<()>>,
    event_task: Option<JoinHandle<()>>,
}

impl PreviewServer {
    /// Scan, check the bundler, bind, then start the watch session.
    ///
    /// Any failure before serving moves the session to `SetupFailed`; the
    /// failure carries that status and nothing stays bound.
    pub async fn start(
        config: PreviewConfig,
        bundler: Arc<dyn Bundler>,
    ) -> Result<Self, SetupFailure> {
        let namespace = config.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        let mut machine = PreviewMachine::new(namespace);

        match Self::setup(&config, bundler, &mut machine).await {
            Ok(setup) => Ok(Self::launch(&config, machine, setup)),
            Err(error) => {
                machine.setup_failed(error.to_string());
                Err(SetupFailure {
                    status: machine.status(),
                    error,
                })
            }
        }
    }

    async fn setup(
        config: &PreviewConfig,
        bundler: Arc<dyn Bundler>,
        machine: &mut PreviewMachine,
    ) -> Result<Setup, ServerError> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", config.host, config.port)))?;

        let build_config = BuildConfigSource::load(config.build_config.as_deref())?;

        let mut scanner = Scanner::new(&config.root, &config.story_pattern, config.marker.clone())?;
        if let Some(pattern) = &config.decorator_pattern {
            scanner = scanner.with_decorator(pattern)?;
        }
        let entrypoints = scanner.entrypoints()?;
        tracing::info!("Found {} story files", entrypoints.len());

        machine
            .begin_session()
            .map_err(|e| ServerError::Setup(e.to_string()))?;

        bundler
            .check()
            .await
            .map_err(|e| ServerError::Setup(e.to_string()))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Setup(e.to_string()))?;

        let viewer = Viewer::new().map_err(|e| ServerError::Setup(e.to_string()))?;

        let public_path = config
            .public_path
            .clone()
            .unwrap_or_else(|| format!("http://{}/", addr));
        let compiler = Compiler::new(
            bundler,
            &build_config,
            CompilerOptions {
                working_dir: config.root.clone(),
                public_path,
                mode: BuildMode::Development,
            },
        );

        let source: Arc<dyn EntrypointSource> = Arc::new(scanner);
        let (watch, events) = compiler
            .watch(source, &[config.root.clone()])
            .map_err(|e| ServerError::Setup(e.to_string()))?;

        Ok(Setup {
            addr,
            listener,
            viewer,
            watch,
            events,
        })
    }

    fn launch(config: &PreviewConfig, machine: PreviewMachine, setup: Setup) -> Self {
        let url = format!("http://{}", setup.addr);
        let machine = Arc::new(RwLock::new(machine));
        let (snapshot_tx, snapshots) = watch::channel(None);

        let event_task = tokio::spawn(apply_events(
            Arc::clone(&machine),
            setup.events,
            snapshot_tx,
        ));

        let api = ApiState {
            machine,
            snapshots,
            viewer: Arc::new(setup.viewer),
        };
        let router = build_router(api.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let listener = setup.listener;
        let serve_task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!("Preview server error: {}", e);
            }
        });

        tracing::info!("Preview server listening on {}", url);

        if config.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        Self {
            addr: setup.addr,
            api,
            watch: Some(setup.watch),
            shutdown_tx: Some(shutdown_tx),
            serve_task: Some(serve_task),
            event_task: Some(event_task),
        }
    }

    /// Address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn status(&self) -> PreviewStatus {
        self.api.machine.read().await.status()
    }

    pub async fn state(&self) -> ServerState {
        self.api.machine.read().await.state().clone()
    }

    /// Subscribe to published snapshots.
    pub fn snapshots(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.api.snapshots.clone()
    }

    /// A router over this session's state, as served on the listener.
    pub fn router(&self) -> Router {
        build_router(self.api.clone())
    }

    /// Request a recompile without a source change.
    pub fn recompile(&self) {
        if let Some(watch) = &self.watch {
            watch.trigger();
        }
    }

    /// Stop watching, then shut the listener down and wait for it.
    pub async fn stop(mut self) {
        let serve_task = self.shutdown();
        if let Some(task) = serve_task {
            let _ = task.await;
        }
        tracing::info!("Preview server stopped");
    }

    fn shutdown(&mut self) -> Option<JoinHandle<()>> {
        if let Some(mut watch) = self.watch.take() {
            watch.stop();
        }
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.serve_task.take()
    }
}

impl Drop for PreviewServer {
    fn drop(&mut self) {
        if let Some(task) = self.shutdown() {
            task.abort();
        }
    }
}

struct Setup {
    addr: SocketAddr,
    listener: tokio::net::TcpListener,
    viewer: Viewer,
    watch: WatchHandle,
    events: mpsc::Receiver<CompileEvent>,
}

async fn apply_events(
    machine: Arc<RwLock<PreviewMachine>>,
    mut events: mpsc::Receiver<CompileEvent>,
    snapshots: watch::Sender<Option<Arc<Snapshot>>>,
) {
    while let Some(event) = events.recv().await {
        let published = machine.write().await.on_event(&event);
        if let Some(snapshot) = published {
            snapshots.send_replace(Some(snapshot));
        }
    }
}
