//! Live preview command.

use std::sync::Arc;

use anyhow::{Context, Result};
use vitrine_compiler::{BuildMode, EsbuildBundler};
use vitrine_server::{PreviewConfig, PreviewServer};

use crate::config::ConfigFile;

/// Run the preview server until ctrl-c.
pub async fn run(file_config: ConfigFile, port: Option<u16>, open: bool) -> Result<()> {
    let project = &file_config.project;
    let preview = &file_config.preview;

    let config = PreviewConfig {
        root: project.root.clone(),
        story_pattern: project.story_path.clone(),
        marker: project.marker_config(),
        decorator_pattern: Some(project.decorator_path.clone()),
        build_config: project.build_config_path(None),
        namespace: file_config.bundle.namespace.clone(),
        host: preview.host.clone(),
        port: port.unwrap_or(preview.port),
        public_path: preview.public_path.clone(),
        open: open && preview.open,
    };

    tracing::info!("Starting preview server on port {}", config.port);

    let bundler = EsbuildBundler::new(&file_config.bundler.program, BuildMode::Development);
    let server = PreviewServer::start(config, Arc::new(bundler)).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    server.stop().await;
    Ok(())
}
