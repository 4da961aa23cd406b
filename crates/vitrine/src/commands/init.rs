//! Initialize vitrine in a project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Run the init command.
pub async fn run(yes: bool) -> Result<()> {
    tracing::info!("Initializing vitrine...");

    init_project(Path::new("."), yes)?;

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'vitrine preview' to start the preview server.");

    Ok(())
}

/// Write the starter files below `root`, keeping existing ones unless `yes`.
pub fn init_project(root: &Path, yes: bool) -> Result<usize> {
    let files = [
        ("vitrine.toml", DEFAULT_CONFIG),
        ("vitrine.build.toml", DEFAULT_BUILD_CONFIG),
        (".vitrine/decorator.tsx", DEFAULT_DECORATOR),
        ("src/Button.vitrine.tsx", DEFAULT_STORY),
    ];

    let mut written = 0;
    for (relative, content) in files {
        let path = root.join(relative);
        if path.exists() && !yes {
            tracing::warn!("{} already exists. Use --yes to overwrite.", relative);
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", relative))?;
        tracing::info!("Created {}", relative);
        written += 1;
    }

    Ok(written)
}

const DEFAULT_CONFIG: &str = r#"# vitrine configuration

[project]
# Execution root; patterns and imports resolve against it
root = "."

# Story files
story_path = "src/**/*.vitrine.@(tsx|ts|jsx|js)"

# Module injected into every story bundle
decorator_path = ".vitrine/decorator.@(tsx|ts|jsx|js)"

# Resolve and module rules for the bundler
build_config = "vitrine.build.toml"

# Only count exports preceded by a comment containing this marker
# marker = "@component"

[bundle]
output = "vitrine-out"
# namespace = "default"
public_path = "/"

[preview]
port = 5000
open = true

[bundler]
program = "esbuild"
"#;

const DEFAULT_BUILD_CONFIG: &str = r#"# Bundler rules

[resolve]
extensions = [".tsx", ".ts", ".jsx", ".js"]

[resolve.alias]
# "@components" = "./src/components"

[module.loaders]
".svg" = "dataurl"
".png" = "file"

[mode.production.module.define]
"process.env.NODE_ENV" = "\"production\""

[mode.development.module.define]
"process.env.NODE_ENV" = "\"development\""
"#;

const DEFAULT_DECORATOR: &str = r#"// Loaded before every story module.
export const decorators = [];
"#;

const DEFAULT_STORY: &str = r#"import React from 'react';

export default function Primary() {
  return <button type="button">Primary</button>;
}

export const Disabled = () => <button type="button" disabled>Disabled</button>;
"#;
