//! Live preview server for vitrine.
//!
//! Keeps the story artifact set up to date in watch mode and serves the
//! latest finished compile over a local HTTP API.

pub mod api;
pub mod session;
pub mod state;
pub mod viewer;

pub use api::{build_router, ApiState};
pub use session::{PreviewConfig, PreviewServer, ServerError, SetupFailure};
pub use state::{InvalidTransition, PreviewMachine, PreviewStatus, ServerState, Snapshot};
pub use viewer::Viewer;
