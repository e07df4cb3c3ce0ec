//! Layer trait and lifecycle hooks
//!
//! A layer is a unit of work driven by the [`Application`](crate::Application).
//! Every hook has a no-op default, so a layer only overrides the phases it
//! takes part in.

use std::fmt;
use thiserror::Error;

/// Identifier of a layer, unique within one running application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u32);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Lifecycle phase a hook belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerPhase {
    /// First one-time setup pass
    Initialize,
    /// Second one-time setup pass, after every layer initialized
    PostInitialize,
    /// Start pass
    Start,
    /// Per-frame update
    Update,
    /// Teardown
    PostClose,
}

impl fmt::Display for LayerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialize => "initialize",
            Self::PostInitialize => "post_initialize",
            Self::Start => "start",
            Self::Update => "update",
            Self::PostClose => "post_close",
        };
        f.write_str(name)
    }
}

/// Error returned by a layer hook that could not complete its contract
#[derive(Error, Debug)]
pub enum LayerError {
    /// Render layer failure
    #[error(transparent)]
    Render(#[from] crate::render::RenderError),

    /// Any other failure
    #[error("{0}")]
    Custom(String),
}

/// Result type for layer hooks
pub type LayerResult = Result<(), LayerError>;

/// Layer lifecycle trait
///
/// The application calls the hooks in this order: `initialize` on every
/// layer, then `post_initialize` on every layer, then `start`, then `update`
/// once per frame until closed, then `post_close`.
pub trait Layer {
    /// Identifier of this layer
    fn id(&self) -> LayerId;

    /// Human readable layer name for diagnostics
    fn name(&self) -> &str {
        "layer"
    }

    /// Phase-one setup
    fn initialize(&mut self) -> LayerResult {
        Ok(())
    }

    /// Phase-two setup; every layer has completed `initialize` at this point
    fn post_initialize(&mut self) -> LayerResult {
        Ok(())
    }

    /// Called once when the application starts
    ///
    /// # Arguments
    /// * `start_time` - Seconds since the application was created
    fn start(&mut self, _start_time: f64) -> LayerResult {
        Ok(())
    }

    /// Called every frame
    ///
    /// # Arguments
    /// * `delta_time` - Seconds between this frame's start and the previous one
    fn update(&mut self, _delta_time: f64) -> LayerResult {
        Ok(())
    }

    /// Release everything the layer acquired
    fn post_close(&mut self) -> LayerResult {
        Ok(())
    }
}
