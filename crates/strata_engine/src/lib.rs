//! # Strata Engine
//!
//! A small layered real-time framework. An [`Application`] drives an ordered
//! list of [`Layer`]s through their lifecycle; the [`RenderLayer`] owns a
//! window and a Vulkan pipeline and draws one triangle per frame from a
//! multi-stage shader schematic.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata_engine::prelude::*;
//!
//! fn main() -> Result<(), AppError> {
//!     let config = AppConfig::load_or_default("config/app.toml")?;
//!     let mut app = Application::from_config(&config)?;
//!     let close = app.close_handle();
//!     app.add_layer(Box::new(RenderLayer::new(&config, close)))?;
//!
//!     app.initialize()?;
//!     app.run()?;
//!     app.shutdown()
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod shader;

mod application;
mod layer;

pub use application::{AppError, AppState, Application, CloseHandle};
pub use layer::{Layer, LayerError, LayerId, LayerPhase, LayerResult};
pub use render::{RenderError, RenderLayer};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{AppConfig, Config},
        foundation::time::Clock,
        AppError, Application, CloseHandle, Layer, LayerError, LayerId, LayerResult, RenderLayer,
    };
}
