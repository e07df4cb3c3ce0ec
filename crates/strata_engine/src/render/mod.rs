//! Rendering
//!
//! [`RenderLayer`] is the layer that owns the window and the Vulkan
//! [`GraphicsSession`](vulkan::GraphicsSession). Its `initialize` hook runs
//! the whole device and pipeline setup, `update` draws one frame through
//! [`frame::drive_frame`], and `post_close` releases the session.

pub mod frame;
pub mod vulkan;

pub use frame::{drive_frame, FrameOutcome, FrameTarget};

use thiserror::Error;

use crate::application::CloseHandle;
use crate::config::{AppConfig, RendererConfig, WindowConfig};
use crate::layer::{Layer, LayerId, LayerResult};
use crate::shader::{ShaderError, ShadercCompiler};
use vulkan::{GraphicsSession, VulkanError, WindowError};

/// Errors of the render layer, named after the setup step that failed
#[derive(Error, Debug)]
pub enum RenderError {
    /// Validation was requested but some layers are not installed
    #[error("Requested validation layers are not available: {0:?}")]
    MissingValidationLayers(Vec<String>),

    /// Vulkan reports no physical device at all
    #[error("No Vulkan capable physical device found")]
    NoPhysicalDevice,

    /// Every physical device was rejected by selection
    #[error("No suitable physical device found")]
    NoSuitableDevice,

    /// The selected device lacks a required queue family
    #[error("Selected device has no {0} queue family")]
    MissingQueueFamily(&'static str),

    /// The selected device lacks a required extension
    #[error("Device extension not supported: {0}")]
    MissingDeviceExtension(String),

    /// The surface offers no format or no present mode
    #[error("Inadequate swapchain support: {0}")]
    InadequateSwapchain(String),

    /// A frame was requested before the session was created
    #[error("Render layer is not initialized")]
    NotInitialized,

    /// Vulkan call failure
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// Window failure
    #[error(transparent)]
    Window(#[from] WindowError),

    /// Shader pipeline failure
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

/// Result type for render operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Layer drawing a triangle into a native window every frame
pub struct RenderLayer {
    id: LayerId,
    renderer: RendererConfig,
    window: WindowConfig,
    close: CloseHandle,
    session: Option<GraphicsSession>,
}

impl RenderLayer {
    /// Identifier used unless [`with_id`](Self::with_id) overrides it
    pub const DEFAULT_ID: LayerId = LayerId(0);

    /// Create the layer; nothing is acquired until `initialize`
    pub fn new(config: &AppConfig, close: CloseHandle) -> Self {
        Self {
            id: Self::DEFAULT_ID,
            renderer: config.renderer.clone(),
            window: config.window.clone(),
            close,
            session: None,
        }
    }

    /// Use a different layer id
    pub fn with_id(mut self, id: LayerId) -> Self {
        self.id = id;
        self
    }

    /// Whether the graphics session is alive
    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}

impl Layer for RenderLayer {
    fn id(&self) -> LayerId {
        self.id
    }

    fn name(&self) -> &str {
        "render"
    }

    fn initialize(&mut self) -> LayerResult {
        let compiler = ShadercCompiler::new().map_err(RenderError::from)?;
        let session = GraphicsSession::new(&self.renderer, &self.window, &compiler)?;
        log::info!(
            "Render layer ready on {} (validation {})",
            session.device_name(),
            if session.validation_active() { "on" } else { "off" }
        );
        self.session = Some(session);
        Ok(())
    }

    fn update(&mut self, _delta_time: f64) -> LayerResult {
        let session = self.session.as_mut().ok_or(RenderError::NotInitialized)?;
        drive_frame(session, &self.close)?;
        Ok(())
    }

    fn post_close(&mut self) -> LayerResult {
        if let Some(session) = self.session.take() {
            log::trace!("Releasing graphics session");
            drop(session);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Application;
    use crate::layer::LayerError;

    fn layer() -> RenderLayer {
        let app = Application::new("test");
        RenderLayer::new(&AppConfig::default(), app.close_handle())
    }

    #[test]
    fn test_layer_id_defaults_and_overrides() {
        assert_eq!(layer().id(), RenderLayer::DEFAULT_ID);
        assert_eq!(layer().with_id(LayerId(7)).id(), LayerId(7));
    }

    #[test]
    fn test_update_before_initialize_is_rejected() {
        let mut layer = layer();
        assert!(!layer.is_initialized());

        let result = layer.update(0.016);

        assert!(matches!(
            result,
            Err(LayerError::Render(RenderError::NotInitialized))
        ));
    }

    #[test]
    fn test_post_close_without_session_is_noop() {
        let mut layer = layer();
        layer.post_close().unwrap();
        layer.post_close().unwrap();
        assert!(!layer.is_initialized());
    }
}
