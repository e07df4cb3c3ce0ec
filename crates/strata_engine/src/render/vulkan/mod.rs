//! Vulkan backend
//!
//! RAII wrappers over the Vulkan objects the render layer needs. Each wrapper
//! holds a clone of the device (or instance) handle and destroys its object
//! in `Drop`, so owning them in reverse acquisition order is all the teardown
//! there is.

pub mod commands;
pub mod context;
pub mod framebuffer;
pub mod pipeline;
pub mod render_pass;
pub mod session;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod window;

pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder};
pub use context::{
    DeviceCandidate, LogicalDevice, PhysicalDeviceInfo, QueueFamilyIndices, QueueFamilySelection,
    VulkanError, VulkanInstance, VulkanResult,
};
pub use framebuffer::Framebuffer;
pub use pipeline::{GraphicsPipeline, ShaderModule};
pub use render_pass::RenderPass;
pub use session::GraphicsSession;
pub use surface::{Surface, SwapchainSupport};
pub use swapchain::Swapchain;
pub use sync::{Fence, FrameSync, Semaphore};
pub use window::{Window, WindowError, WindowResult};
