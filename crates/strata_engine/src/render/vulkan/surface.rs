//! Window surface and swapchain support queries

use ash::extensions::khr;
use ash::vk;

use super::context::{VulkanError, VulkanInstance, VulkanResult};
use super::window::Window;

/// Vulkan surface wrapper for presentation
pub struct Surface {
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// Create the surface for `window`
    pub fn new(instance: &VulkanInstance, window: &Window) -> VulkanResult<Self> {
        let surface_loader = khr::Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {}", e)))?;

        Ok(Self {
            surface_loader,
            surface,
        })
    }

    /// Get the underlying surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Whether queue family `index` of `device` can present to this surface
    pub fn supports_present(&self, device: vk::PhysicalDevice, index: u32) -> bool {
        match unsafe {
            self.surface_loader
                .get_physical_device_surface_support(device, index, self.surface)
        } {
            Ok(supported) => supported,
            Err(e) => {
                log::warn!("Present support query failed for queue family {}: {:?}", index, e);
                false
            }
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Swapchain capabilities of a device for a surface
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    /// Surface capabilities
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// Query support of `device` for `surface`
    pub fn query(surface: &Surface, device: vk::PhysicalDevice) -> VulkanResult<Self> {
        let loader = &surface.surface_loader;
        unsafe {
            let capabilities = loader
                .get_physical_device_surface_capabilities(device, surface.surface)
                .map_err(VulkanError::Api)?;
            let formats = loader
                .get_physical_device_surface_formats(device, surface.surface)
                .map_err(VulkanError::Api)?;
            let present_modes = loader
                .get_physical_device_surface_present_modes(device, surface.surface)
                .map_err(VulkanError::Api)?;

            Ok(Self {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// At least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}
