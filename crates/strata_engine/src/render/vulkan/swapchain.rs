//! Swapchain negotiation and creation
//!
//! The `choose_*` functions hold the negotiation rules; [`Swapchain::new`]
//! applies them to the queried [`SwapchainSupport`].

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Instance};

use super::context::{QueueFamilyIndices, VulkanError, VulkanResult};
use super::surface::{Surface, SwapchainSupport};
use crate::render::{RenderError, RenderResult};

/// Prefer 8-bit BGRA sRGB with the sRGB non-linear color space, else the first format
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Mailbox when available, FIFO otherwise
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Current extent when the surface defines one, else the framebuffer size clamped to the limits
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer_size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = framebuffer_size;
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by a non-zero maximum
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Concurrent sharing across both families when they differ
pub fn choose_sharing(queue_families: &QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    if queue_families.graphics == queue_families.present {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![queue_families.graphics, queue_families.present],
        )
    }
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create the swapchain and one image view per image
    pub fn new(
        instance: &Instance,
        device: Device,
        surface: &Surface,
        support: &SwapchainSupport,
        queue_families: &QueueFamilyIndices,
        framebuffer_size: (u32, u32),
    ) -> RenderResult<Self> {
        let format = choose_surface_format(&support.formats)
            .ok_or_else(|| RenderError::InadequateSwapchain("no surface formats".to_string()))?;
        if support.present_modes.is_empty() {
            return Err(RenderError::InadequateSwapchain("no present modes".to_string()));
        }
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, framebuffer_size);
        let image_count = choose_image_count(&support.capabilities);
        let (sharing_mode, family_indices) = choose_sharing(queue_families);

        log::trace!(
            "Swapchain: {:?}/{:?}, {:?}, {}x{}, {} images, {:?}",
            format.format,
            format.color_space,
            present_mode,
            extent.width,
            extent.height,
            image_count,
            sharing_mode
        );

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain_loader = SwapchainLoader::new(instance, &device);
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(VulkanError::Api)?;

        let mut result = Self {
            device,
            swapchain_loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format,
            extent,
        };

        result.images = unsafe { result.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(VulkanError::Api)?;
        // Views are pushed one by one so Drop releases those created before a failure.
        for index in 0..result.images.len() {
            let view = result.create_image_view(result.images[index])?;
            result.image_views.push(view);
        }

        Ok(result)
    }

    fn create_image_view(&self, image: vk::Image) -> VulkanResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe { self.device.create_image_view(&create_info, None) }.map_err(VulkanError::Api)
    }

    /// Acquire the next image, signaling `image_available` when it is ready
    pub fn acquire_next_image(&self, image_available: vk::Semaphore) -> VulkanResult<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        }
        .map_err(VulkanError::Api)?;

        if suboptimal {
            log::warn!("Swapchain is suboptimal for the surface");
        }
        Ok(index)
    }

    /// Queue `image_index` for presentation once `render_finished` is signaled
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        render_finished: vk::Semaphore,
    ) -> VulkanResult<()> {
        let wait_semaphores = [render_finished];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
            .map_err(VulkanError::Api)?;
        if suboptimal {
            log::warn!("Presented to a suboptimal swapchain");
        }
        Ok(())
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            ..Default::default()
        }
    }

    #[test]
    fn test_preferred_format_is_found_anywhere() {
        let preferred = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            preferred,
        ];
        assert_eq!(choose_surface_format(&formats), Some(preferred));
    }

    #[test]
    fn test_first_format_without_preferred() {
        let first = format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let formats = [first, format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_eq!(choose_surface_format(&formats), Some(first));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn test_present_mode_prefers_mailbox() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_defined_extent_is_used_unchanged() {
        let caps = capabilities((1024, 768), (1, 1), (4096, 4096));
        assert_eq!(choose_extent(&caps, (800, 600)), vk::Extent2D { width: 1024, height: 768 });
    }

    #[test]
    fn test_undefined_extent_clamps_framebuffer_size() {
        let caps = capabilities((u32::MAX, u32::MAX), (200, 100), (1920, 1080));
        assert_eq!(choose_extent(&caps, (800, 600)), vk::Extent2D { width: 800, height: 600 });
        assert_eq!(choose_extent(&caps, (4000, 50)), vk::Extent2D { width: 1920, height: 100 });
    }

    #[test]
    fn test_image_count_is_capped_by_nonzero_max() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);

        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_sharing_is_concurrent_only_for_distinct_families() {
        let shared = QueueFamilyIndices { graphics: 0, present: 0 };
        assert_eq!(choose_sharing(&shared), (vk::SharingMode::EXCLUSIVE, Vec::new()));

        let split = QueueFamilyIndices { graphics: 0, present: 2 };
        assert_eq!(choose_sharing(&split), (vk::SharingMode::CONCURRENT, vec![0, 2]));
    }
}
