//! Vulkan instance, device selection and logical device
//!
//! The selection rules themselves ([`rate_device_suitability`],
//! [`select_best_device`], [`find_queue_families`]) work on plain data so
//! they can be exercised without a GPU.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Entry, Instance};
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use thiserror::Error;

use super::surface::{Surface, SwapchainSupport};
use super::window::Window;
use crate::config::RendererConfig;
use crate::render::{RenderError, RenderResult};

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

fn c_string(value: &str) -> VulkanResult<CString> {
    CString::new(value)
        .map_err(|e| VulkanError::InitializationFailed(format!("Invalid name {:?}: {}", value, e)))
}

fn fixed_c_str(raw: &[c_char]) -> String {
    // Vulkan fixed-size name arrays are always NUL terminated.
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Requested layers absent from `available`, in request order
pub fn missing_layers(requested: &[String], available: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|layer| !available.contains(layer))
        .cloned()
        .collect()
}

/// Required extensions absent from `available`
pub fn missing_extensions(available: &[vk::ExtensionProperties], required: &[&CStr]) -> Vec<String> {
    required
        .iter()
        .filter(|required| {
            !available
                .iter()
                .any(|ext| fixed_c_str(&ext.extension_name).as_bytes() == required.to_bytes())
        })
        .map(|required| required.to_string_lossy().into_owned())
        .collect()
}

fn debug_messenger_info(verbose: bool) -> vk::DebugUtilsMessengerCreateInfoEXT {
    let mut severity =
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    if verbose {
        severity |=
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE | vk::DebugUtilsMessageSeverityFlagsEXT::INFO;
    }

    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(severity)
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();
    log::error!("[Vulkan {:?}] {:?} - {}", message_severity, message_type, message);

    vk::FALSE
}

struct DebugMessenger {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug: Option<DebugMessenger>,
}

impl VulkanInstance {
    /// Create the instance, with validation and a debug messenger when enabled
    pub fn new(window: &Window, config: &RendererConfig) -> RenderResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

        let validation = config.validation_enabled();
        if validation {
            let available: Vec<String> = unsafe { entry.enumerate_instance_layer_properties() }
                .map_err(VulkanError::Api)?
                .iter()
                .map(|layer| fixed_c_str(&layer.layer_name))
                .collect();
            let missing = missing_layers(&config.validation_layers, &available);
            if !missing.is_empty() {
                return Err(RenderError::MissingValidationLayers(missing));
            }
        }

        let app_name = c_string(&config.application_name)?;
        let engine_name = c_string("Strata")?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extension_names = window
            .required_instance_extensions()?
            .iter()
            .map(|name| c_string(name))
            .collect::<VulkanResult<Vec<_>>>()?;
        if validation {
            extension_names.push(DebugUtils::name().to_owned());
        }
        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|name| name.as_ptr()).collect();

        let layer_names = if validation {
            config
                .validation_layers
                .iter()
                .map(|name| c_string(name))
                .collect::<VulkanResult<Vec<_>>>()?
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        // Chained into instance creation so vkCreateInstance and
        // vkDestroyInstance are covered as well.
        let mut debug_info = debug_messenger_info(config.verbose_validation);

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);
        if validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        log::trace!("Creating Vulkan instance (validation: {})", validation);
        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(VulkanError::Api)?;

        let mut vulkan_instance = Self {
            entry,
            instance,
            debug: None,
        };

        if validation {
            let loader = DebugUtils::new(&vulkan_instance.entry, &vulkan_instance.instance);
            let messenger = unsafe { loader.create_debug_utils_messenger(&debug_info, None) }
                .map_err(VulkanError::Api)?;
            vulkan_instance.debug = Some(DebugMessenger { loader, messenger });
            log::trace!("Debug messenger installed");
        }

        Ok(vulkan_instance)
    }

    /// Whether a debug messenger is installed
    pub fn has_debug_messenger(&self) -> bool {
        self.debug.is_some()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug.loader.destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Data device selection is decided on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    /// Device name
    pub name: String,
    /// Discrete, integrated, virtual, ...
    pub device_type: vk::PhysicalDeviceType,
    /// Largest supported 2D image dimension
    pub max_image_dimension_2d: u32,
    /// Geometry shader feature
    pub geometry_shader: bool,
    /// Queue families, swapchain extension and swapchain support are all adequate
    pub suitable: bool,
}

/// Device score; `-1` means the device can never be selected
pub fn rate_device_suitability(candidate: &DeviceCandidate) -> i64 {
    if !candidate.geometry_shader || !candidate.suitable {
        return -1;
    }

    let mut score = 0;
    if candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += 1000;
    }
    score + i64::from(candidate.max_image_dimension_2d)
}

/// Index of the highest scoring candidate; the last one enumerated wins ties
///
/// Returns `None` when the best score is not positive.
pub fn select_best_device(candidates: &[DeviceCandidate]) -> Option<usize> {
    let mut best: Option<(usize, i64)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let score = rate_device_suitability(candidate);
        if best.map_or(true, |(_, best_score)| score >= best_score) {
            best = Some((index, score));
        }
    }
    best.filter(|(_, score)| *score > 0).map(|(index, _)| index)
}

/// Queue family scan result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilySelection {
    /// Family supporting graphics
    pub graphics: Option<u32>,
    /// Family supporting presentation to the surface
    pub present: Option<u32>,
}

impl QueueFamilySelection {
    /// Both families found
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Resolved indices, or the family that is missing
    pub fn resolve(self) -> RenderResult<QueueFamilyIndices> {
        let graphics = self.graphics.ok_or(RenderError::MissingQueueFamily("graphics"))?;
        let present = self.present.ok_or(RenderError::MissingQueueFamily("present"))?;
        Ok(QueueFamilyIndices { graphics, present })
    }
}

/// Scan queue families for graphics and present support
///
/// Each family found overrides the previous one until both are known; the
/// scan stops as soon as the selection is complete.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> QueueFamilySelection {
    let mut selection = QueueFamilySelection::default();

    for (index, family) in (0u32..).zip(families) {
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            selection.graphics = Some(index);
        }
        if supports_present(index) {
            selection.present = Some(index);
        }
        if selection.is_complete() {
            break;
        }
    }

    selection
}

/// Queue family indices of the selected device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Graphics family
    pub graphics: u32,
    /// Present family
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Distinct family indices, graphics first
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Selected physical device
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Device name
    pub name: String,
    /// Queue families used for rendering and presentation
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Rate every physical device and pick the best one
    pub fn select(instance: &Instance, surface: &Surface) -> RenderResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }.map_err(VulkanError::Api)?;
        if devices.is_empty() {
            return Err(RenderError::NoPhysicalDevice);
        }

        let mut candidates = Vec::with_capacity(devices.len());
        let mut scanned = Vec::with_capacity(devices.len());

        for device in devices {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            let features = unsafe { instance.get_physical_device_features(device) };
            let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

            let selection = find_queue_families(&families, |index| surface.supports_present(device, index));

            let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
                .map_err(VulkanError::Api)?;
            let has_extensions = missing_extensions(&extensions, &[SwapchainLoader::name()]).is_empty();
            let swapchain_adequate = has_extensions
                && SwapchainSupport::query(surface, device).map_or(false, |support| support.is_adequate());

            let candidate = DeviceCandidate {
                name: fixed_c_str(&properties.device_name),
                device_type: properties.device_type,
                max_image_dimension_2d: properties.limits.max_image_dimension2_d,
                geometry_shader: features.geometry_shader == vk::TRUE,
                suitable: selection.is_complete() && has_extensions && swapchain_adequate,
            };
            log::trace!(
                "GPU candidate {} ({:?}): score {}",
                candidate.name,
                candidate.device_type,
                rate_device_suitability(&candidate)
            );

            candidates.push(candidate);
            scanned.push((device, properties, selection));
        }

        let best = select_best_device(&candidates).ok_or(RenderError::NoSuitableDevice)?;
        let (device, properties, selection) = scanned
            .into_iter()
            .nth(best)
            .ok_or(RenderError::NoSuitableDevice)?;
        let queue_families = selection.resolve()?;
        let name = candidates.swap_remove(best).name;

        log::info!("Selected GPU: {}", name);

        Ok(Self {
            device,
            properties,
            name,
            queue_families,
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Queue family indices the queues come from
    pub queue_families: QueueFamilyIndices,
}

impl LogicalDevice {
    /// Create the device with one queue per unique family and the swapchain extension
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo) -> RenderResult<Self> {
        let available = unsafe { instance.enumerate_device_extension_properties(physical_device.device) }
            .map_err(VulkanError::Api)?;
        if let Some(missing) = missing_extensions(&available, &[SwapchainLoader::name()]).pop() {
            return Err(RenderError::MissingDeviceExtension(missing));
        }

        let queue_families = physical_device.queue_families;
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_ptrs = [SwapchainLoader::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device.device, &create_info, None) }
            .map_err(VulkanError::Api)?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            queue_families,
        })
    }

    /// Block until the device has no pending work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(VulkanError::Api)
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(device_type: vk::PhysicalDeviceType, dimension: u32) -> DeviceCandidate {
        DeviceCandidate {
            name: format!("{:?}-{}", device_type, dimension),
            device_type,
            max_image_dimension_2d: dimension,
            geometry_shader: true,
            suitable: true,
        }
    }

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut properties = vk::ExtensionProperties::default();
        for (dst, src) in properties.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = *src as c_char;
        }
        properties
    }

    #[test]
    fn test_discrete_gpu_outscores_integrated() {
        let discrete = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 4096);
        let integrated = candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, 4096);
        assert_eq!(rate_device_suitability(&discrete), 5096);
        assert!(rate_device_suitability(&discrete) > rate_device_suitability(&integrated));
    }

    #[test]
    fn test_score_increases_with_image_dimension() {
        let small = candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, 4096);
        let large = candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384);
        assert!(rate_device_suitability(&large) > rate_device_suitability(&small));
    }

    #[test]
    fn test_device_without_geometry_shader_never_wins() {
        let mut strong = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 32768);
        strong.geometry_shader = false;
        let weak = candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, 1024);

        assert_eq!(rate_device_suitability(&strong), -1);
        assert_eq!(select_best_device(&[strong.clone(), weak]), Some(1));
        assert_eq!(select_best_device(&[strong]), None);
    }

    #[test]
    fn test_unsuitable_device_is_excluded() {
        let mut missing_swapchain = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        missing_swapchain.suitable = false;
        assert_eq!(select_best_device(&[missing_swapchain]), None);
    }

    #[test]
    fn test_selection_picks_highest_and_last_on_ties() {
        let devices = [
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, 8192),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 8192),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 8192),
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384),
        ];
        assert_eq!(select_best_device(&devices), Some(2));
    }

    #[test]
    fn test_higher_score_after_tie_still_wins() {
        let devices = [
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 8192),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 8192),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 16384),
        ];
        assert_eq!(select_best_device(&devices), Some(2));
    }

    #[test]
    fn test_non_positive_best_score_fails() {
        let devices = [candidate(vk::PhysicalDeviceType::CPU, 0)];
        assert_eq!(select_best_device(&devices), None);
        assert_eq!(select_best_device(&[]), None);
    }

    #[test]
    fn test_queue_scan_stops_when_complete() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut queried = Vec::new();

        let selection = find_queue_families(&families, |index| {
            queried.push(index);
            true
        });

        assert_eq!(selection.resolve().unwrap(), QueueFamilyIndices { graphics: 0, present: 0 });
        assert_eq!(queried, vec![0]);
    }

    #[test]
    fn test_later_family_overrides_until_complete() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];

        let selection = find_queue_families(&families, |index| index == 1);

        assert_eq!(selection, QueueFamilySelection { graphics: Some(1), present: Some(1) });
    }

    #[test]
    fn test_separate_graphics_and_present_families() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];

        let indices = find_queue_families(&families, |index| index == 1).resolve().unwrap();

        assert_eq!(indices, QueueFamilyIndices { graphics: 0, present: 1 });
        assert_eq!(indices.unique(), vec![0, 1]);
    }

    #[test]
    fn test_missing_present_family() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let selection = find_queue_families(&families, |_| false);

        assert!(!selection.is_complete());
        assert!(matches!(selection.resolve(), Err(RenderError::MissingQueueFamily("present"))));
    }

    #[test]
    fn test_missing_layers_keeps_request_order() {
        let requested = vec!["VK_LAYER_A".to_string(), "VK_LAYER_B".to_string(), "VK_LAYER_C".to_string()];
        let available = vec!["VK_LAYER_B".to_string()];
        assert_eq!(missing_layers(&requested, &available), vec!["VK_LAYER_A", "VK_LAYER_C"]);
        assert!(missing_layers(&[], &available).is_empty());
    }

    #[test]
    fn test_missing_extensions() {
        let available = [extension(SwapchainLoader::name())];
        assert!(missing_extensions(&available, &[SwapchainLoader::name()]).is_empty());
        assert_eq!(
            missing_extensions(&[], &[SwapchainLoader::name()]),
            vec!["VK_KHR_swapchain".to_string()]
        );
    }
}
