//! The render layer's Vulkan resources
//!
//! [`GraphicsSession::new`] acquires everything in dependency order. Fields
//! are declared in the reverse of that order, so dropping the session (or a
//! partially built one while an error unwinds) releases each resource before
//! the ones it was created from.

use ash::vk;

use super::commands::{CommandPool, CommandRecorder};
use super::context::{LogicalDevice, PhysicalDeviceInfo, VulkanError, VulkanInstance};
use super::framebuffer::Framebuffer;
use super::pipeline::GraphicsPipeline;
use super::render_pass::RenderPass;
use super::surface::{Surface, SwapchainSupport};
use super::swapchain::Swapchain;
use super::sync::FrameSync;
use super::window::Window;
use crate::config::{RendererConfig, WindowConfig};
use crate::render::frame::FrameTarget;
use crate::render::{RenderError, RenderResult};
use crate::shader::{compile_schematic, SchematicTags, ShaderCompiler, ShaderSchematic};

/// Opaque black
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Window, device and pipeline objects for drawing one triangle per frame
pub struct GraphicsSession {
    sync: FrameSync,
    command_buffer: vk::CommandBuffer,
    // Owned for drop order only
    _command_pool: CommandPool,
    framebuffers: Vec<Framebuffer>,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: LogicalDevice,
    physical_device: PhysicalDeviceInfo,
    _surface: Surface,
    instance: VulkanInstance,
    window: Window,
}

impl GraphicsSession {
    /// Run the full initialization sequence
    pub fn new(
        renderer: &RendererConfig,
        window_config: &WindowConfig,
        compiler: &dyn ShaderCompiler,
    ) -> RenderResult<Self> {
        log::info!("Initializing Vulkan renderer...");

        let window = Window::new(window_config)?;

        let instance = VulkanInstance::new(&window, renderer)?;
        log::trace!("Vulkan instance created");

        let surface = Surface::new(&instance, &window)?;
        log::trace!("Window surface created");

        let physical_device = PhysicalDeviceInfo::select(&instance.instance, &surface)?;

        let device = LogicalDevice::new(&instance.instance, &physical_device)?;
        log::trace!(
            "Logical device created (graphics family {}, present family {})",
            device.queue_families.graphics,
            device.queue_families.present
        );

        let support = SwapchainSupport::query(&surface, physical_device.device)?;
        if !support.is_adequate() {
            return Err(RenderError::InadequateSwapchain(format!(
                "{} format(s), {} present mode(s)",
                support.formats.len(),
                support.present_modes.len()
            )));
        }

        let swapchain = Swapchain::new(
            &instance.instance,
            device.device.clone(),
            &surface,
            &support,
            &device.queue_families,
            window.framebuffer_size(),
        )?;
        log::trace!("Swapchain created with {} image views", swapchain.image_views().len());

        let render_pass = RenderPass::new_color_pass(device.device.clone(), swapchain.format().format)?;
        log::trace!("Render pass created");

        let shaders = &renderer.shaders;
        let schematic = ShaderSchematic::parse_file(
            &shaders.schematic_path,
            &SchematicTags::default(),
            shaders.skip_annotation_line,
        )?;
        let artifacts = compile_schematic(&schematic, &shaders.output_dir, compiler)?;
        let pipeline = GraphicsPipeline::from_artifacts(device.device.clone(), render_pass.handle(), &artifacts)?;

        let framebuffers = Framebuffer::for_image_views(
            &device.device,
            render_pass.handle(),
            swapchain.image_views(),
            swapchain.extent(),
        )?;
        log::trace!("{} framebuffers created", framebuffers.len());

        let command_pool = CommandPool::new(device.device.clone(), device.queue_families.graphics)?;
        let command_buffer = command_pool.allocate_primary()?;

        let sync = FrameSync::new(&device.device)?;

        log::info!("Vulkan renderer initialized on {}", physical_device.name);

        Ok(Self {
            sync,
            command_buffer,
            _command_pool: command_pool,
            framebuffers,
            pipeline,
            render_pass,
            swapchain,
            device,
            physical_device,
            _surface: surface,
            instance,
            window,
        })
    }

    /// Name of the selected GPU
    pub fn device_name(&self) -> &str {
        &self.physical_device.name
    }

    /// Whether the instance carries a debug messenger
    pub fn validation_active(&self) -> bool {
        self.instance.has_debug_messenger()
    }
}

impl FrameTarget for GraphicsSession {
    fn close_requested(&self) -> bool {
        self.window.should_close()
    }

    fn wait_idle(&mut self) -> RenderResult<()> {
        Ok(self.device.wait_idle()?)
    }

    fn poll_events(&mut self) {
        self.window.poll_events();
    }

    fn wait_for_in_flight(&mut self) -> RenderResult<()> {
        Ok(self.sync.in_flight.wait()?)
    }

    fn reset_in_flight(&mut self) -> RenderResult<()> {
        Ok(self.sync.in_flight.reset()?)
    }

    fn acquire_next_image(&mut self) -> RenderResult<u32> {
        Ok(self
            .swapchain
            .acquire_next_image(self.sync.image_available.handle())?)
    }

    fn record_commands(&mut self, image_index: u32) -> RenderResult<()> {
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("No framebuffer for swapchain image {}", image_index),
            })?;
        let extent = self.swapchain.extent();
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: CLEAR_COLOR },
        }];

        let mut recorder = CommandRecorder::new(self.device.device.clone(), self.command_buffer);
        recorder.begin()?;
        {
            let mut pass = recorder.begin_render_pass(
                self.render_pass.handle(),
                framebuffer.handle(),
                render_area,
                &clear_values,
            )?;
            pass.bind_graphics_pipeline(self.pipeline.handle());
            pass.set_viewport(vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            });
            pass.set_scissor(render_area);
            pass.draw(3, 1, 0, 0);
        }
        recorder.end()?;
        Ok(())
    }

    fn submit(&mut self) -> RenderResult<()> {
        let wait_semaphores = [self.sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer];
        let signal_semaphores = [self.sync.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info],
                self.sync.in_flight.handle(),
            )
        }
        .map_err(VulkanError::Api)?;
        Ok(())
    }

    fn present(&mut self, image_index: u32) -> RenderResult<()> {
        Ok(self.swapchain.present(
            self.device.present_queue,
            image_index,
            self.sync.render_finished.handle(),
        )?)
    }
}

impl Drop for GraphicsSession {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle during teardown: {}", e);
        }
        log::info!("Releasing Vulkan resources");
    }
}
