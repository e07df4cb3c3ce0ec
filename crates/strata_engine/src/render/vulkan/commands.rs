//! Command pool and command buffer recording

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool =
            unsafe { device.create_command_pool(&create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { device, command_pool })
    }

    /// Allocate one primary command buffer, freed with the pool
    pub fn allocate_primary(&self) -> VulkanResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(VulkanError::Api)?
            .pop()
            .ok_or_else(|| VulkanError::InitializationFailed("No command buffer allocated".to_string()))
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Records into a command buffer that is reset every frame
pub struct CommandRecorder {
    device: Device,
    command_buffer: vk::CommandBuffer,
    recording: bool,
}

impl CommandRecorder {
    /// Wrap `command_buffer` for recording
    pub fn new(device: Device, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            command_buffer,
            recording: false,
        }
    }

    /// Reset the buffer and begin recording
    pub fn begin(&mut self) -> VulkanResult<()> {
        if self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string(),
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        self.recording = true;
        Ok(())
    }

    /// Begin a render pass; it ends when the returned guard is dropped
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> VulkanResult<ActiveRenderPass<'_>> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            });
        }

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &begin_info, vk::SubpassContents::INLINE);
        }

        Ok(ActiveRenderPass { recorder: self })
    }

    /// Finish recording
    pub fn end(mut self) -> VulkanResult<vk::CommandBuffer> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            });
        }

        unsafe { self.device.end_command_buffer(self.command_buffer) }.map_err(VulkanError::Api)?;
        self.recording = false;
        Ok(self.command_buffer)
    }
}

/// Render pass scope; dropping it records the end of the pass
pub struct ActiveRenderPass<'a> {
    recorder: &'a mut CommandRecorder,
}

impl ActiveRenderPass<'_> {
    /// Set the viewport
    pub fn set_viewport(&mut self, viewport: vk::Viewport) {
        unsafe {
            self.recorder
                .device
                .cmd_set_viewport(self.recorder.command_buffer, 0, &[viewport]);
        }
    }

    /// Set the scissor rectangle
    pub fn set_scissor(&mut self, scissor: vk::Rect2D) {
        unsafe {
            self.recorder
                .device
                .cmd_set_scissor(self.recorder.command_buffer, 0, &[scissor]);
        }
    }

    /// Bind a graphics pipeline
    pub fn bind_graphics_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.recorder.device.cmd_bind_pipeline(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Non-indexed draw
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.recorder.device.cmd_draw(
                self.recorder.command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }
}

impl Drop for ActiveRenderPass<'_> {
    fn drop(&mut self) {
        unsafe {
            self.recorder
                .device
                .cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}
