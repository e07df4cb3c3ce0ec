//! Shader modules and the triangle graphics pipeline
//!
//! SPIR-V loading and graphics pipeline management following RAII patterns

use ash::{vk, Device};
use std::ffi::CString;
use std::fs::File;
use std::path::Path;

use super::context::{VulkanError, VulkanResult};
use crate::render::RenderResult;
use crate::shader::compiler::{ShaderArtifact, ENTRY_POINT};
use crate::shader::{ShaderError, ShaderStage};

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl ShaderModule {
    /// Create a shader module from SPIR-V words
    pub fn from_words(device: Device, stage: ShaderStage, words: &[u32]) -> VulkanResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);
        let module =
            unsafe { device.create_shader_module(&create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { device, module, stage })
    }

    /// Load a compiled SPIR-V file
    pub fn from_file(device: Device, stage: ShaderStage, path: &Path) -> RenderResult<Self> {
        let mut file = File::open(path).map_err(|e| ShaderError::io(path, e))?;
        let words = ash::util::read_spv(&mut file).map_err(|e| ShaderError::io(path, e))?;
        log::trace!("Loaded {} shader from {:?} ({} words)", stage, path, words.len());
        Ok(Self::from_words(device, stage, &words)?)
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage the module implements
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Build the pipeline from the vertex and fragment binaries among `artifacts`
    ///
    /// The shader modules only live for the duration of this call.
    pub fn from_artifacts(
        device: Device,
        render_pass: vk::RenderPass,
        artifacts: &[ShaderArtifact],
    ) -> RenderResult<Self> {
        let load = |stage: ShaderStage| -> RenderResult<ShaderModule> {
            let artifact = artifacts
                .iter()
                .find(|artifact| artifact.stage == stage)
                .ok_or(ShaderError::MissingStage(stage))?;
            ShaderModule::from_file(device.clone(), stage, &artifact.path)
        };

        let vertex = load(ShaderStage::Vertex)?;
        let fragment = load(ShaderStage::Fragment)?;
        Ok(Self::new(device.clone(), render_pass, &vertex, &fragment)?)
    }

    /// Create the pipeline: no vertex input, dynamic viewport and scissor, no depth
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
    ) -> VulkanResult<Self> {
        let entry_point = CString::new(ENTRY_POINT)
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        let shader_stages = [vertex_shader, fragment_shader].map(|module| {
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(module.stage().vk_stage())
                .module(module.handle())
                .name(&entry_point)
                .build()
        });

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout =
            unsafe { device.create_pipeline_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines.into_iter().next(),
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::Api(err));
            }
        };
        let Some(pipeline) = pipeline else {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            return Err(VulkanError::InitializationFailed("No pipeline returned".to_string()));
        };

        log::trace!("Graphics pipeline created");
        Ok(Self {
            device,
            pipeline,
            layout,
        })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
