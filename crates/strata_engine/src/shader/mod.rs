//! Shader pipeline
//!
//! Multi-stage GLSL sources are bundled in a single schematic file. The
//! [`schematic`] parser splits it into per-stage sections and the
//! [`compiler`] bridge turns each section into a SPIR-V binary on disk that
//! the graphics pipeline loads back.

pub mod compiler;
pub mod schematic;

pub use compiler::{
    artifact_path, compile_schematic, CompileDiagnostics, CompiledModule, ShaderArtifact,
    ShaderCompiler, ShadercCompiler,
};
pub use schematic::{SchematicTags, ShaderSchematic, ShaderSection};

use ash::vk;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Programmable pipeline stage a shader section targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
    /// Compute shader
    Compute,
    /// Geometry shader
    Geometry,
    /// Tessellation control shader
    TessControl,
    /// Tessellation evaluation shader
    TessEvaluation,
}

impl ShaderStage {
    /// File extension of the compiled binary for this stage
    pub fn extension(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
            Self::Compute => "comp",
            Self::Geometry => "geom",
            Self::TessControl => "tessc",
            Self::TessEvaluation => "tesse",
        }
    }

    /// Vulkan stage flag for pipeline stage creation
    pub fn vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
            Self::Compute => vk::ShaderStageFlags::COMPUTE,
            Self::Geometry => vk::ShaderStageFlags::GEOMETRY,
            Self::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            Self::TessEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        }
    }

    /// Stage kind understood by shaderc
    pub fn shaderc_kind(self) -> shaderc::ShaderKind {
        match self {
            Self::Vertex => shaderc::ShaderKind::Vertex,
            Self::Fragment => shaderc::ShaderKind::Fragment,
            Self::Compute => shaderc::ShaderKind::Compute,
            Self::Geometry => shaderc::ShaderKind::Geometry,
            Self::TessControl => shaderc::ShaderKind::TessControl,
            Self::TessEvaluation => shaderc::ShaderKind::TessEvaluation,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
            Self::Geometry => "geometry",
            Self::TessControl => "tessellation control",
            Self::TessEvaluation => "tessellation evaluation",
        };
        f.write_str(name)
    }
}

/// Shader pipeline errors
#[derive(Error, Debug)]
pub enum ShaderError {
    /// A schematic or compiled binary could not be read or written
    #[error("Shader I/O error on {path:?}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// A stage the pipeline requires produced no binary
    #[error("No compiled {0} shader available")]
    MissingStage(ShaderStage),

    /// The shader compiler could not be created
    #[error("Shader compiler unavailable")]
    CompilerUnavailable,
}

impl ShaderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
