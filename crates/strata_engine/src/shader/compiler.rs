//! GLSL to SPIR-V compilation
//!
//! Each schematic section is compiled on its own. A section that fails to
//! compile is logged and skipped so its siblings still produce binaries; the
//! pipeline fails later if a stage it needs is missing.

use std::path::{Path, PathBuf};

use super::schematic::ShaderSchematic;
use super::{ShaderError, ShaderStage};

/// Entry point every stage is compiled against
pub const ENTRY_POINT: &str = "main";

/// Successful compilation of one section
#[derive(Debug, Clone)]
pub struct CompiledModule {
    /// SPIR-V binary
    pub spirv: Vec<u8>,
    /// Number of warnings reported
    pub warnings: u32,
    /// Warning text, empty when there were none
    pub warning_text: String,
}

/// Failed compilation of one section
#[derive(Debug, Clone)]
pub struct CompileDiagnostics {
    /// Number of errors reported
    pub errors: u32,
    /// Number of warnings reported
    pub warnings: u32,
    /// Diagnostic text
    pub message: String,
}

/// Binary written for one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderArtifact {
    /// Stage the binary implements
    pub stage: ShaderStage,
    /// Location of the binary
    pub path: PathBuf,
}

/// GLSL compiler seam
pub trait ShaderCompiler {
    /// Compile `source` for `stage`; `file_name` is used in diagnostics only
    fn compile(
        &self,
        stage: ShaderStage,
        source: &str,
        file_name: &str,
    ) -> Result<CompiledModule, CompileDiagnostics>;
}

/// Compiler backed by shaderc
pub struct ShadercCompiler {
    compiler: shaderc::Compiler,
}

impl ShadercCompiler {
    /// Create the compiler
    pub fn new() -> Result<Self, ShaderError> {
        let compiler = shaderc::Compiler::new().ok_or(ShaderError::CompilerUnavailable)?;
        Ok(Self { compiler })
    }
}

impl ShaderCompiler for ShadercCompiler {
    fn compile(
        &self,
        stage: ShaderStage,
        source: &str,
        file_name: &str,
    ) -> Result<CompiledModule, CompileDiagnostics> {
        let mut options = shaderc::CompileOptions::new().ok_or_else(|| CompileDiagnostics {
            errors: 1,
            warnings: 0,
            message: "Failed to create shaderc compile options".to_string(),
        })?;
        options.set_target_env(shaderc::TargetEnv::Vulkan, shaderc::EnvVersion::Vulkan1_0 as u32);

        match self.compiler.compile_into_spirv(
            source,
            stage.shaderc_kind(),
            file_name,
            ENTRY_POINT,
            Some(&options),
        ) {
            Ok(artifact) => Ok(CompiledModule {
                spirv: artifact.as_binary_u8().to_vec(),
                warnings: artifact.get_num_warnings(),
                warning_text: artifact.get_warning_messages(),
            }),
            Err(shaderc::Error::CompilationError(errors, message)) => Err(CompileDiagnostics {
                errors,
                warnings: count_warnings(&message),
                message,
            }),
            Err(other) => Err(CompileDiagnostics {
                errors: 1,
                warnings: 0,
                message: other.to_string(),
            }),
        }
    }
}

/// Warnings listed in a failed compilation's diagnostic text
///
/// shaderc only reports the error count for failed results; glslang prints
/// one `<file>:<line>: warning:` line per warning.
fn count_warnings(message: &str) -> u32 {
    let count = message
        .lines()
        .filter(|line| line.contains(": warning:"))
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Output location for `stage` compiled from the schematic at `source`
pub fn artifact_path(output_dir: &Path, source: &Path, stage: ShaderStage) -> PathBuf {
    let stem = source
        .file_stem()
        .map_or_else(|| "shader".into(), |stem| stem.to_string_lossy());
    output_dir.join(format!("{}.{}", stem, stage.extension()))
}

/// Compile every section of `schematic` and write the binaries to `output_dir`
///
/// Returns the artifacts written, in section order. Sections that fail to
/// compile are absent from the result.
pub fn compile_schematic(
    schematic: &ShaderSchematic,
    output_dir: &Path,
    compiler: &dyn ShaderCompiler,
) -> Result<Vec<ShaderArtifact>, ShaderError> {
    std::fs::create_dir_all(output_dir).map_err(|e| ShaderError::io(output_dir, e))?;

    let file_name = schematic.path().display().to_string();
    let mut artifacts = Vec::with_capacity(schematic.sections().len());

    for section in schematic.sections() {
        let module = match compiler.compile(section.stage, &section.source, &file_name) {
            Ok(module) => module,
            Err(diagnostics) => {
                log::error!(
                    "Failed to compile {} stage of {}: {} error(s), {} warning(s)",
                    section.stage,
                    file_name,
                    diagnostics.errors,
                    diagnostics.warnings
                );
                log::error!("{}", diagnostics.message);
                continue;
            }
        };

        if module.warnings > 0 {
            log::warn!(
                "{} stage of {}: {} warning(s)\n{}",
                section.stage,
                file_name,
                module.warnings,
                module.warning_text
            );
        }

        let path = artifact_path(output_dir, schematic.path(), section.stage);
        std::fs::write(&path, &module.spirv).map_err(|e| ShaderError::io(&path, e))?;
        log::trace!("Wrote {} shader to {:?}", section.stage, path);

        artifacts.push(ShaderArtifact {
            stage: section.stage,
            path,
        });
    }

    Ok(artifacts)
}
