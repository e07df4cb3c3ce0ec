//! Shader schematic parser
//!
//! A schematic is a plain text file holding several GLSL stages:
//!
//! ```text
//! Anything before the first tag is documentation and is dropped.
//! #vertex
//! // annotation line, always skipped
//! #version 450
//! void main() { ... }
//! #fragment
//! // annotation line, always skipped
//! #version 450
//! void main() { ... }
//! ```
//!
//! A line equal to a registered tag starts a new section. The line right
//! after a tag is skipped unless annotation skipping is turned off.

use std::path::{Path, PathBuf};

use super::{ShaderError, ShaderStage};

/// Table mapping tag lines to the stage they introduce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchematicTags {
    tags: Vec<(String, ShaderStage)>,
}

impl SchematicTags {
    /// Table without any tags
    pub fn empty() -> Self {
        Self { tags: Vec::new() }
    }

    /// Register a tag; a later registration of the same tag wins
    pub fn with_tag(mut self, tag: impl Into<String>, stage: ShaderStage) -> Self {
        let tag = tag.into();
        self.tags.retain(|(existing, _)| *existing != tag);
        self.tags.push((tag, stage));
        self
    }

    /// Stage introduced by `line`, if it is a tag line
    pub fn stage_for(&self, line: &str) -> Option<ShaderStage> {
        self.tags
            .iter()
            .find(|(tag, _)| tag == line)
            .map(|(_, stage)| *stage)
    }

    /// Number of registered tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether no tag is registered
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl Default for SchematicTags {
    fn default() -> Self {
        Self::empty()
            .with_tag("#vertex", ShaderStage::Vertex)
            .with_tag("#fragment", ShaderStage::Fragment)
            .with_tag("#compute", ShaderStage::Compute)
            .with_tag("#geometry", ShaderStage::Geometry)
            .with_tag("#tess_control", ShaderStage::TessControl)
            .with_tag("#tess_evaluation", ShaderStage::TessEvaluation)
    }
}

/// One stage's source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSection {
    /// Stage the section targets
    pub stage: ShaderStage,
    /// GLSL source, every line newline-terminated
    pub source: String,
}

/// Parsed schematic: sections in the order their tags appear
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSchematic {
    path: PathBuf,
    sections: Vec<ShaderSection>,
}

impl ShaderSchematic {
    /// Read and parse a schematic file
    pub fn parse_file(
        path: impl AsRef<Path>,
        tags: &SchematicTags,
        skip_annotation_line: bool,
    ) -> Result<Self, ShaderError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ShaderError::io(path, e))?;
        Ok(Self::parse_str(path, &text, tags, skip_annotation_line))
    }

    /// Parse schematic text; `path` names the source for output artifacts
    pub fn parse_str(
        path: impl Into<PathBuf>,
        text: &str,
        tags: &SchematicTags,
        skip_annotation_line: bool,
    ) -> Self {
        let path = path.into();
        let mut sections = Vec::new();
        let mut current: Option<ShaderSection> = None;
        let mut skip_next = false;

        for line in text.lines() {
            if skip_next {
                skip_next = false;
                continue;
            }

            if let Some(stage) = tags.stage_for(line) {
                sections.extend(current.take());
                current = Some(ShaderSection {
                    stage,
                    source: String::new(),
                });
                skip_next = skip_annotation_line;
                continue;
            }

            // Preamble lines have no section to land in.
            if let Some(section) = current.as_mut() {
                section.source.push_str(line);
                section.source.push('\n');
            }
        }

        sections.extend(current.filter(|section| !section.source.is_empty()));

        log::trace!(
            "Parsed shader schematic {:?}: {} section(s)",
            path,
            sections.len()
        );

        Self { path, sections }
    }

    /// Path the schematic was read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sections in tag order
    pub fn sections(&self) -> &[ShaderSection] {
        &self.sections
    }

    /// First section targeting `stage`
    pub fn section(&self, stage: ShaderStage) -> Option<&ShaderSection> {
        self.sections.iter().find(|section| section.stage == stage)
    }
}
