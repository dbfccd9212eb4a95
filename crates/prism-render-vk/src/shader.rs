// SPDX-License-Identifier: CEPL-1.0
//! SPIR-V loading: the embedded triangle shaders and on-disk overrides.

use std::io::Cursor;
use std::path::Path;

use crate::error::{RenderResult, VkError};
use crate::pass::ShaderSet;

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

static TRIANGLE_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.vert.spv"));
static TRIANGLE_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.frag.spv"));

/// Decode a SPIR-V blob into words. `read_spv` rejects lengths that are not
/// a multiple of four and blobs without the magic number (empty ones too),
/// and byte-swaps big-endian input.
pub fn decode_spirv(name: &str, bytes: &[u8]) -> RenderResult<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| VkError::PipelineCreation(format!("{name}: {e}")))
}

pub fn load_compiled_shader(path: &Path) -> RenderResult<Vec<u32>> {
    let bytes = std::fs::read(path)
        .map_err(|e| VkError::PipelineCreation(format!("{}: {e}", path.display())))?;
    decode_spirv(&path.display().to_string(), &bytes)
}

impl ShaderSet {
    pub fn builtin() -> RenderResult<Self> {
        Ok(ShaderSet {
            vertex: decode_spirv("triangle.vert", TRIANGLE_VERT)?,
            fragment: decode_spirv("triangle.frag", TRIANGLE_FRAG)?,
        })
    }

    pub fn from_paths(vertex: &Path, fragment: &Path) -> RenderResult<Self> {
        Ok(ShaderSet {
            vertex: load_compiled_shader(vertex)?,
            fragment: load_compiled_shader(fragment)?,
        })
    }
}
