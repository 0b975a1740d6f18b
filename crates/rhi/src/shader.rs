//! SPIR-V shader module loading.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// All shaders use `main` as their entry point.
const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Pipeline stage a shader module targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A compiled SPIR-V shader module.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Loads a SPIR-V module from a file on disk.
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: impl AsRef<Path>,
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("failed to read {}: {}", path.display(), e))
        })?;

        debug!(
            "Loading {} shader from {} ({} bytes)",
            stage,
            path.display(),
            bytes.len()
        );
        Self::from_spirv_bytes(device, &bytes, stage)
    }

    /// Creates a module from raw SPIR-V bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] when the bytes are not valid
    /// SPIR-V (wrong length, alignment, or magic number).
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let code = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| {
            RhiError::ShaderError(format!("invalid SPIR-V for {stage} shader: {e}"))
        })?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Stage create info for pipeline construction.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_to_vk() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(
            ShaderStage::Compute.to_vk_stage(),
            vk::ShaderStageFlags::COMPUTE
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(ShaderStage::Vertex.to_string(), "vertex");
        assert_eq!(ShaderStage::Compute.to_string(), "compute");
    }

    #[test]
    fn test_read_spv_rejects_misaligned_and_bad_magic() {
        // read_spv does the validation from_spirv_bytes relies on.
        assert!(ash::util::read_spv(&mut Cursor::new(&[0u8; 6][..])).is_err());
        assert!(ash::util::read_spv(&mut Cursor::new(&[0u8; 8][..])).is_err());
    }
}
