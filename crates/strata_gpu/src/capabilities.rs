//! Platform feature negotiation
//!
//! Extensions are queried once when the renderer is created and folded into
//! `RendererCapabilities`; draw code branches on the stored flags.

use rustc_hash::FxHashSet;

/// Extension names reported by `GraphicsContext::extensions`
pub mod extensions {
    pub const TEXTURE_FORMAT_BGRA8888: &str = "texture_format_bgra8888";
    pub const READ_FORMAT_BGRA: &str = "read_format_bgra";
    pub const POST_SUB_BUFFER: &str = "post_sub_buffer";
    pub const SWAP_COMPLETE_CALLBACK: &str = "swapbuffers_complete_callback";
    pub const SET_VISIBILITY: &str = "set_visibility";
    pub const GPU_MEMORY_MANAGER: &str = "gpu_memory_manager";
    pub const EGL_IMAGE_EXTERNAL: &str = "egl_image_external";
    pub const FAST_NPOT_MO8_TEXTURES: &str = "fast_npot_mo8_textures";
    pub const BIND_UNIFORM_LOCATION: &str = "bind_uniform_location";

    /// Every extension the renderer knows about
    pub const ALL: [&str; 9] = [
        TEXTURE_FORMAT_BGRA8888,
        READ_FORMAT_BGRA,
        POST_SUB_BUFFER,
        SWAP_COMPLETE_CALLBACK,
        SET_VISIBILITY,
        GPU_MEMORY_MANAGER,
        EGL_IMAGE_EXTERNAL,
        FAST_NPOT_MO8_TEXTURES,
        BIND_UNIFORM_LOCATION,
    ];
}

/// Feature flags and limits fixed for the renderer's lifetime
#[derive(Clone, Debug, PartialEq)]
pub struct RendererCapabilities {
    pub best_texture_format: wgpu::TextureFormat,
    pub max_texture_size: i32,
    /// BGRA upload and readback are both available
    pub using_accelerated_painting: bool,
    /// The output surface can present a sub-rectangle
    pub using_partial_swap: bool,
    pub using_swap_complete_callback: bool,
    pub using_set_visibility: bool,
    pub using_gpu_memory_manager: bool,
    pub using_egl_image: bool,
    pub using_fast_npot_mo8_textures: bool,
    /// Uniform locations are assigned before linking instead of queried
    pub using_bind_uniform: bool,
}

impl RendererCapabilities {
    pub fn from_extensions<I, S>(
        extensions: I,
        max_texture_size: i32,
        best_texture_format: wgpu::TextureFormat,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: FxHashSet<String> = extensions
            .into_iter()
            .map(|name| name.as_ref().to_string())
            .collect();
        let has = |name: &str| names.contains(name);

        let capabilities = Self {
            best_texture_format,
            max_texture_size,
            using_accelerated_painting: has(extensions::TEXTURE_FORMAT_BGRA8888)
                && has(extensions::READ_FORMAT_BGRA),
            using_partial_swap: has(extensions::POST_SUB_BUFFER),
            using_swap_complete_callback: has(extensions::SWAP_COMPLETE_CALLBACK),
            using_set_visibility: has(extensions::SET_VISIBILITY),
            using_gpu_memory_manager: has(extensions::GPU_MEMORY_MANAGER),
            using_egl_image: has(extensions::EGL_IMAGE_EXTERNAL),
            using_fast_npot_mo8_textures: has(extensions::FAST_NPOT_MO8_TEXTURES),
            using_bind_uniform: has(extensions::BIND_UNIFORM_LOCATION),
        };
        tracing::debug!("renderer capabilities: {:?}", capabilities);
        capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accelerated_painting_needs_both_bgra_extensions() {
        let caps = RendererCapabilities::from_extensions(
            [extensions::TEXTURE_FORMAT_BGRA8888],
            2048,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        assert!(!caps.using_accelerated_painting);

        let caps = RendererCapabilities::from_extensions(
            [extensions::TEXTURE_FORMAT_BGRA8888, extensions::READ_FORMAT_BGRA],
            2048,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        assert!(caps.using_accelerated_painting);
    }

    #[test]
    fn unknown_extensions_are_ignored() {
        let caps = RendererCapabilities::from_extensions(
            ["vendor_magic", extensions::POST_SUB_BUFFER],
            4096,
            wgpu::TextureFormat::Bgra8Unorm,
        );
        assert!(caps.using_partial_swap);
        assert!(!caps.using_set_visibility);
        assert_eq!(caps.max_texture_size, 4096);
    }
}
