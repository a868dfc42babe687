//! Immediate-mode graphics context
//!
//! `GraphicsContext` is the command surface the renderer drives. It follows
//! the shape of a GL context: one bound program, one bound framebuffer,
//! texture units, and global pipeline state toggled between draws. Texture
//! uploads and reads address textures directly and need no binding.
//!
//! Framebuffer coordinates put the origin at the bottom-left: row `0` of a
//! framebuffer (and of a texture attached to one) is window `y = 0`.
//! Texture row `0` is sampled at texture coordinate `v = 0`.

use smallvec::SmallVec;
use strata_core::{IntRect, IntSize};

use crate::program::ProgramDescriptor;

/// Maximum number of quads the shared index buffer can draw in one call
pub const MAX_QUADS_PER_DRAW: usize = 8;

/// Index offset of the line-loop indices that follow the triangle indices
pub const LINE_LOOP_INDEX_OFFSET: u32 = 6 * MAX_QUADS_PER_DRAW as u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferId(pub u32);

/// Location of a uniform inside a linked program
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation(pub i32);

/// Value uploaded to one uniform location
#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column-major 3x3 matrix
    Mat3([f32; 9]),
    /// Column-major 4x4 matrix
    Mat4([f32; 16]),
    Vec2Array(SmallVec<[[f32; 2]; 4]>),
    Vec3Array(SmallVec<[[f32; 3]; 8]>),
}

/// Pipeline state toggled with `set_capability`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Blend,
    ScissorTest,
    DepthTest,
    CullFace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    Triangles,
    LineLoop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    Texture2D,
    /// Externally produced image (video streams)
    External,
}

/// `(One, OneMinusSrcAlpha)` for color and alpha: source-over for
/// premultiplied colors
pub const PREMULTIPLIED_BLEND: wgpu::BlendState = wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING;

/// Straight-alpha color blending that leaves destination alpha untouched
pub const STRAIGHT_ALPHA_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Zero,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Index list for `max_quads` quads followed by one line loop
///
/// Quad `i` uses vertices `4i..4i+4` in the order top-left, top-right,
/// bottom-right, bottom-left and is split into the triangles
/// `(0, 1, 2)` and `(0, 2, 3)`.
pub fn quad_indices(max_quads: usize) -> Vec<u16> {
    let mut indices = Vec::with_capacity(max_quads * 6 + 4);
    for quad in 0..max_quads as u16 {
        let base = quad * 4;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    indices.extend_from_slice(&[0, 1, 2, 3]);
    indices
}

/// GL-style graphics context driven by the renderer
///
/// Calls made after the context is lost must be harmless no-ops; creation
/// calls then return `None`.
pub trait GraphicsContext {
    fn make_current(&mut self) -> bool;
    /// Sticky: once lost, the context never recovers
    fn is_context_lost(&self) -> bool;
    /// Named platform features supported by this context
    fn extensions(&self) -> Vec<String>;
    fn set_visibility(&mut self, visible: bool);

    // Programs
    fn create_program(&mut self, descriptor: &ProgramDescriptor) -> Option<ProgramId>;
    fn delete_program(&mut self, program: ProgramId);
    fn use_program(&mut self, program: Option<ProgramId>);
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    /// Set a uniform of the program in use
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);
    /// Upload a block of per-instance data for the program in use
    fn set_uniform_block(&mut self, location: UniformLocation, data: &[u8]);

    // Pipeline state
    fn set_capability(&mut self, capability: Capability, enabled: bool);
    fn blend_state(&mut self, state: wgpu::BlendState);
    fn scissor(&mut self, rect: IntRect);
    fn viewport(&mut self, rect: IntRect);
    fn clear_color(&mut self, color: [f32; 4]);
    /// Clear the bound framebuffer, honoring the scissor test
    fn clear(&mut self);
    fn line_width(&mut self, width: f32);

    // Textures
    fn create_texture(&mut self) -> Option<TextureId>;
    fn delete_texture(&mut self, texture: TextureId);
    /// (Re)allocate storage, optionally uploading rows top to bottom in
    /// texture order
    fn tex_image(
        &mut self,
        texture: TextureId,
        size: IntSize,
        format: wgpu::TextureFormat,
        data: Option<&[u8]>,
    ) -> bool;
    fn tex_sub_image(&mut self, texture: TextureId, rect: IntRect, data: &[u8]);
    /// Texture contents as RGBA8 rows in texture order
    fn read_texture(&self, texture: TextureId) -> Option<(IntSize, Vec<u8>)>;
    fn texture_filter(&mut self, texture: TextureId, filter: wgpu::FilterMode);
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureId>);

    // Framebuffers
    fn create_framebuffer(&mut self) -> Option<FramebufferId>;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    /// `None` binds the default (output) framebuffer
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    fn framebuffer_texture(&mut self, texture: Option<TextureId>);
    /// Replace `texture` with a copy of `rect` of the bound framebuffer
    fn copy_tex_image(&mut self, texture: TextureId, rect: IntRect) -> bool;
    /// RGBA8 pixels of `rect`, bottom row first
    fn read_pixels(&mut self, rect: IntRect) -> Vec<u8>;

    // Geometry and draws
    fn prepare_quad_geometry(&mut self, indices: &[u16]);
    fn draw_elements(&mut self, mode: PrimitiveMode, count: u32, offset: u32);

    fn flush(&mut self);
    fn finish(&mut self);

    // Default framebuffer
    fn resize(&mut self, size: IntSize);
    fn discard_backbuffer(&mut self);
    fn ensure_backbuffer(&mut self);
    fn swap_buffers(&mut self);
    fn post_sub_buffer(&mut self, rect: IntRect);
}
