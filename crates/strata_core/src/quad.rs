//! Draw quads and their material payloads
//!
//! Quads are produced upstream and consumed read-only by the renderer.
//! Quads drawn with the same transform, clip and opacity share one
//! `SharedQuadState`.

use std::sync::Arc;

use crate::color::Color;
use crate::filter::FilterOperations;
use crate::geometry::{IntRect, IntSize, Point, Rect, Size};
use crate::pass::RenderPassId;
use crate::picture::Picture;
use crate::transform::Transform;

/// Handle to a texture owned by the resource provider
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

// ─────────────────────────────────────────────────────────────────────────────
// Shared Quad State
// ─────────────────────────────────────────────────────────────────────────────

/// State shared by every quad of one layer
#[derive(Clone, Debug, PartialEq)]
pub struct SharedQuadState {
    /// Maps content space into the render pass's target space
    pub content_to_target_transform: Transform,
    pub visible_content_rect: IntRect,
    /// Target-space clip, `None` when unclipped
    pub clip_rect: Option<IntRect>,
    pub opacity: f32,
    /// Bounds of the layer's content, used to find quads on the layer edge
    pub content_bounds: IntSize,
}

impl SharedQuadState {
    pub fn new(content_to_target_transform: Transform, content_bounds: IntSize) -> Self {
        Self {
            content_to_target_transform,
            visible_content_rect: IntRect::from_size(content_bounds),
            clip_rect: None,
            opacity: 1.0,
            content_bounds,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_clip_rect(mut self, clip_rect: IntRect) -> Self {
        self.clip_rect = Some(clip_rect);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Materials
// ─────────────────────────────────────────────────────────────────────────────

/// Tiled content from a texture atlas tile
#[derive(Clone, Debug, PartialEq)]
pub struct TileQuad {
    pub resource_id: ResourceId,
    /// Texel rect of the tile inside its texture
    pub tex_coord_rect: Rect,
    pub texture_size: IntSize,
    /// Contents were uploaded BGRA and must be swizzled when sampled
    pub swizzle_contents: bool,
}

/// Whole-texture content, batchable
#[derive(Clone, Debug, PartialEq)]
pub struct TextureQuad {
    pub resource_id: ResourceId,
    pub premultiplied_alpha: bool,
    pub uv_top_left: Point,
    pub uv_bottom_right: Point,
    /// Opacity of the four corners, top-left first, clockwise
    pub vertex_opacity: [f32; 4],
    /// Texture rows are stored bottom-up
    pub flipped: bool,
}

impl TextureQuad {
    pub fn new(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            premultiplied_alpha: true,
            uv_top_left: Point::ZERO,
            uv_bottom_right: Point::new(1.0, 1.0),
            vertex_opacity: [1.0; 4],
            flipped: false,
        }
    }
}

/// Tri-planar video frame
#[derive(Clone, Debug, PartialEq)]
pub struct YuvVideoQuad {
    /// Fraction of each plane holding visible pixels
    pub tex_scale: Size,
    pub y_plane: ResourceId,
    pub u_plane: ResourceId,
    pub v_plane: ResourceId,
}

/// Video frame delivered as one external texture plus a sampling matrix
#[derive(Clone, Debug, PartialEq)]
pub struct StreamVideoQuad {
    pub resource_id: ResourceId,
    pub matrix: Transform,
}

/// Content recording rasterized on demand
#[derive(Clone, Debug)]
pub struct PictureQuad {
    pub tex_coord_rect: Rect,
    pub texture_size: IntSize,
    pub swizzle_contents: bool,
    /// Content-space rect covered by the bitmap
    pub content_rect: IntRect,
    pub contents_scale: f32,
    pub picture: Arc<dyn Picture>,
}

impl PartialEq for PictureQuad {
    fn eq(&self, other: &Self) -> bool {
        self.tex_coord_rect == other.tex_coord_rect
            && self.texture_size == other.texture_size
            && self.swizzle_contents == other.swizzle_contents
            && self.content_rect == other.content_rect
            && self.contents_scale == other.contents_scale
            && Arc::ptr_eq(&self.picture, &other.picture)
    }
}

/// Output of another render pass composited into this one
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPassQuad {
    pub render_pass_id: RenderPassId,
    pub is_replica: bool,
    pub mask_resource_id: Option<ResourceId>,
    /// Mask texture coordinates covering the quad
    pub mask_uv_rect: Rect,
    pub contents_changed_since_last_frame: Rect,
    pub filters: FilterOperations,
    pub background_filters: FilterOperations,
}

impl RenderPassQuad {
    pub fn new(render_pass_id: RenderPassId) -> Self {
        Self {
            render_pass_id,
            is_replica: false,
            mask_resource_id: None,
            mask_uv_rect: Rect::new(0.0, 0.0, 1.0, 1.0),
            contents_changed_since_last_frame: Rect::ZERO,
            filters: FilterOperations::new(),
            background_filters: FilterOperations::new(),
        }
    }
}

/// Material-specific payload of a quad
#[derive(Clone, Debug, PartialEq)]
pub enum Material {
    Checkerboard { color: Color },
    DebugBorder { color: Color, width: f32 },
    SolidColor { color: Color },
    Tile(TileQuad),
    Texture(TextureQuad),
    YuvVideo(YuvVideoQuad),
    StreamVideo(StreamVideoQuad),
    Picture(PictureQuad),
    RenderPass(RenderPassQuad),
}

/// Discriminant of `Material`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    Checkerboard,
    DebugBorder,
    SolidColor,
    Tile,
    Texture,
    YuvVideo,
    StreamVideo,
    Picture,
    RenderPass,
}

impl Material {
    pub fn kind(&self) -> MaterialKind {
        match self {
            Material::Checkerboard { .. } => MaterialKind::Checkerboard,
            Material::DebugBorder { .. } => MaterialKind::DebugBorder,
            Material::SolidColor { .. } => MaterialKind::SolidColor,
            Material::Tile(_) => MaterialKind::Tile,
            Material::Texture(_) => MaterialKind::Texture,
            Material::YuvVideo(_) => MaterialKind::YuvVideo,
            Material::StreamVideo(_) => MaterialKind::StreamVideo,
            Material::Picture(_) => MaterialKind::Picture,
            Material::RenderPass(_) => MaterialKind::RenderPass,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Draw Quad
// ─────────────────────────────────────────────────────────────────────────────

/// One rectangular drawing primitive
#[derive(Clone, Debug, PartialEq)]
pub struct DrawQuad {
    /// Content-space geometry
    pub rect: IntRect,
    /// Part of `rect` known to be fully opaque
    pub opaque_rect: IntRect,
    /// Part of `rect` left after occlusion culling, always inside `rect`
    pub visible_rect: IntRect,
    pub needs_blending: bool,
    pub shared_quad_state: Arc<SharedQuadState>,
    pub material: Material,
}

impl DrawQuad {
    /// Quad covering `rect`, fully visible; opaque for solid colors with
    /// full alpha and for picture content without blending
    pub fn new(shared_quad_state: Arc<SharedQuadState>, rect: IntRect, material: Material) -> Self {
        let opaque_rect = match &material {
            Material::SolidColor { color } if color.a >= 1.0 => rect,
            Material::Checkerboard { .. } => rect,
            _ => IntRect::ZERO,
        };
        Self {
            rect,
            opaque_rect,
            visible_rect: rect,
            needs_blending: false,
            shared_quad_state,
            material,
        }
    }

    pub fn with_visible_rect(mut self, visible_rect: IntRect) -> Self {
        debug_assert!(
            self.rect.contains(&visible_rect) || visible_rect.is_empty(),
            "visible rect {visible_rect:?} escapes quad rect {:?}",
            self.rect
        );
        self.visible_rect = visible_rect;
        self
    }

    pub fn with_opaque_rect(mut self, opaque_rect: IntRect) -> Self {
        self.opaque_rect = opaque_rect;
        self
    }

    pub fn with_needs_blending(mut self, needs_blending: bool) -> Self {
        self.needs_blending = needs_blending;
        self
    }

    pub fn kind(&self) -> MaterialKind {
        self.material.kind()
    }

    pub fn quad_transform(&self) -> &Transform {
        &self.shared_quad_state.content_to_target_transform
    }

    pub fn opacity(&self) -> f32 {
        self.shared_quad_state.opacity
    }

    pub fn clip_rect(&self) -> Option<IntRect> {
        self.shared_quad_state.clip_rect
    }

    pub fn should_draw_with_blending(&self) -> bool {
        if self.needs_blending || self.opacity() < 1.0 {
            return true;
        }
        if self.visible_rect.is_empty() {
            return false;
        }
        !self.opaque_rect.contains(&self.visible_rect)
    }

    pub fn is_left_edge(&self) -> bool {
        self.rect.x == 0
    }

    pub fn is_top_edge(&self) -> bool {
        self.rect.y == 0
    }

    pub fn is_right_edge(&self) -> bool {
        self.rect.right() == self.shared_quad_state.content_bounds.width
    }

    pub fn is_bottom_edge(&self) -> bool {
        self.rect.bottom() == self.shared_quad_state.content_bounds.height
    }

    /// True when any side lies on the layer boundary
    pub fn is_edge(&self) -> bool {
        self.is_left_edge() || self.is_top_edge() || self.is_right_edge() || self.is_bottom_edge()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(bounds: IntSize) -> Arc<SharedQuadState> {
        Arc::new(SharedQuadState::new(Transform::IDENTITY, bounds))
    }

    #[test]
    fn opaque_solid_color_draws_without_blending() {
        let quad = DrawQuad::new(
            shared(IntSize::new(100, 100)),
            IntRect::new(0, 0, 100, 100),
            Material::SolidColor { color: Color::RED },
        );
        assert!(!quad.should_draw_with_blending());
    }

    #[test]
    fn translucent_layer_requires_blending() {
        let state = Arc::new(
            SharedQuadState::new(Transform::IDENTITY, IntSize::new(10, 10)).with_opacity(0.5),
        );
        let quad = DrawQuad::new(
            state,
            IntRect::new(0, 0, 10, 10),
            Material::SolidColor { color: Color::RED },
        );
        assert!(quad.should_draw_with_blending());
    }

    #[test]
    fn texture_without_opaque_rect_blends() {
        let quad = DrawQuad::new(
            shared(IntSize::new(10, 10)),
            IntRect::new(0, 0, 10, 10),
            Material::Texture(TextureQuad::new(ResourceId(1))),
        );
        assert!(quad.should_draw_with_blending());
        let opaque = quad.with_opaque_rect(IntRect::new(0, 0, 10, 10));
        assert!(!opaque.should_draw_with_blending());
    }

    #[test]
    fn edge_detection_uses_content_bounds() {
        let state = shared(IntSize::new(300, 300));
        let interior = DrawQuad::new(
            state.clone(),
            IntRect::new(100, 100, 100, 100),
            Material::SolidColor { color: Color::RED },
        );
        assert!(!interior.is_edge());
        let corner = DrawQuad::new(
            state,
            IntRect::new(200, 200, 100, 100),
            Material::SolidColor { color: Color::RED },
        );
        assert!(corner.is_right_edge() && corner.is_bottom_edge());
        assert!(!corner.is_left_edge());
    }
}
