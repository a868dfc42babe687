//! Per-frame drawing state

use strata_core::{IntRect, Rect, RenderPass, RenderPassId, ResourceId, Transform};

use crate::matrices::TargetMatrices;

/// The parts of a render pass that stay relevant while it is the target
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassTarget {
    pub id: RenderPassId,
    pub output_rect: IntRect,
    pub has_transparent_background: bool,
    pub transform_to_root_target: Transform,
}

impl From<&RenderPass> for PassTarget {
    fn from(pass: &RenderPass) -> Self {
        Self {
            id: pass.id,
            output_rect: pass.output_rect,
            has_transparent_background: pass.has_transparent_background,
            transform_to_root_target: pass.transform_to_root_target,
        }
    }
}

/// State shared by every draw of one frame
#[derive(Clone, Debug)]
pub struct DrawingFrame {
    pub root_pass: PassTarget,
    /// Damage in root target space; draws outside it may be skipped
    pub root_damage_rect: Rect,
    /// Pass being drawn; `None` while drawing into a scratch texture
    pub current_pass: Option<PassTarget>,
    /// Offscreen texture bound as the target, `None` for the output surface
    pub current_texture: Option<ResourceId>,
    /// Target-space rect covered by the bound target
    pub draw_rect: IntRect,
    pub matrices: TargetMatrices,
}

impl DrawingFrame {
    pub fn new(root: &RenderPass, root_damage_rect: Rect) -> Self {
        Self {
            root_pass: PassTarget::from(root),
            root_damage_rect,
            current_pass: None,
            current_texture: None,
            draw_rect: IntRect::ZERO,
            matrices: TargetMatrices::default(),
        }
    }

    /// Whether `id` is the root pass of this frame
    pub fn is_root(&self, id: RenderPassId) -> bool {
        self.root_pass.id == id
    }

    /// Whether the output surface, rather than a texture, is the target
    pub fn is_drawing_to_root(&self) -> bool {
        self.current_texture.is_none()
            && self
                .current_pass
                .as_ref()
                .is_some_and(|pass| pass.id == self.root_pass.id)
    }
}
