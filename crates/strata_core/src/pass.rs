//! Render passes and their dependency order

use rustc_hash::FxHashSet;

use crate::geometry::{IntRect, Rect};
use crate::quad::{DrawQuad, Material};
use crate::transform::Transform;

/// Identifies a render pass: the owning layer plus an index within it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPassId {
    pub layer_id: u32,
    pub index: u32,
}

impl RenderPassId {
    pub const fn new(layer_id: u32, index: u32) -> Self {
        Self { layer_id, index }
    }
}

/// Ordered list of quads sharing one target
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPass {
    pub id: RenderPassId,
    /// Target-space rect covered by the pass's output
    pub output_rect: IntRect,
    pub damage_rect: Rect,
    pub transform_to_root_target: Transform,
    pub has_transparent_background: bool,
    pub has_occlusion_from_outside_target_surface: bool,
    /// Quads in back-to-front order
    pub quads: Vec<DrawQuad>,
}

impl RenderPass {
    pub fn new(id: RenderPassId, output_rect: IntRect) -> Self {
        Self {
            id,
            output_rect,
            damage_rect: output_rect.to_rect(),
            transform_to_root_target: Transform::IDENTITY,
            has_transparent_background: true,
            has_occlusion_from_outside_target_surface: false,
            quads: Vec::new(),
        }
    }

    pub fn with_damage_rect(mut self, damage_rect: Rect) -> Self {
        self.damage_rect = damage_rect;
        self
    }

    pub fn with_transparent_background(mut self, transparent: bool) -> Self {
        self.has_transparent_background = transparent;
        self
    }

    pub fn with_transform_to_root_target(mut self, transform: Transform) -> Self {
        self.transform_to_root_target = transform;
        self
    }

    pub fn push_quad(&mut self, quad: DrawQuad) {
        self.quads.push(quad);
    }

    /// Passes referenced by render-pass quads of this pass
    pub fn referenced_passes(&self) -> impl Iterator<Item = RenderPassId> + '_ {
        self.quads.iter().filter_map(|quad| match &quad.material {
            Material::RenderPass(pass_quad) => Some(pass_quad.render_pass_id),
            _ => None,
        })
    }
}

/// True when every referenced pass appears earlier in `passes`.
///
/// References to passes missing from the list are not an ordering error;
/// the renderer skips those quads.
pub fn is_in_dependency_order(passes: &[RenderPass]) -> bool {
    let all: FxHashSet<RenderPassId> = passes.iter().map(|pass| pass.id).collect();
    let mut drawn = FxHashSet::default();
    for pass in passes {
        for referenced in pass.referenced_passes() {
            if all.contains(&referenced) && !drawn.contains(&referenced) {
                tracing::debug!(
                    "render pass {:?} references {:?} before it is drawn",
                    pass.id,
                    referenced
                );
                return false;
            }
        }
        drawn.insert(pass.id);
    }
    true
}
