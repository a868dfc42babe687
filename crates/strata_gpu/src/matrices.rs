//! Projection and window matrices
//!
//! Quad geometry is expressed on the unit square centered on the origin.
//! `quad_rect_transform` stretches it over a quad rect in content space,
//! the projection takes target space to normalized device coordinates and
//! the window matrix takes those to pixels.

use strata_core::{IntRect, Rect, Transform};

/// Orthographic projection of `[left, right] × [bottom, top]` onto `[-1, 1]²`
///
/// Depth is always flattened to zero. Degenerate ranges yield the identity.
pub fn ortho_projection_matrix(left: f32, right: f32, bottom: f32, top: f32) -> Transform {
    let delta_x = right - left;
    let delta_y = top - bottom;
    let mut proj = Transform::IDENTITY;
    if delta_x == 0.0 || delta_y == 0.0 {
        return proj;
    }
    proj.set(0, 0, 2.0 / delta_x);
    proj.set(0, 3, -(right + left) / delta_x);
    proj.set(1, 1, 2.0 / delta_y);
    proj.set(1, 3, -(top + bottom) / delta_y);
    proj.set(2, 2, 0.0);
    proj
}

/// Map normalized device coordinates onto a `width × height` window at
/// `(x, y)`
pub fn window_matrix(x: i32, y: i32, width: i32, height: i32) -> Transform {
    Transform::translation(x as f32, y as f32, 0.0)
        * Transform::scaling(width as f32, height as f32, 0.0)
        * Transform::translation(0.5, 0.5, 0.5)
        * Transform::scaling(0.5, 0.5, 0.5)
}

/// Transform taking the centered unit quad onto `quad_rect` under
/// `quad_transform`
pub fn quad_rect_transform(quad_transform: &Transform, quad_rect: &Rect) -> Transform {
    let mut transform = *quad_transform;
    transform.translate(
        0.5 * quad_rect.width() + quad_rect.x(),
        0.5 * quad_rect.height() + quad_rect.y(),
    );
    transform.scale(quad_rect.width(), quad_rect.height());
    transform
}

/// Matrices for drawing into a target covering `draw_rect`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetMatrices {
    pub projection: Transform,
    pub window: Transform,
    pub flipped_y: bool,
}

impl TargetMatrices {
    /// `flip_y` is set for the output surface, whose rows run bottom-up
    /// relative to content space; render-pass textures are never flipped
    pub fn new(draw_rect: IntRect, flip_y: bool) -> Self {
        let left = draw_rect.x as f32;
        let right = draw_rect.right() as f32;
        let top = draw_rect.y as f32;
        let bottom = draw_rect.bottom() as f32;
        let projection = if flip_y {
            ortho_projection_matrix(left, right, bottom, top)
        } else {
            ortho_projection_matrix(left, right, top, bottom)
        };
        Self {
            projection,
            window: window_matrix(0, 0, draw_rect.width, draw_rect.height),
            flipped_y: flip_y,
        }
    }
}

impl Default for TargetMatrices {
    fn default() -> Self {
        Self {
            projection: Transform::IDENTITY,
            window: Transform::IDENTITY,
            flipped_y: false,
        }
    }
}
