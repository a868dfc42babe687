//! Anti-aliasing geometry
//!
//! Quads that are rotated, projected or positioned off the pixel grid are
//! drawn with inflated geometry and a per-fragment coverage term. The
//! coverage shader receives eight edges as line equations in window space:
//! the quad's own edges followed by its device bounding box, each pushed
//! half a pixel outward so the falloff straddles the true boundary.

use strata_core::{DrawQuad, Point, QuadF, Rect, Transform};

/// Distance from the pixel grid below which a rect counts as aligned
pub const ANTI_ALIASING_EPSILON: f32 = 1.0 / 1024.0;

/// Half a pixel; how far every edge is pushed outward
const ANTI_ALIASING_DISTANCE: f32 = 0.5;

// ─────────────────────────────────────────────────────────────────────────────
// Edges and Quads
// ─────────────────────────────────────────────────────────────────────────────

/// Line `x·px + y·py + z = 0`, normalized so that evaluating it yields the
/// signed distance to the line
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LayerEdge {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl LayerEdge {
    /// Edge through `p` and `q`; points to the left of `p → q` in y-down
    /// coordinates are on the positive side
    pub fn new(p: Point, q: Point) -> Self {
        let tx = p.y - q.y;
        let ty = q.x - p.x;
        let mut edge = Self {
            x: tx,
            y: ty,
            z: p.x * q.y - q.x * p.y,
        };
        let length = (tx * tx + ty * ty).sqrt();
        if length > 0.0 {
            edge.scale(1.0 / length);
        }
        edge
    }

    pub fn scale(&mut self, factor: f32) {
        self.x *= factor;
        self.y *= factor;
        self.z *= factor;
    }

    /// Signed distance of `p` from the edge
    pub fn distance(&self, p: Point) -> f32 {
        self.x * p.x + self.y * p.y + self.z
    }

    /// Intersection point of two edges
    pub fn intersect(&self, other: &LayerEdge) -> Point {
        let det = self.x * other.y - other.x * self.y;
        Point::new(
            (self.y * other.z - other.y * self.z) / det,
            (self.z * other.x - other.z * self.x) / det,
        )
    }
}

/// Quad described by its four edges
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerQuad {
    pub left: LayerEdge,
    pub top: LayerEdge,
    pub right: LayerEdge,
    pub bottom: LayerEdge,
}

impl LayerQuad {
    pub fn new(left: LayerEdge, top: LayerEdge, right: LayerEdge, bottom: LayerEdge) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Edges of `quad`, oriented so the interior is on the positive side
    pub fn from_quad(quad: &QuadF) -> Self {
        let mut layer = Self {
            left: LayerEdge::new(quad.p4, quad.p1),
            top: LayerEdge::new(quad.p1, quad.p2),
            right: LayerEdge::new(quad.p2, quad.p3),
            bottom: LayerEdge::new(quad.p3, quad.p4),
        };
        if quad.is_counter_clockwise() {
            layer.scale(-1.0);
        }
        layer
    }

    fn scale(&mut self, factor: f32) {
        self.left.scale(factor);
        self.top.scale(factor);
        self.right.scale(factor);
        self.bottom.scale(factor);
    }

    /// Push every edge outward by `distance`
    pub fn inflate(&mut self, distance: f32) {
        self.left.z += distance;
        self.top.z += distance;
        self.right.z += distance;
        self.bottom.z += distance;
    }

    pub fn inflate_anti_aliasing_distance(&mut self) {
        self.inflate(ANTI_ALIASING_DISTANCE);
    }

    /// Corners where adjacent edges meet
    pub fn to_quad(&self) -> QuadF {
        QuadF::new(
            self.left.intersect(&self.top),
            self.top.intersect(&self.right),
            self.right.intersect(&self.bottom),
            self.bottom.intersect(&self.left),
        )
    }

    /// `[left, top, right, bottom]` as twelve floats
    pub fn to_float_array(&self) -> [f32; 12] {
        let mut out = [0.0; 12];
        for (i, edge) in [self.left, self.top, self.right, self.bottom].iter().enumerate() {
            out[i * 3] = edge.x;
            out[i * 3 + 1] = edge.y;
            out[i * 3 + 2] = edge.z;
        }
        out
    }
}

/// Pack the quad edges and bounding edges into the 24-float coverage block
pub fn edge_array(edges: &LayerQuad, bounds: &LayerQuad) -> [f32; 24] {
    let mut out = [0.0; 24];
    out[..12].copy_from_slice(&edges.to_float_array());
    out[12..].copy_from_slice(&bounds.to_float_array());
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Quad Setup
// ─────────────────────────────────────────────────────────────────────────────

/// Geometry a content quad is drawn with
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AntiAliasing {
    pub use_aa: bool,
    /// Quad in content space; inflated past the visible rect when `use_aa`
    pub local_quad: QuadF,
    /// Coverage edges, meaningful only when `use_aa`
    pub edges: [f32; 24],
}

/// Whether a device-space quad sits on the pixel grid closely enough to be
/// drawn without coverage
pub fn is_pixel_aligned(device_quad: &QuadF) -> bool {
    device_quad.is_rectilinear()
        && device_quad
            .bounding_box()
            .is_nearest_rect_within_distance(ANTI_ALIASING_EPSILON)
}

/// Decide whether `quad` needs anti-aliasing under `device_transform` and
/// build its inflated geometry
///
/// Only sides that lie on the layer boundary and were not cut back by
/// occlusion or clipping are inflated; the other sides keep their tight
/// edge so coverage never bleeds into the neighbouring tile.
pub fn setup_quad_for_antialiasing(device_transform: &Transform, quad: &DrawQuad) -> AntiAliasing {
    let tile_rect = Rect::from(quad.visible_rect);
    let no_aa = AntiAliasing {
        use_aa: false,
        local_quad: QuadF::from_rect(tile_rect),
        edges: [0.0; 24],
    };

    let visible_content_rect = Rect::from(quad.shared_quad_state.visible_content_rect);
    let (device_layer_quad, clipped) = device_transform.map_quad(&QuadF::from_rect(visible_content_rect));
    let use_aa = !clipped && !is_pixel_aligned(&device_layer_quad) && quad.is_edge();
    if !use_aa {
        return no_aa;
    }
    let Some(inverse) = device_transform.inverse() else {
        return no_aa;
    };

    let mut device_layer_bounds =
        LayerQuad::from_quad(&QuadF::from_rect(device_layer_quad.bounding_box()));
    device_layer_bounds.inflate_anti_aliasing_distance();
    let mut device_layer_edges = LayerQuad::from_quad(&device_layer_quad);
    device_layer_edges.inflate_anti_aliasing_distance();
    let edges = edge_array(&device_layer_edges, &device_layer_bounds);

    let map = |p: Point| device_transform.map_point(p).unwrap_or(Point::ZERO);
    let bottom_right = map(Point::new(tile_rect.right(), tile_rect.bottom()));
    let bottom_left = map(Point::new(tile_rect.x(), tile_rect.bottom()));
    let top_left = map(Point::new(tile_rect.x(), tile_rect.y()));
    let top_right = map(Point::new(tile_rect.right(), tile_rect.y()));

    let mut bottom_edge = LayerEdge::new(bottom_right, bottom_left);
    let mut left_edge = LayerEdge::new(bottom_left, top_left);
    let mut top_edge = LayerEdge::new(top_left, top_right);
    let mut right_edge = LayerEdge::new(top_right, bottom_right);

    let rect = quad.rect;
    let visible = quad.visible_rect;
    if quad.is_top_edge() && visible.y == rect.y {
        top_edge = device_layer_edges.top;
    }
    if quad.is_left_edge() && visible.x == rect.x {
        left_edge = device_layer_edges.left;
    }
    if quad.is_right_edge() && visible.right() == rect.right() {
        right_edge = device_layer_edges.right;
    }
    if quad.is_bottom_edge() && visible.bottom() == rect.bottom() {
        bottom_edge = device_layer_edges.bottom;
    }

    let sign = if QuadF::from_rect(tile_rect).is_counter_clockwise() {
        -1.0
    } else {
        1.0
    };
    for edge in [&mut bottom_edge, &mut left_edge, &mut top_edge, &mut right_edge] {
        edge.scale(sign);
    }

    let device_quad = LayerQuad::new(left_edge, top_edge, right_edge, bottom_edge);
    // Inflation can push corners behind the eye; the mapped quad is still used.
    let (local_quad, _clipped) = inverse.map_quad(&device_quad.to_quad());

    AntiAliasing {
        use_aa: true,
        local_quad,
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strata_core::{Color, IntRect, IntSize, Material, SharedQuadState};

    fn solid_quad(transform: Transform, rect: IntRect, bounds: IntSize) -> DrawQuad {
        let mut state = SharedQuadState::new(transform, bounds);
        state.visible_content_rect = IntRect::from_size(bounds);
        DrawQuad::new(
            Arc::new(state),
            rect,
            Material::SolidColor { color: Color::RED },
        )
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn edge_distance_is_normalized() {
        let edge = LayerEdge::new(Point::new(0.0, 10.0), Point::new(0.0, 0.0));
        assert!(approx(edge.distance(Point::new(3.0, 5.0)), 3.0));
        assert!(approx(edge.distance(Point::new(-2.0, 5.0)), -2.0));
    }

    #[test]
    fn layer_quad_round_trips_corners() {
        let quad = QuadF::from_rect(Rect::new(2.0, 3.0, 10.0, 6.0));
        let back = LayerQuad::from_quad(&quad).to_quad();
        for (a, b) in quad.points().iter().zip(back.points().iter()) {
            assert!(approx(a.x, b.x) && approx(a.y, b.y), "{a:?} != {b:?}");
        }
    }

    #[test]
    fn inflation_grows_the_quad_by_half_a_pixel() {
        let quad = QuadF::from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        let mut layer = LayerQuad::from_quad(&quad);
        layer.inflate_anti_aliasing_distance();
        let bounds = layer.to_quad().bounding_box();
        assert!(approx(bounds.x(), -0.5));
        assert!(approx(bounds.right(), 10.5));
    }

    #[test]
    fn integer_rect_skips_anti_aliasing() {
        let quad = solid_quad(
            Transform::IDENTITY,
            IntRect::new(0, 0, 100, 100),
            IntSize::new(100, 100),
        );
        let aa = setup_quad_for_antialiasing(&Transform::IDENTITY, &quad);
        assert!(!aa.use_aa);
        assert_eq!(aa.local_quad, QuadF::from_rect(Rect::new(0.0, 0.0, 100.0, 100.0)));
    }

    #[test]
    fn near_integer_rect_skips_anti_aliasing() {
        let quad = solid_quad(
            Transform::IDENTITY,
            IntRect::new(0, 0, 100, 100),
            IntSize::new(100, 100),
        );
        let device = Transform::translation(ANTI_ALIASING_EPSILON * 0.5, 0.0, 0.0);
        assert!(!setup_quad_for_antialiasing(&device, &quad).use_aa);

        let device = Transform::translation(0.25, 0.0, 0.0);
        assert!(setup_quad_for_antialiasing(&device, &quad).use_aa);
    }

    #[test]
    fn rotated_quad_uses_inflated_edges() {
        let mut device = Transform::translation(50.0, 50.0, 0.0);
        device = device * Transform::rotation_z(15.0);
        let quad = solid_quad(device, IntRect::new(0, 0, 40, 40), IntSize::new(40, 40));
        let aa = setup_quad_for_antialiasing(&device, &quad);
        assert!(aa.use_aa);
        assert_eq!(aa.edges.len(), 24);

        // Every corner of the inflated local quad lies outside the tile.
        let tile = Rect::new(0.0, 0.0, 40.0, 40.0);
        let bounds = aa.local_quad.bounding_box();
        assert!(bounds.x() < tile.x() && bounds.right() > tile.right());
        assert!(bounds.y() < tile.y() && bounds.bottom() > tile.bottom());
    }

    #[test]
    fn interior_tiles_are_never_anti_aliased() {
        let device = Transform::rotation_z(15.0);
        let quad = solid_quad(device, IntRect::new(10, 10, 10, 10), IntSize::new(40, 40));
        assert!(!quad.is_edge());
        assert!(!setup_quad_for_antialiasing(&device, &quad).use_aa);
    }

    #[test]
    fn clipped_sides_keep_tight_edges() {
        let device = Transform::translation(0.5, 0.5, 0.0) * Transform::rotation_z(10.0);
        let quad = solid_quad(device, IntRect::new(0, 0, 40, 40), IntSize::new(40, 40))
            .with_visible_rect(IntRect::new(0, 0, 20, 40));
        let aa = setup_quad_for_antialiasing(&device, &quad);
        assert!(aa.use_aa);
        let bounds = aa.local_quad.bounding_box();
        // Left side was inflated, right side stops at the visible rect.
        assert!(bounds.x() < -0.1);
        assert!(approx(aa.local_quad.p2.x, 20.0));
    }
}
