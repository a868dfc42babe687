//! 4x4 transforms between content, target and device space

use std::ops::Mul;

use crate::geometry::{Point, QuadF, Rect};

/// Determinants smaller than this are treated as singular
const SINGULAR_EPSILON: f64 = 1e-12;

/// 4x4 transformation matrix (column-major)
///
/// `translate`/`scale` post-multiply, so the most recently appended
/// operation is applied to points first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub cols: [[f32; 4]; 4],
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [x, y, z, 1.0],
            ],
        }
    }

    pub fn scaling(x: f32, y: f32, z: f32) -> Self {
        Self {
            cols: [
                [x, 0.0, 0.0, 0.0],
                [0.0, y, 0.0, 0.0],
                [0.0, 0.0, z, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Rotation about the z axis, in degrees
    pub fn rotation_z(degrees: f32) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Self {
            cols: [
                [c, s, 0.0, 0.0],
                [-s, c, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.cols[col][row]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.cols[col][row] = value;
    }

    pub fn translate(&mut self, x: f32, y: f32) {
        *self = *self * Transform::translation(x, y, 0.0);
    }

    pub fn scale(&mut self, x: f32, y: f32) {
        *self = *self * Transform::scaling(x, y, 1.0);
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// True for pure translations by whole pixels
    pub fn is_identity_or_integer_translation(&self) -> bool {
        let mut linear = *self;
        linear.cols[3] = [0.0, 0.0, 0.0, 1.0];
        if !linear.is_identity() {
            return false;
        }
        let [x, y, z, _] = self.cols[3];
        x.fract() == 0.0 && y.fract() == 0.0 && z.fract() == 0.0
    }

    /// Drop the z row and column so the transform maps onto the z = 0 plane
    pub fn flatten_to_2d(&mut self) {
        self.set(2, 0, 0.0);
        self.set(2, 1, 0.0);
        self.set(0, 2, 0.0);
        self.set(1, 2, 0.0);
        self.set(2, 2, 1.0);
        self.set(3, 2, 0.0);
        self.set(2, 3, 0.0);
    }

    pub fn to_cols_array(&self) -> [f32; 16] {
        let mut out = [0.0; 16];
        for (c, col) in self.cols.iter().enumerate() {
            out[c * 4..c * 4 + 4].copy_from_slice(col);
        }
        out
    }

    fn determinant_and_adjugate(&self) -> (f64, [f64; 16]) {
        let mut m = [0.0f64; 16];
        for (i, v) in self.to_cols_array().iter().enumerate() {
            m[i] = *v as f64;
        }
        let mut inv = [0.0f64; 16];

        inv[0] = m[5] * m[10] * m[15] - m[5] * m[11] * m[14] - m[9] * m[6] * m[15]
            + m[9] * m[7] * m[14]
            + m[13] * m[6] * m[11]
            - m[13] * m[7] * m[10];
        inv[4] = -m[4] * m[10] * m[15] + m[4] * m[11] * m[14] + m[8] * m[6] * m[15]
            - m[8] * m[7] * m[14]
            - m[12] * m[6] * m[11]
            + m[12] * m[7] * m[10];
        inv[8] = m[4] * m[9] * m[15] - m[4] * m[11] * m[13] - m[8] * m[5] * m[15]
            + m[8] * m[7] * m[13]
            + m[12] * m[5] * m[11]
            - m[12] * m[7] * m[9];
        inv[12] = -m[4] * m[9] * m[14] + m[4] * m[10] * m[13] + m[8] * m[5] * m[14]
            - m[8] * m[6] * m[13]
            - m[12] * m[5] * m[10]
            + m[12] * m[6] * m[9];
        inv[1] = -m[1] * m[10] * m[15] + m[1] * m[11] * m[14] + m[9] * m[2] * m[15]
            - m[9] * m[3] * m[14]
            - m[13] * m[2] * m[11]
            + m[13] * m[3] * m[10];
        inv[5] = m[0] * m[10] * m[15] - m[0] * m[11] * m[14] - m[8] * m[2] * m[15]
            + m[8] * m[3] * m[14]
            + m[12] * m[2] * m[11]
            - m[12] * m[3] * m[10];
        inv[9] = -m[0] * m[9] * m[15] + m[0] * m[11] * m[13] + m[8] * m[1] * m[15]
            - m[8] * m[3] * m[13]
            - m[12] * m[1] * m[11]
            + m[12] * m[3] * m[9];
        inv[13] = m[0] * m[9] * m[14] - m[0] * m[10] * m[13] - m[8] * m[1] * m[14]
            + m[8] * m[2] * m[13]
            + m[12] * m[1] * m[10]
            - m[12] * m[2] * m[9];
        inv[2] = m[1] * m[6] * m[15] - m[1] * m[7] * m[14] - m[5] * m[2] * m[15]
            + m[5] * m[3] * m[14]
            + m[13] * m[2] * m[7]
            - m[13] * m[3] * m[6];
        inv[6] = -m[0] * m[6] * m[15] + m[0] * m[7] * m[14] + m[4] * m[2] * m[15]
            - m[4] * m[3] * m[14]
            - m[12] * m[2] * m[7]
            + m[12] * m[3] * m[6];
        inv[10] = m[0] * m[5] * m[15] - m[0] * m[7] * m[13] - m[4] * m[1] * m[15]
            + m[4] * m[3] * m[13]
            + m[12] * m[1] * m[7]
            - m[12] * m[3] * m[5];
        inv[14] = -m[0] * m[5] * m[14] + m[0] * m[6] * m[13] + m[4] * m[1] * m[14]
            - m[4] * m[2] * m[13]
            - m[12] * m[1] * m[6]
            + m[12] * m[2] * m[5];
        inv[3] = -m[1] * m[6] * m[11] + m[1] * m[7] * m[10] + m[5] * m[2] * m[11]
            - m[5] * m[3] * m[10]
            - m[9] * m[2] * m[7]
            + m[9] * m[3] * m[6];
        inv[7] = m[0] * m[6] * m[11] - m[0] * m[7] * m[10] - m[4] * m[2] * m[11]
            + m[4] * m[3] * m[10]
            + m[8] * m[2] * m[7]
            - m[8] * m[3] * m[6];
        inv[11] = -m[0] * m[5] * m[11] + m[0] * m[7] * m[9] + m[4] * m[1] * m[11]
            - m[4] * m[3] * m[9]
            - m[8] * m[1] * m[7]
            + m[8] * m[3] * m[5];
        inv[15] = m[0] * m[5] * m[10] - m[0] * m[6] * m[9] - m[4] * m[1] * m[10]
            + m[4] * m[2] * m[9]
            + m[8] * m[1] * m[6]
            - m[8] * m[2] * m[5];

        let det = m[0] * inv[0] + m[1] * inv[4] + m[2] * inv[8] + m[3] * inv[12];
        (det, inv)
    }

    pub fn is_invertible(&self) -> bool {
        self.determinant_and_adjugate().0.abs() > SINGULAR_EPSILON
    }

    /// Inverse transform, `None` when singular
    pub fn inverse(&self) -> Option<Transform> {
        let (det, adj) = self.determinant_and_adjugate();
        if det.abs() <= SINGULAR_EPSILON || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;
        let mut out = Transform::IDENTITY;
        for c in 0..4 {
            for r in 0..4 {
                out.cols[c][r] = (adj[c * 4 + r] * inv_det) as f32;
            }
        }
        Some(out)
    }

    /// Map a point on the z = 0 plane, returning the homogeneous result
    fn map_homogeneous(&self, p: Point) -> [f32; 4] {
        let mut out = [0.0; 4];
        for (r, slot) in out.iter_mut().enumerate() {
            *slot = self.cols[0][r] * p.x + self.cols[1][r] * p.y + self.cols[3][r];
        }
        out
    }

    /// Map a point; `None` when it lands behind the eye (w <= 0)
    pub fn map_point(&self, p: Point) -> Option<Point> {
        let [x, y, _, w] = self.map_homogeneous(p);
        if w <= 0.0 {
            return None;
        }
        Some(Point::new(x / w, y / w))
    }

    /// Map a quad; the flag reports whether any corner was clipped by w <= 0
    pub fn map_quad(&self, quad: &QuadF) -> (QuadF, bool) {
        let mut clipped = false;
        let mut map = |p: Point| match self.map_point(p) {
            Some(mapped) => mapped,
            None => {
                clipped = true;
                Point::ZERO
            }
        };
        let mapped = QuadF::new(map(quad.p1), map(quad.p2), map(quad.p3), map(quad.p4));
        (mapped, clipped)
    }

    /// Bounding box of a mapped rect, empty when the mapping was clipped
    pub fn map_rect_bounds(&self, rect: &Rect) -> Rect {
        let (quad, clipped) = self.map_quad(&QuadF::from_rect(*rect));
        if clipped {
            return Rect::ZERO;
        }
        quad.bounding_box()
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, other: Transform) -> Transform {
        let mut result = [[0.0f32; 4]; 4];
        for (i, col) in result.iter_mut().enumerate() {
            for (j, cell) in col.iter_mut().enumerate() {
                for k in 0..4 {
                    *cell += self.cols[k][j] * other.cols[i][k];
                }
            }
        }
        Transform { cols: result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4
    }

    #[test]
    fn translate_then_scale_applies_scale_first() {
        let mut t = Transform::IDENTITY;
        t.translate(10.0, 20.0);
        t.scale(2.0, 3.0);
        let p = t.map_point(Point::new(1.0, 1.0)).unwrap();
        assert!(approx(p, Point::new(12.0, 23.0)));
    }

    #[test]
    fn inverse_round_trips() {
        let mut t = Transform::rotation_z(15.0);
        t.translate(5.0, -3.0);
        t.scale(4.0, 2.0);
        let inv = t.inverse().unwrap();
        let p = Point::new(7.0, 11.0);
        let back = inv.map_point(t.map_point(p).unwrap()).unwrap();
        assert!(approx(back, p));
    }

    #[test]
    fn singular_transform_has_no_inverse() {
        let t = Transform::scaling(0.0, 1.0, 1.0);
        assert!(!t.is_invertible());
        assert!(t.inverse().is_none());
    }

    #[test]
    fn integer_translation_detection() {
        assert!(Transform::IDENTITY.is_identity_or_integer_translation());
        assert!(Transform::translation(3.0, 4.0, 0.0).is_identity_or_integer_translation());
        assert!(!Transform::translation(0.5, 0.0, 0.0).is_identity_or_integer_translation());
        assert!(!Transform::scaling(2.0, 2.0, 1.0).is_identity_or_integer_translation());
    }

    #[test]
    fn flatten_drops_z() {
        let mut t = Transform::IDENTITY;
        t.set(0, 2, 5.0);
        t.set(2, 0, 7.0);
        t.set(2, 2, 3.0);
        t.flatten_to_2d();
        assert_eq!(t, Transform::IDENTITY);
    }
}
