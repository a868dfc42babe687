//! Filter operations attached to render-pass quads
//!
//! A filter chain either reduces to a single affine color transform, which
//! the renderer applies in-shader, or has to be evaluated off-screen by a
//! filter evaluator. Color matrices are 4x5 row-major (`[f32; 20]`): each
//! output channel is a weighted sum of the straight-alpha input channels
//! plus an offset in 0..=1 units.

use smallvec::SmallVec;

use crate::color::Color;
use crate::geometry::Point;

/// 4x5 row-major color matrix
pub type ColorMatrix = [f32; 20];

/// Identity color matrix
pub const IDENTITY_COLOR_MATRIX: ColorMatrix = [
    1.0, 0.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 0.0, 1.0, 0.0,
];

// Luminance weights (ITU-R BT.709)
const LUMA_R: f32 = 0.2126;
const LUMA_G: f32 = 0.7152;
const LUMA_B: f32 = 0.0722;

// ─────────────────────────────────────────────────────────────────────────────
// Filter Operations
// ─────────────────────────────────────────────────────────────────────────────

/// One step of a filter chain
#[derive(Clone, Debug, PartialEq)]
pub enum FilterOperation {
    Grayscale(f32),
    Sepia(f32),
    Saturate(f32),
    /// Rotation in degrees
    HueRotate(f32),
    Invert(f32),
    Brightness(f32),
    Contrast(f32),
    Opacity(f32),
    /// Gaussian blur with the given standard deviation in pixels
    Blur(f32),
    DropShadow {
        offset: Point,
        sigma: f32,
        color: Color,
    },
    ColorMatrix(ColorMatrix),
}

impl FilterOperation {
    /// Matrix form of this operation, `None` for operations that move pixels
    pub fn to_color_matrix(&self) -> Option<ColorMatrix> {
        let matrix = match *self {
            FilterOperation::Grayscale(amount) => lerp_matrix(&grayscale_matrix(), amount),
            FilterOperation::Sepia(amount) => lerp_matrix(&sepia_matrix(), amount),
            FilterOperation::Saturate(amount) => saturation_matrix(amount),
            FilterOperation::HueRotate(degrees) => hue_rotate_matrix(degrees),
            FilterOperation::Invert(amount) => lerp_matrix(&invert_matrix(), amount),
            FilterOperation::Brightness(amount) => brightness_matrix(amount),
            FilterOperation::Contrast(amount) => contrast_matrix(amount),
            FilterOperation::Opacity(amount) => opacity_matrix(amount),
            FilterOperation::ColorMatrix(matrix) => matrix,
            FilterOperation::Blur(_) | FilterOperation::DropShadow { .. } => return None,
        };
        Some(matrix)
    }

    pub fn moves_pixels(&self) -> bool {
        matches!(
            self,
            FilterOperation::Blur(_) | FilterOperation::DropShadow { .. }
        )
    }
}

/// Pixel margins a filter chain needs around its input
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterOutsets {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

/// Ordered filter chain
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterOperations {
    operations: SmallVec<[FilterOperation; 2]>,
}

impl FilterOperations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: FilterOperation) {
        self.operations.push(operation);
    }

    pub fn with(mut self, operation: FilterOperation) -> Self {
        self.push(operation);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterOperation> {
        self.operations.iter()
    }

    pub fn has_filter_that_moves_pixels(&self) -> bool {
        self.operations.iter().any(FilterOperation::moves_pixels)
    }

    /// Compose the chain into one color matrix when every step is affine
    pub fn to_color_matrix(&self) -> Option<ColorMatrix> {
        if self.operations.is_empty() {
            return None;
        }
        let mut combined = IDENTITY_COLOR_MATRIX;
        for operation in &self.operations {
            let matrix = operation.to_color_matrix()?;
            combined = concat_color_matrices(&matrix, &combined);
        }
        Some(combined)
    }

    /// Margins needed so pixel-moving filters have room to spread
    pub fn outsets(&self) -> FilterOutsets {
        let mut outsets = FilterOutsets::default();
        for operation in &self.operations {
            match *operation {
                FilterOperation::Blur(sigma) => {
                    let spread = blur_spread(sigma);
                    outsets.top = outsets.top.max(spread);
                    outsets.right = outsets.right.max(spread);
                    outsets.bottom = outsets.bottom.max(spread);
                    outsets.left = outsets.left.max(spread);
                }
                FilterOperation::DropShadow { offset, sigma, .. } => {
                    let spread = blur_spread(sigma);
                    let dx = offset.x.round() as i32;
                    let dy = offset.y.round() as i32;
                    outsets.top = outsets.top.max(spread - dy);
                    outsets.right = outsets.right.max(spread + dx);
                    outsets.bottom = outsets.bottom.max(spread + dy);
                    outsets.left = outsets.left.max(spread - dx);
                }
                _ => {}
            }
        }
        outsets
    }
}

impl FromIterator<FilterOperation> for FilterOperations {
    fn from_iter<I: IntoIterator<Item = FilterOperation>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

/// Three standard deviations covers the visible falloff
fn blur_spread(sigma: f32) -> i32 {
    (sigma.max(0.0) * 3.0).ceil() as i32
}

// ─────────────────────────────────────────────────────────────────────────────
// Color Matrix Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// `outer ∘ inner`: apply `inner` first, then `outer`
pub fn concat_color_matrices(outer: &ColorMatrix, inner: &ColorMatrix) -> ColorMatrix {
    let mut out = [0.0; 20];
    for row in 0..4 {
        for col in 0..5 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += outer[row * 5 + k] * inner[k * 5 + col];
            }
            if col == 4 {
                sum += outer[row * 5 + 4];
            }
            out[row * 5 + col] = sum;
        }
    }
    out
}

/// Blend between identity (amount 0) and `full` (amount 1)
fn lerp_matrix(full: &ColorMatrix, amount: f32) -> ColorMatrix {
    let t = amount.clamp(0.0, 1.0);
    let mut out = [0.0; 20];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = IDENTITY_COLOR_MATRIX[i] + (full[i] - IDENTITY_COLOR_MATRIX[i]) * t;
    }
    out
}

/// Create grayscale color matrix
pub fn grayscale_matrix() -> ColorMatrix {
    let (r, g, b) = (LUMA_R, LUMA_G, LUMA_B);
    [
        r, g, b, 0.0, 0.0, r, g, b, 0.0, 0.0, r, g, b, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
    ]
}

/// Create sepia tone color matrix
pub fn sepia_matrix() -> ColorMatrix {
    [
        0.393, 0.769, 0.189, 0.0, 0.0, 0.349, 0.686, 0.168, 0.0, 0.0, 0.272, 0.534, 0.131, 0.0,
        0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
    ]
}

/// Create saturation adjustment matrix
pub fn saturation_matrix(saturation: f32) -> ColorMatrix {
    let s = saturation;
    let sr = (1.0 - s) * LUMA_R;
    let sg = (1.0 - s) * LUMA_G;
    let sb = (1.0 - s) * LUMA_B;
    [
        sr + s,
        sg,
        sb,
        0.0,
        0.0,
        sr,
        sg + s,
        sb,
        0.0,
        0.0,
        sr,
        sg,
        sb + s,
        0.0,
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
        0.0,
    ]
}

/// Create hue rotation matrix, angle in degrees
pub fn hue_rotate_matrix(degrees: f32) -> ColorMatrix {
    let (s, c) = degrees.to_radians().sin_cos();
    [
        0.213 + c * 0.787 - s * 0.213,
        0.715 - c * 0.715 - s * 0.715,
        0.072 - c * 0.072 + s * 0.928,
        0.0,
        0.0,
        0.213 - c * 0.213 + s * 0.143,
        0.715 + c * 0.285 + s * 0.140,
        0.072 - c * 0.072 - s * 0.283,
        0.0,
        0.0,
        0.213 - c * 0.213 - s * 0.787,
        0.715 - c * 0.715 + s * 0.715,
        0.072 + c * 0.928 + s * 0.072,
        0.0,
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
        0.0,
    ]
}

/// Create brightness adjustment matrix (1 = no change)
pub fn brightness_matrix(brightness: f32) -> ColorMatrix {
    let b = brightness;
    [
        b, 0.0, 0.0, 0.0, 0.0, 0.0, b, 0.0, 0.0, 0.0, 0.0, 0.0, b, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        0.0,
    ]
}

/// Create contrast adjustment matrix
pub fn contrast_matrix(contrast: f32) -> ColorMatrix {
    let c = contrast;
    let t = (1.0 - c) / 2.0;
    [
        c, 0.0, 0.0, 0.0, t, 0.0, c, 0.0, 0.0, t, 0.0, 0.0, c, 0.0, t, 0.0, 0.0, 0.0, 1.0, 0.0,
    ]
}

/// Create invert color matrix
pub fn invert_matrix() -> ColorMatrix {
    [
        -1.0, 0.0, 0.0, 0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 1.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0, 0.0,
        0.0, 1.0, 0.0,
    ]
}

/// Create alpha scaling matrix
pub fn opacity_matrix(opacity: f32) -> ColorMatrix {
    let mut m = IDENTITY_COLOR_MATRIX;
    m[18] = opacity.clamp(0.0, 1.0);
    m
}

/// Apply a color matrix to one straight-alpha RGBA color
pub fn apply_color_matrix(matrix: &ColorMatrix, rgba: [f32; 4]) -> [f32; 4] {
    let mut out = [0.0; 4];
    for (row, slot) in out.iter_mut().enumerate() {
        let m = &matrix[row * 5..row * 5 + 5];
        *slot = (m[0] * rgba[0] + m[1] * rgba[1] + m[2] * rgba[2] + m[3] * rgba[3] + m[4])
            .clamp(0.0, 1.0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affine_chain_collapses_to_one_matrix() {
        let filters = FilterOperations::new()
            .with(FilterOperation::Grayscale(1.0))
            .with(FilterOperation::Opacity(0.5));
        let matrix = filters.to_color_matrix().unwrap();
        let out = apply_color_matrix(&matrix, [1.0, 0.0, 0.0, 1.0]);
        assert!((out[0] - LUMA_R).abs() < 1e-5);
        assert!((out[3] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn blur_prevents_matrix_collapse() {
        let filters = FilterOperations::new()
            .with(FilterOperation::Grayscale(1.0))
            .with(FilterOperation::Blur(2.0));
        assert!(filters.to_color_matrix().is_none());
        assert!(filters.has_filter_that_moves_pixels());
    }

    #[test]
    fn empty_chain_has_no_matrix() {
        assert!(FilterOperations::new().to_color_matrix().is_none());
    }

    #[test]
    fn concat_applies_inner_first() {
        let inner = invert_matrix();
        let outer = opacity_matrix(0.5);
        let combined = concat_color_matrices(&outer, &inner);
        let stepwise = apply_color_matrix(&outer, apply_color_matrix(&inner, [0.2, 0.4, 0.6, 1.0]));
        let direct = apply_color_matrix(&combined, [0.2, 0.4, 0.6, 1.0]);
        for i in 0..4 {
            assert!((stepwise[i] - direct[i]).abs() < 1e-5);
        }
    }

    #[test]
    fn blur_outsets_are_symmetric() {
        let filters = FilterOperations::new().with(FilterOperation::Blur(2.0));
        assert_eq!(
            filters.outsets(),
            FilterOutsets {
                top: 6,
                right: 6,
                bottom: 6,
                left: 6
            }
        );
    }

    #[test]
    fn drop_shadow_outsets_follow_offset() {
        let filters = FilterOperations::new().with(FilterOperation::DropShadow {
            offset: Point::new(4.0, -2.0),
            sigma: 1.0,
            color: Color::BLACK,
        });
        let outsets = filters.outsets();
        assert_eq!(outsets.right, 7);
        assert_eq!(outsets.left, 0);
        assert_eq!(outsets.top, 5);
        assert_eq!(outsets.bottom, 1);
    }
}
