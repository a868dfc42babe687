//! Filter evaluation for render-pass contents and backdrops
//!
//! Filters that reduce to a single color matrix are applied by the
//! render-pass program itself. Everything else goes through a
//! `FilterEvaluator`, which reads the source texture and produces a new
//! image the renderer uploads and draws instead.

use image::RgbaImage;
use strata_core::filter::apply_color_matrix;
use strata_core::{ColorMatrix, FilterOperation, FilterOperations, IntSize};

use crate::context::{GraphicsContext, TextureId};

/// Filter output, rows in the same order as the source texture
#[derive(Clone, Debug, PartialEq)]
pub struct FilteredImage {
    pub size: IntSize,
    pub pixels: RgbaImage,
}

/// Applies a filter chain to the contents of a texture
pub trait FilterEvaluator {
    /// `None` when the chain cannot be evaluated; the caller then draws
    /// unfiltered or skips the effect
    fn apply(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        filters: &FilterOperations,
        source: TextureId,
        size: IntSize,
    ) -> Option<FilteredImage>;
}

/// Evaluator for contexts without a way to run filters
#[derive(Clone, Copy, Debug, Default)]
pub struct NullFilterEvaluator;

impl FilterEvaluator for NullFilterEvaluator {
    fn apply(
        &mut self,
        _ctx: &mut dyn GraphicsContext,
        _filters: &FilterOperations,
        _source: TextureId,
        _size: IntSize,
    ) -> Option<FilteredImage> {
        None
    }
}

/// Evaluates filters on the CPU after reading the source back
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuFilterEvaluator;

impl CpuFilterEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl FilterEvaluator for CpuFilterEvaluator {
    fn apply(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        filters: &FilterOperations,
        source: TextureId,
        size: IntSize,
    ) -> Option<FilteredImage> {
        if filters.is_empty() || size.is_empty() {
            return None;
        }
        let (texture_size, data) = ctx.read_texture(source)?;
        let width = size.width.min(texture_size.width) as u32;
        let height = size.height.min(texture_size.height) as u32;
        let mut pixels = crop(&data, texture_size, width, height);

        let _span = tracing::trace_span!("apply_filters", count = filters.len()).entered();
        for operation in filters.iter() {
            pixels = match *operation {
                FilterOperation::Blur(sigma) => blur_rgba8_premul(&pixels, width, height, sigma),
                FilterOperation::DropShadow { offset, sigma, color } => {
                    let shadow = drop_shadow(
                        &pixels,
                        width,
                        height,
                        (offset.x.round() as i32, offset.y.round() as i32),
                        sigma,
                        color.premultiplied(1.0),
                    );
                    composite_over(&pixels, &shadow)
                }
                ref other => match other.to_color_matrix() {
                    Some(matrix) => apply_matrix(&pixels, &matrix),
                    None => {
                        tracing::debug!("unsupported filter {:?}", other);
                        return None;
                    }
                },
            };
        }

        let pixels = RgbaImage::from_raw(width, height, pixels)?;
        Some(FilteredImage {
            size: IntSize::new(width as i32, height as i32),
            pixels,
        })
    }
}

/// Top-left `width × height` of a texture read back at `texture_size`
fn crop(data: &[u8], texture_size: IntSize, width: u32, height: u32) -> Vec<u8> {
    let stride = texture_size.width as usize * 4;
    let row_len = width as usize * 4;
    let mut out = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        out.extend_from_slice(&data[start..start + row_len]);
    }
    out
}

fn to_unit(v: u8) -> f32 {
    v as f32 / 255.0
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Color matrices operate on unpremultiplied colors
fn apply_matrix(src: &[u8], matrix: &ColorMatrix) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    for px in src.chunks_exact(4) {
        let a = to_unit(px[3]);
        let unpremul = if a > 0.0 {
            [to_unit(px[0]) / a, to_unit(px[1]) / a, to_unit(px[2]) / a, a]
        } else {
            [0.0, 0.0, 0.0, 0.0]
        };
        let [r, g, b, a] = apply_color_matrix(matrix, unpremul);
        out.extend_from_slice(&[to_byte(r * a), to_byte(g * a), to_byte(b * a), to_byte(a)]);
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Blur
// ─────────────────────────────────────────────────────────────────────────────

/// Separable gaussian over premultiplied RGBA8 with clamp-to-edge sampling
pub fn blur_rgba8_premul(src: &[u8], width: u32, height: u32, sigma: f32) -> Vec<u8> {
    let radius = (sigma.max(0.0) * 3.0).ceil() as u32;
    if radius == 0 || !sigma.is_finite() || width == 0 || height == 0 {
        return src.to_vec();
    }
    let kernel = gaussian_kernel_q16(radius, sigma);
    let mut tmp = vec![0u8; src.len()];
    let mut out = vec![0u8; src.len()];
    blur_pass(src, &mut tmp, width, height, &kernel, true);
    blur_pass(&tmp, &mut out, width, height, &kernel, false);
    out
}

/// Normalized kernel in 16.16 fixed point; rounding error goes to the center
fn gaussian_kernel_q16(radius: u32, sigma: f32) -> Vec<u32> {
    let r = radius as i32;
    let denom = 2.0 * (sigma as f64) * (sigma as f64);
    let weights: Vec<f64> = (-r..=r).map(|i| (-(i * i) as f64 / denom).exp()).collect();
    let sum: f64 = weights.iter().sum();

    let mut kernel: Vec<u32> = weights
        .iter()
        .map(|w| ((w / sum) * 65536.0).round().clamp(0.0, 65536.0) as u32)
        .collect();
    let total: i64 = kernel.iter().map(|&w| w as i64).sum();
    let mid = kernel.len() / 2;
    kernel[mid] = (kernel[mid] as i64 + 65536 - total).clamp(0, 65536) as u32;
    kernel
}

fn blur_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, kernel: &[u32], horizontal: bool) {
    let radius = (kernel.len() / 2) as i32;
    let (w, h) = (width as i32, height as i32);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in kernel.iter().enumerate() {
                let d = ki as i32 - radius;
                let (sx, sy) = if horizontal {
                    ((x + d).clamp(0, w - 1), y)
                } else {
                    (x, (y + d).clamp(0, h - 1))
                };
                let idx = ((sy * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += kw as u64 * src[idx + c] as u64;
                }
            }
            let out = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out + c] = ((acc[c] + 32768) >> 16).min(255) as u8;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Drop Shadow
// ─────────────────────────────────────────────────────────────────────────────

/// Blurred copy of the source alpha, moved by `offset` and tinted with the
/// premultiplied `color`
fn drop_shadow(
    src: &[u8],
    width: u32,
    height: u32,
    offset: (i32, i32),
    sigma: f32,
    color: [f32; 4],
) -> Vec<u8> {
    let (w, h) = (width as i32, height as i32);
    let mut shifted = vec![0u8; src.len()];
    for y in 0..h {
        let sy = y - offset.1;
        if sy < 0 || sy >= h {
            continue;
        }
        for x in 0..w {
            let sx = x - offset.0;
            if sx < 0 || sx >= w {
                continue;
            }
            let alpha = to_unit(src[((sy * w + sx) as usize) * 4 + 3]);
            let idx = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                shifted[idx + c] = to_byte(color[c] * alpha);
            }
        }
    }
    blur_rgba8_premul(&shifted, width, height, sigma)
}

/// Source-over of premultiplied `top` onto `bottom`
fn composite_over(top: &[u8], bottom: &[u8]) -> Vec<u8> {
    top.chunks_exact(4)
        .zip(bottom.chunks_exact(4))
        .flat_map(|(t, b)| {
            let inv = 1.0 - to_unit(t[3]);
            [0, 1, 2, 3].map(|c| to_byte(to_unit(t[c]) + to_unit(b[c]) * inv))
        })
        .collect()
}
