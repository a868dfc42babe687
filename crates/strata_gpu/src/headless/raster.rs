//! Per-pixel execution of the program variants
//!
//! Each program kind is evaluated the way its WGSL source reads: the vertex
//! stage runs per index, triangles are rasterized at pixel centers with
//! perspective-correct interpolation and the fragment stage result is
//! blended into the target.

use rustc_hash::FxHashMap;
use strata_core::IntRect;

use super::{HeadlessProgram, HeadlessTexture, PixelBuffer, TEXTURE_UNITS};
use crate::batch::TextureQuadInstance;
use crate::context::{TextureId, TextureTarget};
use crate::program::{ProgramKind, Uniform};

/// Unit quad corners: top-left, top-right, bottom-right, bottom-left
const CORNERS: [[f32; 2]; 4] = [[-0.5, -0.5], [0.5, -0.5], [0.5, 0.5], [-0.5, 0.5]];

const INSTANCE_BYTES: usize = std::mem::size_of::<TextureQuadInstance>();

pub(super) fn target_slot(target: TextureTarget) -> usize {
    match target {
        TextureTarget::Texture2D => 0,
        TextureTarget::External => 1,
    }
}

/// Everything a draw reads
pub(super) struct Pipeline<'a> {
    pub program: &'a HeadlessProgram,
    pub textures: &'a FxHashMap<TextureId, HeadlessTexture>,
    pub bindings: &'a [[Option<TextureId>; 2]; TEXTURE_UNITS],
    pub viewport: IntRect,
    pub scissor: Option<IntRect>,
    pub blend: Option<wgpu::BlendState>,
    pub line_width: f32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Vertex {
    clip: [f32; 4],
    tex: [f32; 2],
    alpha: f32,
}

/// Vertex after the viewport transform
#[derive(Clone, Copy, Debug)]
struct ScreenVertex {
    x: f32,
    y: f32,
    inv_w: f32,
    vertex: Vertex,
}

// ─────────────────────────────────────────────────────────────────────────────
// Math
// ─────────────────────────────────────────────────────────────────────────────

fn mul_mat4(m: &[f32; 16], v: [f32; 4]) -> [f32; 4] {
    let mut out = [0.0; 4];
    for (row, value) in out.iter_mut().enumerate() {
        *value = (0..4).map(|col| m[col * 4 + row] * v[col]).sum();
    }
    out
}

fn mul_mat3(m: &[f32; 9], v: [f32; 3]) -> [f32; 3] {
    let mut out = [0.0; 3];
    for (row, value) in out.iter_mut().enumerate() {
        *value = (0..3).map(|col| m[col * 3 + row] * v[col]).sum();
    }
    out
}

fn scale4(c: [f32; 4], s: f32) -> [f32; 4] {
    c.map(|v| v * s)
}

fn clamp2(v: [f32; 2]) -> [f32; 2] {
    v.map(|c| c.clamp(0.0, 1.0))
}

fn transform2(v: [f32; 2], transform: [f32; 4]) -> [f32; 2] {
    [v[0] * transform[2] + transform[0], v[1] * transform[3] + transform[1]]
}

fn to_unit(v: u8) -> f32 {
    v as f32 / 255.0
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

// ─────────────────────────────────────────────────────────────────────────────
// Sampling
// ─────────────────────────────────────────────────────────────────────────────

fn texel(texture: &HeadlessTexture, x: i32, y: i32) -> [f32; 4] {
    let size = texture.buffer.size();
    let x = x.clamp(0, size.width - 1);
    let y = y.clamp(0, size.height - 1);
    texture
        .buffer
        .pixel(x, y)
        .map(|px| px.map(to_unit))
        .unwrap_or([0.0; 4])
}

/// Clamp-to-edge sample with the texture's filter
fn sample(texture: Option<&HeadlessTexture>, uv: [f32; 2]) -> [f32; 4] {
    let Some(texture) = texture else {
        return [0.0; 4];
    };
    let size = texture.buffer.size();
    if size.is_empty() {
        return [0.0; 4];
    }
    let fx = uv[0] * size.width as f32;
    let fy = uv[1] * size.height as f32;
    match texture.filter {
        wgpu::FilterMode::Nearest => texel(texture, fx.floor() as i32, fy.floor() as i32),
        wgpu::FilterMode::Linear => {
            let fx = fx - 0.5;
            let fy = fy - 0.5;
            let x0 = fx.floor();
            let y0 = fy.floor();
            let tx = fx - x0;
            let ty = fy - y0;
            let (x0, y0) = (x0 as i32, y0 as i32);
            let a = texel(texture, x0, y0);
            let b = texel(texture, x0 + 1, y0);
            let c = texel(texture, x0, y0 + 1);
            let d = texel(texture, x0 + 1, y0 + 1);
            let mut out = [0.0; 4];
            for i in 0..4 {
                let top = a[i] + (b[i] - a[i]) * tx;
                let bottom = c[i] + (d[i] - c[i]) * tx;
                out[i] = top + (bottom - top) * ty;
            }
            out
        }
    }
}

impl Pipeline<'_> {
    fn bound(&self, unit: i32, target: TextureTarget) -> Option<&HeadlessTexture> {
        let unit = usize::try_from(unit).ok().filter(|unit| *unit < TEXTURE_UNITS)?;
        let texture = self.bindings[unit][target_slot(target)]?;
        self.textures.get(&texture)
    }

    fn sample_unit(&self, sampler: Uniform, target: TextureTarget, uv: [f32; 2]) -> [f32; 4] {
        sample(self.bound(self.program.int(sampler), target), uv)
    }

    fn instance(&self, index: usize) -> TextureQuadInstance {
        let start = index * INSTANCE_BYTES;
        self.program
            .block
            .get(start..start + INSTANCE_BYTES)
            .map(bytemuck::pod_read_unaligned)
            .unwrap_or_default()
    }

    /// Coverage from the eight edge equations at `frag`
    fn edge_coverage(&self, frag: [f32; 2]) -> f32 {
        let a: [f32; 8] = std::array::from_fn(|i| {
            let e = self.program.vec3_at(Uniform::Edge, i);
            (e[0] * frag[0] + e[1] * frag[1] + e[2]).clamp(0.0, 1.0)
        });
        (a[0].min(a[2]) * a[1].min(a[3])).min(a[4].min(a[6]) * a[5].min(a[7]))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stages
    // ─────────────────────────────────────────────────────────────────────────

    fn vertex(&self, vertex_index: u32) -> Vertex {
        let program = self.program;
        let corner = (vertex_index % 4) as usize;
        let unit = CORNERS[corner];
        let position = |pos: [f32; 2], matrix: &[f32; 16]| -> [f32; 4] {
            mul_mat4(matrix, [pos[0], pos[1], 0.0, 1.0])
        };
        let matrix = program.mat4(Uniform::Matrix);
        let offset_unit = [unit[0] + 0.5, unit[1] + 0.5];

        match program.key.kind {
            ProgramKind::SolidColor { .. } => Vertex {
                clip: position(program.vec2_at(Uniform::Quad, corner), &matrix),
                ..Vertex::default()
            },
            ProgramKind::Tile { .. } => {
                let pos = program.vec2_at(Uniform::Quad, corner);
                Vertex {
                    clip: position(pos, &matrix),
                    tex: transform2(pos, program.vec4(Uniform::VertexTexTransform)),
                    alpha: 0.0,
                }
            }
            ProgramKind::DebugBorder => Vertex {
                clip: position(unit, &matrix),
                ..Vertex::default()
            },
            ProgramKind::Checkerboard => Vertex {
                clip: position(unit, &matrix),
                tex: offset_unit,
                alpha: 0.0,
            },
            ProgramKind::Texture { flip } => {
                let instance = self.instance(vertex_index as usize / 4);
                let mut tex = [
                    instance.uv[0] + offset_unit[0] * instance.uv[2],
                    instance.uv[1] + offset_unit[1] * instance.uv[3],
                ];
                if flip {
                    tex[1] = 1.0 - tex[1];
                }
                Vertex {
                    clip: position(unit, &instance.matrix),
                    tex,
                    alpha: instance.opacity[corner],
                }
            }
            ProgramKind::RenderPass { aa: true, .. } => {
                let pos = program.vec2_at(Uniform::Quad, corner);
                let scale = program.vec2(Uniform::TexScale);
                Vertex {
                    clip: position(pos, &matrix),
                    tex: [(pos[0] + 0.5) * scale[0], (pos[1] + 0.5) * scale[1]],
                    alpha: 0.0,
                }
            }
            ProgramKind::RenderPass { aa: false, .. } => Vertex {
                clip: position(unit, &matrix),
                tex: transform2(offset_unit, program.vec4(Uniform::TexTransform)),
                alpha: 0.0,
            },
            ProgramKind::YuvVideo => {
                let scale = program.vec2(Uniform::TexScale);
                Vertex {
                    clip: position(unit, &matrix),
                    tex: [offset_unit[0] * scale[0], offset_unit[1] * scale[1]],
                    alpha: 0.0,
                }
            }
            ProgramKind::StreamVideo => {
                let tex = mul_mat4(
                    &program.mat4(Uniform::TexMatrix),
                    [offset_unit[0], offset_unit[1], 0.0, 1.0],
                );
                Vertex {
                    clip: position(unit, &matrix),
                    tex: [tex[0], tex[1]],
                    alpha: 0.0,
                }
            }
        }
    }

    fn fragment(&self, input: &Vertex, frag: [f32; 2]) -> [f32; 4] {
        let program = self.program;
        let alpha = program.float(Uniform::Alpha);
        match program.key.kind {
            ProgramKind::SolidColor { aa: false } | ProgramKind::DebugBorder => program.vec4(Uniform::Color),
            ProgramKind::SolidColor { aa: true } => {
                scale4(program.vec4(Uniform::Color), self.edge_coverage(frag))
            }
            ProgramKind::Checkerboard => {
                let tex = transform2(clamp2(input.tex), program.vec4(Uniform::TexTransform));
                let frequency = program.float(Uniform::Frequency);
                let cell = tex.map(|t| (t * frequency * 2.0).floor());
                let coord = cell.map(|c| c - 2.0 * (c / 2.0).floor());
                let picker = (coord[0] - coord[1]).abs();
                let color = program.vec4(Uniform::Color);
                let mixed: [f32; 4] = std::array::from_fn(|i| 1.0 + (color[i] - 1.0) * picker);
                scale4(mixed, alpha)
            }
            ProgramKind::Tile { aa, swizzle, opaque } => {
                let tex = if aa {
                    transform2(clamp2(input.tex), program.vec4(Uniform::FragmentTexTransform))
                } else {
                    input.tex
                };
                let mut sampled = self.sample_unit(Uniform::Sampler, TextureTarget::Texture2D, tex);
                if swizzle {
                    sampled = [sampled[2], sampled[1], sampled[0], sampled[3]];
                }
                if opaque {
                    [sampled[0], sampled[1], sampled[2], 1.0]
                } else if aa {
                    scale4(sampled, alpha * self.edge_coverage(frag))
                } else {
                    scale4(sampled, alpha)
                }
            }
            ProgramKind::Texture { .. } => scale4(
                self.sample_unit(Uniform::Sampler, TextureTarget::Texture2D, input.tex),
                input.alpha,
            ),
            ProgramKind::RenderPass { aa, mask, color_matrix } => {
                let mut color = self.sample_unit(Uniform::Sampler, TextureTarget::Texture2D, input.tex);
                let mut mask_alpha = 1.0;
                if mask {
                    let offset = program.vec2(Uniform::MaskTexCoordOffset);
                    let scale = program.vec2(Uniform::MaskTexCoordScale);
                    let coord = [
                        offset[0] + input.tex[0] * scale[0],
                        offset[1] + input.tex[1] * scale[1],
                    ];
                    mask_alpha = self.sample_unit(Uniform::MaskSampler, TextureTarget::Texture2D, coord)[3];
                }
                if color_matrix {
                    color = self.apply_color_matrix(color);
                }
                color = scale4(color, alpha * mask_alpha);
                if aa {
                    color = scale4(color, self.edge_coverage(frag));
                }
                color
            }
            ProgramKind::YuvVideo => {
                let y = self.sample_unit(Uniform::YTexture, TextureTarget::Texture2D, input.tex)[0];
                let u = self.sample_unit(Uniform::UTexture, TextureTarget::Texture2D, input.tex)[0];
                let v = self.sample_unit(Uniform::VTexture, TextureTarget::Texture2D, input.tex)[0];
                let adjust = program.vec3(Uniform::YuvAdjust);
                let rgb = mul_mat3(
                    &program.mat3(Uniform::YuvMatrix),
                    [y + adjust[0], u + adjust[1], v + adjust[2]],
                );
                scale4([rgb[0], rgb[1], rgb[2], 1.0], alpha)
            }
            ProgramKind::StreamVideo => scale4(
                self.sample_unit(Uniform::Sampler, TextureTarget::External, input.tex),
                alpha,
            ),
        }
    }

    /// Color matrix applied to the unpremultiplied color
    fn apply_color_matrix(&self, color: [f32; 4]) -> [f32; 4] {
        let a = color[3].max(0.00001);
        let straight = [color[0] / a, color[1] / a, color[2] / a, color[3]];
        let matrix = self.program.mat4(Uniform::ColorMatrix);
        let offset = self.program.vec4(Uniform::ColorOffset);
        let mut out = mul_mat4(&matrix, straight);
        for (value, offset) in out.iter_mut().zip(offset) {
            *value = (*value + offset).clamp(0.0, 1.0);
        }
        [out[0] * out[3], out[1] * out[3], out[2] * out[3], out[3]]
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Output
    // ─────────────────────────────────────────────────────────────────────────

    /// Pixels a draw into `target` may touch
    fn clip_bounds(&self, target: &PixelBuffer) -> IntRect {
        let mut bounds = self.viewport.intersect(&target.bounds());
        if let Some(scissor) = self.scissor {
            bounds = bounds.intersect(&scissor);
        }
        bounds
    }

    fn to_screen(&self, vertex: Vertex) -> Option<ScreenVertex> {
        let w = vertex.clip[3];
        if w <= 0.0 {
            return None;
        }
        let ndc_x = vertex.clip[0] / w;
        let ndc_y = vertex.clip[1] / w;
        Some(ScreenVertex {
            x: self.viewport.x as f32 + (ndc_x + 1.0) * 0.5 * self.viewport.width as f32,
            y: self.viewport.y as f32 + (ndc_y + 1.0) * 0.5 * self.viewport.height as f32,
            inv_w: 1.0 / w,
            vertex,
        })
    }

    fn write(&self, target: &mut PixelBuffer, x: i32, y: i32, src: [f32; 4]) {
        let Some(dst) = target.pixel(x, y) else {
            return;
        };
        let out = match &self.blend {
            Some(state) => blend(state, src, dst.map(to_unit)),
            None => src,
        };
        target.set_pixel(x, y, out.map(to_byte));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Blending
// ─────────────────────────────────────────────────────────────────────────────

fn factor(factor: wgpu::BlendFactor, src: [f32; 4], dst: [f32; 4], channel: usize) -> f32 {
    use wgpu::BlendFactor as F;
    match factor {
        F::Zero => 0.0,
        F::One => 1.0,
        F::Src | F::Src1 => src[channel],
        F::OneMinusSrc | F::OneMinusSrc1 => 1.0 - src[channel],
        F::SrcAlpha | F::Src1Alpha => src[3],
        F::OneMinusSrcAlpha | F::OneMinusSrc1Alpha => 1.0 - src[3],
        F::Dst => dst[channel],
        F::OneMinusDst => 1.0 - dst[channel],
        F::DstAlpha => dst[3],
        F::OneMinusDstAlpha => 1.0 - dst[3],
        F::SrcAlphaSaturated => {
            if channel == 3 {
                1.0
            } else {
                src[3].min(1.0 - dst[3])
            }
        }
        // The blend constant is never set and stays transparent black.
        F::Constant => 0.0,
        F::OneMinusConstant => 1.0,
    }
}

fn blend(state: &wgpu::BlendState, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    std::array::from_fn(|channel| {
        let component = if channel == 3 { &state.alpha } else { &state.color };
        let s = src[channel] * factor(component.src_factor, src, dst, channel);
        let d = dst[channel] * factor(component.dst_factor, src, dst, channel);
        match component.operation {
            wgpu::BlendOperation::Add => s + d,
            wgpu::BlendOperation::Subtract => s - d,
            wgpu::BlendOperation::ReverseSubtract => d - s,
            wgpu::BlendOperation::Min => src[channel].min(dst[channel]),
            wgpu::BlendOperation::Max => src[channel].max(dst[channel]),
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Rasterization
// ─────────────────────────────────────────────────────────────────────────────

fn edge(a: &ScreenVertex, b: &ScreenVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Perspective-correct varyings at `(px, py)`, or `None` outside the triangle
fn interpolate(tri: &[ScreenVertex; 3], px: f32, py: f32) -> Option<Vertex> {
    let area = edge(&tri[0], &tri[1], tri[2].x, tri[2].y);
    if area == 0.0 {
        return None;
    }
    let l0 = edge(&tri[1], &tri[2], px, py) / area;
    let l1 = edge(&tri[2], &tri[0], px, py) / area;
    let l2 = edge(&tri[0], &tri[1], px, py) / area;
    if l0 < 0.0 || l1 < 0.0 || l2 < 0.0 {
        return None;
    }
    let weights = [l0 * tri[0].inv_w, l1 * tri[1].inv_w, l2 * tri[2].inv_w];
    let total: f32 = weights.iter().sum();
    if total == 0.0 {
        return None;
    }
    let mut out = Vertex {
        clip: [px, py, 0.0, 1.0],
        ..Vertex::default()
    };
    for (weight, v) in weights.iter().zip(tri) {
        let weight = weight / total;
        out.tex[0] += weight * v.vertex.tex[0];
        out.tex[1] += weight * v.vertex.tex[1];
        out.alpha += weight * v.vertex.alpha;
    }
    Some(out)
}

/// Draw indexed triangles, six indices per quad
///
/// Each pixel is shaded at most once per quad so the diagonal shared by a
/// quad's two triangles is not blended twice.
pub(super) fn draw_triangles(pipeline: &Pipeline<'_>, target: &mut PixelBuffer, indices: &[u16]) {
    let clip = pipeline.clip_bounds(target);
    if clip.is_empty() {
        return;
    }
    for quad in indices.chunks(6) {
        let triangles: Vec<[ScreenVertex; 3]> = quad
            .chunks_exact(3)
            .filter_map(|tri| {
                Some([
                    pipeline.to_screen(pipeline.vertex(tri[0] as u32))?,
                    pipeline.to_screen(pipeline.vertex(tri[1] as u32))?,
                    pipeline.to_screen(pipeline.vertex(tri[2] as u32))?,
                ])
            })
            .collect();
        let Some(bounds) = screen_bounds(triangles.iter().flatten()) else {
            continue;
        };
        let bounds = bounds.intersect(&clip);
        for y in bounds.y..bounds.bottom() {
            for x in bounds.x..bounds.right() {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let Some(input) = triangles.iter().find_map(|tri| interpolate(tri, px, py)) else {
                    continue;
                };
                let color = pipeline.fragment(&input, [px, py]);
                pipeline.write(target, x, y, color);
            }
        }
    }
}

/// Integer rect enclosing `vertices`
fn screen_bounds<'a>(vertices: impl Iterator<Item = &'a ScreenVertex>) -> Option<IntRect> {
    let mut min = [f32::INFINITY; 2];
    let mut max = [f32::NEG_INFINITY; 2];
    for v in vertices {
        min = [min[0].min(v.x), min[1].min(v.y)];
        max = [max[0].max(v.x), max[1].max(v.y)];
    }
    if !min[0].is_finite() || !max[0].is_finite() || !min[1].is_finite() || !max[1].is_finite() {
        return None;
    }
    let x = min[0].floor() as i32;
    let y = min[1].floor() as i32;
    Some(IntRect::new(
        x,
        y,
        max[0].ceil() as i32 - x,
        max[1].ceil() as i32 - y,
    ))
}

/// Draw a closed line strip through the indexed vertices
pub(super) fn draw_line_loop(pipeline: &Pipeline<'_>, target: &mut PixelBuffer, indices: &[u16]) {
    let clip = pipeline.clip_bounds(target);
    if clip.is_empty() || indices.len() < 2 {
        return;
    }
    let Some(points) = indices
        .iter()
        .map(|index| pipeline.to_screen(pipeline.vertex(*index as u32)))
        .collect::<Option<Vec<_>>>()
    else {
        return;
    };

    let width = pipeline.line_width.max(1.0).round() as i32;
    let mut covered = rustc_hash::FxHashSet::default();
    for (i, a) in points.iter().enumerate() {
        let b = &points[(i + 1) % points.len()];
        let steps = (b.x - a.x).abs().max((b.y - a.y).abs()).ceil().max(1.0) as i32;
        for step in 0..steps {
            let t = (step as f32 + 0.5) / steps as f32;
            let x = (a.x + (b.x - a.x) * t).floor() as i32;
            let y = (a.y + (b.y - a.y) * t).floor() as i32;
            for dy in 0..width {
                for dx in 0..width {
                    let (px, py) = (x + dx - width / 2, y + dy - width / 2);
                    if clip.contains(&IntRect::new(px, py, 1, 1)) && covered.insert((px, py)) {
                        let color = pipeline.fragment(&a.vertex, [px as f32 + 0.5, py as f32 + 0.5]);
                        pipeline.write(target, px, py, color);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PREMULTIPLIED_BLEND, STRAIGHT_ALPHA_BLEND};

    #[test]
    fn premultiplied_source_over() {
        let out = blend(&PREMULTIPLIED_BLEND, [0.5, 0.0, 0.0, 0.5], [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(out, [0.5, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn straight_alpha_keeps_destination_alpha() {
        let out = blend(&STRAIGHT_ALPHA_BLEND, [1.0, 0.0, 0.0, 0.5], [0.0, 0.0, 0.0, 0.25]);
        assert_eq!(out, [0.5, 0.0, 0.0, 0.25]);
    }

    #[test]
    fn column_major_products() {
        let mut m = [0.0; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        m[12] = 3.0;
        assert_eq!(mul_mat4(&m, [1.0, 2.0, 0.0, 1.0]), [4.0, 2.0, 0.0, 1.0]);

        let yuv = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 1.0];
        assert_eq!(mul_mat3(&yuv, [1.0, 1.0, 1.0]), [1.0, 3.0, 1.0]);
    }

    #[test]
    fn screen_bounds_enclose_fractional_vertices() {
        let v = |x, y| ScreenVertex {
            x,
            y,
            inv_w: 1.0,
            vertex: Vertex::default(),
        };
        let points = [v(0.5, 1.25), v(3.5, 4.0)];
        assert_eq!(screen_bounds(points.iter()), Some(IntRect::new(0, 1, 4, 3)));
    }
}
