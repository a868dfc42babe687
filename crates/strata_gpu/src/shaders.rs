//! WGSL sources for every program variant
//!
//! Sources are assembled from small fragments keyed on the program's
//! feature flags, so each variant is a straight-line shader with no runtime
//! branches. Every program shares one layout:
//!
//! - `@group(0) @binding(0)`: the `Uniforms` block
//! - `@binding(1..=2)`: main texture and sampler
//! - `@binding(3..=4)`: mask texture and sampler
//! - `@binding(1..=6)`: Y, U and V planes for video
//!
//! Vertices carry no attributes. The vertex stage derives the corner from
//! `vertex_index` (top-left, top-right, bottom-right, bottom-left of the
//! unit quad centered on the origin) and, for batched textures, the batch
//! slot from `vertex_index / 4`.

use std::fmt::Write;

use crate::error::ShaderError;
use crate::program::{ProgramKey, ProgramKind, TexCoordPrecision, Uniform};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Fragments
// ─────────────────────────────────────────────────────────────────────────────

const QUAD_INSTANCE: &str = r#"
struct QuadInstance {
    matrix: mat4x4<f32>,
    uv: vec4<f32>,
    opacity: vec4<f32>,
}
"#;

/// Coverage from eight signed edge distances in window space: the tight quad
/// edges followed by the bounding box edges, each ordered left, top, right,
/// bottom
const EDGE_COVERAGE: &str = r#"
fn edge_distance(i: u32, frag: vec2<f32>) -> f32 {
    return clamp(dot(u.edge[i].xyz, vec3<f32>(frag, 1.0)), 0.0, 1.0);
}

fn edge_coverage(frag: vec2<f32>) -> f32 {
    let a0 = edge_distance(0u, frag);
    let a1 = edge_distance(1u, frag);
    let a2 = edge_distance(2u, frag);
    let a3 = edge_distance(3u, frag);
    let a4 = edge_distance(4u, frag);
    let a5 = edge_distance(5u, frag);
    let a6 = edge_distance(6u, frag);
    let a7 = edge_distance(7u, frag);
    return min(min(a0, a2) * min(a1, a3), min(a4, a6) * min(a5, a7));
}
"#;

const UNPREMULTIPLIED_COLOR_MATRIX: &str = r#"
fn apply_color_matrix(color: vec4<f32>) -> vec4<f32> {
    let straight = vec4<f32>(color.rgb / max(color.a, 0.00001), color.a);
    let transformed = clamp(u.color_matrix * straight + u.color_offset, vec4<f32>(0.0), vec4<f32>(1.0));
    return vec4<f32>(transformed.rgb * transformed.a, transformed.a);
}
"#;

// ─────────────────────────────────────────────────────────────────────────────
// Uniform Block
// ─────────────────────────────────────────────────────────────────────────────

/// WGSL type of a data uniform; samplers live outside the block
fn wgsl_type(uniform: Uniform) -> Option<&'static str> {
    let ty = match uniform {
        Uniform::Matrix | Uniform::ColorMatrix | Uniform::TexMatrix => "mat4x4<f32>",
        Uniform::Quad => "array<vec4<f32>, 4>",
        Uniform::Edge => "array<vec4<f32>, 8>",
        Uniform::Instances => "array<QuadInstance, 8>",
        Uniform::YuvMatrix => "mat3x3<f32>",
        Uniform::Color
        | Uniform::ColorOffset
        | Uniform::VertexTexTransform
        | Uniform::FragmentTexTransform
        | Uniform::TexTransform => "vec4<f32>",
        Uniform::YuvAdjust => "vec3<f32>",
        Uniform::TexScale | Uniform::MaskTexCoordScale | Uniform::MaskTexCoordOffset => "vec2<f32>",
        Uniform::Alpha | Uniform::Frequency => "f32",
        Uniform::Sampler
        | Uniform::MaskSampler
        | Uniform::YTexture
        | Uniform::UTexture
        | Uniform::VTexture => return None,
    };
    Some(ty)
}

fn alignment(uniform: Uniform) -> u32 {
    match wgsl_type(uniform) {
        Some("vec2<f32>") => 8,
        Some("f32") => 4,
        _ => 16,
    }
}

fn uniform_block(kind: &ProgramKind) -> String {
    let mut fields: Vec<Uniform> = kind
        .uniforms()
        .into_iter()
        .filter(|uniform| !uniform.is_sampler())
        .collect();
    fields.sort_by_key(|uniform| std::cmp::Reverse(alignment(*uniform)));

    let mut out = String::from("struct Uniforms {\n");
    for uniform in fields {
        if let Some(ty) = wgsl_type(uniform) {
            let _ = writeln!(out, "    {}: {},", uniform.name(), ty);
        }
    }
    out.push_str("}\n\n@group(0) @binding(0) var<uniform> u: Uniforms;\n");
    out
}

fn texture_bindings(kind: &ProgramKind) -> String {
    let mut out = String::new();
    let uniforms = kind.uniforms();
    if uniforms.contains(&Uniform::Sampler) {
        out.push_str("@group(0) @binding(1) var t_texture: texture_2d<f32>;\n");
        out.push_str("@group(0) @binding(2) var s_texture: sampler;\n");
    }
    if uniforms.contains(&Uniform::MaskSampler) {
        out.push_str("@group(0) @binding(3) var t_mask: texture_2d<f32>;\n");
        out.push_str("@group(0) @binding(4) var s_mask: sampler;\n");
    }
    if matches!(kind, ProgramKind::YuvVideo) {
        for (binding, plane) in [(1, "y"), (3, "u"), (5, "v")] {
            let _ = writeln!(
                out,
                "@group(0) @binding({binding}) var {plane}_texture: texture_2d<f32>;"
            );
            let _ = writeln!(
                out,
                "@group(0) @binding({}) var s_{plane}_texture: sampler;",
                binding + 1
            );
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Stages
// ─────────────────────────────────────────────────────────────────────────────

fn vertex_output(kind: &ProgramKind) -> String {
    let mut out = String::from("struct VertexOutput {\n    @builtin(position) position: vec4<f32>,\n");
    if kind.has_tex_coords() {
        out.push_str("    @location(0) tex_coord: vec2<f32>,\n");
    }
    if matches!(kind, ProgramKind::Texture { .. }) {
        out.push_str("    @location(1) alpha: f32,\n");
    }
    out.push_str("}\n");
    out
}

fn vertex_stage(kind: &ProgramKind) -> String {
    let mut out = String::from(
        r#"@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var corners = array<vec2<f32>, 4>(
        vec2<f32>(-0.5, -0.5),
        vec2<f32>(0.5, -0.5),
        vec2<f32>(0.5, 0.5),
        vec2<f32>(-0.5, 0.5),
    );
    let corner = vertex_index % 4u;
    let unit = corners[corner];
    var out: VertexOutput;
"#,
    );

    let body = match *kind {
        ProgramKind::SolidColor { .. } => {
            "    let pos = u.quad[corner].xy;\n    out.position = u.matrix * vec4<f32>(pos, 0.0, 1.0);\n"
                .to_string()
        }
        ProgramKind::Tile { .. } => concat!(
            "    let pos = u.quad[corner].xy;\n",
            "    out.position = u.matrix * vec4<f32>(pos, 0.0, 1.0);\n",
            "    out.tex_coord = pos * u.vertex_tex_transform.zw + u.vertex_tex_transform.xy;\n",
        )
        .to_string(),
        ProgramKind::DebugBorder => {
            "    out.position = u.matrix * vec4<f32>(unit, 0.0, 1.0);\n".to_string()
        }
        ProgramKind::Checkerboard => concat!(
            "    out.position = u.matrix * vec4<f32>(unit, 0.0, 1.0);\n",
            "    out.tex_coord = unit + vec2<f32>(0.5);\n",
        )
        .to_string(),
        ProgramKind::Texture { flip } => {
            let mut body = String::from(concat!(
                "    let inst = u.instances[vertex_index / 4u];\n",
                "    out.position = inst.matrix * vec4<f32>(unit, 0.0, 1.0);\n",
                "    var tex = inst.uv.xy + (unit + vec2<f32>(0.5)) * inst.uv.zw;\n",
            ));
            if flip {
                body.push_str("    tex.y = 1.0 - tex.y;\n");
            }
            body.push_str("    out.tex_coord = tex;\n    out.alpha = inst.opacity[corner];\n");
            body
        }
        ProgramKind::RenderPass { aa: true, .. } => concat!(
            "    let pos = u.quad[corner].xy;\n",
            "    out.position = u.matrix * vec4<f32>(pos, 0.0, 1.0);\n",
            "    out.tex_coord = (pos + vec2<f32>(0.5)) * u.tex_scale;\n",
        )
        .to_string(),
        ProgramKind::RenderPass { aa: false, .. } => concat!(
            "    out.position = u.matrix * vec4<f32>(unit, 0.0, 1.0);\n",
            "    out.tex_coord = (unit + vec2<f32>(0.5)) * u.tex_transform.zw + u.tex_transform.xy;\n",
        )
        .to_string(),
        ProgramKind::YuvVideo => concat!(
            "    out.position = u.matrix * vec4<f32>(unit, 0.0, 1.0);\n",
            "    out.tex_coord = (unit + vec2<f32>(0.5)) * u.tex_scale;\n",
        )
        .to_string(),
        ProgramKind::StreamVideo => concat!(
            "    out.position = u.matrix * vec4<f32>(unit, 0.0, 1.0);\n",
            "    out.tex_coord = (u.tex_matrix * vec4<f32>(unit + vec2<f32>(0.5), 0.0, 1.0)).xy;\n",
        )
        .to_string(),
    };
    out.push_str(&body);
    out.push_str("    return out;\n}\n");
    out
}

fn fragment_stage(kind: &ProgramKind) -> String {
    let mut out = String::from(
        "@fragment\nfn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {\n",
    );
    let body = match *kind {
        ProgramKind::SolidColor { aa: false } | ProgramKind::DebugBorder => {
            "    return u.color;\n".to_string()
        }
        ProgramKind::SolidColor { aa: true } => {
            "    return u.color * edge_coverage(in.position.xy);\n".to_string()
        }
        ProgramKind::Checkerboard => concat!(
            "    let tex = clamp(in.tex_coord, vec2<f32>(0.0), vec2<f32>(1.0)) * u.tex_transform.zw + u.tex_transform.xy;\n",
            "    let cell = floor(tex * u.frequency * 2.0);\n",
            "    let coord = cell - 2.0 * floor(cell / 2.0);\n",
            "    let picker = abs(coord.x - coord.y);\n",
            "    return mix(vec4<f32>(1.0), u.color, picker) * u.alpha;\n",
        )
        .to_string(),
        ProgramKind::Tile { aa, swizzle, opaque } => {
            let mut body = String::new();
            if aa {
                body.push_str(concat!(
                    "    let tex = clamp(in.tex_coord, vec2<f32>(0.0), vec2<f32>(1.0)) * u.fragment_tex_transform.zw + u.fragment_tex_transform.xy;\n",
                    "    let coverage = edge_coverage(in.position.xy);\n",
                ));
            } else {
                body.push_str("    let tex = in.tex_coord;\n");
            }
            body.push_str("    let sampled = textureSample(t_texture, s_texture, tex)");
            body.push_str(if swizzle { ".bgra;\n" } else { ";\n" });
            if opaque {
                body.push_str("    return vec4<f32>(sampled.rgb, 1.0);\n");
            } else if aa {
                body.push_str("    return sampled * u.alpha * coverage;\n");
            } else {
                body.push_str("    return sampled * u.alpha;\n");
            }
            body
        }
        ProgramKind::Texture { .. } => {
            "    return textureSample(t_texture, s_texture, in.tex_coord) * in.alpha;\n".to_string()
        }
        ProgramKind::RenderPass {
            aa,
            mask,
            color_matrix,
        } => {
            let mut body =
                String::from("    var color = textureSample(t_texture, s_texture, in.tex_coord);\n");
            if mask {
                body.push_str(concat!(
                    "    let mask_coord = u.mask_tex_coord_offset + in.tex_coord * u.mask_tex_coord_scale;\n",
                    "    let mask_alpha = textureSample(t_mask, s_mask, mask_coord).w;\n",
                ));
            }
            if color_matrix {
                body.push_str("    color = apply_color_matrix(color);\n");
            }
            body.push_str("    color = color * u.alpha;\n");
            if mask {
                body.push_str("    color = color * mask_alpha;\n");
            }
            if aa {
                body.push_str("    color = color * edge_coverage(in.position.xy);\n");
            }
            body.push_str("    return color;\n");
            body
        }
        ProgramKind::YuvVideo => concat!(
            "    let y_sample = textureSample(y_texture, s_y_texture, in.tex_coord).x;\n",
            "    let u_sample = textureSample(u_texture, s_u_texture, in.tex_coord).x;\n",
            "    let v_sample = textureSample(v_texture, s_v_texture, in.tex_coord).x;\n",
            "    let yuv = vec3<f32>(y_sample, u_sample, v_sample) + u.yuv_adjust;\n",
            "    let rgb = u.yuv_matrix * yuv;\n",
            "    return vec4<f32>(rgb, 1.0) * u.alpha;\n",
        )
        .to_string(),
        ProgramKind::StreamVideo => {
            "    return textureSample(t_texture, s_texture, in.tex_coord) * u.alpha;\n".to_string()
        }
    };
    out.push_str(&body);
    out.push_str("}\n");
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Complete WGSL module for one program variant
pub fn program_source(key: &ProgramKey) -> String {
    let kind = &key.kind;
    let mut source = format!("// {}\n", key.label());
    if kind.has_tex_coords() && key.precision == TexCoordPrecision::High {
        // WGSL has no reduced-precision varyings; both variants use f32.
        source.push_str("// texture coordinates: highp\n");
    }
    if matches!(kind, ProgramKind::Texture { .. }) {
        source.push_str(QUAD_INSTANCE);
    }
    source.push('\n');
    source.push_str(&uniform_block(kind));
    source.push_str(&texture_bindings(kind));
    if kind.is_anti_aliased() {
        source.push_str(EDGE_COVERAGE);
    }
    if matches!(kind, ProgramKind::RenderPass { color_matrix: true, .. }) {
        source.push_str(UNPREMULTIPLIED_COLOR_MATRIX);
    }
    source.push('\n');
    source.push_str(&vertex_output(kind));
    source.push('\n');
    source.push_str(&vertex_stage(kind));
    source.push('\n');
    source.push_str(&fragment_stage(kind));
    source
}

/// Parse and validate a WGSL module with naga
pub fn validate_wgsl(source: &str) -> Result<(), ShaderError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|err| ShaderError::Parse(err.emit_to_string(source)))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|err| ShaderError::Validation(err.into_inner().to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ProgramKind;

    #[test]
    fn uniform_block_orders_fields_by_alignment() {
        let block = uniform_block(&ProgramKind::RenderPass {
            aa: true,
            mask: true,
            color_matrix: false,
        });
        let matrix = block.find("matrix:").unwrap();
        let tex_scale = block.find("tex_scale:").unwrap();
        let alpha = block.find("alpha:").unwrap();
        assert!(matrix < tex_scale);
        assert!(tex_scale < alpha);
        assert!(!block.contains("s_mask"));
    }

    #[test]
    fn every_variant_validates() {
        for key in ProgramKind::all_keys() {
            let source = program_source(&key);
            if let Err(err) = validate_wgsl(&source) {
                panic!("{} failed validation: {}\n{}", key.label(), err, source);
            }
        }
    }

    #[test]
    fn flipped_texture_inverts_v() {
        let key = ProgramKey::new(ProgramKind::Texture { flip: true }, TexCoordPrecision::Medium);
        assert!(program_source(&key).contains("tex.y = 1.0 - tex.y"));
        let key = ProgramKey::new(ProgramKind::Texture { flip: false }, TexCoordPrecision::Medium);
        assert!(!program_source(&key).contains("tex.y = 1.0 - tex.y"));
    }

    #[test]
    fn opaque_tile_writes_full_alpha() {
        let key = ProgramKey::new(ProgramKind::tile(false, true, true), TexCoordPrecision::Medium);
        let source = program_source(&key);
        assert!(source.contains("vec4<f32>(sampled.rgb, 1.0)"));
        assert!(source.contains(".bgra"));
        assert!(!source.contains("alpha:"));
    }

    #[test]
    fn invalid_source_reports_parse_error() {
        let err = validate_wgsl("fn broken( {").unwrap_err();
        assert!(matches!(err, ShaderError::Parse(_)));
    }
}
