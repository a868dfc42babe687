//! Shader program variants and their lazily built cache
//!
//! Every program the renderer can use is described by a `ProgramKey`: the
//! material-specific `ProgramKind` with its feature flags, plus the texture
//! coordinate precision. The cache compiles a variant the first time it is
//! requested and keeps it until teardown.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use strata_core::IntSize;

use crate::context::{GraphicsContext, ProgramId, UniformLocation};
use crate::shaders;

// ─────────────────────────────────────────────────────────────────────────────
// Program Keys
// ─────────────────────────────────────────────────────────────────────────────

/// Precision used for interpolated texture coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TexCoordPrecision {
    Medium,
    High,
}

impl TexCoordPrecision {
    /// High precision once a coordinate exceeds `threshold` texels
    pub fn required(threshold: i32, max_coordinate: IntSize) -> Self {
        if max_coordinate.width > threshold || max_coordinate.height > threshold {
            TexCoordPrecision::High
        } else {
            TexCoordPrecision::Medium
        }
    }
}

/// Material program with its feature flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    SolidColor { aa: bool },
    DebugBorder,
    Checkerboard,
    /// Tiled content; `opaque` writes alpha 1 and ignores opacity
    Tile { aa: bool, swizzle: bool, opaque: bool },
    /// Batched textured quads
    Texture { flip: bool },
    RenderPass { aa: bool, mask: bool, color_matrix: bool },
    YuvVideo,
    StreamVideo,
}

/// Render-pass variants indexed by `aa << 2 | mask << 1 | color_matrix`
pub const RENDER_PASS_VARIANTS: [ProgramKind; 8] = [
    ProgramKind::RenderPass { aa: false, mask: false, color_matrix: false },
    ProgramKind::RenderPass { aa: false, mask: false, color_matrix: true },
    ProgramKind::RenderPass { aa: false, mask: true, color_matrix: false },
    ProgramKind::RenderPass { aa: false, mask: true, color_matrix: true },
    ProgramKind::RenderPass { aa: true, mask: false, color_matrix: false },
    ProgramKind::RenderPass { aa: true, mask: false, color_matrix: true },
    ProgramKind::RenderPass { aa: true, mask: true, color_matrix: false },
    ProgramKind::RenderPass { aa: true, mask: true, color_matrix: true },
];

impl ProgramKind {
    /// Tile variant; anti-aliased tiles always blend so they are never opaque
    pub fn tile(aa: bool, swizzle: bool, opaque: bool) -> Self {
        ProgramKind::Tile {
            aa,
            swizzle,
            opaque: opaque && !aa,
        }
    }

    pub fn render_pass(aa: bool, mask: bool, color_matrix: bool) -> Self {
        RENDER_PASS_VARIANTS[(aa as usize) << 2 | (mask as usize) << 1 | color_matrix as usize]
    }

    /// Every program variant at every precision it supports
    pub fn all_keys() -> Vec<ProgramKey> {
        let mut kinds = vec![
            ProgramKind::SolidColor { aa: false },
            ProgramKind::SolidColor { aa: true },
            ProgramKind::DebugBorder,
            ProgramKind::Checkerboard,
            ProgramKind::Texture { flip: false },
            ProgramKind::Texture { flip: true },
            ProgramKind::YuvVideo,
            ProgramKind::StreamVideo,
        ];
        for aa in [false, true] {
            for swizzle in [false, true] {
                for opaque in [false, true] {
                    let kind = ProgramKind::tile(aa, swizzle, opaque);
                    if !kinds.contains(&kind) {
                        kinds.push(kind);
                    }
                }
            }
        }
        kinds.extend(RENDER_PASS_VARIANTS);

        let mut keys = Vec::new();
        for kind in kinds {
            keys.push(ProgramKey::new(kind, TexCoordPrecision::Medium));
            if kind.has_precision_variants() {
                keys.push(ProgramKey::new(kind, TexCoordPrecision::High));
            }
        }
        keys
    }

    /// Whether the kind has distinct medium/high precision variants
    pub fn has_precision_variants(&self) -> bool {
        !matches!(
            self,
            ProgramKind::SolidColor { .. } | ProgramKind::DebugBorder | ProgramKind::Checkerboard
        )
    }

    /// Whether the kind interpolates texture coordinates
    pub fn has_tex_coords(&self) -> bool {
        !matches!(self, ProgramKind::SolidColor { .. } | ProgramKind::DebugBorder)
    }

    pub fn is_anti_aliased(&self) -> bool {
        matches!(
            self,
            ProgramKind::SolidColor { aa: true }
                | ProgramKind::Tile { aa: true, .. }
                | ProgramKind::RenderPass { aa: true, .. }
        )
    }

    /// Uniforms the program declares, in declaration order
    pub fn uniforms(&self) -> SmallVec<[Uniform; 12]> {
        let mut uniforms = SmallVec::new();
        match *self {
            ProgramKind::SolidColor { aa } => {
                uniforms.extend([Uniform::Matrix, Uniform::Quad, Uniform::Color]);
                if aa {
                    uniforms.push(Uniform::Edge);
                }
            }
            ProgramKind::DebugBorder => {
                uniforms.extend([Uniform::Matrix, Uniform::Color]);
            }
            ProgramKind::Checkerboard => {
                uniforms.extend([
                    Uniform::Matrix,
                    Uniform::Alpha,
                    Uniform::TexTransform,
                    Uniform::Frequency,
                    Uniform::Color,
                ]);
            }
            ProgramKind::Tile { aa, opaque, .. } => {
                uniforms.extend([
                    Uniform::Matrix,
                    Uniform::Quad,
                    Uniform::VertexTexTransform,
                    Uniform::Sampler,
                ]);
                if !opaque {
                    uniforms.push(Uniform::Alpha);
                }
                if aa {
                    uniforms.extend([Uniform::Edge, Uniform::FragmentTexTransform]);
                }
            }
            ProgramKind::Texture { .. } => {
                uniforms.extend([Uniform::Instances, Uniform::Sampler]);
            }
            ProgramKind::RenderPass {
                aa,
                mask,
                color_matrix,
            } => {
                uniforms.extend([Uniform::Matrix, Uniform::Alpha, Uniform::Sampler]);
                if aa {
                    uniforms.extend([Uniform::Quad, Uniform::Edge, Uniform::TexScale]);
                } else {
                    uniforms.push(Uniform::TexTransform);
                }
                if mask {
                    uniforms.extend([
                        Uniform::MaskSampler,
                        Uniform::MaskTexCoordScale,
                        Uniform::MaskTexCoordOffset,
                    ]);
                }
                if color_matrix {
                    uniforms.extend([Uniform::ColorMatrix, Uniform::ColorOffset]);
                }
            }
            ProgramKind::YuvVideo => {
                uniforms.extend([
                    Uniform::Matrix,
                    Uniform::TexScale,
                    Uniform::Alpha,
                    Uniform::YTexture,
                    Uniform::UTexture,
                    Uniform::VTexture,
                    Uniform::YuvMatrix,
                    Uniform::YuvAdjust,
                ]);
            }
            ProgramKind::StreamVideo => {
                uniforms.extend([
                    Uniform::Matrix,
                    Uniform::TexMatrix,
                    Uniform::Alpha,
                    Uniform::Sampler,
                ]);
            }
        }
        uniforms
    }

    /// Short label used in logs and shader names
    pub fn label(&self) -> String {
        let flag = |set: bool, name: &str| if set { format!("_{name}") } else { String::new() };
        match *self {
            ProgramKind::SolidColor { aa } => format!("solid_color{}", flag(aa, "aa")),
            ProgramKind::DebugBorder => "debug_border".to_string(),
            ProgramKind::Checkerboard => "checkerboard".to_string(),
            ProgramKind::Tile { aa, swizzle, opaque } => format!(
                "tile{}{}{}",
                flag(aa, "aa"),
                flag(swizzle, "swizzle"),
                flag(opaque, "opaque")
            ),
            ProgramKind::Texture { flip } => format!("texture{}", flag(flip, "flip")),
            ProgramKind::RenderPass {
                aa,
                mask,
                color_matrix,
            } => format!(
                "render_pass{}{}{}",
                flag(aa, "aa"),
                flag(mask, "mask"),
                flag(color_matrix, "color_matrix")
            ),
            ProgramKind::YuvVideo => "yuv_video".to_string(),
            ProgramKind::StreamVideo => "stream_video".to_string(),
        }
    }
}

/// Cache key: kind plus precision
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    pub kind: ProgramKind,
    pub precision: TexCoordPrecision,
}

impl ProgramKey {
    /// Key for `kind`; kinds without precision variants always use medium
    pub fn new(kind: ProgramKind, precision: TexCoordPrecision) -> Self {
        let precision = if kind.has_precision_variants() {
            precision
        } else {
            TexCoordPrecision::Medium
        };
        Self { kind, precision }
    }

    pub fn label(&self) -> String {
        match self.precision {
            TexCoordPrecision::Medium => self.kind.label(),
            TexCoordPrecision::High => format!("{}_highp", self.kind.label()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Uniforms
// ─────────────────────────────────────────────────────────────────────────────

/// Every uniform any program declares
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Uniform {
    Matrix,
    Quad,
    Edge,
    Alpha,
    Color,
    Sampler,
    MaskSampler,
    VertexTexTransform,
    FragmentTexTransform,
    TexTransform,
    TexScale,
    MaskTexCoordScale,
    MaskTexCoordOffset,
    ColorMatrix,
    ColorOffset,
    YTexture,
    UTexture,
    VTexture,
    YuvMatrix,
    YuvAdjust,
    Frequency,
    TexMatrix,
    Instances,
}

impl Uniform {
    pub const COUNT: usize = 23;

    pub const ALL: [Uniform; Uniform::COUNT] = [
        Uniform::Matrix,
        Uniform::Quad,
        Uniform::Edge,
        Uniform::Alpha,
        Uniform::Color,
        Uniform::Sampler,
        Uniform::MaskSampler,
        Uniform::VertexTexTransform,
        Uniform::FragmentTexTransform,
        Uniform::TexTransform,
        Uniform::TexScale,
        Uniform::MaskTexCoordScale,
        Uniform::MaskTexCoordOffset,
        Uniform::ColorMatrix,
        Uniform::ColorOffset,
        Uniform::YTexture,
        Uniform::UTexture,
        Uniform::VTexture,
        Uniform::YuvMatrix,
        Uniform::YuvAdjust,
        Uniform::Frequency,
        Uniform::TexMatrix,
        Uniform::Instances,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Uniform> {
        Uniform::ALL.get(index).copied()
    }

    pub fn from_name(name: &str) -> Option<Uniform> {
        Uniform::ALL.into_iter().find(|uniform| uniform.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Uniform::Matrix => "matrix",
            Uniform::Quad => "quad",
            Uniform::Edge => "edge",
            Uniform::Alpha => "alpha",
            Uniform::Color => "color",
            Uniform::Sampler => "s_texture",
            Uniform::MaskSampler => "s_mask",
            Uniform::VertexTexTransform => "vertex_tex_transform",
            Uniform::FragmentTexTransform => "fragment_tex_transform",
            Uniform::TexTransform => "tex_transform",
            Uniform::TexScale => "tex_scale",
            Uniform::MaskTexCoordScale => "mask_tex_coord_scale",
            Uniform::MaskTexCoordOffset => "mask_tex_coord_offset",
            Uniform::ColorMatrix => "color_matrix",
            Uniform::ColorOffset => "color_offset",
            Uniform::YTexture => "y_texture",
            Uniform::UTexture => "u_texture",
            Uniform::VTexture => "v_texture",
            Uniform::YuvMatrix => "yuv_matrix",
            Uniform::YuvAdjust => "yuv_adjust",
            Uniform::Frequency => "frequency",
            Uniform::TexMatrix => "tex_matrix",
            Uniform::Instances => "instances",
        }
    }

    /// Samplers select a texture unit instead of carrying data
    pub fn is_sampler(self) -> bool {
        matches!(
            self,
            Uniform::Sampler
                | Uniform::MaskSampler
                | Uniform::YTexture
                | Uniform::UTexture
                | Uniform::VTexture
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Program Handles
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a context needs to build one program
#[derive(Clone, Debug)]
pub struct ProgramDescriptor {
    pub key: ProgramKey,
    pub label: String,
    /// WGSL module with `vs_main` and `fs_main` entry points
    pub source: String,
    /// Locations to bind before linking; empty when locations are queried
    pub bound_locations: SmallVec<[(Uniform, UniformLocation); 12]>,
}

impl ProgramDescriptor {
    pub fn new(key: ProgramKey, bind_uniform_locations: bool) -> Self {
        let bound_locations = if bind_uniform_locations {
            key.kind
                .uniforms()
                .into_iter()
                .map(|uniform| (uniform, UniformLocation(uniform.index() as i32)))
                .collect()
        } else {
            SmallVec::new()
        };
        Self {
            key,
            label: key.label(),
            source: shaders::program_source(&key),
            bound_locations,
        }
    }
}

/// Linked program plus its uniform location table
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgramHandle {
    pub id: ProgramId,
    pub key: ProgramKey,
    locations: [Option<UniformLocation>; Uniform::COUNT],
}

impl ProgramHandle {
    pub fn location(&self, uniform: Uniform) -> Option<UniformLocation> {
        self.locations[uniform.index()]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Program Cache
// ─────────────────────────────────────────────────────────────────────────────

/// Lazily populated map from program key to linked program
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: FxHashMap<ProgramKey, ProgramHandle>,
    bind_uniform_locations: bool,
}

impl ProgramCache {
    pub fn new(bind_uniform_locations: bool) -> Self {
        Self {
            programs: FxHashMap::default(),
            bind_uniform_locations,
        }
    }

    /// Cached program for `key`, compiling it on first use
    ///
    /// Returns `None` without caching anything when the context is lost or
    /// the program fails to link, so a later call can retry.
    pub fn get_or_create(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        key: ProgramKey,
    ) -> Option<ProgramHandle> {
        if let Some(handle) = self.programs.get(&key) {
            return Some(*handle);
        }
        if ctx.is_context_lost() {
            tracing::debug!("skipping program {} on lost context", key.label());
            return None;
        }

        let _span = tracing::trace_span!("program_initialize", program = %key.label()).entered();
        let descriptor = ProgramDescriptor::new(key, self.bind_uniform_locations);

        #[cfg(debug_assertions)]
        if let Err(err) = shaders::validate_wgsl(&descriptor.source) {
            tracing::error!("generated shader {} is invalid: {}", descriptor.label, err);
        }

        let Some(id) = ctx.create_program(&descriptor) else {
            tracing::warn!("program {} failed to link", descriptor.label);
            return None;
        };

        let mut locations = [None; Uniform::COUNT];
        for uniform in key.kind.uniforms() {
            locations[uniform.index()] = descriptor
                .bound_locations
                .iter()
                .find(|(bound, _)| *bound == uniform)
                .map(|(_, location)| *location)
                .or_else(|| ctx.uniform_location(id, uniform.name()));
        }

        let handle = ProgramHandle { id, key, locations };
        self.programs.insert(key, handle);
        Some(handle)
    }

    pub fn get(&self, key: &ProgramKey) -> Option<ProgramHandle> {
        self.programs.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Delete every program; calling it again is a no-op
    pub fn release_all(&mut self, ctx: &mut dyn GraphicsContext) {
        for (_, handle) in self.programs.drain() {
            ctx.delete_program(handle.id);
        }
    }
}
