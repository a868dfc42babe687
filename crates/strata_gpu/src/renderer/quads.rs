//! Per-material draw routines

use image::RgbaImage;
use smallvec::SmallVec;
use strata_core::{
    Color, DrawQuad, IntRect, IntSize, PictureQuad, Rect, ResourceId, StreamVideoQuad, TextureQuad, TileQuad,
    Transform, YuvVideoQuad,
};

use super::{OnDemandRaster, Renderer};
use crate::aa::{setup_quad_for_antialiasing, ANTI_ALIASING_EPSILON};
use crate::batch::{BatchKey, TextureQuadInstance};
use crate::context::{
    GraphicsContext, PrimitiveMode, TextureTarget, UniformValue, LINE_LOOP_INDEX_OFFSET, PREMULTIPLIED_BLEND,
    STRAIGHT_ALPHA_BLEND,
};
use crate::frame::DrawingFrame;
use crate::matrices::quad_rect_transform;
use crate::program::{ProgramHandle, ProgramKey, ProgramKind, TexCoordPrecision, Uniform};
use crate::resource::{ScopedReadLock, ScopedResource, ScopedSampler, TextureUsage};

/// Cells per unit of the checkerboard pattern
const CHECKERBOARD_FREQUENCY: f32 = 1.0 / 16.0;

/// Column-major BT.601 limited-range YUV to RGB
const YUV_TO_RGB: [f32; 9] = [1.164, 1.164, 1.164, 0.0, -0.391, 2.018, 1.596, -0.813, 0.0];

/// Level shift applied to the Y, U and V samples before conversion
const YUV_ADJUST: [f32; 3] = [-0.0625, -0.5, -0.5];

/// Rect centered on the origin with the size of `rect`
///
/// Programs that take their geometry from the `quad` uniform are drawn with
/// this rect so the matrix only scales the normalized quad back to content
/// units.
fn centered_rect(rect: &Rect) -> Rect {
    Rect::new(-0.5 * rect.width(), -0.5 * rect.height(), rect.width(), rect.height())
}

/// `Quad` uniform value for a local quad normalized to `tile_rect`
fn quad_uniform(local_quad: &strata_core::QuadF, tile_rect: &Rect) -> UniformValue {
    let normalized = local_quad.scale(1.0 / tile_rect.width(), 1.0 / tile_rect.height());
    UniformValue::Vec2Array(normalized.points().iter().map(|p| [p.x, p.y]).collect())
}

fn edge_uniform(edges: &[f32; 24]) -> UniformValue {
    UniformValue::Vec3Array(
        edges
            .chunks_exact(3)
            .map(|edge| [edge[0], edge[1], edge[2]])
            .collect::<SmallVec<_>>(),
    )
}

/// Texel rect of `tex_coord_rect` that corresponds to `visible` inside `rect`
fn scale_rect_proportional(tex_coord_rect: &Rect, rect: &IntRect, visible: &IntRect) -> Rect {
    let sx = tex_coord_rect.width() / rect.width as f32;
    let sy = tex_coord_rect.height() / rect.height as f32;
    Rect::new(
        tex_coord_rect.x() + (visible.x - rect.x) as f32 * sx,
        tex_coord_rect.y() + (visible.y - rect.y) as f32 * sy,
        visible.width as f32 * sx,
        visible.height as f32 * sy,
    )
}

/// Tiled content to draw: texels of `texture_size` covering the quad
struct ContentSource {
    resource: ResourceId,
    tex_coord_rect: Rect,
    texture_size: IntSize,
    swizzle: bool,
}

impl<C: GraphicsContext> Renderer<C> {
    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch `key` and make it the program in use
    pub(super) fn use_program(&mut self, key: ProgramKey) -> Option<ProgramHandle> {
        let handle = self.programs.get_or_create(&mut self.ctx, key)?;
        self.state.set_program(&mut self.ctx, handle.id);
        Some(handle)
    }

    /// Upload `value` when the program declares `uniform`
    pub(super) fn set_uniform(&mut self, program: &ProgramHandle, uniform: Uniform, value: UniformValue) {
        if let Some(location) = program.location(uniform) {
            self.ctx.set_uniform(location, value);
        }
    }

    pub(super) fn set_blend_enabled(&mut self, enabled: bool) {
        self.state.set_blend_enabled(&mut self.ctx, enabled);
    }

    pub(super) fn tex_coord_precision(&self, max_coordinate: IntSize) -> TexCoordPrecision {
        TexCoordPrecision::required(self.config.highp_threshold_min, max_coordinate)
    }

    /// Precision for sampling up to the far corner of `rect`
    pub(super) fn tex_coord_precision_for_rect(&self, rect: IntRect) -> TexCoordPrecision {
        self.tex_coord_precision(IntSize::new(rect.right(), rect.bottom()))
    }

    /// Window, projection and quad transform combined and flattened;
    /// `None` when the result cannot be inverted
    pub(super) fn device_transform(frame: &DrawingFrame, quad_transform: &Transform) -> Option<Transform> {
        let mut device = frame.matrices.window * frame.matrices.projection * *quad_transform;
        device.flatten_to_2d();
        device.is_invertible().then_some(device)
    }

    /// Draw the unit quad stretched over `rect` under `quad_transform`
    pub(super) fn draw_quad_geometry(
        &mut self,
        frame: &DrawingFrame,
        program: &ProgramHandle,
        quad_transform: &Transform,
        rect: &Rect,
    ) {
        let matrix = frame.matrices.projection * quad_rect_transform(quad_transform, rect);
        self.set_uniform(program, Uniform::Matrix, UniformValue::Mat4(matrix.to_cols_array()));
        self.ctx.draw_elements(PrimitiveMode::Triangles, 6, 0);
        self.stats.draw_calls += 1;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Untextured
    // ─────────────────────────────────────────────────────────────────────────

    pub(super) fn draw_checkerboard_quad(&mut self, frame: &DrawingFrame, quad: &DrawQuad, color: Color) {
        let Some(program) = self.use_program(ProgramKey::new(ProgramKind::Checkerboard, TexCoordPrecision::Medium))
        else {
            return;
        };
        self.set_blend_enabled(quad.should_draw_with_blending());

        let rect = quad.rect;
        self.set_uniform(&program, Uniform::Color, UniformValue::Vec4([color.r, color.g, color.b, 1.0]));
        self.set_uniform(&program, Uniform::Frequency, UniformValue::Float(CHECKERBOARD_FREQUENCY));
        // Offsets keep the pattern continuous across neighbouring quads.
        let tex_transform = [
            (rect.x % 16) as f32,
            (rect.y % 16) as f32,
            rect.width as f32,
            rect.height as f32,
        ];
        self.set_uniform(&program, Uniform::TexTransform, UniformValue::Vec4(tex_transform));
        self.set_uniform(&program, Uniform::Alpha, UniformValue::Float(quad.opacity()));

        self.draw_quad_geometry(frame, &program, quad.quad_transform(), &rect.to_rect());
    }

    pub(super) fn draw_debug_border_quad(&mut self, frame: &DrawingFrame, quad: &DrawQuad, color: Color, width: f32) {
        let Some(program) = self.use_program(ProgramKey::new(ProgramKind::DebugBorder, TexCoordPrecision::Medium))
        else {
            return;
        };
        self.set_blend_enabled(quad.should_draw_with_blending());

        let matrix = frame.matrices.projection * quad_rect_transform(quad.quad_transform(), &quad.rect.to_rect());
        self.set_uniform(&program, Uniform::Matrix, UniformValue::Mat4(matrix.to_cols_array()));
        self.set_uniform(&program, Uniform::Color, UniformValue::Vec4(color.premultiplied(quad.opacity())));

        self.ctx.line_width(width);
        self.ctx.draw_elements(PrimitiveMode::LineLoop, 4, LINE_LOOP_INDEX_OFFSET);
        self.stats.draw_calls += 1;
    }

    pub(super) fn draw_solid_color_quad(&mut self, frame: &DrawingFrame, quad: &DrawQuad, color: Color) {
        let alpha = color.a * quad.opacity();
        if alpha < f32::EPSILON && quad.should_draw_with_blending() {
            return;
        }
        let Some(device_transform) = Self::device_transform(frame, quad.quad_transform()) else {
            tracing::debug!("skipping solid color quad with non-invertible transform");
            return;
        };

        let tile_rect = quad.visible_rect.to_rect();
        let aa = setup_quad_for_antialiasing(&device_transform, quad);
        let Some(program) = self.use_program(ProgramKey::new(
            ProgramKind::SolidColor { aa: aa.use_aa },
            TexCoordPrecision::Medium,
        )) else {
            return;
        };
        self.set_blend_enabled(quad.should_draw_with_blending() || aa.use_aa);

        self.set_uniform(&program, Uniform::Color, UniformValue::Vec4(color.premultiplied(quad.opacity())));
        if aa.use_aa {
            self.set_uniform(&program, Uniform::Edge, edge_uniform(&aa.edges));
        }
        self.set_uniform(&program, Uniform::Quad, quad_uniform(&aa.local_quad, &tile_rect));

        self.draw_quad_geometry(frame, &program, quad.quad_transform(), &centered_rect(&tile_rect));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tiled Content
    // ─────────────────────────────────────────────────────────────────────────

    pub(super) fn draw_tile_quad(&mut self, frame: &DrawingFrame, quad: &DrawQuad, tile: &TileQuad) {
        let source = ContentSource {
            resource: tile.resource_id,
            tex_coord_rect: tile.tex_coord_rect,
            texture_size: tile.texture_size,
            swizzle: tile.swizzle_contents,
        };
        self.draw_content_quad(frame, quad, &source);
    }

    /// Draw tiled texels with their coordinates clamped half a texel inside
    /// the tile, so filtering never reads the neighbouring tile
    fn draw_content_quad(&mut self, frame: &DrawingFrame, quad: &DrawQuad, source: &ContentSource) {
        if quad.visible_rect.is_empty() || source.tex_coord_rect.is_empty() {
            return;
        }
        let tile_rect = quad.visible_rect.to_rect();
        let tex_coord_rect = scale_rect_proportional(&source.tex_coord_rect, &quad.rect, &quad.visible_rect);
        let tex_to_geom_scale_x = quad.rect.width as f32 / source.tex_coord_rect.width();
        let tex_to_geom_scale_y = quad.rect.height as f32 / source.tex_coord_rect.height();

        let tex_clamp_x = (0.5f32).min(0.5 * tex_coord_rect.width() - ANTI_ALIASING_EPSILON);
        let tex_clamp_y = (0.5f32).min(0.5 * tex_coord_rect.height() - ANTI_ALIASING_EPSILON);
        let geom_clamp_x =
            (tex_clamp_x * tex_to_geom_scale_x).min(0.5 * tile_rect.width() - ANTI_ALIASING_EPSILON);
        let geom_clamp_y =
            (tex_clamp_y * tex_to_geom_scale_y).min(0.5 * tile_rect.height() - ANTI_ALIASING_EPSILON);
        let clamp_geom_rect = tile_rect.inset(geom_clamp_x, geom_clamp_y, geom_clamp_x, geom_clamp_y);
        let clamp_tex_rect = tex_coord_rect.inset(tex_clamp_x, tex_clamp_y, tex_clamp_x, tex_clamp_y);

        // Clamp rect onto the unit square.
        let mut vertex_translate_x = -clamp_geom_rect.x() / clamp_geom_rect.width();
        let mut vertex_translate_y = -clamp_geom_rect.y() / clamp_geom_rect.height();
        let mut vertex_scale_x = tile_rect.width() / clamp_geom_rect.width();
        let mut vertex_scale_y = tile_rect.height() / clamp_geom_rect.height();

        // Unit square onto normalized texture coordinates.
        let texture_width = source.texture_size.width as f32;
        let texture_height = source.texture_size.height as f32;
        let fragment_translate_x = clamp_tex_rect.x() / texture_width;
        let fragment_translate_y = clamp_tex_rect.y() / texture_height;
        let fragment_scale_x = clamp_tex_rect.width() / texture_width;
        let fragment_scale_y = clamp_tex_rect.height() / texture_height;

        let Some(device_transform) = Self::device_transform(frame, quad.quad_transform()) else {
            tracing::debug!("skipping content quad with non-invertible transform");
            return;
        };
        let aa = setup_quad_for_antialiasing(&device_transform, quad);

        let precision = self.tex_coord_precision(source.texture_size);
        let kind = if aa.use_aa {
            ProgramKind::tile(true, source.swizzle, false)
        } else {
            ProgramKind::tile(false, source.swizzle, !quad.should_draw_with_blending())
        };
        let Some(program) = self.use_program(ProgramKey::new(kind, precision)) else {
            return;
        };
        self.set_uniform(&program, Uniform::Sampler, UniformValue::Int(0));

        let scaled = tex_to_geom_scale_x != 1.0 || tex_to_geom_scale_y != 1.0;
        let filter = if aa.use_aa || scaled || !quad.quad_transform().is_identity_or_integer_translation() {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        };
        let Some(_sampler) =
            ScopedSampler::new(&self.provider, &mut self.ctx, source.resource, TextureTarget::Texture2D, filter)
        else {
            tracing::warn!("skipping content quad: resource {:?} is not readable", source.resource);
            return;
        };

        if aa.use_aa {
            self.set_uniform(&program, Uniform::Edge, edge_uniform(&aa.edges));
            self.set_uniform(
                &program,
                Uniform::FragmentTexTransform,
                UniformValue::Vec4([fragment_translate_x, fragment_translate_y, fragment_scale_x, fragment_scale_y]),
            );
        } else {
            // Without edge coverage the clamp never triggers, so the
            // fragment transform folds into the vertex transform.
            vertex_scale_x *= fragment_scale_x;
            vertex_scale_y *= fragment_scale_y;
            vertex_translate_x = vertex_translate_x * fragment_scale_x + fragment_translate_x;
            vertex_translate_y = vertex_translate_y * fragment_scale_y + fragment_translate_y;
        }
        self.set_uniform(
            &program,
            Uniform::VertexTexTransform,
            UniformValue::Vec4([vertex_translate_x, vertex_translate_y, vertex_scale_x, vertex_scale_y]),
        );
        self.set_blend_enabled(quad.should_draw_with_blending() || aa.use_aa);
        self.set_uniform(&program, Uniform::Alpha, UniformValue::Float(quad.opacity()));
        self.set_uniform(&program, Uniform::Quad, quad_uniform(&aa.local_quad, &tile_rect));

        self.draw_quad_geometry(frame, &program, quad.quad_transform(), &centered_rect(&tile_rect));
    }

    /// Rasterize the picture into the reusable bitmap and draw it as a tile
    pub(super) fn draw_picture_quad(&mut self, frame: &DrawingFrame, quad: &DrawQuad, picture: &PictureQuad) {
        let size = picture.texture_size;
        if size.is_empty() {
            return;
        }
        let stale = self
            .on_demand_raster
            .as_ref()
            .map_or(true, |raster| raster.resource.size() != size);
        if stale {
            self.on_demand_raster = None;
            let mut resource = ScopedResource::new(&self.provider);
            if !resource.allocate(&mut self.ctx, size, wgpu::TextureFormat::Rgba8Unorm, TextureUsage::Any) {
                tracing::warn!("could not allocate {}x{} picture texture", size.width, size.height);
                return;
            }
            self.on_demand_raster = Some(OnDemandRaster {
                resource,
                bitmap: RgbaImage::new(size.width as u32, size.height as u32),
            });
        }
        let Some(raster) = self.on_demand_raster.as_mut() else {
            return;
        };
        let Some(resource) = raster.resource.id() else {
            return;
        };

        for pixel in raster.bitmap.pixels_mut() {
            pixel.0 = [0; 4];
        }
        picture
            .picture
            .raster(&mut raster.bitmap, picture.content_rect, picture.contents_scale);
        let full = IntRect::from_size(size);
        self.provider
            .set_pixels(&mut self.ctx, resource, &raster.bitmap, full, full, (0, 0));

        let source = ContentSource {
            resource,
            tex_coord_rect: picture.tex_coord_rect,
            texture_size: size,
            swizzle: picture.swizzle_contents,
        };
        self.draw_content_quad(frame, quad, &source);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Video
    // ─────────────────────────────────────────────────────────────────────────

    pub(super) fn draw_yuv_video_quad(&mut self, frame: &DrawingFrame, quad: &DrawQuad, video: &YuvVideoQuad) {
        self.set_blend_enabled(quad.should_draw_with_blending());
        let precision = self.tex_coord_precision_for_rect(quad.shared_quad_state.visible_content_rect);
        let Some(program) = self.use_program(ProgramKey::new(ProgramKind::YuvVideo, precision)) else {
            return;
        };

        let mut planes = SmallVec::<[ScopedSampler; 3]>::new();
        for (unit, plane) in [(1, video.y_plane), (2, video.u_plane), (3, video.v_plane)] {
            self.ctx.active_texture(unit);
            match ScopedSampler::new(
                &self.provider,
                &mut self.ctx,
                plane,
                TextureTarget::Texture2D,
                wgpu::FilterMode::Linear,
            ) {
                Some(sampler) => planes.push(sampler),
                None => {
                    tracing::warn!("skipping video quad: plane {:?} is not readable", plane);
                    self.ctx.active_texture(0);
                    return;
                }
            }
        }

        self.set_uniform(
            &program,
            Uniform::TexScale,
            UniformValue::Vec2([video.tex_scale.width, video.tex_scale.height]),
        );
        self.set_uniform(&program, Uniform::YTexture, UniformValue::Int(1));
        self.set_uniform(&program, Uniform::UTexture, UniformValue::Int(2));
        self.set_uniform(&program, Uniform::VTexture, UniformValue::Int(3));
        self.set_uniform(&program, Uniform::YuvMatrix, UniformValue::Mat3(YUV_TO_RGB));
        self.set_uniform(&program, Uniform::YuvAdjust, UniformValue::Vec3(YUV_ADJUST));
        self.set_uniform(&program, Uniform::Alpha, UniformValue::Float(quad.opacity()));

        self.draw_quad_geometry(frame, &program, quad.quad_transform(), &quad.rect.to_rect());

        // Planes stay locked until the draw is issued.
        drop(planes);
        self.ctx.active_texture(0);
    }

    pub(super) fn draw_stream_video_quad(&mut self, frame: &DrawingFrame, quad: &DrawQuad, video: &StreamVideoQuad) {
        if !self.capabilities.using_egl_image {
            tracing::warn!("skipping stream video quad: external textures are unsupported");
            return;
        }
        self.set_blend_enabled(quad.should_draw_with_blending());
        let precision = self.tex_coord_precision_for_rect(quad.shared_quad_state.visible_content_rect);
        let Some(program) = self.use_program(ProgramKey::new(ProgramKind::StreamVideo, precision)) else {
            return;
        };

        self.set_uniform(&program, Uniform::TexMatrix, UniformValue::Mat4(video.matrix.to_cols_array()));
        let Some(_sampler) = ScopedSampler::new(
            &self.provider,
            &mut self.ctx,
            video.resource_id,
            TextureTarget::External,
            wgpu::FilterMode::Linear,
        ) else {
            tracing::warn!("skipping stream video quad: resource {:?} is not readable", video.resource_id);
            return;
        };
        self.set_uniform(&program, Uniform::Sampler, UniformValue::Int(0));
        self.set_uniform(&program, Uniform::Alpha, UniformValue::Float(quad.opacity()));

        self.draw_quad_geometry(frame, &program, quad.quad_transform(), &quad.rect.to_rect());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Batched Textures
    // ─────────────────────────────────────────────────────────────────────────

    /// Queue a textured quad, drawing the pending batch first when the quad
    /// cannot join it
    pub(super) fn enqueue_texture_quad(&mut self, frame: &DrawingFrame, quad: &DrawQuad, texture: &TextureQuad) {
        let precision = self.tex_coord_precision_for_rect(quad.shared_quad_state.visible_content_rect);
        let key = ProgramKey::new(ProgramKind::Texture { flip: texture.flipped }, precision);
        let Some(program) = self.programs.get_or_create(&mut self.ctx, key) else {
            return;
        };

        let batch_key = BatchKey {
            program: program.id,
            resource: texture.resource_id,
            premultiplied_alpha: texture.premultiplied_alpha,
            needs_blending: quad.should_draw_with_blending(),
        };
        if self.batch.needs_flush_for(&batch_key) {
            self.flush_texture_batch();
        }

        let matrix = frame.matrices.projection * quad_rect_transform(quad.quad_transform(), &quad.rect.to_rect());
        let uv = [
            texture.uv_top_left.x,
            texture.uv_top_left.y,
            texture.uv_bottom_right.x - texture.uv_top_left.x,
            texture.uv_bottom_right.y - texture.uv_top_left.y,
        ];
        let opacity = texture.vertex_opacity.map(|corner| corner * quad.opacity());
        self.batch.push(
            batch_key,
            program,
            TextureQuadInstance {
                matrix: matrix.to_cols_array(),
                uv,
                opacity,
            },
        );
    }

    /// Draw the pending texture batch, if any, with one call
    pub(super) fn flush_texture_batch(&mut self) {
        let Some(batch) = self.batch.take() else {
            return;
        };
        let _span = tracing::trace_span!("flush_texture_batch", quads = batch.instances.len()).entered();

        self.set_blend_enabled(batch.key.needs_blending);
        self.state.set_program(&mut self.ctx, batch.program.id);
        self.set_uniform(&batch.program, Uniform::Sampler, UniformValue::Int(0));

        let Some(lock) = ScopedReadLock::new(&self.provider, batch.key.resource) else {
            tracing::warn!("dropping texture batch: resource {:?} is not readable", batch.key.resource);
            return;
        };
        self.ctx.bind_texture(TextureTarget::Texture2D, Some(lock.texture_id()));

        if !batch.key.premultiplied_alpha {
            self.ctx.blend_state(STRAIGHT_ALPHA_BLEND);
        }
        if let Some(location) = batch.program.location(Uniform::Instances) {
            self.ctx
                .set_uniform_block(location, bytemuck::cast_slice(batch.instances.as_slice()));
        }
        self.ctx.draw_elements(PrimitiveMode::Triangles, batch.index_count(), 0);
        if !batch.key.premultiplied_alpha {
            self.ctx.blend_state(PREMULTIPLIED_BLEND);
        }

        self.stats.batches_flushed += 1;
        self.stats.draw_calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_rect_keeps_size() {
        let rect = centered_rect(&Rect::new(10.0, 20.0, 30.0, 40.0));
        assert_eq!(rect, Rect::new(-15.0, -20.0, 30.0, 40.0));
    }

    #[test]
    fn visible_part_maps_to_matching_texels() {
        let tex = scale_rect_proportional(
            &Rect::new(0.0, 0.0, 128.0, 128.0),
            &IntRect::new(0, 0, 64, 64),
            &IntRect::new(16, 32, 32, 16),
        );
        assert_eq!(tex, Rect::new(32.0, 64.0, 64.0, 32.0));
    }

    #[test]
    fn quad_uniform_normalizes_to_tile() {
        let tile = Rect::new(0.0, 0.0, 50.0, 25.0);
        let UniformValue::Vec2Array(points) = quad_uniform(&strata_core::QuadF::from_rect(tile), &tile) else {
            panic!("quad uniform is not a vec2 array");
        };
        assert_eq!(points.as_slice(), &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
    }

    #[test]
    fn edge_uniform_packs_eight_edges() {
        let mut edges = [0.0; 24];
        edges[21] = 7.0;
        let UniformValue::Vec3Array(packed) = edge_uniform(&edges) else {
            panic!("edge uniform is not a vec3 array");
        };
        assert_eq!(packed.len(), 8);
        assert_eq!(packed[7], [7.0, 0.0, 0.0]);
    }
}
