//! Render-pass quads, their filters and filtered backdrops

use strata_core::{
    ColorMatrix, DrawQuad, FilterOperations, IntRect, IntSize, QuadF, Rect, RenderPassQuad, ResourceId, Transform,
};

use super::Renderer;
use crate::aa::{edge_array, is_pixel_aligned, LayerQuad};
use crate::context::{GraphicsContext, TextureTarget, UniformValue};
use crate::frame::DrawingFrame;
use crate::matrices::quad_rect_transform;
use crate::program::{ProgramKey, ProgramKind, Uniform};
use crate::resource::{ScopedReadLock, ScopedResource, ScopedSampler, ScopedWriteLock, TextureUsage};

/// Unit square centered on the origin, the geometry every quad is drawn with
const UNIT_RECT: Rect = Rect::new(-0.5, -0.5, 1.0, 1.0);

const FILTER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Column-major 4x4 part of a 4x5 row-major color matrix
fn color_matrix_uniform(matrix: &ColorMatrix) -> [f32; 16] {
    let mut out = [0.0; 16];
    for column in 0..4 {
        for row in 0..4 {
            out[column * 4 + row] = matrix[row * 5 + column];
        }
    }
    out
}

fn color_offset_uniform(matrix: &ColorMatrix) -> [f32; 4] {
    [matrix[4], matrix[9], matrix[14], matrix[19]]
}

impl<C: GraphicsContext> Renderer<C> {
    /// Composite the texture of another render pass
    pub(super) fn draw_render_pass_quad(
        &mut self,
        frame: &mut DrawingFrame,
        quad: &DrawQuad,
        pass_quad: &RenderPassQuad,
    ) {
        let id = pass_quad.render_pass_id;
        let Some((contents_resource, contents_size)) = self
            .pass_textures
            .get(id)
            .and_then(|texture| texture.id().map(|resource| (resource, texture.size())))
        else {
            tracing::debug!("skipping quad for pass {:?} without a texture", id);
            return;
        };

        let rect = quad.rect.to_rect();
        let mut contents_device =
            frame.matrices.window * frame.matrices.projection * quad_rect_transform(quad.quad_transform(), &rect);
        contents_device.flatten_to_2d();
        let Some(contents_device_inverse) = contents_device.inverse() else {
            tracing::debug!("skipping quad for pass {:?} with non-invertible transform", id);
            return;
        };

        let background = self.draw_background_filters(frame, quad, pass_quad, &contents_device, &contents_device_inverse);

        let color_matrix = pass_quad.filters.to_color_matrix();
        let filtered = if color_matrix.is_none() && !pass_quad.filters.is_empty() {
            self.apply_filters(&pass_quad.filters, contents_resource, contents_size)
        } else {
            None
        };

        if let Some(background) = background.as_ref().and_then(ScopedResource::id) {
            self.set_blend_enabled(false);
            self.copy_resource_to_framebuffer(frame, background, quad.rect, quad.quad_transform());
        }

        let (device_quad, clipped) = contents_device.map_quad(&QuadF::from_rect(UNIT_RECT));
        if clipped {
            tracing::debug!("skipping quad for pass {:?} behind the eye", id);
            return;
        }
        let use_aa = !is_pixel_aligned(&device_quad);

        let mut device_layer_bounds = LayerQuad::from_quad(&QuadF::from_rect(device_quad.bounding_box()));
        let mut device_layer_edges = LayerQuad::from_quad(&device_quad);
        if use_aa {
            device_layer_bounds.inflate_anti_aliasing_distance();
            device_layer_edges.inflate_anti_aliasing_distance();
        }

        let precision = self.tex_coord_precision_for_rect(quad.shared_quad_state.visible_content_rect);
        let kind = ProgramKind::render_pass(use_aa, pass_quad.mask_resource_id.is_some(), color_matrix.is_some());
        let Some(program) = self.use_program(ProgramKey::new(kind, precision)) else {
            return;
        };

        let source = filtered.as_ref().and_then(ScopedResource::id).unwrap_or(contents_resource);
        let Some(_contents_sampler) = ScopedSampler::new(
            &self.provider,
            &mut self.ctx,
            source,
            TextureTarget::Texture2D,
            wgpu::FilterMode::Linear,
        ) else {
            tracing::warn!("skipping quad for pass {:?}: contents are not readable", id);
            return;
        };
        self.set_uniform(&program, Uniform::Sampler, UniformValue::Int(0));

        let tex_scale_x = quad.rect.width as f32 / contents_size.width as f32;
        let tex_scale_y = quad.rect.height as f32 / contents_size.height as f32;
        if use_aa {
            self.set_uniform(&program, Uniform::TexScale, UniformValue::Vec2([tex_scale_x, tex_scale_y]));
        } else {
            self.set_uniform(
                &program,
                Uniform::TexTransform,
                UniformValue::Vec4([0.0, 0.0, tex_scale_x, tex_scale_y]),
            );
        }

        let _mask_sampler = match pass_quad.mask_resource_id {
            Some(mask) => {
                let mask_uv = pass_quad.mask_uv_rect;
                self.ctx.active_texture(1);
                self.set_uniform(&program, Uniform::MaskSampler, UniformValue::Int(1));
                self.set_uniform(
                    &program,
                    Uniform::MaskTexCoordOffset,
                    UniformValue::Vec2([mask_uv.x(), mask_uv.y()]),
                );
                self.set_uniform(
                    &program,
                    Uniform::MaskTexCoordScale,
                    UniformValue::Vec2([mask_uv.width() / tex_scale_x, mask_uv.height() / tex_scale_y]),
                );
                let sampler = ScopedSampler::new(
                    &self.provider,
                    &mut self.ctx,
                    mask,
                    TextureTarget::Texture2D,
                    wgpu::FilterMode::Linear,
                );
                self.ctx.active_texture(0);
                let Some(sampler) = sampler else {
                    tracing::warn!("skipping quad for pass {:?}: mask {:?} is not readable", id, mask);
                    return;
                };
                Some(sampler)
            }
            None => None,
        };

        if use_aa {
            let edges = edge_array(&device_layer_edges, &device_layer_bounds);
            self.set_uniform(
                &program,
                Uniform::Edge,
                UniformValue::Vec3Array(edges.chunks_exact(3).map(|e| [e[0], e[1], e[2]]).collect()),
            );
        }

        if let Some(matrix) = color_matrix {
            self.set_uniform(&program, Uniform::ColorMatrix, UniformValue::Mat4(color_matrix_uniform(&matrix)));
            self.set_uniform(&program, Uniform::ColorOffset, UniformValue::Vec4(color_offset_uniform(&matrix)));
        }

        // The edges are in device space; the vertex stage wants them back
        // on the unit quad. The flattened transform needs no projection.
        let (surface_quad, _) = contents_device_inverse.map_quad(&device_layer_edges.to_quad());
        self.set_uniform(
            &program,
            Uniform::Quad,
            UniformValue::Vec2Array(surface_quad.points().iter().map(|p| [p.x, p.y]).collect()),
        );

        self.set_blend_enabled(quad.should_draw_with_blending() || use_aa);
        self.set_uniform(&program, Uniform::Alpha, UniformValue::Float(quad.opacity()));
        self.draw_quad_geometry(frame, &program, quad.quad_transform(), &rect);

        if filtered.is_some() {
            // The filtered texture is freed when this returns.
            self.ctx.flush();
        }
    }

    /// Filtered copy of the pixels behind `quad`, in the quad's own space
    ///
    /// Only opaque passes are handled: behind translucent pixels the final
    /// backdrop is not known yet, so their quads draw without one.
    fn draw_background_filters(
        &mut self,
        frame: &mut DrawingFrame,
        quad: &DrawQuad,
        pass_quad: &RenderPassQuad,
        contents_device: &Transform,
        contents_device_inverse: &Transform,
    ) -> Option<ScopedResource> {
        let filters = &pass_quad.background_filters;
        if filters.is_empty() {
            return None;
        }
        let target = frame.current_pass?;
        if target.has_transparent_background {
            tracing::debug!("skipping background filters on a transparent pass");
            return None;
        }
        let _span = tracing::debug_span!("background_filters", filters = filters.len()).entered();

        let outsets = filters.outsets();
        let device_bounds = contents_device.map_rect_bounds(&UNIT_RECT).to_enclosing_int_rect();
        let device_rect = IntRect::new(
            device_bounds.x - outsets.left,
            device_bounds.y - outsets.top,
            device_bounds.width + outsets.left + outsets.right,
            device_bounds.height + outsets.top + outsets.bottom,
        )
        .intersect(&IntRect::from_size(frame.draw_rect.size()));
        if device_rect.is_empty() {
            return None;
        }

        let device_background = self.get_framebuffer_texture(device_rect)?;
        let device_background_id = device_background.id()?;
        let Some(filtered) = self.apply_filters(filters, device_background_id, device_rect.size()) else {
            tracing::debug!("background filters produced no image");
            return None;
        };
        let filtered_id = filtered.id()?;

        let mut background = ScopedResource::new(&self.provider);
        if !background.allocate(&mut self.ctx, quad.rect.size(), FILTER_FORMAT, TextureUsage::Framebuffer) {
            tracing::warn!("could not allocate background texture for {:?}", quad.rect);
            return None;
        }
        let background_id = background.id()?;

        let scissor_enabled = self.state.is_scissor_enabled();
        let scissor_rect = self.state.scissor_rect();
        self.ensure_scissor_test_disabled();

        let copied = self.use_scoped_texture(frame, background_id, quad.rect);
        if copied {
            self.set_blend_enabled(false);
            let device_to_framebuffer =
                quad_rect_transform(&Transform::IDENTITY, &quad.rect.to_rect()) * *contents_device_inverse;
            self.copy_resource_to_framebuffer(frame, filtered_id, device_rect, &device_to_framebuffer);
        }

        if !self.use_render_pass(frame, target) {
            tracing::warn!("could not rebind pass {:?} after background filters", target.id);
        }
        if scissor_enabled {
            self.set_scissor_test_rect(scissor_rect);
        }

        copied.then_some(background)
    }

    /// Copy `rect` of the bound framebuffer into a new texture
    fn get_framebuffer_texture(&mut self, rect: IntRect) -> Option<ScopedResource> {
        let mut texture = ScopedResource::new(&self.provider);
        if !texture.allocate(&mut self.ctx, rect.size(), FILTER_FORMAT, TextureUsage::Any) {
            tracing::warn!("could not allocate read-back texture for {:?}", rect);
            return None;
        }
        let lock = ScopedWriteLock::new(&self.provider, texture.id()?)?;
        if !self.ctx.copy_tex_image(lock.texture_id(), rect) {
            tracing::warn!("framebuffer copy of {:?} failed", rect);
            return None;
        }
        drop(lock);
        Some(texture)
    }

    /// Run `filters` over `source` and upload the result to a new texture
    fn apply_filters(
        &mut self,
        filters: &FilterOperations,
        source: ResourceId,
        size: IntSize,
    ) -> Option<ScopedResource> {
        let image = {
            let lock = ScopedWriteLock::new(&self.provider, source)?;
            self.provider.flush(&mut self.ctx);
            self.filter_evaluator
                .apply(&mut self.ctx, filters, lock.texture_id(), size)
        };
        let Some(image) = image else {
            tracing::debug!("filter evaluation failed for {} operations", filters.len());
            return None;
        };

        let mut filtered = ScopedResource::new(&self.provider);
        if !filtered.allocate(&mut self.ctx, image.size, FILTER_FORMAT, TextureUsage::Any) {
            tracing::warn!("could not allocate {}x{} filter texture", image.size.width, image.size.height);
            return None;
        }
        let id = filtered.id()?;
        let full = IntRect::from_size(image.size);
        self.provider
            .set_pixels(&mut self.ctx, id, &image.pixels, full, full, (0, 0));
        Some(filtered)
    }

    /// Draw `resource` unblended over `rect` under `draw_matrix`
    fn copy_resource_to_framebuffer(
        &mut self,
        frame: &DrawingFrame,
        resource: ResourceId,
        rect: IntRect,
        draw_matrix: &Transform,
    ) {
        let precision = self.tex_coord_precision_for_rect(rect);
        let Some(program) = self.use_program(ProgramKey::new(ProgramKind::render_pass(false, false, false), precision))
        else {
            return;
        };
        let Some(lock) = ScopedReadLock::new(&self.provider, resource) else {
            tracing::warn!("could not read {:?} for copy", resource);
            return;
        };
        self.ctx.bind_texture(TextureTarget::Texture2D, Some(lock.texture_id()));
        self.set_uniform(&program, Uniform::Sampler, UniformValue::Int(0));
        self.set_uniform(&program, Uniform::TexTransform, UniformValue::Vec4([0.0, 0.0, 1.0, 1.0]));
        self.set_uniform(&program, Uniform::Alpha, UniformValue::Float(1.0));
        self.draw_quad_geometry(frame, &program, draw_matrix, &rect.to_rect());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::filter::{apply_color_matrix, saturation_matrix};

    #[test]
    fn color_matrix_uniform_is_column_major() {
        let matrix = saturation_matrix(0.3);
        let uniform = color_matrix_uniform(&matrix);
        let offset = color_offset_uniform(&matrix);
        let color = [0.2, 0.6, 0.4, 1.0];

        let mut shader = [0.0; 4];
        for (row, out) in shader.iter_mut().enumerate() {
            *out = (0..4).map(|column| uniform[column * 4 + row] * color[column]).sum::<f32>() + offset[row];
        }
        let expected = apply_color_matrix(&matrix, color);
        for (a, b) in shader.iter().zip(expected) {
            assert!((a - b).abs() < 1e-5, "{shader:?} != {expected:?}");
        }
    }

    #[test]
    fn offsets_come_from_the_last_column() {
        let mut matrix = [0.0; 20];
        matrix[4] = 0.1;
        matrix[19] = 0.4;
        assert_eq!(color_offset_uniform(&matrix), [0.1, 0.0, 0.0, 0.4]);
    }
}
