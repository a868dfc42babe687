//! Quad renderer
//!
//! `Renderer` draws a frame of render passes through a `GraphicsContext`.
//! Passes are drawn in dependency order: every non-root pass renders into a
//! cached texture, the last pass renders into the output surface. Inside a
//! pass quads are dispatched in list order to one routine per material;
//! textured quads are deferred into a batch that is flushed before anything
//! that could observe it.
//!
//! The renderer is single-threaded. Failures after construction are handled
//! locally: quads that cannot be drawn are skipped and a lost context turns
//! the remaining work into no-ops, reported through
//! [`Renderer::is_context_lost`].

mod background;
mod lifecycle;
mod quads;

use std::rc::Rc;

use image::RgbaImage;
use strata_core::{is_in_dependency_order, DrawQuad, IntRect, IntSize, Material, Rect, RenderPass, ResourceId};

use crate::batch::TextureQuadBatch;
use crate::capabilities::RendererCapabilities;
use crate::config::{self, RendererConfig};
use crate::context::{quad_indices, Capability, FramebufferId, GraphicsContext, MAX_QUADS_PER_DRAW};
use crate::error::{RendererError, Result};
use crate::filters::{CpuFilterEvaluator, FilterEvaluator};
use crate::frame::{DrawingFrame, PassTarget};
use crate::matrices::TargetMatrices;
use crate::memory::ManagedMemoryPolicy;
use crate::output_surface::OutputSurface;
use crate::pass_cache::RenderPassTextureCache;
use crate::program::{ProgramCache, ProgramKey, ProgramKind, TexCoordPrecision};
use crate::resource::{ResourceProvider, ScopedResource, ScopedWriteLock, SimpleSwapFence};
use crate::state::DrawStateShadow;

/// Format of every render-pass texture
pub const PASS_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Per-frame counters, reset when a frame begins
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RendererStats {
    /// Draw calls issued, batched or not
    pub draw_calls: u32,
    /// Texture batches drawn
    pub batches_flushed: u32,
    /// Quads dropped because their scissor was empty
    pub quads_skipped: u32,
    pub program_binds: u32,
}

/// Bitmap and texture reused for on-demand picture rasterization
struct OnDemandRaster {
    resource: ScopedResource,
    bitmap: RgbaImage,
}

pub struct Renderer<C: GraphicsContext> {
    ctx: C,
    output_surface: Box<dyn OutputSurface>,
    provider: Rc<dyn ResourceProvider>,
    filter_evaluator: Box<dyn FilterEvaluator>,
    config: RendererConfig,
    capabilities: RendererCapabilities,

    programs: ProgramCache,
    state: DrawStateShadow,
    batch: TextureQuadBatch,
    pass_textures: RenderPassTextureCache,

    offscreen_framebuffer: FramebufferId,
    /// Write lock on the texture bound as the current render target
    current_framebuffer_lock: Option<ScopedWriteLock>,
    on_demand_raster: Option<OnDemandRaster>,

    viewport_size: IntSize,
    is_viewport_changed: bool,
    visible: bool,
    is_backbuffer_discarded: bool,
    discard_backbuffer_when_not_visible: bool,
    /// Next frame must redraw everything, e.g. after a discarded backbuffer
    needs_full_damage: bool,
    /// Window-space region accumulated for the next partial swap
    swap_buffer_rect: IntRect,

    current_fence: Rc<SimpleSwapFence>,
    last_swap_fence: Option<Rc<SimpleSwapFence>>,
    memory_policy: ManagedMemoryPolicy,
    stats: RendererStats,
}

impl<C: GraphicsContext> Renderer<C> {
    /// Create a renderer drawing through `ctx` into `output_surface`
    ///
    /// Fails when the context is lost or cannot be made current, when the
    /// off-screen framebuffer cannot be created, or when the programs every
    /// frame needs fail to build.
    pub fn new(
        mut ctx: C,
        mut output_surface: Box<dyn OutputSurface>,
        provider: Rc<dyn ResourceProvider>,
        config: RendererConfig,
    ) -> Result<Self> {
        config::log_renderer_config(&config);

        if ctx.is_context_lost() {
            return Err(RendererError::ContextLost);
        }
        if !output_surface.make_context_current(&mut ctx) {
            return Err(RendererError::ContextNotCurrent);
        }

        let surface_capabilities = output_surface.capabilities();
        let mut capabilities = RendererCapabilities::from_extensions(
            ctx.extensions(),
            provider.max_texture_size(),
            provider.best_texture_format(),
        );
        capabilities.using_partial_swap &= config.partial_swap_allowed;
        capabilities.using_swap_complete_callback &= surface_capabilities.has_swap_complete_callback;

        ctx.set_capability(Capability::ScissorTest, false);
        let offscreen_framebuffer = ctx
            .create_framebuffer()
            .ok_or(RendererError::FramebufferUnavailable)?;

        let current_fence = Rc::new(SimpleSwapFence::new());
        provider.set_read_lock_fence(current_fence.clone());

        let mut renderer = Self {
            programs: ProgramCache::new(capabilities.using_bind_uniform),
            state: DrawStateShadow::new(),
            batch: TextureQuadBatch::new(),
            pass_textures: RenderPassTextureCache::new(&provider),
            ctx,
            output_surface,
            provider,
            filter_evaluator: Box::new(CpuFilterEvaluator::new()),
            config,
            capabilities,
            offscreen_framebuffer,
            current_framebuffer_lock: None,
            on_demand_raster: None,
            viewport_size: IntSize::ZERO,
            is_viewport_changed: true,
            visible: true,
            is_backbuffer_discarded: false,
            discard_backbuffer_when_not_visible: false,
            needs_full_damage: true,
            swap_buffer_rect: IntRect::ZERO,
            current_fence,
            last_swap_fence: None,
            memory_policy: ManagedMemoryPolicy::default(),
            stats: RendererStats::default(),
        };
        renderer.initialize_shared_objects()?;
        Ok(renderer)
    }

    /// Replace the evaluator used for filters that are not a color matrix
    pub fn set_filter_evaluator(&mut self, evaluator: Box<dyn FilterEvaluator>) {
        self.filter_evaluator = evaluator;
    }

    /// Build the programs nearly every frame uses
    fn initialize_shared_objects(&mut self) -> Result<()> {
        let _span = tracing::debug_span!("initialize_shared_objects").entered();
        let kinds = [
            ProgramKind::render_pass(false, false, false),
            ProgramKind::tile(false, false, false),
            ProgramKind::tile(false, false, true),
        ];
        for kind in kinds {
            for precision in [TexCoordPrecision::Medium, TexCoordPrecision::High] {
                let key = ProgramKey::new(kind, precision);
                if self.programs.get_or_create(&mut self.ctx, key).is_none() {
                    return Err(if self.ctx.is_context_lost() {
                        RendererError::ContextLost
                    } else {
                        RendererError::ProgramCompilation { key }
                    });
                }
            }
        }
        self.ctx.flush();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Frame
    // ─────────────────────────────────────────────────────────────────────────

    /// Draw `passes`, the last of which is the root pass
    ///
    /// Passes must be in dependency order. Nothing is drawn for an empty
    /// list, an empty viewport or a lost context.
    pub fn draw_frame(&mut self, passes: &[RenderPass]) {
        let Some(root) = passes.last() else {
            return;
        };
        if self.ctx.is_context_lost() {
            tracing::debug!("skipping frame on lost context");
            return;
        }
        let _span = tracing::debug_span!("draw_frame", passes = passes.len()).entered();
        debug_assert!(
            is_in_dependency_order(passes),
            "render passes must be drawn after the passes they reference"
        );

        self.stats = RendererStats::default();
        self.pass_textures.decide_allocations(passes, PASS_TEXTURE_FORMAT);

        let root_damage_rect = if self.capabilities.using_partial_swap && !self.needs_full_damage {
            root.damage_rect
        } else {
            root.output_rect.to_rect()
        };
        let root_damage_rect =
            root_damage_rect.intersect(&IntRect::from_size(self.viewport_size).to_rect());

        let mut frame = DrawingFrame::new(root, root_damage_rect);
        if !self.begin_drawing_frame() {
            return;
        }
        for pass in passes {
            self.draw_render_pass(&mut frame, pass);
        }
        self.finish_drawing_frame(&frame);
    }

    fn begin_drawing_frame(&mut self) -> bool {
        self.ensure_backbuffer();
        if self.viewport_size.is_empty() {
            tracing::debug!("skipping frame for empty viewport");
            return false;
        }
        if self.is_viewport_changed {
            self.is_viewport_changed = false;
            self.output_surface.reshape(&mut self.ctx, self.viewport_size);
        }
        self.output_surface.make_context_current(&mut self.ctx);
        self.ctx.prepare_quad_geometry(&quad_indices(MAX_QUADS_PER_DRAW));
        self.state.begin_frame(&mut self.ctx);
        true
    }

    fn finish_drawing_frame(&mut self, frame: &DrawingFrame) {
        self.flush_texture_batch();
        self.current_framebuffer_lock = None;
        self.swap_buffer_rect = self
            .swap_buffer_rect
            .union(&frame.root_damage_rect.to_enclosing_int_rect());
        self.state.end_frame(&mut self.ctx);
        self.stats.program_binds = self.state.program_binds();
        self.needs_full_damage = false;
        tracing::trace!("frame finished: {:?}", self.stats);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Render Passes
    // ─────────────────────────────────────────────────────────────────────────

    fn draw_render_pass(&mut self, frame: &mut DrawingFrame, pass: &RenderPass) {
        let _span = tracing::trace_span!("draw_render_pass", pass = ?pass.id, quads = pass.quads.len())
            .entered();
        if !self.use_render_pass(frame, PassTarget::from(pass)) {
            tracing::debug!("skipping pass {:?} without a target", pass.id);
            return;
        }

        let using_scissor_as_optimization = self.capabilities.using_partial_swap;
        let mut render_pass_scissor = Rect::ZERO;
        if using_scissor_as_optimization {
            render_pass_scissor = Self::compute_scissor_rect_for_render_pass(frame);
            self.set_scissor_test_rect_in_draw_space(frame, render_pass_scissor);
        }

        if !frame.is_root(pass.id) || self.config.should_clear_root_render_pass {
            if !using_scissor_as_optimization {
                self.ensure_scissor_test_disabled();
            }
            self.clear_framebuffer(pass.has_transparent_background);
        }

        for quad in &pass.quads {
            if using_scissor_as_optimization {
                let mut quad_scissor = render_pass_scissor;
                if let Some(clip) = quad.clip_rect() {
                    quad_scissor = quad_scissor.intersect(&clip.to_rect());
                }
                if quad_scissor.is_empty() {
                    self.stats.quads_skipped += 1;
                    continue;
                }
                self.set_scissor_test_rect_in_draw_space(frame, quad_scissor);
            } else if let Some(clip) = quad.clip_rect() {
                if clip.is_empty() {
                    self.stats.quads_skipped += 1;
                    continue;
                }
                self.set_scissor_test_rect_in_draw_space(frame, clip.to_rect());
            } else {
                self.ensure_scissor_test_disabled();
            }
            self.do_draw_quad(frame, quad);
        }

        self.flush_texture_batch();
        self.pass_textures
            .set_complete(pass.id, !pass.has_occlusion_from_outside_target_surface);
    }

    /// Bind the target of `target` and set up its matrices and viewport
    fn use_render_pass(&mut self, frame: &mut DrawingFrame, target: PassTarget) -> bool {
        frame.current_pass = Some(target);
        frame.current_texture = None;

        if frame.is_root(target.id) {
            self.bind_framebuffer_to_output_surface();
            self.initialize_viewport(frame, target.output_rect, true);
            return true;
        }

        let enlarge = self.config.enlarge_pass_textures;
        let size = target.output_rect.size().enlarge(enlarge.width, enlarge.height);
        let Some(texture) =
            self.pass_textures
                .ensure_allocated(&mut self.ctx, target.id, size, PASS_TEXTURE_FORMAT)
        else {
            return false;
        };
        self.bind_framebuffer_to_texture(frame, texture, target.output_rect)
    }

    /// Draw into a texture that belongs to no pass
    fn use_scoped_texture(&mut self, frame: &mut DrawingFrame, texture: ResourceId, draw_rect: IntRect) -> bool {
        frame.current_pass = None;
        frame.current_texture = None;
        self.bind_framebuffer_to_texture(frame, texture, draw_rect)
    }

    fn bind_framebuffer_to_output_surface(&mut self) {
        self.flush_texture_batch();
        self.current_framebuffer_lock = None;
        self.output_surface.bind_framebuffer(&mut self.ctx);
    }

    fn bind_framebuffer_to_texture(
        &mut self,
        frame: &mut DrawingFrame,
        texture: ResourceId,
        target_rect: IntRect,
    ) -> bool {
        self.flush_texture_batch();
        self.current_framebuffer_lock = None;
        self.ctx.bind_framebuffer(Some(self.offscreen_framebuffer));

        let Some(lock) = ScopedWriteLock::new(&self.provider, texture) else {
            tracing::warn!("could not lock texture {:?} as render target", texture);
            return false;
        };
        self.ctx.framebuffer_texture(Some(lock.texture_id()));
        self.current_framebuffer_lock = Some(lock);
        frame.current_texture = Some(texture);
        self.initialize_viewport(frame, target_rect, false);
        true
    }

    /// Matrices and viewport for a target covering `draw_rect`
    ///
    /// Only the output surface is flipped; textures keep content rows in
    /// sampling order.
    fn initialize_viewport(&mut self, frame: &mut DrawingFrame, draw_rect: IntRect, flip_y: bool) {
        frame.draw_rect = draw_rect;
        frame.matrices = TargetMatrices::new(draw_rect, flip_y);
        self.ctx.viewport(IntRect::from_size(draw_rect.size()));
    }

    fn clear_framebuffer(&mut self, has_transparent_background: bool) {
        if has_transparent_background {
            self.ctx.clear_color([0.0, 0.0, 0.0, 0.0]);
        } else {
            self.ctx.clear_color([0.0, 0.0, 1.0, 1.0]);
        }
        if has_transparent_background || self.config.debug_clear_root {
            self.ctx.clear();
        }
    }

    /// Root damage projected into the current pass, clipped to its output
    fn compute_scissor_rect_for_render_pass(frame: &DrawingFrame) -> Rect {
        let Some(pass) = frame.current_pass else {
            return Rect::ZERO;
        };
        let mut scissor = pass.output_rect.to_rect();
        if frame.root_damage_rect == frame.root_pass.output_rect.to_rect() {
            return scissor;
        }
        if let Some(inverse) = pass.transform_to_root_target.inverse() {
            scissor = scissor.intersect(&inverse.map_rect_bounds(&frame.root_damage_rect));
        }
        scissor
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scissor
    // ─────────────────────────────────────────────────────────────────────────

    /// Window-space pixels of a draw-space rect in the bound target
    fn move_from_draw_to_window_space(frame: &DrawingFrame, draw_rect: Rect) -> IntRect {
        let target = frame.draw_rect;
        let mut window = draw_rect.to_enclosing_int_rect().offset(-target.x, -target.y);
        if frame.matrices.flipped_y {
            window.y = target.height - window.bottom();
        }
        window
    }

    fn set_scissor_test_rect_in_draw_space(&mut self, frame: &DrawingFrame, draw_rect: Rect) {
        let window = Self::move_from_draw_to_window_space(frame, draw_rect);
        self.set_scissor_test_rect(window);
    }

    fn set_scissor_test_rect(&mut self, rect: IntRect) {
        self.ensure_scissor_test_enabled();
        if !self.state.scissor_changes(rect) {
            return;
        }
        self.flush_texture_batch();
        self.state.set_scissor_rect(&mut self.ctx, rect);
    }

    fn ensure_scissor_test_enabled(&mut self) {
        if self.state.is_scissor_enabled() {
            return;
        }
        self.flush_texture_batch();
        self.state.set_scissor_test(&mut self.ctx, true);
    }

    fn ensure_scissor_test_disabled(&mut self) {
        if !self.state.is_scissor_enabled() {
            return;
        }
        self.flush_texture_batch();
        self.state.set_scissor_test(&mut self.ctx, false);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────────────────

    fn do_draw_quad(&mut self, frame: &mut DrawingFrame, quad: &DrawQuad) {
        debug_assert!(
            quad.rect.contains(&quad.visible_rect) || quad.visible_rect.is_empty(),
            "visible rect {:?} escapes quad rect {:?}",
            quad.visible_rect,
            quad.rect
        );
        if !matches!(quad.material, Material::Texture(_)) {
            self.flush_texture_batch();
        }

        match &quad.material {
            Material::Checkerboard { color } => self.draw_checkerboard_quad(frame, quad, *color),
            Material::DebugBorder { color, width } => {
                self.draw_debug_border_quad(frame, quad, *color, *width)
            }
            Material::SolidColor { color } => self.draw_solid_color_quad(frame, quad, *color),
            Material::Tile(tile) => self.draw_tile_quad(frame, quad, tile),
            Material::Texture(texture) => self.enqueue_texture_quad(frame, quad, texture),
            Material::YuvVideo(video) => self.draw_yuv_video_quad(frame, quad, video),
            Material::StreamVideo(video) => self.draw_stream_video_quad(frame, quad, video),
            Material::Picture(picture) => self.draw_picture_quad(frame, quad, picture),
            Material::RenderPass(pass_quad) => self.draw_render_pass_quad(frame, quad, pass_quad),
        }
    }
}

impl<C: GraphicsContext> Drop for Renderer<C> {
    fn drop(&mut self) {
        self.current_framebuffer_lock = None;
        self.output_surface.make_context_current(&mut self.ctx);
        self.programs.release_all(&mut self.ctx);
        self.state.reset_program();
        self.ctx.delete_framebuffer(self.offscreen_framebuffer);
        self.on_demand_raster = None;
        self.pass_textures.release_all();
    }
}
