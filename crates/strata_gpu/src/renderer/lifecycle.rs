//! Presentation, visibility, memory policy and read-back

use std::rc::Rc;

use image::RgbaImage;
use strata_core::{IntRect, IntSize, RenderPassId};

use super::{Renderer, RendererStats};
use crate::capabilities::RendererCapabilities;
use crate::config::RendererConfig;
use crate::context::GraphicsContext;
use crate::memory::{ManagedMemoryPolicy, MemoryAllocation};
use crate::output_surface::LatencyInfo;
use crate::pass_cache::PassTextureStats;
use crate::resource::{ResourceProvider, SimpleSwapFence};

impl<C: GraphicsContext> Renderer<C> {
    // ─────────────────────────────────────────────────────────────────────────
    // Presentation
    // ─────────────────────────────────────────────────────────────────────────

    /// Present the last frame
    ///
    /// With partial swap only the damage accumulated since the previous
    /// swap is posted. Returns false when nothing could be presented.
    pub fn swap_buffers(&mut self, latency: LatencyInfo) -> bool {
        let _span = tracing::trace_span!("swap_buffers", frame = latency.frame_number).entered();
        if !self.visible {
            tracing::warn!("swap_buffers called while invisible");
            return false;
        }
        if self.is_backbuffer_discarded {
            tracing::warn!("swap_buffers called with a discarded backbuffer");
            return false;
        }

        if self.capabilities.using_partial_swap {
            let viewport = IntRect::from_size(self.viewport_size);
            let mut rect = self.swap_buffer_rect.intersect(&viewport);
            // Swap rects are given from the bottom-left corner.
            rect.y = self.viewport_size.height - rect.y - rect.height;
            self.output_surface.post_sub_buffer(&mut self.ctx, rect, latency);
        } else {
            self.output_surface.swap_buffers(&mut self.ctx, latency);
        }
        self.swap_buffer_rect = IntRect::ZERO;

        // Everything sampled before the previous swap has been consumed.
        if let Some(last) = self.last_swap_fence.take() {
            last.set_has_passed();
        }
        let next = Rc::new(SimpleSwapFence::new());
        self.last_swap_fence = Some(std::mem::replace(&mut self.current_fence, next));
        self.provider.set_read_lock_fence(self.current_fence.clone());
        true
    }

    /// Block until every issued command has completed
    pub fn finish(&mut self) {
        let _span = tracing::trace_span!("finish").entered();
        self.ctx.finish();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Visibility and Memory
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_visible(&mut self, visible: bool) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        self.enforce_memory_policy();
        if self.capabilities.using_set_visibility {
            self.ctx.set_visibility(visible);
        }
    }

    /// React to a new allocation from the memory manager
    ///
    /// An allocation with no visible budget is ignored. Unless the
    /// allocation asks to be enforced only once, it replaces the retained
    /// policy.
    pub fn on_memory_allocation_changed(&mut self, allocation: &MemoryAllocation) {
        if allocation.bytes_limit_when_visible == 0 {
            tracing::debug!("ignoring memory allocation without a visible budget");
            return;
        }
        if !allocation.enforce_but_do_not_keep_as_policy {
            self.memory_policy = ManagedMemoryPolicy::from(allocation);
        }
        tracing::debug!(
            "memory allocation: visible={} hidden={} backbuffer={}",
            allocation.bytes_limit_when_visible,
            allocation.bytes_limit_when_not_visible,
            allocation.suggest_have_backbuffer
        );

        let previous = self.discard_backbuffer_when_not_visible;
        self.discard_backbuffer_when_not_visible = !allocation.suggest_have_backbuffer;
        self.enforce_memory_policy();
        if allocation.enforce_but_do_not_keep_as_policy {
            self.discard_backbuffer_when_not_visible = previous;
        }
    }

    /// Release caches while invisible
    pub fn enforce_memory_policy(&mut self) {
        if self.visible {
            return;
        }
        let _span = tracing::debug_span!("enforce_memory_policy").entered();
        self.current_framebuffer_lock = None;
        self.pass_textures.release_all();
        if self.discard_backbuffer_when_not_visible {
            self.discard_backbuffer();
        }
        self.provider.release_cached_data(&mut self.ctx);
        self.ctx.flush();
    }

    /// Drop the backbuffer; the next frame redraws everything
    pub fn discard_backbuffer(&mut self) {
        if self.is_backbuffer_discarded {
            return;
        }
        self.output_surface.discard_backbuffer(&mut self.ctx);
        self.is_backbuffer_discarded = true;
        self.needs_full_damage = true;
    }

    pub fn ensure_backbuffer(&mut self) {
        if !self.is_backbuffer_discarded {
            return;
        }
        self.output_surface.ensure_backbuffer(&mut self.ctx);
        self.is_backbuffer_discarded = false;
    }

    pub fn set_viewport_size(&mut self, size: IntSize) {
        if self.viewport_size == size {
            return;
        }
        self.viewport_size = size;
        self.is_viewport_changed = true;
        self.needs_full_damage = true;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read-back
    // ─────────────────────────────────────────────────────────────────────────

    /// Pixels of `rect` of the output surface, top row first
    ///
    /// `rect` is in viewport coordinates with the origin at the top-left.
    /// Returns `None` for rects outside the viewport or a lost context.
    pub fn get_framebuffer_pixels(&mut self, rect: IntRect) -> Option<RgbaImage> {
        let viewport = IntRect::from_size(self.viewport_size);
        if rect.is_empty() || !viewport.contains(&rect) {
            tracing::warn!("read-back of {:?} outside viewport {:?}", rect, viewport);
            return None;
        }
        if self.ctx.is_context_lost() {
            return None;
        }
        let _span = tracing::debug_span!("get_framebuffer_pixels").entered();

        self.flush_texture_batch();
        self.output_surface.make_context_current(&mut self.ctx);
        self.current_framebuffer_lock = None;
        self.output_surface.bind_framebuffer(&mut self.ctx);

        let window_rect = IntRect::new(
            rect.x,
            self.viewport_size.height - rect.bottom(),
            rect.width,
            rect.height,
        );
        let pixels = self.ctx.read_pixels(window_rect);
        let row_bytes = rect.width as usize * 4;
        if pixels.len() != row_bytes * rect.height as usize {
            tracing::warn!("read-back returned {} bytes for {:?}", pixels.len(), rect);
            return None;
        }
        let flipped: Vec<u8> = pixels.chunks_exact(row_bytes).rev().flatten().copied().collect();

        self.enforce_memory_policy();
        RgbaImage::from_raw(rect.width as u32, rect.height as u32, flipped)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    pub fn capabilities(&self) -> &RendererCapabilities {
        &self.capabilities
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Counters of the last frame
    pub fn stats(&self) -> RendererStats {
        self.stats
    }

    pub fn memory_policy(&self) -> &ManagedMemoryPolicy {
        &self.memory_policy
    }

    pub fn viewport_size(&self) -> IntSize {
        self.viewport_size
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_backbuffer_discarded(&self) -> bool {
        self.is_backbuffer_discarded
    }

    /// Sticky once the context is lost; the renderer must then be recreated
    pub fn is_context_lost(&self) -> bool {
        self.ctx.is_context_lost()
    }

    /// Whether the texture of `id` holds a complete image from a past frame
    pub fn have_cached_resources_for_render_pass(&self, id: RenderPassId) -> bool {
        self.pass_textures.have_cached_resources(id)
    }

    pub fn pass_texture_stats(&self) -> PassTextureStats {
        self.pass_textures.stats()
    }

    pub fn resource_provider(&self) -> &Rc<dyn ResourceProvider> {
        &self.provider
    }
}
