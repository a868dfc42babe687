//! Output surface contract
//!
//! The output surface owns the window-system side of presentation: making
//! the context current, sizing and presenting the default framebuffer.

use smallvec::SmallVec;
use strata_core::{IntRect, IntSize};

use crate::context::GraphicsContext;

/// Input-latency bookkeeping forwarded with every present
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LatencyInfo {
    pub frame_number: u64,
    /// Input events whose effects are contained in this frame
    pub input_event_ids: SmallVec<[u64; 4]>,
}

impl LatencyInfo {
    pub fn new(frame_number: u64) -> Self {
        Self {
            frame_number,
            input_event_ids: SmallVec::new(),
        }
    }

    pub fn with_input_event(mut self, id: u64) -> Self {
        self.input_event_ids.push(id);
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutputSurfaceCapabilities {
    /// The surface reports when a swap has been consumed
    pub has_swap_complete_callback: bool,
}

/// Presentation target the renderer draws its root pass into
pub trait OutputSurface {
    fn capabilities(&self) -> OutputSurfaceCapabilities;
    fn make_context_current(&mut self, ctx: &mut dyn GraphicsContext) -> bool;
    fn reshape(&mut self, ctx: &mut dyn GraphicsContext, size: IntSize);
    /// Bind the default framebuffer for drawing
    fn bind_framebuffer(&mut self, ctx: &mut dyn GraphicsContext);
    fn swap_buffers(&mut self, ctx: &mut dyn GraphicsContext, latency: LatencyInfo);
    fn post_sub_buffer(&mut self, ctx: &mut dyn GraphicsContext, rect: IntRect, latency: LatencyInfo);
    fn discard_backbuffer(&mut self, ctx: &mut dyn GraphicsContext);
    fn ensure_backbuffer(&mut self, ctx: &mut dyn GraphicsContext);
}
