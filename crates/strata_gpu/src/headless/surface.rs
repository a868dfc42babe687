//! Output surface backed by the headless context's default framebuffer

use std::cell::RefCell;
use std::rc::Rc;

use strata_core::{IntRect, IntSize};

use crate::context::GraphicsContext;
use crate::output_surface::{LatencyInfo, OutputSurface, OutputSurfaceCapabilities};

/// Presents into the default framebuffer of whatever context it is handed
///
/// Latency info of every present is appended to a shared log, so it can be
/// inspected after the surface has been moved into a renderer.
#[derive(Debug, Default)]
pub struct HeadlessOutputSurface {
    capabilities: OutputSurfaceCapabilities,
    size: IntSize,
    presented: Rc<RefCell<Vec<LatencyInfo>>>,
}

impl HeadlessOutputSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_swap_complete_callback(mut self) -> Self {
        self.capabilities.has_swap_complete_callback = true;
        self
    }

    /// Shared log of the latency info passed to every present
    pub fn presented(&self) -> Rc<RefCell<Vec<LatencyInfo>>> {
        Rc::clone(&self.presented)
    }

    pub fn size(&self) -> IntSize {
        self.size
    }
}

impl OutputSurface for HeadlessOutputSurface {
    fn capabilities(&self) -> OutputSurfaceCapabilities {
        self.capabilities
    }

    fn make_context_current(&mut self, ctx: &mut dyn GraphicsContext) -> bool {
        ctx.make_current()
    }

    fn reshape(&mut self, ctx: &mut dyn GraphicsContext, size: IntSize) {
        tracing::debug!("reshape output surface to {}x{}", size.width, size.height);
        self.size = size;
        ctx.resize(size);
    }

    fn bind_framebuffer(&mut self, ctx: &mut dyn GraphicsContext) {
        ctx.bind_framebuffer(None);
    }

    fn swap_buffers(&mut self, ctx: &mut dyn GraphicsContext, latency: LatencyInfo) {
        ctx.swap_buffers();
        self.presented.borrow_mut().push(latency);
    }

    fn post_sub_buffer(&mut self, ctx: &mut dyn GraphicsContext, rect: IntRect, latency: LatencyInfo) {
        ctx.post_sub_buffer(rect);
        self.presented.borrow_mut().push(latency);
    }

    fn discard_backbuffer(&mut self, ctx: &mut dyn GraphicsContext) {
        ctx.discard_backbuffer();
    }

    fn ensure_backbuffer(&mut self, ctx: &mut dyn GraphicsContext) {
        ctx.ensure_backbuffer();
    }
}
