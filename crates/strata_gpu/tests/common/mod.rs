//! Shared fixtures for renderer integration tests

#![allow(dead_code)]

use std::rc::Rc;
use std::sync::Arc;

use image::RgbaImage;
use strata_core::{Color, DrawQuad, IntRect, IntSize, Material, RenderPass, RenderPassId, ResourceId, SharedQuadState, Transform};
use strata_gpu::resource::TextureUsage;
use strata_gpu::{
    BasicResourceProvider, HeadlessContext, HeadlessOutputSurface, Renderer, RendererConfig, ResourceProvider,
};

pub const ROOT_ID: RenderPassId = RenderPassId::new(1, 0);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub renderer: Renderer<HeadlessContext>,
    pub provider: Rc<BasicResourceProvider>,
}

impl Harness {
    pub fn new(width: i32, height: i32) -> Self {
        Self::with_context(HeadlessContext::new(width, height))
    }

    pub fn with_context(ctx: HeadlessContext) -> Self {
        init_tracing();
        let size = ctx.backbuffer_size();
        let provider = Rc::new(BasicResourceProvider::new(2048, wgpu::TextureFormat::Rgba8Unorm));
        let shared: Rc<dyn ResourceProvider> = provider.clone();
        let mut renderer = match Renderer::new(
            ctx,
            Box::new(HeadlessOutputSurface::new()),
            shared,
            RendererConfig::default(),
        ) {
            Ok(renderer) => renderer,
            Err(err) => panic!("renderer creation failed: {err}"),
        };
        renderer.set_viewport_size(size);
        Self { renderer, provider }
    }

    /// Upload an image filled with `rgba` and return its resource
    pub fn solid_texture(&mut self, size: IntSize, rgba: [u8; 4]) -> ResourceId {
        let image = RgbaImage::from_pixel(size.width as u32, size.height as u32, image::Rgba(rgba));
        self.texture_from_image(&image)
    }

    pub fn texture_from_image(&mut self, image: &RgbaImage) -> ResourceId {
        let size = IntSize::new(image.width() as i32, image.height() as i32);
        let id = self
            .provider
            .create_resource(
                self.renderer.context_mut(),
                size,
                wgpu::TextureFormat::Rgba8Unorm,
                TextureUsage::Any,
            )
            .expect("texture allocation");
        self.provider.upload_image(self.renderer.context_mut(), id, image);
        id
    }

    /// Read the whole viewport back, top row first
    pub fn read_back(&mut self) -> RgbaImage {
        let size = self.renderer.viewport_size();
        self.renderer
            .get_framebuffer_pixels(IntRect::from_size(size))
            .expect("read-back")
    }
}

pub fn root_pass(size: IntSize) -> RenderPass {
    RenderPass::new(ROOT_ID, IntRect::from_size(size))
}

pub fn state(transform: Transform, bounds: IntSize) -> Arc<SharedQuadState> {
    Arc::new(SharedQuadState::new(transform, bounds))
}

/// Solid quad filling its own layer
pub fn solid_quad(rect: IntRect, color: Color) -> DrawQuad {
    let layer = state(Transform::translation(rect.x as f32, rect.y as f32, 0.0), rect.size());
    DrawQuad::new(layer, IntRect::from_size(rect.size()), Material::SolidColor { color })
}

pub fn assert_pixel_near(actual: [u8; 4], expected: [u8; 4], tolerance: u8) {
    for (a, e) in actual.iter().zip(expected) {
        assert!(a.abs_diff(e) <= tolerance, "pixel {actual:?} is not within {tolerance} of {expected:?}");
    }
}
