use std::rc::Rc;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::RgbaImage;
use strata_core::{
    DrawQuad, IntRect, IntSize, Material, RenderPass, RenderPassId, SharedQuadState, TextureQuad, Transform,
};
use strata_gpu::resource::TextureUsage;
use strata_gpu::{
    BasicResourceProvider, HeadlessContext, HeadlessOutputSurface, Renderer, RendererConfig, ResourceProvider,
};

const VIEWPORT: IntSize = IntSize::new(256, 256);

fn setup() -> (Renderer<HeadlessContext>, Rc<BasicResourceProvider>) {
    let provider = Rc::new(BasicResourceProvider::new(2048, wgpu::TextureFormat::Rgba8Unorm));
    let mut renderer = match Renderer::new(
        HeadlessContext::new(VIEWPORT.width, VIEWPORT.height),
        Box::new(HeadlessOutputSurface::new()),
        provider.clone(),
        RendererConfig::default(),
    ) {
        Ok(renderer) => renderer,
        Err(err) => panic!("renderer creation failed: {err}"),
    };
    renderer.set_viewport_size(VIEWPORT);
    (renderer, provider)
}

/// Root pass of `count` 8x8 texture quads laid out on a grid, cycling
/// through `textures`
fn grid_frame(count: usize, textures: &[strata_core::ResourceId]) -> RenderPass {
    let mut root = RenderPass::new(RenderPassId::new(1, 0), IntRect::from_size(VIEWPORT));
    let columns = VIEWPORT.width / 8;
    for i in 0..count {
        let (x, y) = ((i as i32 % columns) * 8, (i as i32 / columns) * 8);
        let state = Arc::new(SharedQuadState::new(
            Transform::translation(x as f32, y as f32, 0.0),
            IntSize::new(8, 8),
        ));
        let texture = textures[i % textures.len()];
        root.push_quad(DrawQuad::new(
            state,
            IntRect::new(0, 0, 8, 8),
            Material::Texture(TextureQuad::new(texture)),
        ));
    }
    root
}

fn bench_texture_batching(c: &mut Criterion) {
    let mut group = c.benchmark_group("texture_batching");
    for (label, texture_count) in [("shared", 1), ("alternating", 2)] {
        for quads in [64, 256] {
            let (mut renderer, provider) = setup();
            let textures: Vec<_> = (0..texture_count)
                .map(|i| {
                    let id = provider
                        .create_resource(
                            renderer.context_mut(),
                            IntSize::new(8, 8),
                            wgpu::TextureFormat::Rgba8Unorm,
                            TextureUsage::Any,
                        )
                        .expect("texture allocation");
                    let image = RgbaImage::from_pixel(8, 8, image::Rgba([255, 40 * i as u8, 0, 255]));
                    provider.upload_image(renderer.context_mut(), id, &image);
                    id
                })
                .collect();
            let frame = [grid_frame(quads, &textures)];

            group.bench_with_input(BenchmarkId::new(label, quads), &frame, |b, frame| {
                b.iter(|| {
                    renderer.draw_frame(black_box(frame));
                    renderer.context_mut().clear_calls();
                    black_box(renderer.stats().draw_calls)
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_texture_batching);
criterion_main!(benches);
