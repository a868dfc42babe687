mod common;

use std::collections::HashSet;

use common::{root_pass, state, Harness};
use strata_core::{DrawQuad, IntRect, IntSize, Material, TextureQuad, Transform};
use strata_gpu::program::ProgramDescriptor;
use strata_gpu::shaders::validate_wgsl;
use strata_gpu::{
    BasicResourceProvider, HeadlessContext, HeadlessOutputSurface, ProgramCache, ProgramKind, Renderer,
    RendererConfig, TexCoordPrecision,
};

#[test]
fn every_program_variant_validates_and_links() {
    common::init_tracing();
    let mut ctx = HeadlessContext::new(16, 16);
    let mut cache = ProgramCache::new(false);
    let keys = ProgramKind::all_keys();

    for key in &keys {
        let descriptor = ProgramDescriptor::new(*key, false);
        if let Err(err) = validate_wgsl(&descriptor.source) {
            panic!("{} does not validate: {err}", key.label());
        }
        assert!(cache.get_or_create(&mut ctx, *key).is_some(), "{} failed to link", key.label());
    }

    assert_eq!(cache.len(), keys.len());
    assert_eq!(ctx.live_programs(), keys.len());
    let labels: HashSet<String> = keys.iter().map(|key| key.label()).collect();
    assert_eq!(labels.len(), keys.len());
}

#[test]
fn large_layers_select_high_precision_programs() {
    common::init_tracing();
    let provider = BasicResourceProvider::new(2048, wgpu::TextureFormat::Rgba8Unorm);
    let provider = std::rc::Rc::new(provider);
    let config = RendererConfig {
        highp_threshold_min: 64,
        ..RendererConfig::default()
    };
    let mut renderer = match Renderer::new(
        HeadlessContext::new(100, 100),
        Box::new(HeadlessOutputSurface::new()),
        provider.clone(),
        config,
    ) {
        Ok(renderer) => renderer,
        Err(err) => panic!("renderer creation failed: {err}"),
    };
    renderer.set_viewport_size(IntSize::new(100, 100));

    let mut harness = Harness { renderer, provider };
    let texture = harness.solid_texture(IntSize::new(4, 4), [255, 255, 255, 255]);

    let small = state(Transform::IDENTITY, IntSize::new(32, 32));
    let large = state(Transform::IDENTITY, IntSize::new(100, 100));
    let mut root = root_pass(IntSize::new(100, 100));
    root.push_quad(DrawQuad::new(small, IntRect::new(0, 0, 32, 32), Material::Texture(TextureQuad::new(texture))));
    root.push_quad(DrawQuad::new(large, IntRect::new(0, 0, 100, 100), Material::Texture(TextureQuad::new(texture))));
    harness.renderer.draw_frame(&[root]);

    let precisions: Vec<_> = harness
        .renderer
        .context()
        .draws()
        .iter()
        .filter_map(|draw| draw.key.map(|key| key.precision))
        .collect();
    assert_eq!(precisions, vec![TexCoordPrecision::Medium, TexCoordPrecision::High]);
}
