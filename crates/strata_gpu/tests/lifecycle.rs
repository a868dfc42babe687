mod common;

use common::{root_pass, solid_quad, Harness};
use strata_core::{Color, IntRect, IntSize, Rect, RenderPass, RenderPassId};
use strata_gpu::capabilities::extensions;
use strata_gpu::headless::Call;
use strata_gpu::{
    BasicResourceProvider, HeadlessContext, HeadlessOutputSurface, LatencyInfo, ManagedMemoryPolicy,
    MemoryAllocation, Renderer, RendererConfig, RendererError,
};

const SIZE: IntSize = IntSize::new(100, 100);

fn create(ctx: HeadlessContext) -> Option<RendererError> {
    let provider = BasicResourceProvider::new(2048, wgpu::TextureFormat::Rgba8Unorm).into_shared();
    Renderer::new(ctx, Box::new(HeadlessOutputSurface::new()), provider, RendererConfig::default()).err()
}

fn red_frame() -> Vec<RenderPass> {
    let mut root = root_pass(SIZE);
    root.push_quad(solid_quad(IntRect::from_size(SIZE), Color::RED));
    vec![root]
}

fn posted_rects(ctx: &HeadlessContext) -> Vec<IntRect> {
    ctx.calls()
        .iter()
        .filter_map(|call| match call {
            Call::PostSubBuffer(rect) => Some(*rect),
            _ => None,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Creation and Context Loss
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn creation_fails_on_a_lost_context() {
    let mut ctx = HeadlessContext::new(100, 100);
    ctx.lose_context();
    assert!(matches!(create(ctx), Some(RendererError::ContextLost)));
}

#[test]
fn creation_fails_when_shared_programs_do_not_link() {
    let mut ctx = HeadlessContext::new(100, 100);
    ctx.set_fail_program_links(true);
    assert!(matches!(create(ctx), Some(RendererError::ProgramCompilation { .. })));
}

#[test]
fn frames_are_dropped_after_context_loss() {
    let mut harness = Harness::new(100, 100);
    harness.renderer.context_mut().lose_context();
    harness.renderer.context_mut().clear_calls();

    harness.renderer.draw_frame(&red_frame());
    assert!(harness.renderer.is_context_lost());
    assert!(harness.renderer.context().draws().is_empty());
    assert!(harness.renderer.get_framebuffer_pixels(IntRect::new(0, 0, 10, 10)).is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Presentation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn full_swap_presents_the_whole_surface() {
    let surface = HeadlessOutputSurface::new();
    let presented = surface.presented();
    let provider = BasicResourceProvider::new(2048, wgpu::TextureFormat::Rgba8Unorm).into_shared();
    let mut renderer = match Renderer::new(
        HeadlessContext::new(100, 100),
        Box::new(surface),
        provider,
        RendererConfig::default(),
    ) {
        Ok(renderer) => renderer,
        Err(err) => panic!("renderer creation failed: {err}"),
    };
    renderer.set_viewport_size(SIZE);

    renderer.draw_frame(&red_frame());
    assert!(renderer.swap_buffers(LatencyInfo::new(7).with_input_event(3)));

    assert_eq!(renderer.context().swap_count(), 1);
    assert!(posted_rects(renderer.context()).is_empty());
    let log = presented.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].frame_number, 7);
    assert_eq!(log[0].input_event_ids.as_slice(), &[3]);
}

#[test]
fn partial_swap_posts_only_the_damage() {
    let ctx = HeadlessContext::new(100, 100).with_extensions([extensions::POST_SUB_BUFFER]);
    let mut harness = Harness::with_context(ctx);
    assert!(harness.renderer.capabilities().using_partial_swap);

    harness.renderer.draw_frame(&red_frame());
    harness.renderer.swap_buffers(LatencyInfo::new(1));
    assert_eq!(posted_rects(harness.renderer.context()), vec![IntRect::new(0, 0, 100, 100)]);

    harness.renderer.context_mut().clear_calls();
    let mut frame = red_frame();
    frame[0] = frame[0].clone().with_damage_rect(Rect::new(10.0, 10.0, 20.0, 20.0));
    harness.renderer.draw_frame(&frame);

    let draws = harness.renderer.context().draws();
    assert_eq!(draws.len(), 1);
    // Scissor and swap rects are in window space, origin at the bottom.
    assert_eq!(draws[0].scissor, Some(IntRect::new(10, 70, 20, 20)));

    harness.renderer.swap_buffers(LatencyInfo::new(2));
    assert_eq!(posted_rects(harness.renderer.context()), vec![IntRect::new(10, 70, 20, 20)]);
}

#[test]
fn partial_swap_can_be_disabled_by_config() {
    let ctx = HeadlessContext::new(100, 100).with_extensions([extensions::POST_SUB_BUFFER]);
    let provider = BasicResourceProvider::new(2048, wgpu::TextureFormat::Rgba8Unorm).into_shared();
    let config = RendererConfig {
        partial_swap_allowed: false,
        ..RendererConfig::default()
    };
    let renderer = match Renderer::new(ctx, Box::new(HeadlessOutputSurface::new()), provider, config) {
        Ok(renderer) => renderer,
        Err(err) => panic!("renderer creation failed: {err}"),
    };
    assert!(!renderer.capabilities().using_partial_swap);
}

#[test]
fn read_back_outside_the_viewport_is_rejected() {
    let mut harness = Harness::new(100, 100);
    harness.renderer.draw_frame(&red_frame());

    assert!(harness.renderer.get_framebuffer_pixels(IntRect::new(90, 90, 20, 20)).is_none());
    assert!(harness.renderer.get_framebuffer_pixels(IntRect::new(0, 0, 0, 0)).is_none());
    let corner = harness
        .renderer
        .get_framebuffer_pixels(IntRect::new(90, 90, 10, 10))
        .expect("read-back");
    assert_eq!(corner.dimensions(), (10, 10));
    assert_eq!(corner.get_pixel(9, 9).0, [255, 0, 0, 255]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Visibility and Memory
// ─────────────────────────────────────────────────────────────────────────────

fn frame_with_child() -> (RenderPassId, Vec<RenderPass>) {
    let child_id = RenderPassId::new(2, 0);
    let mut child = RenderPass::new(child_id, IntRect::new(0, 0, 20, 20));
    child.push_quad(solid_quad(IntRect::new(0, 0, 20, 20), Color::GREEN));
    let mut frame = red_frame();
    frame.insert(0, child);
    (child_id, frame)
}

#[test]
fn hiding_releases_pass_textures_and_the_backbuffer() {
    let ctx = HeadlessContext::new(100, 100).with_extensions([extensions::SET_VISIBILITY]);
    let mut harness = Harness::with_context(ctx);
    let (child_id, frame) = frame_with_child();
    harness.renderer.draw_frame(&frame);
    assert!(harness.renderer.have_cached_resources_for_render_pass(child_id));

    harness.renderer.on_memory_allocation_changed(&MemoryAllocation {
        suggest_have_backbuffer: false,
        ..MemoryAllocation::default()
    });
    assert!(!harness.renderer.is_backbuffer_discarded());

    harness.renderer.set_visible(false);
    assert!(!harness.renderer.context().is_visible());
    assert!(harness.renderer.is_backbuffer_discarded());
    assert!(harness.renderer.context().is_backbuffer_discarded());
    assert!(!harness.renderer.have_cached_resources_for_render_pass(child_id));
    assert!(!harness.renderer.swap_buffers(LatencyInfo::new(1)));

    harness.renderer.set_visible(true);
    harness.renderer.draw_frame(&frame);
    assert!(!harness.renderer.is_backbuffer_discarded());
    assert!(harness.renderer.swap_buffers(LatencyInfo::new(2)));
}

#[test]
fn hidden_renderer_keeps_the_backbuffer_by_default() {
    let mut harness = Harness::new(100, 100);
    harness.renderer.draw_frame(&red_frame());
    harness.renderer.set_visible(false);
    assert!(!harness.renderer.is_backbuffer_discarded());
    assert!(!harness.renderer.is_visible());
}

#[test]
fn allocation_without_visible_budget_is_ignored() {
    let mut harness = Harness::new(100, 100);
    harness.renderer.on_memory_allocation_changed(&MemoryAllocation {
        bytes_limit_when_visible: 0,
        suggest_have_backbuffer: false,
        ..MemoryAllocation::default()
    });
    assert_eq!(*harness.renderer.memory_policy(), ManagedMemoryPolicy::default());

    harness.renderer.set_visible(false);
    assert!(!harness.renderer.is_backbuffer_discarded());
}

#[test]
fn allocation_replaces_the_policy_unless_enforced_once() {
    let mut harness = Harness::new(100, 100);
    let allocation = MemoryAllocation {
        bytes_limit_when_visible: 8 * 1024 * 1024,
        ..MemoryAllocation::default()
    };
    harness.renderer.on_memory_allocation_changed(&allocation);
    assert_eq!(*harness.renderer.memory_policy(), ManagedMemoryPolicy::from(&allocation));

    harness.renderer.on_memory_allocation_changed(&MemoryAllocation {
        bytes_limit_when_visible: 1024,
        enforce_but_do_not_keep_as_policy: true,
        ..MemoryAllocation::default()
    });
    assert_eq!(harness.renderer.memory_policy().bytes_limit(true), 8 * 1024 * 1024);
}

#[test]
fn one_shot_allocation_does_not_change_backbuffer_retention() {
    let mut harness = Harness::new(100, 100);
    harness.renderer.on_memory_allocation_changed(&MemoryAllocation {
        suggest_have_backbuffer: false,
        enforce_but_do_not_keep_as_policy: true,
        ..MemoryAllocation::default()
    });
    harness.renderer.set_visible(false);
    assert!(!harness.renderer.is_backbuffer_discarded());
}

