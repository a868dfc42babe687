mod common;

use std::sync::Arc;

use common::{assert_pixel_near, root_pass, state, Harness};
use image::RgbaImage;
use strata_core::{
    Color, DrawQuad, IntRect, IntSize, Material, PictureQuad, Rect, RectPicture, ResourceId, Size,
    StreamVideoQuad, TileQuad, Transform, YuvVideoQuad,
};
use strata_gpu::capabilities::extensions;
use strata_gpu::context::PrimitiveMode;
use strata_gpu::{HeadlessContext, ProgramKind};

const SIZE: IntSize = IntSize::new(100, 100);

fn single_draw_kind(harness: &Harness) -> Option<ProgramKind> {
    let draws = harness.renderer.context().draws();
    assert_eq!(draws.len(), 1, "expected one draw, got {draws:?}");
    draws[0].key.map(|key| key.kind)
}

fn tile(resource: ResourceId, tex_coord_rect: Rect, texture_size: IntSize, swizzle: bool) -> Material {
    Material::Tile(TileQuad {
        resource_id: resource,
        tex_coord_rect,
        texture_size,
        swizzle_contents: swizzle,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tiles
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn opaque_swizzled_tile_uses_the_opaque_swizzle_program() {
    let mut harness = Harness::new(100, 100);
    // Red as stored, blue once the BGRA channels are swapped back.
    let texture = harness.solid_texture(IntSize::new(10, 10), [255, 0, 0, 255]);
    let rect = IntRect::new(0, 0, 10, 10);
    let quad = DrawQuad::new(
        state(Transform::IDENTITY, IntSize::new(10, 10)),
        rect,
        tile(texture, Rect::new(0.0, 0.0, 10.0, 10.0), IntSize::new(10, 10), true),
    )
    .with_opaque_rect(rect);
    let mut root = root_pass(SIZE);
    root.push_quad(quad);
    harness.renderer.draw_frame(&[root]);

    assert_eq!(
        single_draw_kind(&harness),
        Some(ProgramKind::Tile { aa: false, swizzle: true, opaque: true })
    );
    assert_eq!(harness.renderer.context().draws()[0].blend, None);
    let pixels = harness.read_back();
    assert_eq!(pixels.get_pixel(2, 2).0, [0, 0, 255, 255]);
    assert_eq!(pixels.get_pixel(20, 20).0, [0, 0, 0, 0]);
}

#[test]
fn translucent_tile_blends_with_the_plain_program() {
    let mut harness = Harness::new(100, 100);
    let texture = harness.solid_texture(IntSize::new(10, 10), [0, 255, 0, 255]);
    let quad = DrawQuad::new(
        state(Transform::translation(20.0, 20.0, 0.0), IntSize::new(10, 10)),
        IntRect::new(0, 0, 10, 10),
        tile(texture, Rect::new(0.0, 0.0, 10.0, 10.0), IntSize::new(10, 10), false),
    );
    let mut root = root_pass(SIZE);
    root.push_quad(quad);
    harness.renderer.draw_frame(&[root]);

    assert_eq!(
        single_draw_kind(&harness),
        Some(ProgramKind::Tile { aa: false, swizzle: false, opaque: false })
    );
    assert!(harness.renderer.context().draws()[0].blend.is_some());
    assert_eq!(harness.read_back().get_pixel(25, 25).0, [0, 255, 0, 255]);
}

#[test]
fn rotated_tile_samples_stay_inside_the_tile() {
    let mut harness = Harness::new(100, 100);
    // The tile is the red left half; the blue right half belongs to a neighbour.
    let atlas = RgbaImage::from_fn(20, 10, |x, _| {
        if x < 10 {
            image::Rgba([255, 0, 0, 255])
        } else {
            image::Rgba([0, 0, 255, 255])
        }
    });
    let texture = harness.texture_from_image(&atlas);

    let transform = Transform::translation(50.0, 50.0, 0.0)
        * Transform::rotation_z(15.0)
        * Transform::translation(-10.0, -10.0, 0.0);
    let quad = DrawQuad::new(
        state(transform, IntSize::new(20, 20)),
        IntRect::new(0, 0, 20, 20),
        tile(texture, Rect::new(0.0, 0.0, 10.0, 10.0), IntSize::new(20, 10), false),
    );
    let mut root = root_pass(SIZE);
    root.push_quad(quad);
    harness.renderer.draw_frame(&[root]);

    assert_eq!(
        single_draw_kind(&harness),
        Some(ProgramKind::Tile { aa: true, swizzle: false, opaque: false })
    );
    let pixels = harness.read_back();
    assert_eq!(pixels.get_pixel(50, 50).0, [255, 0, 0, 255]);
    let bled = pixels.pixels().filter(|p| p.0[2] > 0).count();
    assert_eq!(bled, 0, "neighbouring texels leaked into the tile");
    assert!(pixels.pixels().any(|p| p.0[3] > 0 && p.0[3] < 255));
}

// ─────────────────────────────────────────────────────────────────────────────
// Pictures
// ─────────────────────────────────────────────────────────────────────────────

fn picture_frame(size: IntSize, color: Color) -> Vec<strata_core::RenderPass> {
    let picture = RectPicture::new().fill(Rect::new(0.0, 0.0, 40.0, 40.0), color);
    let quad = DrawQuad::new(
        state(Transform::translation(10.0, 10.0, 0.0), size),
        IntRect::from_size(size),
        Material::Picture(PictureQuad {
            tex_coord_rect: IntRect::from_size(size).to_rect(),
            texture_size: size,
            swizzle_contents: false,
            content_rect: IntRect::from_size(size),
            contents_scale: 1.0,
            picture: Arc::new(picture),
        }),
    );
    let mut root = root_pass(SIZE);
    root.push_quad(quad);
    vec![root]
}

fn allocations(harness: &Harness) -> u64 {
    let stats = harness.provider.stats();
    stats.hits + stats.misses
}

#[test]
fn picture_is_rasterized_and_drawn_as_a_tile() {
    let mut harness = Harness::new(100, 100);
    harness.renderer.draw_frame(&picture_frame(IntSize::new(20, 20), Color::RED));

    assert_eq!(
        single_draw_kind(&harness),
        Some(ProgramKind::Tile { aa: false, swizzle: false, opaque: false })
    );
    let pixels = harness.read_back();
    assert_eq!(pixels.get_pixel(20, 20).0, [255, 0, 0, 255]);
    assert_eq!(pixels.get_pixel(35, 35).0, [0, 0, 0, 0]);
}

#[test]
fn picture_texture_is_reused_until_its_size_changes() {
    let mut harness = Harness::new(100, 100);
    harness.renderer.draw_frame(&picture_frame(IntSize::new(20, 20), Color::RED));
    assert_eq!(allocations(&harness), 1);

    harness.renderer.draw_frame(&picture_frame(IntSize::new(20, 20), Color::BLUE));
    assert_eq!(allocations(&harness), 1);
    assert_eq!(harness.read_back().get_pixel(20, 20).0, [0, 0, 255, 255]);

    harness.renderer.draw_frame(&picture_frame(IntSize::new(30, 30), Color::GREEN));
    assert_eq!(allocations(&harness), 2);
    assert_eq!(harness.read_back().get_pixel(35, 35).0, [0, 255, 0, 255]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Video
// ─────────────────────────────────────────────────────────────────────────────

fn yuv_quad(harness: &mut Harness, x: i32, [y, u, v]: [u8; 3]) -> DrawQuad {
    let plane_size = IntSize::new(4, 4);
    let video = YuvVideoQuad {
        tex_scale: Size::new(1.0, 1.0),
        y_plane: harness.solid_texture(plane_size, [y, 0, 0, 255]),
        u_plane: harness.solid_texture(plane_size, [u, 0, 0, 255]),
        v_plane: harness.solid_texture(plane_size, [v, 0, 0, 255]),
    };
    DrawQuad::new(
        state(Transform::translation(x as f32, 0.0, 0.0), IntSize::new(20, 20)),
        IntRect::new(0, 0, 20, 20),
        Material::YuvVideo(video),
    )
}

#[test]
fn yuv_video_converts_limited_range_to_rgb() {
    let mut harness = Harness::new(100, 100);
    let white = yuv_quad(&mut harness, 0, [235, 128, 128]);
    let black = yuv_quad(&mut harness, 40, [16, 128, 128]);
    let mut root = root_pass(SIZE);
    root.push_quad(white);
    root.push_quad(black);
    harness.renderer.draw_frame(&[root]);

    let draws = harness.renderer.context().draws();
    assert_eq!(draws.len(), 2);
    assert!(draws.iter().all(|draw| draw.key.map(|key| key.kind) == Some(ProgramKind::YuvVideo)));

    let pixels = harness.read_back();
    assert_pixel_near(pixels.get_pixel(10, 10).0, [255, 255, 255, 255], 1);
    assert_pixel_near(pixels.get_pixel(50, 10).0, [0, 0, 0, 255], 1);
}

fn stream_video_frame(harness: &mut Harness) -> Vec<strata_core::RenderPass> {
    let texture = harness.solid_texture(IntSize::new(8, 8), [0, 255, 0, 255]);
    let quad = DrawQuad::new(
        state(Transform::IDENTITY, IntSize::new(20, 20)),
        IntRect::new(0, 0, 20, 20),
        Material::StreamVideo(StreamVideoQuad {
            resource_id: texture,
            matrix: Transform::IDENTITY,
        }),
    );
    let mut root = root_pass(SIZE);
    root.push_quad(quad);
    vec![root]
}

#[test]
fn stream_video_samples_the_external_texture() {
    let ctx = HeadlessContext::new(100, 100).with_extensions([extensions::EGL_IMAGE_EXTERNAL]);
    let mut harness = Harness::with_context(ctx);
    let frame = stream_video_frame(&mut harness);
    harness.renderer.draw_frame(&frame);

    assert_eq!(single_draw_kind(&harness), Some(ProgramKind::StreamVideo));
    assert_eq!(harness.read_back().get_pixel(10, 10).0, [0, 255, 0, 255]);
}

#[test]
fn stream_video_is_skipped_without_external_textures() {
    let mut harness = Harness::new(100, 100);
    let frame = stream_video_frame(&mut harness);
    harness.renderer.draw_frame(&frame);

    assert!(harness.renderer.context().draws().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Debug Materials
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn checkerboard_alternates_eight_pixel_cells() {
    let mut harness = Harness::new(100, 100);
    let quad = DrawQuad::new(
        state(Transform::IDENTITY, IntSize::new(32, 32)),
        IntRect::new(0, 0, 32, 32),
        Material::Checkerboard { color: Color::RED },
    );
    let mut root = root_pass(SIZE);
    root.push_quad(quad);
    harness.renderer.draw_frame(&[root]);

    assert_eq!(single_draw_kind(&harness), Some(ProgramKind::Checkerboard));
    assert_eq!(harness.renderer.context().draws()[0].blend, None);

    let pixels = harness.read_back();
    let white = [255, 255, 255, 255];
    let red = [255, 0, 0, 255];
    let origin = pixels.get_pixel(4, 4).0;
    assert!(origin == white || origin == red, "unexpected cell color {origin:?}");
    let other = if origin == white { red } else { white };

    assert_eq!(pixels.get_pixel(12, 4).0, other);
    assert_eq!(pixels.get_pixel(4, 12).0, other);
    assert_eq!(pixels.get_pixel(12, 12).0, origin);
    assert_eq!(pixels.get_pixel(20, 4).0, origin);
    assert_eq!(pixels.get_pixel(40, 40).0, [0, 0, 0, 0]);
}

#[test]
fn debug_border_outlines_the_quad() {
    let mut harness = Harness::new(100, 100);
    let quad = DrawQuad::new(
        state(Transform::translation(10.0, 10.0, 0.0), IntSize::new(20, 20)),
        IntRect::new(0, 0, 20, 20),
        Material::DebugBorder { color: Color::GREEN, width: 1.0 },
    );
    let mut root = root_pass(SIZE);
    root.push_quad(quad);
    harness.renderer.draw_frame(&[root]);

    assert_eq!(single_draw_kind(&harness), Some(ProgramKind::DebugBorder));
    let draw = &harness.renderer.context().draws()[0];
    assert_eq!(draw.mode, PrimitiveMode::LineLoop);
    assert_eq!(draw.count, 4);

    let pixels = harness.read_back();
    assert_eq!(pixels.get_pixel(20, 20).0, [0, 0, 0, 0]);
    assert_eq!(pixels.get_pixel(50, 50).0, [0, 0, 0, 0]);
    assert!(pixels.pixels().any(|p| p.0 == [0, 255, 0, 255]));
}
