//! Strata GPU Backend
//!
//! Draws compositor frames, ordered lists of render passes made of quads,
//! through a GL-style [`GraphicsContext`]:
//!
//! - **Programs**: every material variant is a generated WGSL program built
//!   lazily and cached by key
//! - **Draw state**: redundant program, blend and scissor changes are elided
//! - **Batching**: consecutive compatible textured quads are drawn in one call
//! - **Anti-aliasing**: non-pixel-aligned quads are drawn with edge coverage
//! - **Background filters**: filtered backdrops are composited under render
//!   pass quads
//! - **Lifecycle**: swaps, read-lock fences, visibility and memory policy
//!
//! [`HeadlessContext`] executes everything on the CPU and records each
//! call, which is how the renderer is tested.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_core::{Color, DrawQuad, IntRect, IntSize, Material, RenderPass, RenderPassId, SharedQuadState, Transform};
//! use strata_gpu::{BasicResourceProvider, HeadlessContext, HeadlessOutputSurface, Renderer, RendererConfig};
//!
//! let ctx = HeadlessContext::new(64, 64);
//! let provider = BasicResourceProvider::new(2048, wgpu::TextureFormat::Rgba8Unorm).into_shared();
//! let mut renderer = Renderer::new(ctx, Box::new(HeadlessOutputSurface::new()), provider, RendererConfig::default())
//!     .unwrap();
//! renderer.set_viewport_size(IntSize::new(64, 64));
//!
//! let mut pass = RenderPass::new(RenderPassId::new(1, 0), IntRect::new(0, 0, 64, 64));
//! let state = Arc::new(SharedQuadState::new(Transform::IDENTITY, IntSize::new(64, 64)));
//! pass.push_quad(DrawQuad::new(state, IntRect::new(0, 0, 64, 64), Material::SolidColor { color: Color::RED }));
//! renderer.draw_frame(&[pass]);
//! assert_eq!(renderer.stats().draw_calls, 1);
//! ```

pub mod aa;
pub mod batch;
pub mod capabilities;
pub mod config;
pub mod context;
pub mod error;
pub mod filters;
pub mod frame;
pub mod headless;
pub mod matrices;
pub mod memory;
pub mod output_surface;
pub mod pass_cache;
pub mod program;
pub mod renderer;
pub mod resource;
pub mod shaders;
pub mod state;

pub use capabilities::RendererCapabilities;
pub use config::RendererConfig;
pub use context::{GraphicsContext, ProgramId, TextureId, UniformLocation, UniformValue};
pub use error::{RendererError, Result, ShaderError};
pub use filters::{CpuFilterEvaluator, FilterEvaluator, FilteredImage, NullFilterEvaluator};
pub use headless::{HeadlessContext, HeadlessOutputSurface};
pub use memory::{ManagedMemoryPolicy, MemoryAllocation, PriorityCutoff};
pub use output_surface::{LatencyInfo, OutputSurface, OutputSurfaceCapabilities};
pub use program::{ProgramCache, ProgramKey, ProgramKind, TexCoordPrecision};
pub use renderer::{Renderer, RendererStats, PASS_TEXTURE_FORMAT};
pub use resource::{BasicResourceProvider, Fence, ResourceProvider, SimpleSwapFence};
