//! Strata Core
//!
//! Renderer-independent data model for the Strata compositor:
//!
//! - **Geometry**: points, rects, pixel rects and quadrilaterals
//! - **Transforms**: 4x4 content-to-target and device transforms
//! - **Quads**: rectangular primitives with material payloads
//! - **Render Passes**: ordered quad lists forming a composition DAG
//! - **Filters**: filter chains and color-matrix helpers
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_core::{
//!     Color, DrawQuad, IntRect, IntSize, Material, RenderPass, RenderPassId, SharedQuadState,
//!     Transform,
//! };
//!
//! let mut pass = RenderPass::new(RenderPassId::new(1, 0), IntRect::new(0, 0, 100, 100));
//! let state = Arc::new(SharedQuadState::new(Transform::IDENTITY, IntSize::new(100, 100)));
//! pass.push_quad(DrawQuad::new(
//!     state,
//!     IntRect::new(0, 0, 100, 100),
//!     Material::SolidColor { color: Color::RED },
//! ));
//! assert_eq!(pass.quads.len(), 1);
//! ```

pub mod color;
pub mod filter;
pub mod geometry;
pub mod pass;
pub mod picture;
pub mod quad;
pub mod transform;

pub use color::Color;
pub use filter::{ColorMatrix, FilterOperation, FilterOperations, FilterOutsets};
pub use geometry::{IntRect, IntSize, Point, QuadF, Rect, Size};
pub use pass::{is_in_dependency_order, RenderPass, RenderPassId};
pub use picture::{Picture, RectPicture};
pub use quad::{
    DrawQuad, Material, MaterialKind, PictureQuad, RenderPassQuad, ResourceId, SharedQuadState,
    StreamVideoQuad, TextureQuad, TileQuad, YuvVideoQuad,
};
pub use transform::Transform;
