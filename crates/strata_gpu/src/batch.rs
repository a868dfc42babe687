//! Accumulator for consecutive compatible textured quads
//!
//! Textured quads sharing program, texture, alpha mode and blending are
//! collected here and drawn with one indexed call. The renderer flushes the
//! batch before anything that could observe or change the state it relies
//! on: a different material, a scissor change, a framebuffer switch and the
//! end of every pass.

use bytemuck::{Pod, Zeroable};
use smallvec::SmallVec;
use strata_core::ResourceId;

use crate::context::{ProgramId, MAX_QUADS_PER_DRAW};
use crate::program::ProgramHandle;

/// Quads per batched draw
pub const MAX_QUADS_PER_BATCH: usize = MAX_QUADS_PER_DRAW;

/// Per-quad data uploaded in one block; matches `QuadInstance` in WGSL
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TextureQuadInstance {
    /// Column-major projection times quad-rect transform
    pub matrix: [f32; 16],
    /// `(u0, v0, u1 - u0, v1 - v0)`
    pub uv: [f32; 4],
    /// Corner opacities times the quad opacity
    pub opacity: [f32; 4],
}

/// Everything two quads must share to be drawn together
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub program: ProgramId,
    pub resource: ResourceId,
    pub premultiplied_alpha: bool,
    pub needs_blending: bool,
}

/// Batch ready to be drawn
#[derive(Debug)]
pub struct PendingBatch {
    pub key: BatchKey,
    pub program: ProgramHandle,
    pub instances: SmallVec<[TextureQuadInstance; MAX_QUADS_PER_BATCH]>,
}

impl PendingBatch {
    /// Index count of the draw: two triangles per quad
    pub fn index_count(&self) -> u32 {
        6 * self.instances.len() as u32
    }
}

#[derive(Debug, Default)]
pub struct TextureQuadBatch {
    current: Option<(BatchKey, ProgramHandle)>,
    instances: SmallVec<[TextureQuadInstance; MAX_QUADS_PER_BATCH]>,
}

impl TextureQuadBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn key(&self) -> Option<BatchKey> {
        self.current.map(|(key, _)| key)
    }

    /// True when a quad with `key` can join the pending batch as-is
    pub fn accepts(&self, key: &BatchKey) -> bool {
        match &self.current {
            Some((current, _)) => current == key && self.instances.len() < MAX_QUADS_PER_BATCH,
            None => false,
        }
    }

    /// Whether the pending batch must be drawn before `key` can be queued
    pub fn needs_flush_for(&self, key: &BatchKey) -> bool {
        !self.is_empty() && !self.accepts(key)
    }

    /// Queue one quad; the caller flushes first when `needs_flush_for` says so
    pub fn push(&mut self, key: BatchKey, program: ProgramHandle, instance: TextureQuadInstance) {
        debug_assert!(
            self.is_empty() || self.accepts(&key),
            "incompatible quad pushed onto a pending batch"
        );
        if self.is_empty() {
            self.current = Some((key, program));
        }
        self.instances.push(instance);
    }

    /// Take the pending batch, leaving the accumulator empty
    pub fn take(&mut self) -> Option<PendingBatch> {
        let (key, program) = self.current.take()?;
        let instances = std::mem::take(&mut self.instances);
        if instances.is_empty() {
            return None;
        }
        Some(PendingBatch {
            key,
            program,
            instances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessContext;
    use crate::program::{ProgramCache, ProgramKey, ProgramKind, TexCoordPrecision};

    fn program() -> ProgramHandle {
        let mut ctx = HeadlessContext::new(4, 4);
        let mut cache = ProgramCache::new(false);
        cache
            .get_or_create(
                &mut ctx,
                ProgramKey::new(ProgramKind::Texture { flip: false }, TexCoordPrecision::Medium),
            )
            .unwrap()
    }

    fn key(resource: u32) -> BatchKey {
        BatchKey {
            program: ProgramId(1),
            resource: ResourceId(resource),
            premultiplied_alpha: true,
            needs_blending: false,
        }
    }

    #[test]
    fn instance_layout_matches_shader_block() {
        assert_eq!(std::mem::size_of::<TextureQuadInstance>(), 96);
        let instances = [TextureQuadInstance::default(); 2];
        let bytes: &[u8] = bytemuck::cast_slice(&instances);
        assert_eq!(bytes.len(), 192);
    }

    #[test]
    fn compatible_quads_share_a_batch() {
        let program = program();
        let mut batch = TextureQuadBatch::new();
        for _ in 0..3 {
            assert!(!batch.needs_flush_for(&key(7)));
            batch.push(key(7), program, TextureQuadInstance::default());
        }
        let pending = batch.take().unwrap();
        assert_eq!(pending.instances.len(), 3);
        assert_eq!(pending.index_count(), 18);
        assert!(batch.is_empty());
        assert!(batch.take().is_none());
    }

    #[test]
    fn different_texture_forces_flush() {
        let program = program();
        let mut batch = TextureQuadBatch::new();
        batch.push(key(1), program, TextureQuadInstance::default());
        assert!(batch.needs_flush_for(&key(2)));

        let mut blended = key(1);
        blended.needs_blending = true;
        assert!(batch.needs_flush_for(&blended));

        let mut straight = key(1);
        straight.premultiplied_alpha = false;
        assert!(batch.needs_flush_for(&straight));
    }

    #[test]
    fn full_batch_forces_flush() {
        let program = program();
        let mut batch = TextureQuadBatch::new();
        for _ in 0..MAX_QUADS_PER_BATCH {
            batch.push(key(1), program, TextureQuadInstance::default());
        }
        assert!(batch.needs_flush_for(&key(1)));
        assert_eq!(batch.take().unwrap().index_count(), 48);
    }
}
