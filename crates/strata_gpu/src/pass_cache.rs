//! Cached render-pass textures
//!
//! Every non-root pass renders into a texture that survives across frames.
//! Before a frame is drawn the cache drops entries for passes that left the
//! frame and frees textures that became too small or changed format; the
//! storage itself is allocated lazily when a pass is first bound.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use strata_core::{IntSize, RenderPass, RenderPassId, ResourceId};

use crate::context::GraphicsContext;
use crate::resource::{ResourceProvider, ScopedResource, TextureUsage};

/// Texture for one render pass plus whether its last draw was complete
#[derive(Debug)]
pub struct CachedPassTexture {
    resource: ScopedResource,
    is_complete: bool,
}

impl CachedPassTexture {
    fn new(provider: &Rc<dyn ResourceProvider>) -> Self {
        Self {
            resource: ScopedResource::new(provider),
            is_complete: false,
        }
    }

    pub fn id(&self) -> Option<ResourceId> {
        self.resource.id()
    }

    pub fn size(&self) -> IntSize {
        self.resource.size()
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }
}

/// Statistics for the pass texture cache
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PassTextureStats {
    /// Passes with a cache entry
    pub entries: usize,
    /// Entries currently holding a texture
    pub allocated: usize,
    /// Estimated bytes held by allocated textures
    pub memory_bytes: u64,
}

pub struct RenderPassTextureCache {
    provider: Rc<dyn ResourceProvider>,
    textures: FxHashMap<RenderPassId, CachedPassTexture>,
}

impl RenderPassTextureCache {
    pub fn new(provider: &Rc<dyn ResourceProvider>) -> Self {
        Self {
            provider: Rc::clone(provider),
            textures: FxHashMap::default(),
        }
    }

    /// Reconcile cached textures with the passes of the coming frame
    pub fn decide_allocations(&mut self, passes: &[RenderPass], format: wgpu::TextureFormat) {
        let in_frame: FxHashMap<RenderPassId, IntSize> = passes
            .iter()
            .map(|pass| (pass.id, pass.output_rect.size()))
            .collect();

        self.textures.retain(|id, _| in_frame.contains_key(id));

        for (id, texture) in self.textures.iter_mut() {
            let Some(required) = in_frame.get(id) else {
                continue;
            };
            if texture.resource.is_allocated()
                && (!texture.resource.size().covers(*required) || texture.resource.format() != format)
            {
                tracing::trace!("freeing stale texture for pass {:?}", id);
                texture.resource.free();
                texture.is_complete = false;
            }
        }

        for pass in passes {
            self.textures
                .entry(pass.id)
                .or_insert_with(|| CachedPassTexture::new(&self.provider));
        }
    }

    /// Texture for `id`, allocating `size` storage when it has none
    pub fn ensure_allocated(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        id: RenderPassId,
        size: IntSize,
        format: wgpu::TextureFormat,
    ) -> Option<ResourceId> {
        let provider = &self.provider;
        let texture = self
            .textures
            .entry(id)
            .or_insert_with(|| CachedPassTexture::new(provider));
        if !texture.resource.is_allocated()
            && !texture.resource.allocate(ctx, size, format, TextureUsage::Framebuffer)
        {
            tracing::warn!(
                "could not allocate {}x{} texture for pass {:?}",
                size.width,
                size.height,
                id
            );
            return None;
        }
        texture.resource.id()
    }

    pub fn get(&self, id: RenderPassId) -> Option<&CachedPassTexture> {
        self.textures.get(&id)
    }

    /// Allocated texture for `id`
    pub fn resource_id(&self, id: RenderPassId) -> Option<ResourceId> {
        self.textures.get(&id).and_then(CachedPassTexture::id)
    }

    pub fn set_complete(&mut self, id: RenderPassId, complete: bool) {
        if let Some(texture) = self.textures.get_mut(&id) {
            texture.is_complete = complete;
        }
    }

    /// Whether the pass texture holds a complete, reusable image
    pub fn have_cached_resources(&self, id: RenderPassId) -> bool {
        self.textures
            .get(&id)
            .is_some_and(|texture| texture.resource.is_allocated() && texture.is_complete)
    }

    /// Free every texture, keeping the entries
    pub fn release_all(&mut self) {
        for texture in self.textures.values_mut() {
            texture.resource.free();
            texture.is_complete = false;
        }
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn stats(&self) -> PassTextureStats {
        let allocated = self.textures.values().filter(|t| t.resource.is_allocated());
        let (count, bytes) = allocated.fold((0, 0u64), |(count, bytes), texture| {
            (count + 1, bytes + texture.resource.size().area() as u64 * 4)
        });
        PassTextureStats {
            entries: self.textures.len(),
            allocated: count,
            memory_bytes: bytes,
        }
    }
}
