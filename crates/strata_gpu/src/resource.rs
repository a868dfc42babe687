//! Texture resources, locks and fences
//!
//! The renderer never owns raw textures directly. It asks a
//! `ResourceProvider` for resources and borrows their textures through
//! scoped locks, which lets the provider know when a texture is in flight
//! and when it may be recycled.
//!
//! Deleting a resource does not need the graphics context: the texture is
//! returned to a reuse pool (or queued for deletion) and the context-side
//! work happens on the next call that has a context at hand.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use image::RgbaImage;
use rustc_hash::FxHashMap;
use strata_core::{IntRect, IntSize, ResourceId};

use crate::context::{GraphicsContext, TextureId, TextureTarget};

// ─────────────────────────────────────────────────────────────────────────────
// Fences
// ─────────────────────────────────────────────────────────────────────────────

/// Signals when the GPU has finished with the commands issued before it
pub trait Fence {
    fn has_passed(&self) -> bool;
}

/// Fence that passes once a later buffer swap has happened
///
/// Double buffering guarantees that by the time the next frame is swapped,
/// the commands of the previous one have been consumed.
#[derive(Debug, Default)]
pub struct SimpleSwapFence {
    passed: Cell<bool>,
}

impl SimpleSwapFence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_has_passed(&self) {
        self.passed.set(true);
    }
}

impl Fence for SimpleSwapFence {
    fn has_passed(&self) -> bool {
        self.passed.get()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider Contract
// ─────────────────────────────────────────────────────────────────────────────

/// How a texture will be used
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    Any,
    /// Attached to a framebuffer as a render target
    Framebuffer,
}

/// Owner of every texture the renderer samples or renders into
///
/// Shared as `Rc<dyn ResourceProvider>`; implementations use interior
/// mutability so guards can unlock from `Drop`.
pub trait ResourceProvider {
    /// Allocate a texture-backed resource; `None` when allocation fails
    fn create_resource(
        &self,
        ctx: &mut dyn GraphicsContext,
        size: IntSize,
        format: wgpu::TextureFormat,
        usage: TextureUsage,
    ) -> Option<ResourceId>;

    /// Release a resource; deferred while it is locked for reading
    fn delete_resource(&self, id: ResourceId);

    fn resource_size(&self, id: ResourceId) -> Option<IntSize>;
    fn resource_format(&self, id: ResourceId) -> Option<wgpu::TextureFormat>;

    fn lock_for_read(&self, id: ResourceId) -> Option<TextureId>;
    fn unlock_for_read(&self, id: ResourceId);
    fn lock_for_write(&self, id: ResourceId) -> Option<TextureId>;
    fn unlock_for_write(&self, id: ResourceId);
    /// True when no reader holds the resource and its last read fence passed
    fn can_lock_for_write(&self, id: ResourceId) -> bool;

    /// Upload `source_rect` of `image`, whose pixels cover `image_rect`, to
    /// the resource at `dest_offset`
    fn set_pixels(
        &self,
        ctx: &mut dyn GraphicsContext,
        id: ResourceId,
        image: &RgbaImage,
        image_rect: IntRect,
        source_rect: IntRect,
        dest_offset: (i32, i32),
    );

    /// Perform deferred context work and flush the context
    fn flush(&self, ctx: &mut dyn GraphicsContext);
    /// Drop textures kept around for reuse
    fn release_cached_data(&self, ctx: &mut dyn GraphicsContext);

    fn max_texture_size(&self) -> i32;
    fn best_texture_format(&self) -> wgpu::TextureFormat;

    /// Fence attached to every resource locked for reading from now on
    fn set_read_lock_fence(&self, fence: Rc<dyn Fence>);
    fn read_lock_fence(&self) -> Option<Rc<dyn Fence>>;

    /// Live resources, excluding pooled textures
    fn num_resources(&self) -> usize;
}

// ─────────────────────────────────────────────────────────────────────────────
// Scoped Locks
// ─────────────────────────────────────────────────────────────────────────────

/// Read lock held for the lifetime of the guard
pub struct ScopedReadLock {
    provider: Rc<dyn ResourceProvider>,
    id: ResourceId,
    texture: TextureId,
}

impl ScopedReadLock {
    pub fn new(provider: &Rc<dyn ResourceProvider>, id: ResourceId) -> Option<Self> {
        let texture = provider.lock_for_read(id)?;
        Some(Self {
            provider: Rc::clone(provider),
            id,
            texture,
        })
    }

    pub fn texture_id(&self) -> TextureId {
        self.texture
    }
}

impl Drop for ScopedReadLock {
    fn drop(&mut self) {
        self.provider.unlock_for_read(self.id);
    }
}

/// Read lock that also binds the texture to the active unit with a filter
pub struct ScopedSampler {
    lock: ScopedReadLock,
}

impl ScopedSampler {
    pub fn new(
        provider: &Rc<dyn ResourceProvider>,
        ctx: &mut dyn GraphicsContext,
        id: ResourceId,
        target: TextureTarget,
        filter: wgpu::FilterMode,
    ) -> Option<Self> {
        let lock = ScopedReadLock::new(provider, id)?;
        ctx.bind_texture(target, Some(lock.texture_id()));
        ctx.texture_filter(lock.texture_id(), filter);
        Some(Self { lock })
    }

    pub fn texture_id(&self) -> TextureId {
        self.lock.texture_id()
    }
}

/// Exclusive write lock held for the lifetime of the guard
pub struct ScopedWriteLock {
    provider: Rc<dyn ResourceProvider>,
    id: ResourceId,
    texture: TextureId,
}

impl ScopedWriteLock {
    pub fn new(provider: &Rc<dyn ResourceProvider>, id: ResourceId) -> Option<Self> {
        let texture = provider.lock_for_write(id)?;
        Some(Self {
            provider: Rc::clone(provider),
            id,
            texture,
        })
    }

    pub fn texture_id(&self) -> TextureId {
        self.texture
    }
}

impl Drop for ScopedWriteLock {
    fn drop(&mut self) {
        self.provider.unlock_for_write(self.id);
    }
}

/// Resource owned by the renderer, deleted when freed or dropped
pub struct ScopedResource {
    provider: Rc<dyn ResourceProvider>,
    id: Option<ResourceId>,
    size: IntSize,
    format: wgpu::TextureFormat,
}

impl ScopedResource {
    pub fn new(provider: &Rc<dyn ResourceProvider>) -> Self {
        Self {
            provider: Rc::clone(provider),
            id: None,
            size: IntSize::ZERO,
            format: wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    /// Allocate storage; the resource must not already be allocated
    pub fn allocate(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        size: IntSize,
        format: wgpu::TextureFormat,
        usage: TextureUsage,
    ) -> bool {
        debug_assert!(self.id.is_none(), "resource allocated twice");
        debug_assert!(!size.is_empty(), "empty resource allocation");
        self.id = self.provider.create_resource(ctx, size, format, usage);
        if self.id.is_some() {
            self.size = size;
            self.format = format;
        }
        self.id.is_some()
    }

    pub fn free(&mut self) {
        if let Some(id) = self.id.take() {
            self.provider.delete_resource(id);
        }
        self.size = IntSize::ZERO;
    }

    pub fn id(&self) -> Option<ResourceId> {
        self.id
    }

    pub fn is_allocated(&self) -> bool {
        self.id.is_some()
    }

    pub fn size(&self) -> IntSize {
        self.size
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

impl Drop for ScopedResource {
    fn drop(&mut self) {
        self.free();
    }
}

impl std::fmt::Debug for ScopedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedResource")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("format", &self.format)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Basic Provider
// ─────────────────────────────────────────────────────────────────────────────

/// Statistics for texture reuse
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResourcePoolStats {
    /// Allocations served from the pool
    pub hits: u64,
    /// Allocations that created a new texture
    pub misses: u64,
    pub pool_count: usize,
    pub pool_memory_bytes: u64,
}

impl ResourcePoolStats {
    /// Pool hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct PooledTexture {
    texture: TextureId,
    size: IntSize,
    format: wgpu::TextureFormat,
}

struct Resource {
    texture: TextureId,
    size: IntSize,
    format: wgpu::TextureFormat,
    read_lock_count: u32,
    locked_for_write: bool,
    marked_for_deletion: bool,
    read_lock_fence: Option<Rc<dyn Fence>>,
}

struct ProviderState {
    next_id: u32,
    resources: FxHashMap<ResourceId, Resource>,
    pool: Vec<PooledTexture>,
    pending_deletes: Vec<TextureId>,
    read_lock_fence: Option<Rc<dyn Fence>>,
    stats: ResourcePoolStats,
}

fn estimate_texture_bytes(size: IntSize) -> u64 {
    size.area() as u64 * 4
}

impl ProviderState {
    fn update_pool_stats(&mut self) {
        self.stats.pool_count = self.pool.len();
        self.stats.pool_memory_bytes = self.pool.iter().map(|t| estimate_texture_bytes(t.size)).sum();
    }

    /// Return a texture to the pool, or queue it for deletion when full
    fn recycle(&mut self, resource: Resource, max_pooled: usize) {
        if self.pool.len() < max_pooled {
            self.pool.push(PooledTexture {
                texture: resource.texture,
                size: resource.size,
                format: resource.format,
            });
        } else {
            self.pending_deletes.push(resource.texture);
        }
        self.update_pool_stats();
    }

    fn delete_pending(&mut self, ctx: &mut dyn GraphicsContext) {
        for texture in self.pending_deletes.drain(..) {
            ctx.delete_texture(texture);
        }
    }
}

/// `ResourceProvider` backed directly by a graphics context's textures
///
/// Freed textures are kept in a small pool and handed out again to
/// allocations of the same size and format.
pub struct BasicResourceProvider {
    state: RefCell<ProviderState>,
    max_texture_size: i32,
    best_texture_format: wgpu::TextureFormat,
    max_pooled: usize,
}

impl BasicResourceProvider {
    pub fn new(max_texture_size: i32, best_texture_format: wgpu::TextureFormat) -> Self {
        Self {
            state: RefCell::new(ProviderState {
                next_id: 1,
                resources: FxHashMap::default(),
                pool: Vec::with_capacity(8),
                pending_deletes: Vec::new(),
                read_lock_fence: None,
                stats: ResourcePoolStats::default(),
            }),
            max_texture_size,
            best_texture_format,
            max_pooled: 8,
        }
    }

    pub fn with_max_pooled(mut self, max_pooled: usize) -> Self {
        self.max_pooled = max_pooled;
        self
    }

    /// Shareable handle for the renderer
    pub fn into_shared(self) -> Rc<dyn ResourceProvider> {
        Rc::new(self)
    }

    /// Upload an RGBA image covering the whole resource
    pub fn upload_image(&self, ctx: &mut dyn GraphicsContext, id: ResourceId, image: &RgbaImage) {
        let rect = IntRect::new(0, 0, image.width() as i32, image.height() as i32);
        self.set_pixels(ctx, id, image, rect, rect, (0, 0));
    }

    pub fn stats(&self) -> ResourcePoolStats {
        self.state.borrow().stats.clone()
    }

    pub fn pool_size(&self) -> usize {
        self.state.borrow().pool.len()
    }

    /// Whether a read lock is currently held on `id`
    pub fn is_read_locked(&self, id: ResourceId) -> bool {
        self.state
            .borrow()
            .resources
            .get(&id)
            .is_some_and(|resource| resource.read_lock_count > 0)
    }
}

impl ResourceProvider for BasicResourceProvider {
    fn create_resource(
        &self,
        ctx: &mut dyn GraphicsContext,
        size: IntSize,
        format: wgpu::TextureFormat,
        usage: TextureUsage,
    ) -> Option<ResourceId> {
        if size.is_empty() || size.width > self.max_texture_size || size.height > self.max_texture_size {
            tracing::debug!(
                "rejecting {}x{} resource (max {})",
                size.width,
                size.height,
                self.max_texture_size
            );
            return None;
        }

        let mut state = self.state.borrow_mut();
        state.delete_pending(ctx);

        let pooled = state
            .pool
            .iter()
            .position(|t| t.size == size && t.format == format);
        let texture = match pooled {
            Some(index) => {
                state.stats.hits += 1;
                let texture = state.pool.swap_remove(index).texture;
                state.update_pool_stats();
                texture
            }
            None => {
                state.stats.misses += 1;
                let texture = ctx.create_texture()?;
                if !ctx.tex_image(texture, size, format, None) {
                    tracing::warn!(
                        "texture allocation of {}x{} {:?} failed",
                        size.width,
                        size.height,
                        format
                    );
                    ctx.delete_texture(texture);
                    return None;
                }
                texture
            }
        };

        let id = ResourceId(state.next_id);
        state.next_id += 1;
        state.resources.insert(
            id,
            Resource {
                texture,
                size,
                format,
                read_lock_count: 0,
                locked_for_write: false,
                marked_for_deletion: false,
                read_lock_fence: None,
            },
        );
        tracing::trace!(
            "created resource {:?} ({}x{}, {:?}, {:?})",
            id,
            size.width,
            size.height,
            format,
            usage
        );
        Some(id)
    }

    fn delete_resource(&self, id: ResourceId) {
        let mut state = self.state.borrow_mut();
        let Some(resource) = state.resources.get_mut(&id) else {
            return;
        };
        debug_assert!(!resource.locked_for_write, "deleting a write-locked resource");
        if resource.read_lock_count > 0 {
            resource.marked_for_deletion = true;
            return;
        }
        if let Some(resource) = state.resources.remove(&id) {
            state.recycle(resource, self.max_pooled);
        }
    }

    fn resource_size(&self, id: ResourceId) -> Option<IntSize> {
        self.state.borrow().resources.get(&id).map(|r| r.size)
    }

    fn resource_format(&self, id: ResourceId) -> Option<wgpu::TextureFormat> {
        self.state.borrow().resources.get(&id).map(|r| r.format)
    }

    fn lock_for_read(&self, id: ResourceId) -> Option<TextureId> {
        let mut state = self.state.borrow_mut();
        let fence = state.read_lock_fence.clone();
        let resource = state.resources.get_mut(&id)?;
        debug_assert!(!resource.locked_for_write, "reading a write-locked resource");
        if resource.marked_for_deletion {
            return None;
        }
        resource.read_lock_count += 1;
        resource.read_lock_fence = fence;
        Some(resource.texture)
    }

    fn unlock_for_read(&self, id: ResourceId) {
        let mut state = self.state.borrow_mut();
        let Some(resource) = state.resources.get_mut(&id) else {
            return;
        };
        debug_assert!(resource.read_lock_count > 0, "unbalanced read unlock");
        resource.read_lock_count = resource.read_lock_count.saturating_sub(1);
        if resource.read_lock_count == 0 && resource.marked_for_deletion {
            if let Some(resource) = state.resources.remove(&id) {
                state.recycle(resource, self.max_pooled);
            }
        }
    }

    fn lock_for_write(&self, id: ResourceId) -> Option<TextureId> {
        let mut state = self.state.borrow_mut();
        let resource = state.resources.get_mut(&id)?;
        debug_assert!(
            resource.read_lock_count == 0 && !resource.locked_for_write,
            "write lock on a resource in use"
        );
        resource.locked_for_write = true;
        Some(resource.texture)
    }

    fn unlock_for_write(&self, id: ResourceId) {
        let mut state = self.state.borrow_mut();
        if let Some(resource) = state.resources.get_mut(&id) {
            debug_assert!(resource.locked_for_write, "unbalanced write unlock");
            resource.locked_for_write = false;
        }
    }

    fn can_lock_for_write(&self, id: ResourceId) -> bool {
        let state = self.state.borrow();
        state.resources.get(&id).is_some_and(|resource| {
            !resource.locked_for_write
                && resource.read_lock_count == 0
                && resource
                    .read_lock_fence
                    .as_ref()
                    .map_or(true, |fence| fence.has_passed())
        })
    }

    fn set_pixels(
        &self,
        ctx: &mut dyn GraphicsContext,
        id: ResourceId,
        image: &RgbaImage,
        image_rect: IntRect,
        source_rect: IntRect,
        dest_offset: (i32, i32),
    ) {
        let (texture, format) = {
            let state = self.state.borrow();
            let Some(resource) = state.resources.get(&id) else {
                return;
            };
            debug_assert!(resource.read_lock_count == 0, "uploading to a resource in use");
            (resource.texture, resource.format)
        };

        let source = source_rect.intersect(&image_rect);
        if source.is_empty() {
            return;
        }
        let swap_red_blue = matches!(
            format,
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
        );

        let mut data = Vec::with_capacity(source.size().area() * 4);
        for y in source.y..source.bottom() {
            for x in source.x..source.right() {
                let px = (x - image_rect.x) as u32;
                let py = (y - image_rect.y) as u32;
                let [r, g, b, a] = image.get_pixel(px, py).0;
                if swap_red_blue {
                    data.extend_from_slice(&[b, g, r, a]);
                } else {
                    data.extend_from_slice(&[r, g, b, a]);
                }
            }
        }

        let dest = IntRect::new(
            dest_offset.0 + (source.x - source_rect.x),
            dest_offset.1 + (source.y - source_rect.y),
            source.width,
            source.height,
        );
        ctx.tex_sub_image(texture, dest, &data);
    }

    fn flush(&self, ctx: &mut dyn GraphicsContext) {
        self.state.borrow_mut().delete_pending(ctx);
        ctx.flush();
    }

    fn release_cached_data(&self, ctx: &mut dyn GraphicsContext) {
        let mut state = self.state.borrow_mut();
        let pooled: Vec<TextureId> = state.pool.drain(..).map(|t| t.texture).collect();
        state.pending_deletes.extend(pooled);
        state.delete_pending(ctx);
        state.update_pool_stats();
    }

    fn max_texture_size(&self) -> i32 {
        self.max_texture_size
    }

    fn best_texture_format(&self) -> wgpu::TextureFormat {
        self.best_texture_format
    }

    fn set_read_lock_fence(&self, fence: Rc<dyn Fence>) {
        self.state.borrow_mut().read_lock_fence = Some(fence);
    }

    fn read_lock_fence(&self) -> Option<Rc<dyn Fence>> {
        self.state.borrow().read_lock_fence.clone()
    }

    fn num_resources(&self) -> usize {
        self.state.borrow().resources.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessContext;

    fn provider() -> Rc<BasicResourceProvider> {
        Rc::new(BasicResourceProvider::new(1024, wgpu::TextureFormat::Rgba8Unorm))
    }

    fn shared(provider: &Rc<BasicResourceProvider>) -> Rc<dyn ResourceProvider> {
        provider.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Allocation
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn freed_textures_are_reused() {
        let mut ctx = HeadlessContext::new(16, 16);
        let basic = provider();
        let format = wgpu::TextureFormat::Rgba8Unorm;

        let first = basic
            .create_resource(&mut ctx, IntSize::new(32, 32), format, TextureUsage::Any)
            .unwrap();
        let texture = basic.lock_for_read(first).unwrap();
        basic.unlock_for_read(first);
        basic.delete_resource(first);
        assert_eq!(basic.pool_size(), 1);

        let second = basic
            .create_resource(&mut ctx, IntSize::new(32, 32), format, TextureUsage::Any)
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(basic.lock_for_read(second), Some(texture));
        basic.unlock_for_read(second);

        let stats = basic.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn oversized_and_failed_allocations_return_none() {
        let mut ctx = HeadlessContext::new(16, 16);
        let basic = provider();
        let format = wgpu::TextureFormat::Rgba8Unorm;
        assert!(basic
            .create_resource(&mut ctx, IntSize::new(2048, 8), format, TextureUsage::Any)
            .is_none());

        ctx.set_fail_allocations(true);
        assert!(basic
            .create_resource(&mut ctx, IntSize::new(8, 8), format, TextureUsage::Any)
            .is_none());
        assert_eq!(basic.num_resources(), 0);
    }

    #[test]
    fn release_cached_data_empties_pool() {
        let mut ctx = HeadlessContext::new(16, 16);
        let basic = provider();
        let id = basic
            .create_resource(
                &mut ctx,
                IntSize::new(4, 4),
                wgpu::TextureFormat::Rgba8Unorm,
                TextureUsage::Framebuffer,
            )
            .unwrap();
        basic.delete_resource(id);
        assert_eq!(basic.pool_size(), 1);
        basic.release_cached_data(&mut ctx);
        assert_eq!(basic.pool_size(), 0);
        assert_eq!(ctx.live_textures(), 0);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Locks
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn deletion_waits_for_readers() {
        let mut ctx = HeadlessContext::new(16, 16);
        let basic = provider();
        let provider = shared(&basic);
        let id = provider
            .create_resource(
                &mut ctx,
                IntSize::new(4, 4),
                wgpu::TextureFormat::Rgba8Unorm,
                TextureUsage::Any,
            )
            .unwrap();

        let lock = ScopedReadLock::new(&provider, id).unwrap();
        provider.delete_resource(id);
        assert_eq!(provider.num_resources(), 1);
        assert!(ScopedReadLock::new(&provider, id).is_none());
        drop(lock);
        assert_eq!(provider.num_resources(), 0);
    }

    #[test]
    fn write_lock_waits_for_read_fence() {
        let mut ctx = HeadlessContext::new(16, 16);
        let basic = provider();
        let provider = shared(&basic);
        let id = provider
            .create_resource(
                &mut ctx,
                IntSize::new(4, 4),
                wgpu::TextureFormat::Rgba8Unorm,
                TextureUsage::Any,
            )
            .unwrap();

        let fence = Rc::new(SimpleSwapFence::new());
        provider.set_read_lock_fence(fence.clone());
        {
            let _lock = ScopedReadLock::new(&provider, id).unwrap();
            assert!(!provider.can_lock_for_write(id));
        }
        assert!(!provider.can_lock_for_write(id));
        fence.set_has_passed();
        assert!(provider.can_lock_for_write(id));

        let write = ScopedWriteLock::new(&provider, id).unwrap();
        assert!(!provider.can_lock_for_write(id));
        drop(write);
        assert!(provider.can_lock_for_write(id));
    }

    #[test]
    fn scoped_resource_deletes_on_drop() {
        let mut ctx = HeadlessContext::new(16, 16);
        let basic = provider();
        let provider = shared(&basic);
        {
            let mut resource = ScopedResource::new(&provider);
            assert!(resource.allocate(
                &mut ctx,
                IntSize::new(8, 8),
                wgpu::TextureFormat::Rgba8Unorm,
                TextureUsage::Framebuffer
            ));
            assert_eq!(resource.size(), IntSize::new(8, 8));
            assert_eq!(provider.num_resources(), 1);
        }
        assert_eq!(provider.num_resources(), 0);
    }

    #[test]
    fn set_pixels_uploads_sub_rect() {
        let mut ctx = HeadlessContext::new(16, 16);
        let basic = provider();
        let id = basic
            .create_resource(
                &mut ctx,
                IntSize::new(2, 2),
                wgpu::TextureFormat::Rgba8Unorm,
                TextureUsage::Any,
            )
            .unwrap();
        let mut image = RgbaImage::new(2, 2);
        image.put_pixel(1, 1, image::Rgba([10, 20, 30, 255]));
        basic.upload_image(&mut ctx, id, &image);

        let texture = basic.lock_for_read(id).unwrap();
        basic.unlock_for_read(id);
        let (size, pixels) = ctx.read_texture(texture).unwrap();
        assert_eq!(size, IntSize::new(2, 2));
        assert_eq!(&pixels[12..16], &[10, 20, 30, 255]);
    }
}
