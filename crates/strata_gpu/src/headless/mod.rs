//! Headless CPU implementation of the graphics context
//!
//! `HeadlessContext` executes every command on the CPU: textures and the
//! default framebuffer are plain RGBA8 buffers and draws are rasterized by
//! running each program's vertex and fragment stages per pixel. Every call
//! is also recorded so tests can assert on the command stream.
//!
//! Buffers are stored row 0 first, where row 0 is window `y = 0` and, for
//! textures, texture coordinate `v = 0`.

mod raster;
mod surface;

pub use surface::HeadlessOutputSurface;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use strata_core::{IntRect, IntSize};

use crate::context::{
    Capability, FramebufferId, GraphicsContext, PrimitiveMode, ProgramId, TextureId, TextureTarget,
    UniformLocation, UniformValue, PREMULTIPLIED_BLEND,
};
use crate::program::{ProgramDescriptor, ProgramKey, Uniform};
use crate::shaders;

/// Texture units available to programs
pub const TEXTURE_UNITS: usize = 4;

/// One command received by a [`HeadlessContext`]
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    MakeCurrent,
    SetVisibility(bool),
    CreateProgram(String),
    DeleteProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    SetUniform(UniformLocation, UniformValue),
    SetUniformBlock(UniformLocation, usize),
    SetCapability(Capability, bool),
    BlendState(wgpu::BlendState),
    Scissor(IntRect),
    Viewport(IntRect),
    ClearColor([f32; 4]),
    Clear,
    LineWidth(f32),
    CreateTexture(TextureId),
    DeleteTexture(TextureId),
    TexImage(TextureId, IntSize),
    TexSubImage(TextureId, IntRect),
    TextureFilter(TextureId, wgpu::FilterMode),
    ActiveTexture(u32),
    BindTexture(TextureTarget, Option<TextureId>),
    CreateFramebuffer(FramebufferId),
    DeleteFramebuffer(FramebufferId),
    BindFramebuffer(Option<FramebufferId>),
    FramebufferTexture(Option<TextureId>),
    CopyTexImage(TextureId, IntRect),
    ReadPixels(IntRect),
    PrepareQuadGeometry(usize),
    DrawElements {
        mode: PrimitiveMode,
        count: u32,
        offset: u32,
    },
    Flush,
    Finish,
    Resize(IntSize),
    DiscardBackbuffer,
    EnsureBackbuffer,
    SwapBuffers,
    PostSubBuffer(IntRect),
}

/// Pipeline state captured for every draw call
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    /// Program the draw used; `None` for an unknown program
    pub key: Option<ProgramKey>,
    pub mode: PrimitiveMode,
    pub count: u32,
    /// Blend state in effect, `None` while blending is disabled
    pub blend: Option<wgpu::BlendState>,
    /// Scissor rect in effect, `None` while the scissor test is disabled
    pub scissor: Option<IntRect>,
    /// Framebuffer drawn into, `None` for the default framebuffer
    pub framebuffer: Option<FramebufferId>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────────────────────────────────────

/// RGBA8 pixels, row 0 first
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct PixelBuffer {
    size: IntSize,
    data: Vec<u8>,
}

impl PixelBuffer {
    fn new(size: IntSize) -> Self {
        Self {
            size,
            data: vec![0; size.area() * 4],
        }
    }

    pub(crate) fn size(&self) -> IntSize {
        self.size
    }

    pub(crate) fn bounds(&self) -> IntRect {
        IntRect::from_size(self.size)
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.size.width || y >= self.size.height {
            return None;
        }
        Some((y as usize * self.size.width as usize + x as usize) * 4)
    }

    pub(crate) fn pixel(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        let offset = self.offset(x, y)?;
        let mut px = [0; 4];
        px.copy_from_slice(&self.data[offset..offset + 4]);
        Some(px)
    }

    pub(crate) fn set_pixel(&mut self, x: i32, y: i32, px: [u8; 4]) {
        if let Some(offset) = self.offset(x, y) {
            self.data[offset..offset + 4].copy_from_slice(&px);
        }
    }

    /// Pixels of `rect` row by row; texels outside the buffer read as zero
    fn read_rect(&self, rect: IntRect) -> Vec<u8> {
        let mut out = Vec::with_capacity(rect.size().area() * 4);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                out.extend_from_slice(&self.pixel(x, y).unwrap_or([0; 4]));
            }
        }
        out
    }

    fn write_rect(&mut self, rect: IntRect, data: &[u8]) {
        let mut texels = data.chunks_exact(4);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                let Some(texel) = texels.next() else {
                    return;
                };
                self.set_pixel(x, y, [texel[0], texel[1], texel[2], texel[3]]);
            }
        }
    }

    fn fill(&mut self, rect: IntRect, px: [u8; 4]) {
        let rect = rect.intersect(&self.bounds());
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                self.set_pixel(x, y, px);
            }
        }
    }
}

pub(crate) struct HeadlessTexture {
    pub(crate) buffer: PixelBuffer,
    format: wgpu::TextureFormat,
    pub(crate) filter: wgpu::FilterMode,
}

/// Linked program with the uniform values last uploaded to it
pub(crate) struct HeadlessProgram {
    pub(crate) key: ProgramKey,
    uniforms: FxHashMap<Uniform, UniformValue>,
    pub(crate) block: Vec<u8>,
}

impl HeadlessProgram {
    fn value(&self, uniform: Uniform) -> Option<&UniformValue> {
        self.uniforms.get(&uniform)
    }

    // Unset uniforms read as zero.

    pub(crate) fn float(&self, uniform: Uniform) -> f32 {
        match self.value(uniform) {
            Some(UniformValue::Float(v)) => *v,
            _ => 0.0,
        }
    }

    pub(crate) fn int(&self, uniform: Uniform) -> i32 {
        match self.value(uniform) {
            Some(UniformValue::Int(v)) => *v,
            _ => 0,
        }
    }

    pub(crate) fn vec2(&self, uniform: Uniform) -> [f32; 2] {
        match self.value(uniform) {
            Some(UniformValue::Vec2(v)) => *v,
            _ => [0.0; 2],
        }
    }

    pub(crate) fn vec3(&self, uniform: Uniform) -> [f32; 3] {
        match self.value(uniform) {
            Some(UniformValue::Vec3(v)) => *v,
            _ => [0.0; 3],
        }
    }

    pub(crate) fn vec4(&self, uniform: Uniform) -> [f32; 4] {
        match self.value(uniform) {
            Some(UniformValue::Vec4(v)) => *v,
            _ => [0.0; 4],
        }
    }

    pub(crate) fn mat3(&self, uniform: Uniform) -> [f32; 9] {
        match self.value(uniform) {
            Some(UniformValue::Mat3(v)) => *v,
            _ => [0.0; 9],
        }
    }

    pub(crate) fn mat4(&self, uniform: Uniform) -> [f32; 16] {
        match self.value(uniform) {
            Some(UniformValue::Mat4(v)) => *v,
            _ => [0.0; 16],
        }
    }

    pub(crate) fn vec2_at(&self, uniform: Uniform, index: usize) -> [f32; 2] {
        match self.value(uniform) {
            Some(UniformValue::Vec2Array(v)) => v.get(index).copied().unwrap_or([0.0; 2]),
            _ => [0.0; 2],
        }
    }

    pub(crate) fn vec3_at(&self, uniform: Uniform, index: usize) -> [f32; 3] {
        match self.value(uniform) {
            Some(UniformValue::Vec3Array(v)) => v.get(index).copied().unwrap_or([0.0; 3]),
            _ => [0.0; 3],
        }
    }
}

/// Bytes per texel of data handed to `tex_image`/`tex_sub_image`
fn bytes_per_texel(format: wgpu::TextureFormat) -> usize {
    match format {
        wgpu::TextureFormat::R8Unorm => 1,
        _ => 4,
    }
}

/// Convert upload data of `format` into stored RGBA8
fn to_rgba(format: wgpu::TextureFormat, data: &[u8]) -> Vec<u8> {
    match format {
        wgpu::TextureFormat::R8Unorm => data.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => data
            .chunks_exact(4)
            .flat_map(|px| [px[2], px[1], px[0], px[3]])
            .collect(),
        _ => data.to_vec(),
    }
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

// ─────────────────────────────────────────────────────────────────────────────
// Context
// ─────────────────────────────────────────────────────────────────────────────

/// CPU graphics context that records and executes every call
pub struct HeadlessContext {
    extensions: Vec<String>,
    lost: bool,
    fail_allocations: bool,
    fail_program_links: bool,
    visible: bool,
    next_id: u32,

    programs: FxHashMap<ProgramId, HeadlessProgram>,
    programs_created: usize,
    textures: FxHashMap<TextureId, HeadlessTexture>,
    framebuffers: FxHashMap<FramebufferId, Option<TextureId>>,
    bound_framebuffer: Option<FramebufferId>,
    backbuffer: PixelBuffer,
    backbuffer_discarded: bool,

    current_program: Option<ProgramId>,
    active_unit: usize,
    bindings: [[Option<TextureId>; 2]; TEXTURE_UNITS],
    blend_enabled: bool,
    blend: wgpu::BlendState,
    scissor_enabled: bool,
    scissor_rect: IntRect,
    viewport: IntRect,
    clear_color: [f32; 4],
    line_width: f32,
    indices: Vec<u16>,

    calls: Vec<Call>,
    draws: Vec<DrawRecord>,
    swaps: u32,
}

impl HeadlessContext {
    /// Context whose default framebuffer is `width × height`
    pub fn new(width: i32, height: i32) -> Self {
        let size = IntSize::new(width.max(0), height.max(0));
        Self {
            extensions: Vec::new(),
            lost: false,
            fail_allocations: false,
            fail_program_links: false,
            visible: true,
            next_id: 1,
            programs: FxHashMap::default(),
            programs_created: 0,
            textures: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            bound_framebuffer: None,
            backbuffer: PixelBuffer::new(size),
            backbuffer_discarded: false,
            current_program: None,
            active_unit: 0,
            bindings: [[None; 2]; TEXTURE_UNITS],
            blend_enabled: false,
            blend: PREMULTIPLIED_BLEND,
            scissor_enabled: false,
            scissor_rect: IntRect::ZERO,
            viewport: IntRect::from_size(size),
            clear_color: [0.0; 4],
            line_width: 1.0,
            indices: Vec::new(),
            calls: Vec::new(),
            draws: Vec::new(),
            swaps: 0,
        }
    }

    /// Report `extensions` from [`GraphicsContext::extensions`]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|name| name.as_ref().to_string())
            .collect();
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fault Injection
    // ─────────────────────────────────────────────────────────────────────────

    /// Lose the context; every later creation call fails and draws do nothing
    pub fn lose_context(&mut self) {
        tracing::debug!("headless context lost");
        self.lost = true;
    }

    /// Make texture creation and storage allocation fail
    pub fn set_fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// Make every program fail to link
    pub fn set_fail_program_links(&mut self, fail: bool) {
        self.fail_program_links = fail;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
        self.draws.clear();
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn programs_created(&self) -> usize {
        self.programs_created
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn swap_count(&self) -> u32 {
        self.swaps
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_backbuffer_discarded(&self) -> bool {
        self.backbuffer_discarded
    }

    pub fn backbuffer_size(&self) -> IntSize {
        self.backbuffer.size()
    }

    /// Default framebuffer pixel at window coordinates (bottom-left origin)
    pub fn backbuffer_pixel(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        self.backbuffer.pixel(x, y)
    }

    /// Texture pixel at texel coordinates (row 0 first)
    pub fn texture_pixel(&self, texture: TextureId, x: i32, y: i32) -> Option<[u8; 4]> {
        self.textures.get(&texture)?.buffer.pixel(x, y)
    }

    fn record(&mut self, call: Call) {
        self.calls.push(call);
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Texture the bound framebuffer draws into; `Some(None)` is the default
    /// framebuffer and `None` an incomplete framebuffer
    fn bound_target(&self) -> Option<Option<TextureId>> {
        match self.bound_framebuffer {
            None => Some(None),
            Some(framebuffer) => match self.framebuffers.get(&framebuffer) {
                Some(Some(texture)) if self.textures.contains_key(texture) => Some(Some(*texture)),
                _ => None,
            },
        }
    }

    fn target_buffer(&self) -> Option<&PixelBuffer> {
        match self.bound_target()? {
            None => Some(&self.backbuffer),
            Some(texture) => self.textures.get(&texture).map(|t| &t.buffer),
        }
    }

    fn target_buffer_mut(&mut self) -> Option<&mut PixelBuffer> {
        match self.bound_target()? {
            None => Some(&mut self.backbuffer),
            Some(texture) => self.textures.get_mut(&texture).map(|t| &mut t.buffer),
        }
    }

    fn active_scissor(&self) -> Option<IntRect> {
        self.scissor_enabled.then_some(self.scissor_rect)
    }
}

impl GraphicsContext for HeadlessContext {
    fn make_current(&mut self) -> bool {
        self.record(Call::MakeCurrent);
        !self.lost
    }

    fn is_context_lost(&self) -> bool {
        self.lost
    }

    fn extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    fn set_visibility(&mut self, visible: bool) {
        self.record(Call::SetVisibility(visible));
        self.visible = visible;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Programs
    // ─────────────────────────────────────────────────────────────────────────

    fn create_program(&mut self, descriptor: &ProgramDescriptor) -> Option<ProgramId> {
        self.record(Call::CreateProgram(descriptor.label.clone()));
        if self.lost || self.fail_program_links {
            return None;
        }
        if let Err(err) = shaders::validate_wgsl(&descriptor.source) {
            tracing::warn!("program {} failed to link: {}", descriptor.label, err);
            return None;
        }
        let id = ProgramId(self.next_id());
        self.programs.insert(
            id,
            HeadlessProgram {
                key: descriptor.key,
                uniforms: FxHashMap::default(),
                block: Vec::new(),
            },
        );
        self.programs_created += 1;
        Some(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.record(Call::DeleteProgram(program));
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.record(Call::UseProgram(program));
        self.current_program = program;
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let program = self.programs.get(&program)?;
        let uniform = Uniform::from_name(name)?;
        program
            .key
            .kind
            .uniforms()
            .contains(&uniform)
            .then_some(UniformLocation(uniform.index() as i32))
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        self.record(Call::SetUniform(location, value.clone()));
        let Some(uniform) = usize::try_from(location.0).ok().and_then(Uniform::from_index) else {
            return;
        };
        if let Some(program) = self.current_program.and_then(|id| self.programs.get_mut(&id)) {
            program.uniforms.insert(uniform, value);
        }
    }

    fn set_uniform_block(&mut self, location: UniformLocation, data: &[u8]) {
        self.record(Call::SetUniformBlock(location, data.len()));
        if let Some(program) = self.current_program.and_then(|id| self.programs.get_mut(&id)) {
            program.block.clear();
            program.block.extend_from_slice(data);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline State
    // ─────────────────────────────────────────────────────────────────────────

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        self.record(Call::SetCapability(capability, enabled));
        match capability {
            Capability::Blend => self.blend_enabled = enabled,
            Capability::ScissorTest => self.scissor_enabled = enabled,
            Capability::DepthTest | Capability::CullFace => {}
        }
    }

    fn blend_state(&mut self, state: wgpu::BlendState) {
        self.record(Call::BlendState(state));
        self.blend = state;
    }

    fn scissor(&mut self, rect: IntRect) {
        self.record(Call::Scissor(rect));
        self.scissor_rect = rect;
    }

    fn viewport(&mut self, rect: IntRect) {
        self.record(Call::Viewport(rect));
        self.viewport = rect;
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        self.record(Call::ClearColor(color));
        self.clear_color = color;
    }

    fn clear(&mut self) {
        self.record(Call::Clear);
        if self.lost {
            return;
        }
        let color = self.clear_color.map(to_byte);
        let scissor = self.active_scissor();
        if let Some(target) = self.target_buffer_mut() {
            let rect = scissor.unwrap_or_else(|| target.bounds());
            target.fill(rect, color);
        }
    }

    fn line_width(&mut self, width: f32) {
        self.record(Call::LineWidth(width));
        self.line_width = width;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Textures
    // ─────────────────────────────────────────────────────────────────────────

    fn create_texture(&mut self) -> Option<TextureId> {
        if self.lost || self.fail_allocations {
            return None;
        }
        let id = TextureId(self.next_id());
        self.record(Call::CreateTexture(id));
        self.textures.insert(
            id,
            HeadlessTexture {
                buffer: PixelBuffer::default(),
                format: wgpu::TextureFormat::Rgba8Unorm,
                filter: wgpu::FilterMode::Linear,
            },
        );
        Some(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.record(Call::DeleteTexture(texture));
        self.textures.remove(&texture);
        for unit in &mut self.bindings {
            for binding in unit.iter_mut() {
                if *binding == Some(texture) {
                    *binding = None;
                }
            }
        }
    }

    fn tex_image(
        &mut self,
        texture: TextureId,
        size: IntSize,
        format: wgpu::TextureFormat,
        data: Option<&[u8]>,
    ) -> bool {
        self.record(Call::TexImage(texture, size));
        if self.lost || self.fail_allocations {
            return false;
        }
        let Some(entry) = self.textures.get_mut(&texture) else {
            return false;
        };
        let mut buffer = PixelBuffer::new(size);
        if let Some(data) = data {
            if data.len() < size.area() * bytes_per_texel(format) {
                tracing::warn!("tex_image data too short for {}x{}", size.width, size.height);
                return false;
            }
            buffer.write_rect(IntRect::from_size(size), &to_rgba(format, data));
        }
        entry.buffer = buffer;
        entry.format = format;
        true
    }

    fn tex_sub_image(&mut self, texture: TextureId, rect: IntRect, data: &[u8]) {
        self.record(Call::TexSubImage(texture, rect));
        if self.lost {
            return;
        }
        if let Some(entry) = self.textures.get_mut(&texture) {
            let rgba = to_rgba(entry.format, data);
            entry.buffer.write_rect(rect, &rgba);
        }
    }

    fn read_texture(&self, texture: TextureId) -> Option<(IntSize, Vec<u8>)> {
        if self.lost {
            return None;
        }
        let entry = self.textures.get(&texture)?;
        Some((entry.buffer.size(), entry.buffer.data.clone()))
    }

    fn texture_filter(&mut self, texture: TextureId, filter: wgpu::FilterMode) {
        self.record(Call::TextureFilter(texture, filter));
        if let Some(entry) = self.textures.get_mut(&texture) {
            entry.filter = filter;
        }
    }

    fn active_texture(&mut self, unit: u32) {
        self.record(Call::ActiveTexture(unit));
        self.active_unit = (unit as usize).min(TEXTURE_UNITS - 1);
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureId>) {
        self.record(Call::BindTexture(target, texture));
        self.bindings[self.active_unit][raster::target_slot(target)] = texture;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Framebuffers
    // ─────────────────────────────────────────────────────────────────────────

    fn create_framebuffer(&mut self) -> Option<FramebufferId> {
        if self.lost {
            return None;
        }
        let id = FramebufferId(self.next_id());
        self.record(Call::CreateFramebuffer(id));
        self.framebuffers.insert(id, None);
        Some(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.record(Call::DeleteFramebuffer(framebuffer));
        self.framebuffers.remove(&framebuffer);
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.record(Call::BindFramebuffer(framebuffer));
        self.bound_framebuffer = framebuffer;
    }

    fn framebuffer_texture(&mut self, texture: Option<TextureId>) {
        self.record(Call::FramebufferTexture(texture));
        if let Some(framebuffer) = self.bound_framebuffer {
            self.framebuffers.insert(framebuffer, texture);
        }
    }

    fn copy_tex_image(&mut self, texture: TextureId, rect: IntRect) -> bool {
        self.record(Call::CopyTexImage(texture, rect));
        if self.lost || rect.is_empty() {
            return false;
        }
        let Some(source) = self.target_buffer() else {
            return false;
        };
        let data = source.read_rect(rect);
        let Some(entry) = self.textures.get_mut(&texture) else {
            return false;
        };
        let mut buffer = PixelBuffer::new(rect.size());
        buffer.write_rect(IntRect::from_size(rect.size()), &data);
        entry.buffer = buffer;
        entry.format = wgpu::TextureFormat::Rgba8Unorm;
        true
    }

    fn read_pixels(&mut self, rect: IntRect) -> Vec<u8> {
        self.record(Call::ReadPixels(rect));
        if self.lost {
            return Vec::new();
        }
        self.target_buffer()
            .map(|buffer| buffer.read_rect(rect))
            .unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Draws
    // ─────────────────────────────────────────────────────────────────────────

    fn prepare_quad_geometry(&mut self, indices: &[u16]) {
        self.record(Call::PrepareQuadGeometry(indices.len()));
        self.indices = indices.to_vec();
    }

    fn draw_elements(&mut self, mode: PrimitiveMode, count: u32, offset: u32) {
        self.record(Call::DrawElements { mode, count, offset });
        let record = DrawRecord {
            key: self
                .current_program
                .and_then(|id| self.programs.get(&id))
                .map(|program| program.key),
            mode,
            count,
            blend: self.blend_enabled.then_some(self.blend),
            scissor: self.active_scissor(),
            framebuffer: self.bound_framebuffer,
        };
        self.draws.push(record);
        if self.lost {
            return;
        }

        let start = offset as usize;
        let Some(indices) = self.indices.get(start..start + count as usize) else {
            tracing::warn!("draw of {} indices at {} exceeds the index buffer", count, offset);
            return;
        };
        let indices: SmallVec<[u16; 64]> = indices.iter().copied().collect();

        // Sampling the texture being rendered into is undefined; detach it
        // for the duration of the draw.
        let Some(target_texture) = self.bound_target() else {
            tracing::debug!("draw into incomplete framebuffer");
            return;
        };
        let mut target = match target_texture {
            None => std::mem::take(&mut self.backbuffer),
            Some(texture) => match self.textures.get_mut(&texture) {
                Some(entry) => std::mem::take(&mut entry.buffer),
                None => return,
            },
        };

        if let Some(program) = self.current_program.and_then(|id| self.programs.get(&id)) {
            let pipeline = raster::Pipeline {
                program,
                textures: &self.textures,
                bindings: &self.bindings,
                viewport: self.viewport,
                scissor: self.active_scissor(),
                blend: self.blend_enabled.then_some(self.blend),
                line_width: self.line_width,
            };
            match mode {
                PrimitiveMode::Triangles => raster::draw_triangles(&pipeline, &mut target, &indices),
                PrimitiveMode::LineLoop => raster::draw_line_loop(&pipeline, &mut target, &indices),
            }
        }

        match target_texture {
            None => self.backbuffer = target,
            Some(texture) => {
                if let Some(entry) = self.textures.get_mut(&texture) {
                    entry.buffer = target;
                }
            }
        }
    }

    fn flush(&mut self) {
        self.record(Call::Flush);
    }

    fn finish(&mut self) {
        self.record(Call::Finish);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Default Framebuffer
    // ─────────────────────────────────────────────────────────────────────────

    fn resize(&mut self, size: IntSize) {
        self.record(Call::Resize(size));
        self.backbuffer = PixelBuffer::new(size);
    }

    fn discard_backbuffer(&mut self) {
        self.record(Call::DiscardBackbuffer);
        self.backbuffer_discarded = true;
        self.backbuffer = PixelBuffer::new(self.backbuffer.size());
    }

    fn ensure_backbuffer(&mut self) {
        self.record(Call::EnsureBackbuffer);
        self.backbuffer_discarded = false;
    }

    fn swap_buffers(&mut self) {
        self.record(Call::SwapBuffers);
        self.swaps += 1;
    }

    fn post_sub_buffer(&mut self, rect: IntRect) {
        self.record(Call::PostSubBuffer(rect));
        self.swaps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{ProgramKind, TexCoordPrecision};

    fn solid_program(ctx: &mut HeadlessContext) -> ProgramId {
        let key = ProgramKey::new(ProgramKind::SolidColor { aa: false }, TexCoordPrecision::Medium);
        ctx.create_program(&ProgramDescriptor::new(key, true)).unwrap()
    }

    #[test]
    fn clear_honors_scissor() {
        let mut ctx = HeadlessContext::new(4, 4);
        ctx.clear_color([1.0, 0.0, 0.0, 1.0]);
        ctx.set_capability(Capability::ScissorTest, true);
        ctx.scissor(IntRect::new(1, 1, 2, 2));
        ctx.clear();
        assert_eq!(ctx.backbuffer_pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(ctx.backbuffer_pixel(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(ctx.backbuffer_pixel(2, 2), Some([255, 0, 0, 255]));
        assert_eq!(ctx.backbuffer_pixel(3, 3), Some([0, 0, 0, 0]));
    }

    #[test]
    fn uniform_locations_follow_declared_uniforms() {
        let mut ctx = HeadlessContext::new(4, 4);
        let program = solid_program(&mut ctx);
        assert_eq!(
            ctx.uniform_location(program, "color"),
            Some(UniformLocation(Uniform::Color.index() as i32))
        );
        assert_eq!(ctx.uniform_location(program, "edge"), None);
        assert_eq!(ctx.uniform_location(program, "bogus"), None);
    }

    #[test]
    fn full_viewport_quad_fills_every_pixel() {
        let mut ctx = HeadlessContext::new(3, 2);
        let program = solid_program(&mut ctx);
        ctx.prepare_quad_geometry(&crate::context::quad_indices(1));
        ctx.use_program(Some(program));
        let location = |uniform: Uniform| UniformLocation(uniform.index() as i32);
        // Quad points span [-1, 1]² directly under an identity matrix.
        ctx.set_uniform(
            location(Uniform::Quad),
            UniformValue::Vec2Array(SmallVec::from_buf([[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]])),
        );
        let mut identity = [0.0; 16];
        for i in 0..4 {
            identity[i * 5] = 1.0;
        }
        ctx.set_uniform(location(Uniform::Matrix), UniformValue::Mat4(identity));
        ctx.set_uniform(location(Uniform::Color), UniformValue::Vec4([0.0, 1.0, 0.0, 1.0]));
        ctx.draw_elements(PrimitiveMode::Triangles, 6, 0);

        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(ctx.backbuffer_pixel(x, y), Some([0, 255, 0, 255]));
            }
        }
        assert_eq!(ctx.draws().len(), 1);
        assert_eq!(ctx.draws()[0].blend, None);
    }

    #[test]
    fn bgra_uploads_are_stored_as_rgba() {
        let mut ctx = HeadlessContext::new(1, 1);
        let texture = ctx.create_texture().unwrap();
        assert!(ctx.tex_image(
            texture,
            IntSize::new(1, 1),
            wgpu::TextureFormat::Bgra8Unorm,
            Some(&[1, 2, 3, 4])
        ));
        assert_eq!(ctx.texture_pixel(texture, 0, 0), Some([3, 2, 1, 4]));
    }

    #[test]
    fn copy_reads_the_bound_framebuffer() {
        let mut ctx = HeadlessContext::new(2, 2);
        ctx.clear_color([0.0, 0.0, 1.0, 1.0]);
        ctx.clear();
        let texture = ctx.create_texture().unwrap();
        assert!(ctx.copy_tex_image(texture, IntRect::new(1, 0, 2, 1)));
        let (size, data) = ctx.read_texture(texture).unwrap();
        assert_eq!(size, IntSize::new(2, 1));
        assert_eq!(&data[..4], &[0, 0, 255, 255]);
        assert_eq!(&data[4..], &[0, 0, 0, 0]);
    }
}
