//! Shadow copies of pipeline state
//!
//! The shadow remembers the last program, blend enablement and scissor
//! issued to the context and elides calls that would not change anything.
//! Scissor changes invalidate the texture batch, so the renderer flushes
//! its batch before applying the ones reported as changes here.

use strata_core::IntRect;

use crate::context::{Capability, GraphicsContext, ProgramId, PREMULTIPLIED_BLEND};

#[derive(Debug, Default)]
pub struct DrawStateShadow {
    program: Option<ProgramId>,
    blend_enabled: bool,
    scissor_enabled: bool,
    scissor_rect: IntRect,
    program_binds: u32,
}

impl DrawStateShadow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put the context in the known per-frame starting state
    ///
    /// Depth test and culling are off, blending is on with the premultiplied
    /// blend function, texture unit 0 is active and no program is assumed.
    pub fn begin_frame(&mut self, ctx: &mut dyn GraphicsContext) {
        ctx.set_capability(Capability::DepthTest, false);
        ctx.set_capability(Capability::CullFace, false);
        ctx.set_capability(Capability::Blend, true);
        ctx.blend_state(PREMULTIPLIED_BLEND);
        ctx.active_texture(0);
        self.blend_enabled = true;
        self.program = None;
        self.program_binds = 0;
    }

    /// Disable blending unconditionally at frame end
    pub fn end_frame(&mut self, ctx: &mut dyn GraphicsContext) {
        ctx.set_capability(Capability::Blend, false);
        self.blend_enabled = false;
    }

    /// Returns true when the context was asked to switch programs
    pub fn set_program(&mut self, ctx: &mut dyn GraphicsContext, program: ProgramId) -> bool {
        if self.program == Some(program) {
            return false;
        }
        ctx.use_program(Some(program));
        self.program = Some(program);
        self.program_binds += 1;
        true
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    /// Forget the bound program, e.g. after deleting programs
    pub fn reset_program(&mut self) {
        self.program = None;
    }

    pub fn set_blend_enabled(&mut self, ctx: &mut dyn GraphicsContext, enabled: bool) -> bool {
        if self.blend_enabled == enabled {
            return false;
        }
        ctx.set_capability(Capability::Blend, enabled);
        self.blend_enabled = enabled;
        true
    }

    pub fn is_blend_enabled(&self) -> bool {
        self.blend_enabled
    }

    pub fn is_scissor_enabled(&self) -> bool {
        self.scissor_enabled
    }

    pub fn scissor_rect(&self) -> IntRect {
        self.scissor_rect
    }

    /// Toggle the scissor test; the caller flushes first when this will
    /// change state (see `is_scissor_enabled`)
    pub fn set_scissor_test(&mut self, ctx: &mut dyn GraphicsContext, enabled: bool) -> bool {
        if self.scissor_enabled == enabled {
            return false;
        }
        ctx.set_capability(Capability::ScissorTest, enabled);
        self.scissor_enabled = enabled;
        true
    }

    /// Whether `rect` differs from the last scissor rect issued
    pub fn scissor_changes(&self, rect: IntRect) -> bool {
        self.scissor_rect != rect
    }

    pub fn set_scissor_rect(&mut self, ctx: &mut dyn GraphicsContext, rect: IntRect) -> bool {
        if !self.scissor_changes(rect) {
            return false;
        }
        self.scissor_rect = rect;
        ctx.scissor(rect);
        true
    }

    /// Number of program switches issued since the frame began
    pub fn program_binds(&self) -> u32 {
        self.program_binds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{Call, HeadlessContext};

    #[test]
    fn redundant_program_binds_are_elided() {
        let mut ctx = HeadlessContext::new(8, 8);
        let mut state = DrawStateShadow::new();
        assert!(state.set_program(&mut ctx, ProgramId(3)));
        assert!(!state.set_program(&mut ctx, ProgramId(3)));
        assert!(state.set_program(&mut ctx, ProgramId(4)));

        let binds = ctx
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::UseProgram(_)))
            .count();
        assert_eq!(binds, 2);
        assert_eq!(state.program_binds(), 2);
    }

    #[test]
    fn blend_toggles_only_on_change() {
        let mut ctx = HeadlessContext::new(8, 8);
        let mut state = DrawStateShadow::new();
        state.begin_frame(&mut ctx);
        ctx.clear_calls();

        assert!(!state.set_blend_enabled(&mut ctx, true));
        assert!(state.set_blend_enabled(&mut ctx, false));
        assert!(!state.set_blend_enabled(&mut ctx, false));
        assert_eq!(
            ctx.calls(),
            &[Call::SetCapability(Capability::Blend, false)]
        );
    }

    #[test]
    fn scissor_rect_is_issued_once() {
        let mut ctx = HeadlessContext::new(8, 8);
        let mut state = DrawStateShadow::new();
        let rect = IntRect::new(1, 2, 3, 4);
        assert!(state.set_scissor_test(&mut ctx, true));
        assert!(state.set_scissor_rect(&mut ctx, rect));
        assert!(!state.set_scissor_rect(&mut ctx, rect));
        assert!(!state.scissor_changes(rect));
        assert_eq!(state.scissor_rect(), rect);
        assert!(state.is_scissor_enabled());
    }

    #[test]
    fn begin_frame_forgets_program() {
        let mut ctx = HeadlessContext::new(8, 8);
        let mut state = DrawStateShadow::new();
        state.set_program(&mut ctx, ProgramId(1));
        state.begin_frame(&mut ctx);
        assert_eq!(state.program(), None);
        assert!(state.is_blend_enabled());
        assert!(state.set_program(&mut ctx, ProgramId(1)));
    }
}
