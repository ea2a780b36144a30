//! Queries against the host's bound framebuffer.

use gl::types::GLint;
use overlay_core::{RenderTarget, Size};

/// Whether a GL context is current on this thread.
///
/// Relies on `glGetString` returning null without a current context.
pub fn is_context_current() -> bool {
    if !gl::GetString::is_loaded() {
        return false;
    }
    unsafe { !gl::GetString(gl::VERSION).is_null() }
}

/// Drain the GL error queue so errors raised by the host are not attributed
/// to the guest.
pub fn clear_errors() {
    unsafe { while gl::GetError() != gl::NO_ERROR {} }
}

/// The framebuffer object currently bound for drawing.
///
/// # Safety
///
/// A GL context must be current.
pub unsafe fn bound_framebuffer() -> u32 {
    let mut fbo: GLint = 0;
    gl::GetIntegerv(gl::FRAMEBUFFER_BINDING, &mut fbo);
    fbo.max(0) as u32
}

/// The host's current draw target, sized to `size` (window size times
/// device-pixel ratio).
///
/// Returns `None` when no context is current.
pub fn current_target(size: Size) -> Option<RenderTarget> {
    if !is_context_current() {
        return None;
    }
    clear_errors();
    let fbo = unsafe { bound_framebuffer() };
    Some(RenderTarget::Framebuffer { fbo, size })
}
