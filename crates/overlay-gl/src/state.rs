//! Save and restore the host's GL state around guest drawing.
//!
//! The guest renderer assumes it owns GL state while it draws. The host
//! assumes its bindings survive across our callback. [`GlStateGuard`] captures
//! the bindings the host relies on and puts them back when dropped.

use gl::types::{GLboolean, GLenum, GLint, GLuint};

/// Snapshot of the GL bindings a scene-graph host relies on between passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SavedGlState {
    program: GLint,
    pack_buffer: GLint,
    unpack_buffer: GLint,
    array_buffer: GLint,
    draw_framebuffer: GLint,
    read_framebuffer: GLint,
    texture_2d: GLint,
    active_texture: GLint,
    vao: GLint,
    viewport: [GLint; 4],
    blend: GLboolean,
    scissor_test: GLboolean,
    depth_test: GLboolean,
}

impl SavedGlState {
    unsafe fn save() -> Self {
        let mut s = Self::default();
        gl::GetIntegerv(gl::CURRENT_PROGRAM, &mut s.program);
        gl::GetIntegerv(gl::PIXEL_PACK_BUFFER_BINDING, &mut s.pack_buffer);
        gl::GetIntegerv(gl::PIXEL_UNPACK_BUFFER_BINDING, &mut s.unpack_buffer);
        gl::GetIntegerv(gl::ARRAY_BUFFER_BINDING, &mut s.array_buffer);
        gl::GetIntegerv(gl::DRAW_FRAMEBUFFER_BINDING, &mut s.draw_framebuffer);
        gl::GetIntegerv(gl::READ_FRAMEBUFFER_BINDING, &mut s.read_framebuffer);
        gl::GetIntegerv(gl::ACTIVE_TEXTURE, &mut s.active_texture);
        gl::GetIntegerv(gl::TEXTURE_BINDING_2D, &mut s.texture_2d);
        gl::GetIntegerv(gl::VERTEX_ARRAY_BINDING, &mut s.vao);
        gl::GetIntegerv(gl::VIEWPORT, s.viewport.as_mut_ptr());
        s.blend = gl::IsEnabled(gl::BLEND);
        s.scissor_test = gl::IsEnabled(gl::SCISSOR_TEST);
        s.depth_test = gl::IsEnabled(gl::DEPTH_TEST);
        s
    }

    unsafe fn restore(&self) {
        gl::UseProgram(self.program as GLuint);
        gl::BindBuffer(gl::PIXEL_PACK_BUFFER, self.pack_buffer as GLuint);
        gl::BindBuffer(gl::PIXEL_UNPACK_BUFFER, self.unpack_buffer as GLuint);
        gl::BindBuffer(gl::ARRAY_BUFFER, self.array_buffer as GLuint);
        gl::BindFramebuffer(gl::DRAW_FRAMEBUFFER, self.draw_framebuffer as GLuint);
        gl::BindFramebuffer(gl::READ_FRAMEBUFFER, self.read_framebuffer as GLuint);
        gl::ActiveTexture(self.active_texture as GLenum);
        gl::BindTexture(gl::TEXTURE_2D, self.texture_2d as GLuint);
        gl::BindVertexArray(self.vao as GLuint);
        gl::Viewport(
            self.viewport[0],
            self.viewport[1],
            self.viewport[2],
            self.viewport[3],
        );
        set_capability(gl::BLEND, self.blend);
        set_capability(gl::SCISSOR_TEST, self.scissor_test);
        set_capability(gl::DEPTH_TEST, self.depth_test);
    }
}

unsafe fn set_capability(cap: GLenum, enabled: GLboolean) {
    if enabled == gl::TRUE {
        gl::Enable(cap);
    } else {
        gl::Disable(cap);
    }
}

/// Restores the captured host GL state when dropped.
///
/// ```rust,ignore
/// {
///     let _guard = unsafe { GlStateGuard::save() };
///     guest.render(&target, true)?;
/// } // host bindings restored here
/// ```
#[must_use = "state is restored when the guard is dropped"]
pub struct GlStateGuard {
    saved: SavedGlState,
}

impl GlStateGuard {
    /// Capture the current bindings.
    ///
    /// # Safety
    ///
    /// A GL context must be current and the `gl` function table loaded
    /// (see [`crate::resolver::load_gl_functions`]).
    pub unsafe fn save() -> Self {
        Self {
            saved: SavedGlState::save(),
        }
    }
}

impl Drop for GlStateGuard {
    fn drop(&mut self) {
        // SAFETY: constructed by `save`, whose contract requires the same
        // context to stay current for the guard's lifetime.
        unsafe { self.saved.restore() };
    }
}

/// Put GL back into the neutral state a guest renderer expects to start
/// from: no program, no textures on unit 0, no buffers, blending off, and
/// `fbo` bound for drawing.
///
/// # Safety
///
/// A GL context must be current and the `gl` function table loaded.
pub unsafe fn reset_to_neutral(fbo: GLuint) {
    gl::UseProgram(0);
    gl::ActiveTexture(gl::TEXTURE0);
    gl::BindTexture(gl::TEXTURE_2D, 0);
    gl::BindBuffer(gl::ARRAY_BUFFER, 0);
    gl::BindBuffer(gl::PIXEL_PACK_BUFFER, 0);
    gl::BindBuffer(gl::PIXEL_UNPACK_BUFFER, 0);
    gl::BindVertexArray(0);
    gl::Disable(gl::BLEND);
    gl::Disable(gl::SCISSOR_TEST);
    gl::BlendFunc(gl::ONE, gl::ZERO);
    gl::BindFramebuffer(gl::FRAMEBUFFER, fbo);
}
