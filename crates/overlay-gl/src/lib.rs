//! OpenGL side of the bridge: the host's current GL context as seen by a
//! guest renderer.
//!
//! - [`ProcResolver`] resolves GL entry points from whatever context is
//!   current on the calling thread, returning null rather than failing.
//! - [`GlStateGuard`] saves the host's GL bindings before the guest draws and
//!   restores them afterwards.
//! - [`framebuffer`] queries the framebuffer the host bound for this pass.
//!
//! ### Warning
//!
//! Every GL call in this crate assumes the host has made its context current
//! on the calling thread. Pipeline hook callbacks are the only place that is
//! guaranteed.

pub mod framebuffer;
pub mod resolver;
pub mod state;

pub use framebuffer::{current_target, is_context_current};
pub use resolver::{
    load_gl_functions, proc_address_trampoline, ContextResolver, GlContextSource, GlLoader,
    LoaderResolver, ProcResolver,
};
pub use state::{reset_to_neutral, GlStateGuard};
