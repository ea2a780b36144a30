//! The guest renderer as the bridge sees it.
//!
//! A guest is an external media engine that draws with native GPU calls into
//! targets the host hands it. [`GuestRenderer`] creates one
//! [`GuestContext`] per live host GPU context; alternative guest backends
//! (OpenGL, Vulkan) are different [`HostContextDescriptor`] variants rather
//! than branches inside the bridge.

use std::fmt;
use std::sync::Arc;

use overlay_core::{RenderTarget, Result, VulkanHandles};
use overlay_gl::ProcResolver;

/// Callback the guest invokes whenever it has a new frame to show. May be
/// called from any thread, including threads the guest owns privately.
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// GPU API a host context speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuApi {
    OpenGl,
    Vulkan,
}

impl GpuApi {
    /// Whether targets of this API are stored bottom-up and need a vertical
    /// flip when drawn into a window.
    pub fn flips_vertically(self) -> bool {
        matches!(self, GpuApi::OpenGl)
    }
}

/// What the guest needs to draw with the host's GPU context.
#[derive(Clone)]
pub enum HostContextDescriptor {
    /// Resolve GL entry points from the host's current context.
    OpenGl { resolver: Arc<dyn ProcResolver> },
    /// Share the host's Vulkan instance, device and queue.
    Vulkan(VulkanHandles),
}

impl HostContextDescriptor {
    pub fn api(&self) -> GpuApi {
        match self {
            HostContextDescriptor::OpenGl { .. } => GpuApi::OpenGl,
            HostContextDescriptor::Vulkan(_) => GpuApi::Vulkan,
        }
    }
}

impl fmt::Debug for HostContextDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostContextDescriptor::OpenGl { .. } => f.write_str("OpenGl"),
            HostContextDescriptor::Vulkan(handles) => f.debug_tuple("Vulkan").field(handles).finish(),
        }
    }
}

/// Events the guest reports outside of rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestEvent {
    /// The guest is shutting down; stop driving it.
    Shutdown,
    /// The current media source finished.
    EndOfStream,
    /// Anything else, by name. Logged and otherwise ignored.
    Other(String),
}

impl GuestEvent {
    /// Whether a dedicated render loop should stop on this event.
    pub fn ends_playback(&self) -> bool {
        matches!(self, GuestEvent::Shutdown | GuestEvent::EndOfStream)
    }
}

/// An external media engine that can draw with a host's GPU context.
pub trait GuestRenderer {
    type Context: GuestContext;

    /// Negotiate a render context against the host's GPU context.
    ///
    /// Fails with [`BridgeError::ContextCreation`](overlay_core::BridgeError)
    /// when the guest cannot work with the host's backend or device.
    fn create_context(&mut self, host: &HostContextDescriptor) -> Result<Self::Context>;

    /// Next pending event, without blocking.
    fn poll_event(&mut self) -> Option<GuestEvent> {
        None
    }
}

/// The guest's GPU render object for one host context.
pub trait GuestContext {
    /// Register (`Some`) or unregister (`None`) the new-frame callback.
    fn set_update_callback(&mut self, callback: Option<UpdateCallback>);

    /// Record drawing commands into `target`. Completion is tracked by GPU
    /// synchronization, not by this call returning.
    fn render(&mut self, target: &RenderTarget, flip_y: bool) -> Result<()>;

    /// A frame previously rendered has been presented.
    fn report_presented(&mut self);

    /// Free the render object. Called exactly once, after the update
    /// callback has been unregistered.
    fn free(self)
    where
        Self: Sized;
}
