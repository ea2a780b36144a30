//! [`GuestRenderContext`]: exclusive owner of one guest render object.

use overlay_core::{BridgeError, RenderTarget, Result};
use tracing::{debug, trace};

use crate::guest::{GpuApi, GuestContext, GuestRenderer, HostContextDescriptor, UpdateCallback};

/// Renders logged at `debug` before dropping to `trace`.
const VERBOSE_RENDERS: u64 = 5;

/// Owns the guest render object built against one host GPU context.
///
/// The object is created once and freed exactly once, either by
/// [`destroy`](Self::destroy) or on drop. The update callback is unregistered
/// before the object is freed, so a callback can never observe a freed
/// context.
pub struct GuestRenderContext<C: GuestContext> {
    guest: Option<C>,
    api: GpuApi,
    renders: u64,
    presents: u64,
}

impl<C: GuestContext> GuestRenderContext<C> {
    /// Create the guest render object and register `on_update` with it.
    pub fn create<R>(
        renderer: &mut R,
        host: &HostContextDescriptor,
        on_update: UpdateCallback,
    ) -> Result<Self>
    where
        R: GuestRenderer<Context = C>,
    {
        let mut guest = renderer.create_context(host)?;
        guest.set_update_callback(Some(on_update));
        debug!(api = ?host.api(), "guest render context created");
        Ok(Self {
            guest: Some(guest),
            api: host.api(),
            renders: 0,
            presents: 0,
        })
    }

    pub fn api(&self) -> GpuApi {
        self.api
    }

    pub fn is_alive(&self) -> bool {
        self.guest.is_some()
    }

    /// Frames rendered so far.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    /// Presents reported so far.
    pub fn presents(&self) -> u64 {
        self.presents
    }

    /// Draw the guest's current frame into `target`.
    ///
    /// The caller must have the host's GPU context current and its drawing
    /// state saved.
    pub fn render(&mut self, target: &RenderTarget, flip_y: bool) -> Result<()> {
        let guest = self
            .guest
            .as_mut()
            .ok_or(BridgeError::InvalidState("render after guest context destroyed"))?;
        guest.render(target, flip_y)?;
        self.renders += 1;
        if self.renders <= VERBOSE_RENDERS {
            debug!(frame = self.renders, ?target, flip_y, "guest rendered");
        } else {
            trace!(frame = self.renders, "guest rendered");
        }
        Ok(())
    }

    /// Tell the guest the last rendered frame reached the screen.
    pub fn notify_presented(&mut self) {
        if let Some(guest) = self.guest.as_mut() {
            guest.report_presented();
            self.presents += 1;
        }
    }

    /// Unregister the update callback, then free the render object.
    /// Idempotent.
    pub fn destroy(&mut self) {
        if let Some(mut guest) = self.guest.take() {
            guest.set_update_callback(None);
            guest.free();
            debug!(renders = self.renders, "guest render context destroyed");
        }
    }
}

impl<C: GuestContext> Drop for GuestRenderContext<C> {
    fn drop(&mut self) {
        self.destroy();
    }
}
