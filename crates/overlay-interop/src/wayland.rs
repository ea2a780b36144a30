//! Wayland subsurfaces through `wayland-client` on a foreign display.
//!
//! The host toolkit owns the `wl_display` connection and the parent
//! `wl_surface`. This module wraps both without taking ownership, creates its
//! own event queue on the connection and binds `wl_compositor` and
//! `wl_subcompositor` to build the guest's child surface.

use std::ffi::c_void;

use overlay_core::{BridgeError, Offset, Result, StackingRelation, SyncMode};
use tracing::debug;
use wayland_client::backend::{Backend, ObjectId};
use wayland_client::globals::{registry_queue_init, GlobalListContents};
use wayland_client::protocol::{
    wl_compositor::WlCompositor, wl_registry::WlRegistry, wl_subcompositor::WlSubcompositor,
    wl_subsurface::WlSubsurface, wl_surface::WlSurface,
};
use wayland_client::{delegate_noop, Connection, Dispatch, EventQueue, Proxy, QueueHandle};

use crate::stacking::DisplayServer;

/// Dispatch state for the bridge's private event queue.
#[derive(Debug, Default)]
pub struct StackingState;

impl Dispatch<WlRegistry, GlobalListContents> for StackingState {
    fn event(
        _state: &mut Self,
        _registry: &WlRegistry,
        _event: <WlRegistry as Proxy>::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

delegate_noop!(StackingState: ignore WlCompositor);
delegate_noop!(StackingState: ignore WlSurface);
delegate_noop!(StackingState: WlSubcompositor);
delegate_noop!(StackingState: WlSubsurface);

/// The `wl_subsurface` request a stacking operation goes out as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubsurfaceRequest {
    PlaceAbove,
    PlaceBelow,
    SetSync,
    SetDesync,
}

impl SubsurfaceRequest {
    fn placement(relation: StackingRelation) -> Self {
        match relation {
            StackingRelation::Above => Self::PlaceAbove,
            StackingRelation::Below => Self::PlaceBelow,
        }
    }

    fn sync(mode: SyncMode) -> Self {
        match mode {
            SyncMode::Synced => Self::SetSync,
            // commits on the child apply without waiting for the parent
            SyncMode::Independent => Self::SetDesync,
        }
    }

    fn send(self, subsurface: &WlSubsurface, sibling: Option<&WlSurface>) {
        debug!(request = ?self, "wl_subsurface");
        match (self, sibling) {
            (Self::PlaceAbove, Some(sibling)) => subsurface.place_above(sibling),
            (Self::PlaceBelow, Some(sibling)) => subsurface.place_below(sibling),
            (Self::SetSync, _) => subsurface.set_sync(),
            (Self::SetDesync, _) => subsurface.set_desync(),
            (_, None) => debug!(request = ?self, "placement without a sibling dropped"),
        }
    }
}

/// A [`DisplayServer`] over a Wayland connection owned by someone else.
pub struct WaylandDisplay {
    connection: Connection,
    queue: EventQueue<StackingState>,
    handle: QueueHandle<StackingState>,
    state: StackingState,
    compositor: WlCompositor,
    subcompositor: WlSubcompositor,
}

impl WaylandDisplay {
    /// Wrap the host's `wl_display`.
    ///
    /// # Safety
    /// `display` must be a live `wl_display` pointer that outlives the
    /// returned value.
    pub unsafe fn from_foreign_display(display: *mut c_void) -> Result<Self> {
        let backend = Backend::from_foreign_display(display.cast());
        let connection = Connection::from_backend(backend);

        let (globals, queue) = registry_queue_init::<StackingState>(&connection)
            .map_err(|err| BridgeError::surface(format!("wayland registry: {err}")))?;
        let handle = queue.handle();
        let compositor: WlCompositor = globals
            .bind(&handle, 4..=4, ())
            .map_err(|err| BridgeError::surface(format!("wl_compositor v4: {err}")))?;
        let subcompositor: WlSubcompositor = globals
            .bind(&handle, 1..=1, ())
            .map_err(|err| BridgeError::surface(format!("wl_subcompositor: {err}")))?;
        debug!("bound wl_compositor and wl_subcompositor");

        Ok(Self {
            connection,
            queue,
            handle,
            state: StackingState,
            compositor,
            subcompositor,
        })
    }

    /// Wrap a `wl_surface` created by the host toolkit on this connection.
    ///
    /// # Safety
    /// `surface` must be a live `wl_surface` proxy pointer on this display.
    pub unsafe fn foreign_surface(&self, surface: *mut c_void) -> Result<WlSurface> {
        let id = ObjectId::from_ptr(WlSurface::interface(), surface.cast())
            .map_err(|err| BridgeError::surface(format!("foreign wl_surface: {err}")))?;
        WlSurface::from_id(&self.connection, id)
            .map_err(|err| BridgeError::surface(format!("foreign wl_surface: {err}")))
    }

    /// The raw `wl_display`, e.g. for `vkCreateWaylandSurfaceKHR`.
    pub fn display_ptr(&self) -> *mut c_void {
        self.connection.backend().display_ptr().cast()
    }

    /// The raw `wl_surface` behind `surface`.
    pub fn surface_ptr(surface: &WlSurface) -> *mut c_void {
        surface.id().as_ptr().cast()
    }
}

impl DisplayServer for WaylandDisplay {
    type Surface = WlSurface;
    type Subsurface = WlSubsurface;

    fn create_surface(&mut self) -> Result<WlSurface> {
        Ok(self.compositor.create_surface(&self.handle, ()))
    }

    fn create_subsurface(&mut self, child: &WlSurface, parent: &WlSurface) -> Result<WlSubsurface> {
        if !parent.is_alive() {
            return Err(BridgeError::surface("parent wl_surface is gone"));
        }
        Ok(self
            .subcompositor
            .get_subsurface(child, parent, &self.handle, ()))
    }

    fn set_position(&mut self, subsurface: &WlSubsurface, offset: Offset) {
        subsurface.set_position(offset.x, offset.y);
    }

    fn place(&mut self, subsurface: &WlSubsurface, relation: StackingRelation, sibling: &WlSurface) {
        SubsurfaceRequest::placement(relation).send(subsurface, Some(sibling));
    }

    fn set_sync_mode(&mut self, subsurface: &WlSubsurface, mode: SyncMode) {
        SubsurfaceRequest::sync(mode).send(subsurface, None);
    }

    fn commit(&mut self, surface: &WlSurface) {
        surface.commit();
    }

    fn roundtrip(&mut self) -> Result<()> {
        self.queue
            .roundtrip(&mut self.state)
            .map(|_| ())
            .map_err(|err| BridgeError::surface(format!("wayland roundtrip: {err}")))
    }

    fn destroy_subsurface(&mut self, subsurface: WlSubsurface) {
        subsurface.destroy();
    }

    fn destroy_surface(&mut self, surface: WlSurface) {
        surface.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underlay_stacking_maps_to_place_below_and_desync() {
        assert_eq!(
            SubsurfaceRequest::placement(StackingRelation::Below),
            SubsurfaceRequest::PlaceBelow
        );
        assert_eq!(
            SubsurfaceRequest::placement(StackingRelation::Above),
            SubsurfaceRequest::PlaceAbove
        );
        assert_eq!(
            SubsurfaceRequest::sync(SyncMode::Independent),
            SubsurfaceRequest::SetDesync
        );
        assert_eq!(SubsurfaceRequest::sync(SyncMode::Synced), SubsurfaceRequest::SetSync);
    }
}
