//! GPU-less and compositor-less backends.
//!
//! [`HeadlessPresenter`] hands out fake handles and keeps a
//! [`ResourceLedger`] of everything created and destroyed, so resize and
//! teardown ordering can be checked without a device. [`HeadlessDisplay`]
//! records every display-server request it receives as a [`DisplayOp`].

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use overlay_core::{BridgeError, ColorSpace, Offset, PixelFormat, Result, Size, SurfaceExtents};
use overlay_core::{StackingRelation, SyncMode};
use tracing::trace;

use crate::format::{desired_image_count, SurfaceFormat};
use crate::presenter::{AcquireError, AcquiredImage, PresentBackend, RawSwapchain};
use crate::stacking::DisplayServer;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Presenter
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LedgerState {
    next_handle: u64,
    live_swapchains: HashSet<u64>,
    live_views: HashSet<u64>,
    swapchains_created: usize,
    views_created: usize,
    wait_idle_calls: usize,
    acquires: usize,
    presents: usize,
    double_frees: usize,
    last_handoff: Option<u64>,
    built_extents: Vec<Size>,
    hdr_metadata_applied: usize,
}

impl LedgerState {
    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Shared record of what a [`HeadlessPresenter`] has done. Clones observe
/// the same presenter.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    inner: Arc<Mutex<LedgerState>>,
}

impl ResourceLedger {
    pub fn live_swapchains(&self) -> usize {
        lock(&self.inner).live_swapchains.len()
    }

    pub fn live_views(&self) -> usize {
        lock(&self.inner).live_views.len()
    }

    pub fn swapchains_created(&self) -> usize {
        lock(&self.inner).swapchains_created
    }

    pub fn views_created(&self) -> usize {
        lock(&self.inner).views_created
    }

    pub fn wait_idle_calls(&self) -> usize {
        lock(&self.inner).wait_idle_calls
    }

    /// Successful acquires.
    pub fn acquires(&self) -> usize {
        lock(&self.inner).acquires
    }

    /// Successful presents.
    pub fn presents(&self) -> usize {
        lock(&self.inner).presents
    }

    /// Destroy calls on handles that were not live.
    pub fn double_frees(&self) -> usize {
        lock(&self.inner).double_frees
    }

    /// The `old` hint passed to the most recent swapchain creation.
    pub fn last_handoff(&self) -> Option<u64> {
        lock(&self.inner).last_handoff
    }

    /// Extent of every swapchain built, oldest first.
    pub fn built_extents(&self) -> Vec<Size> {
        lock(&self.inner).built_extents.clone()
    }

    pub fn hdr_metadata_applied(&self) -> usize {
        lock(&self.inner).hdr_metadata_applied
    }
}

#[derive(Debug, Default)]
struct Script {
    acquire: VecDeque<AcquireError>,
    present: VecDeque<AcquireError>,
    swapchain_failures: usize,
}

/// Queued failures a [`HeadlessPresenter`] returns before behaving normally
/// again.
#[derive(Debug, Clone, Default)]
pub struct FailureScript {
    inner: Arc<Mutex<Script>>,
}

impl FailureScript {
    /// Fail the next acquire with `err`.
    pub fn push(&self, err: AcquireError) {
        lock(&self.inner).acquire.push_back(err);
    }

    /// Fail the next present with `err`.
    pub fn push_present(&self, err: AcquireError) {
        lock(&self.inner).present.push_back(err);
    }

    /// Fail the next `count` swapchain creations.
    pub fn fail_swapchain_creation(&self, count: usize) {
        lock(&self.inner).swapchain_failures += count;
    }

    /// `true` once every queued failure has been returned.
    pub fn is_exhausted(&self) -> bool {
        let script = lock(&self.inner);
        script.acquire.is_empty() && script.present.is_empty() && script.swapchain_failures == 0
    }
}

/// A [`PresentBackend`] with no GPU behind it.
#[derive(Debug)]
pub struct HeadlessPresenter {
    extents: Arc<Mutex<SurfaceExtents>>,
    formats: Vec<SurfaceFormat>,
    min_image_count: u32,
    frame_interval: Duration,
    ledger: ResourceLedger,
    script: FailureScript,
    next_image: u32,
    image_counts: Vec<(u64, u32)>,
}

impl HeadlessPresenter {
    pub fn new(extents: SurfaceExtents) -> Self {
        Self {
            extents: Arc::new(Mutex::new(extents)),
            formats: vec![
                SurfaceFormat::SDR_FALLBACK,
                SurfaceFormat {
                    format: PixelFormat::Bgra8Srgb,
                    color_space: ColorSpace::SrgbNonLinear,
                },
            ],
            min_image_count: 2,
            frame_interval: Duration::ZERO,
            ledger: ResourceLedger::default(),
            script: FailureScript::default(),
            next_image: 0,
            image_counts: Vec::new(),
        }
    }

    /// Report `formats` as the surface's presentable formats.
    pub fn with_formats(mut self, formats: Vec<SurfaceFormat>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_min_image_count(mut self, count: u32) -> Self {
        self.min_image_count = count.max(1);
        self
    }

    /// Make each acquire take `interval`, like a vsync-paced present queue.
    /// An interval longer than the acquire timeout yields
    /// [`AcquireError::Timeout`].
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn ledger(&self) -> ResourceLedger {
        self.ledger.clone()
    }

    pub fn failure_script(&self) -> FailureScript {
        self.script.clone()
    }

    /// Handle for changing the reported surface extents after the presenter
    /// has been moved into a swapchain.
    pub fn extents_handle(&self) -> Arc<Mutex<SurfaceExtents>> {
        Arc::clone(&self.extents)
    }

    fn image_count(&self, swapchain: u64) -> Option<u32> {
        self.image_counts
            .iter()
            .find(|(handle, _)| *handle == swapchain)
            .map(|(_, count)| *count)
    }
}

impl PresentBackend for HeadlessPresenter {
    fn surface_extents(&mut self) -> Result<SurfaceExtents> {
        Ok(*lock(&self.extents))
    }

    fn surface_formats(&mut self) -> Result<Vec<SurfaceFormat>> {
        Ok(self.formats.clone())
    }

    fn create_swapchain(
        &mut self,
        extent: Size,
        _format: SurfaceFormat,
        old: Option<u64>,
    ) -> Result<RawSwapchain> {
        {
            let mut script = lock(&self.script.inner);
            if script.swapchain_failures > 0 {
                script.swapchain_failures -= 1;
                return Err(BridgeError::presentation("scripted swapchain failure"));
            }
        }
        let extents = *lock(&self.extents);
        if extent.is_empty() || !extents.contains(extent) {
            return Err(BridgeError::presentation(format!(
                "extent {extent} outside surface limits"
            )));
        }

        let count = desired_image_count(self.min_image_count, 0);
        let mut ledger = lock(&self.ledger.inner);
        if let Some(old) = old {
            if !ledger.live_swapchains.contains(&old) {
                return Err(BridgeError::presentation("hand-off of a dead swapchain"));
            }
        }
        let handle = ledger.allocate();
        let images = (0..count).map(|_| ledger.allocate()).collect();
        ledger.live_swapchains.insert(handle);
        ledger.swapchains_created += 1;
        ledger.last_handoff = old;
        ledger.built_extents.push(extent);
        drop(ledger);

        self.image_counts.push((handle, count));
        self.next_image = 0;
        trace!(handle, %extent, "headless swapchain created");
        Ok(RawSwapchain {
            handle,
            images,
            extent,
        })
    }

    fn create_image_view(&mut self, _image: u64, _format: SurfaceFormat) -> Result<u64> {
        let mut ledger = lock(&self.ledger.inner);
        let view = ledger.allocate();
        ledger.live_views.insert(view);
        ledger.views_created += 1;
        Ok(view)
    }

    fn destroy_image_view(&mut self, view: u64) {
        let mut ledger = lock(&self.ledger.inner);
        if !ledger.live_views.remove(&view) {
            ledger.double_frees += 1;
        }
    }

    fn destroy_swapchain(&mut self, swapchain: u64) {
        let mut ledger = lock(&self.ledger.inner);
        if !ledger.live_swapchains.remove(&swapchain) {
            ledger.double_frees += 1;
        }
        self.image_counts.retain(|(handle, _)| *handle != swapchain);
    }

    fn wait_idle(&mut self) -> Result<()> {
        lock(&self.ledger.inner).wait_idle_calls += 1;
        Ok(())
    }

    fn acquire_next_image(
        &mut self,
        swapchain: u64,
        timeout: Duration,
    ) -> std::result::Result<AcquiredImage, AcquireError> {
        if let Some(err) = lock(&self.script.inner).acquire.pop_front() {
            return Err(err);
        }
        if !self.frame_interval.is_zero() {
            if self.frame_interval > timeout {
                std::thread::sleep(timeout);
                return Err(AcquireError::Timeout);
            }
            std::thread::sleep(self.frame_interval);
        }
        let count = self.image_count(swapchain).ok_or(AcquireError::SurfaceLost)?;
        let index = self.next_image % count;
        self.next_image = self.next_image.wrapping_add(1);
        lock(&self.ledger.inner).acquires += 1;
        Ok(AcquiredImage {
            index,
            suboptimal: false,
        })
    }

    fn present(&mut self, swapchain: u64, image_index: u32) -> std::result::Result<bool, AcquireError> {
        if let Some(err) = lock(&self.script.inner).present.pop_front() {
            return Err(err);
        }
        let count = self.image_count(swapchain).ok_or(AcquireError::OutOfDate)?;
        if image_index >= count {
            return Err(AcquireError::Device(format!("image index {image_index} out of range")));
        }
        lock(&self.ledger.inner).presents += 1;
        Ok(false)
    }

    fn apply_hdr_metadata(&mut self, _swapchain: u64) {
        lock(&self.ledger.inner).hdr_metadata_applied += 1;
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// One request received by a [`HeadlessDisplay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayOp {
    CreateSurface(u32),
    CreateSubsurface { child: u32, parent: u32 },
    SetPosition(Offset),
    Place(StackingRelation, u32),
    SetSyncMode(SyncMode),
    Commit(u32),
    Roundtrip,
    DestroySubsurface(u32),
    DestroySurface(u32),
}

#[derive(Debug, Default)]
struct DisplayState {
    ops: Vec<DisplayOp>,
    live_surfaces: HashSet<u32>,
    live_subsurfaces: HashSet<u32>,
}

/// Shared view of a [`HeadlessDisplay`]'s request log.
#[derive(Debug, Clone, Default)]
pub struct DisplayLog {
    inner: Arc<Mutex<DisplayState>>,
}

impl DisplayLog {
    pub fn ops(&self) -> Vec<DisplayOp> {
        lock(&self.inner).ops.clone()
    }

    /// Surfaces created through the display and not yet destroyed. The host
    /// surface is not counted.
    pub fn live_surfaces(&self) -> usize {
        lock(&self.inner).live_surfaces.len()
    }

    pub fn live_subsurfaces(&self) -> usize {
        lock(&self.inner).live_subsurfaces.len()
    }

    fn record(&self, op: DisplayOp) {
        lock(&self.inner).ops.push(op);
    }
}

const HOST_SURFACE: u32 = 1;

/// A [`DisplayServer`] that only records requests.
#[derive(Debug)]
pub struct HeadlessDisplay {
    log: DisplayLog,
    next_id: u32,
    refuse_subsurfaces: bool,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self {
            log: DisplayLog::default(),
            next_id: HOST_SURFACE,
            refuse_subsurfaces: false,
        }
    }

    /// Fail every subsurface creation, like a compositor without
    /// `wl_subcompositor`.
    pub fn refuse_subsurfaces(mut self) -> Self {
        self.refuse_subsurfaces = true;
        self
    }

    /// The pre-existing surface the host draws into.
    pub fn host_surface(&self) -> u32 {
        HOST_SURFACE
    }

    pub fn log(&self) -> DisplayLog {
        self.log.clone()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl Default for HeadlessDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayServer for HeadlessDisplay {
    type Surface = u32;
    type Subsurface = u32;

    fn create_surface(&mut self) -> Result<u32> {
        let id = self.allocate();
        lock(&self.log.inner).live_surfaces.insert(id);
        self.log.record(DisplayOp::CreateSurface(id));
        Ok(id)
    }

    fn create_subsurface(&mut self, child: &u32, parent: &u32) -> Result<u32> {
        if self.refuse_subsurfaces {
            return Err(BridgeError::surface("subsurfaces unsupported"));
        }
        let id = self.allocate();
        lock(&self.log.inner).live_subsurfaces.insert(id);
        self.log.record(DisplayOp::CreateSubsurface {
            child: *child,
            parent: *parent,
        });
        Ok(id)
    }

    fn set_position(&mut self, _subsurface: &u32, offset: Offset) {
        self.log.record(DisplayOp::SetPosition(offset));
    }

    fn place(&mut self, _subsurface: &u32, relation: StackingRelation, sibling: &u32) {
        self.log.record(DisplayOp::Place(relation, *sibling));
    }

    fn set_sync_mode(&mut self, _subsurface: &u32, mode: SyncMode) {
        self.log.record(DisplayOp::SetSyncMode(mode));
    }

    fn commit(&mut self, surface: &u32) {
        self.log.record(DisplayOp::Commit(*surface));
    }

    fn roundtrip(&mut self) -> Result<()> {
        self.log.record(DisplayOp::Roundtrip);
        Ok(())
    }

    fn destroy_subsurface(&mut self, subsurface: u32) {
        lock(&self.log.inner).live_subsurfaces.remove(&subsurface);
        self.log.record(DisplayOp::DestroySubsurface(subsurface));
    }

    fn destroy_surface(&mut self, surface: u32) {
        lock(&self.log.inner).live_surfaces.remove(&surface);
        self.log.record(DisplayOp::DestroySurface(surface));
    }
}
