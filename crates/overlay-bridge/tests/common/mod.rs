#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use overlay_bridge::{GuestContext, GuestEvent, GuestRenderer, HostContextDescriptor, UpdateCallback};
use overlay_bridge::{BridgeError, HostPipeline, Result};
use overlay_core::{RenderTarget, Size, VulkanHandles};

#[derive(Default)]
struct RecorderState {
    created: usize,
    freed: usize,
    freed_with_callback: usize,
    renders: Vec<(Size, bool)>,
    presents: usize,
    events: VecDeque<GuestEvent>,
    callback: Option<UpdateCallback>,
    trail: Vec<&'static str>,
    fail_creation: bool,
}

/// Shared view of everything a [`CountingGuest`] and a [`FakeHost`] did.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<RecorderState>>);

impl Recorder {
    fn state(&self) -> MutexGuard<'_, RecorderState> {
        self.0.lock().unwrap()
    }

    pub fn created(&self) -> usize {
        self.state().created
    }

    pub fn freed(&self) -> usize {
        self.state().freed
    }

    /// Contexts freed while their update callback was still registered.
    pub fn freed_with_callback(&self) -> usize {
        self.state().freed_with_callback
    }

    pub fn renders(&self) -> Vec<(Size, bool)> {
        self.state().renders.clone()
    }

    pub fn render_count(&self) -> usize {
        self.state().renders.len()
    }

    pub fn last_render(&self) -> Option<(Size, bool)> {
        self.state().renders.last().copied()
    }

    pub fn presents(&self) -> usize {
        self.state().presents
    }

    pub fn trail(&self) -> Vec<&'static str> {
        self.state().trail.clone()
    }

    pub fn clear_trail(&self) {
        self.state().trail.clear();
    }

    pub fn note(&self, entry: &'static str) {
        self.state().trail.push(entry);
    }

    pub fn push_event(&self, event: GuestEvent) {
        self.state().events.push_back(event);
    }

    pub fn fail_creation(&self) {
        self.state().fail_creation = true;
    }

    /// Invoke the registered update callback the way a guest thread would.
    /// Returns `false` if none is registered.
    pub fn fire_update(&self) -> bool {
        let callback = self.state().callback.clone();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

/// A guest that draws nothing and counts everything.
pub struct CountingGuest {
    recorder: Recorder,
}

impl CountingGuest {
    pub fn with_recorder() -> (Self, Recorder) {
        let recorder = Recorder::default();
        (
            Self {
                recorder: recorder.clone(),
            },
            recorder,
        )
    }
}

pub struct CountingContext {
    recorder: Recorder,
}

impl GuestRenderer for CountingGuest {
    type Context = CountingContext;

    fn create_context(&mut self, _host: &HostContextDescriptor) -> Result<CountingContext> {
        let mut state = self.recorder.state();
        if state.fail_creation {
            return Err(BridgeError::context_creation("unsupported host backend"));
        }
        state.created += 1;
        drop(state);
        Ok(CountingContext {
            recorder: self.recorder.clone(),
        })
    }

    fn poll_event(&mut self) -> Option<GuestEvent> {
        self.recorder.state().events.pop_front()
    }
}

impl GuestContext for CountingContext {
    fn set_update_callback(&mut self, callback: Option<UpdateCallback>) {
        self.recorder.state().callback = callback;
    }

    fn render(&mut self, target: &RenderTarget, flip_y: bool) -> Result<()> {
        let mut state = self.recorder.state();
        state.renders.push((target.size(), flip_y));
        state.trail.push("render");
        Ok(())
    }

    fn report_presented(&mut self) {
        self.recorder.state().presents += 1;
    }

    fn free(self) {
        let mut state = self.recorder.state();
        if state.callback.is_some() {
            state.freed_with_callback += 1;
        }
        state.freed += 1;
    }
}

/// Restores host state on drop, noting it in the recorder trail.
pub struct RestoreOnDrop(Recorder);

impl Drop for RestoreOnDrop {
    fn drop(&mut self) {
        self.0.note("restore");
    }
}

/// A host pipeline with a toggleable GPU context.
pub struct FakeHost {
    pub recorder: Recorder,
    pub context_valid: bool,
    pub window: Size,
    pub dpr: f64,
    pub underlay_prepared: usize,
    pub invalidations: usize,
}

impl FakeHost {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            context_valid: true,
            window: Size::new(640, 360),
            dpr: 1.0,
            underlay_prepared: 0,
            invalidations: 0,
        }
    }
}

impl HostPipeline for FakeHost {
    type StateGuard = RestoreOnDrop;

    fn gpu_context(&mut self) -> Option<HostContextDescriptor> {
        self.context_valid.then(vulkan_host)
    }

    fn window_size(&self) -> Size {
        self.window
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.dpr
    }

    fn render_target(&mut self, size: Size) -> Option<RenderTarget> {
        Some(RenderTarget::swapchain_image(7, 8, size, overlay_core::PixelFormat::Bgra8Unorm))
    }

    fn save_state(&mut self) -> RestoreOnDrop {
        self.recorder.note("save");
        RestoreOnDrop(self.recorder.clone())
    }

    fn begin_external_commands(&mut self) {
        self.recorder.note("begin");
    }

    fn end_external_commands(&mut self) {
        self.recorder.note("end");
    }

    fn prepare_underlay(&mut self) {
        self.underlay_prepared += 1;
    }

    fn on_invalidated(&mut self) {
        self.invalidations += 1;
    }
}

/// A Vulkan descriptor with placeholder handles; fakes never dereference it.
pub fn vulkan_host() -> HostContextDescriptor {
    HostContextDescriptor::Vulkan(VulkanHandles {
        instance: 1,
        physical_device: 2,
        device: 3,
        queue: 4,
        queue_family: 0,
        get_instance_proc_addr: 0,
        features: 0,
        device_extensions: vec!["VK_KHR_swapchain".into()],
    })
}

/// Poll `condition` every millisecond until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
