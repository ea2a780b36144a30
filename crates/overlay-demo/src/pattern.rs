//! A stand-in guest that "plays" a media source as a test pattern.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use overlay_bridge::{GuestContext, GuestEvent, GuestRenderer, HostContextDescriptor, UpdateCallback};
use overlay_core::{RenderTarget, Result};
use tracing::{debug, info};

/// Counts frames and reports end of stream after `frames` of them, like a
/// media engine reaching the end of a clip.
pub struct TestPattern {
    source: String,
    frames: Option<u64>,
    rendered: Arc<AtomicU64>,
    ended: bool,
}

impl TestPattern {
    pub fn new(source: impl Into<String>, frames: Option<u64>) -> Self {
        Self {
            source: source.into(),
            frames,
            rendered: Arc::new(AtomicU64::new(0)),
            ended: false,
        }
    }

    pub fn rendered(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.rendered)
    }
}

impl GuestRenderer for TestPattern {
    type Context = PatternContext;

    fn create_context(&mut self, host: &HostContextDescriptor) -> Result<PatternContext> {
        info!(source = %self.source, api = ?host.api(), "loading media source");
        Ok(PatternContext {
            rendered: Arc::clone(&self.rendered),
            on_update: None,
        })
    }

    fn poll_event(&mut self) -> Option<GuestEvent> {
        let limit = self.frames?;
        if !self.ended && self.rendered.load(Ordering::Relaxed) >= limit {
            self.ended = true;
            return Some(GuestEvent::EndOfStream);
        }
        None
    }
}

pub struct PatternContext {
    rendered: Arc<AtomicU64>,
    on_update: Option<UpdateCallback>,
}

impl GuestContext for PatternContext {
    fn set_update_callback(&mut self, callback: Option<UpdateCallback>) {
        self.on_update = callback;
    }

    fn render(&mut self, target: &RenderTarget, _flip_y: bool) -> Result<()> {
        let frame = self.rendered.fetch_add(1, Ordering::Relaxed) + 1;
        if frame % 60 == 0 {
            debug!(frame, size = %target.size(), "pattern frame");
        }
        Ok(())
    }

    fn report_presented(&mut self) {
        // the next pattern frame is ready as soon as this one is on screen
        if let Some(on_update) = &self.on_update {
            on_update();
        }
    }

    fn free(self) {
        debug!(frames = self.rendered.load(Ordering::Relaxed), "pattern released");
    }
}
