//! Attaching the guest to named stages of a host's frame pipeline.
//!
//! The host calls [`PipelineHooks::on_stage`] from each of its pipeline
//! callbacks. The hooks create the guest context lazily on the first
//! callback that has a valid GPU context, draw at the configured stage,
//! report presents after the host swaps, and drop the guest context before
//! returning from [`PipelineHooks::invalidate`].

use std::sync::Arc;

use overlay_core::{RenderTarget, Result, Size};
use tracing::{debug, warn};

use crate::context::GuestRenderContext;
use crate::guest::{GuestRenderer, HostContextDescriptor};
use crate::signal::FrameSignal;

/// Named points in a host's per-frame pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Host state is synchronized with the UI; the UI thread is blocked.
    Synchronize,
    /// Before the host records any rendering for the frame.
    BeforeRendering,
    /// Inside the host's main render pass, after its own pass setup.
    RenderPassRecording,
    /// The frame has been handed to the window system.
    AfterPresent,
}

/// Where and how the guest is attached to a host pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookPlan {
    /// Stage on which the guest context may be created.
    pub create_at: PipelineStage,
    /// Stage on which the guest draws.
    pub render_at: PipelineStage,
    /// Wrap the draw in begin/end external commands.
    pub bracket_external_commands: bool,
    /// Override the API default for vertical flipping.
    pub flip_y: Option<bool>,
}

impl HookPlan {
    /// Create and draw before the host renders, no bracketing. For scene
    /// graphs that draw straight into a GL window.
    pub fn single_stage() -> Self {
        Self {
            create_at: PipelineStage::BeforeRendering,
            render_at: PipelineStage::BeforeRendering,
            bracket_external_commands: false,
            flip_y: None,
        }
    }

    /// Create before the host renders, draw while it records its render
    /// pass, bracketed. For hosts that record into command buffers.
    pub fn split_stage() -> Self {
        Self {
            create_at: PipelineStage::BeforeRendering,
            render_at: PipelineStage::RenderPassRecording,
            bracket_external_commands: true,
            flip_y: None,
        }
    }

    pub fn with_flip_y(mut self, flip_y: bool) -> Self {
        self.flip_y = Some(flip_y);
        self
    }
}

impl Default for HookPlan {
    fn default() -> Self {
        Self::single_stage()
    }
}

/// What the bridge needs from a host compositor inside pipeline callbacks.
pub trait HostPipeline {
    /// Restores the host's drawing state when dropped.
    type StateGuard;

    /// The host's current GPU context, or `None` if none is valid right now.
    fn gpu_context(&mut self) -> Option<HostContextDescriptor>;

    /// Window size in logical pixels.
    fn window_size(&self) -> Size;

    fn device_pixel_ratio(&self) -> f64 {
        1.0
    }

    /// The drawable for this pass, `size` pixels large.
    fn render_target(&mut self, size: Size) -> Option<RenderTarget>;

    /// Save the host's drawing state and hand the GPU to the guest.
    fn save_state(&mut self) -> Self::StateGuard;

    fn begin_external_commands(&mut self) {}

    fn end_external_commands(&mut self) {}

    /// Keep the GPU context and scene alive across hides and stop clearing
    /// before rendering, so the guest's frame stays as the background.
    /// Called once, after the first guest context is created.
    fn prepare_underlay(&mut self) {}

    /// The host GPU context was torn down. Anything derived from it (handles,
    /// loaded entry points) must be obtained again from the next context.
    fn on_invalidated(&mut self) {}
}

/// A guest renderer attached to a host pipeline.
pub struct PipelineHooks<R: GuestRenderer> {
    renderer: R,
    plan: HookPlan,
    signal: Arc<FrameSignal>,
    context: Option<GuestRenderContext<R::Context>>,
    attached: bool,
    target_size: Option<Size>,
    underlay_prepared: bool,
    contexts_created: u64,
}

impl<R: GuestRenderer> PipelineHooks<R> {
    /// Attach without creating anything; the guest context is created on
    /// the first suitable pipeline callback.
    pub fn attach(renderer: R, plan: HookPlan, signal: Arc<FrameSignal>) -> Self {
        debug!(?plan, "guest attached to host pipeline");
        Self {
            renderer,
            plan,
            signal,
            context: None,
            attached: true,
            target_size: None,
            underlay_prepared: false,
            contexts_created: 0,
        }
    }

    pub fn plan(&self) -> HookPlan {
        self.plan
    }

    pub fn signal(&self) -> &Arc<FrameSignal> {
        &self.signal
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    /// Guest contexts created over the lifetime of the hooks.
    pub fn contexts_created(&self) -> u64 {
        self.contexts_created
    }

    /// Target size as of the last synchronize stage.
    pub fn target_size(&self) -> Option<Size> {
        self.target_size
    }

    /// Dispatch one host pipeline callback.
    ///
    /// Context creation failure is returned as
    /// [`BridgeError::ContextCreation`](overlay_core::BridgeError) and is
    /// meant to abort startup; render failures are returned for the host to
    /// log.
    pub fn on_stage<H: HostPipeline>(&mut self, stage: PipelineStage, host: &mut H) -> Result<()> {
        if !self.attached {
            return Ok(());
        }
        if stage == PipelineStage::Synchronize {
            self.target_size = Some(host.window_size().scaled(host.device_pixel_ratio()));
        }
        if stage == self.plan.create_at && self.context.is_none() {
            self.create_context(host)?;
        }
        if stage == self.plan.render_at {
            self.render(host)?;
        }
        if stage == PipelineStage::AfterPresent {
            if let Some(context) = self.context.as_mut() {
                context.notify_presented();
            }
        }
        Ok(())
    }

    fn create_context<H: HostPipeline>(&mut self, host: &mut H) -> Result<()> {
        let Some(descriptor) = host.gpu_context() else {
            debug!("no host GPU context yet, deferring guest creation");
            return Ok(());
        };
        let context =
            GuestRenderContext::create(&mut self.renderer, &descriptor, self.signal.callback())?;
        self.signal.bind_render_thread();
        self.context = Some(context);
        self.contexts_created += 1;

        if !self.underlay_prepared {
            host.prepare_underlay();
            self.underlay_prepared = true;
        }
        Ok(())
    }

    fn render<H: HostPipeline>(&mut self, host: &mut H) -> Result<()> {
        let Some(context) = self.context.as_mut() else {
            return Ok(());
        };
        self.signal.take_pending();

        let size = match self.target_size {
            Some(size) => size,
            None => host.window_size().scaled(host.device_pixel_ratio()),
        };
        if size.is_empty() {
            return Ok(());
        }
        let Some(target) = host.render_target(size) else {
            warn!("host has no render target for this pass");
            return Ok(());
        };
        let flip_y = self
            .plan
            .flip_y
            .unwrap_or_else(|| context.api().flips_vertically());

        if self.plan.bracket_external_commands {
            host.begin_external_commands();
        }
        let result = {
            let _state = host.save_state();
            context.render(&target, flip_y)
        };
        if self.plan.bracket_external_commands {
            host.end_external_commands();
        }
        result
    }

    /// The host's GPU context is going away. The guest context is destroyed
    /// and `host` is told to drop what it derived from the old context before
    /// this returns; the next callback creates a fresh one.
    pub fn invalidate<H: HostPipeline>(&mut self, host: &mut H) {
        if self.release_context() {
            debug!("guest context released on host invalidation");
        }
        host.on_invalidated();
    }

    /// Stop reacting to pipeline callbacks and release the guest context.
    /// The host context stays valid.
    pub fn detach(&mut self) {
        self.release_context();
        self.attached = false;
    }

    fn release_context(&mut self) -> bool {
        match self.context.take() {
            Some(mut context) => {
                context.destroy();
                true
            }
            None => false,
        }
    }
}
