//! Embedding a GPU guest renderer in a host compositor.
//!
//! Two embedding styles are supported:
//!
//! - **In-process**: the guest draws into the host's own frame.
//!   [`PipelineHooks`] attaches to named stages of the host's pipeline
//!   ([`HostPipeline`]), creates the guest context lazily against the host's
//!   GPU context and turns guest "new frame" callbacks into host repaints via
//!   [`FrameSignal`]. [`GlSceneHost`] implements the host side for OpenGL
//!   scene graphs.
//! - **Compositor-level**: the guest presents to its own child surface
//!   stacked under the host's surface. [`SubsurfaceOverlay`] ties the surface
//!   stack, a resize-aware swapchain and a dedicated [`RenderThread`]
//!   together.
//!
//! # Guest lifecycle
//!
//! 1. The host reports a valid GPU context; [`GuestRenderer::create_context`]
//!    builds a [`GuestContext`] against it and the update callback is
//!    registered.
//! 2. Each frame the guest renders into a [`RenderTarget`] and is told when
//!    the frame was presented.
//! 3. On invalidation or shutdown the callback is unregistered, then the
//!    context is freed, exactly once.
//!
//! [`RenderTarget`]: overlay_core::RenderTarget

pub mod compositor;
pub mod context;
pub mod gl_host;
pub mod guest;
pub mod hooks;
pub mod render_thread;
pub mod signal;

pub use compositor::SubsurfaceOverlay;
pub use context::GuestRenderContext;
pub use gl_host::{GlSceneHost, GlWindow};
pub use guest::{GpuApi, GuestContext, GuestEvent, GuestRenderer, HostContextDescriptor, UpdateCallback};
pub use hooks::{HookPlan, HostPipeline, PipelineHooks, PipelineStage};
pub use render_thread::{FrameStats, LoopExit, RenderLoopOutcome, RenderThread};
pub use signal::{FrameSignal, MailboxScheduler, RepaintMailbox, RepaintScheduler, SignalState};

pub use overlay_core::{BridgeConfig, BridgeError, Result};
