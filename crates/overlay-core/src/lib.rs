//! Shared data model for embedding a guest renderer in a host compositor.
//!
//! Everything here is API-neutral: sizes, render targets, the single-slot
//! resize mailbox, the error taxonomy, configuration and logging setup. The
//! GPU-specific pieces live in `overlay-gl`, `overlay-interop` and
//! `overlay-bridge`.

pub mod config;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod resize;
pub mod surface;
pub mod target;

pub use config::{BridgeConfig, FormatPreference};
pub use error::{BridgeError, Result};
pub use geometry::{Offset, Size, SurfaceExtents};
pub use resize::PendingResize;
pub use surface::{StackingRelation, SyncMode};
pub use target::{ColorSpace, ImageLayout, PixelFormat, RenderTarget, VulkanHandles};
