//! Presentation-side plumbing: swapchains that survive resizes, and child
//! surfaces stacked under a host window.
//!
//! This crate defines the [`PresentBackend`] trait, the narrow set of GPU
//! presentation calls the resize reconciler needs, and the
//! [`DisplayServer`] trait for surface stacking. Real implementations are
//! behind cargo features (`vulkan` via `ash`, `wayland` via
//! `wayland-client`); [`headless`] implements both without a GPU or a
//! compositor.

pub mod format;
pub mod headless;
pub mod presenter;
pub mod stacking;
pub mod swapchain;

pub use format::{choose_surface_format, desired_image_count, HdrMetadata, SurfaceFormat};
pub use presenter::{AcquireError, AcquiredImage, PresentBackend, RawSwapchain, RecoveryAction};
pub use stacking::{DisplayServer, StackingConfig, SurfaceStack};
pub use swapchain::{AcquiredFrame, Swapchain, SwapchainState};

// Platform-specific implementations.

#[cfg(feature = "vulkan")]
pub mod vulkan;

#[cfg(feature = "wayland")]
pub mod wayland;
