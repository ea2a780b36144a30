//! Render targets handed to the guest renderer.
//!
//! A [`RenderTarget`] is an opaque GPU-backed drawable. On OpenGL hosts it is
//! the framebuffer object the host has bound for the current pass; on Vulkan
//! it is one acquired swapchain image with its view. Whoever currently holds
//! presentation responsibility owns the target; the bridge never keeps a copy
//! past the call it was passed to.

use crate::geometry::Size;

/// Pixel formats the bridge knows how to describe to a guest.
///
/// Raw API values that have no named variant are carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    Bgra8Unorm,
    Bgra8Srgb,
    A2Bgr10Unorm,
    Rgba16Float,
    /// An API-specific format code without a named variant.
    Raw(i32),
}

/// Color space a presentable image is interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    SrgbNonLinear,
    /// HDR10: BT.2020 primaries with the ST.2084 (PQ) transfer function.
    Hdr10St2084,
    Raw(i32),
}

/// Layout/state of an image as seen by the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    ColorAttachment,
    PresentSrc,
}

/// A GPU-backed drawable the guest renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// An OpenGL framebuffer object (0 is the default framebuffer).
    Framebuffer { fbo: u32, size: Size },
    /// A Vulkan image with a view. Handles are raw `u64` values.
    Image {
        image: u64,
        view: u64,
        size: Size,
        format: PixelFormat,
        current_layout: ImageLayout,
        target_layout: ImageLayout,
    },
}

impl RenderTarget {
    /// A swapchain image in the state a fresh acquire leaves it in: contents
    /// undefined, to be left ready for presentation.
    pub fn swapchain_image(image: u64, view: u64, size: Size, format: PixelFormat) -> Self {
        RenderTarget::Image {
            image,
            view,
            size,
            format,
            current_layout: ImageLayout::Undefined,
            target_layout: ImageLayout::PresentSrc,
        }
    }

    pub fn size(&self) -> Size {
        match self {
            RenderTarget::Framebuffer { size, .. } | RenderTarget::Image { size, .. } => *size,
        }
    }

    pub fn width(&self) -> u32 {
        self.size().width
    }

    pub fn height(&self) -> u32 {
        self.size().height
    }

    /// Pixel format, when the target carries one. GL framebuffers do not.
    pub fn format(&self) -> Option<PixelFormat> {
        match self {
            RenderTarget::Framebuffer { .. } => None,
            RenderTarget::Image { format, .. } => Some(*format),
        }
    }
}

/// Vulkan objects a host shares with a guest renderer so both draw with the
/// same device. Dispatchable handles and the loader entry point are raw
/// addresses; they stay valid for as long as the owning device object lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VulkanHandles {
    pub instance: u64,
    pub physical_device: u64,
    pub device: u64,
    pub queue: u64,
    pub queue_family: u32,
    /// Address of `vkGetInstanceProcAddr`.
    pub get_instance_proc_addr: usize,
    /// Address of the `VkPhysicalDeviceFeatures2` chain the device was
    /// created with.
    pub features: usize,
    /// Device extensions that were enabled.
    pub device_extensions: Vec<String>,
}
