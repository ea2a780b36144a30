//! Vulkan presentation through `ash`.
//!
//! [`VulkanDevice`] owns the instance and logical device the host shares
//! with the guest renderer. [`VulkanPresenter`] implements
//! [`PresentBackend`] for one `VkSurfaceKHR` created from a Wayland surface.

use std::ffi::{c_void, CStr, CString};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use ash::vk::{self, Handle};
use overlay_core::{BridgeError, ColorSpace, PixelFormat, Result, Size, SurfaceExtents, VulkanHandles};
use tracing::{debug, info, trace, warn};

use crate::format::{desired_image_count, HdrMetadata, SurfaceFormat};
use crate::presenter::{AcquireError, AcquiredImage, PresentBackend, RawSwapchain};

const REQUIRED_INSTANCE_EXTENSIONS: [&CStr; 2] =
    [ash::khr::surface::NAME, ash::khr::wayland_surface::NAME];

const OPTIONAL_INSTANCE_EXTENSIONS: [&CStr; 3] = [
    ash::ext::swapchain_colorspace::NAME,
    ash::khr::get_physical_device_properties2::NAME,
    ash::khr::external_memory_capabilities::NAME,
];

// Everything a video renderer importing dma-bufs and presenting HDR needs.
// Only the swapchain extension is required.
const OPTIONAL_DEVICE_EXTENSIONS: [&CStr; 11] = [
    ash::khr::timeline_semaphore::NAME,
    ash::ext::hdr_metadata::NAME,
    ash::khr::external_memory::NAME,
    ash::khr::external_memory_fd::NAME,
    ash::ext::external_memory_dma_buf::NAME,
    ash::ext::image_drm_format_modifier::NAME,
    ash::khr::image_format_list::NAME,
    ash::khr::sampler_ycbcr_conversion::NAME,
    ash::khr::bind_memory2::NAME,
    ash::khr::get_memory_requirements2::NAME,
    ash::khr::maintenance1::NAME,
];

// ---------------------------------------------------------------------------
// Format mapping
// ---------------------------------------------------------------------------

fn pixel_format(format: vk::Format) -> PixelFormat {
    match format {
        vk::Format::R8G8B8A8_UNORM => PixelFormat::Rgba8Unorm,
        vk::Format::B8G8R8A8_UNORM => PixelFormat::Bgra8Unorm,
        vk::Format::B8G8R8A8_SRGB => PixelFormat::Bgra8Srgb,
        vk::Format::A2B10G10R10_UNORM_PACK32 => PixelFormat::A2Bgr10Unorm,
        vk::Format::R16G16B16A16_SFLOAT => PixelFormat::Rgba16Float,
        other => PixelFormat::Raw(other.as_raw()),
    }
}

fn vk_format(format: PixelFormat) -> vk::Format {
    match format {
        PixelFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        PixelFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        PixelFormat::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        PixelFormat::A2Bgr10Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        PixelFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        PixelFormat::Raw(raw) => vk::Format::from_raw(raw),
    }
}

fn color_space(space: vk::ColorSpaceKHR) -> ColorSpace {
    match space {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => ColorSpace::SrgbNonLinear,
        vk::ColorSpaceKHR::HDR10_ST2084_EXT => ColorSpace::Hdr10St2084,
        other => ColorSpace::Raw(other.as_raw()),
    }
}

fn vk_color_space(space: ColorSpace) -> vk::ColorSpaceKHR {
    match space {
        ColorSpace::SrgbNonLinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        ColorSpace::Hdr10St2084 => vk::ColorSpaceKHR::HDR10_ST2084_EXT,
        ColorSpace::Raw(raw) => vk::ColorSpaceKHR::from_raw(raw),
    }
}

fn acquire_error(result: vk::Result) -> AcquireError {
    match result {
        vk::Result::TIMEOUT | vk::Result::NOT_READY => AcquireError::Timeout,
        vk::Result::ERROR_OUT_OF_DATE_KHR => AcquireError::OutOfDate,
        vk::Result::ERROR_SURFACE_LOST_KHR => AcquireError::SurfaceLost,
        vk::Result::ERROR_DEVICE_LOST => AcquireError::DeviceLost,
        other => AcquireError::Device(other.to_string()),
    }
}

fn nanos(timeout: Duration) -> u64 {
    timeout.as_nanos().min(u64::MAX as u128) as u64
}

fn extent(size: Size) -> vk::Extent2D {
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

fn size(extent: vk::Extent2D) -> Size {
    Size::new(extent.width, extent.height)
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

struct FeatureChain {
    features2: vk::PhysicalDeviceFeatures2<'static>,
    vk11: vk::PhysicalDeviceVulkan11Features<'static>,
    vk12: vk::PhysicalDeviceVulkan12Features<'static>,
}

// SAFETY: the chain's pointers only reference the same boxed allocation and
// are never written after device creation.
unsafe impl Send for FeatureChain {}
unsafe impl Sync for FeatureChain {}

impl FeatureChain {
    fn new() -> Box<Self> {
        let mut chain = Box::new(Self {
            features2: vk::PhysicalDeviceFeatures2::default(),
            vk11: vk::PhysicalDeviceVulkan11Features::default(),
            vk12: vk::PhysicalDeviceVulkan12Features::default(),
        });
        chain.link();
        chain
    }

    fn link(&mut self) {
        self.vk12.p_next = (&mut self.vk11 as *mut vk::PhysicalDeviceVulkan11Features).cast();
        self.features2.p_next = (&mut self.vk12 as *mut vk::PhysicalDeviceVulkan12Features).cast();
    }
}

fn supported_names(properties: &[vk::ExtensionProperties]) -> Vec<CString> {
    properties
        .iter()
        .filter_map(|p| p.extension_name_as_c_str().ok())
        .map(CStr::to_owned)
        .collect()
}

/// The Vulkan instance, physical device, logical device and graphics queue
/// shared by host presentation and the guest renderer.
pub struct VulkanDevice {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue_family: u32,
    queue: vk::Queue,
    device_extensions: Vec<CString>,
    features: Box<FeatureChain>,
}

impl VulkanDevice {
    /// Load the Vulkan loader and create an instance and device on the first
    /// physical device with a graphics queue.
    pub fn new() -> Result<Self> {
        Ok(Self::create()?)
    }

    fn create() -> anyhow::Result<Self> {
        // SAFETY: loading the system Vulkan loader has no preconditions.
        let entry = unsafe { ash::Entry::load() }.context("loading the Vulkan loader")?;

        let available = supported_names(
            &unsafe { entry.enumerate_instance_extension_properties(None) }
                .context("vkEnumerateInstanceExtensionProperties")?,
        );
        let mut instance_extensions = Vec::new();
        for name in REQUIRED_INSTANCE_EXTENSIONS {
            if !available.iter().any(|a| a.as_c_str() == name) {
                return Err(anyhow!("instance extension {name:?} unavailable"));
            }
            instance_extensions.push(name.as_ptr());
        }
        for name in OPTIONAL_INSTANCE_EXTENSIONS {
            if available.iter().any(|a| a.as_c_str() == name) {
                instance_extensions.push(name.as_ptr());
            }
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"overlay-bridge")
            .api_version(vk::API_VERSION_1_3);
        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&instance_extensions);
        let instance =
            unsafe { entry.create_instance(&instance_info, None) }.context("vkCreateInstance")?;

        match Self::create_device(&instance) {
            Ok((physical_device, device, queue_family, device_extensions, features)) => {
                let queue = unsafe { device.get_device_queue(queue_family, 0) };
                info!(
                    queue_family,
                    extensions = device_extensions.len(),
                    "Vulkan device created"
                );
                Ok(Self {
                    entry,
                    instance,
                    physical_device,
                    device,
                    queue_family,
                    queue,
                    device_extensions,
                    features,
                })
            }
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                Err(err)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn create_device(
        instance: &ash::Instance,
    ) -> anyhow::Result<(vk::PhysicalDevice, ash::Device, u32, Vec<CString>, Box<FeatureChain>)>
    {
        let physical_devices =
            unsafe { instance.enumerate_physical_devices() }.context("vkEnumeratePhysicalDevices")?;

        let (physical_device, queue_family) = physical_devices
            .iter()
            .find_map(|&pd| {
                let families = unsafe { instance.get_physical_device_queue_family_properties(pd) };
                families
                    .iter()
                    .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                    .map(|index| (pd, index as u32))
            })
            .ok_or_else(|| anyhow!("no physical device with a graphics queue"))?;

        let available = supported_names(
            &unsafe { instance.enumerate_device_extension_properties(physical_device) }
                .context("vkEnumerateDeviceExtensionProperties")?,
        );
        if !available
            .iter()
            .any(|a| a.as_c_str() == ash::khr::swapchain::NAME)
        {
            return Err(anyhow!("device extension VK_KHR_swapchain unavailable"));
        }
        let mut enabled = vec![ash::khr::swapchain::NAME.to_owned()];
        enabled.extend(
            OPTIONAL_DEVICE_EXTENSIONS
                .iter()
                .filter(|name| available.iter().any(|a| a.as_c_str() == **name))
                .map(|name| (*name).to_owned()),
        );
        let enabled_ptrs: Vec<_> = enabled.iter().map(|name| name.as_ptr()).collect();

        // Enable only what the device supports out of what the guest wants.
        let mut supported = FeatureChain::new();
        unsafe { instance.get_physical_device_features2(physical_device, &mut supported.features2) };
        let mut features = FeatureChain::new();
        features.vk11.sampler_ycbcr_conversion = supported.vk11.sampler_ycbcr_conversion;
        features.vk12.timeline_semaphore = supported.vk12.timeline_semaphore;
        features.vk12.host_query_reset = supported.vk12.host_query_reset;
        features.link();

        let priorities = [1.0f32];
        let queue_info = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)];
        let mut device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_info)
            .enabled_extension_names(&enabled_ptrs);
        device_info.p_next = (&features.features2 as *const vk::PhysicalDeviceFeatures2).cast();

        let device = unsafe { instance.create_device(physical_device, &device_info, None) }
            .context("vkCreateDevice")?;
        Ok((physical_device, device, queue_family, enabled, features))
    }

    pub fn has_extension(&self, name: &CStr) -> bool {
        self.device_extensions.iter().any(|e| e.as_c_str() == name)
    }

    /// Raw handles for handing the device to a guest renderer.
    pub fn handles(&self) -> VulkanHandles {
        VulkanHandles {
            instance: self.instance.handle().as_raw(),
            physical_device: self.physical_device.as_raw(),
            device: self.device.handle().as_raw(),
            queue: self.queue.as_raw(),
            queue_family: self.queue_family,
            get_instance_proc_addr: self.entry.static_fn().get_instance_proc_addr as usize,
            features: &self.features.features2 as *const vk::PhysicalDeviceFeatures2 as usize,
            device_extensions: self
                .device_extensions
                .iter()
                .map(|e| e.to_string_lossy().into_owned())
                .collect(),
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                warn!("vkDeviceWaitIdle before teardown failed: {err}");
            }
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        debug!("Vulkan device destroyed");
    }
}

// ---------------------------------------------------------------------------
// Presenter
// ---------------------------------------------------------------------------

/// [`PresentBackend`] over a `VkSurfaceKHR`.
///
/// Presents FIFO with opaque alpha; images are usable as color attachments
/// and transfer destinations.
pub struct VulkanPresenter {
    device: Arc<VulkanDevice>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    hdr_loader: Option<ash::ext::hdr_metadata::Device>,
    surface: vk::SurfaceKHR,
    acquire_fence: vk::Fence,
    in_flight: Option<InFlightAcquire>,
    hdr_metadata: HdrMetadata,
}

/// An image the presentation engine handed out whose acquire fence had not
/// signaled within the caller's timeout. The image stays owned by us until it
/// is presented or its swapchain is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlightAcquire {
    swapchain: u64,
    image: AcquiredImage,
}

impl InFlightAcquire {
    /// The held image, if it still belongs to `swapchain`. Images of a
    /// replaced swapchain were released with it.
    fn resume(self, swapchain: u64) -> Option<AcquiredImage> {
        (self.swapchain == swapchain).then_some(self.image)
    }
}

impl VulkanPresenter {
    /// Create a Vulkan surface for a Wayland `wl_surface`.
    ///
    /// # Safety
    /// `display` and `surface` must be live `wl_display` / `wl_surface`
    /// pointers that outlive the returned presenter.
    pub unsafe fn from_wayland(
        device: Arc<VulkanDevice>,
        display: *mut c_void,
        surface: *mut c_void,
    ) -> Result<Self> {
        let wayland = ash::khr::wayland_surface::Instance::new(&device.entry, &device.instance);
        let info = vk::WaylandSurfaceCreateInfoKHR::default()
            .display(display.cast())
            .surface(surface.cast());
        let surface = wayland
            .create_wayland_surface(&info, None)
            .map_err(|err| BridgeError::surface(format!("vkCreateWaylandSurfaceKHR: {err}")))?;
        Self::with_surface(device, surface)
    }

    /// Take ownership of an existing surface created on `device`'s instance.
    pub fn with_surface(device: Arc<VulkanDevice>, surface: vk::SurfaceKHR) -> Result<Self> {
        let surface_loader = ash::khr::surface::Instance::new(&device.entry, &device.instance);
        let supported = unsafe {
            surface_loader.get_physical_device_surface_support(
                device.physical_device,
                device.queue_family,
                surface,
            )
        };
        if !matches!(supported, Ok(true)) {
            unsafe { surface_loader.destroy_surface(surface, None) };
            return Err(BridgeError::surface(
                "graphics queue cannot present to this surface",
            ));
        }

        let fence = match unsafe {
            device
                .device
                .create_fence(&vk::FenceCreateInfo::default(), None)
        } {
            Ok(fence) => fence,
            Err(err) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(BridgeError::backend(format!("vkCreateFence: {err}")));
            }
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(&device.instance, &device.device);
        let hdr_loader = device
            .has_extension(ash::ext::hdr_metadata::NAME)
            .then(|| ash::ext::hdr_metadata::Device::new(&device.instance, &device.device));

        Ok(Self {
            device,
            surface_loader,
            swapchain_loader,
            hdr_loader,
            surface,
            acquire_fence: fence,
            in_flight: None,
            hdr_metadata: HdrMetadata::BT2020_1000_NITS,
        })
    }

    pub fn with_hdr_metadata(mut self, metadata: HdrMetadata) -> Self {
        self.hdr_metadata = metadata;
        self
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    fn capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.device.physical_device, self.surface)
        }
        .map_err(|err| BridgeError::presentation(format!("surface capabilities: {err}")))
    }

    fn wait_acquire_fence(&mut self, timeout: Duration) -> std::result::Result<(), AcquireError> {
        let fences = [self.acquire_fence];
        unsafe {
            self.device
                .device
                .wait_for_fences(&fences, true, nanos(timeout))
                .map_err(acquire_error)?;
            self.device.device.reset_fences(&fences).map_err(acquire_error)?;
        }
        Ok(())
    }
}

impl PresentBackend for VulkanPresenter {
    fn surface_extents(&mut self) -> Result<SurfaceExtents> {
        let caps = self.capabilities()?;
        // 0xFFFFFFFF: the surface size follows the swapchain (Wayland)
        let current = (caps.current_extent.width != u32::MAX).then(|| size(caps.current_extent));
        Ok(SurfaceExtents {
            min: size(caps.min_image_extent),
            max: size(caps.max_image_extent),
            current,
        })
    }

    fn surface_formats(&mut self) -> Result<Vec<SurfaceFormat>> {
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.device.physical_device, self.surface)
        }
        .map_err(|err| BridgeError::backend(format!("surface formats: {err}")))?;
        Ok(formats
            .iter()
            .map(|f| SurfaceFormat {
                format: pixel_format(f.format),
                color_space: color_space(f.color_space),
            })
            .collect())
    }

    fn create_swapchain(
        &mut self,
        size: Size,
        format: SurfaceFormat,
        old: Option<u64>,
    ) -> Result<RawSwapchain> {
        let caps = self.capabilities()?;
        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(desired_image_count(caps.min_image_count, caps.max_image_count))
            .image_format(vk_format(format.format))
            .image_color_space(vk_color_space(format.color_space))
            .image_extent(extent(size))
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(old.map(vk::SwapchainKHR::from_raw).unwrap_or_default());

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&info, None) }
            .map_err(|err| BridgeError::backend(format!("vkCreateSwapchainKHR: {err}")))?;
        let images = match unsafe { self.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(err) => {
                unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(BridgeError::backend(format!("vkGetSwapchainImagesKHR: {err}")));
            }
        };

        Ok(RawSwapchain {
            handle: swapchain.as_raw(),
            images: images.iter().map(|image| image.as_raw()).collect(),
            extent: size,
        })
    }

    fn create_image_view(&mut self, image: u64, format: SurfaceFormat) -> Result<u64> {
        let info = vk::ImageViewCreateInfo::default()
            .image(vk::Image::from_raw(image))
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(vk_format(format.format))
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );
        let view = unsafe { self.device.device.create_image_view(&info, None) }
            .map_err(|err| BridgeError::backend(format!("vkCreateImageView: {err}")))?;
        Ok(view.as_raw())
    }

    fn destroy_image_view(&mut self, view: u64) {
        unsafe {
            self.device
                .device
                .destroy_image_view(vk::ImageView::from_raw(view), None)
        };
    }

    fn destroy_swapchain(&mut self, swapchain: u64) {
        unsafe {
            self.swapchain_loader
                .destroy_swapchain(vk::SwapchainKHR::from_raw(swapchain), None)
        };
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.device.device.device_wait_idle() }
            .map_err(|err| BridgeError::backend(format!("vkDeviceWaitIdle: {err}")))
    }

    fn acquire_next_image(
        &mut self,
        swapchain: u64,
        timeout: Duration,
    ) -> std::result::Result<AcquiredImage, AcquireError> {
        if let Some(in_flight) = self.in_flight {
            self.wait_acquire_fence(timeout)?;
            self.in_flight = None;
            if let Some(image) = in_flight.resume(swapchain) {
                trace!(index = image.index, "resuming acquire after fence timeout");
                return Ok(image);
            }
        }

        let (index, suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                vk::SwapchainKHR::from_raw(swapchain),
                nanos(timeout),
                vk::Semaphore::null(),
                self.acquire_fence,
            )
        }
        .map_err(acquire_error)?;

        let image = AcquiredImage { index, suboptimal };
        self.in_flight = Some(InFlightAcquire { swapchain, image });
        self.wait_acquire_fence(timeout)?;
        self.in_flight = None;
        Ok(image)
    }

    fn present(&mut self, swapchain: u64, image_index: u32) -> std::result::Result<bool, AcquireError> {
        let swapchains = [vk::SwapchainKHR::from_raw(swapchain)];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe { self.swapchain_loader.queue_present(self.device.queue, &info) }
            .map_err(acquire_error)
    }

    fn apply_hdr_metadata(&mut self, swapchain: u64) {
        let Some(loader) = &self.hdr_loader else {
            debug!("VK_EXT_hdr_metadata unavailable, skipping HDR metadata");
            return;
        };
        let m = self.hdr_metadata;
        let xy = |(x, y): (f32, f32)| vk::XYColorEXT { x, y };
        let metadata = [vk::HdrMetadataEXT::default()
            .display_primary_red(xy(m.red))
            .display_primary_green(xy(m.green))
            .display_primary_blue(xy(m.blue))
            .white_point(xy(m.white_point))
            .max_luminance(m.max_luminance)
            .min_luminance(m.min_luminance)
            .max_content_light_level(m.max_content_light_level)
            .max_frame_average_light_level(m.max_frame_average_light_level)];
        unsafe { loader.set_hdr_metadata(&[vk::SwapchainKHR::from_raw(swapchain)], &metadata) };
        debug!("HDR10 metadata applied");
    }
}

impl Drop for VulkanPresenter {
    fn drop(&mut self) {
        unsafe {
            if self.in_flight.is_some() {
                let _ = self.device.device.device_wait_idle();
            }
            self.device.device.destroy_fence(self.acquire_fence, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
