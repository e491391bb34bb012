use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::commands::{command_queue::RhiQueue, synchronize::RhiSemaphore};
use crate::foundation::{device::RhiDevice, instance::RhiInstance, physical_device::RhiPhysicalDevice};
use crate::swapchain::surface::RhiSurface;

/// acquire/present 之后 swapchain 的状态
///
/// - `Ok`: 可以继续使用
/// - `Suboptimal`: 本帧仍然有效，但应该尽快重建
/// - `Stale`: 与 surface 不再匹配，本帧作废，必须重建后重试
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RhiSwapchainStatus {
    Ok,
    Suboptimal,
    Stale,
}

pub struct RhiSwapchain {
    handle: vk::SwapchainKHR,
    swapchain_pf: ash::khr::swapchain::Device,

    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,

    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,

    device: Rc<RhiDevice>,
}

impl Drop for RhiSwapchain {
    fn drop(&mut self) {
        unsafe {
            for view in &self.image_views {
                self.device.destroy_image_view(*view, None);
            }
            // swapchain image 由 swapchain 拥有，不能单独 destroy
            self.swapchain_pf.destroy_swapchain(self.handle, None);
        }
    }
}

// getter
impl RhiSwapchain {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }
}

impl RhiSwapchain {
    /// swapchain 的 image 数量由 surface caps 决定，与 frames in flight
    /// 的数量无关
    pub fn new(
        instance: &RhiInstance,
        device: Rc<RhiDevice>,
        pdevice: &RhiPhysicalDevice,
        surface: &RhiSurface,
        window_extent: vk::Extent2D,
    ) -> Self {
        let surface_pf = surface.surface_pf();
        let caps = unsafe {
            surface_pf.get_physical_device_surface_capabilities(pdevice.handle, surface.handle()).unwrap()
        };

        let format = Self::choose_surface_format(pdevice, surface);
        let present_mode = Self::choose_present_mode(pdevice, surface);

        // 比最小值多一张，减少 acquire 阻塞的机会
        let mut image_count = caps.min_image_count + 1;
        if caps.max_image_count != 0 {
            image_count = image_count.min(caps.max_image_count);
        }

        // current_extent 为 u32::MAX 表示由 swapchain 自己决定尺寸
        let extent = if caps.current_extent.width != u32::MAX {
            caps.current_extent
        } else {
            vk::Extent2D {
                width: window_extent.width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: window_extent.height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain_pf = ash::khr::swapchain::Device::new(instance.handle(), &device.handle);
        let handle = unsafe { swapchain_pf.create_swapchain(&create_info, None).unwrap() };

        let images = unsafe { swapchain_pf.get_swapchain_images(handle).unwrap() };
        let image_views = images
            .iter()
            .enumerate()
            .map(|(idx, image)| {
                device.debug_utils().set_object_debug_name(*image, &format!("swapchain-image-{}", idx));
                let view_ci = vk::ImageViewCreateInfo::default()
                    .image(*image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .level_count(1)
                            .layer_count(1),
                    );
                let view = unsafe { device.create_image_view(&view_ci, None).unwrap() };
                device.debug_utils().set_object_debug_name(view, &format!("swapchain-image-view-{}", idx));
                view
            })
            .collect_vec();

        log::info!(
            "swapchain created: {}x{}, {} images, format {:?}, present mode {:?}",
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode
        );

        Self {
            handle,
            swapchain_pf,
            images,
            image_views,
            format,
            extent,
            present_mode,
            device,
        }
    }

    fn choose_surface_format(pdevice: &RhiPhysicalDevice, surface: &RhiSurface) -> vk::SurfaceFormatKHR {
        let formats = unsafe {
            surface.surface_pf().get_physical_device_surface_formats(pdevice.handle, surface.handle()).unwrap()
        };
        formats
            .iter()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .copied()
            .unwrap_or(formats[0])
    }

    fn choose_present_mode(pdevice: &RhiPhysicalDevice, surface: &RhiSurface) -> vk::PresentModeKHR {
        let modes = unsafe {
            surface
                .surface_pf()
                .get_physical_device_surface_present_modes(pdevice.handle, surface.handle())
                .unwrap()
        };
        // FIFO 是 spec 保证一定存在的模式
        modes
            .iter()
            .find(|m| **m == vk::PresentModeKHR::MAILBOX)
            .copied()
            .unwrap_or(vk::PresentModeKHR::FIFO)
    }

    /// 获取下一个可用的 swapchain image
    ///
    /// 返回 `(image_index, status)`；状态为 `Stale` 时本帧作废，
    /// 调用方需要重建 swapchain 后重试
    pub fn acquire_next_image(&self, signal_semaphore: &RhiSemaphore) -> (Option<u32>, RhiSwapchainStatus) {
        let result = unsafe {
            self.swapchain_pf.acquire_next_image(
                self.handle,
                u64::MAX,
                signal_semaphore.handle(),
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, false)) => (Some(index), RhiSwapchainStatus::Ok),
            Ok((index, true)) => (Some(index), RhiSwapchainStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => (None, RhiSwapchainStatus::Stale),
            Err(e) => panic!("failed to acquire swapchain image: {:?}", e),
        }
    }

    /// 将渲染完成的 image 提交显示
    pub fn present(
        &self,
        queue: &RhiQueue,
        image_index: u32,
        wait_semaphore: &RhiSemaphore,
    ) -> RhiSwapchainStatus {
        let wait_semaphores = [wait_semaphore.handle()];
        let swapchains = [self.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_pf.queue_present(queue.handle(), &present_info) };
        match result {
            Ok(false) => RhiSwapchainStatus::Ok,
            Ok(true) => RhiSwapchainStatus::Suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => RhiSwapchainStatus::Stale,
            Err(e) => panic!("failed to present swapchain image: {:?}", e),
        }
    }
}
