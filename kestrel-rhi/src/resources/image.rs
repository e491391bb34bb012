use std::rc::Rc;

use ash::vk;
use vk_mem::Alloc;

use crate::commands::command_buffer::RhiCommandBuffer;
use crate::commands::synchronize::{RhiBarrierMask, RhiImageBarrier};
use crate::foundation::{device::RhiDevice, mem_allocator::RhiMemAllocator};
use crate::resources::buffer::{RhiBuffer, RhiMemoryKind};
use crate::rhi::Rhi;

/// image 的种类：普通 2D 或 cube map
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RhiImageKind {
    Tex2D,
    Cube,
}

/// 创建 image 所需的描述，mip 与 layer 数量由 Rhi 计算
#[derive(Clone)]
pub struct RhiImageDesc {
    pub kind: RhiImageKind,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    /// 请求 mipmapping 时，允许的最大 mip 级数
    pub mip_cap: u32,
}

/// 完整 mip 链的级数：`floor(log2(max(w,h))) + 1`，再被调用方的 cap 截断
pub fn mip_level_count(extent: vk::Extent2D, mipmapping: bool, mip_cap: u32) -> u32 {
    if !mipmapping {
        return 1;
    }
    let max_dim = u32::max(extent.width, extent.height).max(1);
    let full_chain = 32 - max_dim.leading_zeros();
    full_chain.min(mip_cap.max(1))
}

pub struct RhiImage2D {
    handle: vk::Image,
    allocation: vk_mem::Allocation,

    extent: vk::Extent2D,
    format: vk::Format,
    mip_levels: u32,
    layers: u32,

    _name: String,

    allocator: Rc<RhiMemAllocator>,
}

impl Drop for RhiImage2D {
    fn drop(&mut self) {
        unsafe { self.allocator.destroy_image(self.handle, &mut self.allocation) }
    }
}

// getter
impl RhiImage2D {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn layers(&self) -> u32 {
        self.layers
    }
}

impl RhiImage2D {
    /// 失败（格式不支持、OOM）直接 panic 终止进程
    pub fn new(rhi: &Rhi, extent: vk::Extent2D, desc: &RhiImageDesc, mipmapping: bool, debug_name: &str) -> Self {
        Self::new_with_memory(rhi, extent, desc, mipmapping, RhiMemoryKind::Device, debug_name)
    }

    /// 几乎所有 image 都应该是 device local 的；linear readback 之类的
    /// 特殊用途才需要 host visible
    pub fn new_with_memory(
        rhi: &Rhi,
        extent: vk::Extent2D,
        desc: &RhiImageDesc,
        mipmapping: bool,
        memory: RhiMemoryKind,
        debug_name: &str,
    ) -> Self {
        let mip_levels = mip_level_count(extent, mipmapping, desc.mip_cap);
        // cube 类型强制 6 层的 array
        let (layers, create_flags) = match desc.kind {
            RhiImageKind::Tex2D => (1, vk::ImageCreateFlags::empty()),
            RhiImageKind::Cube => (6, vk::ImageCreateFlags::CUBE_COMPATIBLE),
        };

        let image_ci = vk::ImageCreateInfo {
            flags: create_flags,
            image_type: vk::ImageType::TYPE_2D,
            format: desc.format,
            extent: extent.into(),
            mip_levels,
            array_layers: layers,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: desc.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            // spec 上面说，这里只能是 UNDEFINED 或者 PREINITIALIZED
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let alloc_ci = match memory {
            RhiMemoryKind::Device => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            RhiMemoryKind::HostVisible => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::Auto,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
                ..Default::default()
            },
        };

        let (image, allocation) = unsafe { rhi.allocator.create_image(&image_ci, &alloc_ci).unwrap() };
        rhi.device.debug_utils().set_object_debug_name(image, debug_name);

        Self {
            handle: image,
            allocation,
            extent,
            format: desc.format,
            mip_levels,
            layers,
            _name: debug_name.to_string(),
            allocator: rhi.allocator.clone(),
        }
    }

    /// 通过 staging buffer 将像素数据上传到 image 的第 0 个 mip
    ///
    /// immediate submit：阻塞等待传输完成，只用于 load 期
    pub fn upload_pixels(&self, rhi: &Rhi, data: &[u8], debug_name: &str) {
        let mut stage_buffer = RhiBuffer::new_stage_buffer(
            rhi,
            size_of_val(data) as vk::DeviceSize,
            format!("{}-stage-buffer", debug_name),
        );
        stage_buffer.transfer_data_by_mem_map(data);

        RhiCommandBuffer::one_time_exec(
            rhi.device.clone(),
            rhi.temp_graphics_command_pool.clone(),
            &rhi.graphics_queue,
            |cmd| {
                // UNDEFINED -> TRANSFER_DST
                cmd.image_memory_barrier(&[RhiImageBarrier::new()
                    .image(self.handle)
                    .image_aspect_flag(vk::ImageAspectFlags::COLOR)
                    .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .mask(RhiBarrierMask {
                        src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
                        src_access: vk::AccessFlags2::empty(),
                        dst_stage: vk::PipelineStageFlags2::TRANSFER,
                        dst_access: vk::AccessFlags2::TRANSFER_WRITE,
                    })]);

                let region = vk::BufferImageCopy2::default()
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: self.layers,
                    })
                    .image_extent(self.extent.into());
                cmd.cmd_copy_buffer_to_image(
                    &vk::CopyBufferToImageInfo2::default()
                        .src_buffer(stage_buffer.handle())
                        .dst_image(self.handle)
                        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                        .regions(std::slice::from_ref(&region)),
                );

                // TRANSFER_DST -> SHADER_READ_ONLY
                cmd.image_memory_barrier(&[RhiImageBarrier::new()
                    .image(self.handle)
                    .image_aspect_flag(vk::ImageAspectFlags::COLOR)
                    .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .mask(RhiBarrierMask {
                        src_stage: vk::PipelineStageFlags2::TRANSFER,
                        src_access: vk::AccessFlags2::TRANSFER_WRITE,
                        dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
                        dst_access: vk::AccessFlags2::SHADER_READ,
                    })]);
            },
            debug_name,
        );
    }
}

pub struct RhiImageView {
    handle: vk::ImageView,
    device: Rc<RhiDevice>,
}

impl Drop for RhiImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.handle, None);
        }
    }
}

impl RhiImageView {
    pub fn new(rhi: &Rhi, image: &RhiImage2D, aspect: vk::ImageAspectFlags, debug_name: &str) -> Self {
        let view_type = if image.layers() == 6 { vk::ImageViewType::CUBE } else { vk::ImageViewType::TYPE_2D };
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image.handle())
            .format(image.format())
            .view_type(view_type)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .level_count(image.mip_levels())
                    .layer_count(image.layers()),
            );

        let handle = unsafe { rhi.device.create_image_view(&create_info, None).unwrap() };
        rhi.device.debug_utils().set_object_debug_name(handle, debug_name);
        Self {
            handle,
            device: rhi.device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }
}

/// image + view 的组合，作为纹理或 render target 使用
pub struct RhiTexture {
    image: RhiImage2D,
    view: RhiImageView,
}

impl RhiTexture {
    pub fn new(rhi: &Rhi, image: RhiImage2D, aspect: vk::ImageAspectFlags, debug_name: &str) -> Self {
        let view = RhiImageView::new(rhi, &image, aspect, &format!("{}-view", debug_name));
        Self { image, view }
    }

    #[inline]
    pub fn image(&self) -> &RhiImage2D {
        &self.image
    }

    #[inline]
    pub fn view(&self) -> &RhiImageView {
        &self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_count_full_chain() {
        // 1024x512 -> floor(log2(1024)) + 1 = 11
        let extent = vk::Extent2D {
            width: 1024,
            height: 512,
        };
        assert_eq!(mip_level_count(extent, true, u32::MAX), 11);
    }

    #[test]
    fn test_mip_count_clamped_by_cap() {
        let extent = vk::Extent2D {
            width: 1024,
            height: 1024,
        };
        assert_eq!(mip_level_count(extent, true, 4), 4);
    }

    #[test]
    fn test_mip_count_disabled() {
        let extent = vk::Extent2D {
            width: 1024,
            height: 1024,
        };
        assert_eq!(mip_level_count(extent, false, u32::MAX), 1);
    }

    #[test]
    fn test_mip_count_non_pow2() {
        // max(800, 600) = 800, floor(log2(800)) = 9, 共 10 级
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(mip_level_count(extent, true, u32::MAX), 10);
    }
}
