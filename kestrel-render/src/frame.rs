//! 单个 in-flight frame 的资源束
//!
//! 每个 frame 拥有独立的 command buffer、fence 与两个 semaphore，
//! 以及若干具名的 uniform region。frame 在启动时创建一次，
//! 每 `frames_in_flight` 帧被复用一次，运行期间不会销毁

use std::rc::Rc;

use ash::vk;
use indexmap::IndexMap;

use kestrel_rhi::commands::command_buffer::RhiCommandBuffer;
use kestrel_rhi::commands::command_pool::RhiCommandPool;
use kestrel_rhi::commands::synchronize::{RhiFence, RhiSemaphore};
use kestrel_rhi::resources::buffer::{RhiBuffer, RhiMemoryKind};
use kestrel_rhi::rhi::Rhi;

/// slot 在 region 内的字节偏移，stride 必须已经过 ubo 对齐
#[inline]
pub fn slot_offset(stride: vk::DeviceSize, slot: u32) -> vk::DeviceSize {
    stride * slot as vk::DeviceSize
}

/// 按固定 stride 划分为若干 slot 的 uniform buffer，
/// 每个 slot 对应一个 drawable 或 light，以 dynamic offset 方式访问
pub struct FrameUniformRegion {
    buffer: RhiBuffer,
    stride: vk::DeviceSize,
    slot_count: u32,
}

impl FrameUniformRegion {
    pub fn new(rhi: &Rhi, elem_size: vk::DeviceSize, slot_count: u32, debug_name: &str) -> Self {
        let stride = rhi.pad_uniform_buffer_size(elem_size);
        let mut buffer = RhiBuffer::new(
            rhi,
            stride * slot_count as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            RhiMemoryKind::HostVisible,
            stride,
            debug_name,
        );
        // region 常驻 mapped，slot 写入不反复 map/unmap
        buffer.map();

        Self {
            buffer,
            stride,
            slot_count,
        }
    }

    #[inline]
    pub fn buffer(&self) -> &RhiBuffer {
        &self.buffer
    }

    #[inline]
    pub fn stride(&self) -> vk::DeviceSize {
        self.stride
    }

    #[inline]
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    /// bind descriptor set 时传入的 dynamic offset
    #[inline]
    pub fn dynamic_offset(&self, slot: u32) -> u32 {
        assert!(slot < self.slot_count, "uniform slot {} out of range (count {})", slot, self.slot_count);
        slot_offset(self.stride, slot) as u32
    }

    /// 向指定 slot 写入数据
    ///
    /// 只有当所属 frame 的 wait_frame 已经返回时才是安全的
    pub fn write_slot<T: bytemuck::Pod>(&mut self, slot: u32, data: &T) {
        assert!(slot < self.slot_count, "uniform slot {} out of range (count {})", slot, self.slot_count);
        self.buffer.write_struct_at(slot_offset(self.stride, slot), data);
    }
}

pub struct Frame {
    index: usize,

    command_pool: Rc<RhiCommandPool>,
    cmd: RhiCommandBuffer,

    /// 创建为 signaled，第一次 wait 不会阻塞
    fence: RhiFence,
    acquire_semaphore: RhiSemaphore,
    present_semaphore: RhiSemaphore,

    uniform_regions: IndexMap<String, FrameUniformRegion>,
}

impl Frame {
    pub fn new(rhi: &Rhi, index: usize) -> Self {
        let command_pool = Rc::new(RhiCommandPool::new(
            rhi.device.clone(),
            rhi.device.graphics_queue_family.clone(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            &format!("frame-{}-command-pool", index),
        ));
        let cmd = RhiCommandBuffer::new(rhi.device.clone(), command_pool.clone(), &format!("frame-{}-cmd", index));

        let fence = RhiFence::new(rhi.device.clone(), true, &format!("frame-{}-fence", index));
        let acquire_semaphore = RhiSemaphore::new(rhi.device.clone(), &format!("frame-{}-acquire-semaphore", index));
        let present_semaphore = RhiSemaphore::new(rhi.device.clone(), &format!("frame-{}-present-semaphore", index));

        Self {
            index,
            command_pool,
            cmd,
            fence,
            acquire_semaphore,
            present_semaphore,
            uniform_regions: IndexMap::new(),
        }
    }

    /// 注册一个具名的 uniform region，每个 frame 各有一份
    pub fn add_uniform_region(&mut self, rhi: &Rhi, name: &str, elem_size: vk::DeviceSize, slot_count: u32) {
        assert!(
            !self.uniform_regions.contains_key(name),
            "frame uniform region '{}' already exists",
            name
        );
        let region =
            FrameUniformRegion::new(rhi, elem_size, slot_count, &format!("frame-{}-uniform-{}", self.index, name));
        self.uniform_regions.insert(name.to_string(), region);
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn cmd(&self) -> &RhiCommandBuffer {
        &self.cmd
    }

    #[inline]
    pub fn fence(&self) -> &RhiFence {
        &self.fence
    }

    #[inline]
    pub fn acquire_semaphore(&self) -> &RhiSemaphore {
        &self.acquire_semaphore
    }

    #[inline]
    pub fn present_semaphore(&self) -> &RhiSemaphore {
        &self.present_semaphore
    }

    #[inline]
    pub fn command_pool(&self) -> &Rc<RhiCommandPool> {
        &self.command_pool
    }

    pub fn uniform_region(&self, name: &str) -> &FrameUniformRegion {
        self.uniform_regions.get(name).unwrap_or_else(|| panic!("unknown frame uniform region '{}'", name))
    }

    pub fn uniform_region_mut(&mut self, name: &str) -> &mut FrameUniformRegion {
        self.uniform_regions.get_mut(name).unwrap_or_else(|| panic!("unknown frame uniform region '{}'", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_offset() {
        // stride 256 时各个 slot 的偏移
        assert_eq!(slot_offset(256, 0), 0);
        assert_eq!(slot_offset(256, 1), 256);
        assert_eq!(slot_offset(256, 10), 2560);
    }

    #[test]
    fn test_slot_offsets_do_not_overlap() {
        let stride = 256u64;
        let elem_size = 200u64;
        for slot in 0..8u32 {
            let start = slot_offset(stride, slot);
            let end = start + elem_size;
            assert!(end <= slot_offset(stride, slot + 1));
        }
    }
}
