use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::commands::{command_buffer::RhiCommandBuffer, synchronize::{RhiFence, RhiSemaphore}};
use crate::foundation::device::RhiDevice;

#[derive(Clone, Debug)]
pub struct RhiQueueFamily {
    pub name: String,
    pub queue_family_index: u32,
    pub queue_flags: vk::QueueFlags,
}

/// # destroy
///
/// queue 随着 device 一起销毁，无需手动释放
pub struct RhiQueue {
    pub(crate) handle: vk::Queue,
    pub(crate) queue_family: RhiQueueFamily,

    pub(crate) device: Rc<RhiDevice>,
}

impl RhiQueue {
    pub fn new(device: Rc<RhiDevice>, queue_family: RhiQueueFamily, queue_index: u32) -> Self {
        let handle = unsafe { device.get_device_queue(queue_family.queue_family_index, queue_index) };
        device.debug_utils().set_object_debug_name(handle, &format!("{}-queue", queue_family.name));
        Self {
            handle,
            queue_family,
            device,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    #[inline]
    pub fn queue_family(&self) -> &RhiQueueFamily {
        &self.queue_family
    }

    pub fn submit(&self, batches: Vec<RhiSubmitInfo>, fence: Option<&RhiFence>) {
        unsafe {
            // batches 的存在是有必要的，submit_infos 引用的是 batches 的内存
            let submit_infos = batches.iter().map(|b| *b.inner()).collect_vec();
            self.device
                .queue_submit2(self.handle, &submit_infos, fence.map_or(vk::Fence::null(), |f| f.handle()))
                .unwrap()
        }
    }

    /// 根据 specification，vkQueueWaitIdle 应该和 Fence 效率相同
    #[inline]
    pub fn wait_idle(&self) {
        unsafe { self.device.queue_wait_idle(self.handle).unwrap() }
    }
}

/// Rhi 关于 SubmitInfo 的封装，更易用
#[derive(Default)]
pub struct RhiSubmitInfo {
    inner: vk::SubmitInfo2<'static>,

    _command_buffers: Vec<vk::CommandBufferSubmitInfo<'static>>,
    wait_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
    signal_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
}

impl RhiSubmitInfo {
    pub fn new(commands: &[RhiCommandBuffer]) -> Self {
        let command_buffers = commands
            .iter()
            .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(cmd.handle()))
            .collect_vec();

        let inner = vk::SubmitInfo2 {
            command_buffer_info_count: command_buffers.len() as u32,
            p_command_buffer_infos: command_buffers.as_ptr(),
            ..Default::default()
        };

        Self {
            inner,
            _command_buffers: command_buffers,
            wait_infos: vec![],
            signal_infos: vec![],
        }
    }

    #[inline]
    pub fn inner(&self) -> &vk::SubmitInfo2 {
        &self.inner
    }

    /// builder
    #[inline]
    pub fn wait(mut self, semaphore: &RhiSemaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.wait_infos.push(vk::SemaphoreSubmitInfo::default().semaphore(semaphore.handle()).stage_mask(stage));
        self.inner.wait_semaphore_info_count = self.wait_infos.len() as u32;
        self.inner.p_wait_semaphore_infos = self.wait_infos.as_ptr();
        self
    }

    /// builder
    #[inline]
    pub fn signal(mut self, semaphore: &RhiSemaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.signal_infos.push(vk::SemaphoreSubmitInfo::default().semaphore(semaphore.handle()).stage_mask(stage));
        self.inner.signal_semaphore_info_count = self.signal_infos.len() as u32;
        self.inner.p_signal_semaphore_infos = self.signal_infos.as_ptr();
        self
    }
}
