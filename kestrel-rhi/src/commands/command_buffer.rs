use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::commands::{
    command_pool::RhiCommandPool,
    command_queue::{RhiQueue, RhiSubmitInfo},
    synchronize::{RhiBufferBarrier, RhiImageBarrier},
};
use crate::foundation::device::RhiDevice;
use crate::resources::buffer::RhiBuffer;

/// 不能实现 Drop，因为需要手动去 free；cmd 支持 clone，不应该在意外的地方 free
#[derive(Clone)]
pub struct RhiCommandBuffer {
    handle: vk::CommandBuffer,

    /// command buffer 需要通过 command pool 进行 free，因此保存 command pool 的引用
    pub command_pool: Rc<RhiCommandPool>,

    pub device: Rc<RhiDevice>,
}

// basic 命令
impl RhiCommandBuffer {
    pub fn new(device: Rc<RhiDevice>, command_pool: Rc<RhiCommandPool>, debug_name: &str) -> Self {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe { device.allocate_command_buffers(&info).unwrap()[0] };
        device.debug_utils().set_object_debug_name(command_buffer, debug_name);
        RhiCommandBuffer {
            handle: command_buffer,
            command_pool,
            device,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    /// 立即执行某个 command，并同步等待执行结果
    ///
    /// 这是 load 期的 immediate submit 模式，绝对不要出现在逐帧路径上
    pub fn one_time_exec<F, R>(
        device: Rc<RhiDevice>,
        command_pool: Rc<RhiCommandPool>,
        queue: &RhiQueue,
        func: F,
        name: &str,
    ) -> R
    where
        F: FnOnce(&RhiCommandBuffer) -> R,
    {
        let command_buffer = RhiCommandBuffer::new(device, command_pool, &format!("one-time-{}", name));

        command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, name);
        let result = func(&command_buffer);
        command_buffer.end();

        queue.submit(vec![RhiSubmitInfo::new(std::slice::from_ref(&command_buffer))], None);
        queue.wait_idle();
        command_buffer.free();

        result
    }

    /// 释放 command buffer 在 command pool 中所占用的内存
    ///
    /// 释放之后 command buffer 就不存在了
    #[inline]
    pub fn free(self) {
        unsafe {
            self.device.free_command_buffers(self.command_pool.handle(), std::slice::from_ref(&self.handle));
        }
    }

    /// 开始录制 command，自动设置 debug label
    #[inline]
    pub fn begin(&self, usage_flag: vk::CommandBufferUsageFlags, debug_label_name: &str) {
        unsafe {
            self.device
                .begin_command_buffer(self.handle, &vk::CommandBufferBeginInfo::default().flags(usage_flag))
                .unwrap();
        }
        self.begin_label(debug_label_name, [0.2, 0.6, 0.2, 1.0]);
    }

    #[inline]
    pub fn end(&self) {
        self.end_label();
        unsafe { self.device.end_command_buffer(self.handle).unwrap() }
    }

    #[inline]
    pub fn reset(&self) {
        unsafe {
            self.device.reset_command_buffer(self.handle, vk::CommandBufferResetFlags::RELEASE_RESOURCES).unwrap();
        }
    }

    #[inline]
    pub fn begin_label(&self, name: &str, color: [f32; 4]) {
        self.device.debug_utils().begin_cmd_label(self.handle, name, color);
    }

    #[inline]
    pub fn end_label(&self) {
        self.device.debug_utils().end_cmd_label(self.handle);
    }
}

// transfer 类型的命令
impl RhiCommandBuffer {
    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_buffer(&self, src: &RhiBuffer, dst: &RhiBuffer, regions: &[vk::BufferCopy]) {
        unsafe {
            self.device.cmd_copy_buffer(self.handle, src.handle(), dst.handle(), regions);
        }
    }

    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_buffer_to_image(&self, copy_info: &vk::CopyBufferToImageInfo2) {
        unsafe { self.device.cmd_copy_buffer_to_image2(self.handle, copy_info) }
    }

    /// - command type: action
    /// - 需要 image 处于 TRANSFER_DST layout
    #[inline]
    pub fn cmd_clear_color_image(
        &self,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        unsafe { self.device.cmd_clear_color_image(self.handle, image, layout, color, ranges) }
    }

}

// 同步类的命令
impl RhiCommandBuffer {
    #[inline]
    pub fn memory_barrier(&self, barriers: &[vk::MemoryBarrier2]) {
        let dependency_info = vk::DependencyInfo::default().memory_barriers(barriers);
        unsafe { self.device.cmd_pipeline_barrier2(self.handle, &dependency_info) }
    }

    #[inline]
    pub fn image_memory_barrier(&self, barriers: &[RhiImageBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { self.device.cmd_pipeline_barrier2(self.handle, &dependency_info) }
    }

    #[inline]
    pub fn buffer_memory_barrier(&self, barriers: &[RhiBufferBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info = vk::DependencyInfo::default().buffer_memory_barriers(&barriers);
        unsafe { self.device.cmd_pipeline_barrier2(self.handle, &dependency_info) }
    }
}

// 绘制类的命令
impl RhiCommandBuffer {
    #[inline]
    pub fn begin_render_pass(&self, begin_info: &vk::RenderPassBeginInfo) {
        unsafe {
            self.device.cmd_begin_render_pass(self.handle, begin_info, vk::SubpassContents::INLINE);
        }
    }

    #[inline]
    pub fn end_render_pass(&self) {
        unsafe { self.device.cmd_end_render_pass(self.handle) }
    }

    #[inline]
    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(self.handle, bind_point, pipeline) }
    }

    /// dynamic_offsets 与 descriptor set 中 dynamic 类型的 binding 一一对应
    #[inline]
    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        pipeline_layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.handle,
                bind_point,
                pipeline_layout,
                first_set,
                sets,
                dynamic_offsets,
            );
        }
    }

    #[inline]
    pub fn bind_vertex_buffer(&self, binding: u32, buffer: &RhiBuffer, offset: vk::DeviceSize) {
        unsafe {
            self.device.cmd_bind_vertex_buffers(
                self.handle,
                binding,
                std::slice::from_ref(&buffer.handle()),
                std::slice::from_ref(&offset),
            );
        }
    }

    #[inline]
    pub fn bind_index_buffer(&self, buffer: &RhiBuffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        unsafe { self.device.cmd_bind_index_buffer(self.handle, buffer.handle(), offset, index_type) }
    }

    #[inline]
    pub fn draw_indexed(&self, index_count: u32, instance_count: u32, first_index: u32) {
        unsafe { self.device.cmd_draw_indexed(self.handle, index_count, instance_count, first_index, 0, 0) }
    }

    #[inline]
    pub fn dispatch(&self, group_count: (u32, u32, u32)) {
        unsafe { self.device.cmd_dispatch(self.handle, group_count.0, group_count.1, group_count.2) }
    }

    #[inline]
    pub fn set_viewport(&self, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(self.handle, 0, std::slice::from_ref(&viewport)) }
    }

    #[inline]
    pub fn set_scissor(&self, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(self.handle, 0, std::slice::from_ref(&scissor)) }
    }
}

// 加速结构的命令
impl RhiCommandBuffer {
    /// 构建或者 refit 加速结构
    ///
    /// - command type: action
    /// - 支持的 queue：compute
    pub fn build_acceleration_structure(
        &self,
        geometry_info: &vk::AccelerationStructureBuildGeometryInfoKHR,
        range_infos: &[vk::AccelerationStructureBuildRangeInfoKHR],
    ) {
        unsafe {
            self.device.acceleration_structure_pf().cmd_build_acceleration_structures(
                self.handle,
                std::slice::from_ref(geometry_info),
                &[range_infos],
            );
        }
    }
}
