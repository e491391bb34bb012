use std::{ffi::c_void, rc::Rc};

use ash::vk;
use vk_mem::Alloc;

use crate::{commands::command_buffer::RhiCommandBuffer, foundation::mem_allocator::RhiMemAllocator, rhi::Rhi};

/// buffer 所在的内存类型
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RhiMemoryKind {
    /// device local，CPU 不可见
    Device,
    /// host 可见，mapped 写入
    HostVisible,
}

pub struct RhiBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    map_ptr: Option<*mut u8>,
    size: vk::DeviceSize,

    /// 以 dynamic offset 方式访问时，每个槽位的 stride；非 0 时必须已经过
    /// `Rhi::pad_uniform_buffer_size` 对齐
    stride: vk::DeviceSize,

    debug_name: String,

    allocator: Rc<RhiMemAllocator>,
}

impl Drop for RhiBuffer {
    fn drop(&mut self) {
        unsafe {
            self.allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}

// constructor & getter
impl RhiBuffer {
    /// 通用的 buffer 创建入口，失败（OOM 等）直接 panic 终止进程
    pub fn new(
        rhi: &Rhi,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory: RhiMemoryKind,
        stride: vk::DeviceSize,
        debug_name: impl AsRef<str>,
    ) -> Self {
        let buffer_ci = vk::BufferCreateInfo::default().size(size).usage(usage);
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

        let (buffer, allocation) = unsafe { rhi.allocator.create_buffer(&buffer_ci, &alloc_ci).unwrap() };
        rhi.device.debug_utils().set_object_debug_name(buffer, debug_name.as_ref());

        Self {
            handle: buffer,
            allocation,
            map_ptr: None,
            size,
            stride,
            debug_name: debug_name.as_ref().to_string(),
            allocator: rhi.allocator.clone(),
        }
    }

    #[inline]
    pub fn new_stage_buffer(rhi: &Rhi, size: vk::DeviceSize, debug_name: impl AsRef<str>) -> Self {
        Self::new(rhi, size, vk::BufferUsageFlags::TRANSFER_SRC, RhiMemoryKind::HostVisible, 0, debug_name)
    }

    #[inline]
    pub fn new_index_buffer(rhi: &Rhi, size: usize, debug_name: impl AsRef<str>) -> Self {
        Self::new(
            rhi,
            size as vk::DeviceSize,
            vk::BufferUsageFlags::INDEX_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
            RhiMemoryKind::Device,
            0,
            debug_name,
        )
    }

    #[inline]
    pub fn new_vertex_buffer(rhi: &Rhi, size: usize, debug_name: impl AsRef<str>) -> Self {
        Self::new(
            rhi,
            size as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
            RhiMemoryKind::Device,
            0,
            debug_name,
        )
    }

    #[inline]
    pub fn new_acceleration_buffer(rhi: &Rhi, size: vk::DeviceSize, debug_name: impl AsRef<str>) -> Self {
        Self::new(
            rhi,
            size,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            RhiMemoryKind::Device,
            0,
            debug_name,
        )
    }

    #[inline]
    pub fn new_acceleration_scratch_buffer(rhi: &Rhi, size: vk::DeviceSize, debug_name: impl AsRef<str>) -> Self {
        Self::new(
            rhi,
            size,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            RhiMemoryKind::Device,
            0,
            debug_name,
        )
    }

    #[inline]
    pub fn new_acceleration_instance_buffer(rhi: &Rhi, size: vk::DeviceSize, debug_name: impl AsRef<str>) -> Self {
        Self::new(
            rhi,
            size,
            vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                | vk::BufferUsageFlags::TRANSFER_DST,
            RhiMemoryKind::Device,
            0,
            debug_name,
        )
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn stride(&self) -> vk::DeviceSize {
        self.stride
    }

    #[inline]
    pub fn device_address(&self, rhi: &Rhi) -> vk::DeviceAddress {
        unsafe {
            rhi.device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(self.handle))
        }
    }
}

// map & transfer
impl RhiBuffer {
    #[inline]
    pub fn mapped_ptr(&self) -> *mut u8 {
        self.map_ptr.unwrap_or_else(|| {
            panic!("Buffer {} is not mapped, call map() first", self.debug_name);
        })
    }

    #[inline]
    pub fn map(&mut self) {
        if self.map_ptr.is_some() {
            return;
        }
        unsafe {
            self.map_ptr = Some(self.allocator.map_memory(&mut self.allocation).unwrap());
        }
    }

    #[inline]
    pub fn flush(&mut self, offset: vk::DeviceSize, size: vk::DeviceSize) {
        self.allocator.flush_allocation(&self.allocation, offset, size).unwrap();
    }

    #[inline]
    pub fn unmap(&mut self) {
        if self.map_ptr.is_none() {
            return;
        }
        unsafe {
            self.allocator.unmap_memory(&mut self.allocation);
            self.map_ptr = None;
        }
    }

    /// 通过 mem map 的方式将 data 传入到 buffer 中
    ///
    /// 注：确保 buffer 内存的对齐方式和 T 保持一致
    pub fn transfer_data_by_mem_map<T>(&mut self, data: &[T])
    where
        T: Sized + Copy,
    {
        self.map();
        unsafe {
            // 这里的 size 是目标内存的最大 size
            // align 表示目标内存位置额外的对齐要求，使用 align_of 与 rust 中的 T 保持一致
            let mut slice =
                ash::util::Align::new(self.map_ptr.unwrap() as *mut c_void, align_of::<T>() as u64, self.size);
            slice.copy_from_slice(data);
            self.allocator.flush_allocation(&self.allocation, 0, size_of_val(data) as vk::DeviceSize).unwrap();
        }
        self.unmap();
    }

    /// 向指定 offset 写入一个结构体，buffer 需要保持 mapped 状态
    ///
    /// 用于 per-frame uniform region 的槽位写入
    pub fn write_struct_at<T: bytemuck::Pod>(&mut self, offset: vk::DeviceSize, data: &T) {
        debug_assert!(offset + size_of::<T>() as vk::DeviceSize <= self.size);
        let ptr = self.mapped_ptr();
        unsafe {
            let dst = ptr.add(offset as usize);
            std::ptr::copy_nonoverlapping(bytemuck::bytes_of(data).as_ptr(), dst, size_of::<T>());
        }
        self.flush(offset, size_of::<T>() as vk::DeviceSize);
    }

    /// 创建一个临时的 stage buffer，先将数据放入 stage buffer，再 transfer 到 self
    ///
    /// sync 表示这个函数是同步等待的，会阻塞运行。只适合 load 期的大块传输
    pub fn transfer_data_sync(&mut self, rhi: &Rhi, data: &[impl Sized + Copy]) {
        let mut stage_buffer = Self::new_stage_buffer(
            rhi,
            size_of_val(data) as vk::DeviceSize,
            format!("{}-stage-buffer", self.debug_name),
        );

        stage_buffer.transfer_data_by_mem_map(data);

        let cmd_name = format!("{}-transfer-data", &self.debug_name);
        RhiCommandBuffer::one_time_exec(
            rhi.device.clone(),
            rhi.temp_graphics_command_pool.clone(),
            &rhi.graphics_queue,
            |cmd| {
                cmd.cmd_copy_buffer(
                    &stage_buffer,
                    self,
                    &[vk::BufferCopy {
                        size: size_of_val(data) as vk::DeviceSize,
                        ..Default::default()
                    }],
                );
            },
            &cmd_name,
        );
    }
}
