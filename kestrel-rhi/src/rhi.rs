//! RHI 的统一入口
//!
//! `Rhi` 持有 instance、device、allocator、queue 等全局唯一的对象，
//! 以显式参数的方式传递给各个资源类型，而不是通过全局变量访问

use std::ffi::CStr;
use std::rc::Rc;

use ash::vk;

use crate::commands::{command_pool::RhiCommandPool, command_queue::RhiQueue};
use crate::foundation::{
    device::RhiDevice, instance::RhiInstance, mem_allocator::RhiMemAllocator, physical_device::RhiPhysicalDevice,
};

/// dynamic uniform buffer 的 offset 对齐，align 一定是 power of 2
///
/// 幂等：已经对齐的 size 再次对齐不会变化
#[inline]
pub fn pad_to_align(size: vk::DeviceSize, align: vk::DeviceSize) -> vk::DeviceSize {
    debug_assert!(align.is_power_of_two());
    (size + align - 1) & !(align - 1)
}

pub struct Rhi {
    /// vk 函数的加载器，需要比其他所有对象活得久
    pub vk_entry: ash::Entry,
    pub instance: RhiInstance,
    pub physical_device: Rc<RhiPhysicalDevice>,
    pub device: Rc<RhiDevice>,
    pub allocator: Rc<RhiMemAllocator>,

    pub graphics_queue: RhiQueue,
    pub compute_queue: RhiQueue,

    /// 用于 one-time-exec 之类的临时命令
    pub temp_graphics_command_pool: Rc<RhiCommandPool>,
    pub temp_compute_command_pool: Rc<RhiCommandPool>,
}

impl Rhi {
    pub fn new(app_name: String, extra_instance_exts: Vec<&'static CStr>) -> Self {
        let vk_entry = unsafe { ash::Entry::load().unwrap() };

        let instance = RhiInstance::new(&vk_entry, app_name, extra_instance_exts);
        let physical_device = Rc::new(RhiPhysicalDevice::new_discrete_physical_device(instance.handle()));
        let device = Rc::new(RhiDevice::new(&vk_entry, &instance, physical_device.clone()));

        // vma 引用了 instance 和 device 的函数指针，必须后于它们创建
        let allocator =
            Rc::new(RhiMemAllocator::new(instance.handle(), physical_device.handle, &device.handle));

        let graphics_queue = RhiQueue::new(device.clone(), device.graphics_queue_family.clone(), 0);
        let compute_queue = RhiQueue::new(device.clone(), device.compute_queue_family.clone(), 0);

        let temp_graphics_command_pool = Rc::new(RhiCommandPool::new(
            device.clone(),
            device.graphics_queue_family.clone(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "temp-graphics-command-pool",
        ));
        let temp_compute_command_pool = Rc::new(RhiCommandPool::new(
            device.clone(),
            device.compute_queue_family.clone(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "temp-compute-command-pool",
        ));

        Self {
            vk_entry,
            instance,
            physical_device,
            device,
            allocator,
            graphics_queue,
            compute_queue,
            temp_graphics_command_pool,
            temp_compute_command_pool,
        }
    }

    /// 当 uniform buffer 以 dynamic offset 的方式使用时，每个槽位的 stride
    /// 必须是 min_uniform_buffer_offset_alignment 的整数倍
    #[inline]
    pub fn pad_uniform_buffer_size(&self, size: vk::DeviceSize) -> vk::DeviceSize {
        pad_to_align(size, self.device.min_ubo_offset_align())
    }

    /// 在候选 format 中找到第一个支持指定 tiling 和 feature 的
    ///
    /// 一个都没有视为环境不满足要求，直接 panic
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> vk::Format {
        candidates
            .iter()
            .find(|format| {
                let props = unsafe {
                    self.instance.handle().get_physical_device_format_properties(self.physical_device.handle, **format)
                };
                match tiling {
                    vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                    vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                    _ => false,
                }
            })
            .copied()
            .unwrap_or_else(|| panic!("no supported format in {:?} for {:?}/{:?}", candidates, tiling, features))
    }

    #[inline]
    pub fn wait_idle(&self) {
        unsafe {
            self.device.device_wait_idle().unwrap();
        }
    }

    /// 按照与创建相反的顺序销毁所有对象
    ///
    /// 调用前需要保证所有依赖 Rhi 的资源（buffer、image 等）都已经 drop
    pub fn destroy(self) {
        self.wait_idle();

        drop(self.temp_graphics_command_pool);
        drop(self.temp_compute_command_pool);
        drop(self.graphics_queue);
        drop(self.compute_queue);
        drop(self.allocator);

        let device = Rc::try_unwrap(self.device)
            .unwrap_or_else(|_| panic!("RhiDevice is still referenced, destroy all resources first"));
        device.destroy();
        self.instance.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_to_align() {
        assert_eq!(pad_to_align(0, 256), 0);
        assert_eq!(pad_to_align(1, 256), 256);
        assert_eq!(pad_to_align(255, 256), 256);
        assert_eq!(pad_to_align(257, 256), 512);
    }

    #[test]
    fn test_pad_to_align_idempotent() {
        for size in [0u64, 1, 64, 100, 256, 1000, 4096] {
            let padded = pad_to_align(size, 256);
            assert_eq!(pad_to_align(padded, 256), padded);
            assert!(padded >= size);
            assert_eq!(padded % 256, 0);
        }
    }
}
