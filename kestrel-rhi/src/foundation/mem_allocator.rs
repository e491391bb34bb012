use std::ops::Deref;

use ash::vk;

pub struct RhiMemAllocator {
    inner: vk_mem::Allocator,
}

impl RhiMemAllocator {
    /// 由于 vma 的生命周期设定：需要引用 Instance 以及 Device，
    /// 并确保在其生命周期之内这两个的引用是有效的。
    /// 因此需要在 Rhi 的其他部分都初始化完成后再初始化 vma
    pub fn new(instance: &ash::Instance, pdevice: vk::PhysicalDevice, device: &ash::Device) -> Self {
        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(instance, device, pdevice);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        vma_ci.flags = vk_mem::AllocatorCreateFlags::BUFFER_DEVICE_ADDRESS;

        let vma = unsafe { vk_mem::Allocator::new(vma_ci).unwrap() };

        Self { inner: vma }
    }
}

impl Deref for RhiMemAllocator {
    type Target = vk_mem::Allocator;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Drop for RhiMemAllocator {
    fn drop(&mut self) {
        // vk_mem 是 RAII 的
        log::info!("Destroying RhiMemAllocator");
    }
}
