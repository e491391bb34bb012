use std::rc::Rc;

use ash::vk;

use crate::foundation::device::RhiDevice;
use crate::rhi::Rhi;

pub struct RhiSampler {
    handle: vk::Sampler,
    device: Rc<RhiDevice>,
}

impl Drop for RhiSampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.handle, None);
        }
    }
}

impl RhiSampler {
    pub fn new(rhi: &Rhi, sampler_ci: &vk::SamplerCreateInfo, debug_name: &str) -> Self {
        let handle = unsafe { rhi.device.create_sampler(sampler_ci, None).unwrap() };
        rhi.device.debug_utils().set_object_debug_name(handle, debug_name);
        Self {
            handle,
            device: rhi.device.clone(),
        }
    }

    /// 常用的 linear + repeat 采样器
    pub fn new_linear(rhi: &Rhi, debug_name: &str) -> Self {
        let sampler_ci = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .max_lod(vk::LOD_CLAMP_NONE);
        Self::new(rhi, &sampler_ci, debug_name)
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }
}
