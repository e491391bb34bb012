//! 渲染核心内共享的资源上下文
//!
//! 所有"全局唯一"的东西都集中在这个显式传递的结构体里，
//! 而不是散落在各处的全局变量

use ash::vk;

use kestrel_rhi::descriptors::allocator::RhiDescriptorAllocator;
use kestrel_rhi::descriptors::layout::RhiDescriptorLayoutCache;
use kestrel_rhi::resources::image::RhiTexture;
use kestrel_rhi::resources::sampler::RhiSampler;
use kestrel_rhi::rhi::Rhi;

use crate::scene_interface::TexturePixels;
use crate::upload::upload_texture_image;

pub struct SharedResources {
    pub layout_cache: RhiDescriptorLayoutCache,
    pub descriptor_allocator: RhiDescriptorAllocator,

    pub default_sampler: RhiSampler,
    /// 材质缺少纹理时绑定的 1x1 白色纹理
    pub fallback_texture: RhiTexture,
}

impl SharedResources {
    pub fn new(rhi: &Rhi) -> Self {
        let fallback_texture = upload_texture_image(
            rhi,
            &TexturePixels {
                pixels: vec![255, 255, 255, 255],
                extent: vk::Extent2D { width: 1, height: 1 },
                format: vk::Format::R8G8B8A8_UNORM,
            },
            "fallback-texture",
        );

        Self {
            layout_cache: RhiDescriptorLayoutCache::new(rhi.device.clone()),
            descriptor_allocator: RhiDescriptorAllocator::new(rhi.device.clone()),
            default_sampler: RhiSampler::new_linear(rhi, "default-sampler"),
            fallback_texture,
        }
    }
}
