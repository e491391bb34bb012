//! render graph 的 target 管理
//!
//! target 在 graph 配置期声明，compile/resize 时统一分配。
//! 依赖 surface 尺寸的 target 在 resize 时全部一起重建，
//! 不存在部分 target 尺寸过期的状态

use ash::vk;
use indexmap::IndexMap;

use kestrel_rhi::resources::image::{RhiImage2D, RhiImageDesc, RhiImageKind, RhiTexture};
use kestrel_rhi::rhi::Rhi;

/// target 的尺寸来源
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TargetExtent {
    /// 固定尺寸，resize 时不变（例如 shadow map）
    Fixed(vk::Extent2D),
    /// 跟随 presentation surface 的尺寸，resize 时重建
    Surface,
}

/// graph target 的声明信息
#[derive(Clone, Copy)]
pub struct GraphTargetDesc {
    pub extent: TargetExtent,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub clear_value: vk::ClearValue,
    /// 为 true 时不分配 image，framebuffer 创建时替换为当前的
    /// presentation image
    pub aliases_surface: bool,
}

impl GraphTargetDesc {
    pub fn color(format: vk::Format, extent: TargetExtent) -> Self {
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            aliases_surface: false,
        }
    }

    pub fn depth(format: vk::Format, extent: TargetExtent) -> Self {
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::DEPTH,
            clear_value: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
            aliases_surface: false,
        }
    }

    pub fn present_surface(format: vk::Format) -> Self {
        Self {
            extent: TargetExtent::Surface,
            format,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            aspect: vk::ImageAspectFlags::COLOR,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            aliases_surface: true,
        }
    }
}

struct GraphTarget {
    desc: GraphTargetDesc,
    /// alias surface 的 target 不持有 image
    texture: Option<RhiTexture>,
}

/// 所有 graph target 的注册表，执行期通过名字解析出具体的 image/view
#[derive(Default)]
pub struct TargetRegistry {
    targets: IndexMap<String, GraphTarget>,
    surface_extent: vk::Extent2D,
}

impl TargetRegistry {
    /// 重复的 target 名字属于配置错误
    pub fn declare(&mut self, name: &str, desc: GraphTargetDesc) {
        assert!(
            !self.targets.contains_key(name),
            "render graph target '{}' is declared more than once",
            name
        );
        self.targets.insert(name.to_string(), GraphTarget { desc, texture: None });
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    #[inline]
    pub fn surface_extent(&self) -> vk::Extent2D {
        self.surface_extent
    }

    pub fn desc(&self, name: &str) -> &GraphTargetDesc {
        &self.target(name).desc
    }

    pub fn extent_of(&self, name: &str) -> vk::Extent2D {
        match self.target(name).desc.extent {
            TargetExtent::Fixed(extent) => extent,
            TargetExtent::Surface => self.surface_extent,
        }
    }

    /// alias surface 的 target 没有自己的 image，对它调用 view 属于
    /// 配置错误；presentation image 在 framebuffer 创建时才被代入
    pub fn view(&self, name: &str) -> vk::ImageView {
        let target = self.target(name);
        assert!(
            !target.desc.aliases_surface,
            "target '{}' aliases the presentation surface and has no image of its own",
            name
        );
        target.texture.as_ref().unwrap_or_else(|| panic!("target '{}' is not compiled yet", name)).view().handle()
    }

    pub fn image(&self, name: &str) -> &RhiImage2D {
        let target = self.target(name);
        target.texture.as_ref().unwrap_or_else(|| panic!("target '{}' is not compiled yet", name)).image()
    }

    /// 按声明顺序解析一组 attachment 的 view，alias surface 的 target
    /// 在这里被代入当前 acquire 到的 presentation image view
    ///
    /// framebuffer 需要逐 presentation image 创建时走这个入口
    pub fn attachment_views(&self, names: &[&str], present_view: vk::ImageView) -> Vec<vk::ImageView> {
        names
            .iter()
            .map(|name| {
                let target = self.target(name);
                if target.desc.aliases_surface {
                    present_view
                } else {
                    self.view(name)
                }
            })
            .collect()
    }

    /// 丢弃所有旧的 image，按照当前 surface 尺寸重建全部 target
    ///
    /// 调用方需保证没有 in-flight frame 还引用着旧 image
    pub fn rebuild(&mut self, rhi: &Rhi, surface_extent: vk::Extent2D) {
        self.surface_extent = surface_extent;

        for (name, target) in &mut self.targets {
            // 旧 image 先 drop 再创建新的
            target.texture = None;
            if target.desc.aliases_surface {
                continue;
            }

            let extent = match target.desc.extent {
                TargetExtent::Fixed(extent) => extent,
                TargetExtent::Surface => surface_extent,
            };
            let image = RhiImage2D::new(
                rhi,
                extent,
                &RhiImageDesc {
                    kind: RhiImageKind::Tex2D,
                    format: target.desc.format,
                    usage: target.desc.usage,
                    mip_cap: 1,
                },
                false,
                &format!("graph-target-{}", name),
            );
            target.texture =
                Some(RhiTexture::new(rhi, image, target.desc.aspect, &format!("graph-target-{}", name)));
        }

        log::info!(
            "render graph targets rebuilt: {} targets, surface {}x{}",
            self.targets.len(),
            surface_extent.width,
            surface_extent.height
        );
    }
}

impl TargetRegistry {
    fn target(&self, name: &str) -> &GraphTarget {
        self.targets.get(name).unwrap_or_else(|| panic!("unknown render graph target '{}'", name))
    }
}
