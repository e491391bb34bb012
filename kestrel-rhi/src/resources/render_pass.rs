use std::rc::Rc;

use ash::vk;

use crate::foundation::device::RhiDevice;
use crate::rhi::Rhi;

/// render pass 的 RAII 封装
pub struct RhiRenderPass {
    handle: vk::RenderPass,
    device: Rc<RhiDevice>,
}

impl Drop for RhiRenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.handle, None);
        }
    }
}

impl RhiRenderPass {
    pub fn new(rhi: &Rhi, render_pass_ci: &vk::RenderPassCreateInfo, debug_name: &str) -> Self {
        let handle = rhi.device.create_render_pass(render_pass_ci, debug_name);
        Self {
            handle,
            device: rhi.device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }
}

pub struct RhiFramebuffer {
    handle: vk::Framebuffer,
    extent: vk::Extent2D,
    device: Rc<RhiDevice>,
}

impl Drop for RhiFramebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.handle, None);
        }
    }
}

impl RhiFramebuffer {
    pub fn new(
        rhi: &Rhi,
        render_pass: &RhiRenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
        debug_name: &str,
    ) -> Self {
        let framebuffer_ci = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let handle = rhi.device.create_framebuffer(&framebuffer_ci, debug_name);
        Self {
            handle,
            extent,
            device: rhi.device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
