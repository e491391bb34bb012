//! renderer 组合层：持有 Rhi、swapchain、frames 与 render graph，
//! 驱动 wait_frame / start_frame / submit_frame 的逐帧协议

use std::ffi::CStr;

use ash::vk;
use itertools::Itertools;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use kestrel_render_graph::graph::RenderGraph;
use kestrel_rhi::commands::command_buffer::RhiCommandBuffer;
use kestrel_rhi::commands::command_queue::RhiSubmitInfo;
use kestrel_rhi::rhi::Rhi;
use kestrel_rhi::swapchain::surface::RhiSurface;
use kestrel_rhi::swapchain::swapchain::{RhiSwapchain, RhiSwapchainStatus};

use crate::frame::Frame;

/// pass 的 execute 闭包每帧收到的上下文
pub struct PassContext {
    pub cmd: RhiCommandBuffer,
    /// 当前 in-flight frame 的下标
    pub frame_index: usize,
    /// 本帧 acquire 到的 swapchain image
    pub image_index: u32,
    /// alias surface 的 target 实际对应的 image
    pub swapchain_image: vk::Image,
    pub swapchain_image_view: vk::ImageView,
    pub extent: vk::Extent2D,
}

pub struct Renderer {
    pub rhi: Rhi,

    surface: RhiSurface,
    swapchain: Option<RhiSwapchain>,
    /// swapchain 每重建一次加一，上层据此判断是否需要重新组装
    /// 依赖 graph target 的 descriptor
    swapchain_generation: u64,

    frames: Vec<Frame>,
    current_frame: usize,
    frame_counter: u64,

    pub graph: RenderGraph<PassContext>,

    window_extent: vk::Extent2D,
}

impl Renderer {
    pub fn new(
        app_name: String,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
        window_extent: vk::Extent2D,
        frames_in_flight: usize,
    ) -> Self {
        assert!(frames_in_flight >= 1, "frames_in_flight must be at least 1");

        let instance_exts = ash_window::enumerate_required_extensions(display_handle)
            .unwrap()
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(*ext) })
            .collect_vec();
        let rhi = Rhi::new(app_name, instance_exts);

        let surface = RhiSurface::new(&rhi.vk_entry, &rhi.instance, display_handle, window_handle);
        let swapchain =
            RhiSwapchain::new(&rhi.instance, rhi.device.clone(), &rhi.physical_device, &surface, window_extent);

        let frames = (0..frames_in_flight).map(|index| Frame::new(&rhi, index)).collect_vec();
        log::info!("renderer created: {} frames in flight, {} swapchain images", frames.len(), swapchain.image_count());

        Self {
            rhi,
            surface,
            swapchain: Some(swapchain),
            swapchain_generation: 0,
            frames,
            current_frame: 0,
            frame_counter: 0,
            graph: RenderGraph::new(),
            window_extent,
        }
    }

    #[inline]
    pub fn swapchain(&self) -> &RhiSwapchain {
        self.swapchain.as_ref().unwrap()
    }

    #[inline]
    pub fn swapchain_generation(&self) -> u64 {
        self.swapchain_generation
    }

    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    #[inline]
    pub fn current_frame(&self) -> &Frame {
        &self.frames[self.current_frame]
    }

    #[inline]
    pub fn current_frame_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.current_frame]
    }

    /// 为每个 in-flight frame 注册一份同名的 uniform region
    pub fn add_uniform_region(&mut self, name: &str, elem_size: vk::DeviceSize, slot_count: u32) {
        for frame in &mut self.frames {
            frame.add_uniform_region(&self.rhi, name, elem_size, slot_count);
        }
    }

    /// 窗口尺寸变化时由外层调用，下一次 wait_frame 前生效
    pub fn resize(&mut self, new_extent: vk::Extent2D) {
        self.window_extent = new_extent;
        self.rebuild_swapchain();
    }
}

// 逐帧协议
impl Renderer {
    /// 第一步：等待当前 frame 上一次使用的 GPU 工作全部退役，
    /// 然后 acquire 下一张 presentable image
    ///
    /// 返回 None 表示 surface 已失效，本帧跳过；swapchain 已在内部
    /// 重建，调用方下一轮重试即可
    pub fn wait_frame(&mut self) -> Option<u32> {
        let frame = &self.frames[self.current_frame];
        frame.fence().wait();

        let (image_index, status) = self.swapchain().acquire_next_image(frame.acquire_semaphore());
        match status {
            RhiSwapchainStatus::Stale => {
                self.rebuild_swapchain();
                None
            }
            // suboptimal 时本帧照常渲染，present 之后再重建
            _ => image_index,
        }
    }

    /// 第二步：重置 fence 与 command buffer，开始录制
    pub fn start_frame(&mut self) {
        let frame_counter = self.frame_counter;
        let frame = &self.frames[self.current_frame];
        frame.fence().reset();
        frame.cmd().reset();
        frame.cmd().begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, &format!("frame-{}", frame_counter));
    }

    /// 在两步之间由调用方执行 graph：`graph.execute(&mut pass_ctx)`
    pub fn pass_context(&self, image_index: u32) -> PassContext {
        let frame = &self.frames[self.current_frame];
        PassContext {
            cmd: frame.cmd().clone(),
            frame_index: self.current_frame,
            image_index,
            swapchain_image: self.swapchain().image(image_index as usize),
            swapchain_image_view: self.swapchain().image_view(image_index as usize),
            extent: self.swapchain().extent(),
        }
    }

    /// 第三步：结束录制，提交并 present
    ///
    /// 提交等待 acquire semaphore，完成时 signal 本 frame 的 fence
    /// 与 present semaphore；present 等待 present semaphore
    pub fn submit_frame(&mut self, image_index: u32) {
        let frame = &self.frames[self.current_frame];
        frame.cmd().end();

        let submit_info = RhiSubmitInfo::new(std::slice::from_ref(frame.cmd()))
            .wait(frame.acquire_semaphore(), vk::PipelineStageFlags2::ALL_COMMANDS)
            .signal(frame.present_semaphore(), vk::PipelineStageFlags2::ALL_COMMANDS);
        self.rhi.graphics_queue.submit(vec![submit_info], Some(frame.fence()));

        let status = self.swapchain().present(&self.rhi.graphics_queue, image_index, frame.present_semaphore());
        if status != RhiSwapchainStatus::Ok {
            self.rebuild_swapchain();
        }

        self.current_frame = (self.current_frame + 1) % self.frames.len();
        self.frame_counter += 1;
    }
}

impl Renderer {
    /// 整体重建 swapchain 以及所有依赖 surface 尺寸的 graph target
    ///
    /// 不存在部分重建：所有 presentation 相关资源一起失效、一起重建
    fn rebuild_swapchain(&mut self) {
        self.rhi.wait_idle();

        self.swapchain = None;
        let swapchain = RhiSwapchain::new(
            &self.rhi.instance,
            self.rhi.device.clone(),
            &self.rhi.physical_device,
            &self.surface,
            self.window_extent,
        );
        self.graph.compile(&self.rhi, swapchain.extent());
        self.swapchain = Some(swapchain);
        self.swapchain_generation += 1;
    }

    /// 按与创建相反的顺序释放一切
    pub fn destroy(self) {
        self.rhi.wait_idle();

        drop(self.graph);
        drop(self.frames);
        drop(self.swapchain);
        drop(self.surface);
        self.rhi.destroy();
    }
}
