//! 运行示例：两个 pass 的 render graph
//!
//! scene pass 清空一张 surface 尺寸的离屏 target；composite pass
//! 读取它并输出到 swapchain。启动时上传一个 quad 并为它构建
//! blas/tlas，descriptor set 由 shader 的 binding 表自动组装，
//! resize 时随 swapchain 一起重建

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use ash::vk;
use glam::{Mat4, Vec2, Vec3, Vec4};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

use kestrel_render::accel_manager::{AccelManager, SceneInstance};
use kestrel_render::renderer::Renderer;
use kestrel_render::resource_manager::{ShaderPass, build_shader_pass, collect_dynamic_offsets};
use kestrel_render::scene_interface::{GpuPerObject, MaterialKind, Topology, Vertex, VertexArrays};
use kestrel_render::shared_ctx::SharedResources;
use kestrel_render::upload::{GpuGeometry, upload_vertex_arrays};
use kestrel_render_graph::shader_table::{BindingSource, ShaderBindingDecl, ShaderDecl};
use kestrel_render_graph::target::{GraphTargetDesc, TargetExtent};
use kestrel_rhi::commands::synchronize::{RhiBarrierMask, RhiImageBarrier};
use kestrel_rhi::descriptors::layout::RhiBindingDesc;
use kestrel_rhi::rhi::Rhi;

const FRAMES_IN_FLIGHT: usize = 2;

/// pass 的 execute 闭包在注册时就被 box 进 graph，每帧要用的
/// set/offset 由 draw 在 execute 之前写进这个共享结构
#[derive(Default)]
struct PassBindings {
    scene_pipeline_layout: vk::PipelineLayout,
    scene_set: vk::DescriptorSet,
    scene_offsets: Vec<u32>,

    composite_pipeline_layout: vk::PipelineLayout,
    composite_set: vk::DescriptorSet,
    composite_offsets: Vec<u32>,
}

struct DemoShaderPasses {
    scene: ShaderPass,
    composite: ShaderPass,
}

#[derive(Default)]
struct DemoApp {
    window: Option<Window>,
    renderer: Option<Renderer>,

    shared: Option<SharedResources>,
    geometry: Option<Rc<GpuGeometry>>,
    accel: Option<AccelManager>,

    passes: Option<DemoShaderPasses>,
    bindings: Rc<RefCell<PassBindings>>,
    /// 对应的 swapchain generation，不一致时 descriptor 需要重新组装
    pass_generation: u64,
}

fn demo_quad() -> VertexArrays {
    VertexArrays {
        vertices: vec![
            Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::Z, Vec2::new(0.0, 0.0)),
            Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::Z, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(0.5, 0.5, 0.0), Vec3::Z, Vec2::new(1.0, 1.0)),
            Vertex::new(Vec3::new(-0.5, 0.5, 0.0), Vec3::Z, Vec2::new(0.0, 1.0)),
        ],
        indices: vec![0, 1, 2, 2, 3, 0],
        topology: Topology::Triangles,
    }
}

fn create_pipeline_layout(rhi: &Rhi, pass: &ShaderPass, name: &str) -> vk::PipelineLayout {
    let set_layouts = [pass.layout.handle()];
    let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
    let layout = unsafe { rhi.device.create_pipeline_layout(&create_info, None).unwrap() };
    rhi.device.debug_utils().set_object_debug_name(layout, &format!("{}-pipeline-layout", name));
    layout
}

impl DemoApp {
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) {
        let window_attr = Window::default_attributes()
            .with_title("kestrel demo".to_string())
            .with_inner_size(winit::dpi::LogicalSize::new(1200.0, 800.0));
        let window = event_loop.create_window(window_attr).unwrap();

        let size = window.inner_size();
        let mut renderer = Renderer::new(
            "kestrel-demo".to_string(),
            window.display_handle().unwrap().as_raw(),
            window.window_handle().unwrap().as_raw(),
            vk::Extent2D {
                width: size.width,
                height: size.height,
            },
            FRAMES_IN_FLIGHT,
        );

        // load 期：上传 quad，构建 blas/tlas
        let shared = SharedResources::new(&renderer.rhi);
        let geometry = Rc::new(upload_vertex_arrays(&renderer.rhi, &demo_quad(), "demo-quad"));
        let mut accel = AccelManager::new();
        accel.ensure_blas(&renderer.rhi, 0, &geometry, false);
        accel.update_tlas(
            &renderer.rhi,
            &[SceneInstance {
                geometry_id: 0,
                transform: Mat4::IDENTITY,
            }],
        );

        renderer.add_uniform_region("per-object", size_of::<GpuPerObject>() as vk::DeviceSize, 8);
        self.register_graph(&mut renderer, geometry.clone());

        let extent = renderer.swapchain().extent();
        renderer.graph.compile(&renderer.rhi, extent);

        self.window = Some(window);
        self.renderer = Some(renderer);
        self.shared = Some(shared);
        self.geometry = Some(geometry);
        self.accel = Some(accel);

        // descriptor 组装依赖 compile 之后的 target view
        self.rebuild_shader_passes();
        self.pass_generation = self.renderer.as_ref().unwrap().swapchain_generation();
    }

    /// 注册 shader 与两个 pass；binding 表声明了数据来源，
    /// set 的写入全部交给 build_shader_pass
    fn register_graph(&mut self, renderer: &mut Renderer, geometry: Rc<GpuGeometry>) {
        let per_object_binding = ShaderBindingDecl {
            binding: RhiBindingDesc {
                binding: 0,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                count: 1,
                stages: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            },
            source: BindingSource::FrameUniform("per-object".to_string()),
        };

        renderer.graph.register_shader(
            "scene",
            ShaderDecl {
                spirv_path: PathBuf::from("shaders/scene.spv"),
                bindings: vec![per_object_binding.clone()],
            },
        );
        renderer.graph.register_shader(
            "composite",
            ShaderDecl {
                spirv_path: PathBuf::from("shaders/composite.spv"),
                bindings: vec![
                    per_object_binding,
                    ShaderBindingDecl {
                        binding: RhiBindingDesc {
                            binding: 1,
                            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                            count: 1,
                            stages: vk::ShaderStageFlags::FRAGMENT,
                        },
                        source: BindingSource::GraphTarget("scene-color".to_string()),
                    },
                ],
            },
        );

        // 离屏 color target，之后作为 sampled image 被 composite 读取；
        // 本示例用 transfer clear 填充，所以还需要 TRANSFER_DST
        let scene_color_format = renderer.rhi.find_supported_format(
            &[vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::COLOR_ATTACHMENT
                | vk::FormatFeatureFlags::SAMPLED_IMAGE
                | vk::FormatFeatureFlags::TRANSFER_DST,
        );
        let mut scene_color_desc = GraphTargetDesc::color(scene_color_format, TargetExtent::Surface);
        scene_color_desc.usage |= vk::ImageUsageFlags::TRANSFER_DST;

        let bindings = self.bindings.clone();
        renderer.graph.add_pass(
            "scene",
            &["scene"],
            |builder| {
                builder.create_target("scene-color", scene_color_desc);
            },
            move |ctx, targets| {
                let b = bindings.borrow();
                ctx.cmd.bind_descriptor_sets(
                    vk::PipelineBindPoint::GRAPHICS,
                    b.scene_pipeline_layout,
                    0,
                    &[b.scene_set],
                    &b.scene_offsets,
                );

                let image = targets.image("scene-color").handle();
                ctx.cmd.image_memory_barrier(&[RhiImageBarrier::new()
                    .image(image)
                    .image_aspect_flag(vk::ImageAspectFlags::COLOR)
                    .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .mask(RhiBarrierMask {
                        src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
                        src_access: vk::AccessFlags2::empty(),
                        dst_stage: vk::PipelineStageFlags2::TRANSFER,
                        dst_access: vk::AccessFlags2::TRANSFER_WRITE,
                    })]);
                ctx.cmd.cmd_clear_color_image(
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &vk::ClearColorValue {
                        float32: [0.6, 0.3, 0.1, 1.0],
                    },
                    &[vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1)],
                );
                // 接下来 composite 以 sampled image 的方式读取
                ctx.cmd.image_memory_barrier(&[RhiImageBarrier::new()
                    .image(image)
                    .image_aspect_flag(vk::ImageAspectFlags::COLOR)
                    .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .mask(RhiBarrierMask {
                        src_stage: vk::PipelineStageFlags2::TRANSFER,
                        src_access: vk::AccessFlags2::TRANSFER_WRITE,
                        dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
                        dst_access: vk::AccessFlags2::SHADER_READ,
                    })]);
            },
        );

        let surface_format = renderer.swapchain().format();
        let bindings = self.bindings.clone();
        renderer.graph.add_pass(
            "composite",
            &["composite"],
            |builder| {
                builder.read_target("scene-color");
                builder.create_target("backbuffer", GraphTargetDesc::present_surface(surface_format));
            },
            move |ctx, _targets| {
                let b = bindings.borrow();
                ctx.cmd.bind_descriptor_sets(
                    vk::PipelineBindPoint::GRAPHICS,
                    b.composite_pipeline_layout,
                    0,
                    &[b.composite_set],
                    &b.composite_offsets,
                );
                ctx.cmd.bind_vertex_buffer(0, &geometry.vertex_buffer, 0);
                ctx.cmd.bind_index_buffer(&geometry.index_buffer, 0, vk::IndexType::UINT32);

                ctx.cmd.image_memory_barrier(&[RhiImageBarrier::new()
                    .image(ctx.swapchain_image)
                    .image_aspect_flag(vk::ImageAspectFlags::COLOR)
                    .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .mask(RhiBarrierMask {
                        src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
                        src_access: vk::AccessFlags2::empty(),
                        dst_stage: vk::PipelineStageFlags2::TRANSFER,
                        dst_access: vk::AccessFlags2::TRANSFER_WRITE,
                    })]);
                ctx.cmd.cmd_clear_color_image(
                    ctx.swapchain_image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &vk::ClearColorValue {
                        float32: [0.1, 0.2, 0.3, 1.0],
                    },
                    &[vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1)],
                );
                ctx.cmd.image_memory_barrier(&[RhiImageBarrier::new()
                    .image(ctx.swapchain_image)
                    .image_aspect_flag(vk::ImageAspectFlags::COLOR)
                    .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR)
                    .mask(RhiBarrierMask {
                        src_stage: vk::PipelineStageFlags2::TRANSFER,
                        src_access: vk::AccessFlags2::TRANSFER_WRITE,
                        dst_stage: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
                        dst_access: vk::AccessFlags2::empty(),
                    })]);
            },
        );
    }

    /// compile（包括 resize 之后的重新 compile）之后重新组装
    /// 每个 shader 的 per-frame descriptor set
    fn rebuild_shader_passes(&mut self) {
        let renderer = self.renderer.as_ref().unwrap();
        let shared = self.shared.as_mut().unwrap();

        // 旧的 set 随 pool 一起回收，此时 GPU 已经 idle
        if self.passes.is_some() {
            shared.descriptor_allocator.reset_all();
        }

        let scene = build_shader_pass(
            &renderer.rhi,
            shared,
            renderer.graph.targets(),
            renderer.frames(),
            renderer.graph.shaders().get("scene"),
            "scene",
        );
        let composite = build_shader_pass(
            &renderer.rhi,
            shared,
            renderer.graph.targets(),
            renderer.frames(),
            renderer.graph.shaders().get("composite"),
            "composite",
        );

        // layout 来自缓存，结构不变时 pipeline layout 只需要创建一次
        let mut bindings = self.bindings.borrow_mut();
        if bindings.scene_pipeline_layout == vk::PipelineLayout::null() {
            bindings.scene_pipeline_layout = create_pipeline_layout(&renderer.rhi, &scene, "scene");
            bindings.composite_pipeline_layout = create_pipeline_layout(&renderer.rhi, &composite, "composite");
        }
        drop(bindings);

        self.passes = Some(DemoShaderPasses { scene, composite });
    }

    fn draw(&mut self) {
        // surface 失效时跳过本帧，swapchain 已在内部重建
        let Some(image_index) = self.renderer.as_mut().unwrap().wait_frame() else {
            return;
        };

        // swapchain（与 graph target）重建过，descriptor 需要重新组装
        let generation = self.renderer.as_ref().unwrap().swapchain_generation();
        if self.pass_generation != generation {
            self.rebuild_shader_passes();
            self.pass_generation = generation;
        }

        let renderer = self.renderer.as_mut().unwrap();

        // fence 已退役，当前 frame 的 slot 可以安全覆写
        let per_object = GpuPerObject {
            model: Mat4::IDENTITY,
            material: MaterialKind::Lambert { diffuse: Vec4::ONE }.to_gpu(),
        };
        renderer.current_frame_mut().uniform_region_mut("per-object").write_slot(0, &per_object);

        {
            let frame = renderer.current_frame();
            let passes = self.passes.as_ref().unwrap();
            let mut bindings = self.bindings.borrow_mut();
            bindings.scene_set = passes.scene.set_for_frame(frame.index());
            bindings.scene_offsets = collect_dynamic_offsets(frame, renderer.graph.shaders().get("scene"), 0);
            bindings.composite_set = passes.composite.set_for_frame(frame.index());
            bindings.composite_offsets =
                collect_dynamic_offsets(frame, renderer.graph.shaders().get("composite"), 0);
        }

        renderer.start_frame();

        let mut ctx = renderer.pass_context(image_index);
        renderer.graph.execute(&mut ctx);

        renderer.submit_frame(image_index);
    }
}

impl ApplicationHandler for DemoApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            self.init_after_window(event_loop);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(vk::Extent2D {
                        width: size.width,
                        height: size.height,
                    });
                }
            }
            WindowEvent::RedrawRequested => self.draw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() {
    kestrel_crate_tools::init_log::init_log();

    let event_loop = EventLoop::new().unwrap();
    let mut app = DemoApp::default();
    event_loop.run_app(&mut app).unwrap();

    // 所有持有 device 引用的资源必须先于 renderer 销毁
    if let Some(renderer) = app.renderer.take() {
        renderer.rhi.wait_idle();
        {
            let bindings = app.bindings.borrow();
            unsafe {
                renderer.rhi.device.destroy_pipeline_layout(bindings.scene_pipeline_layout, None);
                renderer.rhi.device.destroy_pipeline_layout(bindings.composite_pipeline_layout, None);
            }
        }
        app.passes = None;
        app.accel = None;
        app.geometry = None;
        app.shared = None;
        renderer.destroy();
    }
    log::info!("end run.");
}
