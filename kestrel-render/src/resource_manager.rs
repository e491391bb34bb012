//! shader pass 的组装层
//!
//! 根据 shader 的声明式 binding 表，把 frame uniform region 和
//! graph target 自动接到 descriptor set 上；Manual 来源的 binding
//! 留给 pass 的 execute 闭包自己处理

use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use kestrel_render_graph::shader_table::{BindingSource, ShaderDecl};
use kestrel_render_graph::target::TargetRegistry;
use kestrel_rhi::descriptors::layout::RhiDescriptorSetLayout;
use kestrel_rhi::descriptors::writer::RhiDescriptorWriter;
use kestrel_rhi::rhi::Rhi;

use crate::frame::Frame;
use crate::shared_ctx::SharedResources;

/// 组装完成的 shader pass 绑定：一个共享的 layout，
/// 每个 in-flight frame 一个 descriptor set
pub struct ShaderPass {
    pub layout: Rc<RhiDescriptorSetLayout>,
    pub sets: Vec<vk::DescriptorSet>,
}

impl ShaderPass {
    #[inline]
    pub fn set_for_frame(&self, frame_index: usize) -> vk::DescriptorSet {
        self.sets[frame_index]
    }
}

/// 根据 binding 表组装 descriptor set
///
/// 需要在 graph compile 之后调用（GraphTarget 的 view 此时才存在）。
/// graph 重新 compile（resize）之后需要重新组装
pub fn build_shader_pass(
    rhi: &Rhi,
    shared: &mut SharedResources,
    targets: &TargetRegistry,
    frames: &[Frame],
    decl: &ShaderDecl,
    debug_name: &str,
) -> ShaderPass {
    let bindings = decl.bindings.iter().map(|b| b.binding).collect_vec();
    let layout = shared.layout_cache.get_or_create(&bindings, &format!("{}-set-layout", debug_name));

    let mut writer = RhiDescriptorWriter::new();
    let sets = frames
        .iter()
        .map(|frame| {
            let set = shared
                .descriptor_allocator
                .allocate(&layout, &format!("{}-set-frame-{}", debug_name, frame.index()));

            for binding_decl in &decl.bindings {
                match &binding_decl.source {
                    BindingSource::FrameUniform(region_name) => {
                        let region = frame.uniform_region(region_name);
                        // dynamic offset 访问，range 是单个 slot 的 stride
                        writer.write_buffer(
                            set,
                            binding_decl.binding.binding,
                            binding_decl.binding.descriptor_type,
                            region.buffer().handle(),
                            0,
                            region.stride(),
                        );
                    }
                    BindingSource::GraphTarget(target_name) => {
                        writer.write_image(
                            set,
                            binding_decl.binding.binding,
                            binding_decl.binding.descriptor_type,
                            targets.view(target_name),
                            shared.default_sampler.handle(),
                            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        );
                    }
                    BindingSource::Manual => {}
                }
            }
            set
        })
        .collect_vec();

    writer.commit(&rhi.device);

    ShaderPass { layout, sets }
}

/// bind descriptor set 时的 dynamic offset 列表
///
/// 顺序与 binding 表中 FrameUniform 来源的 binding 声明顺序一致
pub fn collect_dynamic_offsets(frame: &Frame, decl: &ShaderDecl, slot: u32) -> Vec<u32> {
    decl.bindings
        .iter()
        .filter_map(|binding_decl| match &binding_decl.source {
            BindingSource::FrameUniform(region_name) => Some(frame.uniform_region(region_name).dynamic_offset(slot)),
            _ => None,
        })
        .collect_vec()
}
