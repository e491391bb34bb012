//! 声明式的 pass 调度器
//!
//! pass 的注册顺序就是执行顺序，调度器不做重排，只校验
//! 每个 read 都指向更早注册的 pass 创建的 target

use std::collections::HashSet;

use ash::vk;

use kestrel_rhi::rhi::Rhi;

use crate::pass::{PassBuilder, PassNode};
use crate::shader_table::{ShaderDecl, ShaderRegistry};
use crate::target::TargetRegistry;

/// 泛型参数 Ctx 是 execute 闭包收到的逐帧上下文，由上层 renderer
/// 决定具体内容（当前 Frame、可见的 draw call 列表等）
pub struct RenderGraph<Ctx> {
    passes: Vec<PassNode<Ctx>>,
    targets: TargetRegistry,
    shaders: ShaderRegistry,

    /// 到目前为止所有已注册 pass 创建的 target，用于 read 校验
    written: HashSet<String>,
}

impl<Ctx> Default for RenderGraph<Ctx> {
    fn default() -> Self {
        Self {
            passes: vec![],
            targets: TargetRegistry::default(),
            shaders: ShaderRegistry::default(),
            written: HashSet::new(),
        }
    }
}

impl<Ctx> RenderGraph<Ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn register_shader(&mut self, name: &str, decl: ShaderDecl) {
        self.shaders.register_shader(name, decl);
    }

    #[inline]
    pub fn shaders(&self) -> &ShaderRegistry {
        &self.shaders
    }

    #[inline]
    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    /// 注册一个 pass
    ///
    /// setup 在注册时立即执行一次，声明 pass 创建和读取的 target；
    /// execute 每帧执行一次。
    ///
    /// # panic
    ///
    /// - pass 引用了未注册的 shader
    /// - read 的 target 不是由更早注册的 pass 创建的
    ///
    /// 这些都是配置期的程序错误，不会延迟到执行期才暴露
    pub fn add_pass(
        &mut self,
        name: &str,
        shaders: &[&str],
        setup: impl FnOnce(&mut PassBuilder),
        execute: impl FnMut(&mut Ctx, &TargetRegistry) + 'static,
    ) {
        for shader in shaders {
            assert!(self.shaders.contains(shader), "pass '{}' references unknown shader '{}'", name, shader);
        }

        let mut builder = PassBuilder::new(&mut self.targets);
        setup(&mut builder);
        let (creates, reads) = (builder.creates, builder.reads);

        // read 必须由更早的 pass 创建；没有 read 的 pass 永远合法
        for read in &reads {
            assert!(
                self.written.contains(read),
                "pass '{}' reads target '{}' which no earlier pass has written",
                name,
                read
            );
        }
        self.written.extend(creates.iter().cloned());

        log::debug!("render graph pass '{}': creates {:?}, reads {:?}", name, creates, reads);
        self.passes.push(PassNode {
            name: name.to_string(),
            shaders: shaders.iter().map(|s| s.to_string()).collect(),
            creates,
            reads,
            execute: Box::new(execute),
        });
    }

    /// 分配（或重建）所有 target
    ///
    /// surface 尺寸变化时必须整体重建，部分 target 尺寸过期
    /// 属于配置错误，这里通过全量重建排除这种状态
    pub fn compile(&mut self, rhi: &Rhi, surface_extent: vk::Extent2D) {
        self.targets.rebuild(rhi, surface_extent);
    }

    /// 按注册顺序执行所有 pass
    pub fn execute(&mut self, ctx: &mut Ctx) {
        for pass in &mut self.passes {
            (pass.execute)(ctx, &self.targets);
        }
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{GraphTargetDesc, TargetExtent};

    fn color_desc() -> GraphTargetDesc {
        GraphTargetDesc::color(
            vk::Format::R8G8B8A8_UNORM,
            TargetExtent::Fixed(vk::Extent2D {
                width: 64,
                height: 64,
            }),
        )
    }

    #[test]
    fn test_passes_execute_in_registration_order() {
        let mut graph: RenderGraph<Vec<&'static str>> = RenderGraph::new();

        graph.add_pass(
            "shadow",
            &[],
            |builder| {
                builder.create_target("shadow-map", color_desc());
            },
            |order, _| order.push("shadow"),
        );
        graph.add_pass(
            "lighting",
            &[],
            |builder| {
                builder.read_target("shadow-map").create_target("lit", color_desc());
            },
            |order, _| order.push("lighting"),
        );
        graph.add_pass(
            "post",
            &[],
            |builder| {
                builder.read_target("lit");
            },
            |order, _| order.push("post"),
        );

        // 多帧执行，顺序每次都一样
        let mut order = vec![];
        graph.execute(&mut order);
        graph.execute(&mut order);
        assert_eq!(order, vec!["shadow", "lighting", "post", "shadow", "lighting", "post"]);
    }

    #[test]
    #[should_panic(expected = "which no earlier pass has written")]
    fn test_read_of_undeclared_target_panics() {
        let mut graph: RenderGraph<()> = RenderGraph::new();
        graph.add_pass(
            "lighting",
            &[],
            |builder| {
                builder.read_target("shadow-map");
            },
            |_, _| {},
        );
    }

    #[test]
    #[should_panic(expected = "which no earlier pass has written")]
    fn test_read_of_later_target_panics() {
        let mut graph: RenderGraph<()> = RenderGraph::new();
        // 自己 pass 里创建的 target 也不能作为自己的 read
        graph.add_pass(
            "bad",
            &[],
            |builder| {
                builder.create_target("t", color_desc());
                builder.read_target("t");
            },
            |_, _| {},
        );
    }

    #[test]
    fn test_first_pass_with_zero_reads_is_legal() {
        let mut graph: RenderGraph<u32> = RenderGraph::new();
        graph.add_pass(
            "shadow",
            &[],
            |builder| {
                builder.create_target("shadow-map", color_desc());
            },
            |count, _| *count += 1,
        );

        let mut count = 0;
        graph.execute(&mut count);
        assert_eq!(count, 1);
    }

    #[test]
    #[should_panic(expected = "declared more than once")]
    fn test_duplicate_target_panics() {
        let mut graph: RenderGraph<()> = RenderGraph::new();
        graph.add_pass(
            "a",
            &[],
            |builder| {
                builder.create_target("t", color_desc());
            },
            |_, _| {},
        );
        graph.add_pass(
            "b",
            &[],
            |builder| {
                builder.create_target("t", color_desc());
            },
            |_, _| {},
        );
    }

    #[test]
    #[should_panic(expected = "unknown shader")]
    fn test_unknown_shader_panics() {
        let mut graph: RenderGraph<()> = RenderGraph::new();
        graph.add_pass("a", &["missing-shader"], |_| {}, |_, _| {});
    }
}
