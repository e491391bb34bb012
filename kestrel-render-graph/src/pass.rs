use crate::target::{GraphTargetDesc, TargetRegistry};

/// pass 的 setup 阶段使用的 builder，声明 pass 创建与读取的 target
///
/// read 只能指向更早注册的 pass 所创建的 target，这个规则在
/// `RenderGraph::add_pass` 里校验
pub struct PassBuilder<'a> {
    registry: &'a mut TargetRegistry,
    pub(crate) creates: Vec<String>,
    pub(crate) reads: Vec<String>,
}

impl<'a> PassBuilder<'a> {
    pub(crate) fn new(registry: &'a mut TargetRegistry) -> Self {
        Self {
            registry,
            creates: vec![],
            reads: vec![],
        }
    }

    pub fn create_target(&mut self, name: &str, desc: GraphTargetDesc) -> &mut Self {
        self.registry.declare(name, desc);
        self.creates.push(name.to_string());
        self
    }

    pub fn read_target(&mut self, name: &str) -> &mut Self {
        self.reads.push(name.to_string());
        self
    }
}

/// 已注册的 pass，execute 闭包每帧调用一次
pub struct PassNode<Ctx> {
    pub name: String,
    /// pass 使用的 shader，名字对应 `ShaderRegistry` 中的注册项
    pub shaders: Vec<String>,
    pub creates: Vec<String>,
    pub reads: Vec<String>,

    pub(crate) execute: Box<dyn FnMut(&mut Ctx, &TargetRegistry)>,
}
