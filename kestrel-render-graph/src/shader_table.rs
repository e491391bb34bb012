//! shader 的声明式 binding 表
//!
//! 每个 shader 注册时声明它的所有 binding 以及数据来源，
//! 上层据此自动完成大部分 descriptor 的写入

use std::path::PathBuf;

use indexmap::IndexMap;

use kestrel_rhi::descriptors::layout::RhiBindingDesc;

/// binding 的数据来源
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum BindingSource {
    /// 当前 frame 的某个具名 uniform region，以 dynamic offset 访问
    FrameUniform(String),
    /// 某个具名 graph target 的 image
    GraphTarget(String),
    /// 由 pass 的 execute 闭包手动绑定（bindless、可变数量的纹理数组等）
    Manual,
}

#[derive(Clone, Debug)]
pub struct ShaderBindingDecl {
    pub binding: RhiBindingDesc,
    pub source: BindingSource,
}

/// 一个 shader 程序的注册信息，spirv 以文件路径的形式给出，
/// 内容视为不透明的字节 blob
pub struct ShaderDecl {
    pub spirv_path: PathBuf,
    pub bindings: Vec<ShaderBindingDecl>,
}

#[derive(Default)]
pub struct ShaderRegistry {
    shaders: IndexMap<String, ShaderDecl>,
}

impl ShaderRegistry {
    /// 重复注册同名 shader 属于配置错误
    pub fn register_shader(&mut self, name: &str, decl: ShaderDecl) {
        assert!(!self.shaders.contains_key(name), "shader '{}' is registered more than once", name);
        self.shaders.insert(name.to_string(), decl);
    }

    pub fn get(&self, name: &str) -> &ShaderDecl {
        self.shaders.get(name).unwrap_or_else(|| panic!("unknown shader '{}'", name))
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.shaders.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    fn dummy_decl() -> ShaderDecl {
        ShaderDecl {
            spirv_path: PathBuf::from("shaders/dummy.spv"),
            bindings: vec![ShaderBindingDecl {
                binding: RhiBindingDesc {
                    binding: 0,
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                    count: 1,
                    stages: vk::ShaderStageFlags::VERTEX,
                },
                source: BindingSource::FrameUniform("per-object".to_string()),
            }],
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ShaderRegistry::default();
        registry.register_shader("phong", dummy_decl());
        assert!(registry.contains("phong"));
        assert_eq!(registry.get("phong").bindings.len(), 1);
    }

    #[test]
    #[should_panic(expected = "registered more than once")]
    fn test_duplicate_shader_panics() {
        let mut registry = ShaderRegistry::default();
        registry.register_shader("phong", dummy_decl());
        registry.register_shader("phong", dummy_decl());
    }
}
