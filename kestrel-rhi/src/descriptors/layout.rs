//! descriptor set layout 的结构化缓存
//!
//! shader 反射或手写的 binding 表都会走到这里，结构相同的 layout
//! 只会创建一次，后续请求拿到的是同一个 `Rc`

use std::collections::HashMap;
use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::foundation::device::RhiDevice;

/// 单个 binding 的描述，不含 immutable sampler
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RhiBindingDesc {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

impl RhiBindingDesc {
    fn to_vk(self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding {
            binding: self.binding,
            descriptor_type: self.descriptor_type,
            descriptor_count: self.count,
            stage_flags: self.stages,
            ..Default::default()
        }
    }
}

/// layout 缓存的 key：binding 按照 index 排序后的规范形式
///
/// 调用方传入的 binding 顺序不影响 key，乱序声明的相同结构命中同一条缓存
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct RhiLayoutKey {
    bindings: Vec<RhiBindingDesc>,
}

impl RhiLayoutKey {
    /// binding index 重复属于配置错误，在这里就拦下，不留给 driver
    pub fn new(bindings: &[RhiBindingDesc]) -> Self {
        let bindings = bindings.iter().copied().sorted_by_key(|b| b.binding).collect_vec();
        for pair in bindings.windows(2) {
            assert!(
                pair[0].binding != pair[1].binding,
                "descriptor binding index {} is declared more than once",
                pair[0].binding
            );
        }
        Self { bindings }
    }

    #[inline]
    pub fn bindings(&self) -> &[RhiBindingDesc] {
        &self.bindings
    }
}

pub struct RhiDescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
    device: Rc<RhiDevice>,
}

impl Drop for RhiDescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.handle, None);
        }
    }
}

impl RhiDescriptorSetLayout {
    fn new(device: Rc<RhiDevice>, key: &RhiLayoutKey, debug_name: &str) -> Self {
        let bindings = key.bindings.iter().map(|b| b.to_vk()).collect_vec();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let handle = unsafe { device.create_descriptor_set_layout(&create_info, None).unwrap() };
        device.debug_utils().set_object_debug_name(handle, debug_name);
        Self { handle, device }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }
}

/// 以结构为 key 的 layout 缓存
///
/// # destroy
///
/// drop 时释放所有缓存的 layout，此时外部不能再持有 set
pub struct RhiDescriptorLayoutCache {
    cache: HashMap<RhiLayoutKey, Rc<RhiDescriptorSetLayout>>,
    device: Rc<RhiDevice>,
}

impl RhiDescriptorLayoutCache {
    pub fn new(device: Rc<RhiDevice>) -> Self {
        Self {
            cache: HashMap::new(),
            device,
        }
    }

    /// 结构相同的请求返回同一个 `Rc`，可以用指针相等判断命中
    pub fn get_or_create(&mut self, bindings: &[RhiBindingDesc], debug_name: &str) -> Rc<RhiDescriptorSetLayout> {
        let key = RhiLayoutKey::new(bindings);
        if let Some(layout) = self.cache.get(&key) {
            return layout.clone();
        }

        let layout = Rc::new(RhiDescriptorSetLayout::new(self.device.clone(), &key, debug_name));
        self.cache.insert(key, layout.clone());
        layout
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(index: u32, ty: vk::DescriptorType, stages: vk::ShaderStageFlags) -> RhiBindingDesc {
        RhiBindingDesc {
            binding: index,
            descriptor_type: ty,
            count: 1,
            stages,
        }
    }

    #[test]
    fn test_layout_key_order_independent() {
        let a = RhiLayoutKey::new(&[
            binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
            binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
        ]);
        let b = RhiLayoutKey::new(&[
            binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
            binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
        ]);
        assert_eq!(a, b);

        let hash = |key: &RhiLayoutKey| {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            key.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn test_layout_key_distinguishes_structure() {
        let a = RhiLayoutKey::new(&[binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX)]);
        let b = RhiLayoutKey::new(&[binding(0, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX)]);
        let c = RhiLayoutKey::new(&[binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::FRAGMENT)]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    #[should_panic(expected = "declared more than once")]
    fn test_layout_key_rejects_duplicate_binding_index() {
        RhiLayoutKey::new(&[
            binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
            binding(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
        ]);
    }

    #[test]
    fn test_layout_key_distinguishes_count() {
        let a = RhiLayoutKey::new(&[RhiBindingDesc {
            binding: 0,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            count: 1,
            stages: vk::ShaderStageFlags::FRAGMENT,
        }]);
        let b = RhiLayoutKey::new(&[RhiBindingDesc {
            binding: 0,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            count: 4,
            stages: vk::ShaderStageFlags::FRAGMENT,
        }]);
        assert_ne!(a, b);
    }
}
