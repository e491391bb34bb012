//! descriptor set 的池化分配
//!
//! 每个 pool 固定容量，分配失败时换一个新 pool 重试一次。
//! reset 以 pool 为粒度，不支持回收单个 set

use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::descriptors::layout::RhiDescriptorSetLayout;
use crate::foundation::device::RhiDevice;

/// 每个 pool 可分配的 set 数量
const SETS_PER_POOL: u32 = 512;

/// 每种 descriptor 类型相对于 set 数量的配比
const POOL_SIZE_RATIOS: &[(vk::DescriptorType, f32)] = &[
    (vk::DescriptorType::UNIFORM_BUFFER, 2.0),
    (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1.0),
    (vk::DescriptorType::STORAGE_BUFFER, 2.0),
    (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
    (vk::DescriptorType::SAMPLED_IMAGE, 4.0),
    (vk::DescriptorType::STORAGE_IMAGE, 1.0),
    (vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, 0.5),
];

pub struct RhiDescriptorPool {
    handle: vk::DescriptorPool,
    device: Rc<RhiDevice>,
}

impl Drop for RhiDescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.handle, None);
        }
    }
}

impl RhiDescriptorPool {
    pub fn new(
        device: Rc<RhiDevice>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        debug_name: &str,
    ) -> Self {
        let pool_ci = vk::DescriptorPoolCreateInfo::default().max_sets(max_sets).pool_sizes(pool_sizes);

        let handle = unsafe { device.create_descriptor_pool(&pool_ci, None).unwrap() };
        device.debug_utils().set_object_debug_name(handle, debug_name);
        Self { handle, device }
    }

    /// 按固定配比建一个标准容量的 pool
    fn new_default(device: Rc<RhiDevice>, debug_name: &str) -> Self {
        let pool_sizes = POOL_SIZE_RATIOS
            .iter()
            .map(|(ty, ratio)| vk::DescriptorPoolSize {
                ty: *ty,
                descriptor_count: (SETS_PER_POOL as f32 * ratio) as u32,
            })
            .collect_vec();
        Self::new(device, SETS_PER_POOL, &pool_sizes, debug_name)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    fn reset(&self) {
        unsafe {
            self.device.reset_descriptor_pool(self.handle, vk::DescriptorPoolResetFlags::empty()).unwrap();
        }
    }
}

/// 会自动增长的 descriptor set 分配器
pub struct RhiDescriptorAllocator {
    current: Option<Rc<RhiDescriptorPool>>,
    used_pools: Vec<Rc<RhiDescriptorPool>>,
    free_pools: Vec<Rc<RhiDescriptorPool>>,

    /// 只用于给新 pool 命名
    pool_count: u32,

    device: Rc<RhiDevice>,
}

impl RhiDescriptorAllocator {
    pub fn new(device: Rc<RhiDevice>) -> Self {
        Self {
            current: None,
            used_pools: vec![],
            free_pools: vec![],
            pool_count: 0,
            device,
        }
    }

    fn grab_pool(&mut self) -> Rc<RhiDescriptorPool> {
        if let Some(pool) = self.free_pools.pop() {
            return pool;
        }
        self.pool_count += 1;
        Rc::new(RhiDescriptorPool::new_default(self.device.clone(), &format!("descriptor-pool-{}", self.pool_count)))
    }

    /// 从当前 pool 分配一个 set；pool 容量耗尽时换新 pool 重试一次，
    /// 第二次失败视为致命错误
    pub fn allocate(&mut self, layout: &RhiDescriptorSetLayout, debug_name: &str) -> vk::DescriptorSet {
        if self.current.is_none() {
            let pool = self.grab_pool();
            self.used_pools.push(pool.clone());
            self.current = Some(pool);
        }

        let set = match Self::try_allocate(&self.device, self.current.as_ref().unwrap(), layout) {
            Ok(sets) => sets[0],
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                // 换一个新 pool 重试一次，第二次失败视为致命错误
                let pool = self.grab_pool();
                self.used_pools.push(pool.clone());
                self.current = Some(pool);
                Self::try_allocate(&self.device, self.current.as_ref().unwrap(), layout).unwrap()[0]
            }
            Err(e) => panic!("failed to allocate descriptor set {}: {:?}", debug_name, e),
        };

        self.device.debug_utils().set_object_debug_name(set, debug_name);
        set
    }

    fn try_allocate(
        device: &RhiDevice,
        pool: &RhiDescriptorPool,
        layout: &RhiDescriptorSetLayout,
    ) -> Result<Vec<vk::DescriptorSet>, vk::Result> {
        let layouts = [layout.handle()];
        let alloc_info =
            vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool.handle()).set_layouts(&layouts);
        unsafe { device.allocate_descriptor_sets(&alloc_info) }
    }

    /// 回收所有 pool，之前分配出去的 set 全部失效
    pub fn reset_all(&mut self) {
        for pool in self.used_pools.drain(..) {
            pool.reset();
            self.free_pools.push(pool);
        }
        self.current = None;
    }
}
