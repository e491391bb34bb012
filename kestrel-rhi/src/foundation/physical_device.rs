use std::ffi::CStr;

use ash::vk;
use itertools::Itertools;

/// 表示一张物理显卡
pub struct RhiPhysicalDevice {
    pub handle: vk::PhysicalDevice,

    /// 当前 gpu 的基础属性
    pub basic_props: vk::PhysicalDeviceProperties,

    /// 当前 gpu 的加速结构属性
    pub acc_props: vk::PhysicalDeviceAccelerationStructurePropertiesKHR<'static>,

    pub memory_properties: vk::PhysicalDeviceMemoryProperties,

    pub queue_family_properties: Vec<vk::QueueFamilyProperties>,
}

impl RhiPhysicalDevice {
    /// 优先选择独立显卡，如果没有则选择第一个可用的显卡
    pub fn new_discrete_physical_device(instance: &ash::Instance) -> Self {
        unsafe {
            instance
                .enumerate_physical_devices()
                .unwrap()
                .iter()
                .map(|pdevice| RhiPhysicalDevice::new(*pdevice, instance))
                .find_or_first(RhiPhysicalDevice::is_discrete_gpu)
                .unwrap()
        }
    }

    pub fn new(pdevice: vk::PhysicalDevice, instance: &ash::Instance) -> Self {
        unsafe {
            let basic_props;
            let acc_props;
            {
                let mut pdevice_acc_props = vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
                let mut pdevice_props2 = vk::PhysicalDeviceProperties2::default().push_next(&mut pdevice_acc_props);
                instance.get_physical_device_properties2(pdevice, &mut pdevice_props2);

                basic_props = pdevice_props2.properties;
                let physical_device_name = CStr::from_ptr(basic_props.device_name.as_ptr());
                log::info!("found gpu: {:?}", physical_device_name);

                pdevice_acc_props.p_next = std::ptr::null_mut();
                acc_props = pdevice_acc_props;
            }

            Self {
                memory_properties: instance.get_physical_device_memory_properties(pdevice),
                handle: pdevice,
                basic_props,
                acc_props,
                queue_family_properties: instance.get_physical_device_queue_family_properties(pdevice),
            }
        }
    }

    /// 当前 gpu 是否是独立显卡
    #[inline]
    pub fn is_discrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    /// 找到满足条件的 queue family 的 index
    pub fn find_queue_family_index(&self, queue_flags: vk::QueueFlags) -> Option<u32> {
        self.queue_family_properties
            .iter()
            .enumerate()
            .find(|(_, prop)| prop.queue_flags.contains(queue_flags))
            .map(|(index, _)| index as u32)
    }
}
