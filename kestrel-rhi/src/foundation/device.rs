use std::{ffi::CStr, ops::Deref, rc::Rc};

use ash::vk;
use itertools::Itertools;

use crate::commands::command_queue::RhiQueueFamily;
use crate::foundation::{debug_utils::RhiDebugUtils, instance::RhiInstance, physical_device::RhiPhysicalDevice};

pub struct RhiDevice {
    pub handle: ash::Device,

    pub pdevice: Rc<RhiPhysicalDevice>,

    pub graphics_queue_family: RhiQueueFamily,
    pub compute_queue_family: RhiQueueFamily,

    pub vk_acceleration_struct_pf: ash::khr::acceleration_structure::Device,

    pub debug_utils: Rc<RhiDebugUtils>,
}

impl Deref for RhiDevice {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl RhiDevice {
    pub fn new(vk_entry: &ash::Entry, instance: &RhiInstance, pdevice: Rc<RhiPhysicalDevice>) -> Self {
        let graphics_queue_family_index = pdevice
            .find_queue_family_index(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)
            .unwrap();
        let compute_queue_family_index = pdevice.find_queue_family_index(vk::QueueFlags::COMPUTE).unwrap();

        let queue_priorities = [1.0_f32];
        let mut queue_create_infos = vec![
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family_index)
                .queue_priorities(&queue_priorities),
        ];
        if compute_queue_family_index != graphics_queue_family_index {
            queue_create_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(compute_queue_family_index)
                    .queue_priorities(&queue_priorities),
            );
        }

        // device 所需的所有 extension
        let device_exts = Self::basic_device_exts().iter().map(|e| e.as_ptr()).collect_vec();
        let mut exts_str = String::new();
        for ext in &device_exts {
            exts_str.push_str(&format!("\n\t{:?}", unsafe { CStr::from_ptr(*ext) }));
        }
        log::info!("device exts: {}", exts_str);

        // device 所需的所有 features
        let mut all_features = vk::PhysicalDeviceFeatures2::default().features(Self::physical_device_basic_features());
        let mut physical_device_ext_features = Self::physical_device_extra_features();
        unsafe {
            physical_device_ext_features.iter_mut().for_each(|f| {
                let ptr = <*mut dyn vk::ExtendsPhysicalDeviceFeatures2>::cast::<vk::BaseOutStructure>(f.as_mut());
                (*ptr).p_next = all_features.p_next as _;
                all_features.p_next = ptr as _;
            });
        }

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_exts)
            .push_next(&mut all_features);

        let device = unsafe { instance.handle().create_device(pdevice.handle, &device_create_info, None).unwrap() };

        let debug_utils = Rc::new(RhiDebugUtils::new(vk_entry, instance.handle(), &device));

        let vk_acceleration_struct_pf = ash::khr::acceleration_structure::Device::new(instance.handle(), &device);

        Self {
            handle: device,
            pdevice: pdevice.clone(),
            graphics_queue_family: RhiQueueFamily {
                name: "graphics".to_string(),
                queue_family_index: graphics_queue_family_index,
                queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
            },
            compute_queue_family: RhiQueueFamily {
                name: "compute".to_string(),
                queue_family_index: compute_queue_family_index,
                queue_flags: vk::QueueFlags::COMPUTE,
            },
            vk_acceleration_struct_pf,
            debug_utils,
        }
    }

    /// 必要的 physical device core features
    fn physical_device_basic_features() -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true).independent_blend(true)
    }

    /// 必要的 physical device extension features
    fn physical_device_extra_features() -> Vec<Box<dyn vk::ExtendsPhysicalDeviceFeatures2>> {
        vec![
            Box::new(vk::PhysicalDeviceBufferDeviceAddressFeatures::default().buffer_device_address(true)),
            Box::new(vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default().acceleration_structure(true)),
            Box::new(vk::PhysicalDeviceRayQueryFeaturesKHR::default().ray_query(true)),
            Box::new(vk::PhysicalDeviceSynchronization2Features::default().synchronization2(true)),
        ]
    }

    /// 必要的 device extensions
    fn basic_device_exts() -> Vec<&'static CStr> {
        vec![
            // swapchain
            ash::khr::swapchain::NAME,
            // 加速结构以及 ray query
            ash::khr::acceleration_structure::NAME,
            ash::khr::deferred_host_operations::NAME,
            ash::khr::ray_query::NAME,
            ash::khr::buffer_device_address::NAME,
        ]
    }
}

impl RhiDevice {
    /// 需要在 instance 销毁之前调用，调用前确保所有 device 上的资源都已释放
    pub fn destroy(self) {
        log::info!("Destroying RhiDevice");
        // messenger 是 instance 级别的对象，在 device 销毁前释放
        drop(self.debug_utils);
        unsafe {
            self.handle.destroy_device(None);
        }
    }

    #[inline]
    pub fn debug_utils(&self) -> &RhiDebugUtils {
        &self.debug_utils
    }

    #[inline]
    pub fn acceleration_structure_pf(&self) -> &ash::khr::acceleration_structure::Device {
        &self.vk_acceleration_struct_pf
    }

    /// 当 uniform buffer 以 dynamic offset 的方式使用时，offset 必须是这个值的整数倍
    ///
    /// 注：这个值一定是 power of 2
    #[inline]
    pub fn min_ubo_offset_align(&self) -> vk::DeviceSize {
        self.pdevice.basic_props.limits.min_uniform_buffer_offset_alignment
    }

    #[inline]
    pub fn create_render_pass(&self, render_pass_ci: &vk::RenderPassCreateInfo, debug_name: &str) -> vk::RenderPass {
        let render_pass = unsafe { self.handle.create_render_pass(render_pass_ci, None).unwrap() };
        self.debug_utils.set_object_debug_name(render_pass, debug_name);
        render_pass
    }

    #[inline]
    pub fn create_framebuffer(&self, framebuffer_ci: &vk::FramebufferCreateInfo, debug_name: &str) -> vk::Framebuffer {
        let framebuffer = unsafe { self.handle.create_framebuffer(framebuffer_ci, None).unwrap() };
        self.debug_utils.set_object_debug_name(framebuffer, debug_name);
        framebuffer
    }
}
