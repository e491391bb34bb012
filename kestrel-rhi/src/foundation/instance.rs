use std::ffi::{CStr, CString, c_char};

use ash::vk;
use itertools::Itertools;

use crate::foundation::debug_utils::RhiDebugUtils;

pub struct RhiInstance {
    /// 仅仅是函数指针加上一个裸 handle，生命周期由 Rhi 手动控制
    pub(crate) handle: ash::Instance,
}

impl RhiInstance {
    /// 设置所需的 layers 和 extensions，创建 vk instance
    pub fn new(vk_entry: &ash::Entry, app_name: String, extra_instance_exts: Vec<&'static CStr>) -> Self {
        let app_name = CString::new(app_name.as_str()).unwrap();
        let engine_name = CString::new("Kestrel").unwrap();
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3) // 版本过低时，有些函数无法正确加载
            .application_name(app_name.as_ref())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name.as_ref())
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let enabled_extensions = Self::get_extensions(&extra_instance_exts);
        let mut enabled_extensions_str = String::new();
        for ext in &enabled_extensions {
            enabled_extensions_str.push_str(&format!("\n\t{:?}", unsafe { CStr::from_ptr(*ext) }));
        }
        log::info!("instance extensions: {}", enabled_extensions_str);

        let enabled_layers = Self::get_layers();
        let mut enabled_layers_str = String::new();
        for layer in &enabled_layers {
            enabled_layers_str.push_str(&format!("\n\t{:?}", unsafe { CStr::from_ptr(*layer) }));
        }
        log::info!("instance layers: {}", enabled_layers_str);

        let mut instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&enabled_extensions)
            .enabled_layer_names(&enabled_layers);

        // 为 instance 的创建过程也挂上 debug messenger
        let mut debug_utils_messenger_ci = RhiDebugUtils::debug_utils_messenger_ci();
        instance_ci = instance_ci.push_next(&mut debug_utils_messenger_ci);

        let handle = unsafe { vk_entry.create_instance(&instance_ci, None).unwrap() };

        Self { handle }
    }

    pub fn destroy(self) {
        log::info!("Destroying RhiInstance");
        unsafe {
            self.handle.destroy_instance(None);
        }
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.handle
    }

    #[inline]
    pub fn vk_instance(&self) -> vk::Instance {
        self.handle.handle()
    }

    fn get_extensions(extra_exts: &[&'static CStr]) -> Vec<*const c_char> {
        let mut exts = vec![ash::ext::debug_utils::NAME, ash::khr::surface::NAME];
        exts.extend_from_slice(extra_exts);
        exts.into_iter().map(|e| e.as_ptr()).collect_vec()
    }

    fn get_layers() -> Vec<*const c_char> {
        #[cfg(debug_assertions)]
        {
            vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
        }
        #[cfg(not(debug_assertions))]
        {
            vec![]
        }
    }
}
