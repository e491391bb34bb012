use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::foundation::instance::RhiInstance;

/// # destroy
///
/// 需要在 instance 销毁之前销毁，依靠 Rhi 的销毁顺序保证
pub struct RhiSurface {
    handle: vk::SurfaceKHR,
    surface_pf: ash::khr::surface::Instance,
}

impl Drop for RhiSurface {
    fn drop(&mut self) {
        unsafe {
            self.surface_pf.destroy_surface(self.handle, None);
        }
    }
}

impl RhiSurface {
    pub fn new(
        vk_entry: &ash::Entry,
        instance: &RhiInstance,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> Self {
        let handle = unsafe {
            ash_window::create_surface(vk_entry, instance.handle(), display_handle, window_handle, None).unwrap()
        };
        let surface_pf = ash::khr::surface::Instance::new(vk_entry, instance.handle());

        Self { handle, surface_pf }
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn surface_pf(&self) -> &ash::khr::surface::Instance {
        &self.surface_pf
    }
}
