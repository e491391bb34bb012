use std::rc::Rc;

use ash::vk;

use crate::commands::command_queue::RhiQueueFamily;
use crate::foundation::device::RhiDevice;

/// command pool 是和 queue family 绑定的，而不是和 queue 绑定的
pub struct RhiCommandPool {
    handle: vk::CommandPool,
    _queue_family: RhiQueueFamily,

    device: Rc<RhiDevice>,
    _debug_name: String,
}
impl Drop for RhiCommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.handle, None);
        }
    }
}
impl RhiCommandPool {
    #[inline]
    pub fn new(
        device: Rc<RhiDevice>,
        queue_family: RhiQueueFamily,
        flags: vk::CommandPoolCreateFlags,
        debug_name: &str,
    ) -> Self {
        let pool = unsafe {
            device
                .create_command_pool(
                    &vk::CommandPoolCreateInfo::default()
                        .queue_family_index(queue_family.queue_family_index)
                        .flags(flags),
                    None,
                )
                .unwrap()
        };
        device.debug_utils().set_object_debug_name(pool, debug_name);

        Self {
            handle: pool,
            _queue_family: queue_family,
            device,
            _debug_name: debug_name.to_string(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }
}
