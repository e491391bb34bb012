use ash::vk;

use crate::foundation::device::RhiDevice;

enum WriteInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

struct PendingWrite {
    set: vk::DescriptorSet,
    binding: u32,
    descriptor_type: vk::DescriptorType,
    info: WriteInfo,
}

/// 批量收集 descriptor write，commit 时一次性提交给 driver
#[derive(Default)]
pub struct RhiDescriptorWriter {
    writes: Vec<PendingWrite>,
}

impl RhiDescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_buffer(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> &mut Self {
        self.writes.push(PendingWrite {
            set,
            binding,
            descriptor_type,
            info: WriteInfo::Buffer(vk::DescriptorBufferInfo {
                buffer,
                offset,
                range,
            }),
        });
        self
    }

    pub fn write_image(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        image_view: vk::ImageView,
        sampler: vk::Sampler,
        image_layout: vk::ImageLayout,
    ) -> &mut Self {
        self.writes.push(PendingWrite {
            set,
            binding,
            descriptor_type,
            info: WriteInfo::Image(vk::DescriptorImageInfo {
                sampler,
                image_view,
                image_layout,
            }),
        });
        self
    }

    /// 一次 `vkUpdateDescriptorSets` 提交所有积累的 write
    pub fn commit(self, device: &RhiDevice) {
        if self.writes.is_empty() {
            return;
        }

        // write 中的指针引用 pending 里的 info，pending 必须活到 update 调用结束
        let vk_writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|w| {
                let mut write = vk::WriteDescriptorSet::default()
                    .dst_set(w.set)
                    .dst_binding(w.binding)
                    .descriptor_type(w.descriptor_type);
                match &w.info {
                    WriteInfo::Buffer(info) => write = write.buffer_info(std::slice::from_ref(info)),
                    WriteInfo::Image(info) => write = write.image_info(std::slice::from_ref(info)),
                }
                write
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&vk_writes, &[]);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}
