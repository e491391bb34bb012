//! load 期的 GPU 上传入口
//!
//! 所有上传都走 stage buffer + 一次性提交并阻塞等待的路径，
//! 只适合加载期调用，绝不能出现在逐帧路径上

use ash::vk;

use kestrel_rhi::resources::buffer::RhiBuffer;
use kestrel_rhi::resources::image::{RhiImage2D, RhiImageDesc, RhiImageKind, RhiTexture};
use kestrel_rhi::rhi::Rhi;

use crate::scene_interface::{TexturePixels, Topology, Vertex, VertexArrays};

/// 上传完成后的 GPU 侧几何体
pub struct GpuGeometry {
    pub vertex_buffer: RhiBuffer,
    pub index_buffer: RhiBuffer,
    pub vertex_count: u32,
    pub index_count: u32,
    pub topology: Topology,
}

impl GpuGeometry {
    #[inline]
    pub fn vertex_stride(&self) -> vk::DeviceSize {
        size_of::<Vertex>() as vk::DeviceSize
    }
}

/// 将顶点与索引数据上传到 device local buffer，阻塞直到传输完成
pub fn upload_vertex_arrays(rhi: &Rhi, arrays: &VertexArrays, debug_name: &str) -> GpuGeometry {
    assert!(!arrays.vertices.is_empty(), "geometry '{}' has no vertices", debug_name);
    assert!(!arrays.indices.is_empty(), "geometry '{}' has no indices", debug_name);

    let mut vertex_buffer = RhiBuffer::new_vertex_buffer(
        rhi,
        size_of_val(arrays.vertices.as_slice()),
        format!("{}-vertex-buffer", debug_name),
    );
    vertex_buffer.transfer_data_sync(rhi, &arrays.vertices);

    let mut index_buffer = RhiBuffer::new_index_buffer(
        rhi,
        size_of_val(arrays.indices.as_slice()),
        format!("{}-index-buffer", debug_name),
    );
    index_buffer.transfer_data_sync(rhi, &arrays.indices);

    log::info!(
        "geometry '{}' uploaded: {} vertices, {} indices",
        debug_name,
        arrays.vertices.len(),
        arrays.indices.len()
    );

    GpuGeometry {
        vertex_buffer,
        index_buffer,
        vertex_count: arrays.vertices.len() as u32,
        index_count: arrays.indices.len() as u32,
        topology: arrays.topology,
    }
}

/// 将像素数据上传为 sampled texture，阻塞直到传输完成
pub fn upload_texture_image(rhi: &Rhi, pixels: &TexturePixels, debug_name: &str) -> RhiTexture {
    let image = RhiImage2D::new(
        rhi,
        pixels.extent,
        &RhiImageDesc {
            kind: RhiImageKind::Tex2D,
            format: pixels.format,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            mip_cap: 1,
        },
        false,
        debug_name,
    );
    image.upload_pixels(rhi, &pixels.pixels, debug_name);

    RhiTexture::new(rhi, image, vk::ImageAspectFlags::COLOR, debug_name)
}
