//! Ray Tracing 所需的加速结构

use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::commands::command_buffer::RhiCommandBuffer;
use crate::foundation::device::RhiDevice;
use crate::resources::buffer::RhiBuffer;
use crate::rhi::Rhi;

pub struct RhiBlasInput<'a> {
    pub geometry: vk::AccelerationStructureGeometryKHR<'a>,
    pub range: vk::AccelerationStructureBuildRangeInfoKHR,
}

pub struct RhiAcceleration {
    handle: vk::AccelerationStructureKHR,
    _buffer: RhiBuffer,

    /// 构建时使用的 flags，refit 时必须原样传回 driver
    build_flags: vk::BuildAccelerationStructureFlagsKHR,

    device: Rc<RhiDevice>,
}

impl Drop for RhiAcceleration {
    fn drop(&mut self) {
        unsafe {
            self.device.acceleration_structure_pf().destroy_acceleration_structure(self.handle, None);
        }
    }
}

impl RhiAcceleration {
    /// 同步构建 blas
    ///
    /// # 构建过程
    ///
    /// 1. 查询构建 blas 所需的尺寸
    /// 2. 创建 blas buffer 与 scratch buffer
    /// 3. 在 compute queue 上构建并阻塞等待
    ///
    /// 需要支持 refit 的 blas，调用方在 build_flags 中传入 ALLOW_UPDATE
    pub fn build_blas_sync(
        rhi: &Rhi,
        blas_inputs: &[RhiBlasInput],
        build_flags: vk::BuildAccelerationStructureFlagsKHR,
        debug_name: impl AsRef<str>,
    ) -> Self {
        let geometries = blas_inputs.iter().map(|input| input.geometry).collect_vec();
        let range_infos = blas_inputs.iter().map(|input| input.range).collect_vec();
        let max_primitives = blas_inputs.iter().map(|input| input.range.primitive_count).collect_vec();

        let build_flags = build_flags | vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE;

        // 使用部分完整的 BuildGeometryInfo 来查询所需的资源大小
        let mut build_geometry_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(build_flags)
            .geometries(&geometries)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD);

        let size_info = unsafe {
            let mut size_info = vk::AccelerationStructureBuildSizesInfoKHR::default();
            rhi.device.acceleration_structure_pf().get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &build_geometry_info,
                // 每一个 geometry 里面的最大 primitive 数量
                &max_primitives,
                &mut size_info,
            );
            size_info
        };

        let acceleration = Self::new(
            rhi,
            size_info.acceleration_structure_size,
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            build_flags,
            &format!("{}-blas", debug_name.as_ref()),
        );

        // scratch buffer 是每次 build 临时的，build 完成后随 drop 回收
        let scratch_buffer = RhiBuffer::new_acceleration_scratch_buffer(
            rhi,
            size_info.build_scratch_size,
            format!("{}-blas-scratch-buffer", debug_name.as_ref()),
        );

        build_geometry_info.dst_acceleration_structure = acceleration.handle;
        build_geometry_info.scratch_data = vk::DeviceOrHostAddressKHR {
            device_address: scratch_buffer.device_address(rhi),
        };

        RhiCommandBuffer::one_time_exec(
            rhi.device.clone(),
            rhi.temp_compute_command_pool.clone(),
            &rhi.compute_queue,
            |cmd| {
                cmd.build_acceleration_structure(&build_geometry_info, &range_infos);
            },
            "build-blas",
        );

        acceleration
    }

    /// 对已有的 blas 做 refit，顶点更新而拓扑不变时使用
    ///
    /// 要求：构建时带有 ALLOW_UPDATE，且 geometry 的数量和 primitive
    /// 数量与初次构建一致
    pub fn refit_blas_sync(&self, rhi: &Rhi, blas_inputs: &[RhiBlasInput], debug_name: impl AsRef<str>) {
        assert!(
            self.build_flags.contains(vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE),
            "blas {} was not built with ALLOW_UPDATE, cannot refit",
            debug_name.as_ref()
        );

        let geometries = blas_inputs.iter().map(|input| input.geometry).collect_vec();
        let range_infos = blas_inputs.iter().map(|input| input.range).collect_vec();
        let max_primitives = blas_inputs.iter().map(|input| input.range.primitive_count).collect_vec();

        let mut build_geometry_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(self.build_flags)
            .geometries(&geometries)
            .mode(vk::BuildAccelerationStructureModeKHR::UPDATE);

        let size_info = unsafe {
            let mut size_info = vk::AccelerationStructureBuildSizesInfoKHR::default();
            rhi.device.acceleration_structure_pf().get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &build_geometry_info,
                &max_primitives,
                &mut size_info,
            );
            size_info
        };

        let scratch_buffer = RhiBuffer::new_acceleration_scratch_buffer(
            rhi,
            size_info.update_scratch_size,
            format!("{}-blas-refit-scratch-buffer", debug_name.as_ref()),
        );

        // refit 时 src 和 dst 是同一个加速结构
        build_geometry_info.src_acceleration_structure = self.handle;
        build_geometry_info.dst_acceleration_structure = self.handle;
        build_geometry_info.scratch_data = vk::DeviceOrHostAddressKHR {
            device_address: scratch_buffer.device_address(rhi),
        };

        RhiCommandBuffer::one_time_exec(
            rhi.device.clone(),
            rhi.temp_compute_command_pool.clone(),
            &rhi.compute_queue,
            |cmd| {
                cmd.build_acceleration_structure(&build_geometry_info, &range_infos);
            },
            "refit-blas",
        );
    }

    /// 同步构建 tlas
    ///
    /// # 构建过程
    ///
    /// 1. 将 instance 数据上传到 device buffer
    /// 2. 查询构建 tlas 所需的尺寸
    /// 3. 构建 tlas
    pub fn build_tlas_sync(
        rhi: &Rhi,
        instances: &[vk::AccelerationStructureInstanceKHR],
        build_flags: vk::BuildAccelerationStructureFlagsKHR,
        debug_name: impl AsRef<str>,
    ) -> Self {
        let mut instance_buffer = RhiBuffer::new_acceleration_instance_buffer(
            rhi,
            size_of_val(instances) as vk::DeviceSize,
            format!("{}-instance-buffer", debug_name.as_ref()),
        );
        instance_buffer.transfer_data_sync(rhi, instances);

        let geometry = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::INSTANCES)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                instances: vk::AccelerationStructureGeometryInstancesDataKHR::default()
                    // true: data 是 &[vk::AccelerationStructureInstanceKHR]
                    // false: data 是 &[&vk::AccelerationStructureInstanceKHR]
                    .array_of_pointers(false)
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: instance_buffer.device_address(rhi),
                    }),
            });
        let range_info = vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(instances.len() as u32);

        let build_flags = build_flags | vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE;
        let mut build_geometry_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .flags(build_flags)
            .geometries(std::slice::from_ref(&geometry));

        let size_info = unsafe {
            let mut size_info = vk::AccelerationStructureBuildSizesInfoKHR::default();
            rhi.device.acceleration_structure_pf().get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &build_geometry_info,
                &[instances.len() as u32],
                &mut size_info,
            );
            size_info
        };

        let acceleration = Self::new(
            rhi,
            size_info.acceleration_structure_size,
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            build_flags,
            &format!("{}-tlas", debug_name.as_ref()),
        );

        let scratch_buffer = RhiBuffer::new_acceleration_scratch_buffer(
            rhi,
            size_info.build_scratch_size,
            format!("{}-tlas-scratch-buffer", debug_name.as_ref()),
        );

        build_geometry_info.dst_acceleration_structure = acceleration.handle;
        build_geometry_info.scratch_data.device_address = scratch_buffer.device_address(rhi);

        RhiCommandBuffer::one_time_exec(
            rhi.device.clone(),
            rhi.temp_compute_command_pool.clone(),
            &rhi.compute_queue,
            |cmd| {
                cmd.build_acceleration_structure(&build_geometry_info, std::slice::from_ref(&range_info));
            },
            "build-tlas",
        );

        acceleration
    }

    /// 创建 AccelerationStructure 以及 buffer
    fn new(
        rhi: &Rhi,
        size: vk::DeviceSize,
        ty: vk::AccelerationStructureTypeKHR,
        build_flags: vk::BuildAccelerationStructureFlagsKHR,
        debug_name: &str,
    ) -> Self {
        let buffer = RhiBuffer::new_acceleration_buffer(rhi, size, debug_name);

        let create_info =
            vk::AccelerationStructureCreateInfoKHR::default().ty(ty).size(size).buffer(buffer.handle());

        let handle = unsafe {
            rhi.device.acceleration_structure_pf().create_acceleration_structure(&create_info, None).unwrap()
        };
        rhi.device.debug_utils().set_object_debug_name(handle, debug_name);

        Self {
            handle,
            _buffer: buffer,
            build_flags,
            device: rhi.device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.handle
    }

    /// 获取加速结构的 device address，tlas 需要通过这个地址被 shader 引用
    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        unsafe {
            self.device.acceleration_structure_pf().get_acceleration_structure_device_address(
                &vk::AccelerationStructureDeviceAddressInfoKHR::default().acceleration_structure(self.handle),
            )
        }
    }
}
