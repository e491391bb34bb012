//! BLAS/TLAS 的生命周期管理
//!
//! blas 按几何体惰性构建；tlas 只在必要时重建：
//! 从未构建过、instance 数量变化、或调用方显式标脏

use std::collections::HashMap;

use ash::vk;
use glam::Mat4;
use itertools::Itertools;

use kestrel_rhi::raytracing::acceleration::{RhiAcceleration, RhiBlasInput};
use kestrel_rhi::rhi::Rhi;

use crate::scene_interface::Topology;
use crate::upload::GpuGeometry;

/// 调用方分配的几何体稳定 id
pub type GeometryId = u64;

/// tlas 中的一个 instance：一个 hittable 且 active 的 (mesh, geometry) 对
#[derive(Clone, Copy, Debug)]
pub struct SceneInstance {
    pub geometry_id: GeometryId,
    /// 引擎侧的 column-major 世界变换
    pub transform: Mat4,
}

/// column-major 的 Mat4 转成 driver instance 记录所需的 row-major 3x4
pub fn instance_transform(m: Mat4) -> vk::TransformMatrixKHR {
    let cols = m.to_cols_array();
    let mut matrix = [0.0f32; 12];
    for row in 0..3 {
        for col in 0..4 {
            matrix[row * 4 + col] = cols[col * 4 + row];
        }
    }
    vk::TransformMatrixKHR { matrix }
}

/// tlas 是否需要重建
///
/// `built_count` 为 None 表示从未构建过
#[inline]
pub fn tlas_needs_rebuild(built_count: Option<u32>, instance_count: u32, scene_dirty: bool) -> bool {
    match built_count {
        None => true,
        Some(count) => scene_dirty || count != instance_count,
    }
}

/// tlas 更新的决策结果
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TlasUpdatePlan {
    /// instance 集合与上次一致且未标脏
    Skip,
    /// 集合为空：只释放旧 tlas，不提交构建
    /// （instance buffer 不允许 size 为 0）
    Clear,
    Rebuild,
}

pub fn plan_tlas_update(built_count: Option<u32>, instance_count: u32, scene_dirty: bool) -> TlasUpdatePlan {
    if !tlas_needs_rebuild(built_count, instance_count, scene_dirty) {
        return TlasUpdatePlan::Skip;
    }
    if instance_count == 0 {
        TlasUpdatePlan::Clear
    } else {
        TlasUpdatePlan::Rebuild
    }
}

struct BlasEntry {
    accel: RhiAcceleration,
    dynamic: bool,
    primitive_count: u32,
}

#[derive(Default)]
pub struct AccelManager {
    blas: HashMap<GeometryId, BlasEntry>,

    tlas: Option<RhiAcceleration>,
    built_instance_count: Option<u32>,
    scene_dirty: bool,
}

impl AccelManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn tlas(&self) -> Option<&RhiAcceleration> {
        self.tlas.as_ref()
    }

    #[inline]
    pub fn has_blas(&self, id: GeometryId) -> bool {
        self.blas.contains_key(&id)
    }

    /// active 开关、transform 变化等影响 hittable 集合的事件发生后调用
    #[inline]
    pub fn mark_scene_dirty(&mut self) {
        self.scene_dirty = true;
    }

    /// 确保几何体的 blas 存在且是最新的
    ///
    /// - 不存在：构建；dynamic 的 blas 带 ALLOW_UPDATE
    /// - 已存在且 dynamic：refit（拓扑不变，只更新顶点）
    /// - 已存在且非 dynamic：从头重建
    pub fn ensure_blas(&mut self, rhi: &Rhi, id: GeometryId, geometry: &GpuGeometry, dynamic: bool) {
        assert!(
            geometry.topology == Topology::Triangles,
            "blas for geometry {} requires triangle topology, got {:?}",
            id,
            geometry.topology
        );

        if let Some(entry) = self.blas.get(&id) {
            if entry.dynamic {
                // refit 的前提是拓扑不变
                assert!(
                    entry.primitive_count == geometry.index_count / 3,
                    "geometry {} changed primitive count, refit is not valid",
                    id
                );
                let inputs = Self::blas_inputs(rhi, geometry);
                entry.accel.refit_blas_sync(rhi, &inputs, format!("geometry-{}", id));
                return;
            }
            // 非 dynamic 的重复请求：丢弃旧结构，从头重建
            self.blas.remove(&id);
        }

        let build_flags = if dynamic {
            vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE
        } else {
            vk::BuildAccelerationStructureFlagsKHR::empty()
        };
        let inputs = Self::blas_inputs(rhi, geometry);
        let accel = RhiAcceleration::build_blas_sync(rhi, &inputs, build_flags, format!("geometry-{}", id));

        self.blas.insert(
            id,
            BlasEntry {
                accel,
                dynamic,
                primitive_count: geometry.index_count / 3,
            },
        );
    }

    /// 必要时重建 tlas；instance 集合与上次一致且未标脏时直接跳过
    pub fn update_tlas(&mut self, rhi: &Rhi, instances: &[SceneInstance]) {
        match plan_tlas_update(self.built_instance_count, instances.len() as u32, self.scene_dirty) {
            TlasUpdatePlan::Skip => {
                log::trace!("tlas up to date, skipping rebuild");
                return;
            }
            TlasUpdatePlan::Clear => {
                self.tlas = None;
                self.built_instance_count = Some(0);
                self.scene_dirty = false;
                log::debug!("tlas cleared: no active instances");
                return;
            }
            TlasUpdatePlan::Rebuild => {}
        }

        let vk_instances = instances
            .iter()
            .enumerate()
            .map(|(idx, instance)| {
                let blas = self
                    .blas
                    .get(&instance.geometry_id)
                    .unwrap_or_else(|| panic!("tlas references geometry {} without a blas", instance.geometry_id));
                vk::AccelerationStructureInstanceKHR {
                    transform: instance_transform(instance.transform),
                    instance_custom_index_and_mask: vk::Packed24_8::new(idx as u32, 0xff),
                    instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
                        0,
                        vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw() as u8,
                    ),
                    acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
                        device_handle: blas.accel.device_address(),
                    },
                }
            })
            .collect_vec();

        // 旧 tlas 先释放再构建新的
        self.tlas = None;
        self.tlas = Some(RhiAcceleration::build_tlas_sync(
            rhi,
            &vk_instances,
            vk::BuildAccelerationStructureFlagsKHR::empty(),
            "scene",
        ));
        self.built_instance_count = Some(instances.len() as u32);
        self.scene_dirty = false;

        log::debug!("tlas rebuilt with {} instances", instances.len());
    }
}

// 构建 blas 的 geometry 描述
impl AccelManager {
    fn blas_inputs<'a>(rhi: &Rhi, geometry: &GpuGeometry) -> Vec<RhiBlasInput<'a>> {
        let triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::default()
            .vertex_format(vk::Format::R32G32B32_SFLOAT)
            .vertex_data(vk::DeviceOrHostAddressConstKHR {
                device_address: geometry.vertex_buffer.device_address(rhi),
            })
            .vertex_stride(geometry.vertex_stride())
            .max_vertex(geometry.vertex_count - 1)
            .index_type(vk::IndexType::UINT32)
            .index_data(vk::DeviceOrHostAddressConstKHR {
                device_address: geometry.index_buffer.device_address(rhi),
            });

        let vk_geometry = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .flags(vk::GeometryFlagsKHR::OPAQUE)
            .geometry(vk::AccelerationStructureGeometryDataKHR { triangles });

        let range = vk::AccelerationStructureBuildRangeInfoKHR::default()
            .primitive_count(geometry.index_count / 3);

        vec![RhiBlasInput {
            geometry: vk_geometry,
            range,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_tlas_rebuild_triggers() {
        // 从未构建过
        assert!(tlas_needs_rebuild(None, 0, false));
        assert!(tlas_needs_rebuild(None, 4, false));

        // 数量一致且未标脏：跳过
        assert!(!tlas_needs_rebuild(Some(4), 4, false));

        // 数量变化（增加或减少）都要重建
        assert!(tlas_needs_rebuild(Some(4), 5, false));
        assert!(tlas_needs_rebuild(Some(4), 3, false));

        // 显式标脏
        assert!(tlas_needs_rebuild(Some(4), 4, true));
    }

    #[test]
    fn test_tlas_empty_instance_set() {
        // 空场景不能提交构建，只清掉旧 tlas
        assert_eq!(plan_tlas_update(None, 0, false), TlasUpdatePlan::Clear);
        assert_eq!(plan_tlas_update(Some(3), 0, false), TlasUpdatePlan::Clear);
        assert_eq!(plan_tlas_update(Some(4), 0, true), TlasUpdatePlan::Clear);

        // 清空之后场景保持为空：什么都不做
        assert_eq!(plan_tlas_update(Some(0), 0, false), TlasUpdatePlan::Skip);

        // 空场景重新有了 instance：正常重建
        assert_eq!(plan_tlas_update(Some(0), 2, false), TlasUpdatePlan::Rebuild);
    }

    #[test]
    fn test_instance_transform_translation() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let t = instance_transform(m);
        // row-major 3x4：平移在每行的最后一列
        assert_eq!(t.matrix[3], 1.0);
        assert_eq!(t.matrix[7], 2.0);
        assert_eq!(t.matrix[11], 3.0);
        // 对角线
        assert_eq!(t.matrix[0], 1.0);
        assert_eq!(t.matrix[5], 1.0);
        assert_eq!(t.matrix[10], 1.0);
    }

    #[test]
    fn test_instance_transform_identity() {
        let t = instance_transform(Mat4::IDENTITY);
        let expected = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        assert_eq!(t.matrix, expected);
    }
}
