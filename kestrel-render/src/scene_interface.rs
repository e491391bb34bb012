//! 与 scene graph / asset loader 协作方之间的数据边界
//!
//! 场景层只向渲染核心提供这些定义良好的纯数据，
//! 渲染核心不感知场景树的结构

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// 几何体的图元类型标签
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Topology {
    Triangles,
    Lines,
    /// aabb 形式的程序化图元
    Procedural,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct Vertex {
    pub position: Vec3,
    pub _pad0: f32,
    pub normal: Vec3,
    pub _pad1: f32,
    pub uv: Vec2,
    pub _pad2: Vec2,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            _pad0: 0.0,
            normal,
            _pad1: 0.0,
            uv,
            _pad2: Vec2::ZERO,
        }
    }
}

/// 场景层提供的 CPU 侧顶点数据
pub struct VertexArrays {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub topology: Topology,
}

/// 场景层提供的 CPU 侧纹理数据
pub struct TexturePixels {
    pub pixels: Vec<u8>,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
}

/// 材质种类的封闭枚举，GPU 侧统一成一个参数块
#[derive(Clone, Copy, Debug)]
pub enum MaterialKind {
    Lambert { diffuse: Vec4 },
    Phong { diffuse: Vec4, specular: Vec4, shininess: f32 },
}

impl MaterialKind {
    pub fn to_gpu(self) -> GpuMaterial {
        match self {
            MaterialKind::Lambert { diffuse } => GpuMaterial {
                diffuse,
                specular: Vec4::ZERO,
                params: Vec4::new(0.0, 0.0, 0.0, 0.0),
            },
            MaterialKind::Phong {
                diffuse,
                specular,
                shininess,
            } => GpuMaterial {
                diffuse,
                specular,
                params: Vec4::new(shininess, 0.0, 0.0, 1.0),
            },
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct GpuMaterial {
    pub diffuse: Vec4,
    pub specular: Vec4,
    /// x: shininess, w: material kind
    pub params: Vec4,
}

/// 光源种类的封闭枚举
#[derive(Clone, Copy, Debug)]
pub enum LightKind {
    Directional { direction: Vec3, color: Vec3 },
    Point { position: Vec3, color: Vec3, radius: f32 },
}

impl LightKind {
    pub fn to_gpu(self) -> GpuLight {
        match self {
            LightKind::Directional { direction, color } => GpuLight {
                position: Vec4::new(direction.x, direction.y, direction.z, 0.0),
                color: Vec4::new(color.x, color.y, color.z, 0.0),
            },
            LightKind::Point {
                position,
                color,
                radius,
            } => GpuLight {
                position: Vec4::new(position.x, position.y, position.z, 1.0),
                color: Vec4::new(color.x, color.y, color.z, radius),
            },
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct GpuLight {
    /// w = 0 表示方向光（xyz 是方向），w = 1 表示点光（xyz 是位置）
    pub position: Vec4,
    /// 点光的 w 是半径
    pub color: Vec4,
}

/// 每个 drawable 一个 slot 的 per-object 数据
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct GpuPerObject {
    pub model: Mat4,
    pub material: GpuMaterial,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_is_16_byte_aligned() {
        assert_eq!(size_of::<Vertex>() % 16, 0);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 16);
        assert_eq!(std::mem::offset_of!(Vertex, uv), 32);
    }

    #[test]
    fn test_light_kind_tagging() {
        let directional = LightKind::Directional {
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
        }
        .to_gpu();
        assert_eq!(directional.position.w, 0.0);

        let point = LightKind::Point {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            radius: 5.0,
        }
        .to_gpu();
        assert_eq!(point.position.w, 1.0);
        assert_eq!(point.color.w, 5.0);
    }
}
