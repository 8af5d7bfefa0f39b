//! 相机：由视图投影矩阵和逆变换矩阵构造

use glam::{Mat4, Quat, Vec3};

/// 每个视图的相机 Uniform 槽步长（满足动态偏移对齐）
pub const CAMERA_SLOT_STRIDE: u64 = 256;

/// 相机 Uniform（对应 WGSL `Camera`）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub right: [f32; 4],
    pub up: [f32; 4],
    pub position: [f32; 4],
    pub forward: [f32; 4],
}

/// 渲染相机
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// 投影矩阵
    pub projection: Mat4,
    /// 视图矩阵（世界 → 相机）
    pub view: Mat4,
    /// 世界变换（相机 → 世界）
    pub world: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    /// 由头显视图的列主序投影矩阵和逆变换矩阵构造
    pub fn from_view_matrices(projection: &[f32; 16], inverse_transform: &[f32; 16]) -> Self {
        let view = Mat4::from_cols_array(inverse_transform);
        Self {
            projection: Mat4::from_cols_array(projection),
            view,
            world: view.inverse(),
        }
    }

    /// 窗口模式的透视相机
    pub fn look_at(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        Self {
            projection: Mat4::perspective_rh(fov_y, aspect.max(1e-4), near, far),
            view,
            world: view.inverse(),
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    pub fn position(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }

    pub fn orientation(&self) -> Quat {
        let (_, rotation, _) = self.world.to_scale_rotation_translation();
        rotation
    }

    pub fn right(&self) -> Vec3 {
        self.world.x_axis.truncate().normalize_or_zero()
    }

    pub fn up(&self) -> Vec3 {
        self.world.y_axis.truncate().normalize_or_zero()
    }

    /// 前向（-Z）
    pub fn forward(&self) -> Vec3 {
        -self.world.z_axis.truncate().normalize_or_zero()
    }

    pub fn uniforms(&self) -> CameraUniforms {
        CameraUniforms {
            view_proj: self.view_projection().to_cols_array_2d(),
            right: self.right().extend(0.0).to_array(),
            up: self.up().extend(0.0).to_array(),
            position: self.position().extend(1.0).to_array(),
            forward: self.forward().extend(0.0).to_array(),
        }
    }
}
