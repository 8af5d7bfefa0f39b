//! 发射器参数与 GPU 数据布局
//!
//! `EmitterParams` 是控制线程上的标量影子值；每帧打包为 `SimUniforms`
//! 单向推送到设备，设备端状态从不回读。

use crate::core::error::{RenderError, RenderResult};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// 初始化时的负寿命哨兵
pub const DEAD_LIFE: f32 = -1.0;
/// 初始化时粒子停放位置（远离可见区域）
pub const PARKED_POSITION: [f32; 3] = [0.0, -10000.0, 0.0];
/// 湍流权重中的寿命偏置 ε
pub const LIFE_EPSILON: f32 = 0.1;
/// 连线透明度的幂指数
pub const LINK_ALPHA_EXPONENT: f32 = 0.8;
/// 每个槽位的连线顶点数（两条带，每条 4 个顶点）
pub const LINK_VERTICES_PER_SLOT: u32 = 8;
/// 每条连线带的索引数
pub const LINK_INDICES_PER_RIBBON: u32 = 6;
/// 计算着色器工作组大小
pub const WORKGROUP_SIZE: u32 = 64;

/// 发射器可调参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterParams {
    /// 粒子寿命（秒）
    pub lifetime: f32,
    /// 湍流噪声频率
    pub turbulence_frequency: f32,
    /// 湍流噪声强度
    pub turbulence_amplitude: f32,
    /// 速度阻尼 [0, 1)
    pub turbulence_friction: f32,
    /// 连线颜色噪声幅度
    pub color_variance: f32,
    /// 色相旋转速度（圈/秒）
    pub hue_speed: f32,
    /// 基础色相 [0, 1)
    pub base_hue: f32,
    /// 生成速度偏置
    pub velocity_bias: Vec3,
    /// 粒子精灵尺寸（米）
    pub particle_size: f32,
    /// 连线宽度（米）
    pub link_width: f32,
    /// 生成位置随机偏移半径
    pub spawn_radius: f32,
    /// 生成初速度大小
    pub spawn_speed: f32,
}

impl Default for EmitterParams {
    fn default() -> Self {
        Self {
            lifetime: 3.0,
            turbulence_frequency: 1.5,
            turbulence_amplitude: 0.004,
            turbulence_friction: 0.02,
            color_variance: 0.12,
            hue_speed: 0.05,
            base_hue: 0.55,
            velocity_bias: Vec3::new(0.0, 0.02, 0.0),
            particle_size: 0.012,
            link_width: 0.003,
            spawn_radius: 0.02,
            spawn_speed: 0.05,
        }
    }
}

impl EmitterParams {
    /// 验证参数
    pub fn validate(&self) -> RenderResult<()> {
        if !(self.lifetime > 0.0) {
            return Err(RenderError::InvalidConfiguration(format!(
                "lifetime must be positive, got {}",
                self.lifetime
            )));
        }
        if !(0.0..1.0).contains(&self.turbulence_friction) {
            return Err(RenderError::InvalidConfiguration(format!(
                "turbulence_friction must be in [0, 1), got {}",
                self.turbulence_friction
            )));
        }
        if self.particle_size < 0.0 || self.link_width < 0.0 || self.spawn_radius < 0.0 {
            return Err(RenderError::InvalidConfiguration(
                "sizes must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// 计算阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeStage {
    /// 一次性初始化
    Init,
    /// 运动积分 + 邻居连线
    Integrate,
    /// 环形批量生成
    Spawn,
}

/// 每帧推送到设备的 Uniform（对应 WGSL `SimUniforms`）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SimUniforms {
    pub spawn_previous: [f32; 4],
    pub spawn_current: [f32; 4],
    pub velocity_bias: [f32; 4],
    /// 连线带朝向参考轴（相机前向）
    pub facing: [f32; 4],
    pub delta_time: f32,
    pub time: f32,
    pub lifetime: f32,
    pub friction: f32,
    pub noise_frequency: f32,
    pub noise_amplitude: f32,
    pub link_half_width: f32,
    pub spawn_radius: f32,
    pub spawn_speed: f32,
    pub base_hue: f32,
    pub color_variance: f32,
    pub color_offset: f32,
    pub particle_count: u32,
    pub cursor: u32,
    pub batch_size: u32,
    pub seed: u32,
    pub enabled: u32,
    pub particle_size: f32,
    pub _padding: [u32; 2],
}

impl SimUniforms {
    /// 本帧实际写入的生成槽数量
    pub fn spawn_count(&self) -> u32 {
        self.batch_size.min(self.particle_count)
    }

    pub fn spawn_enabled(&self) -> bool {
        self.enabled != 0
    }
}

/// 连线顶点（对应 WGSL `LinkVertex`，同时作为顶点缓冲布局）
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LinkVertex {
    /// xyz = 位置，w = 1
    pub position: [f32; 4],
    /// RGBA，alpha = 连线强度
    pub color: [f32; 4],
}

impl LinkVertex {
    pub fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x4, 1 => Float32x4];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LinkVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// 控制线程侧的粒子槽视图（CPU 参考存储使用）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleSlot {
    pub position: Vec3,
    pub life: f32,
    pub velocity: Vec3,
}

impl ParticleSlot {
    pub fn is_alive(&self) -> bool {
        self.life > 0.0
    }
}

impl Default for ParticleSlot {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            life: 0.0,
            velocity: Vec3::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout_matches_wgsl() {
        // 4 个 vec4 + 12 个 f32 + 4 个 u32 + enabled/size/两个填充
        assert_eq!(std::mem::size_of::<SimUniforms>(), 144);
        assert_eq!(std::mem::size_of::<SimUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<LinkVertex>(), 32);
    }

    #[test]
    fn test_default_params_valid() {
        assert!(EmitterParams::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_params() {
        let params = EmitterParams {
            lifetime: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = EmitterParams {
            turbulence_friction: 1.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_spawn_count_clamped_to_capacity() {
        let uniforms = SimUniforms {
            particle_count: 3,
            batch_size: 8,
            ..bytemuck::Zeroable::zeroed()
        };
        assert_eq!(uniforms.spawn_count(), 3);
    }
}
