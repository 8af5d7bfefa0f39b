// ============================================================================
// 头显呈现模块
// 会话协商、双模式帧循环、逐视图渲染与纹理传输
// ============================================================================

use crate::impl_default;
use crate::render::camera::Camera;
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

pub mod frame_loop;
pub mod presenter;
pub mod renderer;
pub mod session;
pub mod simulated;

pub use crate::core::error::{FrameSkip, XrError, XrResult};
pub use crate::render::transfer::Viewport;
pub use frame_loop::{FrameCallback, FrameLoop, FrameScheduler, FrameTick, FrameToken, LoopState};
pub use presenter::{FrameClock, FrameOutcome, PresenterStats, StereoBackend, StereoPresenter};
pub use renderer::XrRenderer;
pub use session::{ActiveSession, SessionEventKind, SessionManager, SessionState};

/// 请求会话时要求的 GPU 互操作能力
pub const GPU_INTEROP_FEATURE: &str = "webgpu";

/// 单帧最多渲染的视图数
pub const MAX_VIEWS: u32 = 4;

/// 视图姿态
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl_default!(Pose {
    position: Vec3::ZERO,
    orientation: Quat::IDENTITY,
});

impl Pose {
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position)
    }

    pub fn inverse(&self) -> Self {
        let inv_orientation = self.orientation.inverse();
        Self {
            position: inv_orientation * (-self.position),
            orientation: inv_orientation,
        }
    }
}

/// 视野参数 (Field of View)
#[derive(Debug, Clone, Copy)]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

impl Fov {
    /// 对称视野
    pub fn symmetric(half_angle: f32) -> Self {
        Self {
            angle_left: -half_angle,
            angle_right: half_angle,
            angle_up: half_angle,
            angle_down: -half_angle,
        }
    }

    pub fn to_projection_matrix(&self, near: f32, far: f32) -> Mat4 {
        let tan_left = self.angle_left.tan();
        let tan_right = self.angle_right.tan();
        let tan_up = self.angle_up.tan();
        let tan_down = self.angle_down.tan();

        let tan_width = tan_right - tan_left;
        let tan_height = tan_up - tan_down;

        Mat4::from_cols_array(&[
            2.0 / tan_width,
            0.0,
            0.0,
            0.0,
            0.0,
            2.0 / tan_height,
            0.0,
            0.0,
            (tan_right + tan_left) / tan_width,
            (tan_up + tan_down) / tan_height,
            -far / (far - near),
            -1.0,
            0.0,
            0.0,
            -(far * near) / (far - near),
            0.0,
        ])
    }
}

/// 单个视图：列主序投影矩阵与世界逆变换矩阵
#[derive(Debug, Clone, PartialEq)]
pub struct XrView {
    pub projection: [f32; 16],
    pub inverse_transform: [f32; 16],
}

impl XrView {
    /// 由眼睛姿态和视野构造
    pub fn from_pose(pose: &Pose, fov: &Fov, near: f32, far: f32) -> Self {
        Self {
            projection: fov.to_projection_matrix(near, far).to_cols_array(),
            inverse_transform: pose.to_matrix().inverse().to_cols_array(),
        }
    }

    pub fn camera(&self) -> Camera {
        Camera::from_view_matrices(&self.projection, &self.inverse_transform)
    }
}

/// 一帧的头部姿态和按设备顺序排列的视图
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerPose {
    pub transform: Pose,
    pub views: Vec<XrView>,
}

/// 参考空间类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSpaceType {
    /// 地面相对
    LocalFloor,
    /// 起始位置相对
    Local,
}

/// 参考空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceSpace {
    pub kind: ReferenceSpaceType,
    /// 空间原点在追踪空间中的位置
    pub origin: Pose,
}

/// 会话模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    ImmersiveVr,
}

/// 呈现表面（投影层）描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionLayerDescriptor {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

impl ProjectionLayerDescriptor {
    /// 固定深度格式，渲染 + 拷贝写入用途
    pub fn for_color(color_format: wgpu::TextureFormat) -> Self {
        Self {
            color_format,
            depth_format: wgpu::TextureFormat::Depth24Plus,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
        }
    }
}

/// 已创建的投影层
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionLayer {
    pub id: u64,
    pub descriptor: ProjectionLayerDescriptor,
    /// 单眼宽度
    pub texture_width: u32,
    /// 单眼高度
    pub texture_height: u32,
    pub array_layers: u32,
}

/// 视图在投影层中的目标子图像
#[derive(Debug, Clone)]
pub struct SubImage<T> {
    pub texture: T,
    pub viewport: Viewport,
    /// 数组层索引；未提供时使用视图序号
    pub image_index: Option<u32>,
    pub color_format: wgpu::TextureFormat,
    pub texture_width: u32,
    pub texture_height: u32,
}

impl<T> SubImage<T> {
    pub fn array_layer(&self, view_index: usize) -> u32 {
        self.image_index.unwrap_or(view_index as u32)
    }
}

/// 头显一帧
pub trait HeadsetFrame {
    /// 帧时间戳（秒）
    fn time(&self) -> f64;

    /// 参考空间中的观察者姿态；追踪丢失时为 `None`
    fn viewer_pose(&self, space: &ReferenceSpace) -> Option<ViewerPose>;
}

/// 头显会话
pub trait HeadsetSession {
    /// 会话标识
    fn id(&self) -> u64;

    /// 安装投影层到会话渲染状态
    fn set_projection_layer(&self, layer: &ProjectionLayer) -> XrResult<()>;

    fn request_reference_space(&self, kind: ReferenceSpaceType) -> XrResult<ReferenceSpace>;

    /// 调度一帧，返回可用于取消的句柄
    fn request_animation_frame(&self, token: FrameToken) -> u64;

    fn cancel_animation_frame(&self, handle: u64);

    fn end(&self) -> XrResult<()>;
}

/// 会话与图形设备之间的绑定
pub trait GpuBinding {
    type Texture;

    fn preferred_color_format(&self) -> wgpu::TextureFormat;

    fn create_projection_layer(
        &self,
        descriptor: &ProjectionLayerDescriptor,
    ) -> XrResult<ProjectionLayer>;

    /// 视图在投影层中的子图像；不可用时为 `None`
    fn view_sub_image(
        &self,
        layer: &ProjectionLayer,
        view_index: usize,
        view: &XrView,
    ) -> Option<SubImage<Self::Texture>>;
}

/// 头显宿主（运行时入口）
pub trait HeadsetHost {
    type Device;
    type Texture;

    fn is_session_supported(&self, mode: SessionMode) -> bool;

    fn request_session(
        &mut self,
        mode: SessionMode,
        required_features: &[&str],
    ) -> XrResult<Rc<dyn HeadsetSession>>;

    fn create_binding(
        &mut self,
        session: &Rc<dyn HeadsetSession>,
        device: &Self::Device,
    ) -> XrResult<Rc<dyn GpuBinding<Texture = Self::Texture>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_inverse() {
        let pose = Pose {
            position: Vec3::new(1.0, 2.0, 3.0),
            orientation: Quat::from_rotation_y(0.5),
        };
        let product = pose.to_matrix() * pose.inverse().to_matrix();
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_view_camera_roundtrip() {
        let pose = Pose {
            position: Vec3::new(-0.032, 1.6, 0.0),
            orientation: Quat::IDENTITY,
        };
        let view = XrView::from_pose(&pose, &Fov::symmetric(0.78), 0.05, 100.0);
        let camera = view.camera();
        assert!((camera.position() - pose.position).length() < 1e-5);
        assert!((camera.forward() - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_projection_layer_descriptor() {
        let desc = ProjectionLayerDescriptor::for_color(wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!(desc.depth_format, wgpu::TextureFormat::Depth24Plus);
        assert!(desc.usage.contains(wgpu::TextureUsages::COPY_DST));
        assert!(desc.usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
    }

    #[test]
    fn test_array_layer_defaults_to_view_index() {
        let sub = SubImage {
            texture: (),
            viewport: Viewport::new(0, 0, 8, 8),
            image_index: None,
            color_format: wgpu::TextureFormat::Rgba8Unorm,
            texture_width: 8,
            texture_height: 8,
        };
        assert_eq!(sub.array_layer(1), 1);
        let sub = SubImage {
            image_index: Some(0),
            ..sub
        };
        assert_eq!(sub.array_layer(1), 0);
    }
}
