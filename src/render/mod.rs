//! 渲染模块
//!
//! - `particles`：粒子连线模拟（计算阶段 + 精灵/连线带渲染）
//! - `offscreen`：共享离屏渲染目标
//! - `transfer`：离屏目标到目标子区域的传输
//! - `camera`：由视图矩阵构造的相机

pub mod camera;
pub mod offscreen;
pub mod particles;
pub mod transfer;

pub use camera::{Camera, CameraUniforms};
pub use offscreen::OffscreenTarget;
pub use transfer::{FormatCache, TextureTransfer, TransferStrategy, Viewport};

use crate::core::error::{RenderError, RenderResult};
use std::sync::{Arc, OnceLock};

/// 静态场景内容（外部提供，渲染时作为纯输入）
pub trait SceneDrawer {
    /// 在粒子之前绘制到离屏目标
    fn draw<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>, scene: SceneContext<'a>);
}

/// 场景绘制时可用的相机绑定
#[derive(Clone, Copy)]
pub struct SceneContext<'a> {
    pub camera: &'a Camera,
    /// group 0 的相机绑定组（动态偏移）
    pub camera_bind_group: &'a wgpu::BindGroup,
    pub camera_offset: u32,
}

/// 空场景
pub struct EmptyScene;

impl SceneDrawer for EmptyScene {
    fn draw<'a>(&'a self, _rpass: &mut wgpu::RenderPass<'a>, _scene: SceneContext<'a>) {}
}

/// 设备丢失标记
///
/// 由 wgpu 的设备丢失回调设置，之后每次开始或提交帧都返回 `DeviceLost`。
#[derive(Debug, Clone, Default)]
pub struct DeviceLossFlag {
    reason: Arc<OnceLock<String>>,
}

impl DeviceLossFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录丢失原因（只保留第一次）
    pub fn mark(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.reason.set(reason.clone()).is_ok() {
            tracing::error!(target: "engine", %reason, "Graphics device lost");
        }
    }

    pub fn is_lost(&self) -> bool {
        self.reason.get().is_some()
    }

    pub fn check(&self) -> RenderResult<()> {
        match self.reason.get() {
            Some(reason) => Err(RenderError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }
}

/// 图形设备上下文
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub device_loss: DeviceLossFlag,
}

impl GpuContext {
    /// 请求适配器与设备，并安装设备丢失回调
    pub async fn new(
        instance: wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> RenderResult<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Linkfield Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::DeviceRequest(e.to_string()))?;

        let device_loss = DeviceLossFlag::new();
        let flag = device_loss.clone();
        device.set_device_lost_callback(move |reason, message| {
            flag.mark(format!("{:?}: {}", reason, message));
        });

        let info = adapter.get_info();
        tracing::info!(
            target: "engine",
            adapter = %info.name,
            backend = ?info.backend,
            "Graphics device ready"
        );

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            device_loss,
        })
    }
}
