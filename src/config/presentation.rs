use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 呈现配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationConfig {
    /// 离屏渲染目标颜色格式
    pub offscreen_format: ColorFormat,

    /// 清屏颜色 (RGBA)
    pub clear_color: [f64; 4],

    /// 窗口模式近裁剪面
    pub near: f32,

    /// 窗口模式远裁剪面
    pub far: f32,

    /// 帧间隔上限（秒），防止卡顿后粒子跳变
    pub max_frame_delta: f32,

    /// 窗口尺寸
    pub window: Resolution,

    /// 桌面模拟头显
    #[serde(default)]
    pub simulated_headset: SimulatedHeadsetConfig,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            offscreen_format: ColorFormat::Rgba8Unorm,
            clear_color: [0.01, 0.01, 0.02, 1.0],
            near: 0.05,
            far: 100.0,
            max_frame_delta: 0.05,
            window: Resolution::default(),
            simulated_headset: SimulatedHeadsetConfig::default(),
        }
    }
}

impl PresentationConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid window resolution".to_string(),
            ));
        }
        if !(self.near > 0.0 && self.far > self.near) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid clip planes: near={} far={}",
                self.near, self.far
            )));
        }
        if self.max_frame_delta <= 0.0 {
            return Err(ConfigError::ValidationError(
                "max_frame_delta must be positive".to_string(),
            ));
        }
        self.simulated_headset.validate()
    }
}

/// 分辨率
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Resolution {
    /// 宽度（像素）
    pub width: u32,
    /// 高度（像素）
    pub height: u32,
}

impl_default!(Resolution {
    width: 1280,
    height: 720,
});

/// 桌面模拟头显配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedHeadsetConfig {
    /// 单眼分辨率
    pub eye_resolution: Resolution,
    /// 目标纹理数组格式（与离屏格式不同时走绘制路径）
    pub destination_format: ColorFormat,
    /// 瞳距（米）
    pub ipd: f32,
    /// 眼睛高度（米）
    pub eye_height: f32,
    /// 是否支持地面参考空间
    pub floor_space_supported: bool,
}

impl_default!(SimulatedHeadsetConfig {
    eye_resolution: Resolution {
        width: 1024,
        height: 1024,
    },
    destination_format: ColorFormat::Bgra8Unorm,
    ipd: 0.064,
    eye_height: 1.6,
    floor_space_supported: true,
});

impl SimulatedHeadsetConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.eye_resolution.width == 0 || self.eye_resolution.height == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid simulated headset eye resolution".to_string(),
            ));
        }
        if self.ipd < 0.0 {
            return Err(ConfigError::ValidationError("ipd must not be negative".to_string()));
        }
        Ok(())
    }
}

/// 可序列化的颜色格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
}

impl ColorFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            ColorFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            ColorFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            ColorFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            ColorFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            ColorFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_presentation_valid() {
        assert!(PresentationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_clip_planes() {
        let config = PresentationConfig {
            near: 10.0,
            far: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_color_format_mapping() {
        assert_eq!(
            ColorFormat::Bgra8Unorm.to_wgpu(),
            wgpu::TextureFormat::Bgra8Unorm
        );
    }
}
