//! 统一错误处理模块
//!
//! 提供引擎范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **配置错误** (`EngineError::Config` / `RenderError::InvalidConfiguration` /
//!   `XrError::NoDevice`): 调用点立即拒绝，属于致命错误
//! - **瞬时帧错误** (`FrameSkip`): 记录日志并跳过当前帧，循环继续
//! - **会话协商错误** (`XrError::NotSupported` / `XrError::Negotiation`): 会话请求失败
//! - **设备丢失** (`RenderError::DeviceLost`): 当前管线实例不可恢复，必须整体重建

use thiserror::Error;

/// 引擎核心错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("XR error: {0}")]
    Xr(#[from] XrError),

    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Window creation failed: {0}")]
    Window(String),

    #[error("Event loop error: {0}")]
    EventLoop(String),
}

/// 渲染系统错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Failed to request adapter: no compatible GPU found")]
    NoAdapter,

    #[error("Failed to request device: {0}")]
    DeviceRequest(String),

    /// 设备丢失：缓冲区、管线、渲染目标全部失效
    #[error("Graphics device lost: {0}")]
    DeviceLost(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to create surface: {0}")]
    SurfaceCreation(String),

    #[error("Surface error: {0}")]
    Surface(String),

    #[error("Invalid render state: {0}")]
    InvalidState(String),
}

impl RenderError {
    /// 是否为设备丢失（调用方必须重建整条管线）
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::DeviceLost(_))
    }
}

/// XR 会话错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XrError {
    /// 请求会话前未设置图形设备
    #[error("No graphics device set before requesting an XR session")]
    NoDevice,

    #[error("XR not supported")]
    NotSupported,

    #[error("XR session negotiation failed: {0}")]
    Negotiation(String),

    #[error("XR reference space unavailable: {0}")]
    ReferenceSpace(String),

    #[error("XR session not active")]
    SessionNotActive,
}

impl XrError {
    /// 配置类错误在调用点即被拒绝，不会触达宿主
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::NoDevice)
    }
}

/// 瞬时帧错误：跳过当前帧，循环继续
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSkip {
    #[error("no viewer pose available for this frame")]
    NoViewerPose,

    #[error("no destination sub-image for view {view}")]
    NoSubImage { view: usize },

    #[error("offscreen target not available")]
    NoOffscreenTarget,
}

/// 引擎结果类型别名
pub type EngineResult<T> = Result<T, EngineError>;
pub type RenderResult<T> = Result<T, RenderError>;
pub type XrResult<T> = Result<T, XrError>;
