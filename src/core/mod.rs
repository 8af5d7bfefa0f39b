//! 核心模块
//!
//! 包含引擎的核心功能：
//! - `engine` - 应用主循环
//! - `error` - 错误类型定义
//! - `events` - 类型化事件分发
//! - `logging` - 日志初始化

pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
#[macro_use]
pub mod macros;

pub use engine::{Engine, EngineOptions, FrameFailures};

// 重新导出错误类型
pub use error::{
    EngineError, EngineResult, FrameSkip, RenderError, RenderResult, XrError, XrResult,
};
pub use events::{EventEmitter, Listener};
pub use logging::init_logging;
