//! 平台层
//!
//! - `winit`：桌面窗口的帧调度源

pub mod winit;

pub use self::winit::{WinitFrameQueue, WinitScheduler};
