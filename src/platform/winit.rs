//! winit 窗口刷新调度源

use crate::xr::{FrameScheduler, FrameToken};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use winit::window::Window;

#[derive(Debug, Default)]
struct PendingRedraw {
    handle: Cell<u64>,
    token: Cell<Option<FrameToken>>,
}

/// 通过 `request_redraw` 调度窗口帧
pub struct WinitScheduler {
    window: Arc<Window>,
    pending: Rc<PendingRedraw>,
    next_handle: u64,
}

/// 事件循环一侧：在 `RedrawRequested` 时取出待触发的令牌
#[derive(Clone)]
pub struct WinitFrameQueue {
    pending: Rc<PendingRedraw>,
}

impl WinitScheduler {
    pub fn new(window: Arc<Window>) -> (Self, WinitFrameQueue) {
        let pending = Rc::new(PendingRedraw::default());
        (
            Self {
                window,
                pending: pending.clone(),
                next_handle: 1,
            },
            WinitFrameQueue { pending },
        )
    }
}

impl FrameScheduler for WinitScheduler {
    fn request_frame(&mut self, token: FrameToken) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.pending.handle.set(handle);
        self.pending.token.set(Some(token));
        self.window.request_redraw();
        handle
    }

    fn cancel_frame(&mut self, handle: u64) {
        if self.pending.handle.get() == handle {
            self.pending.token.set(None);
        }
    }
}

impl WinitFrameQueue {
    /// 取出待触发的令牌；已取消或尚未调度时为 `None`
    pub fn take(&self) -> Option<FrameToken> {
        self.pending.token.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.token.get().is_some()
    }
}
