//! 双模式帧循环
//!
//! 同一时刻只有一个调度源：窗口刷新（`FrameScheduler`）或头显会话
//! （`HeadsetSession::request_animation_frame`）。切换模式时先取消旧调度源，
//! 再以新的纪元令牌安装新调度源；携带旧令牌的回调被忽略。

use super::{HeadsetFrame, HeadsetSession};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// 调度令牌：每次进入循环或切换模式时纪元加一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameToken {
    pub epoch: u64,
}

/// 循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    RunningWindowed,
    RunningHeadset,
}

/// 传给回调的帧
pub enum FrameTick<'a> {
    /// 窗口帧：只有时间戳（秒）
    Windowed { time: f64 },
    /// 头显帧：时间戳与帧句柄
    Headset {
        time: f64,
        frame: &'a dyn HeadsetFrame,
    },
}

impl FrameTick<'_> {
    pub fn time(&self) -> f64 {
        match self {
            FrameTick::Windowed { time } | FrameTick::Headset { time, .. } => *time,
        }
    }
}

pub type FrameCallback = Box<dyn FnMut(FrameTick<'_>)>;

/// 窗口刷新调度源
pub trait FrameScheduler {
    /// 调度下一帧，返回可用于取消的句柄
    fn request_frame(&mut self, token: FrameToken) -> u64;

    fn cancel_frame(&mut self, handle: u64);
}

enum PendingFrame {
    Windowed(u64),
    Headset(Rc<dyn HeadsetSession>, u64),
}

/// 帧循环控制器
///
/// 所有方法都取 `&self`，回调内部可以安全地调用 `stop` / `set_session`。
pub struct FrameLoop {
    state: Cell<LoopState>,
    epoch: Cell<u64>,
    session: RefCell<Option<Rc<dyn HeadsetSession>>>,
    callback: RefCell<Option<FrameCallback>>,
    /// 回调被替换或清除时加一
    callback_version: Cell<u64>,
    scheduler: RefCell<Box<dyn FrameScheduler>>,
    pending: RefCell<Option<PendingFrame>>,
    ticks: Cell<u64>,
}

impl FrameLoop {
    pub fn new(scheduler: Box<dyn FrameScheduler>) -> Self {
        Self {
            state: Cell::new(LoopState::Idle),
            epoch: Cell::new(0),
            session: RefCell::new(None),
            callback: RefCell::new(None),
            callback_version: Cell::new(0),
            scheduler: RefCell::new(scheduler),
            pending: RefCell::new(None),
            ticks: Cell::new(0),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state.get() != LoopState::Idle
    }

    /// 当前纪元的令牌
    pub fn current_token(&self) -> FrameToken {
        FrameToken {
            epoch: self.epoch.get(),
        }
    }

    /// 已分发给回调的帧数
    pub fn ticks(&self) -> u64 {
        self.ticks.get()
    }

    pub fn has_session(&self) -> bool {
        self.session.borrow().is_some()
    }

    /// 开始循环；已绑定头显会话时进入头显模式
    pub fn start(&self, callback: FrameCallback) {
        if self.is_running() {
            tracing::warn!(target: "frame_loop", "Frame loop already running; start ignored");
            return;
        }
        self.install_callback(Some(callback));
        self.enter();
    }

    /// 绑定或解绑头显会话
    ///
    /// 取消当前调度源，可选地替换回调；只有原先在运行时才以新模式重新进入循环。
    pub fn set_session(
        &self,
        session: Option<Rc<dyn HeadsetSession>>,
        callback: Option<FrameCallback>,
    ) {
        let was_running = self.is_running();
        self.cancel_pending();
        if callback.is_some() {
            self.install_callback(callback);
        }
        *self.session.borrow_mut() = session;

        if was_running {
            self.enter();
        } else {
            self.bump_epoch();
        }
    }

    /// 停止循环：取消调度并清除回调
    pub fn stop(&self) {
        if !self.is_running() {
            tracing::warn!(target: "frame_loop", "Frame loop not running; stop ignored");
        }
        self.cancel_pending();
        self.install_callback(None);
        self.state.set(LoopState::Idle);
        self.bump_epoch();
        tracing::debug!(target: "frame_loop", "Frame loop stopped");
    }

    /// 窗口刷新源触发的帧
    pub fn on_windowed_tick(&self, token: FrameToken, time: f64) {
        if !self.accepts(token, LoopState::RunningWindowed) {
            tracing::trace!(target: "frame_loop", ?token, "Stale windowed tick ignored");
            return;
        }
        self.dispatch(token, FrameTick::Windowed { time });
    }

    /// 头显会话触发的帧
    pub fn on_headset_tick(&self, token: FrameToken, frame: &dyn HeadsetFrame) {
        if !self.accepts(token, LoopState::RunningHeadset) {
            tracing::trace!(target: "frame_loop", ?token, "Stale headset tick ignored");
            return;
        }
        let time = frame.time();
        self.dispatch(token, FrameTick::Headset { time, frame });
    }

    fn accepts(&self, token: FrameToken, mode: LoopState) -> bool {
        token.epoch == self.epoch.get() && self.state.get() == mode
    }

    fn dispatch(&self, token: FrameToken, tick: FrameTick<'_>) {
        *self.pending.borrow_mut() = None;
        self.ticks.set(self.ticks.get() + 1);

        let version = self.callback_version.get();
        let taken = self.callback.borrow_mut().take();
        if let Some(mut callback) = taken {
            callback(tick);
            // 回调期间未被替换或清除时放回
            if self.callback_version.get() == version {
                *self.callback.borrow_mut() = Some(callback);
            }
        }

        // 仅在仍处于同一纪元时自我重新调度
        if self.is_running() && self.epoch.get() == token.epoch {
            self.schedule(token);
        }
    }

    fn enter(&self) {
        let next = if self.has_session() {
            LoopState::RunningHeadset
        } else {
            LoopState::RunningWindowed
        };
        self.state.set(next);
        let token = self.bump_epoch();
        tracing::debug!(target: "frame_loop", state = ?next, epoch = token.epoch, "Frame loop entered");
        self.schedule(token);
    }

    fn schedule(&self, token: FrameToken) {
        let pending = match self.state.get() {
            LoopState::RunningWindowed => {
                let handle = self.scheduler.borrow_mut().request_frame(token);
                PendingFrame::Windowed(handle)
            }
            LoopState::RunningHeadset => {
                let Some(session) = self.session.borrow().clone() else {
                    return;
                };
                let handle = session.request_animation_frame(token);
                PendingFrame::Headset(session, handle)
            }
            LoopState::Idle => return,
        };
        *self.pending.borrow_mut() = Some(pending);
    }

    fn cancel_pending(&self) {
        let pending = self.pending.borrow_mut().take();
        match pending {
            Some(PendingFrame::Windowed(handle)) => self.scheduler.borrow_mut().cancel_frame(handle),
            Some(PendingFrame::Headset(session, handle)) => session.cancel_animation_frame(handle),
            None => {}
        }
    }

    fn install_callback(&self, callback: Option<FrameCallback>) {
        *self.callback.borrow_mut() = callback;
        self.callback_version.set(self.callback_version.get() + 1);
    }

    fn bump_epoch(&self) -> FrameToken {
        self.epoch.set(self.epoch.get() + 1);
        self.current_token()
    }
}
