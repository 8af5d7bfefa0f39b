//! 会话生命周期管理
//!
//! `Inactive → Requesting → Active → Ending → Inactive`。
//! 协商成功后发出 `Start`（携带会话），结束时发出 `End`（携带 `None`）。

use super::{
    GpuBinding, HeadsetHost, HeadsetSession, ProjectionLayer, ProjectionLayerDescriptor,
    ReferenceSpace, ReferenceSpaceType, SessionMode, XrError, XrResult, GPU_INTEROP_FEATURE,
};
use crate::core::events::{EventEmitter, Listener};
use std::rc::Rc;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Requesting,
    Active,
    Ending,
}

/// 会话事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    Start,
    End,
}

/// 事件负载：`Start` 为会话，`End` 为 `None`
pub type SessionPayload = Option<Rc<dyn HeadsetSession>>;

/// 已协商完成的会话及其渲染资源
pub struct ActiveSession<T> {
    pub session: Rc<dyn HeadsetSession>,
    pub binding: Rc<dyn GpuBinding<Texture = T>>,
    pub layer: ProjectionLayer,
    pub reference_space: ReferenceSpace,
}

impl<T> Clone for ActiveSession<T> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            binding: self.binding.clone(),
            layer: self.layer,
            reference_space: self.reference_space,
        }
    }
}

/// 会话管理器
pub struct SessionManager<H: HeadsetHost> {
    host: H,
    device: Option<H::Device>,
    state: SessionState,
    active: Option<ActiveSession<H::Texture>>,
    events: EventEmitter<SessionEventKind, SessionPayload>,
}

impl<H: HeadsetHost> SessionManager<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            device: None,
            state: SessionState::Inactive,
            active: None,
            events: EventEmitter::new(),
        }
    }

    /// 设置用于会话绑定的图形设备
    pub fn set_device(&mut self, device: H::Device) {
        self.device = Some(device);
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn active(&self) -> Option<&ActiveSession<H::Texture>> {
        self.active.as_ref()
    }

    /// 注册事件监听器（幂等）
    pub fn on(&mut self, kind: SessionEventKind, listener: Listener<SessionPayload>) {
        self.events.add_listener(kind, listener);
    }

    /// 注销事件监听器（幂等）
    pub fn off(&mut self, kind: SessionEventKind, listener: &Listener<SessionPayload>) {
        self.events.remove_listener(kind, listener);
    }

    pub fn listener_count(&self, kind: SessionEventKind) -> usize {
        self.events.listener_count(kind)
    }

    /// 请求沉浸式会话
    ///
    /// 未设置设备时在触达宿主前返回 `NoDevice`；已有会话时记录警告并返回。
    pub fn request_session(&mut self, mode: SessionMode) -> XrResult<()> {
        if self.state != SessionState::Inactive {
            tracing::warn!(target: "xr", state = ?self.state, "Session already requested or active");
            return Ok(());
        }
        let Some(device) = self.device.as_ref() else {
            return Err(XrError::NoDevice);
        };
        if !self.host.is_session_supported(mode) {
            tracing::warn!(target: "xr", ?mode, "Session mode not supported by host");
            return Err(XrError::NotSupported);
        }

        self.state = SessionState::Requesting;
        let session = match self.host.request_session(mode, &[GPU_INTEROP_FEATURE]) {
            Ok(session) => session,
            Err(e) => {
                self.state = SessionState::Inactive;
                tracing::error!(target: "xr", error = %e, "Session request failed");
                return Err(e);
            }
        };

        match negotiate(&mut self.host, device, session.clone()) {
            Ok(active) => {
                tracing::info!(
                    target: "xr",
                    session = active.session.id(),
                    color_format = ?active.layer.descriptor.color_format,
                    width = active.layer.texture_width,
                    height = active.layer.texture_height,
                    space = ?active.reference_space.kind,
                    "XR session started"
                );
                self.active = Some(active);
                self.state = SessionState::Active;
                self.events.emit(SessionEventKind::Start, &Some(session));
                Ok(())
            }
            Err(e) => {
                tracing::error!(target: "xr", error = %e, "Session negotiation failed");
                if let Err(end_err) = session.end() {
                    tracing::warn!(target: "xr", error = %end_err, "Failed to end half-negotiated session");
                }
                self.state = SessionState::Inactive;
                Err(e)
            }
        }
    }

    /// 主动结束会话
    pub fn end_session(&mut self) -> XrResult<()> {
        let Some(active) = self.active.as_ref() else {
            tracing::warn!(target: "xr", "No active session to end");
            return Ok(());
        };
        self.state = SessionState::Ending;
        if let Err(e) = active.session.end() {
            tracing::warn!(target: "xr", error = %e, "Host reported an error while ending session");
        }
        self.finish_end();
        Ok(())
    }

    /// 宿主侧结束会话（用户摘下头显、运行时退出等）
    pub fn handle_session_ended(&mut self) {
        if self.active.is_none() {
            return;
        }
        self.state = SessionState::Ending;
        self.finish_end();
    }

    fn finish_end(&mut self) {
        let id = self.active.take().map(|a| a.session.id());
        self.state = SessionState::Inactive;
        tracing::info!(target: "xr", session = ?id, "XR session ended");
        self.events.emit(SessionEventKind::End, &None);
    }
}

/// 绑定设备、创建投影层并选择参考空间
fn negotiate<H: HeadsetHost>(
    host: &mut H,
    device: &H::Device,
    session: Rc<dyn HeadsetSession>,
) -> XrResult<ActiveSession<H::Texture>> {
    let binding = host.create_binding(&session, device)?;
    let descriptor = ProjectionLayerDescriptor::for_color(binding.preferred_color_format());
    let layer = binding.create_projection_layer(&descriptor)?;
    session.set_projection_layer(&layer)?;

    let reference_space = match session.request_reference_space(ReferenceSpaceType::LocalFloor) {
        Ok(space) => space,
        Err(floor_err) => {
            tracing::info!(target: "xr", error = %floor_err, "local-floor unavailable, falling back to local");
            session
                .request_reference_space(ReferenceSpaceType::Local)
                .map_err(|e| {
                    XrError::Negotiation(format!("no usable reference space: {}", e))
                })?
        }
    };

    Ok(ActiveSession {
        session,
        binding,
        layer,
        reference_space,
    })
}
