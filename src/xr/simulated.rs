//! 桌面模拟头显
//!
//! 以双层纹理数组作为投影层，按配置的瞳距与眼高生成左右眼视图，
//! 帧调度由宿主循环显式驱动（`take_scheduled` + `frame`）。

use super::{
    Fov, FrameToken, GpuBinding, HeadsetFrame, HeadsetHost, HeadsetSession, Pose,
    ProjectionLayer, ProjectionLayerDescriptor, ReferenceSpace, ReferenceSpaceType, SessionMode,
    SubImage, ViewerPose, Viewport, XrError, XrResult, XrView, GPU_INTEROP_FEATURE,
};
use crate::config::SimulatedHeadsetConfig;
use glam::{Quat, Vec3};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

const EYE_COUNT: u32 = 2;
const HALF_FOV: f32 = std::f32::consts::FRAC_PI_4;
const NEAR: f32 = 0.05;
const FAR: f32 = 100.0;

/// 模拟宿主
pub struct SimulatedHost {
    config: SimulatedHeadsetConfig,
    session: Option<Rc<SimulatedSession>>,
    next_id: u64,
}

impl SimulatedHost {
    pub fn new(config: SimulatedHeadsetConfig) -> Self {
        Self {
            config,
            session: None,
            next_id: 1,
        }
    }

    /// 最近一次创建且未结束的会话
    pub fn session(&self) -> Option<Rc<SimulatedSession>> {
        self.session.as_ref().filter(|s| !s.is_ended()).cloned()
    }
}

impl HeadsetHost for SimulatedHost {
    type Device = Arc<wgpu::Device>;
    type Texture = Arc<wgpu::Texture>;

    fn is_session_supported(&self, mode: SessionMode) -> bool {
        matches!(mode, SessionMode::ImmersiveVr)
    }

    fn request_session(
        &mut self,
        _mode: SessionMode,
        required_features: &[&str],
    ) -> XrResult<Rc<dyn HeadsetSession>> {
        if let Some(feature) = required_features
            .iter()
            .find(|f| **f != GPU_INTEROP_FEATURE)
        {
            return Err(XrError::Negotiation(format!(
                "required feature '{}' unavailable",
                feature
            )));
        }

        let session = Rc::new(SimulatedSession::new(self.next_id, &self.config));
        self.next_id += 1;
        self.session = Some(session.clone());
        tracing::debug!(target: "xr", id = session.id(), "Simulated session created");
        Ok(session)
    }

    fn create_binding(
        &mut self,
        _session: &Rc<dyn HeadsetSession>,
        device: &Arc<wgpu::Device>,
    ) -> XrResult<Rc<dyn GpuBinding<Texture = Arc<wgpu::Texture>>>> {
        Ok(Rc::new(SimulatedBinding::new(device.clone(), &self.config)))
    }
}

/// 模拟会话
pub struct SimulatedSession {
    id: u64,
    ipd: f32,
    eye_height: f32,
    floor_supported: bool,
    tracking: Cell<bool>,
    head: Cell<Pose>,
    ended: Cell<bool>,
    layer: Cell<Option<ProjectionLayer>>,
    next_handle: Cell<u64>,
    scheduled: RefCell<Vec<(u64, FrameToken)>>,
}

impl SimulatedSession {
    fn new(id: u64, config: &SimulatedHeadsetConfig) -> Self {
        Self {
            id,
            ipd: config.ipd,
            eye_height: config.eye_height,
            floor_supported: config.floor_space_supported,
            tracking: Cell::new(true),
            head: Cell::new(Pose::default()),
            ended: Cell::new(false),
            layer: Cell::new(None),
            next_handle: Cell::new(1),
            scheduled: RefCell::new(Vec::new()),
        }
    }

    /// 取出所有待触发的帧令牌
    pub fn take_scheduled(&self) -> Vec<FrameToken> {
        self.scheduled
            .borrow_mut()
            .drain(..)
            .map(|(_, token)| token)
            .collect()
    }

    pub fn pending_frames(&self) -> usize {
        self.scheduled.borrow().len()
    }

    /// 构造一帧
    pub fn frame(&self, time: f64) -> SimulatedFrame {
        SimulatedFrame {
            time,
            head: self.head.get(),
            tracking: self.tracking.get(),
            ipd: self.ipd,
            eye_height: self.eye_height,
        }
    }

    /// 设置头部姿态（相对参考空间原点）
    pub fn set_head_pose(&self, pose: Pose) {
        self.head.set(pose);
    }

    /// 模拟追踪丢失
    pub fn set_tracking(&self, tracking: bool) {
        self.tracking.set(tracking);
    }

    pub fn projection_layer(&self) -> Option<ProjectionLayer> {
        self.layer.get()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.get()
    }
}

impl HeadsetSession for SimulatedSession {
    fn id(&self) -> u64 {
        self.id
    }

    fn set_projection_layer(&self, layer: &ProjectionLayer) -> XrResult<()> {
        if self.ended.get() {
            return Err(XrError::SessionNotActive);
        }
        self.layer.set(Some(*layer));
        Ok(())
    }

    fn request_reference_space(&self, kind: ReferenceSpaceType) -> XrResult<ReferenceSpace> {
        match kind {
            ReferenceSpaceType::LocalFloor if !self.floor_supported => Err(
                XrError::ReferenceSpace("local-floor not supported".to_string()),
            ),
            _ => Ok(ReferenceSpace {
                kind,
                origin: Pose::default(),
            }),
        }
    }

    fn request_animation_frame(&self, token: FrameToken) -> u64 {
        let handle = self.next_handle.get();
        self.next_handle.set(handle + 1);
        if !self.ended.get() {
            self.scheduled.borrow_mut().push((handle, token));
        }
        handle
    }

    fn cancel_animation_frame(&self, handle: u64) {
        self.scheduled.borrow_mut().retain(|(h, _)| *h != handle);
    }

    fn end(&self) -> XrResult<()> {
        if self.ended.replace(true) {
            return Err(XrError::SessionNotActive);
        }
        self.scheduled.borrow_mut().clear();
        Ok(())
    }
}

/// 模拟帧
#[derive(Debug, Clone, Copy)]
pub struct SimulatedFrame {
    time: f64,
    head: Pose,
    tracking: bool,
    ipd: f32,
    eye_height: f32,
}

impl HeadsetFrame for SimulatedFrame {
    fn time(&self) -> f64 {
        self.time
    }

    fn viewer_pose(&self, space: &ReferenceSpace) -> Option<ViewerPose> {
        if !self.tracking {
            return None;
        }

        let height = match space.kind {
            ReferenceSpaceType::LocalFloor => self.eye_height,
            ReferenceSpaceType::Local => 0.0,
        };
        let head = Pose {
            position: self.head.position + Vec3::Y * height - space.origin.position,
            orientation: self.head.orientation,
        };

        let fov = Fov::symmetric(HALF_FOV);
        let half_ipd = self.ipd * 0.5;
        let views = [-half_ipd, half_ipd]
            .iter()
            .map(|offset| {
                let eye = Pose {
                    position: head.position + head.orientation * Vec3::new(*offset, 0.0, 0.0),
                    orientation: head.orientation,
                };
                XrView::from_pose(&eye, &fov, NEAR, FAR)
            })
            .collect();

        Some(ViewerPose {
            transform: head,
            views,
        })
    }
}

/// 模拟 GPU 绑定：投影层是一个双层纹理数组
pub struct SimulatedBinding {
    device: Arc<wgpu::Device>,
    eye_width: u32,
    eye_height: u32,
    color_format: wgpu::TextureFormat,
    next_layer_id: Cell<u64>,
    texture: RefCell<Option<Arc<wgpu::Texture>>>,
}

impl SimulatedBinding {
    fn new(device: Arc<wgpu::Device>, config: &SimulatedHeadsetConfig) -> Self {
        Self {
            device,
            eye_width: config.eye_resolution.width,
            eye_height: config.eye_resolution.height,
            color_format: config.destination_format.to_wgpu(),
            next_layer_id: Cell::new(1),
            texture: RefCell::new(None),
        }
    }

    /// 当前投影层的颜色纹理
    pub fn layer_texture(&self) -> Option<Arc<wgpu::Texture>> {
        self.texture.borrow().clone()
    }
}

impl GpuBinding for SimulatedBinding {
    type Texture = Arc<wgpu::Texture>;

    fn preferred_color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    fn create_projection_layer(
        &self,
        descriptor: &ProjectionLayerDescriptor,
    ) -> XrResult<ProjectionLayer> {
        if self.eye_width == 0 || self.eye_height == 0 {
            return Err(XrError::Negotiation("zero-sized eye resolution".to_string()));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Simulated Projection Layer"),
            size: wgpu::Extent3d {
                width: self.eye_width,
                height: self.eye_height,
                depth_or_array_layers: EYE_COUNT,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: descriptor.color_format,
            usage: descriptor.usage,
            view_formats: &[],
        });
        *self.texture.borrow_mut() = Some(Arc::new(texture));

        let id = self.next_layer_id.get();
        self.next_layer_id.set(id + 1);
        Ok(ProjectionLayer {
            id,
            descriptor: *descriptor,
            texture_width: self.eye_width,
            texture_height: self.eye_height,
            array_layers: EYE_COUNT,
        })
    }

    fn view_sub_image(
        &self,
        layer: &ProjectionLayer,
        view_index: usize,
        _view: &XrView,
    ) -> Option<SubImage<Arc<wgpu::Texture>>> {
        if view_index as u32 >= layer.array_layers {
            return None;
        }
        let texture = self.texture.borrow().clone()?;
        Some(SubImage {
            texture,
            viewport: Viewport::new(0, 0, layer.texture_width, layer.texture_height),
            image_index: Some(view_index as u32),
            color_format: layer.descriptor.color_format,
            texture_width: layer.texture_width,
            texture_height: layer.texture_height,
        })
    }
}

/// 绕 Y 轴转头的头部姿态
pub fn head_yaw(yaw: f32) -> Pose {
    Pose {
        position: Vec3::ZERO,
        orientation: Quat::from_rotation_y(yaw),
    }
}
