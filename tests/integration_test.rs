use glam::Vec3;
use linkfield::core::engine::FrameFailures;
use linkfield::core::error::{FrameSkip, RenderError, RenderResult, XrError, XrResult};
use linkfield::render::camera::Camera;
use linkfield::render::DeviceLossFlag;
use linkfield::render::particles::{
    CpuCompute, CpuParticleStore, EmitterParams, LinkEmitter, ParticleField, SpawnPoint,
};
use linkfield::render::transfer::{TransferStrategy, Viewport};
use linkfield::xr::{
    ActiveSession, FrameLoop, FrameOutcome, FrameScheduler, FrameTick, FrameToken, GpuBinding,
    HeadsetFrame, HeadsetHost, HeadsetSession, LoopState, Pose, ProjectionLayer,
    ProjectionLayerDescriptor, ReferenceSpace, ReferenceSpaceType, SessionManager, SessionMode,
    StereoBackend, StereoPresenter, SubImage, ViewerPose, XrView,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

// ============================================================================
// 测试替身
// ============================================================================

#[derive(Default)]
struct QueueSession {
    scheduled: RefCell<Vec<FrameToken>>,
}

impl QueueSession {
    fn take(&self) -> Vec<FrameToken> {
        self.scheduled.borrow_mut().drain(..).collect()
    }
}

impl HeadsetSession for QueueSession {
    fn id(&self) -> u64 {
        1
    }
    fn set_projection_layer(&self, _layer: &ProjectionLayer) -> XrResult<()> {
        Ok(())
    }
    fn request_reference_space(&self, kind: ReferenceSpaceType) -> XrResult<ReferenceSpace> {
        Ok(ReferenceSpace {
            kind,
            origin: Pose::default(),
        })
    }
    fn request_animation_frame(&self, token: FrameToken) -> u64 {
        self.scheduled.borrow_mut().push(token);
        self.scheduled.borrow().len() as u64
    }
    fn cancel_animation_frame(&self, _handle: u64) {
        self.scheduled.borrow_mut().clear();
    }
    fn end(&self) -> XrResult<()> {
        Ok(())
    }
}

struct LayerBinding;

impl GpuBinding for LayerBinding {
    type Texture = u32;

    fn preferred_color_format(&self) -> wgpu::TextureFormat {
        wgpu::TextureFormat::Bgra8Unorm
    }
    fn create_projection_layer(&self, descriptor: &ProjectionLayerDescriptor) -> XrResult<ProjectionLayer> {
        Ok(ProjectionLayer {
            id: 1,
            descriptor: *descriptor,
            texture_width: 16,
            texture_height: 16,
            array_layers: 2,
        })
    }
    fn view_sub_image(&self, layer: &ProjectionLayer, view_index: usize, _view: &XrView) -> Option<SubImage<u32>> {
        Some(SubImage {
            texture: 0,
            viewport: Viewport::new(0, 0, layer.texture_width, layer.texture_height),
            image_index: Some(view_index as u32),
            color_format: layer.descriptor.color_format,
            texture_width: layer.texture_width,
            texture_height: layer.texture_height,
        })
    }
}

#[derive(Default)]
struct CountingHost {
    calls: Cell<u32>,
}

impl HeadsetHost for CountingHost {
    type Device = ();
    type Texture = u32;

    fn is_session_supported(&self, _mode: SessionMode) -> bool {
        self.calls.set(self.calls.get() + 1);
        true
    }
    fn request_session(&mut self, _mode: SessionMode, _features: &[&str]) -> XrResult<Rc<dyn HeadsetSession>> {
        self.calls.set(self.calls.get() + 1);
        Ok(Rc::new(QueueSession::default()))
    }
    fn create_binding(
        &mut self,
        _session: &Rc<dyn HeadsetSession>,
        _device: &(),
    ) -> XrResult<Rc<dyn GpuBinding<Texture = u32>>> {
        self.calls.set(self.calls.get() + 1);
        Ok(Rc::new(LayerBinding))
    }
}

#[derive(Default)]
struct CountingBackend {
    computes: u32,
    submissions: u32,
}

impl StereoBackend for CountingBackend {
    type Encoder = ();
    type Texture = u32;

    fn begin_frame(&mut self) -> RenderResult<()> {
        Ok(())
    }
    fn compute(&mut self, _encoder: &mut (), _dt: f32, _facing: Vec3) {
        self.computes += 1;
    }
    fn ensure_target(&mut self, _width: u32, _height: u32) -> RenderResult<()> {
        Ok(())
    }
    fn render_view(&mut self, _encoder: &mut (), _camera: &Camera, _slot: u32) -> RenderResult<()> {
        Ok(())
    }
    fn transfer(&mut self, _encoder: &mut (), _dst: &u32, _vp: &Viewport, _layer: u32) -> RenderResult<TransferStrategy> {
        Ok(TransferStrategy::DirectCopy)
    }
    fn submit(&mut self, _encoder: ()) -> RenderResult<()> {
        self.submissions += 1;
        Ok(())
    }
}

/// begin_frame 时检查设备丢失，与 wgpu 后端一致
#[derive(Default)]
struct LossAwareBackend {
    inner: CountingBackend,
    loss: DeviceLossFlag,
}

impl StereoBackend for LossAwareBackend {
    type Encoder = ();
    type Texture = u32;

    fn begin_frame(&mut self) -> RenderResult<()> {
        self.loss.check()?;
        self.inner.begin_frame()
    }
    fn compute(&mut self, encoder: &mut (), dt: f32, facing: Vec3) {
        self.inner.compute(encoder, dt, facing);
    }
    fn ensure_target(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.inner.ensure_target(width, height)
    }
    fn render_view(&mut self, encoder: &mut (), camera: &Camera, slot: u32) -> RenderResult<()> {
        self.inner.render_view(encoder, camera, slot)
    }
    fn transfer(&mut self, encoder: &mut (), dst: &u32, vp: &Viewport, layer: u32) -> RenderResult<TransferStrategy> {
        self.inner.transfer(encoder, dst, vp, layer)
    }
    fn submit(&mut self, encoder: ()) -> RenderResult<()> {
        self.loss.check()?;
        self.inner.submit(encoder)
    }
}

struct Frame {
    time: f64,
    tracked: bool,
}

impl HeadsetFrame for Frame {
    fn time(&self) -> f64 {
        self.time
    }
    fn viewer_pose(&self, _space: &ReferenceSpace) -> Option<ViewerPose> {
        if !self.tracked {
            return None;
        }
        let views = vec![
            XrView::from_pose(&Pose::default(), &linkfield::xr::Fov::symmetric(0.7), 0.05, 50.0);
            2
        ];
        Some(ViewerPose {
            transform: Pose::default(),
            views,
        })
    }
}

#[derive(Default)]
struct ManualScheduler {
    tokens: Rc<RefCell<Vec<FrameToken>>>,
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self, token: FrameToken) -> u64 {
        self.tokens.borrow_mut().push(token);
        self.tokens.borrow().len() as u64
    }
    fn cancel_frame(&mut self, _handle: u64) {
        self.tokens.borrow_mut().clear();
    }
}

// ============================================================================
// 粒子场景
// ============================================================================

#[test]
fn test_four_slots_batch_two_spawn_at_origin() {
    let params = EmitterParams::default();
    let mut emitter = LinkEmitter::new(CpuParticleStore::new(4), 2, params).unwrap();
    emitter.set_spawn_position(Vec3::ZERO);
    emitter.set_spawn_enabled(true);

    assert_eq!(emitter.cursor(), 0);
    emitter.compute(&mut CpuCompute::new(), 1.0 / 60.0);
    assert_eq!(emitter.cursor(), 2);

    let slots = emitter.store().slots();
    let spawned: Vec<_> = slots.iter().filter(|s| s.life == 1.0).collect();
    assert_eq!(spawned.len(), 2);
    for slot in spawned {
        assert!(slot.position.length() <= params.spawn_radius + 1e-5);
    }
    assert_eq!(emitter.store().alive_count(), 2);
}

#[test]
fn test_init_leaves_nothing_renderable() {
    let mut emitter = LinkEmitter::new(CpuParticleStore::new(16), 4, EmitterParams::default()).unwrap();
    emitter.compute(&mut CpuCompute::new(), 1.0 / 60.0);

    let store = emitter.store();
    assert!(store.slots().iter().all(|s| s.life <= 0.0));
    assert!(store.links().iter().all(|v| v.color[3] == 0.0));
}

#[test]
fn test_single_live_particle_has_no_visible_links() {
    let mut emitter = LinkEmitter::new(CpuParticleStore::new(8), 1, EmitterParams::default()).unwrap();
    let mut compute = CpuCompute::new();
    emitter.set_spawn_enabled(true);
    emitter.compute(&mut compute, 1.0 / 60.0);
    emitter.set_spawn_enabled(false);
    // 第二帧重建连线：只有一个存活粒子
    emitter.compute(&mut compute, 1.0 / 60.0);

    let store = emitter.store();
    assert_eq!(store.alive_count(), 1);
    for i in 0..8 {
        let (a, b) = store.ribbons(i);
        assert!(a.iter().chain(b).all(|v| v.color[3] == 0.0));
    }
}

#[test]
fn test_field_spawn_points_drive_both_emitters() {
    let mut field = ParticleField::new();
    field.add_emitter(CpuParticleStore::new(8), 2, EmitterParams::default()).unwrap();
    field.add_emitter(CpuParticleStore::new(8), 2, EmitterParams::default()).unwrap();

    field.apply_spawn_points(&[SpawnPoint::active(Vec3::X), SpawnPoint::default()]);
    field.compute_all(&mut CpuCompute::new(), 1.0 / 60.0);

    let alive: Vec<usize> = field.emitters().iter().map(|e| e.store().alive_count()).collect();
    assert_eq!(alive, vec![2, 0]);
    // 游标与是否生成无关
    assert!(field.emitters().iter().all(|e| e.cursor() == 2));
}

// ============================================================================
// 会话与帧循环场景
// ============================================================================

#[test]
fn test_session_without_device_fails_before_host_call() {
    let mut manager = SessionManager::new(CountingHost::default());
    let result = manager.request_session(SessionMode::ImmersiveVr);

    assert_eq!(result, Err(XrError::NoDevice));
    assert!(result.unwrap_err().is_configuration());
    assert_eq!(manager.host().calls.get(), 0);
}

#[test]
fn test_untracked_headset_frame_submits_nothing_and_keeps_ticking() {
    let mut manager = SessionManager::new(CountingHost::default());
    manager.set_device(());
    manager.request_session(SessionMode::ImmersiveVr).unwrap();
    let active: ActiveSession<u32> = manager.active().cloned().unwrap();

    let session = Rc::new(QueueSession::default());
    let backend = Rc::new(RefCell::new(CountingBackend::default()));
    let presenter = Rc::new(RefCell::new(StereoPresenter::new(0.05)));
    let ticks = Rc::new(Cell::new(0));

    let frame_loop = FrameLoop::new(Box::new(ManualScheduler::default()));
    frame_loop.set_session(Some(session.clone()), None);
    {
        let (backend, presenter, ticks) = (backend.clone(), presenter.clone(), ticks.clone());
        frame_loop.start(Box::new(move |tick: FrameTick<'_>| {
            ticks.set(ticks.get() + 1);
            if let FrameTick::Headset { frame, .. } = tick {
                let outcome = presenter
                    .borrow_mut()
                    .present_headset(&mut *backend.borrow_mut(), frame, &active)
                    .unwrap();
                if ticks.get() == 1 {
                    assert_eq!(outcome, FrameOutcome::Skipped(FrameSkip::NoViewerPose));
                }
            }
        }));
    }
    assert_eq!(frame_loop.state(), LoopState::RunningHeadset);

    let token = session.take()[0];
    frame_loop.on_headset_tick(token, &Frame { time: 0.0, tracked: false });
    assert_eq!(backend.borrow().submissions, 0);
    assert_eq!(backend.borrow().computes, 0);

    // 循环已重新调度下一帧
    let next = session.take();
    assert_eq!(next.len(), 1);
    frame_loop.on_headset_tick(next[0], &Frame { time: 0.011, tracked: true });
    assert_eq!(ticks.get(), 2);
    assert_eq!(backend.borrow().submissions, 1);
    assert_eq!(backend.borrow().computes, 1);
}

#[test]
fn test_clearing_session_resumes_windowed_ticks() {
    let scheduler = ManualScheduler::default();
    let windowed = scheduler.tokens.clone();
    let frame_loop = FrameLoop::new(Box::new(scheduler));
    let session = Rc::new(QueueSession::default());

    let headset_calls = Rc::new(Cell::new(0));
    let windowed_calls = Rc::new(Cell::new(0));
    {
        let (h, w) = (headset_calls.clone(), windowed_calls.clone());
        frame_loop.start(Box::new(move |tick: FrameTick<'_>| match tick {
            FrameTick::Headset { .. } => h.set(h.get() + 1),
            FrameTick::Windowed { .. } => w.set(w.get() + 1),
        }));
    }
    frame_loop.set_session(Some(session.clone()), None);
    let stale = {
        let mut tokens = session.scheduled.borrow().clone();
        tokens.pop().unwrap()
    };

    frame_loop.set_session(None, None);
    assert_eq!(frame_loop.state(), LoopState::RunningWindowed);

    // 旧头显帧到达不再调用回调
    frame_loop.on_headset_tick(stale, &Frame { time: 1.0, tracked: true });
    assert_eq!(headset_calls.get(), 0);

    let token = *windowed.borrow().last().unwrap();
    frame_loop.on_windowed_tick(token, 1.0);
    assert_eq!(windowed_calls.get(), 1);
}

#[test]
fn test_device_loss_stops_loop_and_reaches_owner() {
    let backend = Rc::new(RefCell::new(LossAwareBackend::default()));
    let loss = backend.borrow().loss.clone();
    let presenter = Rc::new(RefCell::new(StereoPresenter::new(0.05)));
    let failures = FrameFailures::new();

    let scheduler = ManualScheduler::default();
    let windowed = scheduler.tokens.clone();
    let frame_loop = Rc::new(FrameLoop::new(Box::new(scheduler)));
    {
        let (backend, presenter, failures) = (backend.clone(), presenter.clone(), failures.clone());
        let weak = Rc::downgrade(&frame_loop);
        frame_loop.start(Box::new(move |tick: FrameTick<'_>| {
            let camera = Camera::look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, 0.8, 1.0, 0.1, 100.0);
            let result = presenter
                .borrow_mut()
                .present_windowed(&mut *backend.borrow_mut(), tick.time(), &camera, &0, &Viewport::new(0, 0, 16, 16))
                .map(|_| ());
            failures.route(result, weak.upgrade().as_deref());
        }));
    }

    let token = *windowed.borrow().last().unwrap();
    frame_loop.on_windowed_tick(token, 0.0);
    assert!(!failures.is_fatal());
    assert_eq!(backend.borrow().inner.submissions, 1);

    loss.mark("driver reset");
    let token = *windowed.borrow().last().unwrap();
    frame_loop.on_windowed_tick(token, 0.016);

    assert!(failures.is_fatal());
    assert!(!frame_loop.is_running());
    assert_eq!(backend.borrow().inner.submissions, 1);
    assert!(matches!(failures.take(), Some(RenderError::DeviceLost(ref reason)) if reason == "driver reset"));
}
