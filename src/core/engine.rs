//! 应用主循环
//!
//! 负责窗口、图形设备、呈现表面与会话的装配，并把窗口事件驱动到帧循环：
//! - 窗口模式：`RedrawRequested` 触发 `FrameLoop::on_windowed_tick`
//! - 头显模式：`AboutToWait` 中取出模拟会话调度的帧并触发 `on_headset_tick`
//!
//! 会话 `Start` / `End` 事件通过 `FrameLoop::set_session` 切换调度源。

use crate::config::AppConfig;
use crate::core::error::{EngineError, EngineResult, RenderError, RenderResult};
use crate::core::logging::init_logging;
use crate::platform::{WinitFrameQueue, WinitScheduler};
use crate::render::camera::Camera;
use crate::render::particles::SpawnPoint;
use crate::render::{EmptyScene, GpuContext};
use crate::xr::session::SessionPayload;
use crate::xr::simulated::{head_yaw, SimulatedHost};
use crate::xr::{
    ActiveSession, FrameLoop, FrameOutcome, FrameTick, HeadsetFrame, SessionEventKind,
    SessionManager, SessionMode, StereoPresenter, Viewport, XrRenderer,
};
use glam::{Mat4, Vec2, Vec3, Vec4};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

/// 模拟头显的帧间隔
const HEADSET_FRAME_INTERVAL: Duration = Duration::from_millis(11);

/// 启动选项
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// 启动后立即请求头显会话
    pub headset: bool,
    /// 显式配置文件路径（.toml / .json）
    pub config_path: Option<String>,
}

impl EngineOptions {
    /// 解析命令行参数：`--headset`、`--config <path>`
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut options = Self::default();
        let mut args = args.into_iter().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--headset" => options.headset = true,
                "--config" => options.config_path = args.next(),
                other => eprintln!("Ignoring unknown argument: {}", other),
            }
        }
        options
    }

    pub fn load_config(&self) -> EngineResult<AppConfig> {
        let mut config = match &self.config_path {
            Some(path) if path.ends_with(".json") => AppConfig::from_json_file(path)?,
            Some(path) => AppConfig::from_toml_file(path)?,
            None => AppConfig::load_or_default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

type Sessions = Rc<RefCell<SessionManager<SimulatedHost>>>;

/// 帧错误出口
///
/// 瞬时错误只记日志；设备丢失停止帧循环并保留下来，由 `Engine::run` 返回给调用方重建。
#[derive(Debug, Clone, Default)]
pub struct FrameFailures {
    fatal: Rc<RefCell<Option<RenderError>>>,
}

impl FrameFailures {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一帧的结果，设备丢失时返回 `true`
    pub fn route(&self, result: RenderResult<()>, frame_loop: Option<&FrameLoop>) -> bool {
        let Err(e) = result else {
            return false;
        };
        if !e.is_device_lost() {
            tracing::warn!(target: "engine", error = %e, "Frame failed");
            return false;
        }

        tracing::error!(target: "engine", error = %e, "Stopping frame loop");
        if let Some(frame_loop) = frame_loop {
            if frame_loop.is_running() {
                frame_loop.stop();
            }
        }
        let mut fatal = self.fatal.borrow_mut();
        if fatal.is_none() {
            *fatal = Some(e);
        }
        true
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.borrow().is_some()
    }

    pub fn take(&self) -> Option<RenderError> {
        self.fatal.borrow_mut().take()
    }
}

/// 引擎入口
pub struct Engine;

impl Engine {
    /// 运行直到窗口关闭或设备丢失
    pub fn run(options: EngineOptions) -> EngineResult<()> {
        let config = options.load_config()?;
        init_logging(&config.logging);
        tracing::info!(target: "engine", headset = options.headset, "Linkfield starting");

        let event_loop = EventLoop::new()
            .map_err(|e| EngineError::EventLoop(format!("Failed to create event loop: {}", e)))?;
        let window = Arc::new(
            WindowBuilder::new()
                .with_title("Linkfield")
                .with_inner_size(PhysicalSize::new(
                    config.presentation.window.width,
                    config.presentation.window.height,
                ))
                .build(&event_loop)
                .map_err(|e| EngineError::Window(e.to_string()))?,
        );

        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| RenderError::SurfaceCreation(e.to_string()))?;
        let context = pollster::block_on(GpuContext::new(instance, Some(&surface)))?;
        let surface_config = configure_surface(&surface, &context, window.inner_size())?;

        let renderer = XrRenderer::new(&context, &config, Box::new(EmptyScene))?;
        let state = Rc::new(RefCell::new(FrameState {
            surface,
            surface_config,
            device: context.device.clone(),
            renderer,
            presenter: StereoPresenter::new(config.presentation.max_frame_delta),
            near: config.presentation.near,
            far: config.presentation.far,
            pointer: None,
            pointer_down: false,
        }));

        let (scheduler, redraws) = WinitScheduler::new(window.clone());
        let frame_loop = Rc::new(FrameLoop::new(Box::new(scheduler)));

        let mut manager = SessionManager::new(SimulatedHost::new(
            config.presentation.simulated_headset.clone(),
        ));
        manager.set_device(context.device.clone());
        let sessions: Sessions = Rc::new(RefCell::new(manager));
        Self::wire_session_events(&sessions, &frame_loop, &state);

        let failures = FrameFailures::new();
        frame_loop.start(Self::frame_callback(&state, &sessions, &frame_loop, &failures));
        if options.headset {
            Self::toggle_headset(&sessions);
        }

        Self::run_event_loop(event_loop, state, sessions, frame_loop, redraws, failures.clone())?;
        if let Some(e) = failures.take() {
            tracing::error!(target: "engine", error = %e, "Linkfield stopped after device loss");
            return Err(EngineError::Render(e));
        }
        tracing::info!(target: "engine", "Linkfield shutting down");
        Ok(())
    }

    /// 会话开始/结束时切换帧循环的调度源
    fn wire_session_events(sessions: &Sessions, frame_loop: &Rc<FrameLoop>, state: &Rc<RefCell<FrameState>>) {
        let mut manager = sessions.borrow_mut();

        let on_start_loop = frame_loop.clone();
        let on_start_state = state.clone();
        manager.on(
            SessionEventKind::Start,
            Rc::new(move |session: &SessionPayload| {
                if let Ok(mut state) = on_start_state.try_borrow_mut() {
                    state.presenter.reset_clock();
                }
                on_start_loop.set_session(session.clone(), None);
            }),
        );

        let on_end_loop = frame_loop.clone();
        let on_end_state = state.clone();
        manager.on(
            SessionEventKind::End,
            Rc::new(move |_: &SessionPayload| {
                if let Ok(mut state) = on_end_state.try_borrow_mut() {
                    state.presenter.reset_clock();
                }
                on_end_loop.set_session(None, None);
            }),
        );
    }

    fn frame_callback(
        state: &Rc<RefCell<FrameState>>,
        sessions: &Sessions,
        frame_loop: &Rc<FrameLoop>,
        failures: &FrameFailures,
    ) -> Box<dyn FnMut(FrameTick<'_>)> {
        let state = state.clone();
        let sessions = sessions.clone();
        let failures = failures.clone();
        let frame_loop: Weak<FrameLoop> = Rc::downgrade(frame_loop);

        Box::new(move |tick: FrameTick<'_>| {
            let result = match tick {
                FrameTick::Windowed { time } => state.borrow_mut().present_windowed(time),
                FrameTick::Headset { frame, .. } => {
                    let active = sessions.borrow().active().cloned();
                    match active {
                        Some(active) => state.borrow_mut().present_headset(frame, &active),
                        None => Ok(()),
                    }
                }
            };

            failures.route(result, frame_loop.upgrade().as_deref());
        })
    }

    fn toggle_headset(sessions: &Sessions) {
        let mut manager = sessions.borrow_mut();
        let result = if manager.is_active() {
            manager.end_session()
        } else {
            manager.request_session(SessionMode::ImmersiveVr)
        };
        if let Err(e) = result {
            tracing::warn!(target: "xr", error = %e, "Headset toggle failed");
        }
    }

    fn run_event_loop(
        event_loop: EventLoop<()>,
        state: Rc<RefCell<FrameState>>,
        sessions: Sessions,
        frame_loop: Rc<FrameLoop>,
        redraws: WinitFrameQueue,
        failures: FrameFailures,
    ) -> EngineResult<()> {
        let started = Instant::now();

        let result = event_loop.run(move |event, elwt| match event {
            Event::WindowEvent { event, .. } => {
                Self::handle_window_event(&event, &state, &sessions, &frame_loop, &redraws, started, elwt);
                if failures.is_fatal() {
                    elwt.exit();
                }
            }
            Event::AboutToWait => {
                if failures.is_fatal() {
                    elwt.exit();
                    return;
                }
                let session = sessions.borrow().host().session();
                if let Some(session) = session {
                    let now = started.elapsed().as_secs_f64();
                    session.set_head_pose(head_yaw((now * 0.4).sin() as f32 * 0.35));
                    for token in session.take_scheduled() {
                        let frame = session.frame(now);
                        frame_loop.on_headset_tick(token, &frame);
                    }
                    if failures.is_fatal() {
                        elwt.exit();
                        return;
                    }
                    elwt.set_control_flow(ControlFlow::WaitUntil(Instant::now() + HEADSET_FRAME_INTERVAL));
                } else {
                    elwt.set_control_flow(ControlFlow::Wait);
                }
            }
            Event::LoopExiting => {
                let stats = state.borrow().presenter.stats();
                tracing::info!(
                    target: "engine",
                    presented = stats.presented,
                    skipped = stats.skipped,
                    submissions = stats.submissions,
                    "Presenter statistics"
                );
            }
            _ => {}
        });

        result.map_err(|e| EngineError::EventLoop(format!("Event loop error: {}", e)))
    }

    fn handle_window_event(
        event: &WindowEvent,
        state: &Rc<RefCell<FrameState>>,
        sessions: &Sessions,
        frame_loop: &Rc<FrameLoop>,
        redraws: &WinitFrameQueue,
        started: Instant,
        elwt: &EventLoopWindowTarget<()>,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                frame_loop.stop();
                elwt.exit();
            }
            WindowEvent::Resized(size) => state.borrow_mut().resize(*size),
            WindowEvent::CursorMoved { position, .. } => {
                state.borrow_mut().pointer = Some(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::CursorLeft { .. } => state.borrow_mut().pointer = None,
            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => {
                state.borrow_mut().pointer_down = *button_state == ElementState::Pressed;
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed && !event.repeat => {
                match &event.logical_key {
                    Key::Named(NamedKey::Escape) => {
                        frame_loop.stop();
                        elwt.exit();
                    }
                    Key::Character(c) if c.eq_ignore_ascii_case("h") => Self::toggle_headset(sessions),
                    _ => {}
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(token) = redraws.take() {
                    frame_loop.on_windowed_tick(token, started.elapsed().as_secs_f64());
                }
            }
            _ => {}
        }
    }
}

/// 每帧需要的渲染状态
struct FrameState {
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    device: Arc<wgpu::Device>,
    renderer: XrRenderer,
    presenter: StereoPresenter,
    near: f32,
    far: f32,
    /// 指针位置（物理像素）
    pointer: Option<Vec2>,
    pointer_down: bool,
}

impl FrameState {
    fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.surface_config.width = size.width;
        self.surface_config.height = size.height;
        self.surface.configure(&self.device, &self.surface_config);
    }

    fn present_windowed(&mut self, time: f64) -> RenderResult<()> {
        let (width, height) = (self.surface_config.width, self.surface_config.height);
        let aspect = width as f32 / height.max(1) as f32;
        let orbit = (time * 0.1) as f32;
        let camera = Camera::look_at(
            Vec3::new(orbit.sin() * 0.6, 0.0, 3.0),
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_4,
            aspect,
            self.near,
            self.far,
        );

        let primary = match (self.pointer, self.pointer_down) {
            (Some(pointer), true) => pointer_on_plane(&camera, pointer, width, height)
                .map(SpawnPoint::active)
                .unwrap_or_default(),
            _ => SpawnPoint::default(),
        };
        let secondary = SpawnPoint::active(lissajous(time, 0.0));
        self.renderer.apply_spawn_points(&[primary, secondary]);

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::debug!(target: "present", "Surface acquire timed out");
                return Ok(());
            }
            Err(e) => return Err(RenderError::Surface(e.to_string())),
        };

        let viewport = Viewport::new(0, 0, width, height);
        let outcome = self.presenter.present_windowed(
            &mut self.renderer,
            time,
            &camera,
            &frame.texture,
            &viewport,
        )?;
        frame.present();

        if let FrameOutcome::Skipped(reason) = outcome {
            tracing::debug!(target: "present", %reason, "Windowed frame skipped");
        }
        Ok(())
    }

    fn present_headset(
        &mut self,
        frame: &dyn HeadsetFrame,
        active: &ActiveSession<Arc<wgpu::Texture>>,
    ) -> RenderResult<()> {
        // 模拟手柄：头部前方两条错开的轨迹
        let time = frame.time();
        let reach = Vec3::new(0.0, 1.4, -0.8);
        self.renderer.apply_spawn_points(&[
            SpawnPoint::active(reach + lissajous(time, 0.0) * 0.4),
            SpawnPoint::active(reach + lissajous(time, std::f64::consts::PI) * 0.4),
        ]);

        self.presenter
            .present_headset(&mut self.renderer, frame, active)
            .map(|_| ())
    }
}

fn configure_surface(
    surface: &wgpu::Surface<'static>,
    context: &GpuContext,
    size: PhysicalSize<u32>,
) -> RenderResult<wgpu::SurfaceConfiguration> {
    let mut config = surface
        .get_default_config(&context.adapter, size.width.max(1), size.height.max(1))
        .ok_or_else(|| RenderError::Surface("surface not supported by adapter".to_string()))?;

    // 支持拷贝写入时允许直接拷贝路径
    let caps = surface.get_capabilities(&context.adapter);
    if caps.usages.contains(wgpu::TextureUsages::COPY_DST) {
        config.usage |= wgpu::TextureUsages::COPY_DST;
    }
    surface.configure(&context.device, &config);

    tracing::info!(
        target: "present",
        format = ?config.format,
        width = config.width,
        height = config.height,
        "Surface configured"
    );
    Ok(config)
}

/// 指针在 z = 0 平面上的世界坐标
fn pointer_on_plane(camera: &Camera, pointer: Vec2, width: u32, height: u32) -> Option<Vec3> {
    let ndc = Vec2::new(
        pointer.x / width.max(1) as f32 * 2.0 - 1.0,
        1.0 - pointer.y / height.max(1) as f32 * 2.0,
    );
    let inverse: Mat4 = camera.view_projection().inverse();
    let unproject = |depth: f32| {
        let p = inverse * Vec4::new(ndc.x, ndc.y, depth, 1.0);
        p.truncate() / p.w
    };
    let near = unproject(0.0);
    let far = unproject(1.0);
    let direction = far - near;
    if direction.z.abs() < f32::EPSILON {
        return None;
    }
    let t = -near.z / direction.z;
    (t >= 0.0).then(|| near + direction * t)
}

fn lissajous(time: f64, phase: f64) -> Vec3 {
    Vec3::new(
        (time * 0.7 + phase).sin() as f32,
        (time * 1.1 + phase).sin() as f32 * 0.6,
        0.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = ["linkfield", "--headset", "--config", "demo.toml"].map(String::from);
        let options = EngineOptions::from_args(args);
        assert!(options.headset);
        assert_eq!(options.config_path.as_deref(), Some("demo.toml"));
    }

    #[test]
    fn test_missing_config_file_is_config_error() {
        let options = EngineOptions {
            headset: false,
            config_path: Some("/nonexistent/linkfield.toml".to_string()),
        };
        let err = options.load_config().unwrap_err();
        assert!(matches!(
            err,
            EngineError::Config(crate::config::ConfigError::FileError(_))
        ));
    }

    #[test]
    fn test_failures_keep_only_device_loss() {
        let failures = FrameFailures::new();
        assert!(!failures.route(Ok(()), None));
        assert!(!failures.route(Err(RenderError::Surface("timeout".into())), None));
        assert!(!failures.is_fatal());

        assert!(failures.route(Err(RenderError::DeviceLost("first".into())), None));
        assert!(failures.route(Err(RenderError::DeviceLost("second".into())), None));
        assert_eq!(failures.take(), Some(RenderError::DeviceLost("first".into())));
        assert!(failures.take().is_none());
    }

    #[test]
    fn test_pointer_center_hits_target() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, 0.8, 1.0, 0.1, 100.0);
        let hit = pointer_on_plane(&camera, Vec2::new(50.0, 50.0), 100, 100).unwrap();
        assert!(hit.length() < 1e-3);
    }
}
