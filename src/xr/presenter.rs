//! 立体呈现
//!
//! 每帧：取观察者姿态 → 收集所有视图的子图像 → 计算一次 →
//! 逐视图渲染到共享离屏目标并传输到对应子图像 → 提交一次。
//! 任一前置条件不满足时在编码前跳过整帧。

use super::{ActiveSession, FrameSkip, HeadsetFrame, SubImage, Viewport, MAX_VIEWS};
use crate::core::error::RenderResult;
use crate::render::camera::Camera;
use crate::render::transfer::TransferStrategy;
use glam::Vec3;
use std::borrow::Borrow;

/// 呈现后端
///
/// 生产实现为 [`XrRenderer`](super::XrRenderer)；测试中使用计数替身。
pub trait StereoBackend {
    /// 单帧命令编码器
    type Encoder;
    /// 目标纹理
    type Texture;

    /// 开始一帧；设备丢失时返回错误
    fn begin_frame(&mut self) -> RenderResult<Self::Encoder>;

    /// 运行所有发射器的计算阶段
    fn compute(&mut self, encoder: &mut Self::Encoder, delta_time: f32, facing: Vec3);

    /// 确保离屏目标存在且尺寸匹配
    fn ensure_target(&mut self, width: u32, height: u32) -> RenderResult<()>;

    /// 以 `camera` 渲染场景与粒子到离屏目标，相机写入槽 `slot`
    fn render_view(
        &mut self,
        encoder: &mut Self::Encoder,
        camera: &Camera,
        slot: u32,
    ) -> RenderResult<()>;

    /// 离屏目标传输到 `destination` 的 `layer` 层 `viewport` 区域
    fn transfer(
        &mut self,
        encoder: &mut Self::Encoder,
        destination: &Self::Texture,
        viewport: &Viewport,
        layer: u32,
    ) -> RenderResult<TransferStrategy>;

    /// 提交本帧命令
    fn submit(&mut self, encoder: Self::Encoder) -> RenderResult<()>;
}

/// 帧时钟：时间戳（秒）转换为截断后的帧间隔
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    last: Option<f64>,
    max_delta: f32,
}

impl FrameClock {
    /// 首帧的帧间隔
    pub const FIRST_DELTA: f32 = 1.0 / 60.0;

    pub fn new(max_delta: f32) -> Self {
        Self {
            last: None,
            max_delta,
        }
    }

    pub fn tick(&mut self, time: f64) -> f32 {
        let delta = match self.last {
            Some(last) => ((time - last) as f32).clamp(0.0, self.max_delta),
            None => Self::FIRST_DELTA.min(self.max_delta),
        };
        self.last = Some(time);
        delta
    }

    /// 模式切换后重新从首帧开始
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// 呈现统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenterStats {
    pub presented: u64,
    pub skipped: u64,
    pub submissions: u64,
    pub computes: u64,
}

/// 单帧结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { views: usize },
    Skipped(FrameSkip),
}

/// 立体呈现器
#[derive(Debug)]
pub struct StereoPresenter {
    clock: FrameClock,
    stats: PresenterStats,
}

impl StereoPresenter {
    pub fn new(max_frame_delta: f32) -> Self {
        Self {
            clock: FrameClock::new(max_frame_delta),
            stats: PresenterStats::default(),
        }
    }

    pub fn stats(&self) -> PresenterStats {
        self.stats
    }

    pub fn reset_clock(&mut self) {
        self.clock.reset();
    }

    /// 呈现一帧头显画面
    pub fn present_headset<B, T>(
        &mut self,
        backend: &mut B,
        frame: &dyn HeadsetFrame,
        active: &ActiveSession<T>,
    ) -> RenderResult<FrameOutcome>
    where
        B: StereoBackend,
        T: Borrow<B::Texture>,
    {
        let pose = match frame.viewer_pose(&active.reference_space) {
            Some(pose) if !pose.views.is_empty() => pose,
            _ => return Ok(self.skip(FrameSkip::NoViewerPose)),
        };

        let mut views = pose.views.as_slice();
        if views.len() > MAX_VIEWS as usize {
            tracing::warn!(
                target: "present",
                views = views.len(),
                max = MAX_VIEWS,
                "Extra views ignored"
            );
            views = &views[..MAX_VIEWS as usize];
        }

        let mut targets: Vec<(Camera, SubImage<T>)> = Vec::with_capacity(views.len());
        for (index, view) in views.iter().enumerate() {
            match active.binding.view_sub_image(&active.layer, index, view) {
                Some(sub) => targets.push((view.camera(), sub)),
                None => return Ok(self.skip(FrameSkip::NoSubImage { view: index })),
            }
        }

        let (width, height) = (active.layer.texture_width, active.layer.texture_height);
        if width == 0 || height == 0 {
            return Ok(self.skip(FrameSkip::NoOffscreenTarget));
        }

        // 跳过的帧不推进时钟，下一帧的间隔覆盖这段时间
        let delta_time = self.clock.tick(frame.time());
        let mut encoder = backend.begin_frame()?;
        backend.ensure_target(width, height)?;

        let facing = targets[0].0.forward();
        backend.compute(&mut encoder, delta_time, facing);
        self.stats.computes += 1;

        for (index, (camera, sub)) in targets.iter().enumerate() {
            backend.render_view(&mut encoder, camera, index as u32)?;
            backend.transfer(
                &mut encoder,
                sub.texture.borrow(),
                &sub.viewport,
                sub.array_layer(index),
            )?;
        }

        backend.submit(encoder)?;
        self.stats.submissions += 1;
        self.stats.presented += 1;

        Ok(FrameOutcome::Presented {
            views: targets.len(),
        })
    }

    /// 呈现一帧窗口画面（单视图，第 0 层）
    pub fn present_windowed<B: StereoBackend>(
        &mut self,
        backend: &mut B,
        time: f64,
        camera: &Camera,
        destination: &B::Texture,
        viewport: &Viewport,
    ) -> RenderResult<FrameOutcome> {
        if viewport.is_empty() {
            return Ok(self.skip(FrameSkip::NoOffscreenTarget));
        }
        let delta_time = self.clock.tick(time);

        let mut encoder = backend.begin_frame()?;
        backend.ensure_target(viewport.width, viewport.height)?;
        backend.compute(&mut encoder, delta_time, camera.forward());
        self.stats.computes += 1;

        backend.render_view(&mut encoder, camera, 0)?;
        backend.transfer(&mut encoder, destination, viewport, 0)?;

        backend.submit(encoder)?;
        self.stats.submissions += 1;
        self.stats.presented += 1;
        Ok(FrameOutcome::Presented { views: 1 })
    }

    fn skip(&mut self, reason: FrameSkip) -> FrameOutcome {
        self.stats.skipped += 1;
        tracing::debug!(target: "present", %reason, "Frame skipped");
        FrameOutcome::Skipped(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RenderError;
    use crate::xr::{
        Fov, FrameToken, GpuBinding, HeadsetSession, Pose, ProjectionLayer,
        ProjectionLayerDescriptor, ReferenceSpace, ReferenceSpaceType, ViewerPose, XrResult,
        XrView,
    };
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct CountingBackend {
        computes: u32,
        submits: u32,
        renders: Vec<u32>,
        transfers: Vec<(u32, u32)>,
        facings: Vec<Vec3>,
        deltas: Vec<f32>,
        target: Option<(u32, u32)>,
        lost: bool,
    }

    impl StereoBackend for CountingBackend {
        type Encoder = Vec<&'static str>;
        type Texture = u32;

        fn begin_frame(&mut self) -> RenderResult<Self::Encoder> {
            if self.lost {
                return Err(RenderError::DeviceLost("test".into()));
            }
            Ok(Vec::new())
        }

        fn compute(&mut self, encoder: &mut Self::Encoder, dt: f32, facing: Vec3) {
            encoder.push("compute");
            self.deltas.push(dt);
            self.computes += 1;
            self.facings.push(facing);
        }

        fn ensure_target(&mut self, width: u32, height: u32) -> RenderResult<()> {
            self.target = Some((width, height));
            Ok(())
        }

        fn render_view(&mut self, encoder: &mut Self::Encoder, _camera: &Camera, slot: u32) -> RenderResult<()> {
            encoder.push("render");
            self.renders.push(slot);
            Ok(())
        }

        fn transfer(
            &mut self,
            encoder: &mut Self::Encoder,
            destination: &u32,
            _viewport: &Viewport,
            layer: u32,
        ) -> RenderResult<TransferStrategy> {
            encoder.push("transfer");
            self.transfers.push((*destination, layer));
            Ok(TransferStrategy::DirectCopy)
        }

        fn submit(&mut self, encoder: Self::Encoder) -> RenderResult<()> {
            assert_eq!(encoder.first(), Some(&"compute"));
            assert_eq!(encoder.iter().filter(|s| **s == "compute").count(), 1);
            self.submits += 1;
            Ok(())
        }
    }

    struct NullSession;

    impl HeadsetSession for NullSession {
        fn id(&self) -> u64 {
            0
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
        fn request_animation_frame(&self, _token: FrameToken) -> u64 {
            0
        }
        fn cancel_animation_frame(&self, _handle: u64) {}
        fn end(&self) -> XrResult<()> {
            Ok(())
        }
    }

    /// 所有视图共享纹理 7；`missing` 视图没有子图像
    struct ArrayBinding {
        missing: Option<usize>,
        image_index: Option<u32>,
    }

    impl GpuBinding for ArrayBinding {
        type Texture = u32;

        fn preferred_color_format(&self) -> wgpu::TextureFormat {
            wgpu::TextureFormat::Rgba8Unorm
        }
        fn create_projection_layer(&self, descriptor: &ProjectionLayerDescriptor) -> XrResult<ProjectionLayer> {
            Ok(layer(*descriptor, 32))
        }
        fn view_sub_image(&self, _layer: &ProjectionLayer, view_index: usize, _view: &XrView) -> Option<SubImage<u32>> {
            if self.missing == Some(view_index) {
                return None;
            }
            Some(SubImage {
                texture: 7,
                viewport: Viewport::new(0, 0, 32, 32),
                image_index: self.image_index,
                color_format: wgpu::TextureFormat::Rgba8Unorm,
                texture_width: 32,
                texture_height: 32,
            })
        }
    }

    fn layer(descriptor: ProjectionLayerDescriptor, size: u32) -> ProjectionLayer {
        ProjectionLayer {
            id: 1,
            descriptor,
            texture_width: size,
            texture_height: size,
            array_layers: 2,
        }
    }

    fn active(binding: ArrayBinding, size: u32) -> ActiveSession<u32> {
        ActiveSession {
            session: Rc::new(NullSession),
            binding: Rc::new(binding),
            layer: layer(
                ProjectionLayerDescriptor::for_color(wgpu::TextureFormat::Rgba8Unorm),
                size,
            ),
            reference_space: ReferenceSpace {
                kind: ReferenceSpaceType::LocalFloor,
                origin: Pose::default(),
            },
        }
    }

    struct TestFrame {
        time: f64,
        views: usize,
    }

    impl HeadsetFrame for TestFrame {
        fn time(&self) -> f64 {
            self.time
        }
        fn viewer_pose(&self, _space: &ReferenceSpace) -> Option<ViewerPose> {
            if self.views == 0 {
                return None;
            }
            let fov = Fov::symmetric(0.7);
            let views = (0..self.views)
                .map(|i| {
                    let pose = Pose {
                        position: Vec3::new(i as f32 * 0.064, 1.6, 0.0),
                        ..Default::default()
                    };
                    XrView::from_pose(&pose, &fov, 0.05, 100.0)
                })
                .collect();
            Some(ViewerPose {
                transform: Pose::default(),
                views,
            })
        }
    }

    fn stereo() -> ArrayBinding {
        ArrayBinding {
            missing: None,
            image_index: None,
        }
    }

    #[test]
    fn test_frame_clock() {
        let mut clock = FrameClock::new(0.05);
        assert!((clock.tick(10.0) - 1.0 / 60.0).abs() < 1e-6);
        assert!((clock.tick(10.02) - 0.02).abs() < 1e-5);
        assert_eq!(clock.tick(11.0), 0.05);
        assert_eq!(clock.tick(10.5), 0.0);
        clock.reset();
        assert!((clock.tick(20.0) - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_one_compute_and_submit_for_any_view_count() {
        for views in 1..=4 {
            let mut backend = CountingBackend::default();
            let mut presenter = StereoPresenter::new(0.05);
            let outcome = presenter
                .present_headset(&mut backend, &TestFrame { time: 1.0, views }, &active(stereo(), 32))
                .unwrap();

            assert_eq!(outcome, FrameOutcome::Presented { views });
            assert_eq!(backend.computes, 1);
            assert_eq!(backend.submits, 1);
            assert_eq!(backend.renders, (0..views as u32).collect::<Vec<_>>());
            assert_eq!(backend.target, Some((32, 32)));
        }
    }

    #[test]
    fn test_array_layer_follows_view_index() {
        let mut backend = CountingBackend::default();
        let mut presenter = StereoPresenter::new(0.05);
        presenter
            .present_headset(&mut backend, &TestFrame { time: 1.0, views: 2 }, &active(stereo(), 32))
            .unwrap();
        assert_eq!(backend.transfers, vec![(7, 0), (7, 1)]);

        let mut backend = CountingBackend::default();
        let binding = ArrayBinding {
            missing: None,
            image_index: Some(0),
        };
        presenter
            .present_headset(&mut backend, &TestFrame { time: 1.1, views: 2 }, &active(binding, 32))
            .unwrap();
        assert_eq!(backend.transfers, vec![(7, 0), (7, 0)]);
    }

    #[test]
    fn test_no_viewer_pose_skips_without_submission() {
        let mut backend = CountingBackend::default();
        let mut presenter = StereoPresenter::new(0.05);
        let outcome = presenter
            .present_headset(&mut backend, &TestFrame { time: 1.0, views: 0 }, &active(stereo(), 32))
            .unwrap();

        assert_eq!(outcome, FrameOutcome::Skipped(FrameSkip::NoViewerPose));
        assert_eq!((backend.computes, backend.submits), (0, 0));
        assert_eq!(presenter.stats().skipped, 1);
    }

    #[test]
    fn test_skipped_frame_time_carries_into_next_step() {
        let mut backend = CountingBackend::default();
        let mut presenter = StereoPresenter::new(0.05);
        let session = active(stereo(), 32);
        for (time, views) in [(1.0, 2), (1.02, 0), (1.04, 2)] {
            presenter
                .present_headset(&mut backend, &TestFrame { time, views }, &session)
                .unwrap();
        }

        assert_eq!(backend.deltas.len(), 2);
        assert!((backend.deltas[0] - FrameClock::FIRST_DELTA).abs() < 1e-6);
        assert!((backend.deltas[1] - 0.04).abs() < 1e-5);
        assert_eq!(presenter.stats().skipped, 1);
    }

    #[test]
    fn test_missing_sub_image_skips_before_encoding() {
        let mut backend = CountingBackend::default();
        let mut presenter = StereoPresenter::new(0.05);
        let binding = ArrayBinding {
            missing: Some(1),
            image_index: None,
        };
        let outcome = presenter
            .present_headset(&mut backend, &TestFrame { time: 1.0, views: 2 }, &active(binding, 32))
            .unwrap();

        assert_eq!(outcome, FrameOutcome::Skipped(FrameSkip::NoSubImage { view: 1 }));
        assert!(backend.renders.is_empty());
        assert_eq!(backend.submits, 0);
    }

    #[test]
    fn test_zero_sized_layer_skips() {
        let mut backend = CountingBackend::default();
        let mut presenter = StereoPresenter::new(0.05);
        let outcome = presenter
            .present_headset(&mut backend, &TestFrame { time: 1.0, views: 2 }, &active(stereo(), 0))
            .unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped(FrameSkip::NoOffscreenTarget));
    }

    #[test]
    fn test_device_loss_propagates() {
        let mut backend = CountingBackend {
            lost: true,
            ..Default::default()
        };
        let mut presenter = StereoPresenter::new(0.05);
        let result = presenter.present_headset(&mut backend, &TestFrame { time: 1.0, views: 2 }, &active(stereo(), 32));
        assert!(matches!(result, Err(RenderError::DeviceLost(_))));
        assert_eq!(presenter.stats().submissions, 0);
    }

    #[test]
    fn test_windowed_frame() {
        let mut backend = CountingBackend::default();
        let mut presenter = StereoPresenter::new(0.05);
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0, 1.0, 0.1, 100.0);
        let outcome = presenter
            .present_windowed(&mut backend, 0.5, &camera, &3, &Viewport::new(0, 0, 64, 48))
            .unwrap();

        assert_eq!(outcome, FrameOutcome::Presented { views: 1 });
        assert_eq!(backend.transfers, vec![(3, 0)]);
        assert_eq!(backend.target, Some((64, 48)));
        assert!((backend.facings[0] - Vec3::NEG_Z).length() < 1e-5);
    }
}
