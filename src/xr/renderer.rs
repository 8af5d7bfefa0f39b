//! wgpu 呈现后端
//!
//! 持有粒子场、共享离屏目标与传输器；每帧一个命令编码器、一次提交。

use super::presenter::StereoBackend;
use super::{Viewport, MAX_VIEWS};
use crate::config::AppConfig;
use crate::core::error::{RenderError, RenderResult};
use crate::render::camera::Camera;
use crate::render::offscreen::OffscreenTarget;
use crate::render::particles::{
    GpuComputeEncoder, GpuParticleStore, ParticleField, ParticlePipelines, ParticleRenderer,
    SpawnPoint,
};
use crate::render::transfer::{TextureTransfer, TransferStrategy};
use crate::render::{DeviceLossFlag, GpuContext, SceneContext, SceneDrawer};
use glam::Vec3;
use std::sync::Arc;
use wgpu::{CommandEncoder, Device, Queue, Texture, TextureFormat};

/// 头显/窗口共用的渲染器
pub struct XrRenderer {
    device: Arc<Device>,
    queue: Arc<Queue>,
    device_loss: DeviceLossFlag,
    pipelines: ParticlePipelines,
    particle_renderer: ParticleRenderer,
    field: ParticleField<GpuParticleStore>,
    scene: Box<dyn SceneDrawer>,
    /// 共享离屏目标，首帧时按单眼尺寸创建
    offscreen: Option<OffscreenTarget>,
    offscreen_format: TextureFormat,
    transfer: TextureTransfer,
    clear_color: wgpu::Color,
}

impl XrRenderer {
    pub fn new(
        context: &GpuContext,
        config: &AppConfig,
        scene: Box<dyn SceneDrawer>,
    ) -> RenderResult<Self> {
        config
            .validate()
            .map_err(|e| RenderError::InvalidConfiguration(e.to_string()))?;

        let device = context.device.clone();
        let offscreen_format = config.presentation.offscreen_format.to_wgpu();
        let pipelines = ParticlePipelines::new(&device);
        let particle_renderer =
            ParticleRenderer::new(&device, &pipelines, offscreen_format, MAX_VIEWS);

        let mut field = ParticleField::new();
        for emitter in &config.emitters {
            let store = GpuParticleStore::new(&device, &pipelines, emitter.particle_count);
            field.add_emitter(store, emitter.batch_size, emitter.params)?;
        }

        let [r, g, b, a] = config.presentation.clear_color;
        tracing::info!(
            target: "present",
            emitters = field.len(),
            format = ?offscreen_format,
            "Renderer created"
        );

        Ok(Self {
            transfer: TextureTransfer::new(&device),
            device,
            queue: context.queue.clone(),
            device_loss: context.device_loss.clone(),
            pipelines,
            particle_renderer,
            field,
            scene,
            offscreen: None,
            offscreen_format,
            clear_color: wgpu::Color { r, g, b, a },
        })
    }

    pub fn field(&self) -> &ParticleField<GpuParticleStore> {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut ParticleField<GpuParticleStore> {
        &mut self.field
    }

    /// 本帧生成点（索引 0 主发射器，索引 1 副发射器）
    pub fn apply_spawn_points(&mut self, points: &[SpawnPoint]) {
        self.field.apply_spawn_points(points);
    }

    pub fn offscreen(&self) -> Option<&OffscreenTarget> {
        self.offscreen.as_ref()
    }

    pub fn transfer_pipelines(&self) -> usize {
        self.transfer.cached_pipelines()
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }
}

impl StereoBackend for XrRenderer {
    type Encoder = CommandEncoder;
    type Texture = Texture;

    fn begin_frame(&mut self) -> RenderResult<CommandEncoder> {
        self.device_loss.check()?;
        Ok(self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Linkfield Frame Encoder"),
            }))
    }

    fn compute(&mut self, encoder: &mut CommandEncoder, delta_time: f32, facing: Vec3) {
        self.field.set_facing(facing);
        let mut compute = GpuComputeEncoder::new(&self.queue, encoder, &self.pipelines);
        self.field.compute_all(&mut compute, delta_time);
    }

    fn ensure_target(&mut self, width: u32, height: u32) -> RenderResult<()> {
        match self.offscreen.as_mut() {
            Some(target) => {
                target.resize(&self.device, width, height);
            }
            None => {
                self.offscreen = Some(OffscreenTarget::new(
                    &self.device,
                    width,
                    height,
                    self.offscreen_format,
                ));
            }
        }
        Ok(())
    }

    fn render_view(
        &mut self,
        encoder: &mut CommandEncoder,
        camera: &Camera,
        slot: u32,
    ) -> RenderResult<()> {
        self.particle_renderer.write_camera(&self.queue, slot, camera)?;
        let target = self
            .offscreen
            .as_ref()
            .ok_or_else(|| RenderError::InvalidState("offscreen target not created".into()))?;

        let stores: Vec<&GpuParticleStore> =
            self.field.emitters().iter().map(|e| e.store()).collect();

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Linkfield View Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &target.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        self.scene.draw(
            &mut rpass,
            SceneContext {
                camera,
                camera_bind_group: self.particle_renderer.camera_bind_group(),
                camera_offset: ParticleRenderer::camera_offset(slot),
            },
        );
        self.particle_renderer.draw(&mut rpass, slot, &stores);
        Ok(())
    }

    fn transfer(
        &mut self,
        encoder: &mut CommandEncoder,
        destination: &Texture,
        viewport: &Viewport,
        layer: u32,
    ) -> RenderResult<TransferStrategy> {
        let source = self
            .offscreen
            .as_ref()
            .ok_or_else(|| RenderError::InvalidState("offscreen target not created".into()))?;
        Ok(self
            .transfer
            .transfer(&self.device, encoder, source, destination, viewport, layer))
    }

    fn submit(&mut self, encoder: CommandEncoder) -> RenderResult<()> {
        self.device_loss.check()?;
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}
