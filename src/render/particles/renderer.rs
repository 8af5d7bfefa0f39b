//! 粒子渲染：精灵 + 连线带
//!
//! 两条管线都直接读取设备端缓冲：精灵以位置/速度缓冲为实例缓冲，
//! 连线带以连线缓冲为顶点缓冲、静态索引缓冲为索引。
//! 叠加混合，深度测试但不写深度。

use super::gpu::{GpuParticleStore, ParticlePipelines};
use super::params::LinkVertex;
use super::shaders;
use super::store::ParticleStore;
use crate::core::error::{RenderError, RenderResult};
use crate::render::camera::{Camera, CameraUniforms, CAMERA_SLOT_STRIDE};
use crate::render::offscreen::DEPTH_FORMAT;

/// 粒子渲染器
pub struct ParticleRenderer {
    camera_layout: wgpu::BindGroupLayout,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    sprite_pipeline: wgpu::RenderPipeline,
    ribbon_pipeline: wgpu::RenderPipeline,
    color_format: wgpu::TextureFormat,
    /// 相机槽数量（每个视图一个）
    view_slots: u32,
}

impl ParticleRenderer {
    pub fn new(
        device: &wgpu::Device,
        pipelines: &ParticlePipelines,
        color_format: wgpu::TextureFormat,
        view_slots: u32,
    ) -> Self {
        let view_slots = view_slots.max(1);
        let camera_size = std::mem::size_of::<CameraUniforms>() as u64;

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(camera_size),
                },
                count: None,
            }],
        });
        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Uniform Slots"),
            size: CAMERA_SLOT_STRIDE * view_slots as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &camera_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(camera_size),
                }),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Render Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::render_source().into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Render Pipeline Layout"),
            bind_group_layouts: &[&camera_layout, pipelines.sim_layout()],
            push_constant_ranges: &[],
        });

        const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] =
            wgpu::vertex_attr_array![0 => Float32x4];
        const VELOCITY_ATTRIBUTES: [wgpu::VertexAttribute; 1] =
            wgpu::vertex_attr_array![1 => Float32x4];
        let vec4_stride = std::mem::size_of::<[f32; 4]>() as u64;
        let sprite_buffers = [
            wgpu::VertexBufferLayout {
                array_stride: vec4_stride,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &POSITION_ATTRIBUTES,
            },
            wgpu::VertexBufferLayout {
                array_stride: vec4_stride,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &VELOCITY_ATTRIBUTES,
            },
        ];

        let sprite_pipeline = build_additive_pipeline(
            device,
            "Particle Sprite Pipeline",
            &layout,
            &shader,
            ("vs_sprite", "fs_sprite"),
            &sprite_buffers,
            color_format,
        );
        let ribbon_pipeline = build_additive_pipeline(
            device,
            "Particle Ribbon Pipeline",
            &layout,
            &shader,
            ("vs_ribbon", "fs_ribbon"),
            &[LinkVertex::vertex_buffer_layout()],
            color_format,
        );

        Self {
            camera_layout,
            camera_buffer,
            camera_bind_group,
            sprite_pipeline,
            ribbon_pipeline,
            color_format,
            view_slots,
        }
    }

    pub fn camera_layout(&self) -> &wgpu::BindGroupLayout {
        &self.camera_layout
    }

    pub fn camera_bind_group(&self) -> &wgpu::BindGroup {
        &self.camera_bind_group
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    pub fn view_slots(&self) -> u32 {
        self.view_slots
    }

    /// 相机槽的动态偏移
    pub fn camera_offset(slot: u32) -> u32 {
        (slot as u64 * CAMERA_SLOT_STRIDE) as u32
    }

    /// 写入某个视图的相机槽
    pub fn write_camera(&self, queue: &wgpu::Queue, slot: u32, camera: &Camera) -> RenderResult<()> {
        if slot >= self.view_slots {
            return Err(RenderError::InvalidState(format!(
                "camera slot {} out of range ({} slots)",
                slot, self.view_slots
            )));
        }
        queue.write_buffer(
            &self.camera_buffer,
            Self::camera_offset(slot) as u64,
            bytemuck::bytes_of(&camera.uniforms()),
        );
        Ok(())
    }

    /// 绘制所有发射器：先连线带，后精灵
    pub fn draw<'a>(
        &'a self,
        rpass: &mut wgpu::RenderPass<'a>,
        slot: u32,
        stores: &[&'a GpuParticleStore],
    ) {
        let offset = Self::camera_offset(slot);

        rpass.set_pipeline(&self.ribbon_pipeline);
        rpass.set_bind_group(0, &self.camera_bind_group, &[offset]);
        for &store in stores {
            rpass.set_bind_group(1, store.sim_bind_group(), &[]);
            rpass.set_vertex_buffer(0, store.links().slice(..));
            rpass.set_index_buffer(store.link_indices().slice(..), wgpu::IndexFormat::Uint32);
            rpass.draw_indexed(0..store.link_index_count(), 0, 0..1);
        }

        rpass.set_pipeline(&self.sprite_pipeline);
        rpass.set_bind_group(0, &self.camera_bind_group, &[offset]);
        for &store in stores {
            rpass.set_bind_group(1, store.sim_bind_group(), &[]);
            rpass.set_vertex_buffer(0, store.positions().slice(..));
            rpass.set_vertex_buffer(1, store.velocities().slice(..));
            rpass.draw(0..6, 0..store.particle_count());
        }
    }
}

fn build_additive_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    (vertex_entry, fragment_entry): (&str, &str),
    buffers: &[wgpu::VertexBufferLayout],
    color_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let additive = wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::SrcAlpha,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: vertex_entry,
            buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: fragment_entry,
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(additive),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}
