//! 设备端粒子存储与计算管线

use super::params::{
    ComputeStage, LinkVertex, SimUniforms, LINK_VERTICES_PER_SLOT, WORKGROUP_SIZE,
};
use super::kernels::ribbon_indices;
use super::shaders;
use super::store::{ComputeEncoder, ParticleStore};
use wgpu::util::DeviceExt;

/// 所有发射器共享的计算管线与绑定组布局
pub struct ParticlePipelines {
    /// 计算阶段：Uniform + 位置/寿命 + 速度 + 连线
    compute_layout: wgpu::BindGroupLayout,
    /// 渲染阶段读取发射器 Uniform
    sim_layout: wgpu::BindGroupLayout,
    init: wgpu::ComputePipeline,
    integrate: wgpu::ComputePipeline,
    links: wgpu::ComputePipeline,
    spawn: wgpu::ComputePipeline,
}

impl ParticlePipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let storage_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let uniform_entry = |visibility: wgpu::ShaderStages| wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<SimUniforms>() as u64),
            },
            count: None,
        };

        let compute_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Compute BGL"),
            entries: &[
                uniform_entry(wgpu::ShaderStages::COMPUTE),
                storage_entry(1),
                storage_entry(2),
                storage_entry(3),
            ],
        });
        let sim_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Sim Uniform BGL"),
            entries: &[uniform_entry(wgpu::ShaderStages::VERTEX_FRAGMENT)],
        });

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Compute Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::compute_source().into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Compute Pipeline Layout"),
            bind_group_layouts: &[&compute_layout],
            push_constant_ranges: &[],
        });
        let pipeline = |label: &str, entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            })
        };

        Self {
            init: pipeline("Particle Init Pipeline", "init_main"),
            integrate: pipeline("Particle Integrate Pipeline", "integrate_main"),
            links: pipeline("Particle Links Pipeline", "links_main"),
            spawn: pipeline("Particle Spawn Pipeline", "spawn_main"),
            compute_layout,
            sim_layout,
        }
    }

    pub fn sim_layout(&self) -> &wgpu::BindGroupLayout {
        &self.sim_layout
    }
}

/// 单个发射器的设备端缓冲
pub struct GpuParticleStore {
    particle_count: u32,
    /// 本帧生成数量，由最近一次 Uniform 上传决定
    spawn_count: u32,
    /// xyz = 位置，w = 寿命；同时作为精灵实例缓冲
    positions: wgpu::Buffer,
    velocities: wgpu::Buffer,
    /// 连线顶点；同时作为连线网格顶点缓冲
    links: wgpu::Buffer,
    /// 静态索引，每条连线带 6 个
    link_indices: wgpu::Buffer,
    uniforms: wgpu::Buffer,
    compute_bind_group: wgpu::BindGroup,
    sim_bind_group: wgpu::BindGroup,
}

impl GpuParticleStore {
    /// 创建缓冲；槽位数的合法性由发射器检查
    pub fn new(device: &wgpu::Device, pipelines: &ParticlePipelines, particle_count: u32) -> Self {
        let n = particle_count.max(1) as u64;
        let vec4_size = std::mem::size_of::<[f32; 4]>() as u64;

        let positions = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Position Buffer"),
            size: vec4_size * n,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX,
            mapped_at_creation: false,
        });
        let velocities = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Velocity Buffer"),
            size: vec4_size * n,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX,
            mapped_at_creation: false,
        });
        let links = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Link Buffer"),
            size: std::mem::size_of::<LinkVertex>() as u64 * LINK_VERTICES_PER_SLOT as u64 * n,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX,
            mapped_at_creation: false,
        });
        let link_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Link Index Buffer"),
            contents: bytemuck::cast_slice(&ribbon_indices(particle_count)),
            usage: wgpu::BufferUsages::INDEX,
        });
        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Sim Uniforms"),
            size: std::mem::size_of::<SimUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let compute_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Compute Bind Group"),
            layout: &pipelines.compute_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: positions.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: velocities.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: links.as_entire_binding(),
                },
            ],
        });
        let sim_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Sim Bind Group"),
            layout: &pipelines.sim_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            }],
        });

        Self {
            particle_count,
            spawn_count: 0,
            positions,
            velocities,
            links,
            link_indices,
            uniforms,
            compute_bind_group,
            sim_bind_group,
        }
    }

    pub fn positions(&self) -> &wgpu::Buffer {
        &self.positions
    }

    pub fn velocities(&self) -> &wgpu::Buffer {
        &self.velocities
    }

    pub fn links(&self) -> &wgpu::Buffer {
        &self.links
    }

    pub fn link_indices(&self) -> &wgpu::Buffer {
        &self.link_indices
    }

    pub fn link_index_count(&self) -> u32 {
        self.particle_count * 2 * super::params::LINK_INDICES_PER_RIBBON
    }

    pub fn sim_bind_group(&self) -> &wgpu::BindGroup {
        &self.sim_bind_group
    }
}

impl ParticleStore for GpuParticleStore {
    fn particle_count(&self) -> u32 {
        self.particle_count
    }
}

/// 将计算阶段录制到帧命令编码器
///
/// Uniform 经 `queue.write_buffer` 写入，在本帧提交开始前生效。
pub struct GpuComputeEncoder<'a> {
    queue: &'a wgpu::Queue,
    encoder: &'a mut wgpu::CommandEncoder,
    pipelines: &'a ParticlePipelines,
}

impl<'a> GpuComputeEncoder<'a> {
    pub fn new(
        queue: &'a wgpu::Queue,
        encoder: &'a mut wgpu::CommandEncoder,
        pipelines: &'a ParticlePipelines,
    ) -> Self {
        Self {
            queue,
            encoder,
            pipelines,
        }
    }

    fn run(&mut self, label: &str, pipeline: &wgpu::ComputePipeline, store: &GpuParticleStore, invocations: u32) {
        if invocations == 0 {
            return;
        }
        let mut pass = self.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &store.compute_bind_group, &[]);
        pass.dispatch_workgroups(invocations.div_ceil(WORKGROUP_SIZE), 1, 1);
    }
}

impl ComputeEncoder for GpuComputeEncoder<'_> {
    type Store = GpuParticleStore;

    fn upload_uniforms(&mut self, store: &mut GpuParticleStore, uniforms: &SimUniforms) {
        store.spawn_count = if uniforms.spawn_enabled() {
            uniforms.spawn_count()
        } else {
            0
        };
        self.queue
            .write_buffer(&store.uniforms, 0, bytemuck::bytes_of(uniforms));
    }

    fn dispatch(&mut self, store: &mut GpuParticleStore, stage: ComputeStage) {
        let pipelines = self.pipelines;
        let n = store.particle_count;
        match stage {
            ComputeStage::Init => self.run("Particle Init Pass", &pipelines.init, store, n),
            ComputeStage::Integrate => {
                self.run("Particle Integrate Pass", &pipelines.integrate, store, n);
                self.run("Particle Links Pass", &pipelines.links, store, n);
            }
            ComputeStage::Spawn => {
                self.run("Particle Spawn Pass", &pipelines.spawn, store, store.spawn_count)
            }
        }
    }
}
