//! 离屏目标到目标子区域的纹理传输
//!
//! 格式完全一致时直接区域拷贝；否则用全屏三角形
//! 绘制到目标数组层的 2D 视图，通道顺序由附件格式处理。
//! 绘制管线按目标格式构建一次并缓存。

use super::offscreen::OffscreenTarget;
use super::particles::shaders::BLIT_WGSL;
use std::collections::HashMap;
use wgpu::TextureFormat;

/// 目标子区域的视口矩形（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// 传输策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    /// 区域拷贝
    DirectCopy,
    /// 全屏三角形绘制
    QuadBlit,
}

impl TransferStrategy {
    /// 按源/目标格式选择
    pub fn select(source: TextureFormat, destination: TextureFormat) -> Self {
        if formats_copy_compatible(source, destination) {
            Self::DirectCopy
        } else {
            Self::QuadBlit
        }
    }
}

/// 两种格式是否可以直接拷贝
///
/// 必须完全一致：Unorm 与 UnormSrgb 之间拷贝不做伽马编码，颜色会与绘制路径不同。
pub fn formats_copy_compatible(a: TextureFormat, b: TextureFormat) -> bool {
    a == b
}

/// 拷贝范围：min(视口, 源尺寸)
pub fn copy_extent(viewport: &Viewport, source_width: u32, source_height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: viewport.width.min(source_width),
        height: viewport.height.min(source_height),
        depth_or_array_layers: 1,
    }
}

/// 按纹理格式缓存的对象
#[derive(Debug)]
pub struct FormatCache<V> {
    entries: HashMap<TextureFormat, V>,
    builds: usize,
}

impl<V> FormatCache<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            builds: 0,
        }
    }

    /// 取出缓存项，不存在时构建
    pub fn get_or_build(&mut self, format: TextureFormat, build: impl FnOnce() -> V) -> &V {
        let builds = &mut self.builds;
        self.entries.entry(format).or_insert_with(|| {
            *builds += 1;
            build()
        })
    }

    pub fn get(&self, format: TextureFormat) -> Option<&V> {
        self.entries.get(&format)
    }

    /// 累计构建次数
    pub fn builds(&self) -> usize {
        self.builds
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for FormatCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// 纹理传输器
pub struct TextureTransfer {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    shader: wgpu::ShaderModule,
    sampler: wgpu::Sampler,
    pipelines: FormatCache<wgpu::RenderPipeline>,
}

impl TextureTransfer {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Transfer Blit BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Transfer Blit Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Transfer Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(BLIT_WGSL.into()),
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Transfer Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            bind_group_layout,
            pipeline_layout,
            shader,
            sampler,
            pipelines: FormatCache::new(),
        }
    }

    /// 目标纹理不支持拷贝写入时退回绘制路径
    pub fn strategy_for(source: TextureFormat, destination: &wgpu::Texture) -> TransferStrategy {
        if !destination.usage().contains(wgpu::TextureUsages::COPY_DST) {
            return TransferStrategy::QuadBlit;
        }
        TransferStrategy::select(source, destination.format())
    }

    pub fn cached_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    /// 将离屏颜色传输到目标纹理 `layer` 层的 `viewport` 区域
    pub fn transfer(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &OffscreenTarget,
        destination: &wgpu::Texture,
        viewport: &Viewport,
        layer: u32,
    ) -> TransferStrategy {
        let strategy = Self::strategy_for(source.format, destination);
        match strategy {
            TransferStrategy::DirectCopy => {
                let extent = copy_extent(viewport, source.width, source.height);
                encoder.copy_texture_to_texture(
                    wgpu::ImageCopyTexture {
                        texture: &source.texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::ImageCopyTexture {
                        texture: destination,
                        mip_level: 0,
                        origin: wgpu::Origin3d {
                            x: viewport.x,
                            y: viewport.y,
                            z: layer,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    extent,
                );
            }
            TransferStrategy::QuadBlit => self.blit(device, encoder, source, destination, viewport, layer),
        }
        strategy
    }

    fn blit(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &OffscreenTarget,
        destination: &wgpu::Texture,
        viewport: &Viewport,
        layer: u32,
    ) {
        let format = destination.format();
        let (layout, shader) = (&self.pipeline_layout, &self.shader);
        let pipeline = self.pipelines.get_or_build(format, || {
            tracing::debug!(target: "present", ?format, "Building transfer blit pipeline");
            build_blit_pipeline(device, layout, shader, format)
        });

        let target_view = destination.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Transfer Destination Layer"),
            format: Some(format),
            dimension: Some(wgpu::TextureViewDimension::D2),
            aspect: wgpu::TextureAspect::All,
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Transfer Blit Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Transfer Blit Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    // 保留其他视图已写入的区域
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.set_viewport(
            viewport.x as f32,
            viewport.y as f32,
            viewport.width as f32,
            viewport.height as f32,
            0.0,
            1.0,
        );
        rpass.set_scissor_rect(viewport.x, viewport.y, viewport.width, viewport.height);
        rpass.draw(0..3, 0..1);
    }
}

fn build_blit_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Transfer Blit Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: "vs_fullscreen",
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: "fs_blit",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}
