use wgpu::{Device, Texture, TextureFormat, TextureUsages, TextureView};

/// 离屏深度格式
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth24Plus;

/// 离屏渲染目标（颜色 + 深度）
///
/// 尺寸跟随呈现表面的单眼尺寸，尺寸变化时重建。
pub struct OffscreenTarget {
    /// 颜色纹理
    pub texture: Texture,
    /// 颜色纹理视图
    pub view: TextureView,
    /// 深度纹理
    pub depth_texture: Texture,
    /// 深度纹理视图
    pub depth_view: TextureView,
    /// 宽度
    pub width: u32,
    /// 高度
    pub height: u32,
    /// 颜色格式
    pub format: TextureFormat,
}

impl OffscreenTarget {
    /// 创建新的离屏渲染目标
    pub fn new(device: &Device, width: u32, height: u32, format: TextureFormat) -> Self {
        let (texture, view) = create_color(device, width, height, format);
        let (depth_texture, depth_view) = create_depth(device, width, height);

        tracing::debug!(target: "present", width, height, ?format, "Offscreen target created");

        Self {
            texture,
            view,
            depth_texture,
            depth_view,
            width,
            height,
            format,
        }
    }

    pub fn needs_resize(&self, width: u32, height: u32) -> bool {
        self.width != width || self.height != height
    }

    /// 调整大小，返回是否重建
    pub fn resize(&mut self, device: &Device, width: u32, height: u32) -> bool {
        if !self.needs_resize(width, height) {
            return false;
        }

        self.width = width;
        self.height = height;
        (self.texture, self.view) = create_color(device, width, height, self.format);
        (self.depth_texture, self.depth_view) = create_depth(device, width, height);

        tracing::debug!(target: "present", width, height, "Offscreen target resized");
        true
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    }
}

fn create_color(device: &Device, width: u32, height: u32, format: TextureFormat) -> (Texture, TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Render Target"),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: TextureUsages::RENDER_ATTACHMENT
            | TextureUsages::TEXTURE_BINDING
            | TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn create_depth(device: &Device, width: u32, height: u32) -> (Texture, TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Depth Target"),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}
