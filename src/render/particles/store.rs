//! 粒子状态存储与计算编码接口
//!
//! 发射器只通过 `ComputeEncoder` 推送 Uniform 并按阶段调度，
//! 从不读取粒子状态。设备端实现见 `gpu.rs`；`CpuParticleStore`
//! 在主机内存中运行参考内核，供测试与基准使用。

use super::kernels;
use super::params::{ComputeStage, LinkVertex, ParticleSlot, SimUniforms, LINK_VERTICES_PER_SLOT};

/// 单个发射器的粒子状态存储
pub trait ParticleStore {
    /// 槽位数量 N
    fn particle_count(&self) -> u32;
}

/// 计算命令编码器
///
/// 同一帧内的上传与调度按调用顺序生效。
pub trait ComputeEncoder {
    type Store: ParticleStore;

    /// 推送本帧 Uniform
    fn upload_uniforms(&mut self, store: &mut Self::Store, uniforms: &SimUniforms);

    /// 记录一个计算阶段
    fn dispatch(&mut self, store: &mut Self::Store, stage: ComputeStage);
}

/// 阶段记录保留的最近条目数
pub const DISPATCH_LOG_CAPACITY: usize = 64;

/// CPU 参考存储
#[derive(Debug, Clone)]
pub struct CpuParticleStore {
    slots: Vec<ParticleSlot>,
    links: Vec<LinkVertex>,
    uniforms: SimUniforms,
    dispatch_log: Vec<ComputeStage>,
}

impl CpuParticleStore {
    pub fn new(particle_count: u32) -> Self {
        let n = particle_count as usize;
        Self {
            slots: vec![ParticleSlot::default(); n],
            links: vec![LinkVertex::default(); n * LINK_VERTICES_PER_SLOT as usize],
            uniforms: bytemuck::Zeroable::zeroed(),
            dispatch_log: Vec::new(),
        }
    }

    pub fn slots(&self) -> &[ParticleSlot] {
        &self.slots
    }

    /// 测试用：直接改写槽位
    pub fn slots_mut(&mut self) -> &mut [ParticleSlot] {
        &mut self.slots
    }

    pub fn links(&self) -> &[LinkVertex] {
        &self.links
    }

    /// 槽位 `index` 的两条连线带（各 4 个顶点）
    pub fn ribbons(&self, index: usize) -> (&[LinkVertex], &[LinkVertex]) {
        let base = index * LINK_VERTICES_PER_SLOT as usize;
        (&self.links[base..base + 4], &self.links[base + 4..base + 8])
    }

    /// 最近一次上传的 Uniform
    pub fn uniforms(&self) -> &SimUniforms {
        &self.uniforms
    }

    /// 最近执行阶段的顺序记录（最多 `DISPATCH_LOG_CAPACITY` 条）
    pub fn dispatch_log(&self) -> &[ComputeStage] {
        &self.dispatch_log
    }

    pub fn alive_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_alive()).count()
    }
}

impl ParticleStore for CpuParticleStore {
    fn particle_count(&self) -> u32 {
        self.slots.len() as u32
    }
}

/// 立即执行的 CPU 编码器
#[derive(Debug, Default)]
pub struct CpuCompute {
    dispatches: usize,
}

impl CpuCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatches(&self) -> usize {
        self.dispatches
    }
}

impl ComputeEncoder for CpuCompute {
    type Store = CpuParticleStore;

    fn upload_uniforms(&mut self, store: &mut CpuParticleStore, uniforms: &SimUniforms) {
        store.uniforms = *uniforms;
    }

    fn dispatch(&mut self, store: &mut CpuParticleStore, stage: ComputeStage) {
        self.dispatches += 1;
        if store.dispatch_log.len() == DISPATCH_LOG_CAPACITY {
            store.dispatch_log.remove(0);
        }
        store.dispatch_log.push(stage);
        let uniforms = store.uniforms;
        match stage {
            ComputeStage::Init => kernels::init_slots(&mut store.slots),
            ComputeStage::Integrate => {
                kernels::integrate_motion(&mut store.slots, &uniforms);
                kernels::build_links(&store.slots, &mut store.links, &uniforms);
            }
            ComputeStage::Spawn => kernels::spawn_batch(&mut store.slots, &uniforms),
        }
    }
}
