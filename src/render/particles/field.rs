//! 发射器集合：主发射器与副发射器
//!
//! 输入层每帧给出至多两个生成点，索引 0 对应主发射器，索引 1 对应副发射器。

use super::emitter::LinkEmitter;
use super::params::EmitterParams;
use super::store::{ComputeEncoder, ParticleStore};
use crate::config::MAX_EMITTERS;
use crate::core::error::{RenderError, RenderResult};
use glam::Vec3;

/// 每帧的生成点
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpawnPoint {
    pub position: Vec3,
    pub active: bool,
}

impl SpawnPoint {
    pub fn active(position: Vec3) -> Self {
        Self {
            position,
            active: true,
        }
    }
}

/// 粒子场
pub struct ParticleField<S: ParticleStore> {
    emitters: Vec<LinkEmitter<S>>,
}

impl<S: ParticleStore> ParticleField<S> {
    pub fn new() -> Self {
        Self {
            emitters: Vec::with_capacity(MAX_EMITTERS),
        }
    }

    /// 添加发射器，返回其索引
    pub fn add_emitter(
        &mut self,
        store: S,
        batch_size: u32,
        params: EmitterParams,
    ) -> RenderResult<usize> {
        if self.emitters.len() >= MAX_EMITTERS {
            return Err(RenderError::InvalidConfiguration(format!(
                "at most {} emitters are supported",
                MAX_EMITTERS
            )));
        }
        self.emitters.push(LinkEmitter::new(store, batch_size, params)?);
        Ok(self.emitters.len() - 1)
    }

    pub fn emitters(&self) -> &[LinkEmitter<S>] {
        &self.emitters
    }

    pub fn emitter(&self, index: usize) -> Option<&LinkEmitter<S>> {
        self.emitters.get(index)
    }

    pub fn emitter_mut(&mut self, index: usize) -> Option<&mut LinkEmitter<S>> {
        self.emitters.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }

    /// 将生成点映射到发射器；缺失或非活动的点关闭对应发射器的生成
    pub fn apply_spawn_points(&mut self, points: &[SpawnPoint]) {
        if points.len() > MAX_EMITTERS {
            tracing::warn!(
                target: "particles",
                count = points.len(),
                "Extra spawn points ignored"
            );
        }
        for (index, emitter) in self.emitters.iter_mut().enumerate() {
            match points.get(index) {
                Some(point) if point.active => {
                    emitter.set_spawn_position(point.position);
                    emitter.set_spawn_enabled(true);
                }
                _ => emitter.set_spawn_enabled(false),
            }
        }
    }

    /// 连线带朝向（相机前向）
    pub fn set_facing(&mut self, facing: Vec3) {
        for emitter in &mut self.emitters {
            emitter.set_facing(facing);
        }
    }

    /// 每个发射器运行一次计算；发射器之间互不依赖
    pub fn compute_all<E>(&mut self, encoder: &mut E, delta_time: f32)
    where
        E: ComputeEncoder<Store = S>,
    {
        for emitter in &mut self.emitters {
            emitter.compute(encoder, delta_time);
        }
    }
}

impl<S: ParticleStore> Default for ParticleField<S> {
    fn default() -> Self {
        Self::new()
    }
}
