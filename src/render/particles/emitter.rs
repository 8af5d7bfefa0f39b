//! 粒子连线发射器
//!
//! 控制线程只持有标量影子状态（参数、环形游标、生成位置、开关），
//! 每帧打包成 `SimUniforms` 推送给存储，再按固定顺序调度
//! Init（仅一次）→ Integrate → Spawn。

use super::kernels::pcg_hash;
use super::params::{ComputeStage, EmitterParams, SimUniforms};
use super::store::{ComputeEncoder, ParticleStore};
use crate::core::error::{RenderError, RenderResult};
use glam::Vec3;

/// 单个发射器
pub struct LinkEmitter<S: ParticleStore> {
    store: S,
    params: EmitterParams,
    batch_size: u32,
    /// 环形生成游标
    cursor: u32,
    spawn_previous: Vec3,
    spawn_current: Vec3,
    enabled: bool,
    /// 上一帧是否执行了生成
    spawned_last_frame: bool,
    initialized: bool,
    time: f32,
    /// 累计色相偏移（圈）
    color_offset: f32,
    facing: Vec3,
    seed: u32,
}

impl<S: ParticleStore> LinkEmitter<S> {
    /// 创建发射器；槽位数或批大小为 0 时拒绝
    pub fn new(store: S, batch_size: u32, params: EmitterParams) -> RenderResult<Self> {
        if store.particle_count() == 0 {
            return Err(RenderError::InvalidConfiguration(
                "emitter particle count must be positive".to_string(),
            ));
        }
        if batch_size == 0 {
            return Err(RenderError::InvalidConfiguration(
                "emitter batch size must be positive".to_string(),
            ));
        }
        params.validate()?;

        tracing::debug!(
            target: "particles",
            particles = store.particle_count(),
            batch_size,
            "Link emitter created"
        );

        Ok(Self {
            store,
            params,
            batch_size,
            cursor: 0,
            spawn_previous: Vec3::ZERO,
            spawn_current: Vec3::ZERO,
            enabled: false,
            spawned_last_frame: false,
            initialized: false,
            time: 0.0,
            color_offset: 0.0,
            facing: Vec3::NEG_Z,
            seed: rand::random(),
        })
    }

    pub fn set_spawn_position(&mut self, position: Vec3) {
        self.spawn_current = position;
    }

    pub fn spawn_position(&self) -> Vec3 {
        self.spawn_current
    }

    pub fn set_spawn_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_spawn_enabled(&self) -> bool {
        self.enabled
    }

    /// 更新参数（验证失败时保持原值）
    pub fn set_params(&mut self, params: EmitterParams) -> RenderResult<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// 参数的控制线程影子值
    pub fn params(&self) -> EmitterParams {
        self.params
    }

    /// 连线带朝向参考轴（通常为相机前向）
    pub fn set_facing(&mut self, facing: Vec3) {
        self.facing = facing.normalize_or_zero();
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn particle_count(&self) -> u32 {
        self.store.particle_count()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn color_offset(&self) -> f32 {
        self.color_offset
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// 运行本帧的计算阶段，每个渲染帧必须且只能调用一次
    pub fn compute<E>(&mut self, encoder: &mut E, delta_time: f32)
    where
        E: ComputeEncoder<Store = S>,
    {
        self.time += delta_time;
        self.color_offset = (self.color_offset + self.params.hue_speed * delta_time).rem_euclid(1.0);
        self.seed = pcg_hash(self.seed ^ self.cursor);

        // 重新开启生成时从当前位置开始，避免从旧位置拖出一条轨迹
        if self.enabled && !self.spawned_last_frame {
            self.spawn_previous = self.spawn_current;
        }

        let uniforms = self.uniforms(delta_time);
        encoder.upload_uniforms(&mut self.store, &uniforms);

        if !self.initialized {
            encoder.dispatch(&mut self.store, ComputeStage::Init);
            self.initialized = true;
            tracing::debug!(target: "particles", "Particle slots initialized");
        }
        encoder.dispatch(&mut self.store, ComputeStage::Integrate);
        if self.enabled {
            encoder.dispatch(&mut self.store, ComputeStage::Spawn);
        }

        self.cursor = advance_cursor(self.cursor, self.batch_size, self.store.particle_count());
        self.spawn_previous = self.spawn_current;
        self.spawned_last_frame = self.enabled;
    }

    /// 本帧推送的 Uniform
    pub fn uniforms(&self, delta_time: f32) -> SimUniforms {
        let p = &self.params;
        SimUniforms {
            spawn_previous: self.spawn_previous.extend(1.0).to_array(),
            spawn_current: self.spawn_current.extend(1.0).to_array(),
            velocity_bias: p.velocity_bias.extend(0.0).to_array(),
            facing: self.facing.extend(0.0).to_array(),
            delta_time,
            time: self.time,
            lifetime: p.lifetime,
            friction: p.turbulence_friction,
            noise_frequency: p.turbulence_frequency,
            noise_amplitude: p.turbulence_amplitude,
            link_half_width: p.link_width * 0.5,
            spawn_radius: p.spawn_radius,
            spawn_speed: p.spawn_speed,
            base_hue: p.base_hue,
            color_variance: p.color_variance,
            color_offset: self.color_offset,
            particle_count: self.store.particle_count(),
            cursor: self.cursor,
            batch_size: self.batch_size,
            seed: self.seed,
            enabled: self.enabled as u32,
            particle_size: p.particle_size,
            _padding: [0; 2],
        }
    }
}

/// (cursor + K) mod N，按 u64 计算避免溢出
fn advance_cursor(cursor: u32, batch_size: u32, particle_count: u32) -> u32 {
    ((u64::from(cursor) + u64::from(batch_size)) % u64::from(particle_count)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::particles::store::{CpuCompute, CpuParticleStore};
    use proptest::prelude::*;

    fn emitter(n: u32, k: u32) -> LinkEmitter<CpuParticleStore> {
        LinkEmitter::new(CpuParticleStore::new(n), k, EmitterParams::default()).unwrap()
    }

    #[test]
    fn test_zero_particles_rejected() {
        let result = LinkEmitter::new(CpuParticleStore::new(0), 2, EmitterParams::default());
        assert!(matches!(result, Err(RenderError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_init_kills_every_slot() {
        let mut e = emitter(16, 4);
        let mut compute = CpuCompute::new();
        e.compute(&mut compute, 1.0 / 60.0);

        assert!(e.is_initialized());
        assert!(e.store().slots().iter().all(|s| s.life <= 0.0));
        assert!(e.store().links().iter().all(|v| v.color[3] == 0.0));
        assert!(e.store().slots().iter().all(|s| s.position.y == -10000.0));
    }

    #[test]
    fn test_stage_order() {
        let mut e = emitter(4, 2);
        e.set_spawn_enabled(true);
        let mut compute = CpuCompute::new();
        e.compute(&mut compute, 0.1);
        e.compute(&mut compute, 0.1);

        assert_eq!(
            e.store().dispatch_log(),
            &[
                ComputeStage::Init,
                ComputeStage::Integrate,
                ComputeStage::Spawn,
                ComputeStage::Integrate,
                ComputeStage::Spawn,
            ]
        );
    }

    #[test]
    fn test_disabled_cursor_still_advances() {
        let mut e = emitter(5, 3);
        let mut compute = CpuCompute::new();
        e.compute(&mut compute, 0.1);
        assert_eq!(e.cursor(), 3);
        e.compute(&mut compute, 0.1);
        assert_eq!(e.cursor(), 1);
        assert_eq!(e.store().alive_count(), 0);
        assert!(!e.store().dispatch_log().contains(&ComputeStage::Spawn));
    }

    #[test]
    fn test_enabled_cursor_ignores_live_targets() {
        let mut e = emitter(4, 2);
        e.set_spawn_enabled(true);
        let mut compute = CpuCompute::new();
        for frame in 1..=6u32 {
            e.compute(&mut compute, 0.01);
            assert_eq!(e.cursor(), (frame * 2) % 4);
        }
    }

    #[test]
    fn test_batch_larger_than_capacity() {
        let mut e = emitter(3, 8);
        e.set_spawn_enabled(true);
        let mut compute = CpuCompute::new();
        e.compute(&mut compute, 0.01);
        assert_eq!(e.store().alive_count(), 3);
        assert_eq!(e.cursor(), 8 % 3);
    }

    #[test]
    fn test_huge_batch_wraps_cursor() {
        let mut e = emitter(7, u32::MAX);
        e.set_spawn_enabled(true);
        let mut compute = CpuCompute::new();
        e.compute(&mut compute, 0.01);
        assert_eq!(e.cursor(), u32::MAX % 7);
        e.compute(&mut compute, 0.01);
        assert_eq!(e.cursor(), ((u64::from(u32::MAX) * 2) % 7) as u32);
        assert_eq!(e.store().alive_count(), 7);
    }

    #[test]
    fn test_spawned_life_decreases_until_dead() {
        let params = EmitterParams {
            lifetime: 1.0,
            ..Default::default()
        };
        let mut e = LinkEmitter::new(CpuParticleStore::new(4), 1, params).unwrap();
        let mut compute = CpuCompute::new();
        let dt = 0.25;

        e.set_spawn_enabled(true);
        e.compute(&mut compute, dt);
        assert_eq!(e.store().slots()[0].life, 1.0);

        e.set_spawn_enabled(false);
        let steps = (params.lifetime / dt).ceil() as usize;
        let mut last = 1.0;
        for step in 1..=steps {
            e.compute(&mut compute, dt);
            let life = e.store().slots()[0].life;
            assert!(life < last, "life must strictly decrease");
            last = life;
            if step < steps {
                assert!(life > 0.0);
            }
        }
        assert!(last <= 0.0);
    }

    #[test]
    fn test_reenable_starts_at_current_position() {
        let mut e = emitter(8, 2);
        let mut compute = CpuCompute::new();
        e.compute(&mut compute, 0.01);

        e.set_spawn_position(Vec3::new(5.0, 0.0, 0.0));
        e.set_spawn_enabled(true);
        let uniforms_before = e.uniforms(0.01);
        assert_eq!(uniforms_before.spawn_previous[0], 0.0);
        e.compute(&mut compute, 0.01);

        let radius = e.params().spawn_radius;
        for slot in e.store().slots().iter().filter(|s| s.is_alive()) {
            assert!((slot.position - Vec3::new(5.0, 0.0, 0.0)).length() <= radius + 1e-5);
        }
    }

    #[test]
    fn test_params_roundtrip_and_validation() {
        let mut e = emitter(4, 1);
        let params = EmitterParams {
            hue_speed: 0.5,
            link_width: 0.01,
            ..Default::default()
        };
        e.set_params(params).unwrap();
        assert_eq!(e.params(), params);
        assert_eq!(e.uniforms(0.0).link_half_width, 0.005);

        let bad = EmitterParams {
            lifetime: -1.0,
            ..Default::default()
        };
        assert!(e.set_params(bad).is_err());
        assert_eq!(e.params(), params);
    }

    #[test]
    fn test_color_offset_accumulates() {
        let mut e = emitter(4, 1);
        e.set_params(EmitterParams {
            hue_speed: 0.25,
            ..Default::default()
        })
        .unwrap();
        let mut compute = CpuCompute::new();
        e.compute(&mut compute, 1.0);
        e.compute(&mut compute, 1.0);
        assert!((e.color_offset() - 0.5).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_cursor_advances_by_batch(
            n in 1u32..48,
            k in 1u32..16,
            pattern in proptest::collection::vec(any::<bool>(), 1..12),
        ) {
            let mut e = emitter(n, k);
            let mut compute = CpuCompute::new();
            for (frame, enabled) in pattern.iter().enumerate() {
                let before = e.cursor();
                e.set_spawn_enabled(*enabled);
                e.compute(&mut compute, 1.0 / 60.0);
                prop_assert_eq!(e.cursor(), (before + k) % n);
                prop_assert_eq!(e.cursor(), ((frame as u32 + 1) * k) % n);
            }
        }
    }
}
