//! 计算内核的 CPU 参考实现
//!
//! 与 `shaders.rs` 中的 WGSL 内核逐行对应：哈希、值噪声、分形噪声、
//! 生成、运动积分、两近邻搜索、连线颜色和精灵着色。
//! CPU 参考存储、测试和基准都基于这里的函数。

use super::params::{
    LinkVertex, ParticleSlot, SimUniforms, DEAD_LIFE, LIFE_EPSILON, LINK_ALPHA_EXPONENT,
    LINK_VERTICES_PER_SLOT, PARKED_POSITION,
};
use glam::Vec3;

const U32_MAX_F: f32 = 4294967295.0;

/// PCG 哈希（与 WGSL `pcg_hash` 一致）
pub fn pcg_hash(v: u32) -> u32 {
    let state = v.wrapping_mul(747796405).wrapping_add(2891336453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277803737);
    (word >> 22) ^ word
}

fn lattice(x: i32, y: i32, z: i32) -> f32 {
    let h = pcg_hash((x as u32) ^ pcg_hash((y as u32) ^ pcg_hash(z as u32)));
    h as f32 / U32_MAX_F * 2.0 - 1.0
}

/// 三维值噪声，范围 [-1, 1]
pub fn value_noise3(p: Vec3) -> f32 {
    let cell = p.floor();
    let f = p - cell;
    let u = f * f * (Vec3::splat(3.0) - 2.0 * f);
    let (x, y, z) = (cell.x as i32, cell.y as i32, cell.z as i32);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let x00 = lerp(lattice(x, y, z), lattice(x + 1, y, z), u.x);
    let x10 = lerp(lattice(x, y + 1, z), lattice(x + 1, y + 1, z), u.x);
    let x01 = lerp(lattice(x, y, z + 1), lattice(x + 1, y, z + 1), u.x);
    let x11 = lerp(lattice(x, y + 1, z + 1), lattice(x + 1, y + 1, z + 1), u.x);
    lerp(lerp(x00, x10, u.y), lerp(x01, x11, u.y), u.z)
}

/// 三倍频分形噪声，范围 [-1, 1]
pub fn fbm3(p: Vec3) -> f32 {
    let mut sum = 0.0;
    let mut amplitude = 0.5;
    let mut q = p;
    for _ in 0..3 {
        sum += value_noise3(q) * amplitude;
        q *= 2.0;
        amplitude *= 0.5;
    }
    sum / 0.875
}

/// 向量湍流场：三个错开采样的分形噪声
pub fn turbulence(p: Vec3) -> Vec3 {
    Vec3::new(
        fbm3(p),
        fbm3(p + Vec3::new(31.416, -47.853, 12.793)),
        fbm3(p + Vec3::new(-19.17, 7.31, 53.92)),
    )
}

/// 一维值噪声（按槽位索引取低频颜色扰动），范围 [-1, 1]
pub fn noise1(x: f32) -> f32 {
    let i = x.floor();
    let f = x - i;
    let u = f * f * (3.0 - 2.0 * f);
    let a = pcg_hash(i as i32 as u32) as f32 / U32_MAX_F;
    let b = pcg_hash((i as i32 + 1) as u32) as f32 / U32_MAX_F;
    (a + (b - a) * u) * 2.0 - 1.0
}

/// HSV 转 RGB，h 以圈为单位
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Vec3 {
    let channel = |n: f32| {
        let k = (n + h * 6.0).rem_euclid(6.0);
        v - v * s * k.min(4.0 - k).clamp(0.0, 1.0)
    };
    Vec3::new(channel(5.0), channel(3.0), channel(1.0))
}

/// 每槽位独立的随机序列（与 WGSL `SlotRng` 一致）
pub struct SlotRng(u32);

impl SlotRng {
    pub fn new(slot: u32, seed: u32) -> Self {
        Self(pcg_hash(slot ^ pcg_hash(seed)))
    }

    pub fn next_f32(&mut self) -> f32 {
        self.0 = pcg_hash(self.0);
        self.0 as f32 / U32_MAX_F
    }

    /// 单位球面上的均匀方向
    pub fn unit_vector(&mut self) -> Vec3 {
        let z = self.next_f32() * 2.0 - 1.0;
        let phi = self.next_f32() * std::f32::consts::TAU;
        let r = (1.0 - z * z).max(0.0).sqrt();
        Vec3::new(r * phi.cos(), r * phi.sin(), z)
    }
}

// ============================================================================
// Init / Integrate / Spawn
// ============================================================================

/// Init：全部槽位置为死亡并停放到可见区域外
pub fn init_slots(slots: &mut [ParticleSlot]) {
    for slot in slots {
        slot.position = Vec3::from(PARKED_POSITION);
        slot.velocity = Vec3::ZERO;
        slot.life = DEAD_LIFE;
    }
}

/// Integrate 第一步：存活粒子的湍流、阻尼、位移与寿命衰减
pub fn integrate_motion(slots: &mut [ParticleSlot], u: &SimUniforms) {
    for slot in slots.iter_mut().filter(|s| s.is_alive()) {
        let force = turbulence(slot.position * u.noise_frequency)
            * u.noise_amplitude
            * (slot.life + LIFE_EPSILON);
        slot.velocity = (slot.velocity + force) * (1.0 - u.friction);
        slot.position += slot.velocity * u.delta_time;
        slot.life -= u.delta_time / u.lifetime;
    }
}

/// 两近邻搜索：升序保留最小的两个平方距离
///
/// 排除自身、死亡粒子和零距离重合粒子；严格小于比较，距离相同时先遇到者胜出。
pub fn find_neighbors(slots: &[ParticleSlot], index: usize) -> [Option<usize>; 2] {
    let own = slots[index].position;
    let mut best = [None, None];
    let mut best_dist = [f32::INFINITY; 2];

    for (j, other) in slots.iter().enumerate() {
        if j == index || !other.is_alive() {
            continue;
        }
        let dist = (other.position - own).length_squared();
        if dist <= 0.0 {
            continue;
        }
        if dist < best_dist[0] {
            best_dist[1] = best_dist[0];
            best[1] = best[0];
            best_dist[0] = dist;
            best[0] = Some(j);
        } else if dist < best_dist[1] {
            best_dist[1] = dist;
            best[1] = Some(j);
        }
    }
    best
}

/// 连线强度：max(0, min(自身寿命, 邻居寿命))^0.8
pub fn link_alpha(own_life: f32, neighbor_life: f32) -> f32 {
    let strength = own_life.min(neighbor_life).max(0.0);
    if strength > 0.0 {
        strength.powf(LINK_ALPHA_EXPONENT)
    } else {
        0.0
    }
}

/// 连线颜色：基础色相 + 累计色相偏移 + 按槽位的有界低频噪声
pub fn link_color(index: usize, u: &SimUniforms) -> Vec3 {
    let hue = u.base_hue + u.color_offset + u.color_variance * noise1(index as f32 * 0.173);
    hsv_to_rgb(hue.rem_euclid(1.0), 0.75, 1.0)
}

/// 连线带的半宽偏移，垂直于线段和朝向轴
pub fn ribbon_offset(from: Vec3, to: Vec3, facing: Vec3, half_width: f32) -> Vec3 {
    let dir = to - from;
    let mut side = dir.cross(facing);
    if side.length_squared() < 1e-12 {
        side = dir.cross(Vec3::Y);
    }
    if side.length_squared() < 1e-12 {
        side = Vec3::X;
    }
    side.normalize() * half_width
}

/// Integrate 第二步：为每个槽位重建两条连线带
///
/// 未匹配的连线带保留旧位置但透明度为 0；死亡槽位的两条带同样透明度为 0。
pub fn build_links(slots: &[ParticleSlot], links: &mut [LinkVertex], u: &SimUniforms) {
    let per_slot = LINK_VERTICES_PER_SLOT as usize;
    debug_assert_eq!(links.len(), slots.len() * per_slot);
    let facing = Vec3::new(u.facing[0], u.facing[1], u.facing[2]);

    for (i, own) in slots.iter().enumerate() {
        let base = i * per_slot;
        if !own.is_alive() {
            for vertex in &mut links[base..base + per_slot] {
                vertex.color[3] = 0.0;
            }
            continue;
        }

        let rgb = link_color(i, u);
        for (ribbon, neighbor) in find_neighbors(slots, i).into_iter().enumerate() {
            let quad = &mut links[base + ribbon * 4..base + ribbon * 4 + 4];
            let neighbor_life = neighbor.map_or(0.0, |j| slots[j].life);
            let alpha = link_alpha(own.life, neighbor_life);

            if let Some(j) = neighbor {
                let other = slots[j].position;
                let offset = ribbon_offset(own.position, other, facing, u.link_half_width);
                let corners = [
                    own.position + offset,
                    own.position - offset,
                    other + offset,
                    other - offset,
                ];
                for (vertex, corner) in quad.iter_mut().zip(corners) {
                    vertex.position = corner.extend(1.0).to_array();
                }
            }
            for vertex in quad.iter_mut() {
                vertex.color = [rgb.x, rgb.y, rgb.z, alpha];
            }
        }
    }
}

/// Spawn：在环形偏移 [cursor, cursor+K) 处批量生成
pub fn spawn_batch(slots: &mut [ParticleSlot], u: &SimUniforms) {
    if !u.spawn_enabled() || slots.is_empty() {
        return;
    }
    let n = slots.len() as u32;
    let previous = Vec3::new(u.spawn_previous[0], u.spawn_previous[1], u.spawn_previous[2]);
    let current = Vec3::new(u.spawn_current[0], u.spawn_current[1], u.spawn_current[2]);
    let bias = Vec3::new(u.velocity_bias[0], u.velocity_bias[1], u.velocity_bias[2]);

    for i in 0..u.spawn_count() {
        let index = ((u64::from(u.cursor) + u64::from(i)) % u64::from(n)) as u32;
        let t = if u.batch_size > 1 {
            i as f32 / (u.batch_size - 1) as f32
        } else {
            0.0
        };
        let mut rng = SlotRng::new(index, u.seed);
        let slot = &mut slots[index as usize];
        slot.position = previous.lerp(current, t) + rng.unit_vector() * u.spawn_radius;
        slot.velocity = rng.unit_vector() * u.spawn_speed + bias;
        slot.life = 1.0;
    }
}

// ============================================================================
// 精灵着色（与渲染着色器一致）
// ============================================================================

/// 精灵朝向：速度 Y/X 分量的反正切
pub fn sprite_rotation(velocity: Vec3) -> f32 {
    velocity.y.atan2(velocity.x)
}

/// 基于时间的脉动
pub fn sprite_pulse(time: f32, slot: u32) -> f32 {
    0.75 + 0.25 * (time * 3.0 + slot as f32 * 0.37).sin()
}

/// 基于寿命的衰减曲线
pub fn sprite_falloff(life: f32) -> f32 {
    life.clamp(0.0, 1.0).sqrt()
}

/// 精灵颜色：hue(slot) × 脉动 × 寿命衰减
pub fn sprite_color(slot: u32, life: f32, u: &SimUniforms) -> Vec3 {
    link_color(slot as usize, u) * sprite_pulse(u.time, slot) * sprite_falloff(life)
}

/// 精灵透明度：圆形遮罩 × 寿命；`radius` 为片元到精灵中心的归一化距离
pub fn sprite_alpha(life: f32, radius: f32) -> f32 {
    let mask = 1.0 - smoothstep(0.8, 1.0, radius);
    mask * life.max(0.0)
}

/// 死亡粒子在顶点阶段被折叠为退化四边形
pub fn sprite_visible(life: f32) -> bool {
    life > 0.0
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// 连线网格的静态索引：每条带两个三角形
pub fn ribbon_indices(particle_count: u32) -> Vec<u32> {
    let ribbons = particle_count * 2;
    let mut indices = Vec::with_capacity((ribbons * 6) as usize);
    for r in 0..ribbons {
        let v = r * 4;
        indices.extend_from_slice(&[v, v + 1, v + 2, v + 2, v + 1, v + 3]);
    }
    indices
}
