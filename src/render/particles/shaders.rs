//! 粒子计算与渲染着色器（WGSL）
//!
//! `NOISE_WGSL` 与 `kernels.rs` 中的 CPU 参考实现一一对应，
//! 计算着色器和渲染着色器都拼接它。

/// 共享声明：Uniform 布局、哈希、噪声、颜色
pub const NOISE_WGSL: &str = r#"
struct SimUniforms {
    spawn_previous: vec4<f32>,
    spawn_current: vec4<f32>,
    velocity_bias: vec4<f32>,
    facing: vec4<f32>,
    delta_time: f32,
    time: f32,
    lifetime: f32,
    friction: f32,
    noise_frequency: f32,
    noise_amplitude: f32,
    link_half_width: f32,
    spawn_radius: f32,
    spawn_speed: f32,
    base_hue: f32,
    color_variance: f32,
    color_offset: f32,
    particle_count: u32,
    cursor: u32,
    batch_size: u32,
    seed: u32,
    enabled: u32,
    particle_size: f32,
    _pad0: u32,
    _pad1: u32,
};

fn pcg_hash(v: u32) -> u32 {
    let state = v * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

fn unit_float(h: u32) -> f32 {
    return f32(h) / 4294967295.0;
}

fn lattice(c: vec3<i32>) -> f32 {
    let h = pcg_hash(bitcast<u32>(c.x) ^ pcg_hash(bitcast<u32>(c.y) ^ pcg_hash(bitcast<u32>(c.z))));
    return unit_float(h) * 2.0 - 1.0;
}

fn value_noise3(p: vec3<f32>) -> f32 {
    let cell = floor(p);
    let f = p - cell;
    let u = f * f * (vec3<f32>(3.0) - 2.0 * f);
    let c = vec3<i32>(cell);

    let x00 = mix(lattice(c), lattice(c + vec3<i32>(1, 0, 0)), u.x);
    let x10 = mix(lattice(c + vec3<i32>(0, 1, 0)), lattice(c + vec3<i32>(1, 1, 0)), u.x);
    let x01 = mix(lattice(c + vec3<i32>(0, 0, 1)), lattice(c + vec3<i32>(1, 0, 1)), u.x);
    let x11 = mix(lattice(c + vec3<i32>(0, 1, 1)), lattice(c + vec3<i32>(1, 1, 1)), u.x);
    return mix(mix(x00, x10, u.y), mix(x01, x11, u.y), u.z);
}

fn fbm3(p: vec3<f32>) -> f32 {
    var sum = 0.0;
    var amplitude = 0.5;
    var q = p;
    for (var octave = 0; octave < 3; octave++) {
        sum += value_noise3(q) * amplitude;
        q *= 2.0;
        amplitude *= 0.5;
    }
    return sum / 0.875;
}

fn turbulence(p: vec3<f32>) -> vec3<f32> {
    return vec3<f32>(
        fbm3(p),
        fbm3(p + vec3<f32>(31.416, -47.853, 12.793)),
        fbm3(p + vec3<f32>(-19.17, 7.31, 53.92)),
    );
}

fn noise1(x: f32) -> f32 {
    let i = floor(x);
    let f = x - i;
    let u = f * f * (3.0 - 2.0 * f);
    let a = unit_float(pcg_hash(bitcast<u32>(i32(i))));
    let b = unit_float(pcg_hash(bitcast<u32>(i32(i) + 1)));
    return mix(a, b, u) * 2.0 - 1.0;
}

fn hsv_channel(n: f32, h: f32, s: f32, v: f32) -> f32 {
    let raw = n + h * 6.0;
    let k = raw - 6.0 * floor(raw / 6.0);
    return v - v * s * clamp(min(k, 4.0 - k), 0.0, 1.0);
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> vec3<f32> {
    return vec3<f32>(hsv_channel(5.0, h, s, v), hsv_channel(3.0, h, s, v), hsv_channel(1.0, h, s, v));
}

fn link_color(index: u32, u: SimUniforms) -> vec3<f32> {
    let hue = u.base_hue + u.color_offset + u.color_variance * noise1(f32(index) * 0.173);
    return hsv_to_rgb(fract(hue), 0.75, 1.0);
}
"#;

/// 计算阶段：init_main / integrate_main / links_main / spawn_main
pub const COMPUTE_WGSL: &str = r#"
struct LinkVertex {
    position: vec4<f32>,
    color: vec4<f32>,
};

@group(0) @binding(0) var<uniform> sim: SimUniforms;
// xyz = 位置，w = 寿命
@group(0) @binding(1) var<storage, read_write> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> velocities: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read_write> links: array<LinkVertex>;

const NO_NEIGHBOR: u32 = 0xffffffffu;

fn rng_next(state: ptr<function, u32>) -> f32 {
    *state = pcg_hash(*state);
    return unit_float(*state);
}

fn rng_unit_vector(state: ptr<function, u32>) -> vec3<f32> {
    let z = rng_next(state) * 2.0 - 1.0;
    let phi = rng_next(state) * 6.28318530718;
    let r = sqrt(max(1.0 - z * z, 0.0));
    return vec3<f32>(r * cos(phi), r * sin(phi), z);
}

fn link_alpha(own_life: f32, neighbor_life: f32) -> f32 {
    let strength = max(min(own_life, neighbor_life), 0.0);
    return select(0.0, pow(strength, 0.8), strength > 0.0);
}

fn ribbon_offset(a: vec3<f32>, b: vec3<f32>) -> vec3<f32> {
    let dir = b - a;
    var side = cross(dir, sim.facing.xyz);
    if (dot(side, side) < 1e-12) {
        side = cross(dir, vec3<f32>(0.0, 1.0, 0.0));
    }
    if (dot(side, side) < 1e-12) {
        side = vec3<f32>(1.0, 0.0, 0.0);
    }
    return normalize(side) * sim.link_half_width;
}

@compute @workgroup_size(64)
fn init_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= sim.particle_count) {
        return;
    }
    positions[i] = vec4<f32>(0.0, -10000.0, 0.0, -1.0);
    velocities[i] = vec4<f32>(0.0);
}

@compute @workgroup_size(64)
fn integrate_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= sim.particle_count) {
        return;
    }
    let current = positions[i];
    if (current.w <= 0.0) {
        return;
    }
    let force = turbulence(current.xyz * sim.noise_frequency) * sim.noise_amplitude * (current.w + 0.1);
    let velocity = (velocities[i].xyz + force) * (1.0 - sim.friction);
    let position = current.xyz + velocity * sim.delta_time;
    let life = current.w - sim.delta_time / sim.lifetime;
    positions[i] = vec4<f32>(position, life);
    velocities[i] = vec4<f32>(velocity, 0.0);
}

// 运动更新之后单独调度，读取其他槽位时无竞争
@compute @workgroup_size(64)
fn links_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= sim.particle_count) {
        return;
    }
    let base = i * 8u;
    let own = positions[i];
    if (own.w <= 0.0) {
        for (var k = 0u; k < 8u; k++) {
            links[base + k].color.w = 0.0;
        }
        return;
    }

    var best_index = array<u32, 2>(NO_NEIGHBOR, NO_NEIGHBOR);
    var best_dist = array<f32, 2>(3.4e38, 3.4e38);
    for (var j = 0u; j < sim.particle_count; j++) {
        if (j == i) {
            continue;
        }
        let other = positions[j];
        if (other.w <= 0.0) {
            continue;
        }
        let d = other.xyz - own.xyz;
        let dist = dot(d, d);
        if (dist <= 0.0) {
            continue;
        }
        if (dist < best_dist[0]) {
            best_dist[1] = best_dist[0];
            best_index[1] = best_index[0];
            best_dist[0] = dist;
            best_index[0] = j;
        } else if (dist < best_dist[1]) {
            best_dist[1] = dist;
            best_index[1] = j;
        }
    }

    let rgb = link_color(i, sim);
    for (var r = 0u; r < 2u; r++) {
        let quad = base + r * 4u;
        let neighbor = best_index[r];
        var neighbor_life = 0.0;
        if (neighbor != NO_NEIGHBOR) {
            let other = positions[neighbor];
            neighbor_life = other.w;
            let offset = ribbon_offset(own.xyz, other.xyz);
            links[quad].position = vec4<f32>(own.xyz + offset, 1.0);
            links[quad + 1u].position = vec4<f32>(own.xyz - offset, 1.0);
            links[quad + 2u].position = vec4<f32>(other.xyz + offset, 1.0);
            links[quad + 3u].position = vec4<f32>(other.xyz - offset, 1.0);
        }
        let color = vec4<f32>(rgb, link_alpha(own.w, neighbor_life));
        for (var k = 0u; k < 4u; k++) {
            links[quad + k].color = color;
        }
    }
}

@compute @workgroup_size(64)
fn spawn_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let k = id.x;
    if (sim.enabled == 0u || k >= min(sim.batch_size, sim.particle_count)) {
        return;
    }
    let index = (sim.cursor + k) % sim.particle_count;
    var t = 0.0;
    if (sim.batch_size > 1u) {
        t = f32(k) / f32(sim.batch_size - 1u);
    }
    var state = pcg_hash(index ^ pcg_hash(sim.seed));
    let position = mix(sim.spawn_previous.xyz, sim.spawn_current.xyz, t)
        + rng_unit_vector(&state) * sim.spawn_radius;
    let velocity = rng_unit_vector(&state) * sim.spawn_speed + sim.velocity_bias.xyz;
    positions[index] = vec4<f32>(position, 1.0);
    velocities[index] = vec4<f32>(velocity, 0.0);
}
"#;

/// 相机 Uniform（每个视图一个动态偏移槽）
pub const CAMERA_WGSL: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    right: vec4<f32>,
    up: vec4<f32>,
    position: vec4<f32>,
    forward: vec4<f32>,
};

@group(0) @binding(0) var<uniform> camera: Camera;
@group(1) @binding(0) var<uniform> sim: SimUniforms;
"#;

/// 精灵：每个槽位一个实例，6 个顶点
pub const SPRITE_WGSL: &str = r#"
struct SpriteOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) color: vec3<f32>,
    @location(2) life: f32,
};

@vertex
fn vs_sprite(
    @builtin(vertex_index) vertex_index: u32,
    @builtin(instance_index) instance_index: u32,
    @location(0) position_life: vec4<f32>,
    @location(1) velocity: vec4<f32>,
) -> SpriteOut {
    var out: SpriteOut;
    let life = position_life.w;
    if (life <= 0.0) {
        // 死亡粒子折叠到裁剪空间外
        out.clip = vec4<f32>(2.0, 2.0, 2.0, 1.0);
        out.uv = vec2<f32>(0.0);
        out.color = vec3<f32>(0.0);
        out.life = 0.0;
        return out;
    }

    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
    );
    let corner = corners[vertex_index];
    let angle = atan2(velocity.y, velocity.x);
    let c = cos(angle);
    let s = sin(angle);
    let rotated = vec2<f32>(corner.x * c - corner.y * s, corner.x * s + corner.y * c);
    let world = position_life.xyz
        + (camera.right.xyz * rotated.x + camera.up.xyz * rotated.y) * sim.particle_size;

    let pulse = 0.75 + 0.25 * sin(sim.time * 3.0 + f32(instance_index) * 0.37);
    let falloff = sqrt(clamp(life, 0.0, 1.0));

    out.clip = camera.view_proj * vec4<f32>(world, 1.0);
    out.uv = corner;
    out.color = link_color(instance_index, sim) * pulse * falloff;
    out.life = life;
    return out;
}

@fragment
fn fs_sprite(in: SpriteOut) -> @location(0) vec4<f32> {
    let mask = 1.0 - smoothstep(0.8, 1.0, length(in.uv));
    return vec4<f32>(in.color, mask * max(in.life, 0.0));
}
"#;

/// 连线带：直接使用设备端连线缓冲作为顶点缓冲
pub const RIBBON_WGSL: &str = r#"
struct RibbonOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_ribbon(@location(0) position: vec4<f32>, @location(1) color: vec4<f32>) -> RibbonOut {
    var out: RibbonOut;
    out.clip = camera.view_proj * vec4<f32>(position.xyz, 1.0);
    out.color = color;
    return out;
}

@fragment
fn fs_ribbon(in: RibbonOut) -> @location(0) vec4<f32> {
    if (in.color.a <= 0.0) {
        discard;
    }
    return in.color;
}
"#;

/// 全屏三角形拷贝（格式不同时的传输路径）
pub const BLIT_WGSL: &str = r#"
@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

struct BlitOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_fullscreen(@builtin(vertex_index) vertex_index: u32) -> BlitOut {
    var out: BlitOut;
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);
    out.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(x, 1.0 - y);
    return out;
}

@fragment
fn fs_blit(in: BlitOut) -> @location(0) vec4<f32> {
    return textureSample(source_texture, source_sampler, in.uv);
}
"#;

/// 拼接计算着色器源码
pub fn compute_source() -> String {
    [NOISE_WGSL, COMPUTE_WGSL].concat()
}

/// 拼接精灵 + 连线带渲染着色器源码
pub fn render_source() -> String {
    [NOISE_WGSL, CAMERA_WGSL, SPRITE_WGSL, RIBBON_WGSL].concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_contain_entry_points() {
        let compute = compute_source();
        for entry in ["init_main", "integrate_main", "links_main", "spawn_main"] {
            assert!(compute.contains(&format!("fn {entry}")), "missing {entry}");
        }
        let render = render_source();
        for entry in ["vs_sprite", "fs_sprite", "vs_ribbon", "fs_ribbon"] {
            assert!(render.contains(&format!("fn {entry}")), "missing {entry}");
        }
    }

    #[test]
    fn test_uniform_struct_field_count() {
        // 与 SimUniforms 的 Rust 布局一致：4 个 vec4 + 20 个标量
        let start = NOISE_WGSL.find("struct SimUniforms").unwrap();
        let end = start + NOISE_WGSL[start..].find("};").unwrap();
        let body = &NOISE_WGSL[start..end];
        assert_eq!(body.matches("vec4<f32>").count(), 4);
        assert_eq!(body.matches(": f32").count() + body.matches(": u32").count(), 20);
    }
}
