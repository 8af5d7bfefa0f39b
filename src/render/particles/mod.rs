//! 粒子连线模拟
//!
//! 每个发射器拥有一组常驻设备内存的粒子槽（位置+寿命、速度）和一个连线缓冲，
//! 槽位通过环形游标循环复用。
//!
//! ## 每帧阶段
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Init（仅首帧）                                          │
//! │     - 所有槽位寿命置 -1，停放到可见区域外                  │
//! │                                                          │
//! │  Integrate                                               │
//! │     - 存活粒子：分形噪声湍流、阻尼、位移、寿命衰减          │
//! │     - 第二次调度：O(N²) 两近邻搜索，重建连线带             │
//! │                                                          │
//! │  Spawn（仅开启时）                                        │
//! │     - [cursor, cursor+K) mod N 处批量生成                 │
//! │     - 游标每帧前进 K mod N，无论是否开启                   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 使用示例
//!
//! ```ignore
//! let pipelines = ParticlePipelines::new(&device);
//! let store = GpuParticleStore::new(&device, &pipelines, 1024);
//! let mut emitter = LinkEmitter::new(store, 8, EmitterParams::default())?;
//!
//! emitter.set_spawn_position(pointer);
//! emitter.set_spawn_enabled(true);
//! let mut compute = GpuComputeEncoder::new(&queue, &mut encoder, &pipelines);
//! emitter.compute(&mut compute, dt);
//! ```

pub mod emitter;
pub mod field;
pub mod gpu;
pub mod kernels;
pub mod params;
pub mod renderer;
pub mod shaders;
pub mod store;

pub use emitter::LinkEmitter;
pub use field::{ParticleField, SpawnPoint};
pub use gpu::{GpuComputeEncoder, GpuParticleStore, ParticlePipelines};
pub use params::{ComputeStage, EmitterParams, LinkVertex, ParticleSlot, SimUniforms};
pub use renderer::ParticleRenderer;
pub use store::{ComputeEncoder, CpuCompute, CpuParticleStore, ParticleStore};
