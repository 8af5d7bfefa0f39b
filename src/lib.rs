//! # Linkfield
//!
//! GPU particle-link simulation with stereo headset presentation, built on wgpu.
//!
//! ## Features
//!
//! - **Particle links**: ring-buffered particle slots simulated in compute shaders, each live
//!   particle linked to its two nearest live neighbours by camera-facing ribbons
//! - **Stereo presentation**: one compute pass and one submission per frame, rendered per view
//!   into a shared offscreen target and transferred into each eye's sub-image
//! - **Dual-mode frame loop**: windowed refresh and headset frames behind one controller,
//!   switched by session lifecycle events
//! - **Simulated headset**: desktop stand-in for the headset runtime
//!
//! ## Example
//!
//! ```ignore
//! use linkfield::render::particles::{CpuCompute, CpuParticleStore, EmitterParams, LinkEmitter};
//!
//! let mut emitter = LinkEmitter::new(CpuParticleStore::new(1024), 8, EmitterParams::default())?;
//! emitter.set_spawn_enabled(true);
//! emitter.compute(&mut CpuCompute::new(), 1.0 / 60.0);
//! ```
//!
//! ## Modules
//!
//! - [`core`]: errors, events, logging and the application loop
//! - [`config`]: configuration loading and validation
//! - [`render`]: particle simulation, rendering, offscreen target and transfer
//! - [`xr`]: session lifecycle, frame loop and stereo presentation
//! - [`platform`]: windowing integration

/// Configuration system
pub mod config;
/// Core functionality: errors, events, logging, application loop
pub mod core;
/// Platform abstraction layer
pub mod platform;
/// Rendering system
pub mod render;
/// Headset presentation
pub mod xr;

pub use crate::config::AppConfig;
pub use crate::core::{Engine, EngineError, EngineOptions, EngineResult};
